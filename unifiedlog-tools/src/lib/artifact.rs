// SPDX-License-Identifier: Apache-2.0
//
// Copyright (C) 2024, ARM Limited and contributors.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may
// not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS, WITHOUT
// WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Detection and loading of the artifacts found in a logarchive.

use std::path::{Path, PathBuf};

use unifiedlog::{
    fs::{FileAccessor as _, FileBuffer, NativeFileAccessor},
    timesync::{TimesyncDatabase, TimesyncFile},
};

use crate::error::DynMultiError;

/// Kind of artifact, detected from the first bytes of the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Dsc,
    UuidText,
    Timesync,
    TraceV3,
}

impl ArtifactKind {
    pub fn detect(data: &[u8]) -> ArtifactKind {
        match data.get(..4) {
            Some(b"hcsd") => ArtifactKind::Dsc,
            Some([0x99, 0x88, 0x77, 0x66]) => ArtifactKind::UuidText,
            Some([0xb0, 0xbb, 0x30, 0x00]) | Some([b'T', b's', 0x20, 0x00]) => {
                ArtifactKind::Timesync
            }
            _ => ArtifactKind::TraceV3,
        }
    }
}

/// Open a file and detect its kind.
pub fn open_artifact(path: &Path) -> Result<(ArtifactKind, FileBuffer), DynMultiError> {
    let data = NativeFileAccessor.open(path).map_err(|err| {
        DynMultiError::from_string(format!("Could not open {}: {err}", path.display()))
    })?;
    Ok((ArtifactKind::detect(&data), data))
}

/// Load all the `*.timesync` files of a directory.
///
/// Files that cannot be decoded are reported in the error, along with the database built from
/// the others.
pub fn load_timesync_dir(dir: &Path) -> (TimesyncDatabase, Option<DynMultiError>) {
    let mut db = TimesyncDatabase::new();
    let mut errors = Vec::new();

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            let err = format!("Could not read timesync directory {}: {err}", dir.display());
            return (db, Some(DynMultiError::from_string(err)));
        }
    };

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "timesync"))
        .collect();
    paths.sort();

    for path in paths {
        let res = NativeFileAccessor
            .open(&path)
            .map_err(|err| err.to_string())
            .and_then(|data| TimesyncFile::parse(&data).map_err(|err| err.to_string()));
        match res {
            Ok(file) => {
                log::debug!("Loaded timesync file {}", path.display());
                db.add_file(&file);
            }
            Err(err) => errors.push(DynMultiError::from_string(format!(
                "Could not load timesync file {}: {err}",
                path.display()
            ))),
        }
    }

    let errors = (!errors.is_empty()).then(|| DynMultiError::merge(errors));
    (db, errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_test() {
        assert_eq!(ArtifactKind::detect(b"hcsd\x02\x00"), ArtifactKind::Dsc);
        assert_eq!(
            ArtifactKind::detect(&0x66778899u32.to_le_bytes()),
            ArtifactKind::UuidText
        );
        assert_eq!(
            ArtifactKind::detect(&[0xb0, 0xbb, 0x30, 0x00, 0x00]),
            ArtifactKind::Timesync
        );
        assert_eq!(ArtifactKind::detect(b"Ts\x20\x00"), ArtifactKind::Timesync);
        assert_eq!(
            ArtifactKind::detect(&[0x00, 0x10, 0x00, 0x00, 0x11, 0x00]),
            ArtifactKind::TraceV3
        );
        assert_eq!(ArtifactKind::detect(b""), ArtifactKind::TraceV3);
    }

    #[test]
    fn timesync_dir_test() {
        let dir = std::env::temp_dir().join(format!("unifiedlog-timesync-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("0000000000000001.timesync"), b"garbage!").unwrap();
        std::fs::write(dir.join("ignored.txt"), b"garbage!").unwrap();

        let (db, errors) = load_timesync_dir(&dir);
        assert!(db.is_empty());
        assert_eq!(errors.unwrap().len(), 1);

        let (_, errors) = load_timesync_dir(&dir.join("missing"));
        assert_eq!(errors.unwrap().len(), 1);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
