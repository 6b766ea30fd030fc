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

//! On-demand loading of the string files of a `uuidtext` directory.

use core::fmt;
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::{Arc, PoisonError, RwLock},
};

use uuid::Uuid;

use crate::{
    dsc::DscFile,
    error::ParseError,
    fs::{FileAccessor, FileBuffer},
    uuidtext::UuidTextFile,
};

type Cache<T> = RwLock<BTreeMap<Uuid, Option<Arc<T>>>>;

/// Cached access to the DSC and UUIDText files of a `uuidtext` directory.
///
/// Each file is loaded at most once. Files that are missing or fail to parse are remembered as
/// such and are not retried.
pub struct StringStore {
    accessor: Box<dyn FileAccessor>,
    root: PathBuf,
    dsc: Cache<DscFile>,
    uuidtext: Cache<UuidTextFile>,
}

impl StringStore {
    pub fn new<P: Into<PathBuf>>(accessor: Box<dyn FileAccessor>, root: P) -> Self {
        StringStore {
            accessor,
            root: root.into(),
            dsc: Default::default(),
            uuidtext: Default::default(),
        }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of the shared cache strings file of `uuid`.
    pub fn dsc_path(&self, uuid: &Uuid) -> PathBuf {
        self.root.join("dsc").join(format!("{:X}", uuid.simple()))
    }

    /// Location of the UUIDText file of the image `uuid`.
    pub fn uuidtext_path(&self, uuid: &Uuid) -> PathBuf {
        let name = format!("{:X}", uuid.simple());
        let (dir, file) = name.split_at(2);
        self.root.join(dir).join(file)
    }

    pub fn dsc(&self, uuid: &Uuid) -> Option<Arc<DscFile>> {
        load_cached(&self.dsc, uuid, || {
            self.load(&self.dsc_path(uuid), DscFile::parse)
        })
    }

    pub fn uuidtext(&self, uuid: &Uuid) -> Option<Arc<UuidTextFile>> {
        load_cached(&self.uuidtext, uuid, || {
            self.load(&self.uuidtext_path(uuid), UuidTextFile::parse)
        })
    }

    fn load<T, F>(&self, path: &Path, parse: F) -> Option<T>
    where
        F: FnOnce(FileBuffer) -> Result<T, ParseError>,
    {
        if !self.accessor.exists(path) {
            log::debug!("String file not found: {}", path.display());
            return None;
        }
        let res = self
            .accessor
            .open(path)
            .map_err(ParseError::from)
            .and_then(parse);
        match res {
            Ok(x) => Some(x),
            Err(err) => {
                log::warn!("Could not load {}: {err}", path.display());
                None
            }
        }
    }
}

fn load_cached<T, F>(cache: &Cache<T>, uuid: &Uuid, load: F) -> Option<Arc<T>>
where
    F: FnOnce() -> Option<T>,
{
    if let Some(entry) = cache
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(uuid)
    {
        return entry.clone();
    }

    let loaded = load().map(Arc::new);
    let mut cache = cache.write().unwrap_or_else(PoisonError::into_inner);
    cache.entry(*uuid).or_insert(loaded).clone()
}

impl fmt::Debug for StringStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StringStore")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::{
        dsc::tests::{DSC_IMAGE_UUID, DSC_STRING, dsc_v2},
        fs::MemoryFileAccessor,
        uuidtext::tests::{IMAGE_PATH, uuidtext_file},
    };

    const IMAGE_UUID: Uuid = Uuid::from_u128(0x1d625353_6b9e_3b1f_8d4e_1c2b8b3e7a01);

    #[test]
    fn paths_test() {
        let store = StringStore::new(Box::new(MemoryFileAccessor::new()), "/var/db/uuidtext");
        assert_eq!(
            store.uuidtext_path(&IMAGE_UUID),
            Path::new("/var/db/uuidtext/1D/6253536B9E3B1F8D4E1C2B8B3E7A01")
        );
        assert_eq!(
            store.dsc_path(&DSC_IMAGE_UUID),
            Path::new("/var/db/uuidtext/dsc/4DF6D8F5D9C63B0E9C4A4FA43E9EC51C")
        );
    }

    #[test]
    fn store_test() {
        let mut accessor = MemoryFileAccessor::new();
        accessor.insert("uuidtext/1D/6253536B9E3B1F8D4E1C2B8B3E7A01", uuidtext_file());
        accessor.insert("uuidtext/dsc/4DF6D8F5D9C63B0E9C4A4FA43E9EC51C", dsc_v2());
        accessor.insert("uuidtext/AA/AAAAAAAAAAAAAAAAAAAAAAAAAAAAAA", b"garbage".to_vec());
        let store = StringStore::new(Box::new(accessor), "uuidtext");

        let uuidtext = store.uuidtext(&IMAGE_UUID).unwrap();
        assert_eq!(uuidtext.image_path(), Some(IMAGE_PATH));
        assert!(Arc::ptr_eq(&uuidtext, &store.uuidtext(&IMAGE_UUID).unwrap()));

        let dsc = store.dsc(&DSC_IMAGE_UUID).unwrap();
        assert_eq!(dsc.lookup(0x1010).unwrap().to_string_lossy(), DSC_STRING);

        assert!(store.dsc(&IMAGE_UUID).is_none());
        assert!(store.uuidtext(&Uuid::from_u128(u128::MAX / 15 * 10)).is_none());
    }

    #[test]
    fn negative_cache_test() {
        let cache: Cache<u32> = Default::default();
        let calls = AtomicUsize::new(0);
        let load = || {
            calls.fetch_add(1, Ordering::Relaxed);
            None
        };
        assert_eq!(load_cached(&cache, &IMAGE_UUID, load), None);
        assert_eq!(load_cached(&cache, &IMAGE_UUID, load), None);
        assert_eq!(calls.load(Ordering::Relaxed), 1);

        let value = load_cached(&cache, &DSC_IMAGE_UUID, || Some(3));
        assert_eq!(value.as_deref(), Some(&3));
    }
}
