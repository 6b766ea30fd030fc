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

//! Access to the files of a log archive.

use core::{fmt, ops::Deref};
use std::{
    collections::BTreeMap,
    fs::File,
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::header::FileSize;

/// Immutable content of a file, cheap to clone.
#[derive(Clone)]
pub struct FileBuffer(Arc<dyn AsRef<[u8]> + Send + Sync>);

impl FileBuffer {
    pub fn new<T>(data: T) -> Self
    where
        T: AsRef<[u8]> + Send + Sync + 'static,
    {
        FileBuffer(Arc::new(data))
    }
}

impl Deref for FileBuffer {
    type Target = [u8];
    #[inline]
    fn deref(&self) -> &Self::Target {
        (*self.0).as_ref()
    }
}

impl AsRef<[u8]> for FileBuffer {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        self
    }
}

impl From<Vec<u8>> for FileBuffer {
    fn from(data: Vec<u8>) -> Self {
        FileBuffer::new(data)
    }
}

impl fmt::Debug for FileBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileBuffer")
            .field("len", &self.len())
            .finish()
    }
}

/// Read-only access to files.
pub trait FileAccessor: Send + Sync {
    fn exists(&self, path: &Path) -> bool;
    fn size(&self, path: &Path) -> io::Result<FileSize>;
    fn open(&self, path: &Path) -> io::Result<FileBuffer>;
}

/// [FileAccessor] for the local filesystem, mapping files in memory.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeFileAccessor;

impl FileAccessor for NativeFileAccessor {
    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn size(&self, path: &Path) -> io::Result<FileSize> {
        Ok(path.metadata()?.len())
    }

    fn open(&self, path: &Path) -> io::Result<FileBuffer> {
        let file = File::open(path)?;
        // mmap() of an empty file fails on some platforms.
        if file.metadata()?.len() == 0 {
            return Ok(Vec::new().into());
        }
        //SAFETY: mmap is inherently unsafe as the memory content could change
        // without notice if the backing file is modified. We have to rely on
        // the user/OS being nice to us and not do that, or we might crash,
        // there is no way around it unfortunately.
        let mmap = unsafe { memmap2::Mmap::map(&file)? };
        let _ = mmap.advise(memmap2::Advice::WillNeed);
        Ok(FileBuffer::new(mmap))
    }
}

/// [FileAccessor] serving in-memory files.
#[derive(Debug, Default, Clone)]
pub struct MemoryFileAccessor {
    files: BTreeMap<PathBuf, FileBuffer>,
}

impl MemoryFileAccessor {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn insert<P: Into<PathBuf>, T: Into<FileBuffer>>(&mut self, path: P, data: T) {
        self.files.insert(path.into(), data.into());
    }

    fn get(&self, path: &Path) -> io::Result<&FileBuffer> {
        self.files.get(path).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} not found", path.display()),
            )
        })
    }
}

impl FileAccessor for MemoryFileAccessor {
    fn exists(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }

    fn size(&self, path: &Path) -> io::Result<FileSize> {
        Ok(self.get(path)?.len() as FileSize)
    }

    fn open(&self, path: &Path) -> io::Result<FileBuffer> {
        self.get(path).cloned()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;

    #[test]
    fn memory_accessor_test() {
        let mut accessor = MemoryFileAccessor::new();
        accessor.insert("a/b", vec![1u8, 2, 3]);

        assert!(accessor.exists(Path::new("a/b")));
        assert!(!accessor.exists(Path::new("a/c")));
        assert_eq!(accessor.size(Path::new("a/b")).unwrap(), 3);
        assert_eq!(&*accessor.open(Path::new("a/b")).unwrap(), &[1, 2, 3]);
        assert_eq!(
            accessor.open(Path::new("a/c")).unwrap_err().kind(),
            io::ErrorKind::NotFound
        );
    }

    #[test]
    fn native_accessor_test() {
        let dir = std::env::temp_dir().join(format!("unifiedlog-fs-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("file");
        let empty = dir.join("empty");
        File::create(&path).unwrap().write_all(b"hello").unwrap();
        File::create(&empty).unwrap();

        let accessor = NativeFileAccessor;
        assert!(accessor.exists(&path));
        assert!(!accessor.exists(&dir.join("missing")));
        assert_eq!(accessor.size(&path).unwrap(), 5);
        assert_eq!(&*accessor.open(&path).unwrap(), b"hello");
        assert!(accessor.open(&empty).unwrap().is_empty());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
