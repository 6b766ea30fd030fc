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

//! Per-image string files (`uuidtext/XX/YYYY...`).

use serde::Serialize;

use crate::{
    error::ParseError,
    fs::FileBuffer,
    header::MemOffset,
    io::{BorrowingCursor, BorrowingRead as _, BorrowingReadCore as _, c_str_at},
};

const UUIDTEXT_SIGNATURE: u32 = 0x66778899;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UuidTextHeader {
    pub major_version: u32,
    pub minor_version: u32,
    pub number_of_entries: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UuidTextEntry {
    pub range_start: u32,
    pub size: u32,
    /// Offset of the text of the entry in the file.
    pub data_offset: u64,
}

impl UuidTextEntry {
    #[inline]
    pub fn contains(&self, location: u64) -> bool {
        let start = u64::from(self.range_start);
        location >= start && location - start < u64::from(self.size)
    }
}

#[derive(Debug, Clone)]
pub struct UuidTextFile {
    data: FileBuffer,
    header: UuidTextHeader,
    entries: Vec<UuidTextEntry>,
    image_path: Option<String>,
}

impl UuidTextFile {
    pub fn parse(data: FileBuffer) -> Result<UuidTextFile, ParseError> {
        let mut cursor = BorrowingCursor::new(&data);
        let signature: u32 = cursor.read_int()?;
        if signature != UUIDTEXT_SIGNATURE {
            return Err(ParseError::MalformedHeader(format!(
                "invalid uuidtext signature: {signature:#010x}"
            )));
        }
        let header = UuidTextHeader {
            major_version: cursor.read_int()?,
            minor_version: cursor.read_int()?,
            number_of_entries: cursor.read_int()?,
        };

        let ranges = (0..header.number_of_entries)
            .map(|_| -> Result<(u32, u32), ParseError> { Ok((cursor.read_int()?, cursor.read_int()?)) })
            .collect::<Result<Vec<_>, _>>()?;

        let mut data_offset = cursor.offset() as u64;
        let entries = ranges
            .into_iter()
            .map(|(range_start, size)| {
                let entry = UuidTextEntry {
                    range_start,
                    size,
                    data_offset,
                };
                data_offset += u64::from(size);
                entry
            })
            .collect();

        let image_path = MemOffset::try_from(data_offset)
            .ok()
            .and_then(|offset| {
                let mut cursor = BorrowingCursor::new(data.get(offset..)?);
                cursor.read_null_terminated().ok()
            })
            .map(|path| String::from_utf8_lossy(path).into_owned());
        if image_path.is_none() {
            log::debug!("uuidtext file has no image path");
        }

        Ok(UuidTextFile {
            data,
            header,
            entries,
            image_path,
        })
    }

    #[inline]
    pub fn header(&self) -> &UuidTextHeader {
        &self.header
    }

    #[inline]
    pub fn entries(&self) -> &[UuidTextEntry] {
        &self.entries
    }

    /// Path of the image the strings belong to.
    #[inline]
    pub fn image_path(&self) -> Option<&str> {
        self.image_path.as_deref()
    }

    /// Look up the NUL-terminated string stored for `location`.
    pub fn lookup(&self, location: u64) -> Option<&[u8]> {
        let entry = self.entries.iter().find(|entry| entry.contains(location))?;
        let offset = entry.data_offset + (location - u64::from(entry.range_start));
        let end = entry.data_offset + u64::from(entry.size);
        let text = self
            .data
            .get(MemOffset::try_from(offset).ok()?..MemOffset::try_from(end).ok()?)?;
        c_str_at(text, 0)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    pub(crate) const IMAGE_PATH: &str = "/usr/libexec/exampled";

    /// File with two entries: locations `[0x10, 0x30)` and `[0x100, 0x110)`.
    pub(crate) fn uuidtext_file() -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend(0x66778899u32.to_le_bytes());
        buf.extend(2u32.to_le_bytes());
        buf.extend(1u32.to_le_bytes());
        buf.extend(2u32.to_le_bytes());

        buf.extend(0x10u32.to_le_bytes());
        buf.extend(0x20u32.to_le_bytes());
        buf.extend(0x100u32.to_le_bytes());
        buf.extend(0x10u32.to_le_bytes());

        let mut first = b"hello %s\0value: %d\0".to_vec();
        first.resize(0x20, 0);
        buf.extend(first);
        let mut second = b"second\0".to_vec();
        second.resize(0x10, 0);
        buf.extend(second);

        buf.extend(IMAGE_PATH.as_bytes());
        buf.push(0);
        buf
    }

    #[test]
    fn uuidtext_test() {
        let file = UuidTextFile::parse(uuidtext_file().into()).unwrap();

        assert_eq!(
            file.header(),
            &UuidTextHeader {
                major_version: 2,
                minor_version: 1,
                number_of_entries: 2,
            }
        );
        assert_eq!(
            file.entries(),
            &[
                UuidTextEntry {
                    range_start: 0x10,
                    size: 0x20,
                    data_offset: 32,
                },
                UuidTextEntry {
                    range_start: 0x100,
                    size: 0x10,
                    data_offset: 64,
                },
            ]
        );
        assert_eq!(file.image_path(), Some(IMAGE_PATH));

        assert_eq!(file.lookup(0x10), Some(&b"hello %s"[..]));
        assert_eq!(file.lookup(0x19), Some(&b"value: %d"[..]));
        assert_eq!(file.lookup(0x100), Some(&b"second"[..]));
        assert_eq!(file.lookup(0x30), None);
        assert_eq!(file.lookup(0x0), None);
    }

    #[test]
    fn uuidtext_malformed_test() {
        let mut buf = uuidtext_file();
        buf[0] = 0;
        assert!(matches!(
            UuidTextFile::parse(buf.into()),
            Err(ParseError::MalformedHeader(_))
        ));

        let buf = uuidtext_file()[..20].to_vec();
        assert_eq!(
            UuidTextFile::parse(buf.into()).unwrap_err(),
            ParseError::TruncatedData
        );

        // No image path
        let buf = uuidtext_file()[..80].to_vec();
        let file = UuidTextFile::parse(buf.into()).unwrap();
        assert_eq!(file.image_path(), None);
        assert_eq!(file.lookup(0x100), Some(&b"second"[..]));
    }
}
