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

//! Shared cache string files (`uuidtext/dsc/<UUID>`), holding the format strings of the images
//! of a dyld shared cache.

use serde::Serialize;
use uuid::Uuid;

use crate::{
    error::ParseError,
    fs::FileBuffer,
    header::MemOffset,
    io::{BorrowingCursor, BorrowingRead as _, c_str_at},
};

const DSC_SIGNATURE: &[u8] = b"hcsd";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DscHeader {
    pub major_version: u16,
    pub minor_version: u16,
    pub number_of_ranges: u32,
    pub number_of_uuids: u32,
}

/// Range of string locations stored in the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DscRange {
    pub range_offset: u64,
    pub data_offset: u32,
    pub range_size: u32,
    pub uuid_index: u64,
}

impl DscRange {
    #[inline]
    pub fn contains(&self, location: u64) -> bool {
        location >= self.range_offset && location - self.range_offset < u64::from(self.range_size)
    }
}

/// Image of the shared cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DscUuid {
    pub text_offset: u64,
    pub text_size: u32,
    pub uuid: Uuid,
    pub path_offset: u32,
    pub path: Option<String>,
}

impl DscUuid {
    /// Whether `address` (relative to the shared cache base) falls in the text segment of the
    /// image.
    #[inline]
    pub fn contains(&self, address: u64) -> bool {
        address >= self.text_offset && address - self.text_offset < u64::from(self.text_size)
    }
}

/// Result of a string lookup in a [DscFile].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DscString<'a> {
    pub string: &'a [u8],
    pub range: &'a DscRange,
    pub image: &'a DscUuid,
}

impl DscString<'_> {
    #[inline]
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(self.string).into_owned()
    }
}

#[derive(Debug, Clone)]
pub struct DscFile {
    data: FileBuffer,
    header: DscHeader,
    ranges: Vec<DscRange>,
    uuids: Vec<DscUuid>,
    // Indices in ranges, sorted by range_offset
    sorted_ranges: Vec<usize>,
}

impl DscFile {
    pub fn parse(data: FileBuffer) -> Result<DscFile, ParseError> {
        let mut cursor = BorrowingCursor::new(&data);
        cursor
            .read_tag(DSC_SIGNATURE)?
            .map_err(|_| ParseError::MalformedHeader("invalid shared cache strings signature".into()))?;

        let header = DscHeader {
            major_version: cursor.read_int()?,
            minor_version: cursor.read_int()?,
            number_of_ranges: cursor.read_int()?,
            number_of_uuids: cursor.read_int()?,
        };
        let version = header.major_version;
        if !matches!(version, 1 | 2) {
            return Err(ParseError::MalformedHeader(format!(
                "unsupported shared cache strings version: {version}.{}",
                header.minor_version
            )));
        }

        let ranges: Vec<DscRange> = (0..header.number_of_ranges)
            .map(|_| -> Result<_, ParseError> {
                Ok(if version == 1 {
                    let uuid_index: u32 = cursor.read_int()?;
                    let range_offset: u32 = cursor.read_int()?;
                    DscRange {
                        uuid_index: uuid_index.into(),
                        range_offset: range_offset.into(),
                        data_offset: cursor.read_int()?,
                        range_size: cursor.read_int()?,
                    }
                } else {
                    DscRange {
                        range_offset: cursor.read_int()?,
                        data_offset: cursor.read_int()?,
                        range_size: cursor.read_int()?,
                        uuid_index: cursor.read_int()?,
                    }
                })
            })
            .collect::<Result<_, _>>()?;

        let uuids: Vec<DscUuid> = (0..header.number_of_uuids)
            .map(|_| -> Result<_, ParseError> {
                let text_offset = if version == 1 {
                    cursor.read_int::<u32>()?.into()
                } else {
                    cursor.read_int()?
                };
                let text_size = cursor.read_int()?;
                let uuid = cursor.read_uuid()?;
                let path_offset: u32 = cursor.read_int()?;
                let path = usize::try_from(path_offset)
                    .ok()
                    .and_then(|offset| c_str_at(&data, offset))
                    .map(|path| String::from_utf8_lossy(path).into_owned());
                Ok(DscUuid {
                    text_offset,
                    text_size,
                    uuid,
                    path_offset,
                    path,
                })
            })
            .collect::<Result<_, _>>()?;

        if let Some(range) = ranges
            .iter()
            .find(|range| range.uuid_index >= u64::from(header.number_of_uuids))
        {
            return Err(ParseError::MalformedHeader(format!(
                "shared cache strings range at {:#x} refers to UUID #{} out of {}",
                range.range_offset, range.uuid_index, header.number_of_uuids
            )));
        }

        let mut sorted_ranges: Vec<usize> = (0..ranges.len()).collect();
        sorted_ranges.sort_by_key(|idx| ranges[*idx].range_offset);

        Ok(DscFile {
            data,
            header,
            ranges,
            uuids,
            sorted_ranges,
        })
    }

    #[inline]
    pub fn header(&self) -> &DscHeader {
        &self.header
    }

    #[inline]
    pub fn ranges(&self) -> &[DscRange] {
        &self.ranges
    }

    #[inline]
    pub fn uuids(&self) -> &[DscUuid] {
        &self.uuids
    }

    fn range_of(&self, location: u64) -> Option<&DscRange> {
        let pos = self
            .sorted_ranges
            .partition_point(|idx| self.ranges[*idx].range_offset <= location);
        let range = &self.ranges[*self.sorted_ranges.get(pos.checked_sub(1)?)?];
        range.contains(location).then_some(range)
    }

    /// Look up the string stored for `location`.
    pub fn lookup(&self, location: u64) -> Option<DscString<'_>> {
        let range = self.range_of(location)?;
        let image = self.uuids.get(usize::try_from(range.uuid_index).ok()?)?;
        let offset = u64::from(range.data_offset) + (location - range.range_offset);
        let string = c_str_at(&self.data, MemOffset::try_from(offset).ok()?)?;
        Some(DscString {
            string,
            range,
            image,
        })
    }

    /// Image whose text segment contains `address`.
    pub fn image_at(&self, address: u64) -> Option<&DscUuid> {
        self.uuids.iter().find(|image| image.contains(address))
    }
}
