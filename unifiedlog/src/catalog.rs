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

//! Catalog chunk (tag 0x600b), describing the processes and images referenced by the chunk-sets
//! that follow it.

use serde::Serialize;
use uuid::Uuid;

use crate::{
    error::ParseError,
    header::MemOffset,
    io::{c_str_at, BorrowingCursor, BorrowingRead as _, BorrowingReadCore as _},
};

const CATALOG_HEADER_SIZE: MemOffset = 24;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogHeader {
    pub subsystem_strings_offset: u16,
    pub process_information_entries_offset: u16,
    pub number_of_process_information_entries: u16,
    pub sub_chunks_offset: u16,
    pub number_of_sub_chunks: u16,
    pub earliest_firehose_time: u64,
}

/// Image loaded in a process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessUuidEntry {
    pub size: u32,
    pub uuid_index: u16,
    pub load_address: u64,
}

impl ProcessUuidEntry {
    #[inline]
    pub fn contains(&self, address: u64) -> bool {
        address >= self.load_address && address - self.load_address < u64::from(self.size)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessSubsystem {
    pub identifier: u16,
    pub subsystem_offset: u16,
    pub category_offset: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessEntry {
    pub index: u16,
    pub main_uuid_index: u16,
    pub dsc_uuid_index: u16,
    pub proc_id_upper: u64,
    pub proc_id_lower: u32,
    pub pid: u32,
    pub euid: u32,
    pub uuid_entries: Vec<ProcessUuidEntry>,
    pub subsystems: Vec<ProcessSubsystem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogSubChunk {
    pub start: u64,
    pub end: u64,
    pub uncompressed_size: u32,
    pub compression_algorithm: u32,
    pub indexes: Vec<u16>,
    pub string_offsets: Vec<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Catalog {
    pub header: CatalogHeader,
    pub uuids: Vec<Uuid>,
    #[serde(skip)]
    subsystem_strings: Vec<u8>,
    pub process_entries: Vec<ProcessEntry>,
    pub sub_chunks: Vec<CatalogSubChunk>,
}

impl Catalog {
    pub fn parse(data: &[u8]) -> Result<Catalog, ParseError> {
        let mut cursor = BorrowingCursor::new(data);
        let header = CatalogHeader {
            subsystem_strings_offset: cursor.read_int()?,
            process_information_entries_offset: cursor.read_int()?,
            number_of_process_information_entries: cursor.read_int()?,
            sub_chunks_offset: cursor.read_int()?,
            number_of_sub_chunks: cursor.read_int()?,
            earliest_firehose_time: {
                cursor.read(6)?;
                cursor.read_int()?
            },
        };

        let strings_offset = usize::from(header.subsystem_strings_offset);
        let entries_offset = usize::from(header.process_information_entries_offset);
        let sub_chunks_offset = usize::from(header.sub_chunks_offset);
        if strings_offset > entries_offset || entries_offset > sub_chunks_offset {
            return Err(ParseError::MalformedHeader(format!(
                "catalog offsets are not ordered: {strings_offset}, {entries_offset}, {sub_chunks_offset}"
            )));
        }

        let uuids = (0..strings_offset / 16)
            .map(|_| cursor.read_uuid())
            .collect::<Result<_, _>>()?;

        cursor.abs_seek(CATALOG_HEADER_SIZE + strings_offset)?;
        let subsystem_strings = cursor.read(entries_offset - strings_offset)?.to_vec();

        cursor.abs_seek(CATALOG_HEADER_SIZE + entries_offset)?;
        let process_entries = (0..header.number_of_process_information_entries)
            .map(|_| parse_process_entry(&mut cursor))
            .collect::<Result<_, _>>()?;

        cursor.abs_seek(CATALOG_HEADER_SIZE + sub_chunks_offset)?;
        let sub_chunks = (0..header.number_of_sub_chunks)
            .map(|_| parse_sub_chunk(&mut cursor))
            .collect::<Result<_, _>>()?;

        Ok(Catalog {
            header,
            uuids,
            subsystem_strings,
            process_entries,
            sub_chunks,
        })
    }

    #[inline]
    pub fn uuid(&self, index: u16) -> Option<Uuid> {
        self.uuids.get(usize::from(index)).copied()
    }

    /// String stored at `offset` in the subsystem strings table.
    pub fn string_at(&self, offset: u16) -> Option<String> {
        c_str_at(&self.subsystem_strings, offset.into())
            .map(|s| String::from_utf8_lossy(s).into_owned())
    }

    pub fn process_entry(&self, proc_id_upper: u64, proc_id_lower: u32) -> Option<&ProcessEntry> {
        self.process_entries
            .iter()
            .find(|entry| entry.proc_id_upper == proc_id_upper && entry.proc_id_lower == proc_id_lower)
    }

    /// Subsystem and category names registered by `entry` under `identifier`.
    pub fn subsystem(&self, entry: &ProcessEntry, identifier: u16) -> Option<(String, String)> {
        let subsystem = entry
            .subsystems
            .iter()
            .find(|subsystem| subsystem.identifier == identifier)?;
        Some((
            self.string_at(subsystem.subsystem_offset)?,
            self.string_at(subsystem.category_offset)?,
        ))
    }

    /// UUID of the main executable of the process.
    #[inline]
    pub fn main_uuid(&self, entry: &ProcessEntry) -> Option<Uuid> {
        self.uuid(entry.main_uuid_index)
    }

    /// UUID of the shared cache the process was using.
    #[inline]
    pub fn dsc_uuid(&self, entry: &ProcessEntry) -> Option<Uuid> {
        self.uuid(entry.dsc_uuid_index)
    }

    /// UUID of the image of `entry` mapped at `address`.
    pub fn image_uuid_at(&self, entry: &ProcessEntry, address: u64) -> Option<Uuid> {
        let image = entry.uuid_entries.iter().find(|image| image.contains(address))?;
        self.uuid(image.uuid_index)
    }
}

fn parse_process_entry(cursor: &mut BorrowingCursor<'_>) -> Result<ProcessEntry, ParseError> {
    let start = cursor.offset();

    let index = cursor.read_int()?;
    let _unknown: u16 = cursor.read_int()?;
    let main_uuid_index = cursor.read_int()?;
    let dsc_uuid_index = cursor.read_int()?;
    let proc_id_upper = cursor.read_int()?;
    let proc_id_lower = cursor.read_int()?;
    let pid = cursor.read_int()?;
    let euid = cursor.read_int()?;
    let _unknown: u32 = cursor.read_int()?;

    let number_of_uuid_entries: u32 = cursor.read_int()?;
    let _unknown: u32 = cursor.read_int()?;
    let uuid_entries = (0..number_of_uuid_entries)
        .map(|_| -> Result<_, ParseError> {
            let size = cursor.read_int()?;
            let _unknown: u32 = cursor.read_int()?;
            let uuid_index = cursor.read_int()?;
            let upper: u16 = cursor.read_int()?;
            let lower: u32 = cursor.read_int()?;
            Ok(ProcessUuidEntry {
                size,
                uuid_index,
                load_address: (u64::from(upper) << 32) | u64::from(lower),
            })
        })
        .collect::<Result<_, _>>()?;

    let number_of_subsystems: u32 = cursor.read_int()?;
    let _unknown: u32 = cursor.read_int()?;
    let subsystems = (0..number_of_subsystems)
        .map(|_| -> Result<_, ParseError> {
            Ok(ProcessSubsystem {
                identifier: cursor.read_int()?,
                subsystem_offset: cursor.read_int()?,
                category_offset: cursor.read_int()?,
            })
        })
        .collect::<Result<_, _>>()?;
    cursor.align(start, 8);

    Ok(ProcessEntry {
        index,
        main_uuid_index,
        dsc_uuid_index,
        proc_id_upper,
        proc_id_lower,
        pid,
        euid,
        uuid_entries,
        subsystems,
    })
}

fn parse_sub_chunk(cursor: &mut BorrowingCursor<'_>) -> Result<CatalogSubChunk, ParseError> {
    let start = cursor.offset();

    let start_time = cursor.read_int()?;
    let end_time = cursor.read_int()?;
    let uncompressed_size = cursor.read_int()?;
    let compression_algorithm = cursor.read_int()?;

    let number_of_indexes: u32 = cursor.read_int()?;
    let indexes = (0..number_of_indexes)
        .map(|_| cursor.read_int())
        .collect::<Result<_, _>>()?;
    let number_of_string_offsets: u32 = cursor.read_int()?;
    let string_offsets = (0..number_of_string_offsets)
        .map(|_| cursor.read_int())
        .collect::<Result<_, _>>()?;
    cursor.align(start, 8);

    Ok(CatalogSubChunk {
        start: start_time,
        end: end_time,
        uncompressed_size,
        compression_algorithm,
        indexes,
        string_offsets,
    })
}
