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

//! Timesync databases (`timesync/*.timesync`), correlating continuous time with wall-clock time.

use std::collections::BTreeMap;

use serde::Serialize;
use uuid::Uuid;

use crate::{
    error::ParseError,
    header::{ContinuousTime, MemSize, Timestamp},
    io::{BorrowingCursor, BorrowingRead as _},
};

const BOOT_SIGNATURE: u16 = 0xbbb0;
const SYNC_SIGNATURE: u16 = 0x7354;
const BOOT_RECORD_SIZE: MemSize = 48;
const SYNC_RECORD_SIZE: MemSize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimesyncBootRecord {
    pub boot_identifier: Uuid,
    pub timebase_numerator: u32,
    pub timebase_denominator: u32,
    /// Wall-clock time of the boot.
    pub timestamp: Timestamp,
    pub time_zone_offset: i32,
    pub daylight_saving_flag: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimesyncSyncRecord {
    /// Continuous time of the sync point.
    pub kernel_time: ContinuousTime,
    pub timestamp: Timestamp,
    pub time_zone_offset: i32,
    pub daylight_saving_flag: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TimesyncRecord {
    Boot(TimesyncBootRecord),
    Sync(TimesyncSyncRecord),
}

/// Records of one boot session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimesyncBoot {
    pub boot: TimesyncBootRecord,
    /// Sync points, sorted by kernel time.
    pub syncs: Vec<TimesyncSyncRecord>,
}

impl TimesyncBoot {
    fn new(boot: TimesyncBootRecord) -> Self {
        TimesyncBoot {
            boot,
            syncs: Vec::new(),
        }
    }

    /// Convert a continuous time of this boot session to wall-clock time.
    ///
    /// The closest preceding sync point is used as anchor, or the boot itself for times before
    /// the first sync point.
    pub fn resolve(&self, continuous_time: ContinuousTime) -> Timestamp {
        let pos = self
            .syncs
            .partition_point(|sync| sync.kernel_time <= continuous_time);
        let (tick, timestamp) = match pos.checked_sub(1) {
            Some(idx) => (self.syncs[idx].kernel_time, self.syncs[idx].timestamp),
            None => (0, self.boot.timestamp),
        };

        let numerator = u128::from(self.boot.timebase_numerator);
        let denominator = u128::from(core::cmp::max(self.boot.timebase_denominator, 1));
        let delta = u128::from(continuous_time - tick) * numerator / denominator;
        let ts = i128::from(timestamp) + i128::try_from(delta).unwrap_or(i128::MAX);
        ts.clamp(i64::MIN.into(), i64::MAX.into()) as Timestamp
    }

    fn insert_sync(&mut self, sync: TimesyncSyncRecord) {
        let pos = self
            .syncs
            .partition_point(|other| other.kernel_time <= sync.kernel_time);
        self.syncs.insert(pos, sync);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimesyncFile {
    records: Vec<TimesyncRecord>,
}

impl TimesyncFile {
    pub fn parse(data: &[u8]) -> Result<TimesyncFile, ParseError> {
        let mut cursor = BorrowingCursor::new(data);
        let mut records = Vec::new();

        while !cursor.is_empty() {
            let start = cursor.offset();
            let signature: u16 = cursor.read_int()?;
            let record_size: u16 = cursor.read_int()?;
            let _unknown: u32 = cursor.read_int()?;

            let (record, min_size) = match signature {
                BOOT_SIGNATURE => (
                    TimesyncRecord::Boot(TimesyncBootRecord {
                        boot_identifier: cursor.read_uuid()?,
                        timebase_numerator: cursor.read_int()?,
                        timebase_denominator: cursor.read_int()?,
                        timestamp: cursor.read_int()?,
                        time_zone_offset: cursor.read_int()?,
                        daylight_saving_flag: cursor.read_int()?,
                    }),
                    BOOT_RECORD_SIZE,
                ),
                SYNC_SIGNATURE => (
                    TimesyncRecord::Sync(TimesyncSyncRecord {
                        kernel_time: cursor.read_int()?,
                        timestamp: cursor.read_int()?,
                        time_zone_offset: cursor.read_int()?,
                        daylight_saving_flag: cursor.read_int()?,
                    }),
                    SYNC_RECORD_SIZE,
                ),
                signature => {
                    return Err(ParseError::MalformedHeader(format!(
                        "unknown timesync record signature {signature:#06x} at offset {start}"
                    )));
                }
            };

            // Records may be larger than the fields we know about.
            let record_size = core::cmp::max(MemSize::from(record_size), min_size);
            cursor.abs_seek(start + record_size)?;
            records.push(record);
        }

        Ok(TimesyncFile { records })
    }

    #[inline]
    pub fn records(&self) -> &[TimesyncRecord] {
        &self.records
    }

    /// Group the records by boot session.
    ///
    /// Sync records found before any boot record are ignored.
    pub fn boots(&self) -> Vec<TimesyncBoot> {
        let mut boots: Vec<TimesyncBoot> = Vec::new();
        for record in &self.records {
            match record {
                TimesyncRecord::Boot(boot) => boots.push(TimesyncBoot::new(boot.clone())),
                TimesyncRecord::Sync(sync) => match boots.last_mut() {
                    Some(boot) => boot.insert_sync(sync.clone()),
                    None => log::warn!("Ignoring timesync record not preceded by a boot record"),
                },
            }
        }
        boots
    }
}

/// Boot sessions from several timesync files, indexed by boot identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TimesyncDatabase {
    boots: BTreeMap<Uuid, TimesyncBoot>,
}

impl TimesyncDatabase {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn from_files<'a, I>(files: I) -> Self
    where
        I: IntoIterator<Item = &'a TimesyncFile>,
    {
        let mut db = Self::new();
        for file in files {
            db.add_file(file);
        }
        db
    }

    /// Add the boot sessions of `file`, merging the sync points of sessions already known.
    pub fn add_file(&mut self, file: &TimesyncFile) {
        for boot in file.boots() {
            match self.boots.get_mut(&boot.boot.boot_identifier) {
                Some(existing) => {
                    for sync in boot.syncs {
                        existing.insert_sync(sync);
                    }
                }
                None => {
                    self.boots.insert(boot.boot.boot_identifier, boot);
                }
            }
        }
    }

    #[inline]
    pub fn boot(&self, boot_identifier: &Uuid) -> Option<&TimesyncBoot> {
        self.boots.get(boot_identifier)
    }

    #[inline]
    pub fn boots(&self) -> impl Iterator<Item = &TimesyncBoot> {
        self.boots.values()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.boots.is_empty()
    }
}
