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

//! Header chunk found at the start of every `tracev3` file.

use serde::Serialize;
use uuid::Uuid;

use crate::{
    error::ParseError,
    io::{BorrowingCursor, BorrowingRead as _, BorrowingReadCore as _},
};

pub type FileOffset = u64;
pub type FileSize = FileOffset;

pub type MemOffset = usize;
pub type MemSize = MemOffset;

/// Wall-clock time in nanoseconds since the UNIX epoch.
pub type Timestamp = i64;
/// Mach continuous time, in timebase ticks since boot.
pub type ContinuousTime = u64;

const CONTINUOUS_SUBCHUNK: u32 = 0x6100;
const SYSTEM_INFO_SUBCHUNK: u32 = 0x6101;
const GENERATION_SUBCHUNK: u32 = 0x6102;
const TIME_ZONE_SUBCHUNK: u32 = 0x6103;

/// Content of the header chunk (tag 0x1000) of a `tracev3` file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceHeader {
    pub timebase_numerator: u32,
    pub timebase_denominator: u32,
    pub start_continuous_time: ContinuousTime,
    pub start_time_seconds: u64,
    pub start_time_microseconds: u32,
    /// Offset from UTC, in minutes.
    pub time_zone_offset: u32,
    pub daylight_saving_flag: u32,
    pub flags: u32,

    pub continuous_time: ContinuousTime,
    pub build_version: String,
    pub hardware_model: String,
    pub boot_identifier: Uuid,
    pub logd_pid: u32,
    pub logd_exit_status: u32,
    pub time_zone_path: String,
}

impl TraceHeader {
    /// Parse the payload of the header chunk.
    pub fn parse(data: &[u8]) -> Result<TraceHeader, ParseError> {
        let mut cursor = BorrowingCursor::new(data);

        let mut header = TraceHeader {
            timebase_numerator: cursor.read_int()?,
            timebase_denominator: cursor.read_int()?,
            start_continuous_time: cursor.read_int()?,
            start_time_seconds: cursor.read_int()?,
            start_time_microseconds: cursor.read_int()?,
            time_zone_offset: cursor.read_int()?,
            daylight_saving_flag: cursor.read_int()?,
            flags: cursor.read_int()?,

            continuous_time: 0,
            build_version: String::new(),
            hardware_model: String::new(),
            boot_identifier: Uuid::nil(),
            logd_pid: 0,
            logd_exit_status: 0,
            time_zone_path: String::new(),
        };

        if header.timebase_denominator == 0 {
            return Err(ParseError::MalformedHeader(
                "timebase denominator is 0".into(),
            ));
        }

        while !cursor.is_empty() {
            let tag: u32 = cursor.read_int()?;
            let size: u32 = cursor.read_int()?;
            let mut sub = BorrowingCursor::new(cursor.read(size as usize)?);

            match tag {
                CONTINUOUS_SUBCHUNK => {
                    header.continuous_time = sub.read_int()?;
                }
                SYSTEM_INFO_SUBCHUNK => {
                    let _unknown1: u32 = sub.read_int()?;
                    let _unknown2: u32 = sub.read_int()?;
                    header.build_version = sub.read_padded_str(16)?;
                    header.hardware_model = sub.read_padded_str(32)?;
                }
                GENERATION_SUBCHUNK => {
                    header.boot_identifier = sub.read_uuid()?;
                    header.logd_pid = sub.read_int()?;
                    header.logd_exit_status = sub.read_int()?;
                }
                TIME_ZONE_SUBCHUNK => {
                    header.time_zone_path = sub.read_padded_str(sub.remaining())?;
                }
                tag => {
                    log::debug!("Skipping unknown header sub-chunk {tag:#06x} of {size} bytes")
                }
            }
        }
        Ok(header)
    }

    /// Wall-clock time at which the file was started, in nanoseconds since the UNIX epoch.
    pub fn start_timestamp(&self) -> Timestamp {
        let secs = i64::try_from(self.start_time_seconds).unwrap_or(i64::MAX / 1_000_000_000);
        secs.saturating_mul(1_000_000_000)
            .saturating_add(i64::from(self.start_time_microseconds) * 1000)
    }

    /// Convert a continuous time to wall-clock time using only the information of this header.
    ///
    /// This is only a fallback for when no timesync database is available, as it does not
    /// account for clock adjustments that happened since the file was started.
    pub fn timestamp_of(&self, continuous_time: ContinuousTime) -> Timestamp {
        let delta = i128::from(continuous_time) - i128::from(self.start_continuous_time);
        let delta = delta * i128::from(self.timebase_numerator)
            / i128::from(self.timebase_denominator);
        let ts = i128::from(self.start_timestamp()) + delta;
        ts.clamp(i64::MIN.into(), i64::MAX.into()) as Timestamp
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const BOOT_UUID: &str = "a6ebc8e3-0a1c-40e8-93b9-da3a7f671d19";

    fn sub_chunk(tag: u32, data: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend(tag.to_le_bytes());
        buf.extend((data.len() as u32).to_le_bytes());
        buf.extend(data);
        buf
    }

    fn padded(s: &str, size: usize) -> Vec<u8> {
        let mut buf = s.as_bytes().to_vec();
        buf.resize(size, 0);
        buf
    }

    /// Header chunk payload as found on a macOS 12 system.
    pub(crate) fn header_payload() -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend(125u32.to_le_bytes());
        buf.extend(3u32.to_le_bytes());
        buf.extend(1_000_000u64.to_le_bytes());
        buf.extend(1_639_440_000u64.to_le_bytes());
        buf.extend(250_000u32.to_le_bytes());
        buf.extend(300u32.to_le_bytes());
        buf.extend(0u32.to_le_bytes());
        buf.extend(4u32.to_le_bytes());

        buf.extend(sub_chunk(0x6100, &5_000_000u64.to_le_bytes()));

        let mut info = Vec::new();
        info.extend(1u32.to_le_bytes());
        info.extend(2u32.to_le_bytes());
        info.extend(padded("19D52", 16));
        info.extend(padded("J96AP", 32));
        buf.extend(sub_chunk(0x6101, &info));

        let mut generation = Vec::new();
        generation.extend(Uuid::parse_str(BOOT_UUID).unwrap().as_bytes());
        generation.extend(91u32.to_le_bytes());
        generation.extend(0u32.to_le_bytes());
        buf.extend(sub_chunk(0x6102, &generation));

        buf.extend(sub_chunk(
            0x6103,
            &padded("/var/db/timezone/zoneinfo/America/Toronto", 48),
        ));
        buf
    }

    #[test]
    fn header_test() {
        let payload = header_payload();
        assert_eq!(payload.len(), 208);

        let header = TraceHeader::parse(&payload).unwrap();
        assert_eq!(header.timebase_numerator, 125);
        assert_eq!(header.timebase_denominator, 3);
        assert_eq!(header.time_zone_offset, 300);
        assert_eq!(header.continuous_time, 5_000_000);
        assert_eq!(header.build_version, "19D52");
        assert_eq!(header.hardware_model, "J96AP");
        assert_eq!(header.boot_identifier.to_string(), BOOT_UUID);
        assert_eq!(header.logd_pid, 91);
        assert_eq!(
            header.time_zone_path,
            "/var/db/timezone/zoneinfo/America/Toronto"
        );
    }

    #[test]
    fn timestamp_test() {
        let header = TraceHeader::parse(&header_payload()).unwrap();
        let start = 1_639_440_000_250_000_000;
        assert_eq!(header.start_timestamp(), start);
        assert_eq!(header.timestamp_of(1_000_000), start);
        assert_eq!(header.timestamp_of(1_000_003), start + 125);
    }

    #[test]
    fn truncated_header_test() {
        let payload = header_payload();
        assert_eq!(
            TraceHeader::parse(&payload[..20]),
            Err(ParseError::TruncatedData)
        );
        // Sub-chunk declaring more data than available
        assert_eq!(
            TraceHeader::parse(&payload[..70]),
            Err(ParseError::TruncatedData)
        );
    }
}
