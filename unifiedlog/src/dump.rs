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

//! StateDump (tag 0x6003) and SimpleDump (tag 0x6004) chunks, recording state snapshots and
//! plain messages outside of firehose chunks.

use serde::Serialize;
use uuid::Uuid;

use crate::{
    error::ParseError,
    header::ContinuousTime,
    io::{BorrowingCursor, BorrowingRead as _, BorrowingReadCore as _},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StateDumpDataType {
    Plist,
    Protobuf,
    Object,
    Unknown(u32),
}

impl From<u32> for StateDumpDataType {
    fn from(x: u32) -> Self {
        match x {
            1 => StateDumpDataType::Plist,
            2 => StateDumpDataType::Protobuf,
            3 => StateDumpDataType::Object,
            x => StateDumpDataType::Unknown(x),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateDumpChunk {
    pub proc_id_upper: u64,
    pub proc_id_lower: u32,
    pub ttl: u8,
    pub continuous_time: ContinuousTime,
    pub activity_id: u64,
    pub uuid: Uuid,
    pub data_type: StateDumpDataType,
    pub decoder_library: String,
    pub decoder_type: String,
    pub name: String,
    #[serde(skip)]
    pub data: Vec<u8>,
}

impl StateDumpChunk {
    pub fn parse(data: &[u8]) -> Result<StateDumpChunk, ParseError> {
        let mut cursor = BorrowingCursor::new(data);
        let proc_id_upper = cursor.read_int()?;
        let proc_id_lower = cursor.read_int()?;
        let ttl = cursor.read_int()?;
        cursor.read(3)?;
        let continuous_time = cursor.read_int()?;
        let activity_id = cursor.read_int()?;
        let uuid = cursor.read_uuid()?;
        let data_type = cursor.read_int::<u32>()?.into();
        let data_size: u32 = cursor.read_int()?;
        let decoder_library = cursor.read_padded_str(64)?;
        let decoder_type = cursor.read_padded_str(64)?;
        let name = cursor.read_padded_str(64)?;
        let size = usize::try_from(data_size).map_err(|_| ParseError::TruncatedData)?;
        let data = cursor.read(size)?.to_vec();

        Ok(StateDumpChunk {
            proc_id_upper,
            proc_id_lower,
            ttl,
            continuous_time,
            activity_id,
            uuid,
            data_type,
            decoder_library,
            decoder_type,
            name,
            data,
        })
    }

    /// Human-readable rendition of the dumped state.
    ///
    /// Textual property lists are shown as they are, any other content is hex-encoded.
    pub fn message(&self) -> String {
        let body = match (self.data_type, std::str::from_utf8(&self.data)) {
            (StateDumpDataType::Plist, Ok(text)) if !self.data.starts_with(b"bplist") => {
                text.trim_end_matches('\0').to_owned()
            }
            _ => self.data.iter().map(|x| format!("{x:02x}")).collect(),
        };
        let kind = match self.data_type {
            StateDumpDataType::Plist => "plist".into(),
            StateDumpDataType::Protobuf => "protobuf".into(),
            StateDumpDataType::Object => {
                format!("object {}/{}", self.decoder_library, self.decoder_type)
            }
            StateDumpDataType::Unknown(x) => format!("unknown type {x}"),
        };
        format!("{} ({kind}): {body}", self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimpleDumpChunk {
    pub proc_id_upper: u64,
    pub proc_id_lower: u32,
    pub ttl: u8,
    pub message_type: u8,
    pub continuous_time: ContinuousTime,
    pub thread_id: u64,
    /// Offset of the emitting code in the sender image.
    pub offset: u64,
    pub sender_uuid: Uuid,
    pub dsc_uuid: Uuid,
    pub subsystem: String,
    pub message: String,
}

impl SimpleDumpChunk {
    pub fn parse(data: &[u8]) -> Result<SimpleDumpChunk, ParseError> {
        let mut cursor = BorrowingCursor::new(data);
        let proc_id_upper = cursor.read_int()?;
        let proc_id_lower = cursor.read_int()?;
        let ttl = cursor.read_int()?;
        let message_type = cursor.read_int()?;
        cursor.read(2)?;
        let continuous_time = cursor.read_int()?;
        let thread_id = cursor.read_int()?;
        let offset = cursor.read_int()?;
        let sender_uuid = cursor.read_uuid()?;
        let dsc_uuid = cursor.read_uuid()?;
        let _unknown: u32 = cursor.read_int()?;
        let subsystem_size: u32 = cursor.read_int()?;
        let message_size: u32 = cursor.read_int()?;

        let mut read_str = |size: u32| -> Result<String, ParseError> {
            let size = usize::try_from(size).map_err(|_| ParseError::TruncatedData)?;
            Ok(cursor.read_padded_str(size)?)
        };
        let subsystem = read_str(subsystem_size)?;
        let message = read_str(message_size)?;

        Ok(SimpleDumpChunk {
            proc_id_upper,
            proc_id_lower,
            ttl,
            message_type,
            continuous_time,
            thread_id,
            offset,
            sender_uuid,
            dsc_uuid,
            subsystem,
            message,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    pub(crate) const SIMPLEDUMP_PAYLOAD: [u8; 126] = [
        0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x07, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x4f, 0x95, 0xd2, 0x21, 0x00, 0x00, 0x00, 0x00,
        0x5f, 0x07, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x44, 0x85, 0x03, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x1d, 0x62, 0x53, 0x53, 0xa9, 0xfa, 0x3e, 0xc9,
        0x94, 0xc0, 0xb2, 0x95, 0x23, 0x15, 0xb2, 0xd2, 0xbe, 0x7f, 0xe6, 0xad,
        0x45, 0x60, 0x3a, 0xe2, 0x88, 0x3e, 0x43, 0x2f, 0x78, 0xb4, 0x50, 0x62,
        0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x2a, 0x00, 0x00, 0x00,
        0x53, 0x6b, 0x69, 0x70, 0x70, 0x69, 0x6e, 0x67, 0x20, 0x62, 0x6f, 0x6f,
        0x74, 0x2d, 0x74, 0x61, 0x73, 0x6b, 0x3a, 0x20, 0x72, 0x65, 0x73, 0x74,
        0x6f, 0x72, 0x65, 0x2d, 0x64, 0x61, 0x74, 0x61, 0x70, 0x61, 0x72, 0x74,
        0x69, 0x74, 0x69, 0x6f, 0x6e, 0x00,
    ];

    pub(crate) const STATEDUMP_PAYLOAD: [u8; 290] = [
        0x91, 0x75, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0xca, 0x5b, 0x0d, 0x00,
        0x0e, 0x00, 0x00, 0x00, 0x83, 0xa3, 0x1d, 0x3a, 0x8d, 0x5b, 0x00, 0x00,
        0x29, 0xd2, 0xea, 0x00, 0x00, 0x00, 0x00, 0x80, 0x08, 0x1b, 0x5e, 0x9e,
        0x59, 0xea, 0x39, 0xcd, 0x83, 0xc9, 0xee, 0xdb, 0x68, 0xa8, 0x40, 0x76,
        0x01, 0x00, 0x00, 0x00, 0x2a, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x53, 0x70, 0x72, 0x69, 0x6e, 0x67, 0x42, 0x6f,
        0x61, 0x72, 0x64, 0x20, 0x2d, 0x20, 0x43, 0x6f, 0x6d, 0x62, 0x69, 0x6e,
        0x65, 0x64, 0x20, 0x4c, 0x69, 0x73, 0x74, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x62, 0x70, 0x6c, 0x69,
        0x73, 0x74, 0x30, 0x30, 0x50, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x01, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x09,
    ];

    #[test]
    fn simpledump_test() {
        let chunk = SimpleDumpChunk::parse(&SIMPLEDUMP_PAYLOAD).unwrap();
        assert_eq!(
            chunk,
            SimpleDumpChunk {
                proc_id_upper: 1,
                proc_id_lower: 7,
                ttl: 0,
                message_type: 0,
                continuous_time: 567448911,
                thread_id: 1887,
                offset: 230724,
                sender_uuid: Uuid::parse_str("1d625353-a9fa-3ec9-94c0-b2952315b2d2").unwrap(),
                dsc_uuid: Uuid::parse_str("be7fe6ad-4560-3ae2-883e-432f78b45062").unwrap(),
                subsystem: "".into(),
                message: "Skipping boot-task: restore-datapartition".into(),
            }
        );

        assert_eq!(
            SimpleDumpChunk::parse(&SIMPLEDUMP_PAYLOAD[..100]).unwrap_err(),
            ParseError::TruncatedData
        );
    }

    #[test]
    fn statedump_test() {
        let chunk = StateDumpChunk::parse(&STATEDUMP_PAYLOAD).unwrap();

        assert_eq!(chunk.proc_id_upper, 292241);
        assert_eq!(chunk.proc_id_lower, 875466);
        assert_eq!(chunk.ttl, 14);
        assert_eq!(chunk.continuous_time, 100662123537283);
        assert_eq!(chunk.activity_id, 0x8000000000ead229);
        assert_eq!(
            chunk.uuid,
            Uuid::parse_str("081b5e9e-59ea-39cd-83c9-eedb68a84076").unwrap()
        );
        assert_eq!(chunk.data_type, StateDumpDataType::Plist);
        assert_eq!(chunk.decoder_library, "");
        assert_eq!(chunk.decoder_type, "");
        assert_eq!(chunk.name, "SpringBoard - Combined List");
        assert_eq!(chunk.data, &STATEDUMP_PAYLOAD[248..]);
        assert_eq!(chunk.data.len(), 42);

        // Binary plist is not valid text
        assert!(
            chunk
                .message()
                .starts_with("SpringBoard - Combined List (plist): 62706c697374303050")
        );
    }

    #[test]
    fn statedump_text_test() {
        let mut buf = STATEDUMP_PAYLOAD[..248].to_vec();
        let text = b"<plist><true/></plist>";
        buf[52..56].copy_from_slice(&(text.len() as u32).to_le_bytes());
        buf.extend(text);

        let chunk = StateDumpChunk::parse(&buf).unwrap();
        assert_eq!(
            chunk.message(),
            "SpringBoard - Combined List (plist): <plist><true/></plist>"
        );

        assert_eq!(
            StateDumpChunk::parse(&buf[..buf.len() - 1]).unwrap_err(),
            ParseError::TruncatedData
        );
    }
}
