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

//! Oversize chunks (tag 0x6002), holding the arguments of tracepoints too large to fit in their
//! firehose chunk.

use crate::{
    error::ParseError,
    firehose::DataItems,
    format::Argument,
    header::ContinuousTime,
    io::{BorrowingCursor, BorrowingRead as _, BorrowingReadCore as _},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OversizeChunk {
    pub proc_id_upper: u64,
    pub proc_id_lower: u32,
    pub ttl: u8,
    pub continuous_time: ContinuousTime,
    pub data_reference_index: u32,
    pub public_data_size: u16,
    pub private_data_size: u16,
    pub items: DataItems,
    pub private_data: Vec<u8>,
}

impl OversizeChunk {
    pub fn parse(data: &[u8]) -> Result<OversizeChunk, ParseError> {
        let mut cursor = BorrowingCursor::new(data);
        let proc_id_upper = cursor.read_int()?;
        let proc_id_lower = cursor.read_int()?;
        let ttl = cursor.read_int()?;
        cursor.read(3)?;
        let continuous_time = cursor.read_int()?;
        let data_reference_index = cursor.read_int()?;
        let public_data_size: u16 = cursor.read_int()?;
        let private_data_size: u16 = cursor.read_int()?;

        let public = cursor.read(public_data_size.into())?;
        let private_data = cursor.read(private_data_size.into())?.to_vec();
        let items = if public.is_empty() {
            DataItems::default()
        } else {
            DataItems::parse(&mut BorrowingCursor::new(public))?
        };

        Ok(OversizeChunk {
            proc_id_upper,
            proc_id_lower,
            ttl,
            continuous_time,
            data_reference_index,
            public_data_size,
            private_data_size,
            items,
            private_data,
        })
    }

    /// Key under which tracepoints refer to this chunk.
    #[inline]
    pub fn key(&self) -> (u64, u32, u32) {
        (self.proc_id_upper, self.proc_id_lower, self.data_reference_index)
    }

    pub fn arguments(&self) -> Vec<Argument> {
        let private = (!self.private_data.is_empty()).then_some(&self.private_data[..]);
        self.items.arguments(private)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    /// Oversize chunk payload holding a string argument and a private string argument.
    pub(crate) fn oversize_payload(data_reference_index: u32) -> Vec<u8> {
        let mut public = vec![0x02, 0x02];
        // public string, 6 bytes at offset 0 of the value area
        public.extend([0x22, 0x04, 0x00, 0x00, 0x06, 0x00]);
        // private string, 4 bytes at offset 0 of the private data
        public.extend([0x21, 0x04, 0x00, 0x00, 0x04, 0x00]);
        public.extend(b"large\0");
        let private = b"key\0";

        let mut buf = Vec::new();
        buf.extend(1u64.to_le_bytes());
        buf.extend(7u32.to_le_bytes());
        buf.extend([30, 0, 0, 0]);
        buf.extend(100657868900985u64.to_le_bytes());
        buf.extend(data_reference_index.to_le_bytes());
        buf.extend((public.len() as u16).to_le_bytes());
        buf.extend((private.len() as u16).to_le_bytes());
        buf.extend(public);
        buf.extend(private);
        buf
    }

    #[test]
    fn oversize_test() {
        let chunk = OversizeChunk::parse(&oversize_payload(82)).unwrap();

        assert_eq!(chunk.proc_id_upper, 1);
        assert_eq!(chunk.proc_id_lower, 7);
        assert_eq!(chunk.ttl, 30);
        assert_eq!(chunk.continuous_time, 100657868900985);
        assert_eq!(chunk.data_reference_index, 82);
        assert_eq!(chunk.public_data_size, 20);
        assert_eq!(chunk.private_data_size, 4);
        assert_eq!(chunk.key(), (1, 7, 82));
        assert_eq!(
            chunk.arguments(),
            vec![
                Argument::String("large".into()),
                Argument::String("key".into())
            ]
        );
    }

    #[test]
    fn oversize_truncated_test() {
        let buf = oversize_payload(1);
        assert_eq!(
            OversizeChunk::parse(&buf[..buf.len() - 1]).unwrap_err(),
            ParseError::TruncatedData
        );
    }
}
