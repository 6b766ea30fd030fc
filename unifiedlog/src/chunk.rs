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

//! Chunk framing shared by `tracev3` files and decompressed chunk-sets.

use crate::{
    error::ParseError,
    header::{FileOffset, MemOffset, MemSize},
    io::{BorrowingCursor, BorrowingRead as _},
};

pub const CHUNK_HEADER_SIZE: MemSize = 16;
pub const CHUNK_ALIGNMENT: MemSize = 8;

/// Kind of chunk, as identified by its tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChunkKind {
    Header,
    Firehose,
    Oversize,
    StateDump,
    SimpleDump,
    Catalog,
    ChunkSet,
    Unknown(u32),
}

impl From<u32> for ChunkKind {
    fn from(tag: u32) -> ChunkKind {
        match tag {
            0x1000 => ChunkKind::Header,
            0x6001 => ChunkKind::Firehose,
            0x6002 => ChunkKind::Oversize,
            0x6003 => ChunkKind::StateDump,
            0x6004 => ChunkKind::SimpleDump,
            0x600b => ChunkKind::Catalog,
            0x600d => ChunkKind::ChunkSet,
            tag => ChunkKind::Unknown(tag),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub tag: u32,
    pub sub_tag: u32,
    /// Size of the chunk payload, excluding this header.
    pub data_size: u64,
}

impl ChunkHeader {
    pub fn parse(data: &[u8], offset: MemOffset) -> Result<ChunkHeader, ParseError> {
        let mut cursor = BorrowingCursor::new(data);
        cursor.abs_seek(offset)?;
        Ok(ChunkHeader {
            tag: cursor.read_int()?,
            sub_tag: cursor.read_int()?,
            data_size: cursor.read_int()?,
        })
    }

    #[inline]
    pub fn kind(&self) -> ChunkKind {
        self.tag.into()
    }
}

/// A chunk borrowed from the buffer it was found in.
#[derive(Debug, Clone, Copy)]
pub struct Chunk<'a> {
    /// Offset of the chunk header in the buffer.
    pub offset: MemOffset,
    pub header: ChunkHeader,
    pub data: &'a [u8],
}

impl Chunk<'_> {
    #[inline]
    pub fn kind(&self) -> ChunkKind {
        self.header.kind()
    }

    /// Wrap an error raised while decoding this chunk with its location.
    #[inline]
    pub fn error(&self, err: ParseError) -> ParseError {
        err.in_chunk(self.header.tag, self.offset as FileOffset)
    }
}

/// Iterator over a sequence of 8-byte aligned chunks.
///
/// A trailing region too small to hold a chunk header ends the iteration. A chunk declaring more
/// data than available yields a single [ParseError::TruncatedData] error, after which iteration
/// stops as there is no way of finding the next chunk boundary.
#[derive(Debug, Clone)]
pub struct ChunkIter<'a> {
    buf: &'a [u8],
    offset: MemOffset,
}

impl<'a> ChunkIter<'a> {
    #[inline]
    pub fn new(buf: &'a [u8]) -> Self {
        ChunkIter { buf, offset: 0 }
    }
}

impl<'a> Iterator for ChunkIter<'a> {
    type Item = Result<Chunk<'a>, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        let offset = self.offset;
        let remaining = self.buf.len().saturating_sub(offset);
        if remaining < CHUNK_HEADER_SIZE {
            if remaining > 0 {
                log::debug!("Ignoring {remaining} trailing bytes at offset {offset}");
                self.offset = self.buf.len();
            }
            return None;
        }

        let header = match ChunkHeader::parse(self.buf, offset) {
            Ok(header) => header,
            Err(err) => {
                self.offset = self.buf.len();
                return Some(Err(err));
            }
        };

        let start = offset + CHUNK_HEADER_SIZE;
        let end = MemSize::try_from(header.data_size)
            .ok()
            .and_then(|size| start.checked_add(size))
            .filter(|end| *end <= self.buf.len());

        match end {
            Some(end) => {
                self.offset = end
                    .checked_add(crate::io::padding(end, CHUNK_ALIGNMENT))
                    .unwrap_or(self.buf.len());
                Some(Ok(Chunk {
                    offset,
                    header,
                    data: &self.buf[start..end],
                }))
            }
            None => {
                self.offset = self.buf.len();
                Some(Err(
                    ParseError::TruncatedData.in_chunk(header.tag, offset as FileOffset)
                ))
            }
        }
    }
}
