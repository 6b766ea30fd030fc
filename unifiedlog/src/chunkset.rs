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

//! Chunk-sets (tag 0x600d): compressed groups of firehose, oversize, statedump and simpledump
//! chunks.

use crate::{
    catalog::Catalog,
    chunk::{Chunk, ChunkIter, ChunkKind},
    compress::{Decompressor, decompress_chunkset},
    dump::{SimpleDumpChunk, StateDumpChunk},
    error::ParseError,
    firehose::FirehoseChunk,
    oversize::OversizeChunk,
};

/// Decoded chunk of a chunk-set.
#[derive(Debug, Clone)]
pub enum ChunkSetRecord<'a> {
    Firehose(FirehoseChunk<'a>),
    Oversize(OversizeChunk),
    StateDump(StateDumpChunk),
    SimpleDump(SimpleDumpChunk),
    Catalog(Box<Catalog>),
    /// Chunk with a tag this library does not know about, skipped.
    Unknown { tag: u32, size: u64 },
}

impl<'a> ChunkSetRecord<'a> {
    pub(crate) fn parse(chunk: &Chunk<'a>) -> Result<ChunkSetRecord<'a>, ParseError> {
        Ok(match chunk.kind() {
            ChunkKind::Firehose => ChunkSetRecord::Firehose(FirehoseChunk::parse(chunk.data)?),
            ChunkKind::Oversize => ChunkSetRecord::Oversize(OversizeChunk::parse(chunk.data)?),
            ChunkKind::StateDump => ChunkSetRecord::StateDump(StateDumpChunk::parse(chunk.data)?),
            ChunkKind::SimpleDump => {
                ChunkSetRecord::SimpleDump(SimpleDumpChunk::parse(chunk.data)?)
            }
            ChunkKind::Catalog => ChunkSetRecord::Catalog(Box::new(Catalog::parse(chunk.data)?)),
            _ => {
                log::debug!(
                    "Skipping chunk with unknown tag {:#06x} in chunk-set at offset {}",
                    chunk.header.tag,
                    chunk.offset
                );
                ChunkSetRecord::Unknown {
                    tag: chunk.header.tag,
                    size: chunk.header.data_size,
                }
            }
        })
    }
}

/// Decompressed content of a chunk-set.
#[derive(Debug, Clone)]
pub struct ChunkSet {
    data: Vec<u8>,
}

impl ChunkSet {
    pub fn decompress<D>(payload: &[u8], decompressor: &D) -> Result<ChunkSet, ParseError>
    where
        D: Decompressor + ?Sized,
    {
        Ok(ChunkSet {
            data: decompress_chunkset(payload, decompressor)?,
        })
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Iterate over the chunks of the set.
    ///
    /// A chunk that cannot be decoded is reported as an error carrying its location, and
    /// iteration carries on with the next chunk.
    pub fn records(&self) -> impl Iterator<Item = Result<ChunkSetRecord<'_>, ParseError>> {
        ChunkIter::new(&self.data).map(|chunk| {
            let chunk = chunk?;
            ChunkSetRecord::parse(&chunk).map_err(|err| chunk.error(err))
        })
    }
}
