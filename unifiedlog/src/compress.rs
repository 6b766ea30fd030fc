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

//! Decompression of chunk-set payloads.

use core::fmt::{Debug, Formatter};
use std::io;

use crate::{
    error::ParseError,
    header::MemSize,
    io::{BorrowingCursor, BorrowingRead as _, BorrowingReadCore as _},
};

pub trait Decompressor: Send + Sync {
    fn decompress_into(&self, src: &[u8], dst: &mut [u8]) -> io::Result<()>;

    fn decompress(&self, src: &[u8], dst_count: MemSize) -> io::Result<Vec<u8>> {
        let mut buffer = vec![0; dst_count];
        self.decompress_into(src, &mut buffer)?;
        Ok(buffer)
    }
}

/// Decompressor for the LZ4 block format used in chunk-sets.
#[derive(Default, Clone, Copy)]
pub struct Lz4Decompressor;

impl Lz4Decompressor {
    pub fn new() -> Self {
        Lz4Decompressor
    }
}

impl Debug for Lz4Decompressor {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), core::fmt::Error> {
        f.debug_struct("Lz4Decompressor").finish_non_exhaustive()
    }
}

impl Decompressor for Lz4Decompressor {
    fn decompress_into(&self, src: &[u8], dst: &mut [u8]) -> io::Result<()> {
        let count = lz4_flex::block::decompress_into(src, dst).map_err(io::Error::other)?;
        if count == dst.len() {
            Ok(())
        } else {
            Err(io::Error::other(format!(
                "LZ4 expected {} bytes, decompressed {count}",
                dst.len()
            )))
        }
    }
}

const LZ4_BLOCK_MAGIC: &[u8; 4] = b"bv41";
const STORED_BLOCK_MAGIC: &[u8; 4] = b"bv4-";
const END_MAGIC: &[u8; 4] = b"bv4$";

/// Undo the block framing of a chunk-set payload and return the concatenated content of all the
/// blocks.
pub fn decompress_chunkset<D>(payload: &[u8], decompressor: &D) -> Result<Vec<u8>, ParseError>
where
    D: Decompressor + ?Sized,
{
    let failure = |msg: String| ParseError::DecompressionFailure(msg);
    let truncated = |_| failure("truncated block".into());

    let mut cursor = BorrowingCursor::new(payload);
    let mut out = Vec::new();

    loop {
        if cursor.is_empty() {
            log::debug!("Chunk-set payload ended without an end marker");
            break;
        }
        let magic = cursor.read(4).map_err(truncated)?;
        match magic {
            magic if magic == LZ4_BLOCK_MAGIC => {
                let uncompressed_size: u32 = cursor.read_int().map_err(truncated)?;
                let compressed_size: u32 = cursor.read_int().map_err(truncated)?;
                let src = cursor.read(compressed_size as usize).map_err(truncated)?;

                let start = out.len();
                out.resize(start + uncompressed_size as usize, 0);
                decompressor
                    .decompress_into(src, &mut out[start..])
                    .map_err(|err| failure(err.to_string()))?;
            }
            magic if magic == STORED_BLOCK_MAGIC => {
                let size: u32 = cursor.read_int().map_err(truncated)?;
                out.extend_from_slice(cursor.read(size as usize).map_err(truncated)?);
            }
            magic if magic == END_MAGIC => break,
            magic => {
                return Err(failure(format!("unknown block signature {magic:02x?}")));
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Wrap `data` in a single LZ4 block followed by the end marker.
    pub(crate) fn make_chunkset_payload(data: &[u8]) -> Vec<u8> {
        let compressed = lz4_flex::block::compress(data);
        let mut buf = Vec::new();
        buf.extend(LZ4_BLOCK_MAGIC);
        buf.extend((data.len() as u32).to_le_bytes());
        buf.extend((compressed.len() as u32).to_le_bytes());
        buf.extend(compressed);
        buf.extend(END_MAGIC);
        buf
    }

    #[test]
    fn lz4_test() {
        let data: Vec<u8> = (0..4096u32).map(|x| (x % 7) as u8).collect();
        let payload = make_chunkset_payload(&data);
        assert!(payload.len() < data.len());

        let decompressed = decompress_chunkset(&payload, &Lz4Decompressor::new()).unwrap();
        assert_eq!(decompressed, data);
    }

    #[test]
    fn stored_block_test() {
        let mut payload = Vec::new();
        payload.extend(STORED_BLOCK_MAGIC);
        payload.extend(3u32.to_le_bytes());
        payload.extend([1, 2, 3]);
        payload.extend(make_chunkset_payload(&[4, 5, 6, 7]));

        let decompressed = decompress_chunkset(&payload, &Lz4Decompressor::new()).unwrap();
        assert_eq!(decompressed, vec![1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn corrupt_payload_test() {
        let decompressor = Lz4Decompressor::new();

        let mut payload = make_chunkset_payload(&[0x42; 512]);
        // Claim a larger uncompressed size than what the block really holds.
        payload[4..8].copy_from_slice(&1024u32.to_le_bytes());
        assert!(matches!(
            decompress_chunkset(&payload, &decompressor),
            Err(ParseError::DecompressionFailure(_))
        ));

        assert!(matches!(
            decompress_chunkset(b"bv42\0\0\0\0", &decompressor),
            Err(ParseError::DecompressionFailure(_))
        ));

        let payload = make_chunkset_payload(&[0x42; 512]);
        assert!(matches!(
            decompress_chunkset(&payload[..14], &decompressor),
            Err(ParseError::DecompressionFailure(_))
        ));
    }
}
