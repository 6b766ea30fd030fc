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

//! Errors reported while decoding unified logging artifacts.

use std::io;

use crate::header::FileOffset;

macro_rules! convert_err_impl {
    ($src:path, $variant:ident, $dst:ident) => {
        impl From<$src> for $dst {
            fn from(err: $src) -> Self {
                $dst::$variant(Box::new(err.into()))
            }
        }
    };
}

/// Error kinds of every reader in this crate.
///
/// [ParseError::MalformedHeader] and [ParseError::DecompressionFailure] are fatal for the file or
/// chunk-set they were raised for. [ParseError::TruncatedData] and
/// [ParseError::UnsupportedFlagsCombination] abort a single record, and
/// [ParseError::UnresolvedReference] is only ever reported alongside a degraded record.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ParseError {
    #[error("Malformed header: {0}")]
    MalformedHeader(String),

    #[error("Unexpected end of data")]
    TruncatedData,

    #[error("Unsupported combination of tracepoint flags: {flags:#06x}")]
    UnsupportedFlagsCombination { flags: u16 },

    #[error("Could not resolve {0}")]
    UnresolvedReference(String),

    #[error("Could not decompress chunk-set: {0}")]
    DecompressionFailure(String),

    #[error("Error while loading data: {0}")]
    IoError(Box<io::ErrorKind>),

    #[error("Error in chunk with tag {tag:#06x} at offset {offset}: {inner}")]
    InChunk {
        tag: u32,
        offset: FileOffset,
        inner: Box<ParseError>,
    },
}
convert_err_impl!(io::ErrorKind, IoError, ParseError);

impl From<io::Error> for ParseError {
    fn from(err: io::Error) -> ParseError {
        match err.kind() {
            io::ErrorKind::UnexpectedEof => ParseError::TruncatedData,
            kind => kind.into(),
        }
    }
}

impl ParseError {
    /// Attach the location of the chunk that was being decoded when the error happened.
    pub fn in_chunk(self, tag: u32, offset: FileOffset) -> ParseError {
        match self {
            // Keep the innermost location, it is the most precise one.
            err @ ParseError::InChunk { .. } => err,
            err => ParseError::InChunk {
                tag,
                offset,
                inner: Box::new(err),
            },
        }
    }

    /// Return the error stripped from any chunk location context.
    pub fn root(&self) -> &ParseError {
        match self {
            ParseError::InChunk { inner, .. } => inner.root(),
            err => err,
        }
    }
}
