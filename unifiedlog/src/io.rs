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

//! IO layer.
//!
//! Every artifact handled by this crate is small enough to be mapped in memory in one go, so the
//! readers all work on top of a [BorrowingCursor] over a byte slice.

use core::mem::size_of;
use std::{io, io::ErrorKind};

use uuid::Uuid;

use crate::header::{MemOffset, MemSize};

/// Core operations of an input that can be consumed by the readers of this library.
///
/// All the returned slices borrow from the underlying buffer rather than from the reader itself,
/// so they can outlive the reader.
pub trait BorrowingReadCore<'a> {
    /// Read the specified number of bytes.
    fn read(&mut self, count: MemSize) -> io::Result<&'a [u8]>;
    /// Read a null-terminated C-style string, without the terminator.
    fn read_null_terminated(&mut self) -> io::Result<&'a [u8]>;
}

/// Convenience functions on top of [BorrowingReadCore].
pub trait BorrowingRead<'a>: BorrowingReadCore<'a> {
    /// Read a little-endian integer from the input.
    #[inline]
    fn read_int<T>(&mut self) -> io::Result<T>
    where
        T: DecodeBinary,
    {
        DecodeBinary::decode(self.read(size_of::<T>())?)
    }

    /// Read a UUID stored in RFC 4122 byte order.
    #[inline]
    fn read_uuid(&mut self) -> io::Result<Uuid> {
        let buf = self.read(16)?;
        match buf.try_into() {
            Ok(bytes) => Ok(Uuid::from_bytes(bytes)),
            Err(_) => Err(ErrorKind::UnexpectedEof.into()),
        }
    }

    /// Read a given tag (typically an ASCII signature) from the input.
    ///
    /// The outer [Result] layer deals with I/O errors, the inner layer reflects whether the tag
    /// was recognized or not.
    #[inline]
    fn read_tag(&mut self, tag: &[u8]) -> io::Result<Result<(), ()>> {
        let buf = self.read(tag.len())?;
        Ok(if buf == tag { Ok(()) } else { Err(()) })
    }

    /// Read a fixed-size field holding a NUL-padded string.
    #[inline]
    fn read_padded_str(&mut self, count: MemSize) -> io::Result<String> {
        Ok(padded_str(self.read(count)?))
    }
}

impl<'a, T: BorrowingReadCore<'a> + ?Sized> BorrowingRead<'a> for T {}

/// Cursor reading a byte slice sequentially.
#[derive(Debug, Clone)]
pub struct BorrowingCursor<'a> {
    buf: &'a [u8],
    offset: MemOffset,
}

impl<'a> BorrowingCursor<'a> {
    #[inline]
    pub fn new(buf: &'a [u8]) -> Self {
        BorrowingCursor { buf, offset: 0 }
    }

    /// Current offset from the start of the underlying buffer.
    #[inline]
    pub fn offset(&self) -> MemOffset {
        self.offset
    }

    /// Number of bytes left to read.
    #[inline]
    pub fn remaining(&self) -> MemSize {
        self.buf.len() - self.offset
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// The bytes left to read, without consuming them.
    #[inline]
    pub fn rest(&self) -> &'a [u8] {
        &self.buf[self.offset..]
    }

    /// Seek to an absolute location in the underlying buffer.
    #[inline]
    pub fn abs_seek(&mut self, offset: MemOffset) -> io::Result<()> {
        if offset > self.buf.len() {
            Err(ErrorKind::UnexpectedEof.into())
        } else {
            self.offset = offset;
            Ok(())
        }
    }

    /// Skip the padding needed to bring the offset relative to `base` to a multiple of `align`.
    ///
    /// Padding missing at the end of the buffer is tolerated.
    #[inline]
    pub fn align(&mut self, base: MemOffset, align: MemSize) {
        let pad = padding(self.offset - base, align);
        self.offset = core::cmp::min(self.offset + pad, self.buf.len());
    }

    #[inline]
    fn advance(&mut self, count: MemSize) -> io::Result<&'a [u8]> {
        match self.offset.checked_add(count) {
            Some(end) if end <= self.buf.len() => {
                let range = self.offset..end;
                self.offset = end;
                Ok(&self.buf[range])
            }
            _ => Err(ErrorKind::UnexpectedEof.into()),
        }
    }
}

impl<'a> BorrowingReadCore<'a> for BorrowingCursor<'a> {
    #[inline]
    fn read(&mut self, count: MemSize) -> io::Result<&'a [u8]> {
        self.advance(count)
    }

    fn read_null_terminated(&mut self) -> io::Result<&'a [u8]> {
        let buf = self.buf;
        match buf[self.offset..].iter().position(|x| *x == 0) {
            Some(end) => {
                let range = self.offset..(self.offset + end);
                self.advance(end + 1)?;
                Ok(&buf[range])
            }
            None => {
                self.offset = buf.len();
                Err(ErrorKind::UnexpectedEof.into())
            }
        }
    }
}

/// Number of bytes needed to pad `size` to a multiple of `align`.
#[inline]
pub fn padding(size: MemSize, align: MemSize) -> MemSize {
    (align - (size % align)) % align
}

/// Decode a string stored in a fixed-size field, up to the first NUL byte.
pub fn padded_str(buf: &[u8]) -> String {
    let end = buf.iter().position(|x| *x == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

/// Decode the null-terminated string starting at `offset` in `buf`.
///
/// [None] is returned if `offset` is out of bounds. A missing terminator is tolerated and the
/// string then spans until the end of the buffer.
pub fn c_str_at(buf: &[u8], offset: MemOffset) -> Option<&[u8]> {
    let buf = buf.get(offset..)?;
    let end = buf.iter().position(|x| *x == 0).unwrap_or(buf.len());
    Some(&buf[..end])
}

/// Types that can be decoded from their little-endian binary representation.
pub trait DecodeBinary: Sized {
    fn decode(buf: &[u8]) -> io::Result<Self>;
}

macro_rules! impl_DecodeBinary {
    ( $($ty:ty),* ) => {
        $(
            impl DecodeBinary for $ty {
                #[inline]
                fn decode(buf: &[u8]) -> io::Result<Self> {
                    match buf.try_into() {
                        Ok(buf) => Ok(Self::from_le_bytes(buf)),
                        Err(_) => Err(ErrorKind::UnexpectedEof.into())
                    }
                }
            }
        )*
    }
}

impl_DecodeBinary!(u8, u16, u32, u64, i8, i16, i32, i64);
