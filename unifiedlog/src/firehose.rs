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

//! Firehose chunks (tag 0x6001) and the tracepoints they contain.

use bitflags::bitflags;
use uuid::Uuid;

use crate::{
    error::ParseError,
    format::Argument,
    header::{ContinuousTime, MemOffset, MemSize},
    io::{BorrowingCursor, BorrowingRead as _, BorrowingReadCore as _},
};

const PREAMBLE_SIZE: MemSize = 32;
const TRACEPOINT_HEADER_SIZE: MemSize = 24;
/// Virtual offset meaning the chunk carries no private data.
const NO_PRIVATE_DATA: u16 = 0x1000;

const FORMATTER_MASK: u16 = 0x000e;

bitflags! {
    /// Flags of a tracepoint, selecting which optional fields are present.
    ///
    /// Bits 1 to 3 hold the formatter type, see [FormatterKind].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct TracepointFlags: u16 {
        const HasCurrentAid = 0x0001;
        const HasUniquePid = 0x0010;
        const HasLargeOffset = 0x0020;
        const HasPrivateDataRange = 0x0100;
        /// Subsystem identifier for log and signpost tracepoints, other activity identifier for
        /// activity tracepoints.
        const HasSubsystem = 0x0200;
        const HasRules = 0x0400;
        const HasDataRef = 0x0800;
        const HasContextData = 0x1000;
        const HasSignpostName = 0x8000;

        const _ = !0;
    }
}

impl TracepointFlags {
    #[inline]
    fn formatter_bits(&self) -> u16 {
        self.bits() & FORMATTER_MASK
    }
}

/// Where the format string of a tracepoint is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FormatterKind {
    /// UUIDText file of the main executable of the process.
    MainExe,
    /// Shared cache strings file.
    SharedCache,
    /// UUIDText file of the image mapped at an absolute address.
    Absolute,
    /// UUIDText file of an image given by UUID.
    UuidRelative,
    /// Shared cache strings file, with locations beyond 32 bits.
    LargeSharedCache,
}

impl FormatterKind {
    pub fn from_flags(flags: TracepointFlags) -> Result<FormatterKind, ParseError> {
        match flags.formatter_bits() {
            0x0002 => Ok(FormatterKind::MainExe),
            0x0004 => Ok(FormatterKind::SharedCache),
            0x0008 => Ok(FormatterKind::Absolute),
            0x000a => Ok(FormatterKind::UuidRelative),
            0x000c => Ok(FormatterKind::LargeSharedCache),
            _ => Err(ParseError::UnsupportedFlagsCombination {
                flags: flags.bits(),
            }),
        }
    }

    #[inline]
    pub fn is_shared_cache(&self) -> bool {
        matches!(
            self,
            FormatterKind::SharedCache | FormatterKind::LargeSharedCache
        )
    }
}

/// Fields locating the format string and the code that emitted the tracepoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Formatter {
    pub kind: FormatterKind,
    pub load_address_lower: u32,
    pub load_address_upper: u16,
    pub uuid: Option<Uuid>,
    pub large_offset_data: u16,
    pub large_shared_cache_data: u16,
}

impl Formatter {
    fn parse(
        cursor: &mut BorrowingCursor<'_>,
        flags: TracepointFlags,
    ) -> Result<Formatter, ParseError> {
        let kind = FormatterKind::from_flags(flags)?;
        let load_address_lower = cursor.read_int()?;

        let load_address_upper = match kind {
            FormatterKind::Absolute => cursor.read_int()?,
            _ => 0,
        };
        let uuid = match kind {
            FormatterKind::UuidRelative => Some(cursor.read_uuid()?),
            _ => None,
        };
        let large_offset_data = if flags.contains(TracepointFlags::HasLargeOffset) {
            cursor.read_int()?
        } else {
            0
        };
        let large_shared_cache_data = match kind {
            FormatterKind::LargeSharedCache => cursor.read_int()?,
            _ => 0,
        };

        Ok(Formatter {
            kind,
            load_address_lower,
            load_address_upper,
            uuid,
            large_offset_data,
            large_shared_cache_data,
        })
    }

    /// Address of the code that emitted the tracepoint.
    ///
    /// This is an absolute address for [FormatterKind::Absolute] and an offset in the image
    /// otherwise.
    #[inline]
    pub fn program_counter(&self) -> u64 {
        (u64::from(self.load_address_upper) << 32) | u64::from(self.load_address_lower)
    }
}

/// Compute the location of a format string in its strings file.
pub fn resolve_format_string_location(
    flags: u16,
    format_string_location: u32,
    large_offset_data: u16,
    large_shared_cache_data: u16,
) -> u64 {
    let location = u64::from(format_string_location);
    if flags & FORMATTER_MASK == 0x000c && large_shared_cache_data != 0 {
        location | (u64::from(large_shared_cache_data) << 31)
    } else if large_offset_data != 0 {
        (u64::from(large_offset_data >> 1) << 32) | location | 0x8000_0000
    } else {
        location
    }
}

/// Range of the chunk private data holding the private arguments of a tracepoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrivateDataRange {
    /// Virtual offset, see [FirehosePreamble::private_data_virtual_offset].
    pub offset: u16,
    pub size: u16,
}

/// Location of an argument value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataItemValue {
    Inline(Vec<u8>),
    /// Range in the value area that follows the item descriptors, or in the private data for
    /// private items.
    Range { offset: u16, size: u16 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemKind {
    Number,
    Precision,
    String,
    Object,
    Data,
    Unknown,
}

impl ItemKind {
    fn of(item_type: u8) -> ItemKind {
        match item_type {
            0x00..=0x02 => ItemKind::Number,
            0x10 | 0x12 => ItemKind::Precision,
            0x20..=0x22 | 0x25 | 0x81 => ItemKind::String,
            0x30..=0x35 | 0xf1 | 0xf2 => ItemKind::Data,
            0x40..=0x45 => ItemKind::Object,
            _ => ItemKind::Unknown,
        }
    }

    #[inline]
    fn is_range(&self) -> bool {
        matches!(self, ItemKind::String | ItemKind::Object | ItemKind::Data)
    }
}

#[inline]
fn is_private_item(item_type: u8) -> bool {
    matches!(item_type, 0x01 | 0x21 | 0x25 | 0x31 | 0x35 | 0x41 | 0x45)
}

/// Argument of a tracepoint, as serialized in its data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataItem {
    pub item_type: u8,
    pub item_size: u8,
    pub value: DataItemValue,
}

impl DataItem {
    #[inline]
    pub fn is_private(&self) -> bool {
        is_private_item(self.item_type)
    }

    /// Decode the argument.
    ///
    /// `values` is the public value area and `private` is the private data of the chunk, already
    /// sliced to start at the private range of the tracepoint.
    pub fn argument(&self, values: &[u8], private: Option<&[u8]>) -> Argument {
        let kind = ItemKind::of(self.item_type);
        match &self.value {
            DataItemValue::Inline(_) if self.is_private() => Argument::Private,
            DataItemValue::Inline(bytes) => match kind {
                ItemKind::Number => Argument::integer(bytes),
                ItemKind::Precision => Argument::Precision(Argument::integer(bytes).as_unsigned()),
                _ => Argument::Data(bytes.clone()),
            },
            DataItemValue::Range { offset, size } => {
                let buf = if self.is_private() {
                    match private {
                        Some(private) => private,
                        None => return Argument::Private,
                    }
                } else {
                    values
                };
                let start = usize::from(*offset);
                let end = start + usize::from(*size);
                match buf.get(start..end) {
                    None => Argument::Missing,
                    Some(bytes) => match kind {
                        ItemKind::String | ItemKind::Object if bytes.is_empty() => {
                            Argument::String("(null)".into())
                        }
                        ItemKind::String | ItemKind::Object => {
                            let end = bytes.iter().position(|x| *x == 0).unwrap_or(bytes.len());
                            Argument::String(String::from_utf8_lossy(&bytes[..end]).into_owned())
                        }
                        _ => Argument::Data(bytes.to_vec()),
                    },
                }
            }
        }
    }
}

/// Arguments of a tracepoint or oversize chunk.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DataItems {
    pub unknown: u8,
    pub items: Vec<DataItem>,
    /// Value area following the item descriptors.
    pub values: Vec<u8>,
}

impl DataItems {
    /// Parse the item descriptors and take the rest of the input as the value area.
    pub fn parse(cursor: &mut BorrowingCursor<'_>) -> Result<DataItems, ParseError> {
        let unknown = cursor.read_int()?;
        let number_of_items: u8 = cursor.read_int()?;

        let items = (0..number_of_items)
            .map(|_| -> Result<_, ParseError> {
                let item_type: u8 = cursor.read_int()?;
                let item_size: u8 = cursor.read_int()?;
                let value = if ItemKind::of(item_type).is_range() {
                    let offset = cursor.read_int()?;
                    let size = cursor.read_int()?;
                    DataItemValue::Range { offset, size }
                } else {
                    DataItemValue::Inline(cursor.read(item_size.into())?.to_vec())
                };
                Ok(DataItem {
                    item_type,
                    item_size,
                    value,
                })
            })
            .collect::<Result<_, _>>()?;

        let values = cursor.read(cursor.remaining())?.to_vec();
        Ok(DataItems {
            unknown,
            items,
            values,
        })
    }

    /// Parse the data items if there is any data left in the input.
    fn parse_opt(cursor: &mut BorrowingCursor<'_>) -> Result<DataItems, ParseError> {
        if cursor.remaining() < 2 {
            Ok(DataItems::default())
        } else {
            DataItems::parse(cursor)
        }
    }

    pub fn arguments(&self, private: Option<&[u8]>) -> Vec<Argument> {
        self.items
            .iter()
            .map(|item| item.argument(&self.values, private))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityPayload {
    pub current_aid: Option<u64>,
    pub unique_pid: Option<u64>,
    pub other_aid: Option<u64>,
    pub new_aid: Option<u64>,
    pub formatter: Formatter,
    pub items: DataItems,
}

/// Log type of an activity tracepoint recording a user action, which does not create a new
/// activity.
pub const ACTIVITY_USER_ACTION: u8 = 0x03;

impl ActivityPayload {
    pub fn parse(
        log_type: u8,
        flags: TracepointFlags,
        data: &[u8],
    ) -> Result<ActivityPayload, ParseError> {
        FormatterKind::from_flags(flags)?;
        let mut cursor = BorrowingCursor::new(data);

        let mut read_opt = |flag: bool| -> Result<Option<u64>, ParseError> {
            Ok(if flag { Some(cursor.read_int()?) } else { None })
        };
        let current_aid = read_opt(flags.contains(TracepointFlags::HasCurrentAid))?;
        let unique_pid = read_opt(flags.contains(TracepointFlags::HasUniquePid))?;
        let other_aid = read_opt(flags.contains(TracepointFlags::HasSubsystem))?;
        let new_aid = read_opt(log_type != ACTIVITY_USER_ACTION)?;

        let formatter = Formatter::parse(&mut cursor, flags)?;
        let items = DataItems::parse_opt(&mut cursor)?;

        Ok(ActivityPayload {
            current_aid,
            unique_pid,
            other_aid,
            new_aid,
            formatter,
            items,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogPayload {
    pub current_aid: Option<u64>,
    pub private_data_range: Option<PrivateDataRange>,
    pub formatter: Formatter,
    pub subsystem: Option<u16>,
    pub ttl: Option<u8>,
    pub data_ref: Option<u16>,
    pub items: DataItems,
}

impl LogPayload {
    pub fn parse(flags: TracepointFlags, data: &[u8]) -> Result<LogPayload, ParseError> {
        FormatterKind::from_flags(flags)?;
        let mut cursor = BorrowingCursor::new(data);

        let current_aid = read_if(&mut cursor, flags, TracepointFlags::HasCurrentAid)?;
        let private_data_range = read_private_range(&mut cursor, flags)?;
        let formatter = Formatter::parse(&mut cursor, flags)?;
        let subsystem = read_if(&mut cursor, flags, TracepointFlags::HasSubsystem)?;
        let ttl = read_if(&mut cursor, flags, TracepointFlags::HasRules)?;
        let data_ref = read_if(&mut cursor, flags, TracepointFlags::HasDataRef)?;
        let items = DataItems::parse_opt(&mut cursor)?;

        Ok(LogPayload {
            current_aid,
            private_data_range,
            formatter,
            subsystem,
            ttl,
            data_ref,
            items,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignpostPayload {
    pub current_aid: Option<u64>,
    pub private_data_range: Option<PrivateDataRange>,
    pub unique_pid: Option<u64>,
    pub formatter: Formatter,
    pub subsystem: Option<u16>,
    pub signpost_id: u64,
    pub ttl: Option<u8>,
    pub data_ref: Option<u16>,
    pub name: Option<u32>,
    pub items: DataItems,
}

impl SignpostPayload {
    pub fn parse(flags: TracepointFlags, data: &[u8]) -> Result<SignpostPayload, ParseError> {
        FormatterKind::from_flags(flags)?;
        let mut cursor = BorrowingCursor::new(data);

        let current_aid = read_if(&mut cursor, flags, TracepointFlags::HasCurrentAid)?;
        let private_data_range = read_private_range(&mut cursor, flags)?;
        let unique_pid = read_if(&mut cursor, flags, TracepointFlags::HasUniquePid)?;
        let formatter = Formatter::parse(&mut cursor, flags)?;
        let subsystem = read_if(&mut cursor, flags, TracepointFlags::HasSubsystem)?;
        let signpost_id = cursor.read_int()?;
        let ttl = read_if(&mut cursor, flags, TracepointFlags::HasRules)?;
        let data_ref = read_if(&mut cursor, flags, TracepointFlags::HasDataRef)?;
        let name = read_if(&mut cursor, flags, TracepointFlags::HasSignpostName)?;
        let items = DataItems::parse_opt(&mut cursor)?;

        Ok(SignpostPayload {
            current_aid,
            private_data_range,
            unique_pid,
            formatter,
            subsystem,
            signpost_id,
            ttl,
            data_ref,
            name,
            items,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LossPayload {
    pub start_time: ContinuousTime,
    pub end_time: ContinuousTime,
    pub number_of_messages: u64,
}

impl LossPayload {
    pub fn parse(flags: TracepointFlags, data: &[u8]) -> Result<LossPayload, ParseError> {
        if flags.formatter_bits() != 0 {
            return Err(ParseError::UnsupportedFlagsCombination {
                flags: flags.bits(),
            });
        }
        let mut cursor = BorrowingCursor::new(data);
        Ok(LossPayload {
            start_time: cursor.read_int()?,
            end_time: cursor.read_int()?,
            number_of_messages: cursor.read_int()?,
        })
    }
}

#[inline]
fn read_if<T>(
    cursor: &mut BorrowingCursor<'_>,
    flags: TracepointFlags,
    flag: TracepointFlags,
) -> Result<Option<T>, ParseError>
where
    T: crate::io::DecodeBinary,
{
    Ok(if flags.contains(flag) {
        Some(cursor.read_int()?)
    } else {
        None
    })
}

fn read_private_range(
    cursor: &mut BorrowingCursor<'_>,
    flags: TracepointFlags,
) -> Result<Option<PrivateDataRange>, ParseError> {
    Ok(if flags.contains(TracepointFlags::HasPrivateDataRange) {
        Some(PrivateDataRange {
            offset: cursor.read_int()?,
            size: cursor.read_int()?,
        })
    } else {
        None
    })
}

pub const ACTIVITY_TYPE_ACTIVITY: u8 = 0x02;
pub const ACTIVITY_TYPE_TRACE: u8 = 0x03;
pub const ACTIVITY_TYPE_LOG: u8 = 0x04;
pub const ACTIVITY_TYPE_SIGNPOST: u8 = 0x06;
pub const ACTIVITY_TYPE_LOSS: u8 = 0x07;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TracepointPayload {
    Activity(ActivityPayload),
    Log(LogPayload),
    Signpost(SignpostPayload),
    Loss(LossPayload),
    /// Tracepoint of a type that is not decoded. Its data is skipped.
    Unsupported { activity_type: u8 },
}

impl TracepointPayload {
    pub fn parse(
        activity_type: u8,
        log_type: u8,
        flags: TracepointFlags,
        data: &[u8],
    ) -> Result<TracepointPayload, ParseError> {
        Ok(match activity_type {
            ACTIVITY_TYPE_ACTIVITY => {
                TracepointPayload::Activity(ActivityPayload::parse(log_type, flags, data)?)
            }
            ACTIVITY_TYPE_LOG => TracepointPayload::Log(LogPayload::parse(flags, data)?),
            ACTIVITY_TYPE_SIGNPOST => {
                TracepointPayload::Signpost(SignpostPayload::parse(flags, data)?)
            }
            ACTIVITY_TYPE_LOSS => TracepointPayload::Loss(LossPayload::parse(flags, data)?),
            activity_type => TracepointPayload::Unsupported { activity_type },
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tracepoint {
    /// Offset of the tracepoint in the firehose chunk.
    pub offset: MemOffset,
    pub activity_type: u8,
    pub log_type: u8,
    pub flags: TracepointFlags,
    pub format_string_location: u32,
    pub thread_id: u64,
    pub continuous_time: ContinuousTime,
    pub payload: TracepointPayload,
}

impl Tracepoint {
    pub fn formatter(&self) -> Option<&Formatter> {
        match &self.payload {
            TracepointPayload::Activity(payload) => Some(&payload.formatter),
            TracepointPayload::Log(payload) => Some(&payload.formatter),
            TracepointPayload::Signpost(payload) => Some(&payload.formatter),
            _ => None,
        }
    }

    pub fn items(&self) -> Option<&DataItems> {
        match &self.payload {
            TracepointPayload::Activity(payload) => Some(&payload.items),
            TracepointPayload::Log(payload) => Some(&payload.items),
            TracepointPayload::Signpost(payload) => Some(&payload.items),
            _ => None,
        }
    }

    pub fn private_data_range(&self) -> Option<PrivateDataRange> {
        match &self.payload {
            TracepointPayload::Log(payload) => payload.private_data_range,
            TracepointPayload::Signpost(payload) => payload.private_data_range,
            _ => None,
        }
    }

    pub fn subsystem(&self) -> Option<u16> {
        match &self.payload {
            TracepointPayload::Log(payload) => payload.subsystem,
            TracepointPayload::Signpost(payload) => payload.subsystem,
            _ => None,
        }
    }

    pub fn data_ref(&self) -> Option<u16> {
        match &self.payload {
            TracepointPayload::Log(payload) => payload.data_ref,
            TracepointPayload::Signpost(payload) => payload.data_ref,
            _ => None,
        }
    }

    pub fn ttl(&self) -> Option<u8> {
        match &self.payload {
            TracepointPayload::Log(payload) => payload.ttl,
            TracepointPayload::Signpost(payload) => payload.ttl,
            _ => None,
        }
    }

    /// Resolved location of the format string, for tracepoints that have one.
    pub fn format_string_location(&self) -> Option<u64> {
        let formatter = self.formatter()?;
        Some(resolve_format_string_location(
            self.flags.bits(),
            self.format_string_location,
            formatter.large_offset_data,
            formatter.large_shared_cache_data,
        ))
    }

    /// Whether the format string is not stored but passed as the first argument.
    ///
    /// This is signaled by the high bit of the location, for images other than the shared cache.
    pub fn has_dynamic_format_string(&self) -> bool {
        match self.formatter() {
            Some(formatter) => {
                !formatter.kind.is_shared_cache()
                    && formatter.large_offset_data == 0
                    && self.format_string_location & 0x8000_0000 != 0
            }
            None => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirehosePreamble {
    pub proc_id_upper: u64,
    pub proc_id_lower: u32,
    pub ttl: u8,
    pub collapsed: u8,
    pub public_data_size: u16,
    /// Virtual offset at which the private data starts, 0x1000 if there is none.
    pub private_data_virtual_offset: u16,
    pub base_continuous_time: ContinuousTime,
}

/// Firehose chunk borrowed from its chunk-set.
#[derive(Debug, Clone)]
pub struct FirehoseChunk<'a> {
    pub preamble: FirehosePreamble,
    public_data: &'a [u8],
    private_data: Option<&'a [u8]>,
}

impl<'a> FirehoseChunk<'a> {
    pub fn parse(data: &'a [u8]) -> Result<FirehoseChunk<'a>, ParseError> {
        let mut cursor = BorrowingCursor::new(data);
        let proc_id_upper = cursor.read_int()?;
        let proc_id_lower = cursor.read_int()?;
        let ttl = cursor.read_int()?;
        let collapsed = cursor.read_int()?;
        cursor.read(2)?;
        let public_data_size: u16 = cursor.read_int()?;
        let private_data_virtual_offset: u16 = cursor.read_int()?;
        cursor.read(4)?;
        let base_continuous_time = cursor.read_int()?;

        let public_end = 16 + usize::from(public_data_size);
        if public_end < PREAMBLE_SIZE {
            return Err(ParseError::MalformedHeader(format!(
                "firehose public data size too small: {public_data_size}"
            )));
        }
        let public_data = data.get(PREAMBLE_SIZE..public_end).ok_or(ParseError::TruncatedData)?;

        let private_data = if private_data_virtual_offset >= NO_PRIVATE_DATA {
            None
        } else {
            let size = usize::from(NO_PRIVATE_DATA - private_data_virtual_offset);
            match data.len().checked_sub(size) {
                Some(start) if start >= public_end => Some(&data[start..]),
                _ => {
                    log::warn!("Firehose chunk private data of {size} bytes is out of bounds");
                    None
                }
            }
        };

        Ok(FirehoseChunk {
            preamble: FirehosePreamble {
                proc_id_upper,
                proc_id_lower,
                ttl,
                collapsed,
                public_data_size,
                private_data_virtual_offset,
                base_continuous_time,
            },
            public_data,
            private_data,
        })
    }

    pub fn tracepoints(&self) -> TracepointIter<'a> {
        TracepointIter {
            cursor: BorrowingCursor::new(self.public_data),
            base_continuous_time: self.preamble.base_continuous_time,
            done: false,
        }
    }

    #[inline]
    pub fn private_data(&self) -> Option<&'a [u8]> {
        self.private_data
    }

    /// Private data of a tracepoint, starting at the beginning of its private range.
    pub fn private_data_for(&self, range: PrivateDataRange) -> Option<&'a [u8]> {
        let start = range
            .offset
            .checked_sub(self.preamble.private_data_virtual_offset)?;
        self.private_data?.get(usize::from(start)..)
    }
}

/// Iterator over the tracepoints of a firehose chunk.
///
/// Decoding errors of a single tracepoint are yielded and iteration resumes at the next one. An
/// error in the tracepoint header itself ends the iteration.
#[derive(Debug, Clone)]
pub struct TracepointIter<'a> {
    cursor: BorrowingCursor<'a>,
    base_continuous_time: ContinuousTime,
    done: bool,
}

struct RawTracepoint<'a> {
    offset: MemOffset,
    activity_type: u8,
    log_type: u8,
    flags: TracepointFlags,
    format_string_location: u32,
    thread_id: u64,
    continuous_time_delta: u64,
    data: &'a [u8],
}

impl<'a> TracepointIter<'a> {
    fn next_raw(&mut self) -> Result<Option<RawTracepoint<'a>>, ParseError> {
        let cursor = &mut self.cursor;
        if cursor.remaining() < TRACEPOINT_HEADER_SIZE {
            return Ok(None);
        }

        let offset = PREAMBLE_SIZE + cursor.offset();
        let activity_type: u8 = cursor.read_int()?;
        if activity_type == 0 {
            return Ok(None);
        }
        let log_type = cursor.read_int()?;
        let flags = TracepointFlags::from_bits_retain(cursor.read_int()?);
        let format_string_location = cursor.read_int()?;
        let thread_id = cursor.read_int()?;
        let delta_lower: u32 = cursor.read_int()?;
        let delta_upper: u16 = cursor.read_int()?;
        let data_size: u16 = cursor.read_int()?;
        let data = cursor.read(data_size.into())?;
        cursor.align(0, 8);

        Ok(Some(RawTracepoint {
            offset,
            activity_type,
            log_type,
            flags,
            format_string_location,
            thread_id,
            continuous_time_delta: (u64::from(delta_upper) << 32) | u64::from(delta_lower),
            data,
        }))
    }
}

impl Iterator for TracepointIter<'_> {
    type Item = Result<Tracepoint, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let raw = match self.next_raw() {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                self.done = true;
                return None;
            }
            // The next tracepoint boundary is unknown.
            Err(err) => {
                self.done = true;
                return Some(Err(err));
            }
        };

        let payload =
            TracepointPayload::parse(raw.activity_type, raw.log_type, raw.flags, raw.data);
        Some(payload.map(|payload| Tracepoint {
            offset: raw.offset,
            activity_type: raw.activity_type,
            log_type: raw.log_type,
            flags: raw.flags,
            format_string_location: raw.format_string_location,
            thread_id: raw.thread_id,
            continuous_time: self
                .base_continuous_time
                .wrapping_add(raw.continuous_time_delta),
            payload,
        }))
    }
}
