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

//! `tracev3` files and the assembly of their content into [LogEntry] records.

use core::fmt;
use std::{collections::BTreeMap, sync::Arc};

use genawaiter::{sync::r#gen, yield_};
use uuid::Uuid;

use crate::{
    catalog::{Catalog, ProcessEntry},
    chunk::{ChunkIter, ChunkKind},
    chunkset::{ChunkSet, ChunkSetRecord},
    compress::{Decompressor, Lz4Decompressor},
    decoders::DecoderRegistry,
    dsc::DscFile,
    dump::{SimpleDumpChunk, StateDumpChunk},
    error::ParseError,
    event::{EventType, LogEntry, LossInfo, MessageType, SignpostInfo},
    firehose::{FirehoseChunk, Formatter, FormatterKind, Tracepoint, TracepointPayload},
    format::{Argument, FormatStringCache},
    fs::FileBuffer,
    header::{ContinuousTime, Timestamp, TraceHeader},
    oversize::OversizeChunk,
    store::StringStore,
    timesync::{TimesyncBoot, TimesyncDatabase},
    uuidtext::UuidTextFile,
};

/// Configuration and caches shared by the decoding of `tracev3` files.
pub struct LogContext {
    store: Option<StringStore>,
    timesync: TimesyncDatabase,
    decoders: DecoderRegistry,
    formats: FormatStringCache,
    decompressor: Box<dyn Decompressor>,
}

impl Default for LogContext {
    fn default() -> Self {
        Self::new()
    }
}

impl LogContext {
    /// Context without string files nor timesync database, with the builtin decoders.
    pub fn new() -> Self {
        LogContext {
            store: None,
            timesync: TimesyncDatabase::new(),
            decoders: DecoderRegistry::with_defaults(),
            formats: FormatStringCache::new(),
            decompressor: Box::new(Lz4Decompressor::new()),
        }
    }

    pub fn with_store(mut self, store: StringStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_timesync(mut self, timesync: TimesyncDatabase) -> Self {
        self.timesync = timesync;
        self
    }

    pub fn with_decoders(mut self, decoders: DecoderRegistry) -> Self {
        self.decoders = decoders;
        self
    }

    pub fn with_decompressor<D: Decompressor + 'static>(mut self, decompressor: D) -> Self {
        self.decompressor = Box::new(decompressor);
        self
    }

    #[inline]
    pub fn store(&self) -> Option<&StringStore> {
        self.store.as_ref()
    }

    #[inline]
    pub fn timesync(&self) -> &TimesyncDatabase {
        &self.timesync
    }

    #[inline]
    pub fn decoders(&self) -> &DecoderRegistry {
        &self.decoders
    }

    #[inline]
    pub fn formats(&self) -> &FormatStringCache {
        &self.formats
    }

    #[inline]
    pub fn decompressor(&self) -> &dyn Decompressor {
        &*self.decompressor
    }
}

impl fmt::Debug for LogContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogContext")
            .field("store", &self.store)
            .field("timesync", &self.timesync)
            .field("decoders", &self.decoders)
            .field("formats", &self.formats)
            .finish_non_exhaustive()
    }
}

/// Oversize chunks indexed by `(proc_id_upper, proc_id_lower, data_reference_index)`.
type OversizeMap = BTreeMap<(u64, u32, u32), OversizeChunk>;

/// Strings file holding the format strings of an image.
enum StringSource {
    Dsc(Arc<DscFile>),
    UuidText(Arc<UuidTextFile>),
}

/// Image that emitted a tracepoint.
#[derive(Default)]
struct Sender {
    source: Option<StringSource>,
    uuid: Option<Uuid>,
    path: Option<String>,
}

impl Sender {
    /// Look up a string of the image, updating the sender image for shared cache lookups.
    fn lookup(&mut self, location: u64) -> Option<String> {
        match &self.source {
            Some(StringSource::Dsc(dsc)) => {
                let found = dsc.lookup(location)?;
                self.uuid = Some(found.image.uuid);
                self.path = found.image.path.clone();
                Some(found.to_string_lossy())
            }
            Some(StringSource::UuidText(file)) => file
                .lookup(location)
                .map(|s| String::from_utf8_lossy(s).into_owned()),
            None => None,
        }
    }

    /// Look up a string of the image without changing the sender image.
    fn string_at(&self, location: u64) -> Option<String> {
        match &self.source {
            Some(StringSource::Dsc(dsc)) => dsc.lookup(location).map(|found| found.to_string_lossy()),
            Some(StringSource::UuidText(file)) => file
                .lookup(location)
                .map(|s| String::from_utf8_lossy(s).into_owned()),
            None => None,
        }
    }
}

struct EntryBuilder<'a> {
    header: &'a TraceHeader,
    ctx: &'a LogContext,
    boot: Option<&'a TimesyncBoot>,
}

impl<'a> EntryBuilder<'a> {
    fn new(header: &'a TraceHeader, ctx: &'a LogContext) -> Self {
        let boot = ctx.timesync().boot(&header.boot_identifier);
        if boot.is_none() && !ctx.timesync().is_empty() {
            log::warn!(
                "No timesync data for boot {}, timestamps will be approximated",
                header.boot_identifier
            );
        }
        EntryBuilder { header, ctx, boot }
    }

    fn timestamp(&self, continuous_time: ContinuousTime) -> Timestamp {
        match self.boot {
            Some(boot) => boot.resolve(continuous_time),
            None => self.header.timestamp_of(continuous_time),
        }
    }

    fn uuidtext(&self, uuid: &Uuid) -> Option<Arc<UuidTextFile>> {
        self.ctx.store()?.uuidtext(uuid)
    }

    fn image_path(&self, uuid: &Uuid) -> Option<String> {
        self.uuidtext(uuid)?.image_path().map(Into::into)
    }

    /// Entry filled with the time and the process information.
    fn new_entry<'c>(
        &self,
        event_type: EventType,
        continuous_time: ContinuousTime,
        catalog: Option<&'c Catalog>,
        proc_id_upper: u64,
        proc_id_lower: u32,
    ) -> (LogEntry, Option<&'c ProcessEntry>) {
        let mut entry = LogEntry::new(
            event_type,
            self.header.boot_identifier,
            self.timestamp(continuous_time),
            continuous_time,
        );

        let process = catalog.and_then(|catalog| catalog.process_entry(proc_id_upper, proc_id_lower));
        match (catalog, process) {
            (Some(catalog), Some(process)) => {
                entry.pid = process.pid;
                entry.euid = process.euid;
                entry.process_image_uuid = catalog.main_uuid(process);
                entry.process_image_path = entry
                    .process_image_uuid
                    .and_then(|uuid| self.image_path(&uuid));
            }
            _ => log::warn!("No catalog entry for process {proc_id_upper}/{proc_id_lower}"),
        }
        (entry, process)
    }

    fn sender(
        &self,
        catalog: Option<&Catalog>,
        process: Option<&ProcessEntry>,
        formatter: &Formatter,
    ) -> Sender {
        let (catalog, process) = match (catalog, process) {
            (Some(catalog), Some(process)) => (catalog, process),
            _ => match (formatter.kind, formatter.uuid) {
                (FormatterKind::UuidRelative, Some(_)) => return self.uuid_sender(formatter.uuid),
                _ => return Sender::default(),
            },
        };

        match formatter.kind {
            FormatterKind::SharedCache | FormatterKind::LargeSharedCache => {
                let dsc = catalog
                    .dsc_uuid(process)
                    .and_then(|uuid| self.ctx.store()?.dsc(&uuid));
                Sender {
                    source: dsc.map(StringSource::Dsc),
                    ..Default::default()
                }
            }
            FormatterKind::MainExe => self.uuid_sender(catalog.main_uuid(process)),
            FormatterKind::Absolute => {
                let uuid = catalog
                    .image_uuid_at(process, formatter.program_counter())
                    .or_else(|| catalog.main_uuid(process));
                self.uuid_sender(uuid)
            }
            FormatterKind::UuidRelative => self.uuid_sender(formatter.uuid),
        }
    }

    fn uuid_sender(&self, uuid: Option<Uuid>) -> Sender {
        let file = uuid.and_then(|uuid| self.uuidtext(&uuid));
        Sender {
            path: file.as_ref().and_then(|file| file.image_path().map(Into::into)),
            source: file.map(StringSource::UuidText),
            uuid,
        }
    }

    fn arguments(
        &self,
        chunk: &FirehoseChunk<'_>,
        tracepoint: &Tracepoint,
        oversize: &OversizeMap,
    ) -> Vec<Argument> {
        match tracepoint.data_ref() {
            Some(data_ref) => {
                let key = (
                    chunk.preamble.proc_id_upper,
                    chunk.preamble.proc_id_lower,
                    u32::from(data_ref),
                );
                match oversize.get(&key) {
                    Some(oversize) => oversize.arguments(),
                    None => {
                        log::warn!(
                            "{}",
                            ParseError::UnresolvedReference(format!(
                                "oversize data {data_ref} of process {}/{}",
                                key.0, key.1
                            ))
                        );
                        Vec::new()
                    }
                }
            }
            None => {
                let private = tracepoint
                    .private_data_range()
                    .and_then(|range| chunk.private_data_for(range));
                tracepoint
                    .items()
                    .map(|items| items.arguments(private))
                    .unwrap_or_default()
            }
        }
    }

    fn tracepoint_entry(
        &self,
        catalog: Option<&Catalog>,
        oversize: &OversizeMap,
        chunk: &FirehoseChunk<'_>,
        tracepoint: &Tracepoint,
    ) -> Option<LogEntry> {
        let event_type = match &tracepoint.payload {
            TracepointPayload::Activity(_) => EventType::Activity,
            TracepointPayload::Log(_) => EventType::Log,
            TracepointPayload::Signpost(_) => EventType::Signpost,
            TracepointPayload::Loss(_) => EventType::Loss,
            TracepointPayload::Unsupported { activity_type } => {
                log::debug!("Skipping tracepoint with activity type {activity_type:#04x}");
                return None;
            }
        };

        let preamble = &chunk.preamble;
        let (mut entry, process) = self.new_entry(
            event_type,
            tracepoint.continuous_time,
            catalog,
            preamble.proc_id_upper,
            preamble.proc_id_lower,
        );
        entry.thread_id = tracepoint.thread_id;
        entry.ttl = tracepoint
            .ttl()
            .or((preamble.ttl != 0).then_some(preamble.ttl));

        let subsystem = |id: Option<u16>| match (catalog, process, id) {
            (Some(catalog), Some(process), Some(id)) => catalog.subsystem(process, id),
            _ => None,
        };

        match &tracepoint.payload {
            TracepointPayload::Loss(loss) => {
                entry.loss = Some(LossInfo {
                    start_time: self.timestamp(loss.start_time),
                    end_time: self.timestamp(loss.end_time),
                    count: loss.number_of_messages,
                });
                entry.message = format!("Lost {} unreliable messages", loss.number_of_messages);
                return Some(entry);
            }
            TracepointPayload::Activity(payload) => {
                entry.activity_id = payload.new_aid.or(payload.current_aid).unwrap_or(0);
                entry.parent_activity_id = match payload.new_aid {
                    Some(_) => payload.current_aid,
                    None => payload.other_aid,
                }
                .unwrap_or(0);
            }
            TracepointPayload::Log(payload) => {
                entry.activity_id = payload.current_aid.unwrap_or(0);
                entry.message_type = Some(MessageType::from(tracepoint.log_type));
                (entry.subsystem, entry.category) = subsystem(payload.subsystem).unzip();
            }
            TracepointPayload::Signpost(payload) => {
                entry.activity_id = payload.current_aid.unwrap_or(0);
                (entry.subsystem, entry.category) = subsystem(payload.subsystem).unzip();
            }
            TracepointPayload::Unsupported { .. } => return None,
        }

        let formatter = tracepoint.formatter()?;
        let mut sender = self.sender(catalog, process, formatter);
        entry.sender_program_counter = Some(formatter.program_counter());

        let location = tracepoint.format_string_location();
        let format_string = if tracepoint.has_dynamic_format_string() {
            Some("%s".to_owned())
        } else {
            location.and_then(|location| sender.lookup(location))
        };

        if let TracepointPayload::Signpost(payload) = &tracepoint.payload {
            let name = payload.name.and_then(|name| sender.string_at(name.into()));
            entry.signpost = Some(SignpostInfo::new(
                payload.signpost_id,
                name,
                tracepoint.log_type,
            ));
        }

        entry.sender_image_uuid = sender.uuid;
        entry.sender_image_path = sender.path;
        entry.arguments = self.arguments(chunk, tracepoint, oversize);

        match &format_string {
            Some(format_string) => {
                entry.message = self
                    .ctx
                    .formats()
                    .get(format_string)
                    .render(&entry.arguments, self.ctx.decoders());
            }
            None => {
                let location = location.unwrap_or(0);
                let err = ParseError::UnresolvedReference(format!(
                    "format string at {location:#x} of {:?} image {}",
                    formatter.kind,
                    entry
                        .sender_image_uuid
                        .map(|uuid| uuid.to_string())
                        .unwrap_or_else(|| "<unknown>".into())
                ));
                if self.ctx.store().is_some() {
                    log::warn!("{err}");
                } else {
                    log::debug!("{err}");
                }
                entry.message = format!("<unresolved format string at {location:#x}>");
            }
        }
        entry.format_string = format_string;
        Some(entry)
    }

    fn statedump_entry(&self, catalog: Option<&Catalog>, chunk: &StateDumpChunk) -> LogEntry {
        let (mut entry, _) = self.new_entry(
            EventType::StateDump,
            chunk.continuous_time,
            catalog,
            chunk.proc_id_upper,
            chunk.proc_id_lower,
        );
        entry.activity_id = chunk.activity_id;
        entry.ttl = (chunk.ttl != 0).then_some(chunk.ttl);
        entry.sender_image_uuid = Some(chunk.uuid);
        entry.sender_image_path = self.image_path(&chunk.uuid);
        entry.message = chunk.message();
        entry
    }

    fn simpledump_entry(&self, catalog: Option<&Catalog>, chunk: &SimpleDumpChunk) -> LogEntry {
        let (mut entry, _) = self.new_entry(
            EventType::SimpleDump,
            chunk.continuous_time,
            catalog,
            chunk.proc_id_upper,
            chunk.proc_id_lower,
        );
        entry.thread_id = chunk.thread_id;
        entry.ttl = (chunk.ttl != 0).then_some(chunk.ttl);
        entry.message_type = Some(MessageType::from(chunk.message_type));
        entry.subsystem = (!chunk.subsystem.is_empty()).then(|| chunk.subsystem.clone());
        entry.sender_image_uuid = Some(chunk.sender_uuid);
        entry.sender_image_path = self.image_path(&chunk.sender_uuid);
        entry.sender_program_counter = Some(chunk.offset);
        entry.message = chunk.message.clone();
        entry
    }

    /// Entries produced by a chunk.
    fn entries(
        &self,
        catalog: Option<&Catalog>,
        oversize: &OversizeMap,
        record: &ChunkSetRecord<'_>,
    ) -> Vec<Result<LogEntry, ParseError>> {
        match record {
            ChunkSetRecord::Firehose(chunk) => chunk
                .tracepoints()
                .filter_map(|tracepoint| match tracepoint {
                    Ok(tracepoint) => self
                        .tracepoint_entry(catalog, oversize, chunk, &tracepoint)
                        .map(Ok),
                    Err(err) => Some(Err(err)),
                })
                .collect(),
            ChunkSetRecord::StateDump(chunk) => vec![Ok(self.statedump_entry(catalog, chunk))],
            ChunkSetRecord::SimpleDump(chunk) => vec![Ok(self.simpledump_entry(catalog, chunk))],
            ChunkSetRecord::Oversize(_)
            | ChunkSetRecord::Catalog(_)
            | ChunkSetRecord::Unknown { .. } => Vec::new(),
        }
    }
}

/// Collect the oversize chunks of a chunk-set, so that tracepoints can refer to oversize chunks
/// appearing after them.
fn collect_oversize(data: &[u8], oversize: &mut OversizeMap) {
    for chunk in ChunkIter::new(data).flatten() {
        if chunk.kind() == ChunkKind::Oversize {
            // Errors are reported when the chunk-set records are iterated.
            if let Ok(chunk) = OversizeChunk::parse(chunk.data) {
                oversize.insert(chunk.key(), chunk);
            }
        }
    }
}

/// A `tracev3` file.
#[derive(Debug, Clone)]
pub struct TraceV3File {
    data: FileBuffer,
    header: TraceHeader,
}

impl TraceV3File {
    /// Open the file, checking it starts with a header chunk.
    pub fn parse(data: FileBuffer) -> Result<TraceV3File, ParseError> {
        let header = match ChunkIter::new(&data).next() {
            Some(Ok(chunk)) if chunk.kind() == ChunkKind::Header => {
                TraceHeader::parse(chunk.data).map_err(|err| chunk.error(err))?
            }
            Some(Ok(chunk)) => {
                return Err(ParseError::MalformedHeader(format!(
                    "tracev3 file starts with a chunk of tag {:#06x} instead of a header chunk",
                    chunk.header.tag
                )));
            }
            Some(Err(err)) => return Err(err),
            None => return Err(ParseError::MalformedHeader("empty tracev3 file".into())),
        };
        Ok(TraceV3File { data, header })
    }

    #[inline]
    pub fn header(&self) -> &TraceHeader {
        &self.header
    }

    /// Top-level chunks of the file.
    #[inline]
    pub fn chunks(&self) -> ChunkIter<'_> {
        ChunkIter::new(&self.data)
    }

    /// Lazily decode all the log entries of the file, in file order.
    ///
    /// Errors are yielded along with the entries. A chunk that fails to decode is skipped and
    /// decoding resumes with the next chunk.
    pub fn log_entries<'a>(
        &'a self,
        ctx: &'a LogContext,
    ) -> impl IntoIterator<Item = Result<LogEntry, ParseError>> + 'a {
        r#gen!({
            let builder = EntryBuilder::new(&self.header, ctx);
            let mut catalog: Option<Catalog> = None;
            let mut oversize = OversizeMap::new();

            for chunk in self.chunks() {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(err) => {
                        yield_!(Err(err));
                        continue;
                    }
                };

                match chunk.kind() {
                    ChunkKind::Header => {}
                    ChunkKind::Catalog => match Catalog::parse(chunk.data) {
                        Ok(new) => catalog = Some(new),
                        Err(err) => {
                            catalog = None;
                            yield_!(Err(chunk.error(err)));
                        }
                    },
                    ChunkKind::ChunkSet => {
                        match ChunkSet::decompress(chunk.data, ctx.decompressor()) {
                            Ok(chunkset) => {
                                collect_oversize(chunkset.data(), &mut oversize);
                                for record in chunkset.records() {
                                    match record {
                                        Ok(ChunkSetRecord::Catalog(new)) => catalog = Some(*new),
                                        Ok(record) => {
                                            let entries =
                                                builder.entries(catalog.as_ref(), &oversize, &record);
                                            for entry in entries {
                                                yield_!(entry.map_err(|err| chunk.error(err)));
                                            }
                                        }
                                        Err(err) => yield_!(Err(chunk.error(err))),
                                    }
                                }
                            }
                            Err(err) => yield_!(Err(chunk.error(err))),
                        }
                    }
                    ChunkKind::Firehose
                    | ChunkKind::Oversize
                    | ChunkKind::StateDump
                    | ChunkKind::SimpleDump => match ChunkSetRecord::parse(&chunk) {
                        Ok(ChunkSetRecord::Oversize(new)) => {
                            oversize.insert(new.key(), new);
                        }
                        Ok(record) => {
                            let entries = builder.entries(catalog.as_ref(), &oversize, &record);
                            for entry in entries {
                                yield_!(entry.map_err(|err| chunk.error(err)));
                            }
                        }
                        Err(err) => yield_!(Err(chunk.error(err))),
                    },
                    kind => log::debug!(
                        "Skipping top-level chunk {kind:?} at offset {}",
                        chunk.offset
                    ),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        catalog::tests::{DSC_UUID, MAIN_UUID, catalog_payload},
        chunk::tests::make_chunk,
        compress::tests::make_chunkset_payload,
        dsc::tests::{DSC_IMAGE_PATH, DSC_IMAGE_UUID, single_range_dsc},
        dump::tests::{SIMPLEDUMP_PAYLOAD, STATEDUMP_PAYLOAD},
        firehose::tests::{
            CONFIG_GROUP, CONFIG_PATH, firehose_chunk, main_exe_tracepoint,
            shared_cache_tracepoint, tracepoint,
        },
        fs::MemoryFileAccessor,
        header::tests::{BOOT_UUID, header_payload},
        oversize::tests::oversize_payload,
        timesync::{
            TimesyncFile,
            tests::{boot_record, sync_record},
        },
        uuidtext::tests::{IMAGE_PATH, uuidtext_file},
    };

    const SHARED_CACHE_FORMAT: &str = "Reading %{public}@ from %{public}s";

    fn uuid(s: &str) -> Uuid {
        Uuid::parse_str(s).unwrap()
    }

    /// Main executable tracepoint whose arguments are stored in oversize chunk 3.
    fn oversize_tracepoint() -> Vec<u8> {
        let mut data = Vec::new();
        data.extend(0x0000_2000u32.to_le_bytes());
        data.extend(3u16.to_le_bytes());
        tracepoint(0x04, 0x10, 0x0802, 0x0000_0010, 48, &data)
    }

    fn loss_tracepoint() -> Vec<u8> {
        let mut data = Vec::new();
        data.extend(1100u64.to_le_bytes());
        data.extend(1200u64.to_le_bytes());
        data.extend(63u64.to_le_bytes());
        tracepoint(0x07, 0x00, 0x0000, 0, 64, &data)
    }

    fn tracev3_file() -> Vec<u8> {
        let mut tracepoints = shared_cache_tracepoint();
        tracepoints.extend(main_exe_tracepoint());
        tracepoints.extend(oversize_tracepoint());
        tracepoints.extend(loss_tracepoint());

        let mut chunkset = Vec::new();
        chunkset.extend(make_chunk(0x6001, 0, &firehose_chunk(&tracepoints, None)));
        chunkset.extend(make_chunk(0x6004, 0, &SIMPLEDUMP_PAYLOAD));
        chunkset.extend(make_chunk(0x6002, 0, &oversize_payload(3)));
        chunkset.extend(make_chunk(0x6003, 0, &STATEDUMP_PAYLOAD));
        chunkset.extend(make_chunk(0x6123, 0, &[0; 12]));

        let mut buf = Vec::new();
        buf.extend(make_chunk(0x1000, 0x11, &header_payload()));
        buf.extend(make_chunk(0x600b, 0x11, &catalog_payload()));
        buf.extend(make_chunk(0x600d, 0, &make_chunkset_payload(&chunkset)));
        buf
    }

    fn store() -> StringStore {
        let mut text = vec![0u8; 0x3cd];
        text.extend(SHARED_CACHE_FORMAT.as_bytes());
        text.push(0);

        let mut accessor = MemoryFileAccessor::new();
        accessor.insert(
            format!("uuidtext/dsc/{:X}", uuid(DSC_UUID).simple()),
            single_range_dsc(0x087c8000, &text, DSC_IMAGE_UUID),
        );
        let main = format!("{:X}", uuid(MAIN_UUID).simple());
        accessor.insert(
            format!("uuidtext/{}/{}", &main[..2], &main[2..]),
            uuidtext_file(),
        );
        StringStore::new(Box::new(accessor), "uuidtext")
    }

    fn timesync() -> TimesyncDatabase {
        let mut buf = boot_record(uuid(BOOT_UUID), 1_700_000_000_000_000_000);
        buf.extend(sync_record(3000, 1_700_000_000_500_000_000));
        TimesyncDatabase::from_files(&[TimesyncFile::parse(&buf).unwrap()])
    }

    #[test]
    fn tracev3_entries_test() {
        let file = TraceV3File::parse(tracev3_file().into()).unwrap();
        assert_eq!(file.header().boot_identifier, uuid(BOOT_UUID));
        assert_eq!(file.chunks().count(), 3);

        let ctx = LogContext::new()
            .with_store(store())
            .with_timesync(timesync());
        let entries: Vec<_> = file
            .log_entries(&ctx)
            .into_iter()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(entries.len(), 6);

        let first = &entries[0];
        assert_eq!(first.event_type, EventType::Log);
        assert_eq!(first.boot_identifier, uuid(BOOT_UUID));
        assert_eq!(first.continuous_time, 1016);
        // 1016 * 125 / 3 ns after boot
        assert_eq!(first.timestamp, 1_700_000_000_000_042_333);
        assert_eq!(first.pid, 42);
        assert_eq!(first.euid, 501);
        assert_eq!(first.thread_id, 0x1234);
        assert_eq!(first.activity_id, 0x8000_0000_0000_00e0);
        assert_eq!(first.message_type, Some(MessageType::Default));
        assert_eq!(first.subsystem.as_deref(), Some("com.apple.example"));
        assert_eq!(first.category.as_deref(), Some("general"));
        assert_eq!(first.ttl, Some(14));
        assert_eq!(first.format_string.as_deref(), Some(SHARED_CACHE_FORMAT));
        assert_eq!(
            first.message,
            format!("Reading {CONFIG_GROUP} from {CONFIG_PATH}")
        );
        assert_eq!(first.process_image_uuid, Some(uuid(MAIN_UUID)));
        assert_eq!(first.process_image_path.as_deref(), Some(IMAGE_PATH));
        assert_eq!(first.sender_image_uuid, Some(DSC_IMAGE_UUID));
        assert_eq!(first.sender_image_path.as_deref(), Some(DSC_IMAGE_PATH));
        assert_eq!(first.sender_program_counter, Some(0x0008_f3c2));

        let second = &entries[1];
        assert_eq!(second.message_type, Some(MessageType::Info));
        assert_eq!(second.format_string.as_deref(), Some("hello %s"));
        assert_eq!(
            second.message,
            "hello com.apple.example.helper.service.identifier"
        );
        assert_eq!(second.sender_image_uuid, Some(uuid(MAIN_UUID)));
        assert_eq!(second.sender_image_path.as_deref(), Some(IMAGE_PATH));
        assert_eq!(second.subsystem, None);

        // Arguments found in the oversize chunk that follows the firehose chunk
        let third = &entries[2];
        assert_eq!(third.message_type, Some(MessageType::Error));
        assert_eq!(
            third.arguments,
            vec![
                Argument::String("large".into()),
                Argument::String("key".into())
            ]
        );
        assert_eq!(third.message, "hello large");
        assert_eq!(third.continuous_time, 1048);

        let loss = &entries[3];
        assert_eq!(loss.continuous_time, 1064);
        assert_eq!(loss.event_type, EventType::Loss);
        assert_eq!(loss.loss.as_ref().unwrap().count, 63);
        assert_eq!(loss.message, "Lost 63 unreliable messages");

        let simpledump = &entries[4];
        assert_eq!(simpledump.event_type, EventType::SimpleDump);
        assert_eq!(simpledump.message, "Skipping boot-task: restore-datapartition");
        assert_eq!(simpledump.pid, 42);
        assert_eq!(simpledump.thread_id, 1887);
        assert_eq!(simpledump.sender_image_path.as_deref(), Some(IMAGE_PATH));
        assert_eq!(
            simpledump.timestamp,
            1_700_000_000_500_000_000 + (567448911 - 3000) * 125 / 3
        );

        let statedump = &entries[5];
        assert_eq!(statedump.event_type, EventType::StateDump);
        assert_eq!(statedump.activity_id, 0x8000000000ead229);
        assert_eq!(statedump.pid, 0);
        assert!(statedump.message.starts_with("SpringBoard - Combined List (plist)"));
    }

    #[test]
    fn unresolved_test() {
        let file = TraceV3File::parse(tracev3_file().into()).unwrap();
        let ctx = LogContext::new();
        let entries: Vec<_> = file
            .log_entries(&ctx)
            .into_iter()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(entries.len(), 6);

        let first = &entries[0];
        assert_eq!(first.format_string, None);
        assert_eq!(first.message, "<unresolved format string at 0x87c83cd>");
        assert_eq!(first.pid, 42);
        assert_eq!(first.timestamp, file.header().timestamp_of(1016));
        assert_eq!(first.process_image_path, None);
        assert_eq!(
            first.arguments,
            vec![
                Argument::String(CONFIG_GROUP.into()),
                Argument::String(CONFIG_PATH.into())
            ]
        );
    }

    #[test]
    fn dynamic_format_string_test() {
        let mut data = Vec::new();
        data.extend(0x0000_1f40u32.to_le_bytes());
        data.extend([0x00, 0x01]);
        data.extend([0x22, 0x04]);
        data.extend(0u16.to_le_bytes());
        data.extend(6u16.to_le_bytes());
        data.extend(b"dyn %d");
        let tracepoints = tracepoint(0x04, 0x00, 0x0002, 0x8000_0010, 8, &data);

        let mut buf = Vec::new();
        buf.extend(make_chunk(0x1000, 0x11, &header_payload()));
        buf.extend(make_chunk(0x600b, 0x11, &catalog_payload()));
        buf.extend(make_chunk(0x6001, 0, &firehose_chunk(&tracepoints, None)));

        let file = TraceV3File::parse(buf.into()).unwrap();
        let ctx = LogContext::new();
        let entries: Vec<_> = file
            .log_entries(&ctx)
            .into_iter()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].format_string.as_deref(), Some("%s"));
        assert_eq!(entries[0].message, "dyn %d");
    }

    #[test]
    fn missing_oversize_test() {
        let mut buf = Vec::new();
        buf.extend(make_chunk(0x1000, 0x11, &header_payload()));
        buf.extend(make_chunk(0x600b, 0x11, &catalog_payload()));
        buf.extend(make_chunk(0x6001, 0, &firehose_chunk(&oversize_tracepoint(), None)));

        let file = TraceV3File::parse(buf.into()).unwrap();
        let ctx = LogContext::new().with_store(store());
        let entries: Vec<_> = file
            .log_entries(&ctx)
            .into_iter()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(entries.len(), 1);

        let entry = &entries[0];
        assert_eq!(entry.message_type, Some(MessageType::Error));
        assert_eq!(entry.format_string.as_deref(), Some("hello %s"));
        assert!(entry.arguments.is_empty());
        assert_eq!(entry.message, "hello <decode: missing data>");
    }

    #[test]
    fn signpost_name_test() {
        let mut text = b"format\0".to_vec();
        text.extend(b"name\0");
        let dsc = DscFile::parse(single_range_dsc(0x500, &text, DSC_IMAGE_UUID).into()).unwrap();
        let other = uuid(MAIN_UUID);

        let mut sender = Sender {
            source: Some(StringSource::Dsc(Arc::new(dsc))),
            uuid: Some(other),
            path: Some(IMAGE_PATH.into()),
        };
        assert_eq!(sender.string_at(0x507).as_deref(), Some("name"));
        assert_eq!(sender.uuid, Some(other));
        assert_eq!(sender.path.as_deref(), Some(IMAGE_PATH));

        assert_eq!(sender.lookup(0x500).as_deref(), Some("format"));
        assert_eq!(sender.uuid, Some(DSC_IMAGE_UUID));
        assert_eq!(sender.path.as_deref(), Some(DSC_IMAGE_PATH));
        assert_eq!(sender.string_at(0x520), None);
    }

    #[test]
    fn recoverable_errors_test() {
        let mut buf = Vec::new();
        buf.extend(make_chunk(0x1000, 0x11, &header_payload()));
        let corrupt_offset = buf.len() as u64;
        buf.extend(make_chunk(0x600d, 0, b"bv4x...."));
        buf.extend(make_chunk(0x6004, 0, &SIMPLEDUMP_PAYLOAD));

        let file = TraceV3File::parse(buf.into()).unwrap();
        let ctx = LogContext::new();
        let items: Vec<_> = file.log_entries(&ctx).into_iter().collect();
        assert_eq!(items.len(), 2);

        match &items[0] {
            Err(ParseError::InChunk { tag, offset, inner }) => {
                assert_eq!(*tag, 0x600d);
                assert_eq!(*offset, corrupt_offset);
                assert!(matches!(**inner, ParseError::DecompressionFailure(_)));
            }
            x => panic!("unexpected item: {x:?}"),
        }
        // No catalog, the entry is still produced
        let entry = items[1].as_ref().unwrap();
        assert_eq!(entry.pid, 0);
        assert_eq!(entry.message, "Skipping boot-task: restore-datapartition");
    }

    #[test]
    fn malformed_file_test() {
        let buf = make_chunk(0x600b, 0x11, &catalog_payload());
        assert!(matches!(
            TraceV3File::parse(buf.into()),
            Err(ParseError::MalformedHeader(_))
        ));
        assert!(matches!(
            TraceV3File::parse(Vec::new().into()),
            Err(ParseError::MalformedHeader(_))
        ));
    }
}
