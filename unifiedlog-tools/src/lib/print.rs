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

use std::{io::Write, path::Path};

use chrono::DateTime;
use serde_json::json;
use unifiedlog::{
    ParseError,
    dsc::DscFile,
    event::{EventType, LogEntry},
    header::{Timestamp, TraceHeader},
    timesync::{TimesyncFile, TimesyncRecord},
    uuidtext::UuidTextFile,
};

use crate::error::DynMultiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[allow(clippy::enum_variant_names)]
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum MainError {
    #[error("Error while writing output: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Error while serializing to JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Error while decoding: {0}")]
    ParseError(#[from] ParseError),
}

/// Render a timestamp in nanoseconds since the epoch with microsecond resolution.
pub fn format_timestamp(ts: Timestamp) -> String {
    DateTime::from_timestamp_nanos(ts)
        .format("%Y-%m-%d %H:%M:%S%.6f%z")
        .to_string()
}

fn file_name(path: Option<&str>) -> &str {
    match path {
        Some(path) => Path::new(path)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(path),
        None => "<unknown>",
    }
}

fn write_entry<W: Write>(out: &mut W, entry: &LogEntry) -> Result<(), MainError> {
    let kind = match (entry.event_type, entry.message_type) {
        (EventType::Log, Some(message_type)) => message_type.name(),
        (event_type, _) => event_type.name(),
    };
    let ttl = entry.ttl.unwrap_or(0);

    write!(
        out,
        "{:<31} {:<#10x} {kind:<11} {:<#18x} {:<6} {ttl:<3} {}: ({})",
        format_timestamp(entry.timestamp),
        entry.thread_id,
        entry.activity_id,
        entry.pid,
        file_name(entry.process_image_path.as_deref()),
        file_name(entry.sender_image_path.as_deref()),
    )?;

    match (&entry.subsystem, &entry.category) {
        (Some(subsystem), Some(category)) => write!(out, " [{subsystem}:{category}]")?,
        (Some(subsystem), None) => write!(out, " [{subsystem}]")?,
        _ => {}
    }
    if let Some(signpost) = &entry.signpost {
        write!(
            out,
            " [spid {:#x}, {:?}, {:?}: {}]",
            signpost.id,
            signpost.scope,
            signpost.kind,
            signpost.name.as_deref().unwrap_or("<unknown>")
        )?;
    }
    writeln!(out, " {}", entry.message)?;
    Ok(())
}

/// Print a stream of log entries.
///
/// Decoding errors are displayed at the place they occurred and decoding carries on. They are
/// all returned at the end.
pub fn print_entries<I, W>(entries: I, mut out: W, format: OutputFormat) -> Result<(), DynMultiError>
where
    I: IntoIterator<Item = Result<LogEntry, ParseError>>,
    W: Write,
{
    let mut errors = Vec::new();

    for entry in entries {
        match (entry, format) {
            (Ok(entry), OutputFormat::Text) => write_entry(&mut out, &entry)?,
            (Ok(entry), OutputFormat::Json) => {
                serde_json::to_writer(&mut out, &entry).map_err(MainError::from)?;
                writeln!(&mut out)?;
            }
            (Err(err), OutputFormat::Text) => {
                writeln!(&mut out, "Error while decoding: {err}")?;
                errors.push(err);
            }
            (Err(err), OutputFormat::Json) => {
                writeln!(&mut out, "{}", json!({"error": err.to_string()}))?;
                errors.push(err);
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(DynMultiError::new(errors))
    }
}

fn write_json<W: Write>(out: &mut W, value: &serde_json::Value) -> Result<(), DynMultiError> {
    serde_json::to_writer_pretty(&mut *out, value).map_err(MainError::from)?;
    writeln!(out)?;
    Ok(())
}

pub fn print_header<W: Write>(
    header: &TraceHeader,
    mut out: W,
    format: OutputFormat,
) -> Result<(), DynMultiError> {
    match format {
        OutputFormat::Json => write_json(&mut out, &json!(header)),
        OutputFormat::Text => {
            writeln!(&mut out, "Boot identifier: {}", header.boot_identifier)?;
            writeln!(
                &mut out,
                "Start time: {}",
                format_timestamp(header.start_timestamp())
            )?;
            writeln!(
                &mut out,
                "Timebase: {}/{}",
                header.timebase_numerator, header.timebase_denominator
            )?;
            writeln!(&mut out, "Build: {}", header.build_version)?;
            writeln!(&mut out, "Hardware model: {}", header.hardware_model)?;
            writeln!(&mut out, "Time zone: {}", header.time_zone_path)?;
            writeln!(&mut out, "logd PID: {}", header.logd_pid)?;
            Ok(())
        }
    }
}

pub fn print_dsc<W: Write>(
    dsc: &DscFile,
    mut out: W,
    format: OutputFormat,
) -> Result<(), DynMultiError> {
    match format {
        OutputFormat::Json => write_json(
            &mut out,
            &json!({
                "header": dsc.header(),
                "ranges": dsc.ranges(),
                "uuids": dsc.uuids(),
            }),
        ),
        OutputFormat::Text => {
            let header = dsc.header();
            writeln!(
                &mut out,
                "Shared cache strings v{}.{}: {} ranges, {} images",
                header.major_version,
                header.minor_version,
                header.number_of_ranges,
                header.number_of_uuids
            )?;
            for range in dsc.ranges() {
                let end = range.range_offset + u64::from(range.range_size);
                let image = usize::try_from(range.uuid_index)
                    .ok()
                    .and_then(|idx| dsc.uuids().get(idx));
                writeln!(
                    &mut out,
                    "range {:#012x}-{end:#012x} image {}",
                    range.range_offset,
                    image
                        .map(|image| image.uuid.to_string())
                        .unwrap_or_else(|| "<unknown>".into()),
                )?;
            }
            for image in dsc.uuids() {
                writeln!(
                    &mut out,
                    "image {} text {:#012x}+{:#x} {}",
                    image.uuid,
                    image.text_offset,
                    image.text_size,
                    image.path.as_deref().unwrap_or("<unknown>")
                )?;
            }
            Ok(())
        }
    }
}

pub fn print_uuidtext<W: Write>(
    file: &UuidTextFile,
    mut out: W,
    format: OutputFormat,
) -> Result<(), DynMultiError> {
    match format {
        OutputFormat::Json => write_json(
            &mut out,
            &json!({
                "header": file.header(),
                "entries": file.entries(),
                "image_path": file.image_path(),
            }),
        ),
        OutputFormat::Text => {
            let header = file.header();
            writeln!(
                &mut out,
                "UUIDText v{}.{} for {}",
                header.major_version,
                header.minor_version,
                file.image_path().unwrap_or("<unknown>")
            )?;
            for entry in file.entries() {
                let start = u64::from(entry.range_start);
                writeln!(
                    &mut out,
                    "range {start:#010x}+{:#x}: {}",
                    entry.size,
                    file.lookup(start)
                        .map(String::from_utf8_lossy)
                        .unwrap_or_default()
                )?;
            }
            Ok(())
        }
    }
}

pub fn print_timesync<W: Write>(
    file: &TimesyncFile,
    mut out: W,
    format: OutputFormat,
) -> Result<(), DynMultiError> {
    match format {
        OutputFormat::Json => write_json(&mut out, &json!(file.records())),
        OutputFormat::Text => {
            for record in file.records() {
                match record {
                    TimesyncRecord::Boot(boot) => writeln!(
                        &mut out,
                        "boot {} at {} timebase {}/{}",
                        boot.boot_identifier,
                        format_timestamp(boot.timestamp),
                        boot.timebase_numerator,
                        boot.timebase_denominator
                    )?,
                    TimesyncRecord::Sync(sync) => writeln!(
                        &mut out,
                        "  sync kernel time {} at {}",
                        sync.kernel_time,
                        format_timestamp(sync.timestamp)
                    )?,
                }
            }
            Ok(())
        }
    }
}
