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

use std::{error::Error, fs::File, io::Write, path::PathBuf, process::ExitCode};

#[cfg(target_arch = "x86_64")]
use mimalloc::MiMalloc;
#[global_allocator]
#[cfg(target_arch = "x86_64")]
static GLOBAL: MiMalloc = MiMalloc;

use clap::Parser;
use lib::{
    artifact::{ArtifactKind, load_timesync_dir, open_artifact},
    error::DynMultiError,
    print::{OutputFormat, print_dsc, print_entries, print_header, print_timesync, print_uuidtext},
};
use unifiedlog::{
    dsc::DscFile,
    fs::NativeFileAccessor,
    iterator::merge_entries,
    store::StringStore,
    timesync::TimesyncFile,
    tracev3::{LogContext, TraceV3File},
    uuidtext::UuidTextFile,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Root of the uuidtext directory, holding the UUIDText files and the dsc/ folder.
    #[arg(long, value_name = "DIR")]
    uuidtext: Option<PathBuf>,

    /// Directory holding the *.timesync files.
    #[arg(long, value_name = "DIR")]
    timesync: Option<PathBuf>,

    /// Print the header of tracev3 files instead of their log entries.
    #[arg(long)]
    header: bool,

    #[arg(long)]
    debug: bool,

    #[arg(long, value_name = "ERRORS_JSON")]
    errors_json: Option<PathBuf>,

    #[arg(value_name = "PATH", required = true)]
    paths: Vec<PathBuf>,
}

fn run<W: Write>(cli: &Cli, out: &mut W) -> Result<(), DynMultiError> {
    let mut errors = Vec::new();
    let mut traces = Vec::new();

    macro_rules! check {
        ($res:expr) => {
            if let Err(err) = $res {
                errors.push(err);
            }
        };
    }

    for path in &cli.paths {
        let (kind, data) = match open_artifact(path) {
            Ok(x) => x,
            Err(err) => {
                errors.push(err);
                continue;
            }
        };
        log::debug!("{} detected as {kind:?}", path.display());

        match kind {
            ArtifactKind::Dsc => check!(
                DscFile::parse(data)
                    .map_err(DynMultiError::from)
                    .and_then(|dsc| print_dsc(&dsc, &mut *out, cli.format))
            ),
            ArtifactKind::UuidText => check!(
                UuidTextFile::parse(data)
                    .map_err(DynMultiError::from)
                    .and_then(|file| print_uuidtext(&file, &mut *out, cli.format))
            ),
            ArtifactKind::Timesync => check!(
                TimesyncFile::parse(&data)
                    .map_err(DynMultiError::from)
                    .and_then(|file| print_timesync(&file, &mut *out, cli.format))
            ),
            ArtifactKind::TraceV3 => match TraceV3File::parse(data) {
                Ok(trace) if cli.header => {
                    check!(print_header(trace.header(), &mut *out, cli.format))
                }
                Ok(trace) => traces.push(trace),
                Err(err) => errors.push(DynMultiError::from_string(format!(
                    "Could not open {}: {err}",
                    path.display()
                ))),
            },
        }
    }

    if !traces.is_empty() {
        let mut ctx = LogContext::new();
        if let Some(dir) = &cli.uuidtext {
            ctx = ctx.with_store(StringStore::new(Box::new(NativeFileAccessor), dir));
        }
        if let Some(dir) = &cli.timesync {
            let (db, err) = load_timesync_dir(dir);
            errors.extend(err);
            ctx = ctx.with_timesync(db);
        }

        let entries = merge_entries(traces.iter().map(|trace| trace.log_entries(&ctx)));
        check!(print_entries(entries, &mut *out, cli.format));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(DynMultiError::merge(errors))
    }
}

fn _main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let mut logger = env_logger::Builder::from_default_env();
    if cli.debug {
        logger.filter_level(log::LevelFilter::Debug);
    }
    logger.init();

    let stdout = std::io::stdout().lock();
    let mut out = std::io::BufWriter::with_capacity(1024 * 1024, stdout);

    let res = run(&cli, &mut out);
    out.flush()?;

    if let Err(err) = &res {
        eprintln!(
            "{} errors happened while processing the logs:\n{err}",
            err.len()
        );
    }

    if let Some(path) = &cli.errors_json {
        let errors: Vec<String> = match &res {
            Err(err) => err
                .errors()
                .into_iter()
                .map(|err| err.to_string())
                .collect(),
            Ok(_) => Vec::new(),
        };
        let mut file = File::create(path)?;
        let json_value = serde_json::json!({
            "errors": errors,
        });
        file.write_all(json_value.to_string().as_bytes())?;
    }
    match res {
        Ok(_) => Ok(()),
        Err(_) => Err("Errors happened".into()),
    }
}

fn main() -> ExitCode {
    match _main() {
        Err(err) => {
            eprintln!("{err}");
            ExitCode::from(1)
        }
        Ok(_) => ExitCode::from(0),
    }
}
