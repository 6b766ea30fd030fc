//! Decoder for Apple Unified Logging artifacts: `tracev3` trace files, `uuidtext` and `dsc`
//! string stores and `timesync` clock-correlation databases.

mod error;
mod parser;

pub mod catalog;
pub mod chunk;
pub mod chunkset;
pub mod compress;
pub mod decoders;
pub mod dsc;
pub mod dump;
pub mod event;
pub mod firehose;
pub mod format;
pub mod fs;
pub mod header;
pub mod io;
pub mod iterator;
pub mod oversize;
pub mod store;
pub mod timesync;
pub mod tracev3;
pub mod uuidtext;

pub use crate::error::ParseError;
