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

//! Assembled log records.

use serde::Serialize;
use uuid::Uuid;

use crate::{
    format::Argument,
    header::{ContinuousTime, Timestamp},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Activity,
    Log,
    Signpost,
    Loss,
    StateDump,
    SimpleDump,
}

impl EventType {
    pub fn name(&self) -> &'static str {
        match self {
            EventType::Activity => "activity",
            EventType::Log => "log",
            EventType::Signpost => "signpost",
            EventType::Loss => "loss",
            EventType::StateDump => "statedump",
            EventType::SimpleDump => "simpledump",
        }
    }
}

/// Level of a log message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum MessageType {
    Default,
    Info,
    Debug,
    Error,
    Fault,
    Unknown(u8),
}

impl From<u8> for MessageType {
    fn from(log_type: u8) -> MessageType {
        match log_type {
            0x00 => MessageType::Default,
            0x01 => MessageType::Info,
            0x02 => MessageType::Debug,
            0x10 => MessageType::Error,
            0x11 => MessageType::Fault,
            x => MessageType::Unknown(x),
        }
    }
}

impl MessageType {
    pub fn name(&self) -> &'static str {
        match self {
            MessageType::Default => "Default",
            MessageType::Info => "Info",
            MessageType::Debug => "Debug",
            MessageType::Error => "Error",
            MessageType::Fault => "Fault",
            MessageType::Unknown(_) => "Unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SignpostScope {
    Thread,
    Process,
    System,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SignpostKind {
    Event,
    Begin,
    End,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignpostInfo {
    pub id: u64,
    pub name: Option<String>,
    pub scope: SignpostScope,
    pub kind: SignpostKind,
}

impl SignpostInfo {
    /// Build from the signpost identifier and the log type of the tracepoint, which encodes the
    /// scope and kind of the signpost.
    pub fn new(id: u64, name: Option<String>, log_type: u8) -> Self {
        let scope = match log_type & 0xc0 {
            0x40 => SignpostScope::Thread,
            0x80 => SignpostScope::Process,
            0xc0 => SignpostScope::System,
            _ => SignpostScope::Unknown,
        };
        let kind = match log_type & 0x03 {
            0x00 => SignpostKind::Event,
            0x01 => SignpostKind::Begin,
            0x02 => SignpostKind::End,
            _ => SignpostKind::Unknown,
        };
        SignpostInfo {
            id,
            name,
            scope,
            kind,
        }
    }
}

/// Messages dropped by the logging system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LossInfo {
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    pub count: u64,
}

/// A fully assembled log record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub boot_identifier: Uuid,
    /// Wall-clock time in nanoseconds since the epoch.
    pub timestamp: Timestamp,
    pub continuous_time: ContinuousTime,
    pub thread_id: u64,
    pub pid: u32,
    pub euid: u32,
    pub activity_id: u64,
    pub parent_activity_id: u64,
    pub event_type: EventType,
    /// Only set for log messages.
    pub message_type: Option<MessageType>,
    pub subsystem: Option<String>,
    pub category: Option<String>,
    pub format_string: Option<String>,
    pub message: String,
    pub arguments: Vec<Argument>,
    pub process_image_path: Option<String>,
    pub process_image_uuid: Option<Uuid>,
    pub sender_image_path: Option<String>,
    pub sender_image_uuid: Option<Uuid>,
    pub sender_program_counter: Option<u64>,
    pub ttl: Option<u8>,
    pub signpost: Option<SignpostInfo>,
    pub loss: Option<LossInfo>,
}

impl LogEntry {
    /// Entry with only the common fields set.
    pub fn new(
        event_type: EventType,
        boot_identifier: Uuid,
        timestamp: Timestamp,
        continuous_time: ContinuousTime,
    ) -> Self {
        LogEntry {
            boot_identifier,
            timestamp,
            continuous_time,
            thread_id: 0,
            pid: 0,
            euid: 0,
            activity_id: 0,
            parent_activity_id: 0,
            event_type,
            message_type: None,
            subsystem: None,
            category: None,
            format_string: None,
            message: String::new(),
            arguments: Vec::new(),
            process_image_path: None,
            process_image_uuid: None,
            sender_image_path: None,
            sender_image_uuid: None,
            sender_program_counter: None,
            ttl: None,
            signpost: None,
            loss: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_type_test() {
        assert_eq!(MessageType::from(0x00), MessageType::Default);
        assert_eq!(MessageType::from(0x02), MessageType::Debug);
        assert_eq!(MessageType::from(0x11), MessageType::Fault);
        assert_eq!(MessageType::from(0x42), MessageType::Unknown(0x42));
        assert_eq!(MessageType::from(0x10).name(), "Error");
    }

    #[test]
    fn signpost_test() {
        let info = SignpostInfo::new(42, None, 0x81);
        assert_eq!(info.scope, SignpostScope::Process);
        assert_eq!(info.kind, SignpostKind::Begin);

        let info = SignpostInfo::new(42, Some("load".into()), 0xc2);
        assert_eq!(info.scope, SignpostScope::System);
        assert_eq!(info.kind, SignpostKind::End);

        let info = SignpostInfo::new(1, None, 0x40);
        assert_eq!(info.scope, SignpostScope::Thread);
        assert_eq!(info.kind, SignpostKind::Event);
    }
}
