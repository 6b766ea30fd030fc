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

//! Decoders for `%{name}` annotations of format strings.

use core::fmt;
use std::collections::BTreeMap;

use once_cell::sync::Lazy;

use crate::format::Argument;

type DecoderFn = Box<dyn Fn(&Argument) -> Option<String> + Send + Sync>;

/// Registry of value decoders, looked up by annotation name.
///
/// A decoder returning [None] lets the value be formatted according to its conversion
/// specifier.
pub struct DecoderRegistry {
    decoders: BTreeMap<String, DecoderFn>,
}

/// Registry with all the builtin decoders.
pub static DEFAULT_DECODERS: Lazy<DecoderRegistry> = Lazy::new(DecoderRegistry::with_defaults);

impl Default for DecoderRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl DecoderRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        DecoderRegistry {
            decoders: BTreeMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for name in ["errno", "darwin.errno"] {
            registry.register(name, |arg| Some(decode_errno(integer(arg)?)));
        }
        for name in ["odtypes:mode_t", "darwin.mode"] {
            registry.register(name, |arg| Some(decode_mode(integer(arg)?)));
        }
        registry.register("bool", |arg| {
            Some((if integer(arg)? != 0 { "true" } else { "false" }).into())
        });
        registry.register("BOOL", |arg| {
            Some((if integer(arg)? != 0 { "YES" } else { "NO" }).into())
        });
        registry
    }

    /// Register a decoder, replacing any existing one with the same name.
    pub fn register<F>(&mut self, name: &str, f: F)
    where
        F: Fn(&Argument) -> Option<String> + Send + Sync + 'static,
    {
        self.decoders.insert(name.into(), Box::new(f));
    }

    pub fn decode(&self, name: &str, arg: &Argument) -> Option<String> {
        self.decoders.get(name).and_then(|f| f(arg))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.decoders.keys().map(String::as_str)
    }
}

impl fmt::Debug for DecoderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}

fn integer(arg: &Argument) -> Option<i64> {
    match arg {
        Argument::Integer { .. } => Some(arg.as_signed()),
        _ => None,
    }
}

fn decode_errno(errno: i64) -> String {
    match errno_message(errno) {
        Some(msg) => format!("[{errno}: {msg}]"),
        None => format!("[{errno}: Unknown error: {errno}]"),
    }
}

fn errno_message(errno: i64) -> Option<&'static str> {
    let msg = match errno {
        0 => "Undefined error: 0",
        1 => "Operation not permitted",
        2 => "No such file or directory",
        3 => "No such process",
        4 => "Interrupted system call",
        5 => "Input/output error",
        6 => "Device not configured",
        7 => "Argument list too long",
        8 => "Exec format error",
        9 => "Bad file descriptor",
        10 => "No child processes",
        11 => "Resource deadlock avoided",
        12 => "Cannot allocate memory",
        13 => "Permission denied",
        14 => "Bad address",
        15 => "Block device required",
        16 => "Resource busy",
        17 => "File exists",
        18 => "Cross-device link",
        19 => "Operation not supported by device",
        20 => "Not a directory",
        21 => "Is a directory",
        22 => "Invalid argument",
        23 => "Too many open files in system",
        24 => "Too many open files",
        25 => "Inappropriate ioctl for device",
        26 => "Text file busy",
        27 => "File too large",
        28 => "No space left on device",
        29 => "Illegal seek",
        30 => "Read-only file system",
        31 => "Too many links",
        32 => "Broken pipe",
        33 => "Numerical argument out of domain",
        34 => "Result too large",
        35 => "Resource temporarily unavailable",
        36 => "Operation now in progress",
        37 => "Operation already in progress",
        38 => "Socket operation on non-socket",
        39 => "Destination address required",
        40 => "Message too long",
        41 => "Protocol wrong type for socket",
        42 => "Protocol not available",
        43 => "Protocol not supported",
        44 => "Socket type not supported",
        45 => "Operation not supported",
        46 => "Protocol family not supported",
        47 => "Address family not supported by protocol family",
        48 => "Address already in use",
        49 => "Can't assign requested address",
        50 => "Network is down",
        51 => "Network is unreachable",
        52 => "Network dropped connection on reset",
        53 => "Software caused connection abort",
        54 => "Connection reset by peer",
        55 => "No buffer space available",
        56 => "Socket is already connected",
        57 => "Socket is not connected",
        58 => "Can't send after socket shutdown",
        59 => "Too many references: can't splice",
        60 => "Operation timed out",
        61 => "Connection refused",
        62 => "Too many levels of symbolic links",
        63 => "File name too long",
        64 => "Host is down",
        65 => "No route to host",
        66 => "Directory not empty",
        67 => "Too many processes",
        68 => "Too many users",
        69 => "Disc quota exceeded",
        70 => "Stale NFS file handle",
        71 => "Too many levels of remote in path",
        72 => "RPC struct is bad",
        73 => "RPC version wrong",
        74 => "RPC prog. not avail",
        75 => "Program version wrong",
        76 => "Bad procedure for program",
        77 => "No locks available",
        78 => "Function not implemented",
        79 => "Inappropriate file type or format",
        80 => "Authentication error",
        81 => "Need authenticator",
        82 => "Device power is off",
        83 => "Device error",
        84 => "Value too large to be stored in data type",
        85 => "Bad executable (or shared library)",
        86 => "Bad CPU type in executable",
        87 => "Shared library version mismatch",
        88 => "Malformed Mach-o file",
        89 => "Operation canceled",
        90 => "Identifier removed",
        91 => "No message of desired type",
        92 => "Illegal byte sequence",
        93 => "Attribute not found",
        94 => "Bad message",
        95 => "EMULTIHOP (Reserved)",
        96 => "No message available on STREAM",
        97 => "ENOLINK (Reserved)",
        98 => "No STREAM resources",
        99 => "Not a STREAM",
        100 => "Protocol error",
        101 => "STREAM ioctl timeout",
        102 => "Operation not supported on socket",
        103 => "Policy not found",
        104 => "State not recoverable",
        105 => "Previous owner died",
        106 => "Interface output queue is full",
        _ => return None,
    };
    Some(msg)
}

fn decode_mode(mode: i64) -> String {
    let mode = mode as u32;
    let kind = match mode & 0o170000 {
        0o010000 => 'p',
        0o020000 => 'c',
        0o040000 => 'd',
        0o060000 => 'b',
        0o120000 => 'l',
        0o140000 => 's',
        _ => '-',
    };

    let mut out = String::with_capacity(10);
    out.push(kind);
    // (read shift, special bit, special char)
    for (shift, special, special_char) in [(6, 0o4000, 's'), (3, 0o2000, 's'), (0, 0o1000, 't')] {
        let bits = (mode >> shift) & 0o7;
        out.push(if bits & 0o4 != 0 { 'r' } else { '-' });
        out.push(if bits & 0o2 != 0 { 'w' } else { '-' });
        let exec = bits & 0o1 != 0;
        out.push(match (mode & special != 0, exec) {
            (true, true) => special_char,
            (true, false) => special_char.to_ascii_uppercase(),
            (false, true) => 'x',
            (false, false) => '-',
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(value: i64) -> Argument {
        Argument::Integer {
            value: value as u64,
            size: 4,
        }
    }

    #[test]
    fn errno_test() {
        let registry = DecoderRegistry::with_defaults();
        let decode = |name, value| registry.decode(name, &int(value));

        assert_eq!(decode("errno", 2).as_deref(), Some("[2: No such file or directory]"));
        assert_eq!(decode("darwin.errno", 13).as_deref(), Some("[13: Permission denied]"));
        assert_eq!(decode("errno", 0).as_deref(), Some("[0: Undefined error: 0]"));
        assert_eq!(decode("errno", 4242).as_deref(), Some("[4242: Unknown error: 4242]"));
        assert_eq!(decode("errno", -1).as_deref(), Some("[-1: Unknown error: -1]"));
        assert_eq!(registry.decode("errno", &Argument::String("x".into())), None);
    }

    #[test]
    fn mode_test() {
        assert_eq!(decode_mode(0o700), "-rwx------");
        assert_eq!(decode_mode(0o100644), "-rw-r--r--");
        assert_eq!(decode_mode(0o040755), "drwxr-xr-x");
        assert_eq!(decode_mode(0o4755), "-rwsr-xr-x");
        assert_eq!(decode_mode(0o1777), "-rwxrwxrwt");
        assert_eq!(decode_mode(0o2640), "-rw-r-S---");
    }

    #[test]
    fn register_test() {
        let mut registry = DecoderRegistry::new();
        assert_eq!(registry.decode("bool", &int(1)), None);

        registry.register("upper", |arg| match arg {
            Argument::String(s) => Some(s.to_uppercase()),
            _ => None,
        });
        assert_eq!(
            registry.decode("upper", &Argument::String("abc".into())).as_deref(),
            Some("ABC")
        );
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["upper"]);

        let defaults = &*DEFAULT_DECODERS;
        assert_eq!(defaults.decode("bool", &int(0)).as_deref(), Some("false"));
        assert_eq!(defaults.decode("BOOL", &int(1)).as_deref(), Some("YES"));
    }
}
