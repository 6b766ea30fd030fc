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

//! Interpretation of printf-style format strings as used by the unified logging APIs.
//!
//! Format strings are rewritten into a [FormatTemplate] made of literal text and placeholders,
//! along with one [FormatDecoder] per placeholder describing how the matching argument should be
//! decoded. The [Display] implementation of [FormatTemplate] gives the template in the
//! `{:spec}` notation, e.g. `"0x%02x"` becomes `"0x{:02x}"`.

use core::{
    fmt,
    fmt::{Debug, Display},
    str::{Utf8Error, from_utf8},
};
use std::{
    collections::BTreeMap,
    sync::{Arc, PoisonError, RwLock},
};

use bitflags::bitflags;
use itertools::Itertools as _;
use nom::{
    Parser,
    branch::alt,
    bytes::complete::{is_not, tag, take_till},
    character::complete::{char, one_of, u64 as txt_u64},
    combinator::{opt, success},
    error::{ContextError, FromExternalError, ParseError, context},
    multi::many0,
    sequence::{delimited, preceded},
};
use serde::Serialize;

use crate::{
    decoders::DecoderRegistry,
    parser::{FromParseError, NomError, NomParserExt as _, VerboseParseError, map_res_cut},
};

/// Decoded value of a log message argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Argument {
    /// Little-endian integer of `size` bytes, also used to carry floating point values.
    Integer { value: u64, size: u8 },
    /// Dynamic width or precision.
    Precision(u64),
    String(String),
    Data(Vec<u8>),
    /// Redacted value.
    Private,
    /// Value that could not be found in the log data.
    Missing,
}

impl Argument {
    /// Build an [Argument::Integer] from its little-endian representation.
    pub fn integer(bytes: &[u8]) -> Argument {
        let mut buf = [0u8; 8];
        let size = core::cmp::min(bytes.len(), buf.len());
        buf[..size].copy_from_slice(&bytes[..size]);
        Argument::Integer {
            value: u64::from_le_bytes(buf),
            size: size as u8,
        }
    }

    /// Interpret the value as an unsigned integer of its size.
    pub fn as_unsigned(&self) -> u64 {
        match self {
            Argument::Integer { value, size: size @ 1..=7 } => {
                *value & (u64::MAX >> (64 - 8 * u32::from(*size)))
            }
            Argument::Integer { value, .. } => *value,
            Argument::Precision(value) => *value,
            _ => 0,
        }
    }

    /// Interpret the value as a signed integer of its size.
    pub fn as_signed(&self) -> i64 {
        match self {
            Argument::Integer { value, size } => match size {
                1 => *value as u8 as i8 as i64,
                2 => *value as u16 as i16 as i64,
                4 => *value as u32 as i32 as i64,
                _ => *value as i64,
            },
            Argument::Precision(value) => *value as i64,
            _ => 0,
        }
    }

    /// Interpret the value as a floating point number of its size.
    pub fn as_f64(&self) -> f64 {
        match self {
            Argument::Integer { value, size: 4 } => f64::from(f32::from_bits(*value as u32)),
            Argument::Integer { value, .. } => f64::from_bits(*value),
            _ => 0.0,
        }
    }
}

/// Category of value expected by a placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ValueClass {
    Signed,
    Unsigned,
    Float,
}

/// How to decode the argument of a placeholder.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FormatDecoder {
    /// Text between the braces of a `%{...}` annotation.
    pub annotation: Option<String>,
    /// [None] for arguments that are not numbers.
    pub value_class: Option<ValueClass>,
}

impl FormatDecoder {
    pub fn new(annotation: Option<&str>, value_class: Option<ValueClass>) -> Self {
        FormatDecoder {
            annotation: annotation.map(Into::into),
            value_class,
        }
    }
}

/// Width specifier of a format string placeholder.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum PrintWidth {
    Unmodified,
    Fixed(usize),
    Dynamic,
}

/// Precision specifier of a format string placeholder.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum PrintPrecision {
    Unmodified,
    Fixed(usize),
    Dynamic,
}

bitflags! {
    /// Flags specifier of a format string placeholder.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
    pub struct PrintFlags: u8 {
        /// #
        const BasePrefix = 1;

        /// -
        const LeftJustify = 2;

        /// +
        const PositiveSign = 4;

        /// space
        const SignPlaceholder = 8;

        /// 0
        const ZeroPad = 16;
    }
}

/// Conversion specifier of a placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Conversion {
    /// `%d` and `%i`
    Signed,
    /// `%u`
    Unsigned,
    /// `%o`
    Octal,
    /// `%x`
    Hex,
    /// `%X`
    UpperHex,
    /// `%p`
    Pointer,
    /// `%c`
    Char,
    /// `%s`
    Str,
    /// `%@`, description of an Objective-C object.
    Object,
    /// `%P`, opaque binary data.
    Data,
    /// `%e`, `%f`, `%g` and `%a` and their uppercase variants.
    Float(char),
}

impl Conversion {
    fn from_char(c: char) -> Conversion {
        match c {
            'd' | 'i' => Conversion::Signed,
            'u' => Conversion::Unsigned,
            'o' => Conversion::Octal,
            'x' => Conversion::Hex,
            'X' => Conversion::UpperHex,
            'p' => Conversion::Pointer,
            'c' => Conversion::Char,
            '@' => Conversion::Object,
            'P' => Conversion::Data,
            's' => Conversion::Str,
            c => Conversion::Float(c),
        }
    }

    /// Type letter used in the rewritten template.
    fn type_char(&self) -> char {
        match self {
            Conversion::Signed | Conversion::Unsigned | Conversion::Pointer => 'd',
            Conversion::Octal => 'o',
            Conversion::Hex => 'x',
            Conversion::UpperHex => 'X',
            Conversion::Char => 'c',
            Conversion::Str | Conversion::Object | Conversion::Data => 's',
            Conversion::Float(c) => *c,
        }
    }

    pub fn value_class(&self) -> Option<ValueClass> {
        match self {
            Conversion::Signed | Conversion::Char => Some(ValueClass::Signed),
            Conversion::Unsigned
            | Conversion::Octal
            | Conversion::Hex
            | Conversion::UpperHex
            | Conversion::Pointer => Some(ValueClass::Unsigned),
            Conversion::Float(_) => Some(ValueClass::Float),
            Conversion::Str | Conversion::Object | Conversion::Data => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Placeholder {
    pub annotation: Option<String>,
    pub flags: PrintFlags,
    pub width: PrintWidth,
    pub precision: PrintPrecision,
    pub conversion: Conversion,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum FormatAtom {
    Literal(String),
    Placeholder(Placeholder),
}

/// Parsed format string.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FormatTemplate {
    pub atoms: Vec<FormatAtom>,
}

impl FormatTemplate {
    fn placeholders(&self) -> impl Iterator<Item = &Placeholder> {
        self.atoms.iter().filter_map(|atom| match atom {
            FormatAtom::Placeholder(placeholder) => Some(placeholder),
            FormatAtom::Literal(_) => None,
        })
    }
}

impl Display for FormatTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        for atom in &self.atoms {
            match atom {
                FormatAtom::Literal(s) => {
                    for c in s.chars() {
                        match c {
                            '{' => f.write_str("{{")?,
                            '}' => f.write_str("}}")?,
                            c => fmt::Write::write_char(f, c)?,
                        }
                    }
                }
                FormatAtom::Placeholder(placeholder) => {
                    f.write_str("{:")?;
                    let flags = placeholder.flags;
                    for (flag, c) in [
                        (PrintFlags::LeftJustify, '<'),
                        (PrintFlags::PositiveSign, '+'),
                        (PrintFlags::SignPlaceholder, ' '),
                        (PrintFlags::BasePrefix, '#'),
                        (PrintFlags::ZeroPad, '0'),
                    ] {
                        if flags.contains(flag) {
                            fmt::Write::write_char(f, c)?;
                        }
                    }
                    if let PrintWidth::Fixed(width) = placeholder.width {
                        write!(f, "{width}")?;
                    }
                    if let PrintPrecision::Fixed(precision) = placeholder.precision {
                        write!(f, ".{precision}")?;
                    }
                    write!(f, "{}}}", placeholder.conversion.type_char())?;
                }
            }
        }
        Ok(())
    }
}

/// Errors detected when parsing a format string.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
#[non_exhaustive]
pub enum FormatError {
    #[error("Could not parse the format string: {0}")]
    ParseError(Box<VerboseParseError>),

    #[error("Invalid width: {0}")]
    InvalidWidth(u64),

    #[error("Could not decode UTF-8 string: {0}")]
    DecodeUtf8(String),
}

impl From<Utf8Error> for FormatError {
    fn from(x: Utf8Error) -> FormatError {
        FormatError::DecodeUtf8(x.to_string())
    }
}

impl<I: AsRef<[u8]>, I2: AsRef<[u8]>> FromParseError<I, nom_language::error::VerboseError<I2>>
    for FormatError
{
    fn from_parse_error(input: I, err: &nom_language::error::VerboseError<I2>) -> Self {
        FormatError::ParseError(Box::new(VerboseParseError::new(input, err)))
    }
}

impl<I: AsRef<[u8]>> FromParseError<I, ()> for FormatError {
    fn from_parse_error(input: I, _err: &()) -> Self {
        FormatError::ParseError(Box::new(VerboseParseError::from_input(input)))
    }
}

fn format_string_parser<'a, E>() -> impl nom::Parser<&'a [u8], Output = FormatTemplate, Error = E>
where
    E: ParseError<&'a [u8]> + ContextError<&'a [u8]> + FromExternalError<&'a [u8], FormatError>,
{
    move |input| {
        let annotation = || {
            context(
                "annotation",
                delimited(char('{'), take_till(|c| c == b'}'), char('}')),
            )
        };

        let flags = || {
            context(
                "flag",
                alt((
                    char('-').map(|_| PrintFlags::LeftJustify),
                    char('+').map(|_| PrintFlags::PositiveSign),
                    char(' ').map(|_| PrintFlags::SignPlaceholder),
                    char('#').map(|_| PrintFlags::BasePrefix),
                    char('0').map(|_| PrintFlags::ZeroPad),
                    // Thousands grouping is ignored
                    char('\'').map(|_| PrintFlags::empty()),
                )),
            )
        };

        let width = || {
            context(
                "width",
                alt((
                    char('*').map(|_| PrintWidth::Dynamic),
                    map_res_cut(txt_u64, |width| {
                        usize::try_from(width)
                            .map(PrintWidth::Fixed)
                            .map_err(|_| FormatError::InvalidWidth(width))
                    }),
                    success(PrintWidth::Unmodified),
                )),
            )
        };

        let precision = || {
            context(
                "precision",
                opt(preceded(
                    char('.'),
                    alt((
                        char('*').map(|_| PrintPrecision::Dynamic),
                        // No value after the dot is same as an explicit 0
                        opt(txt_u64).map(|precision| {
                            let precision = precision.unwrap_or(0);
                            PrintPrecision::Fixed(usize::try_from(precision).unwrap_or(usize::MAX))
                        }),
                    )),
                )),
            )
            .map(|precision| precision.unwrap_or(PrintPrecision::Unmodified))
        };

        let length = || many0(one_of("hlqjztL"));
        let conversion = || one_of("diuoxXpcs@PeEfFgGaA").map(Conversion::from_char);

        let placeholder = || {
            context(
                "placeholder",
                map_res_cut(
                    preceded(
                        char('%'),
                        (
                            opt(annotation()),
                            many0(flags()),
                            width(),
                            precision(),
                            length(),
                            conversion(),
                        ),
                    ),
                    |(annotation, flags, width, precision, _length, conversion)| -> Result<_, FormatError> {
                        let annotation = match annotation {
                            Some(annotation) => Some(from_utf8(annotation)?.trim().to_string()),
                            None => None,
                        };
                        Ok(FormatAtom::Placeholder(Placeholder {
                            annotation,
                            flags: PrintFlags::from_iter(flags),
                            width,
                            precision,
                            conversion,
                        }))
                    },
                ),
            )
        };

        let mut parser = context(
            "format string",
            many0(alt((
                tag("%%").map(|_| FormatAtom::Literal("%".into())),
                placeholder(),
                // Unknown conversions are kept as they are.
                char('%').map(|_| FormatAtom::Literal("%".into())),
                context(
                    "literal",
                    map_res_cut(is_not("%"), |s: &[u8]| -> Result<_, FormatError> {
                        Ok(FormatAtom::Literal(from_utf8(s)?.into()))
                    }),
                ),
            )))
            .map(|atoms: Vec<FormatAtom>| {
                // Merge consecutive FormatAtom::Literal together
                let mut merged = Vec::with_capacity(atoms.len());
                for (is_literal, group) in &atoms
                    .into_iter()
                    .chunk_by(|x| matches!(x, FormatAtom::Literal(_)))
                {
                    if is_literal {
                        let merged_s = group
                            .filter_map(|x| match x {
                                FormatAtom::Literal(s) => Some(s),
                                FormatAtom::Placeholder(_) => None,
                            })
                            .collect();
                        merged.push(FormatAtom::Literal(merged_s))
                    } else {
                        merged.extend(group)
                    }
                }
                FormatTemplate { atoms: merged }
            }),
        );
        parser.parse(input)
    }
}

/// Parse a format string into a [FormatTemplate].
pub fn parse_format_string(fmt: &str) -> Result<FormatTemplate, FormatError> {
    format_string_parser::<NomError<FormatError, nom_language::error::VerboseError<&[u8]>>>()
        .parse_finish(fmt.as_bytes())
}

/// A format string rewritten into a template and the decoders of its placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RewrittenFormat {
    pub template: FormatTemplate,
    pub decoders: Vec<FormatDecoder>,
}

impl RewrittenFormat {
    pub fn new(template: FormatTemplate) -> Self {
        let decoders = template
            .placeholders()
            .map(|placeholder| FormatDecoder {
                annotation: placeholder.annotation.clone(),
                value_class: placeholder.conversion.value_class(),
            })
            .collect();
        RewrittenFormat { template, decoders }
    }

    /// Interpolate `args` in the template.
    ///
    /// Missing arguments are rendered as `<decode: missing data>` and redacted ones as
    /// `<private>`.
    pub fn render(&self, args: &[Argument], registry: &DecoderRegistry) -> String {
        let mut out = String::new();
        let mut args = args.iter().peekable();

        for atom in &self.template.atoms {
            match atom {
                FormatAtom::Literal(s) => out.push_str(s),
                FormatAtom::Placeholder(placeholder) => {
                    let width = match placeholder.width {
                        PrintWidth::Unmodified => None,
                        PrintWidth::Fixed(width) => Some(width),
                        PrintWidth::Dynamic => dynamic_arg(args.next()),
                    };
                    let precision = match placeholder.precision {
                        PrintPrecision::Unmodified => None,
                        PrintPrecision::Fixed(precision) => Some(precision),
                        PrintPrecision::Dynamic => dynamic_arg(args.next()),
                    };
                    // Precision items are also emitted for fixed precisions.
                    while let Some(Argument::Precision(_)) = args.peek() {
                        args.next();
                    }
                    out.push_str(&render_value(
                        placeholder,
                        args.next(),
                        width,
                        precision,
                        registry,
                    ));
                }
            }
        }
        out
    }
}

fn dynamic_arg(arg: Option<&Argument>) -> Option<usize> {
    match arg {
        Some(arg @ (Argument::Precision(_) | Argument::Integer { .. })) => {
            Some(usize::try_from(arg.as_unsigned()).unwrap_or(usize::MAX))
        }
        _ => None,
    }
}

fn render_value(
    placeholder: &Placeholder,
    value: Option<&Argument>,
    width: Option<usize>,
    precision: Option<usize>,
    registry: &DecoderRegistry,
) -> String {
    let value = match value {
        None | Some(Argument::Missing) => return "<decode: missing data>".into(),
        Some(Argument::Private) => return "<private>".into(),
        Some(value) => value,
    };

    if let Some(annotation) = &placeholder.annotation {
        for name in annotation.split(',').map(str::trim) {
            if let Some(decoded) = registry.decode(name, value) {
                return decoded;
            }
        }
    }

    let flags = placeholder.flags;
    let sign = |x: i64| -> &'static str {
        if x < 0 {
            ""
        } else if flags.contains(PrintFlags::PositiveSign) {
            "+"
        } else if flags.contains(PrintFlags::SignPlaceholder) {
            " "
        } else {
            ""
        }
    };
    let prefix = |s: &'static str| -> &'static str {
        if flags.contains(PrintFlags::BasePrefix) {
            s
        } else {
            ""
        }
    };

    let (s, numeric) = match (value, placeholder.conversion) {
        (Argument::String(s), conversion) => {
            let s = match (conversion, precision) {
                (Conversion::Str | Conversion::Object, Some(precision)) => {
                    s.chars().take(precision).collect()
                }
                _ => s.clone(),
            };
            (s, false)
        }
        (Argument::Data(data), _) => (data.iter().map(|x| format!("{x:02x}")).collect(), false),
        (value, Conversion::Signed) => {
            let x = value.as_signed();
            (format!("{}{x}", sign(x)), true)
        }
        (value, Conversion::Unsigned) => (value.as_unsigned().to_string(), true),
        (value, Conversion::Octal) => (format!("{}{:o}", prefix("0"), value.as_unsigned()), true),
        (value, Conversion::Hex) => (format!("{}{:x}", prefix("0x"), value.as_unsigned()), true),
        (value, Conversion::UpperHex) => {
            (format!("{}{:X}", prefix("0X"), value.as_unsigned()), true)
        }
        (value, Conversion::Pointer) => (value.as_unsigned().to_string(), true),
        (value, Conversion::Char) => {
            let c = char::from_u32(value.as_unsigned() as u32).unwrap_or(char::REPLACEMENT_CHARACTER);
            (c.to_string(), false)
        }
        (value, Conversion::Float(c)) => {
            let x = value.as_f64();
            let precision = precision.unwrap_or(6);
            let s = match c {
                'e' => format!("{x:.precision$e}"),
                'E' => format!("{x:.precision$E}"),
                'f' | 'F' => format!("{x:.precision$}"),
                _ => format!("{x}"),
            };
            (s, true)
        }
        (value, Conversion::Str | Conversion::Object | Conversion::Data) => {
            (value.as_signed().to_string(), false)
        }
    };
    pad(s, flags, width, numeric)
}

fn pad(s: String, flags: PrintFlags, width: Option<usize>, numeric: bool) -> String {
    let width = match width {
        Some(width) => width,
        None => return s,
    };
    let len = s.chars().count();
    if len >= width {
        return s;
    }
    let fill = width - len;

    if flags.contains(PrintFlags::LeftJustify) {
        format!("{s}{}", " ".repeat(fill))
    } else if flags.contains(PrintFlags::ZeroPad) && numeric {
        // Zeros go after the sign and base prefix
        let unsigned = s.trim_start_matches(['+', '-', ' ']);
        let mut split = s.len() - unsigned.len();
        if unsigned.starts_with("0x") || unsigned.starts_with("0X") {
            split += 2;
        }
        format!("{}{}{}", &s[..split], "0".repeat(fill), &s[split..])
    } else {
        format!("{}{s}", " ".repeat(fill))
    }
}

/// Rewrite a format string into a [RewrittenFormat].
///
/// This never fails: strings that cannot be parsed are kept as literal text.
pub fn rewrite_format_string(fmt: Option<&str>) -> RewrittenFormat {
    match fmt {
        None => RewrittenFormat::default(),
        Some(fmt) => match parse_format_string(fmt) {
            Ok(template) => RewrittenFormat::new(template),
            Err(err) => {
                log::warn!("Could not parse format string {fmt:?}: {err}");
                RewrittenFormat::new(FormatTemplate {
                    atoms: vec![FormatAtom::Literal(fmt.into())],
                })
            }
        },
    }
}

/// Cache of rewritten format strings, keyed by the raw format string.
///
/// Entries are only ever inserted, so a given raw string is always mapped to the same
/// [RewrittenFormat].
#[derive(Default)]
pub struct FormatStringCache {
    cache: RwLock<BTreeMap<String, Arc<RewrittenFormat>>>,
}

impl FormatStringCache {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn get(&self, fmt: &str) -> Arc<RewrittenFormat> {
        if let Some(rewritten) = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(fmt)
        {
            return Arc::clone(rewritten);
        }

        let rewritten = Arc::new(rewrite_format_string(Some(fmt)));
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(cache.entry(fmt.to_owned()).or_insert(rewritten))
    }

    pub fn len(&self) -> usize {
        self.cache.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Debug for FormatStringCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_struct("FormatStringCache")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{decoders::DEFAULT_DECODERS, parser::tests::test_parser};

    fn test_rewrite(fmt: Option<&str>, expected: &str, decoders: Vec<FormatDecoder>) {
        let rewritten = rewrite_format_string(fmt);
        assert_eq!(rewritten.template.to_string(), expected, "while rewriting {fmt:?}");
        assert_eq!(rewritten.decoders, decoders, "while rewriting {fmt:?}");
    }

    #[test]
    fn rewrite_test() {
        let signed = || FormatDecoder::new(None, Some(ValueClass::Signed));
        let unsigned = || FormatDecoder::new(None, Some(ValueClass::Unsigned));

        test_rewrite(None, "", vec![]);
        test_rewrite(Some("text"), "text", vec![]);
        test_rewrite(Some("%%"), "%", vec![]);
        test_rewrite(Some("%d"), "{:d}", vec![signed()]);
        test_rewrite(Some("%s"), "{:s}", vec![FormatDecoder::new(None, None)]);
        test_rewrite(Some("%p"), "{:d}", vec![unsigned()]);
        test_rewrite(Some("%u"), "{:d}", vec![unsigned()]);
        test_rewrite(Some("0x%lx"), "0x{:x}", vec![unsigned()]);
        test_rewrite(Some("0x%02x"), "0x{:02x}", vec![unsigned()]);
        test_rewrite(
            Some("%{public}s"),
            "{:s}",
            vec![FormatDecoder::new(Some("public"), None)],
        );
    }

    #[test]
    fn rewrite_extra_test() {
        test_rewrite(
            Some("%{public, errno}d: %-8.3f%%"),
            "{:d}: {:<8.3f}%",
            vec![
                FormatDecoder::new(Some("public, errno"), Some(ValueClass::Signed)),
                FormatDecoder::new(None, Some(ValueClass::Float)),
            ],
        );
        test_rewrite(
            Some("%.*s %@ %.16P %c %llo"),
            "{:s} {:s} {:.16s} {:c} {:o}",
            vec![
                FormatDecoder::new(None, None),
                FormatDecoder::new(None, None),
                FormatDecoder::new(None, None),
                FormatDecoder::new(None, Some(ValueClass::Signed)),
                FormatDecoder::new(None, Some(ValueClass::Unsigned)),
            ],
        );
        // Unknown conversion and dangling percent
        test_rewrite(Some("50%k done %"), "50%k done %", vec![]);
        test_rewrite(Some("{%d}"), "{{{:d}}}", vec![FormatDecoder::new(None, Some(ValueClass::Signed))]);
    }

    #[test]
    fn parser_test() {
        let test = |src: &[u8], expected: Vec<FormatAtom>| {
            test_parser(
                FormatTemplate { atoms: expected },
                src,
                format_string_parser::<NomError<FormatError, nom_language::error::VerboseError<_>>>(),
            )
        };

        test(
            b"pid %#010x",
            vec![
                FormatAtom::Literal("pid ".into()),
                FormatAtom::Placeholder(Placeholder {
                    annotation: None,
                    flags: PrintFlags::BasePrefix | PrintFlags::ZeroPad,
                    width: PrintWidth::Fixed(10),
                    precision: PrintPrecision::Unmodified,
                    conversion: Conversion::Hex,
                }),
            ],
        );
        test(
            b"%{private}*.*s",
            vec![FormatAtom::Placeholder(Placeholder {
                annotation: Some("private".into()),
                flags: PrintFlags::empty(),
                width: PrintWidth::Dynamic,
                precision: PrintPrecision::Dynamic,
                conversion: Conversion::Str,
            })],
        );
        test(b"", vec![]);
    }

    #[test]
    fn render_test() {
        let registry = &*DEFAULT_DECODERS;
        let int = |value: i64, size: u8| Argument::Integer {
            value: value as u64,
            size,
        };

        let render = |fmt: &str, args: &[Argument]| {
            rewrite_format_string(Some(fmt)).render(args, registry)
        };

        assert_eq!(render("%d %u", &[int(-2, 4), int(-2, 4)]), "-2 4294967294");
        assert_eq!(render("0x%02x|%5d|%-5d|", &[int(10, 4), int(42, 4), int(42, 4)]), "0x0a|   42|42   |");
        assert_eq!(render("%#x %p", &[int(255, 8), int(0x1000, 8)]), "0xff 4096");
        assert_eq!(render("%p", &[int(4096, 8)]), "4096");
        assert_eq!(render("%hhu %hu", &[int(-1, 1), int(-1, 2)]), "255 65535");
        assert_eq!(render("%+d", &[int(3, 4)]), "+3");
        assert_eq!(
            render("%{public}s: %s", &[Argument::String("hello".into()), Argument::Private]),
            "hello: <private>"
        );
        assert_eq!(render("%s and %d", &[Argument::String("x".into())]), "x and <decode: missing data>");
        assert_eq!(
            render("%.*s!", &[Argument::Precision(3), Argument::String("abcdef".into())]),
            "abc!"
        );
        assert_eq!(
            render("%.2s!", &[Argument::Precision(2), Argument::String("abcdef".into())]),
            "ab!"
        );
        assert_eq!(
            render("%.2f", &[Argument::Integer { value: 1.5f64.to_bits(), size: 8 }]),
            "1.50"
        );
        assert_eq!(render("%P", &[Argument::Data(vec![0xde, 0xad])]), "dead");
        assert_eq!(render("%c", &[int(0x41, 1)]), "A");
        assert_eq!(render("%{errno}d", &[int(2, 4)]), "[2: No such file or directory]");
        assert_eq!(render("%{public, odtypes:mode_t}o", &[int(0o700, 4)]), "-rwx------");
        assert_eq!(render("%{bool}d %{BOOL}d", &[int(1, 4), int(0, 4)]), "true NO");
        assert_eq!(render("%{unknown}d", &[int(7, 4)]), "7");
    }

    #[test]
    fn cache_test() {
        let cache = FormatStringCache::new();
        assert!(cache.is_empty());

        let first = cache.get("%d items");
        let second = cache.get("%d items");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
        assert_eq!(first.template.to_string(), "{:d} items");
        assert_eq!(*first, rewrite_format_string(Some("%d items")));

        cache.get("%s");
        assert_eq!(cache.len(), 2);
    }
}
