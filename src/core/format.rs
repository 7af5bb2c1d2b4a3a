//! Call sites and the format engine
//!
//! A [`CallSite`] is the static half of a log call: the format string and
//! where it lives in the source. It is validated in a `const fn`, so a call
//! site built inside a `static` (as the logging macros do) fails the build
//! when its placeholders do not match the argument count.
//!
//! The consumer renders records through [`render`], which supports the
//! subset of `std::fmt` syntax that can be applied to the decoded argument
//! values: implicit and positional placeholders, `?`, `x`, `X`, `o`, `b`,
//! `e`, `E`, fill and alignment, `+`, `#`, `0`, width and precision.
//! Named arguments and widths or precisions taken from arguments are
//! rejected.

use super::record::Arg;
use std::fmt::Write;

/// Static description of a log call
#[derive(Debug)]
pub struct CallSite {
    pub format: &'static str,
    pub file: &'static str,
    pub line: u32,
    pub module_path: &'static str,
    pub arg_count: usize,
}

impl CallSite {
    /// Build and validate a call site
    ///
    /// # Panics
    ///
    /// Panics if the format string is malformed, uses unsupported syntax, or
    /// references a different number of arguments than `arg_count`. Inside a
    /// constant this is a compile error.
    pub const fn new(
        format: &'static str,
        file: &'static str,
        line: u32,
        module_path: &'static str,
        arg_count: usize,
    ) -> Self {
        match count_arguments(format) {
            Ok(count) => {
                if count != arg_count {
                    panic!("log format placeholder count does not match the number of arguments");
                }
            }
            Err(FormatError::UnmatchedOpen) => panic!("log format has an unmatched '{{'"),
            Err(FormatError::UnmatchedClose) => panic!("log format has an unmatched '}}'"),
            Err(FormatError::NamedArgument) => {
                panic!("log format uses a named argument, only positional arguments are supported")
            }
            Err(FormatError::DynamicSpec) => {
                panic!("log format takes width or precision from an argument, which is not supported")
            }
            Err(FormatError::InvalidSpec) => panic!("log format has an invalid format spec"),
        }

        Self {
            format,
            file,
            line,
            module_path,
            arg_count,
        }
    }

    /// Source file name without its directory
    pub fn file_name(&self) -> &'static str {
        self.file.rsplit(|c| c == '/' || c == '\\').next().unwrap_or(self.file)
    }
}

/// Format string problems detected by the validator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatError {
    UnmatchedOpen,
    UnmatchedClose,
    NamedArgument,
    DynamicSpec,
    InvalidSpec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Display,
    Debug,
    LowerHex,
    UpperHex,
    Octal,
    Binary,
    LowerExp,
    UpperExp,
}

/// Parsed `:spec` part of a placeholder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Spec {
    pub fill: char,
    pub align: Option<Align>,
    pub plus: bool,
    pub alternate: bool,
    pub zero: bool,
    pub width: Option<usize>,
    pub precision: Option<usize>,
    pub kind: Kind,
}

impl Spec {
    pub const DEFAULT: Spec = Spec {
        fill: ' ',
        align: None,
        plus: false,
        alternate: false,
        zero: false,
        width: None,
        precision: None,
        kind: Kind::Display,
    };
}

impl Default for Spec {
    fn default() -> Self {
        Spec::DEFAULT
    }
}

const fn utf8_width(lead: u8) -> usize {
    if lead < 0x80 {
        1
    } else if lead >> 5 == 0b110 {
        2
    } else if lead >> 4 == 0b1110 {
        3
    } else {
        4
    }
}

const fn decode_char(bytes: &[u8], i: usize, width: usize) -> char {
    let b0 = bytes[i] as u32;
    let code = match width {
        1 => b0,
        2 => ((b0 & 0x1F) << 6) | (bytes[i + 1] as u32 & 0x3F),
        3 => ((b0 & 0x0F) << 12) | ((bytes[i + 1] as u32 & 0x3F) << 6) | (bytes[i + 2] as u32 & 0x3F),
        _ => {
            ((b0 & 0x07) << 18)
                | ((bytes[i + 1] as u32 & 0x3F) << 12)
                | ((bytes[i + 2] as u32 & 0x3F) << 6)
                | (bytes[i + 3] as u32 & 0x3F)
        }
    };
    match char::from_u32(code) {
        Some(c) => c,
        None => ' ',
    }
}

const fn align_of(byte: u8) -> Option<Align> {
    match byte {
        b'<' => Some(Align::Left),
        b'^' => Some(Align::Center),
        b'>' => Some(Align::Right),
        _ => None,
    }
}

const fn is_ident_start(byte: u8) -> bool {
    byte == b'_' || byte.is_ascii_alphabetic()
}

/// Parse a decimal number at `i`, returning it and the index after it
const fn parse_number(bytes: &[u8], mut i: usize) -> (Option<usize>, usize) {
    let mut value: Option<usize> = None;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        let digit = (bytes[i] - b'0') as usize;
        value = match value {
            Some(v) => Some(v * 10 + digit),
            None => Some(digit),
        };
        i += 1;
    }
    (value, i)
}

/// Parse a spec starting after the `:`; returns the index of the closing `}`
const fn parse_spec(bytes: &[u8], mut i: usize) -> Result<(Spec, usize), FormatError> {
    let len = bytes.len();
    let mut spec = Spec::DEFAULT;

    if i < len {
        let width = utf8_width(bytes[i]);
        if i + width < len && align_of(bytes[i + width]).is_some() && bytes[i] != b'}' {
            spec.fill = decode_char(bytes, i, width);
            spec.align = align_of(bytes[i + width]);
            i += width + 1;
        } else if align_of(bytes[i]).is_some() {
            spec.align = align_of(bytes[i]);
            i += 1;
        }
    }

    if i < len && bytes[i] == b'+' {
        spec.plus = true;
        i += 1;
    } else if i < len && bytes[i] == b'-' {
        i += 1;
    }

    if i < len && bytes[i] == b'#' {
        spec.alternate = true;
        i += 1;
    }

    if i < len && bytes[i] == b'0' && !(i + 1 < len && bytes[i + 1] == b'$') {
        spec.zero = true;
        i += 1;
    }

    let (width, next) = parse_number(bytes, i);
    i = next;
    if i < len && bytes[i] == b'$' {
        return Err(FormatError::DynamicSpec);
    }
    if width.is_none() && i < len && is_ident_start(bytes[i]) {
        // `name$` width; a bare type letter is handled below
        let mut j = i;
        while j < len && (is_ident_start(bytes[j]) || bytes[j].is_ascii_digit()) {
            j += 1;
        }
        if j < len && bytes[j] == b'$' {
            return Err(FormatError::DynamicSpec);
        }
    }
    spec.width = width;

    if i < len && bytes[i] == b'.' {
        i += 1;
        if i < len && bytes[i] == b'*' {
            return Err(FormatError::DynamicSpec);
        }
        let (precision, next) = parse_number(bytes, i);
        if precision.is_none() {
            return Err(FormatError::InvalidSpec);
        }
        i = next;
        if i < len && bytes[i] == b'$' {
            return Err(FormatError::DynamicSpec);
        }
        spec.precision = precision;
    }

    if i < len {
        match bytes[i] {
            b'?' => {
                spec.kind = Kind::Debug;
                i += 1;
            }
            b'x' | b'X' if i + 1 < len && bytes[i + 1] == b'?' => {
                spec.kind = Kind::Debug;
                i += 2;
            }
            b'x' => {
                spec.kind = Kind::LowerHex;
                i += 1;
            }
            b'X' => {
                spec.kind = Kind::UpperHex;
                i += 1;
            }
            b'o' => {
                spec.kind = Kind::Octal;
                i += 1;
            }
            b'b' => {
                spec.kind = Kind::Binary;
                i += 1;
            }
            b'e' => {
                spec.kind = Kind::LowerExp;
                i += 1;
            }
            b'E' => {
                spec.kind = Kind::UpperExp;
                i += 1;
            }
            _ => {}
        }
    }

    if i < len && bytes[i] == b'}' {
        Ok((spec, i))
    } else if i >= len {
        Err(FormatError::UnmatchedOpen)
    } else {
        Err(FormatError::InvalidSpec)
    }
}

/// Parse a placeholder starting after its `{`
///
/// Returns the explicit position (if any), the spec and the index after
/// the closing `}`.
const fn parse_placeholder(
    bytes: &[u8],
    mut i: usize,
) -> Result<(Option<usize>, Spec, usize), FormatError> {
    let len = bytes.len();

    let (position, next) = parse_number(bytes, i);
    i = next;
    if position.is_none() && i < len && is_ident_start(bytes[i]) {
        return Err(FormatError::NamedArgument);
    }

    if i >= len {
        return Err(FormatError::UnmatchedOpen);
    }
    match bytes[i] {
        b'}' => Ok((position, Spec::DEFAULT, i + 1)),
        b':' => match parse_spec(bytes, i + 1) {
            Ok((spec, close)) => Ok((position, spec, close + 1)),
            Err(e) => Err(e),
        },
        _ => Err(FormatError::InvalidSpec),
    }
}

/// Number of arguments a format string consumes
pub const fn count_arguments(format: &str) -> Result<usize, FormatError> {
    let bytes = format.as_bytes();
    let len = bytes.len();
    let mut i = 0;
    let mut implicit = 0;
    let mut explicit = 0;

    while i < len {
        match bytes[i] {
            b'{' => {
                if i + 1 < len && bytes[i + 1] == b'{' {
                    i += 2;
                    continue;
                }
                match parse_placeholder(bytes, i + 1) {
                    Ok((Some(position), _, next)) => {
                        if position + 1 > explicit {
                            explicit = position + 1;
                        }
                        i = next;
                    }
                    Ok((None, _, next)) => {
                        implicit += 1;
                        i = next;
                    }
                    Err(e) => return Err(e),
                }
            }
            b'}' => {
                if i + 1 < len && bytes[i + 1] == b'}' {
                    i += 2;
                } else {
                    return Err(FormatError::UnmatchedClose);
                }
            }
            _ => i += 1,
        }
    }

    if implicit > explicit {
        Ok(implicit)
    } else {
        Ok(explicit)
    }
}

/// Render `format` with the decoded `args` into `out`
///
/// Placeholders without a matching argument render as `<missing>`.
pub fn render(format: &str, args: &[Arg<'_>], out: &mut String) {
    let bytes = format.as_bytes();
    let len = bytes.len();
    let mut i = 0;
    let mut literal_start = 0;
    let mut implicit = 0;

    while i < len {
        match bytes[i] {
            b'{' | b'}' if i + 1 < len && bytes[i + 1] == bytes[i] => {
                out.push_str(&format[literal_start..=i]);
                i += 2;
                literal_start = i;
            }
            b'{' => {
                out.push_str(&format[literal_start..i]);
                match parse_placeholder(bytes, i + 1) {
                    Ok((position, spec, next)) => {
                        let index = position.unwrap_or_else(|| {
                            implicit += 1;
                            implicit - 1
                        });
                        match args.get(index) {
                            Some(arg) => write_arg(out, arg, &spec),
                            None => out.push_str("<missing>"),
                        }
                        i = next;
                    }
                    Err(_) => {
                        // emit the rest verbatim
                        out.push_str(&format[i..]);
                        return;
                    }
                }
                literal_start = i;
            }
            _ => i += 1,
        }
    }
    out.push_str(&format[literal_start..]);
}

struct Body {
    sign: &'static str,
    prefix: &'static str,
    text: String,
    numeric: bool,
}

impl Body {
    fn text(text: String) -> Self {
        Body {
            sign: "",
            prefix: "",
            text,
            numeric: false,
        }
    }

    fn number(mut text: String, spec: &Spec, prefix: &'static str) -> Self {
        let sign = if text.starts_with('-') {
            text.remove(0);
            "-"
        } else if spec.plus {
            "+"
        } else {
            ""
        };
        Body {
            sign,
            prefix: if spec.alternate { prefix } else { "" },
            text,
            numeric: true,
        }
    }
}

macro_rules! integer_body {
    ($v:expr, $spec:expr) => {
        match $spec.kind {
            Kind::Display | Kind::Debug => Body::number($v.to_string(), $spec, ""),
            Kind::LowerHex => Body::number(format!("{:x}", $v), $spec, "0x"),
            Kind::UpperHex => Body::number(format!("{:X}", $v), $spec, "0x"),
            Kind::Octal => Body::number(format!("{:o}", $v), $spec, "0o"),
            Kind::Binary => Body::number(format!("{:b}", $v), $spec, "0b"),
            Kind::LowerExp => Body::number(format!("{:e}", $v), $spec, ""),
            Kind::UpperExp => Body::number(format!("{:E}", $v), $spec, ""),
        }
    };
}

macro_rules! float_body {
    ($v:expr, $spec:expr) => {{
        let text = match ($spec.kind, $spec.precision) {
            (Kind::Debug, Some(p)) => format!("{:.*?}", p, $v),
            (Kind::Debug, None) => format!("{:?}", $v),
            (Kind::LowerExp, Some(p)) => format!("{:.*e}", p, $v),
            (Kind::LowerExp, None) => format!("{:e}", $v),
            (Kind::UpperExp, Some(p)) => format!("{:.*E}", p, $v),
            (Kind::UpperExp, None) => format!("{:E}", $v),
            (_, Some(p)) => format!("{:.*}", p, $v),
            (_, None) => $v.to_string(),
        };
        Body::number(text, $spec, "")
    }};
}

fn str_body(s: &str, spec: &Spec) -> Body {
    let s = match spec.precision {
        Some(p) => match s.char_indices().nth(p) {
            Some((end, _)) => &s[..end],
            None => s,
        },
        None => s,
    };
    if spec.kind == Kind::Debug {
        Body::text(format!("{:?}", s))
    } else {
        Body::text(s.to_string())
    }
}

fn body_of(arg: &Arg<'_>, spec: &Spec) -> Body {
    match arg {
        Arg::I8(v) => integer_body!(*v, spec),
        Arg::I16(v) => integer_body!(*v, spec),
        Arg::I32(v) => integer_body!(*v, spec),
        Arg::I64(v) => integer_body!(*v, spec),
        Arg::U64(v) => integer_body!(*v, spec),
        Arg::I128(v) => integer_body!(*v, spec),
        Arg::U128(v) => integer_body!(*v, spec),
        Arg::F32(v) => float_body!(*v, spec),
        Arg::F64(v) => float_body!(*v, spec),
        Arg::Bool(v) => Body::text(v.to_string()),
        Arg::Char(c) if spec.kind == Kind::Debug => Body::text(format!("{:?}", c)),
        Arg::Char(c) => Body::text(c.to_string()),
        Arg::Str(s) => str_body(s, spec),
        Arg::Shared(s) => str_body(s, spec),
        Arg::Formatted(s) => Body::text((*s).to_string()),
        Arg::Truncated => Body::text("<truncated>".to_string()),
        Arg::None => Body::text("None".to_string()),
        Arg::Some(inner) => {
            let inner = body_of(inner, &Spec { width: None, ..*spec });
            let mut text = String::with_capacity(inner.text.len() + 8);
            if spec.kind == Kind::Debug {
                text.push_str("Some(");
            }
            text.push_str(inner.sign);
            text.push_str(inner.prefix);
            text.push_str(&inner.text);
            if spec.kind == Kind::Debug {
                text.push(')');
            }
            Body::text(text)
        }
    }
}

fn push_fill(out: &mut String, fill: char, count: usize) {
    for _ in 0..count {
        out.push(fill);
    }
}

fn write_arg(out: &mut String, arg: &Arg<'_>, spec: &Spec) {
    let body = body_of(arg, spec);
    let len = body.sign.len() + body.prefix.len() + body.text.chars().count();

    let width = match spec.width {
        Some(w) if w > len => w,
        _ => {
            out.push_str(body.sign);
            out.push_str(body.prefix);
            out.push_str(&body.text);
            return;
        }
    };
    let padding = width - len;

    if spec.zero && body.numeric {
        out.push_str(body.sign);
        out.push_str(body.prefix);
        push_fill(out, '0', padding);
        out.push_str(&body.text);
        return;
    }

    let default_align = if body.numeric { Align::Right } else { Align::Left };
    let (before, after) = match spec.align.unwrap_or(default_align) {
        Align::Left => (0, padding),
        Align::Right => (padding, 0),
        Align::Center => (padding / 2, padding - padding / 2),
    };
    push_fill(out, spec.fill, before);
    let _ = write!(out, "{}{}{}", body.sign, body.prefix, body.text);
    push_fill(out, spec.fill, after);
}
