//! Binary layout of the frames exchanged between sinks and the consumer
//!
//! The frame tag carries the record kind. Log records start with a fixed
//! 24-byte header:
//!
//! ```text
//! 0   level       u8
//! 1   clock kind  u8
//! 2   arg count   u8
//! 3   flags       u8
//! 4   reserved    [u8; 4]
//! 8   timestamp   u64   (wall nanos as i64, or cycle-counter ticks)
//! 16  call site   u64   (address of a &'static CallSite)
//! 24  arguments
//! ```
//!
//! Each argument is a one-byte [`ArgTag`] followed by its value in little
//! endian. Control records carry their own small payloads.

use super::clock::{ClockKind, Timestamp};
use super::error::{LoggerError, Result};
use super::format::CallSite;
use super::log_level::LogLevel;
use std::sync::Arc;

/// Size of the log record header
pub const LOG_HEADER_LEN: usize = 24;

/// Header flag: the arguments did not fill their reservation
const FLAG_MALFORMED: u8 = 1;

/// Record kinds, stored in the frame tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum RecordKind {
    Log = 1,
    Sync = 2,
    Close = 3,
    Reopen = 4,
    SetName = 5,
}

impl RecordKind {
    pub const fn tag(self) -> u32 {
        self as u32
    }

    pub const fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            1 => Some(RecordKind::Log),
            2 => Some(RecordKind::Sync),
            3 => Some(RecordKind::Close),
            4 => Some(RecordKind::Reopen),
            5 => Some(RecordKind::SetName),
            _ => None,
        }
    }
}

/// Type tag preceding each encoded argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ArgTag {
    I64 = 1,
    U64 = 2,
    I128 = 3,
    U128 = 4,
    F32 = 5,
    F64 = 6,
    Bool = 7,
    Char = 8,
    /// u32 length, then UTF-8 bytes
    Str = 9,
    /// String longer than the sink's inline limit
    Truncated = 10,
    /// Address and length of a string owned elsewhere
    StaticStr = 11,
    /// Pointer from `Arc::<str>::into_raw`, released by the consumer
    SharedStr = 12,
    /// u32 reserved, u32 used, then `reserved` bytes of pre-formatted text
    Formatted = 13,
    None = 14,
    /// Followed by the wrapped value
    Some = 15,
    I8 = 16,
    I16 = 17,
    I32 = 18,
}

impl ArgTag {
    const fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(ArgTag::I64),
            2 => Some(ArgTag::U64),
            3 => Some(ArgTag::I128),
            4 => Some(ArgTag::U128),
            5 => Some(ArgTag::F32),
            6 => Some(ArgTag::F64),
            7 => Some(ArgTag::Bool),
            8 => Some(ArgTag::Char),
            9 => Some(ArgTag::Str),
            10 => Some(ArgTag::Truncated),
            11 => Some(ArgTag::StaticStr),
            12 => Some(ArgTag::SharedStr),
            13 => Some(ArgTag::Formatted),
            14 => Some(ArgTag::None),
            15 => Some(ArgTag::Some),
            16 => Some(ArgTag::I8),
            17 => Some(ArgTag::I16),
            18 => Some(ArgTag::I32),
            _ => None,
        }
    }
}

/// A decoded argument value
#[derive(Debug, Clone, PartialEq)]
pub enum Arg<'a> {
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U64(u64),
    I128(i128),
    U128(u128),
    F32(f32),
    F64(f64),
    Bool(bool),
    Char(char),
    Str(&'a str),
    Truncated,
    Shared(Arc<str>),
    Formatted(&'a str),
    None,
    Some(Box<Arg<'a>>),
}

/// Serialises arguments into a reserved frame payload
///
/// Custom [`LogArg`](super::args::LogArg) implementations describe
/// themselves through these primitives. The number of bytes written must
/// equal what `encoded_len` reported: writing more panics, and a record left
/// short is dropped and reported through the sink's error policy.
pub struct Encoder<'a> {
    buf: &'a mut [u8],
    pos: usize,
    max_inline: usize,
}

impl<'a> Encoder<'a> {
    pub(crate) fn new(buf: &'a mut [u8], max_inline: usize) -> Self {
        Self {
            buf,
            pos: 0,
            max_inline,
        }
    }

    /// Longest string stored inline
    pub fn max_inline(&self) -> usize {
        self.max_inline
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    fn put(&mut self, bytes: &[u8]) {
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
    }

    #[inline]
    fn tag(&mut self, tag: ArgTag) {
        self.put(&[tag as u8]);
    }

    /// Bytes taken by a string argument
    #[inline]
    pub fn str_len(s: &str, max_inline: usize) -> usize {
        if s.len() > max_inline {
            1
        } else {
            1 + 4 + s.len()
        }
    }

    pub fn i8(&mut self, v: i8) {
        self.tag(ArgTag::I8);
        self.put(&v.to_le_bytes());
    }

    pub fn i16(&mut self, v: i16) {
        self.tag(ArgTag::I16);
        self.put(&v.to_le_bytes());
    }

    pub fn i32(&mut self, v: i32) {
        self.tag(ArgTag::I32);
        self.put(&v.to_le_bytes());
    }

    pub fn i64(&mut self, v: i64) {
        self.tag(ArgTag::I64);
        self.put(&v.to_le_bytes());
    }

    pub fn u64(&mut self, v: u64) {
        self.tag(ArgTag::U64);
        self.put(&v.to_le_bytes());
    }

    pub fn i128(&mut self, v: i128) {
        self.tag(ArgTag::I128);
        self.put(&v.to_le_bytes());
    }

    pub fn u128(&mut self, v: u128) {
        self.tag(ArgTag::U128);
        self.put(&v.to_le_bytes());
    }

    pub fn f32(&mut self, v: f32) {
        self.tag(ArgTag::F32);
        self.put(&v.to_le_bytes());
    }

    pub fn f64(&mut self, v: f64) {
        self.tag(ArgTag::F64);
        self.put(&v.to_le_bytes());
    }

    pub fn bool(&mut self, v: bool) {
        self.tag(ArgTag::Bool);
        self.put(&[v as u8]);
    }

    pub fn char(&mut self, v: char) {
        self.tag(ArgTag::Char);
        self.put(&(v as u32).to_le_bytes());
    }

    /// Copy a string, or mark it truncated when it exceeds the inline limit
    pub fn str(&mut self, s: &str) {
        if s.len() > self.max_inline {
            self.tag(ArgTag::Truncated);
            return;
        }
        self.tag(ArgTag::Str);
        self.put(&(s.len() as u32).to_le_bytes());
        self.put(s.as_bytes());
    }

    /// Store only the address of a string
    ///
    /// # Safety
    ///
    /// `s` must stay valid until the consumer rendered the record.
    pub unsafe fn str_ref(&mut self, s: &str) {
        self.tag(ArgTag::StaticStr);
        self.put(&(s.as_ptr() as usize as u64).to_le_bytes());
        self.put(&(s.len() as u64).to_le_bytes());
    }

    /// Move a reference count into the record
    pub fn shared_str(&mut self, s: Arc<str>) {
        let len = s.len() as u64;
        let ptr = Arc::into_raw(s) as *const u8 as usize as u64;
        self.tag(ArgTag::SharedStr);
        self.put(&ptr.to_le_bytes());
        self.put(&len.to_le_bytes());
    }

    /// Format a value into `reserved` bytes of the record
    pub fn formatted(&mut self, reserved: usize, value: &dyn std::fmt::Display) {
        self.tag(ArgTag::Formatted);
        let header = self.pos;
        self.put(&(reserved as u32).to_le_bytes());
        self.put(&0u32.to_le_bytes());

        let start = self.pos;
        let window = &mut self.buf[start..start + reserved];
        let mut writer = BoundedWriter {
            buf: window,
            used: 0,
        };
        let _ = std::fmt::write(&mut writer, format_args!("{}", value));
        let used = writer.used as u32;
        self.buf[header + 4..header + 8].copy_from_slice(&used.to_le_bytes());
        self.pos = start + reserved;
    }

    /// Placeholder for a value that did not fit inline
    pub fn truncated(&mut self) {
        self.tag(ArgTag::Truncated);
    }

    pub fn none(&mut self) {
        self.tag(ArgTag::None);
    }

    /// Prefix for an optional value; the value follows
    pub fn some(&mut self) {
        self.tag(ArgTag::Some);
    }
}

/// `fmt::Write` into a fixed window, failing once it is full
struct BoundedWriter<'a> {
    buf: &'a mut [u8],
    used: usize,
}

impl std::fmt::Write for BoundedWriter<'_> {
    fn write_str(&mut self, s: &str) -> std::fmt::Result {
        let room = self.buf.len() - self.used;
        if s.len() > room {
            self.buf[self.used..].copy_from_slice(&s.as_bytes()[..room]);
            self.used += room;
            return Err(std::fmt::Error);
        }
        self.buf[self.used..self.used + s.len()].copy_from_slice(s.as_bytes());
        self.used += s.len();
        Ok(())
    }
}

/// Counts the bytes a `Display` value formats to
pub(crate) struct CountingWriter(pub usize);

impl std::fmt::Write for CountingWriter {
    fn write_str(&mut self, s: &str) -> std::fmt::Result {
        self.0 += s.len();
        Ok(())
    }
}

/// Write a log record into a frame payload
///
/// Returns `false` when the arguments wrote fewer bytes than reserved. The
/// unwritten tail is then filled with `None` tags and the record is flagged
/// so the consumer releases it without rendering.
pub(crate) fn encode_log<F>(
    buf: &mut [u8],
    level: LogLevel,
    timestamp: Timestamp,
    clock: ClockKind,
    callsite: &'static CallSite,
    arg_count: usize,
    max_inline: usize,
    encode_args: F,
) -> bool
where
    F: FnOnce(&mut Encoder<'_>),
{
    let raw_timestamp = match timestamp {
        Timestamp::Wall(nanos) => nanos as u64,
        Timestamp::Ticks(ticks) => ticks,
    };
    let (header, args) = buf.split_at_mut(LOG_HEADER_LEN);
    header[0] = level as u8;
    header[1] = clock as u8;
    header[2] = arg_count.min(u8::MAX as usize) as u8;
    header[3..8].fill(0);
    header[8..16].copy_from_slice(&raw_timestamp.to_le_bytes());
    header[16..24].copy_from_slice(&(callsite as *const CallSite as usize as u64).to_le_bytes());

    let mut encoder = Encoder::new(args, max_inline);
    encode_args(&mut encoder);
    let written = encoder.pos;
    if written == args.len() {
        return true;
    }
    args[written..].fill(ArgTag::None as u8);
    header[3] = FLAG_MALFORMED;
    false
}

/// A log record borrowed from a frame
#[derive(Debug)]
pub struct LogRecord<'a> {
    pub level: LogLevel,
    pub clock: ClockKind,
    pub timestamp: Timestamp,
    pub callsite: &'static CallSite,
    pub arg_count: usize,
    malformed: bool,
    args: &'a [u8],
}

/// A decoded frame
#[derive(Debug)]
pub enum Record<'a> {
    Log(LogRecord<'a>),
    Sync(u64),
    Close,
    Reopen,
    SetName(&'a str),
}

fn corrupt(what: &str) -> LoggerError {
    LoggerError::other(format!("Corrupt record: {}", what))
}

fn read_u64(bytes: &[u8], at: usize) -> Result<u64> {
    bytes
        .get(at..at + 8)
        .and_then(|b| b.try_into().ok())
        .map(u64::from_le_bytes)
        .ok_or_else(|| corrupt("truncated integer"))
}

fn read_u32(bytes: &[u8], at: usize) -> Result<u32> {
    bytes
        .get(at..at + 4)
        .and_then(|b| b.try_into().ok())
        .map(u32::from_le_bytes)
        .ok_or_else(|| corrupt("truncated integer"))
}

fn read_u128(bytes: &[u8], at: usize) -> Result<u128> {
    bytes
        .get(at..at + 16)
        .and_then(|b| b.try_into().ok())
        .map(u128::from_le_bytes)
        .ok_or_else(|| corrupt("truncated integer"))
}

impl<'a> Record<'a> {
    /// Decode a frame produced by this crate's sinks
    ///
    /// # Safety
    ///
    /// `payload` must have been written by [`encode_log`] or one of the
    /// control encoders, so that the call-site address is a live
    /// `&'static CallSite`.
    pub(crate) unsafe fn decode(tag: u32, payload: &'a [u8]) -> Result<Self> {
        match RecordKind::from_tag(tag) {
            Some(RecordKind::Log) => {
                if payload.len() < LOG_HEADER_LEN {
                    return Err(corrupt("short log header"));
                }
                let level = LogLevel::from_u8(payload[0]).ok_or_else(|| corrupt("bad level"))?;
                let clock = match payload[1] {
                    0 => ClockKind::Realtime,
                    1 => ClockKind::Coarse,
                    2 => ClockKind::Tsc,
                    _ => return Err(corrupt("bad clock")),
                };
                let raw = read_u64(payload, 8)?;
                let timestamp = match clock {
                    ClockKind::Tsc => Timestamp::Ticks(raw),
                    _ => Timestamp::Wall(raw as i64),
                };
                let callsite = &*(read_u64(payload, 16)? as usize as *const CallSite);
                Ok(Record::Log(LogRecord {
                    level,
                    clock,
                    timestamp,
                    callsite,
                    arg_count: payload[2] as usize,
                    malformed: payload[3] & FLAG_MALFORMED != 0,
                    args: &payload[LOG_HEADER_LEN..],
                }))
            }
            Some(RecordKind::Sync) => Ok(Record::Sync(read_u64(payload, 0)?)),
            Some(RecordKind::Close) => Ok(Record::Close),
            Some(RecordKind::Reopen) => Ok(Record::Reopen),
            Some(RecordKind::SetName) => std::str::from_utf8(payload)
                .map(Record::SetName)
                .map_err(|_| corrupt("sink name is not UTF-8")),
            None => Err(corrupt("unknown kind")),
        }
    }
}

impl<'a> LogRecord<'a> {
    /// Decode every argument
    ///
    /// Shared strings are taken back from the record here, so this must be
    /// called exactly once per record.
    pub(crate) fn args(&self) -> Result<Vec<Arg<'a>>> {
        let mut args = Vec::with_capacity(self.arg_count);
        let mut pos = 0;
        for _ in 0..self.arg_count {
            // SAFETY: the argument bytes come from an Encoder.
            let (arg, next) = unsafe { decode_arg(self.args, pos)? };
            args.push(arg);
            pos = next;
        }
        Ok(args)
    }

    /// Whether the arguments failed to fill their reservation
    pub fn is_malformed(&self) -> bool {
        self.malformed
    }

    /// Take back every argument in the record without rendering it
    ///
    /// Like [`args`](LogRecord::args), this must be called at most once.
    pub(crate) fn release(&self) {
        let mut pos = 0;
        while pos < self.args.len() {
            // SAFETY: the argument bytes come from an Encoder, with any
            // unwritten tail filled with None tags.
            match unsafe { decode_arg(self.args, pos) } {
                Ok((_, next)) => pos = next,
                Err(_) => break,
            }
        }
    }
}

fn decode_str(bytes: &[u8]) -> &str {
    match std::str::from_utf8(bytes) {
        Ok(s) => s,
        // a formatted value may have been cut inside a character
        Err(e) => std::str::from_utf8(&bytes[..e.valid_up_to()]).unwrap_or_default(),
    }
}

unsafe fn decode_arg(bytes: &[u8], pos: usize) -> Result<(Arg<'_>, usize)> {
    let tag = bytes.get(pos).copied().ok_or_else(|| corrupt("missing argument"))?;
    let tag = ArgTag::from_u8(tag).ok_or_else(|| corrupt("unknown argument tag"))?;
    let at = pos + 1;
    let decoded = match tag {
        ArgTag::I8 => {
            let b = bytes.get(at).copied().ok_or_else(|| corrupt("truncated integer"))?;
            (Arg::I8(b as i8), at + 1)
        }
        ArgTag::I16 => {
            let raw = bytes
                .get(at..at + 2)
                .and_then(|b| b.try_into().ok())
                .map(i16::from_le_bytes)
                .ok_or_else(|| corrupt("truncated integer"))?;
            (Arg::I16(raw), at + 2)
        }
        ArgTag::I32 => (Arg::I32(read_u32(bytes, at)? as i32), at + 4),
        ArgTag::I64 => (Arg::I64(read_u64(bytes, at)? as i64), at + 8),
        ArgTag::U64 => (Arg::U64(read_u64(bytes, at)?), at + 8),
        ArgTag::I128 => (Arg::I128(read_u128(bytes, at)? as i128), at + 16),
        ArgTag::U128 => (Arg::U128(read_u128(bytes, at)?), at + 16),
        ArgTag::F32 => (Arg::F32(f32::from_bits(read_u32(bytes, at)?)), at + 4),
        ArgTag::F64 => (Arg::F64(f64::from_bits(read_u64(bytes, at)?)), at + 8),
        ArgTag::Bool => {
            let b = bytes.get(at).copied().ok_or_else(|| corrupt("truncated bool"))?;
            (Arg::Bool(b != 0), at + 1)
        }
        ArgTag::Char => {
            let c = char::from_u32(read_u32(bytes, at)?).unwrap_or(char::REPLACEMENT_CHARACTER);
            (Arg::Char(c), at + 4)
        }
        ArgTag::Str => {
            let len = read_u32(bytes, at)? as usize;
            let start = at + 4;
            let raw = bytes
                .get(start..start + len)
                .ok_or_else(|| corrupt("truncated string"))?;
            (Arg::Str(decode_str(raw)), start + len)
        }
        ArgTag::Truncated => (Arg::Truncated, at),
        ArgTag::StaticStr => {
            let ptr = read_u64(bytes, at)? as usize as *const u8;
            let len = read_u64(bytes, at + 8)? as usize;
            let s = std::str::from_utf8_unchecked(std::slice::from_raw_parts(ptr, len));
            (Arg::Str(s), at + 16)
        }
        ArgTag::SharedStr => {
            let ptr = read_u64(bytes, at)? as usize as *const u8;
            let len = read_u64(bytes, at + 8)? as usize;
            let raw = std::ptr::slice_from_raw_parts(ptr, len) as *const str;
            (Arg::Shared(Arc::from_raw(raw)), at + 16)
        }
        ArgTag::Formatted => {
            let reserved = read_u32(bytes, at)? as usize;
            let used = read_u32(bytes, at + 4)? as usize;
            let start = at + 8;
            let raw = bytes
                .get(start..start + used.min(reserved))
                .ok_or_else(|| corrupt("truncated formatted value"))?;
            (Arg::Formatted(decode_str(raw)), start + reserved)
        }
        ArgTag::None => (Arg::None, at),
        ArgTag::Some => {
            let (inner, next) = decode_arg(bytes, at)?;
            (Arg::Some(Box::new(inner)), next)
        }
    };
    Ok(decoded)
}

/// Payload of a sync marker
pub(crate) fn encode_sync(buf: &mut [u8], seq: u64) {
    buf.copy_from_slice(&seq.to_le_bytes());
}
