//! Timestamp rendering for log lines

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// How the consumer renders record timestamps
///
/// # Examples
///
/// ```
/// use ringlog::TimestampFormat;
///
/// // Apache-style
/// let format = TimestampFormat::Custom("%d/%b/%Y:%H:%M:%S %z".to_string());
/// assert!(!format.is_numeric());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimestampFormat {
    /// `2025-01-08 10:30:45.123456`
    #[default]
    Standard,

    /// `2025-01-08T10:30:45.123Z`
    Iso8601,

    /// `2025-01-08T10:30:45.123456Z`
    Iso8601Micros,

    /// `2025-01-08T10:30:45.123456789+00:00`
    Rfc3339,

    /// Seconds since the epoch
    Unix,

    /// Milliseconds since the epoch
    UnixMillis,

    /// Microseconds since the epoch
    UnixMicros,

    /// Nanoseconds since the epoch
    UnixNanos,

    /// Any strftime format understood by chrono
    Custom(String),
}

impl TimestampFormat {
    #[must_use]
    pub fn format(&self, datetime: &DateTime<Utc>) -> String {
        let mut out = String::with_capacity(32);
        self.write_to(&mut out, datetime);
        out
    }

    /// Append the rendered timestamp to `out`
    pub fn write_to(&self, out: &mut String, datetime: &DateTime<Utc>) {
        let _ = match self {
            TimestampFormat::Standard => write!(out, "{}", datetime.format("%Y-%m-%d %H:%M:%S%.6f")),
            TimestampFormat::Iso8601 => write!(out, "{}", datetime.format("%Y-%m-%dT%H:%M:%S%.3fZ")),
            TimestampFormat::Iso8601Micros => {
                write!(out, "{}", datetime.format("%Y-%m-%dT%H:%M:%S%.6fZ"))
            }
            TimestampFormat::Rfc3339 => write!(out, "{}", datetime.to_rfc3339()),
            TimestampFormat::Unix => write!(out, "{}", datetime.timestamp()),
            TimestampFormat::UnixMillis => write!(out, "{}", datetime.timestamp_millis()),
            TimestampFormat::UnixMicros => write!(out, "{}", datetime.timestamp_micros()),
            TimestampFormat::UnixNanos => write!(
                out,
                "{}",
                datetime.timestamp_nanos_opt().unwrap_or_default()
            ),
            TimestampFormat::Custom(format) => write!(out, "{}", datetime.format(format)),
        };
    }

    /// Numeric value for formats rendered as a number
    pub fn as_number(&self, datetime: &DateTime<Utc>) -> Option<i64> {
        match self {
            TimestampFormat::Unix => Some(datetime.timestamp()),
            TimestampFormat::UnixMillis => Some(datetime.timestamp_millis()),
            TimestampFormat::UnixMicros => Some(datetime.timestamp_micros()),
            TimestampFormat::UnixNanos => datetime.timestamp_nanos_opt(),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            TimestampFormat::Unix
                | TimestampFormat::UnixMillis
                | TimestampFormat::UnixMicros
                | TimestampFormat::UnixNanos
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_datetime() -> DateTime<Utc> {
        // 2025-01-08 10:30:45.123456 UTC
        Utc.with_ymd_and_hms(2025, 1, 8, 10, 30, 45)
            .single()
            .expect("valid datetime")
            + chrono::Duration::microseconds(123456)
    }

    #[test]
    fn test_standard_is_default() {
        assert_eq!(TimestampFormat::default(), TimestampFormat::Standard);
        assert_eq!(
            TimestampFormat::Standard.format(&fixed_datetime()),
            "2025-01-08 10:30:45.123456"
        );
    }

    #[test]
    fn test_iso_formats() {
        let dt = fixed_datetime();
        assert_eq!(TimestampFormat::Iso8601.format(&dt), "2025-01-08T10:30:45.123Z");
        assert_eq!(
            TimestampFormat::Iso8601Micros.format(&dt),
            "2025-01-08T10:30:45.123456Z"
        );
        assert!(TimestampFormat::Rfc3339
            .format(&dt)
            .starts_with("2025-01-08T10:30:45"));
    }

    #[test]
    fn test_numeric_formats() {
        let dt = fixed_datetime();
        assert_eq!(TimestampFormat::Unix.format(&dt), "1736332245");
        assert_eq!(TimestampFormat::UnixMillis.as_number(&dt), Some(1736332245123));
        assert_eq!(TimestampFormat::UnixMicros.as_number(&dt), Some(1736332245123456));
        assert_eq!(
            TimestampFormat::UnixNanos.as_number(&dt),
            Some(1736332245123456000)
        );
        assert!(TimestampFormat::UnixNanos.is_numeric());
        assert!(!TimestampFormat::Standard.is_numeric());
        assert_eq!(TimestampFormat::Standard.as_number(&dt), None);
    }

    #[test]
    fn test_custom_format() {
        let format = TimestampFormat::Custom("%d/%b/%Y:%H:%M:%S +0000".to_string());
        assert_eq!(format.format(&fixed_datetime()), "08/Jan/2025:10:30:45 +0000");
    }

    #[test]
    fn test_write_to_appends() {
        let mut out = String::from("[");
        TimestampFormat::Unix.write_to(&mut out, &fixed_datetime());
        out.push(']');
        assert_eq!(out, "[1736332245]");
    }

    #[test]
    fn test_serde_round_trip() {
        let json = serde_json::to_string(&TimestampFormat::Standard).expect("serialize");
        assert_eq!(json, "\"Standard\"");

        let format: TimestampFormat =
            serde_json::from_str(r#"{"Custom":"%Y-%m-%d"}"#).expect("deserialize Custom");
        assert_eq!(format, TimestampFormat::Custom("%Y-%m-%d".to_string()));
    }
}
