//! Rendering of decoded records into output lines
//!
//! - Text: `{level}{timestamp} {sink} {file}:{line}: {message}`
//! - Json: one object per line with `timestamp`, `level`, `sink`, `file`,
//!   `line`, `module_path` and `message`

use super::clock::{self, TscCalibration};
use super::format;
use super::log_level::{LevelStyle, LogLevel};
use super::record::{Arg, LogRecord};
use super::timestamp::TimestampFormat;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::time::Duration;

/// Output format for rendered records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Human-readable text (default)
    ///
    /// Example: `E 2025-01-08 10:30:45.123456 app main.rs:42: Error: disk full, code=28`
    #[default]
    Text,

    /// JSON for machine processing
    ///
    /// Example: `{"timestamp":"2025-01-08 10:30:45.123456","level":"ERROR","sink":"app",...}`
    Json,
}

/// Consumer-side renderer, one per logger
pub(crate) struct Renderer {
    format: OutputFormat,
    timestamp_format: TimestampFormat,
    style: LevelStyle,
    calibration: TscCalibration,
    message: String,
}

impl Renderer {
    pub(crate) fn new(
        format: OutputFormat,
        timestamp_format: TimestampFormat,
        style: LevelStyle,
        calibration_interval: Duration,
    ) -> Self {
        Self {
            format,
            timestamp_format,
            style,
            calibration: TscCalibration::new(calibration_interval),
            message: String::with_capacity(256),
        }
    }

    /// Render a log record as one line into `out`
    pub(crate) fn render_log(
        &mut self,
        out: &mut String,
        sink: &str,
        record: &LogRecord<'_>,
        args: &[Arg<'_>],
    ) {
        let datetime = self.calibration.to_wall_clock(record.timestamp);
        let callsite = record.callsite;

        match self.format {
            OutputFormat::Text => {
                out.push_str(self.style.prefix(record.level));
                self.timestamp_format.write_to(out, &datetime);
                let _ = write!(out, " {} {}:{}: ", sink, callsite.file_name(), callsite.line);
                format::render(callsite.format, args, out);
                out.push('\n');
            }
            OutputFormat::Json => {
                self.message.clear();
                format::render(callsite.format, args, &mut self.message);

                let mut object = self.json_header(&datetime, record.level, sink);
                object.insert("file".to_string(), callsite.file.into());
                object.insert("line".to_string(), callsite.line.into());
                object.insert("module_path".to_string(), callsite.module_path.into());
                object.insert("message".to_string(), self.message.as_str().into());
                push_json(out, object);
            }
        }
    }

    /// Render the warning emitted when a sink dropped records
    pub(crate) fn render_dropped(&mut self, out: &mut String, sink: &str, count: u64) {
        let datetime = clock::nanos_to_datetime(clock::wall_nanos());

        match self.format {
            OutputFormat::Text => {
                out.push_str(self.style.prefix(LogLevel::Warn));
                self.timestamp_format.write_to(out, &datetime);
                let _ = writeln!(out, " {}: {} messages dropped", sink, count);
            }
            OutputFormat::Json => {
                let mut object = self.json_header(&datetime, LogLevel::Warn, sink);
                object.insert(
                    "message".to_string(),
                    format!("{} messages dropped", count).into(),
                );
                object.insert("dropped".to_string(), count.into());
                push_json(out, object);
            }
        }
    }

    fn json_header(
        &self,
        datetime: &DateTime<Utc>,
        level: LogLevel,
        sink: &str,
    ) -> serde_json::Map<String, serde_json::Value> {
        let mut object = serde_json::Map::new();
        let timestamp = match self.timestamp_format.as_number(datetime) {
            Some(n) => serde_json::Value::Number(n.into()),
            None => serde_json::Value::String(self.timestamp_format.format(datetime)),
        };
        object.insert("timestamp".to_string(), timestamp);
        object.insert("level".to_string(), level.to_str().into());
        object.insert("sink".to_string(), sink.into());
        object
    }
}

fn push_json(out: &mut String, object: serde_json::Map<String, serde_json::Value>) {
    // a Value with string keys always serialises
    if let Ok(text) = serde_json::to_string(&serde_json::Value::Object(object)) {
        out.push_str(&text);
    }
    out.push('\n');
}
