//! Log level definitions

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[derive(Default)]
#[repr(u8)]
pub enum LogLevel {
    Debug = 0,
    #[default]
    Info = 1,
    Warn = 2,
    Error = 3,
    Fatal = 4,
}

impl LogLevel {
    pub const ALL: [LogLevel; 5] = [
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warn,
        LogLevel::Error,
        LogLevel::Fatal,
    ];

    pub fn to_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Fatal => "FATAL",
        }
    }

    /// Decode a level stored in a record header
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(LogLevel::Debug),
            1 => Some(LogLevel::Info),
            2 => Some(LogLevel::Warn),
            3 => Some(LogLevel::Error),
            4 => Some(LogLevel::Fatal),
            _ => None,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" | "WARNING" => Ok(LogLevel::Warn),
            "ERROR" => Ok(LogLevel::Error),
            "FATAL" => Ok(LogLevel::Fatal),
            _ => Err(format!("Invalid log level: '{}'", s)),
        }
    }
}

/// Prefix written in front of every text line to identify its level
///
/// `Letter` produces `"I "`, `"E "` and so on. `Systemd` produces the
/// `<N>` priority prefixes understood by journald (see sd-daemon(3)).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LevelStyle {
    #[default]
    Letter,
    Systemd,
    /// Full upper-case level name padded to five columns, e.g. `"WARN  "`
    Name,
}

impl LevelStyle {
    pub fn prefix(&self, level: LogLevel) -> &'static str {
        match self {
            LevelStyle::Letter => match level {
                LogLevel::Debug => "D ",
                LogLevel::Info => "I ",
                LogLevel::Warn => "W ",
                LogLevel::Error => "E ",
                LogLevel::Fatal => "F ",
            },
            LevelStyle::Systemd => match level {
                LogLevel::Debug => "<7>",
                LogLevel::Info => "<6>",
                LogLevel::Warn => "<4>",
                LogLevel::Error => "<3>",
                LogLevel::Fatal => "<0>",
            },
            LevelStyle::Name => match level {
                LogLevel::Debug => "DEBUG ",
                LogLevel::Info => "INFO  ",
                LogLevel::Warn => "WARN  ",
                LogLevel::Error => "ERROR ",
                LogLevel::Fatal => "FATAL ",
            },
        }
    }
}
