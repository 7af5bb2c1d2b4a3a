//! Runtime control protocol
//!
//! Message types understood by a logger's control endpoint, and the
//! dispatcher that applies them to a [`Logger`]. Requests select sinks by
//! name with a [`Pattern`]. Serving the endpoint (a socket at
//! [`Logger::command_path`]) is left to the embedding application; requests
//! and responses are exchanged as JSON with [`handle_json`].
//!
//! # Example
//!
//! ```
//! use ringlog::control::{handle_json, handle_request, ControlRequest, ControlResponse, Pattern};
//! use ringlog::outputs::MemoryOutput;
//! use ringlog::{LogLevel, Logger};
//!
//! let logger = Logger::builder().device(MemoryOutput::new()).build().unwrap();
//! let net = logger.get_sink("net.rx");
//!
//! let request = ControlRequest::SetLevel {
//!     level: LogLevel::Debug,
//!     pattern: Pattern::wildcard("net.*"),
//! };
//! assert_eq!(handle_request(&logger, &request), ControlResponse::Success);
//! assert_eq!(net.level(), LogLevel::Debug);
//!
//! let reply = handle_json(&logger, r#"{"Status":{"pattern":{"kind":"Regex","text":"rx$"}}}"#);
//! assert!(reply.contains("net.rx"));
//! # drop(net);
//! ```

use crate::core::error::{LoggerError, Result};
use crate::core::log_level::LogLevel;
use crate::core::logger::Logger;
use crate::core::sink::SinkInfo;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

/// How [`Pattern::text`] is interpreted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatternKind {
    /// Every sink matches
    #[default]
    None,
    /// Shell-style glob over the whole name: `*`, `?` and `[...]`
    Wildcard,
    /// Regular expression, matching anywhere in the name
    Regex,
}

/// Sink name selector used by control requests
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pattern {
    pub kind: PatternKind,
    pub text: String,
    pub ignore_case: bool,
}

impl Pattern {
    /// Matches every sink
    pub fn all() -> Self {
        Self::default()
    }

    pub fn wildcard(text: impl Into<String>) -> Self {
        Self {
            kind: PatternKind::Wildcard,
            text: text.into(),
            ignore_case: false,
        }
    }

    pub fn regex(text: impl Into<String>) -> Self {
        Self {
            kind: PatternKind::Regex,
            text: text.into(),
            ignore_case: false,
        }
    }

    #[must_use = "builder methods return a new value"]
    pub fn ignore_case(mut self, ignore_case: bool) -> Self {
        self.ignore_case = ignore_case;
        self
    }

    /// Compile the pattern
    ///
    /// # Errors
    ///
    /// [`LoggerError::InvalidPattern`] for a malformed regular expression.
    pub fn matcher(&self) -> Result<Matcher> {
        match self.kind {
            PatternKind::None => Ok(Matcher::All),
            PatternKind::Wildcard => Ok(Matcher::Wildcard {
                pattern: fold(&self.text, self.ignore_case),
                ignore_case: self.ignore_case,
            }),
            PatternKind::Regex => RegexBuilder::new(&self.text)
                .case_insensitive(self.ignore_case)
                .build()
                .map(Matcher::Regex)
                .map_err(|e| LoggerError::pattern(&self.text, e.to_string())),
        }
    }
}

/// A compiled [`Pattern`]
#[derive(Debug, Clone)]
pub enum Matcher {
    All,
    Wildcard { pattern: Vec<char>, ignore_case: bool },
    Regex(Regex),
}

impl Matcher {
    pub fn is_match(&self, name: &str) -> bool {
        match self {
            Matcher::All => true,
            Matcher::Wildcard {
                pattern,
                ignore_case,
            } => glob_match(pattern, &fold(name, *ignore_case)),
            Matcher::Regex(regex) => regex.is_match(name),
        }
    }
}

fn fold(text: &str, ignore_case: bool) -> Vec<char> {
    if ignore_case {
        text.chars().flat_map(char::to_lowercase).collect()
    } else {
        text.chars().collect()
    }
}

/// Match a `[...]` class starting after the `[` at `pattern[0..]`; returns
/// whether `c` matched and the index just past the closing `]`
fn class_match(pattern: &[char], c: char) -> Option<(bool, usize)> {
    let mut i = 0;
    let negate = matches!(pattern.first(), Some('!') | Some('^'));
    if negate {
        i += 1;
    }
    let mut matched = false;
    let mut first = true;
    while i < pattern.len() {
        let p = pattern[i];
        if p == ']' && !first {
            return Some((matched != negate, i + 1));
        }
        first = false;
        if i + 2 < pattern.len() && pattern[i + 1] == '-' && pattern[i + 2] != ']' {
            if pattern[i] <= c && c <= pattern[i + 2] {
                matched = true;
            }
            i += 3;
        } else {
            if p == c {
                matched = true;
            }
            i += 1;
        }
    }
    // unterminated class
    None
}

/// Glob matching over whole strings with backtracking on the last `*`
fn glob_match(pattern: &[char], name: &[char]) -> bool {
    let (mut p, mut n) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while n < name.len() {
        let step = match pattern.get(p) {
            Some('*') => {
                star = Some((p, n));
                p += 1;
                continue;
            }
            Some('?') => Some(p + 1),
            Some('[') => match class_match(&pattern[p + 1..], name[n]) {
                Some((true, len)) => Some(p + 1 + len),
                Some((false, _)) => None,
                None => (name[n] == '[').then_some(p + 1),
            },
            Some('\\') if p + 1 < pattern.len() => (pattern[p + 1] == name[n]).then_some(p + 2),
            Some(&c) => (c == name[n]).then_some(p + 1),
            None => None,
        };

        match step {
            Some(next) => {
                p = next;
                n += 1;
            }
            None => match star {
                Some((star_p, star_n)) => {
                    p = star_p + 1;
                    n = star_n + 1;
                    star = Some((star_p, star_n + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}

/// Request sent to a logger's control endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlRequest {
    /// List the sinks matching `pattern`
    Status {
        #[serde(default)]
        pattern: Pattern,
    },
    /// Set the level of every sink matching `pattern`
    SetLevel {
        level: LogLevel,
        #[serde(default)]
        pattern: Pattern,
    },
    /// Reopen every output device, e.g. after log rotation
    Reopen,
}

/// Reply to a [`ControlRequest`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlResponse {
    Sinks(Vec<SinkInfo>),
    Success,
    Error { reason: String },
}

impl From<LoggerError> for ControlResponse {
    fn from(error: LoggerError) -> Self {
        ControlResponse::Error {
            reason: error.to_string(),
        }
    }
}

/// Apply a request to `logger`
pub fn handle_request(logger: &Logger, request: &ControlRequest) -> ControlResponse {
    let result = match request {
        ControlRequest::Status { pattern } => pattern.matcher().map(|matcher| {
            let sinks = logger
                .sinks()
                .into_iter()
                .filter(|info| matcher.is_match(&info.name))
                .collect();
            ControlResponse::Sinks(sinks)
        }),
        ControlRequest::SetLevel { level, pattern } => logger
            .set_level_matching(pattern, *level)
            .map(|_| ControlResponse::Success),
        ControlRequest::Reopen => logger.reopen().map(|_| ControlResponse::Success),
    };
    result.unwrap_or_else(ControlResponse::from)
}

/// Apply a JSON-encoded request and return the JSON-encoded response
pub fn handle_json(logger: &Logger, request: &str) -> String {
    let response = match serde_json::from_str::<ControlRequest>(request) {
        Ok(request) => handle_request(logger, &request),
        Err(e) => ControlResponse::Error {
            reason: format!("Malformed request: {}", e),
        },
    };
    serde_json::to_string(&response).unwrap_or_else(|e| {
        format!(r#"{{"Error":{{"reason":"Failed to encode response: {}"}}}}"#, e)
    })
}

static NEXT_COMMAND_PATH: AtomicUsize = AtomicUsize::new(0);

/// A fresh control endpoint path for this process
///
/// `$XDG_RUNTIME_DIR/ringlogctl.<pid>.<n>`, falling back to `$TMPDIR` and
/// then `/tmp` when the variable is unset or empty.
pub fn default_command_path() -> PathBuf {
    let dir = ["XDG_RUNTIME_DIR", "TMPDIR"]
        .iter()
        .filter_map(|var| std::env::var_os(var))
        .find(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/tmp"));
    let n = NEXT_COMMAND_PATH.fetch_add(1, Ordering::Relaxed);
    dir.join(format!("ringlogctl.{}.{}", std::process::id(), n))
}
