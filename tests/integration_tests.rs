//! Integration tests for ringlog
//!
//! These tests verify:
//! - Per-sink ordering across producer threads
//! - Sync, close, reopen and rename through the public API
//! - Backpressure: blocking and dropping log calls
//! - File rotation with reopen
//! - JSON output
//! - The control protocol dispatcher

use ringlog::control::{handle_json, handle_request, ControlRequest, ControlResponse, Pattern};
use ringlog::outputs::{CallbackOutput, FileOutput, MemoryOutput};
use ringlog::{error, info, try_log, warn};
use ringlog::core::args::LogArg;
use ringlog::core::record::Encoder;
use ringlog::{ErrorPolicy, LogLevel, Logger, LoggerError, OutputFormat, TimestampFormat};
use std::fmt;
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

fn memory_logger() -> (Logger, MemoryOutput) {
    let output = MemoryOutput::new();
    let logger = Logger::builder()
        .device(output.clone())
        .timestamp_format(TimestampFormat::Unix)
        .build()
        .expect("Failed to build logger");
    (logger, output)
}

/// Message part of a text line: `<L> <ts> <sink> <file>:<line>: <message>`
fn message(line: &str) -> &str {
    line.splitn(5, ' ').nth(4).unwrap_or_default()
}

fn sink_column(line: &str) -> &str {
    line.split(' ').nth(2).unwrap_or_default()
}

#[test]
fn test_warn_and_error_reach_output_in_order() {
    let (logger, output) = memory_logger();
    let app = logger.get_sink("app");

    warn!(app, "Warning: {}", "low disk");
    error!(app, "Error: {}, code={}", "disk full", 28);
    app.sync();

    let lines = output.lines();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("W "));
    assert!(lines[1].starts_with("E "));
    assert_eq!(sink_column(&lines[0]), "app");
    assert!(lines[0].contains("integration_tests.rs:"));
    assert_eq!(message(&lines[0]), "Warning: low disk");
    assert_eq!(message(&lines[1]), "Error: disk full, code=28");
}

#[test]
fn test_app_sink_at_warning_drops_info() {
    let (logger, output) = memory_logger();
    let app = logger.get_sink("app");
    app.set_level(LogLevel::Warn);

    info!(app, "ignored");
    error!(app, "Error: {}, code={}", "disk full", 28);
    app.sync();

    let contents = output.contents();
    assert!(!contents.contains("ignored"));
    let lines = output.lines();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("E "));
    assert_eq!(sink_column(&lines[0]), "app");
    assert_eq!(message(&lines[0]), "Error: disk full, code=28");
}

#[test]
fn test_concurrent_producers_keep_per_thread_order() {
    const PER_THREAD: usize = 10_000;
    let (logger, output) = memory_logger();
    let sink = logger.get_sink("shared");

    let handles: Vec<_> = (0..2)
        .map(|thread_id| {
            let sink = sink.clone();
            thread::spawn(move || {
                for seq in 0..PER_THREAD {
                    info!(sink, "thread {} seq {}", thread_id, seq);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("Producer thread panicked");
    }
    sink.sync();

    let mut next = [0usize; 2];
    for line in output.lines() {
        let fields: Vec<&str> = message(&line).split(' ').collect();
        let thread_id: usize = fields[1].parse().unwrap();
        let seq: usize = fields[3].parse().unwrap();
        assert_eq!(seq, next[thread_id], "thread {} out of order", thread_id);
        next[thread_id] += 1;
    }
    assert_eq!(next, [PER_THREAD, PER_THREAD]);
    assert_eq!(logger.metrics().written_count(), 2 * PER_THREAD as u64);
}

#[test]
fn test_sync_waits_for_every_record() {
    let (logger, output) = memory_logger();
    let sink = logger.get_sink("sync");

    for i in 0..500 {
        info!(sink, "record {}", i);
        if i % 100 == 99 {
            sink.sync();
            assert_eq!(output.lines().len(), i + 1);
        }
    }
}

#[test]
fn test_sync_on_full_buffer_waits_for_space() {
    let output = MemoryOutput::new();
    let logger = Logger::builder()
        .device(output.clone())
        .capacity(128)
        .build()
        .unwrap();
    let sink = logger.get_sink("tiny");
    assert_eq!(sink.capacity(), 128);

    for i in 0..200u32 {
        info!(sink, "{}", i);
    }
    sink.sync();

    assert_eq!(output.lines().len(), 200);
    assert_eq!(sink.dropped_count(), 0);
}

#[test]
fn test_level_threshold() {
    let (logger, output) = memory_logger();
    let sink = logger.get_sink("levels");
    assert_eq!(sink.level(), LogLevel::Info);

    ringlog::debug!(sink, "hidden");
    info!(sink, "shown");
    sink.set_level(LogLevel::Error);
    warn!(sink, "hidden too");
    error!(sink, "shown too");
    sink.sync();

    let messages: Vec<String> = output.lines().iter().map(|l| message(l).to_string()).collect();
    assert_eq!(messages, vec!["shown", "shown too"]);
}

#[test]
fn test_non_blocking_log_drops_and_reports() {
    let gate = Arc::new(AtomicBool::new(false));
    let lines = Arc::new(parking_lot::Mutex::new(Vec::<String>::new()));
    let device = {
        let gate = Arc::clone(&gate);
        let lines = Arc::clone(&lines);
        CallbackOutput::new("gated", move |_level, bytes| {
            while !gate.load(Ordering::Acquire) {
                thread::sleep(Duration::from_millis(1));
            }
            lines.lock().push(String::from_utf8_lossy(bytes).into_owned());
            Ok(bytes.len())
        })
    };
    let overflow_total = Arc::new(std::sync::atomic::AtomicU64::new(0));
    let overflow_seen = Arc::clone(&overflow_total);

    let logger = Logger::builder()
        .device(device)
        .capacity(256)
        .timestamp_format(TimestampFormat::Unix)
        .on_overflow(Arc::new(move |_sink: &str, total: u64| {
            overflow_seen.store(total, Ordering::SeqCst);
        }))
        .build()
        .unwrap();
    let sink = logger.get_sink("burst");

    const TOTAL: u64 = 1000;
    for i in 0..TOTAL {
        try_log!(sink, LogLevel::Info, "burst {}", i);
    }
    let dropped = sink.dropped_count();
    assert!(dropped > 0, "a 256 byte buffer cannot hold {} records", TOTAL);

    gate.store(true, Ordering::Release);
    sink.sync();
    drop(sink);
    drop(logger);

    let lines = lines.lock();
    let written = lines.iter().filter(|l| message(l).starts_with("burst ")).count() as u64;
    assert_eq!(written + dropped, TOTAL);
    let warning = lines
        .iter()
        .find(|l| l.contains("messages dropped"))
        .expect("Missing dropped warning");
    assert!(warning.starts_with("W "));
    assert!(warning.contains(&format!("burst: {} messages dropped", dropped)));
    assert_eq!(overflow_total.load(Ordering::SeqCst), dropped);
}

#[test]
fn test_file_rotation_with_reopen() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let log_file = temp_dir.path().join("app.log");
    let rotated = temp_dir.path().join("app.log.1");

    let logger = Logger::builder()
        .device(FileOutput::open(&log_file).expect("Failed to open log file"))
        .build()
        .unwrap();
    let sink = logger.get_sink("rotate");

    info!(sink, "before rotation");
    sink.sync();
    fs::rename(&log_file, &rotated).expect("Failed to rotate");

    // still appends to the renamed file until reopened
    info!(sink, "still old file");
    logger.reopen().expect("Reopen failed");
    info!(sink, "after rotation");
    sink.sync();

    let old = fs::read_to_string(&rotated).unwrap();
    let new = fs::read_to_string(&log_file).unwrap();
    assert!(old.contains("before rotation"));
    assert!(old.contains("still old file"));
    assert!(!old.contains("after rotation"));
    assert_eq!(new.lines().count(), 1);
    assert!(new.contains("after rotation"));
}

#[test]
fn test_logger_open_writes_to_path() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let log_file = temp_dir.path().join("open.log");

    {
        let logger = Logger::open(&log_file).expect("Failed to open logger");
        let sink = logger.get_sink("file");
        info!(sink, "value={}", 42);
    }

    let content = fs::read_to_string(&log_file).unwrap();
    assert!(content.ends_with(": value=42\n"));
}

#[test]
fn test_sink_reopen_only_touches_its_device() {
    let (logger, default_output) = memory_logger();
    let dedicated = MemoryOutput::new();
    let audit = logger
        .sink_builder("audit")
        .device(dedicated.clone())
        .build()
        .unwrap();
    let app = logger.get_sink("app");

    info!(audit, "first");
    audit.reopen();
    info!(audit, "second");
    info!(app, "default");
    audit.sync();
    app.sync();

    let generations = dedicated.generations();
    assert_eq!(generations.len(), 2);
    assert!(generations[0].contains("first"));
    assert!(generations[1].contains("second"));
    assert_eq!(default_output.generations().len(), 1);
    assert!(default_output.contents().contains("default"));
}

#[test]
fn test_clone_rename_and_close() {
    let (logger, output) = memory_logger();
    let first = logger.get_sink("worker");
    let second = first.clone();

    info!(first, "as worker");
    second.set_name("worker-1").unwrap();
    info!(first, "as worker-1");
    assert_eq!(first.name(), "worker-1");

    // the old name is free again
    let other = logger.get_sink("worker");
    assert!(other.set_name("worker-1").is_err());
    info!(other, "new worker");

    first.sync();
    other.sync();
    let lines = output.lines();
    let by_message = |m: &str| {
        lines
            .iter()
            .find(|l| message(l) == m)
            .map(|l| sink_column(l).to_string())
    };
    assert_eq!(by_message("as worker").as_deref(), Some("worker"));
    assert_eq!(by_message("as worker-1").as_deref(), Some("worker-1"));
    assert_eq!(by_message("new worker").as_deref(), Some("worker"));

    second.close();
    assert!(!first.is_open());
    info!(first, "ignored after close");
    first.sync();
    other.sync();
    assert!(!output.contents().contains("ignored after close"));
}

#[test]
fn test_closed_sink_leaves_registry() {
    let (logger, _output) = memory_logger();
    let sink = logger.get_sink("short-lived");
    assert_eq!(logger.sinks().len(), 1);

    sink.close();
    for _ in 0..1000 {
        if logger.sinks().is_empty() {
            break;
        }
        thread::sleep(Duration::from_millis(1));
    }
    assert!(logger.sinks().is_empty());

    let replacement = logger.get_sink("short-lived");
    assert!(replacement.is_open());
}

#[test]
fn test_json_output() {
    let output = MemoryOutput::new();
    let logger = Logger::builder()
        .device(output.clone())
        .format(OutputFormat::Json)
        .timestamp_format(TimestampFormat::UnixMillis)
        .build()
        .unwrap();
    let sink = logger.get_sink("json");

    warn!(sink, "user {} said \"{}\"", 7, "hi");
    sink.sync();

    let lines = output.lines();
    assert_eq!(lines.len(), 1);
    let value: serde_json::Value = serde_json::from_str(&lines[0]).expect("Invalid JSON line");
    assert_eq!(value["level"], "WARN");
    assert_eq!(value["sink"], "json");
    assert_eq!(value["message"], "user 7 said \"hi\"");
    assert!(value["timestamp"].is_number());
    assert!(value["line"].is_number());
    assert!(value["file"].as_str().unwrap().ends_with("integration_tests.rs"));
}

#[test]
fn test_control_requests() {
    let (logger, output) = memory_logger();
    let rx = logger.get_sink("net.rx");
    let tx = logger.get_sink("net.tx");
    let disk = logger.get_sink("disk");

    let status = handle_request(
        &logger,
        &ControlRequest::Status {
            pattern: Pattern::wildcard("net.*"),
        },
    );
    match status {
        ControlResponse::Sinks(infos) => {
            let names: Vec<&str> = infos.iter().map(|i| i.name.as_str()).collect();
            assert_eq!(names, vec!["net.rx", "net.tx"]);
        }
        other => panic!("Unexpected response: {:?}", other),
    }

    let reply = handle_request(
        &logger,
        &ControlRequest::SetLevel {
            level: LogLevel::Error,
            pattern: Pattern::regex("^NET").ignore_case(true),
        },
    );
    assert_eq!(reply, ControlResponse::Success);
    assert_eq!(rx.level(), LogLevel::Error);
    assert_eq!(tx.level(), LogLevel::Error);
    assert_eq!(disk.level(), LogLevel::Info);

    info!(disk, "before reopen");
    assert_eq!(handle_json(&logger, r#""Reopen""#), r#""Success""#);
    assert_eq!(output.generations().len(), 2);
    assert!(output.generations()[0].contains("before reopen"));

    let reply = handle_request(
        &logger,
        &ControlRequest::Status {
            pattern: Pattern::regex("("),
        },
    );
    assert!(matches!(reply, ControlResponse::Error { .. }));
    assert!(handle_json(&logger, "not json").contains("Malformed request"));
}

#[test]
fn test_config_from_json() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let log_file = temp_dir.path().join("configured.log");
    let json = format!(
        r#"{{
            "path": {:?},
            "format": "Json",
            "sink": {{ "level": "Debug", "capacity": 4096 }}
        }}"#,
        log_file.display().to_string()
    );
    let config = ringlog::LoggerConfig::from_json(&json).expect("Invalid config");

    {
        let logger = Logger::builder().config(config).build().unwrap();
        let sink = logger.get_sink("cfg");
        assert_eq!(sink.level(), LogLevel::Debug);
        assert_eq!(sink.capacity(), 4096);
        ringlog::debug!(sink, "configured");
    }

    let content = fs::read_to_string(&log_file).unwrap();
    let value: serde_json::Value = serde_json::from_str(content.trim_end()).unwrap();
    assert_eq!(value["message"], "configured");
}

#[test]
fn test_shutdown_reports_outstanding_sinks() {
    let (mut logger, output) = memory_logger();
    let sink = logger.get_sink("lingering");
    info!(sink, "written before shutdown");

    assert!(!logger.shutdown(Duration::from_millis(50)));
    assert!(output.contents().contains("written before shutdown"));
    assert!(!sink.is_open());

    // logging after shutdown is a no-op
    info!(sink, "after shutdown");
    sink.sync();
    assert!(!output.contents().contains("after shutdown"));
}

#[test]
fn test_duplicate_sink_name_is_rejected() {
    let (logger, _output) = memory_logger();
    let _first = logger.sink_builder("unique").build().unwrap();
    let err = logger.sink_builder("unique").build().unwrap_err();
    assert!(matches!(err, LoggerError::SinkNameInUse { ref name } if name == "unique"));
}

/// Reserves room for a shared string but writes nothing
struct ShortArg;

impl fmt::Display for ShortArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("short")
    }
}

impl LogArg for ShortArg {
    fn encoded_len(&self, _max_inline: usize) -> Result<usize, fmt::Error> {
        Ok(17)
    }

    fn encode(&self, _encoder: &mut Encoder<'_>) {}
}

#[test]
fn test_short_argument_encoding_is_discarded() {
    let (logger, output) = memory_logger();
    let sink = logger
        .sink_builder("short")
        .capacity(64)
        .error_policy(ErrorPolicy::Ignore)
        .build()
        .unwrap();
    let shared: Arc<str> = Arc::from("shared-text");

    info!(sink, "{}", shared);
    sink.sync();
    // lands on the bytes of the record above once the ring wraps
    info!(sink, "{}", ShortArg);
    info!(sink, "after {}", 1);
    sink.sync();

    assert_eq!(Arc::strong_count(&shared), 1);
    assert_eq!(sink.dropped_count(), 1);
    let messages: Vec<String> = output
        .lines()
        .iter()
        .map(|l| message(l).to_string())
        .filter(|m| !m.ends_with("messages dropped"))
        .collect();
    assert_eq!(messages, vec!["shared-text", "after 1"]);
}

#[test]
#[should_panic(expected = "Failed to encode argument")]
fn test_short_argument_encoding_panics_under_fatal_policy() {
    let (logger, _output) = memory_logger();
    let sink = logger.sink_builder("strict").capacity(64).build().unwrap();
    info!(sink, "{}", ShortArg);
}
