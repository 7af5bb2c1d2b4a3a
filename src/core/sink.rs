//! Sinks: named producers, each feeding its own ring buffer
//!
//! A [`Sink`] is the producer-side handle. Log calls check the level,
//! serialise their arguments into the sink's ring buffer and return; the
//! logger's consumer thread renders and writes them later. Control
//! operations (`sync`, `close`, `reopen`, `set_name`) travel through the
//! same buffer, so they take effect after every record enqueued before them.

use super::args::LogArgs;
use super::clock::{Clock, ClockKind, Coarse, Realtime, Tsc};
use super::error::{LoggerError, Result};
use super::format::CallSite;
use super::log_level::LogLevel;
use super::metrics::LoggerMetrics;
use super::record::{self, RecordKind, LOG_HEADER_LEN};
use super::registry::Registry;
use super::ring_buffer::{self, Reader, WriteError, Writer};
use crate::outputs::OutputId;
use parking_lot::{Condvar, Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Weak};

/// Default ring buffer size per sink (64 KiB)
pub const DEFAULT_CAPACITY: usize = 64 * 1024;

/// Default limit for strings copied into a record (8 KiB)
pub const DEFAULT_MAX_INLINE: usize = 8 * 1024;

/// What a sink does when a log call cannot be turned into a record
///
/// Covers argument count mismatches on the manual path, arguments whose
/// `Display` implementation fails, and records larger than the buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorPolicy {
    /// Panic at the call site
    #[default]
    Fatal,
    /// Skip the call and count it as dropped
    Ignore,
}

/// Per-sink settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Lowest level that is recorded
    pub level: LogLevel,
    /// Clock used by [`Sink::log`] and [`Sink::try_log`]
    pub clock: ClockKind,
    /// Ring buffer size in bytes, rounded up to a power of two
    pub capacity: usize,
    /// Longest string copied into a record; longer ones render as `<truncated>`
    pub max_inline: usize,
    pub error_policy: ErrorPolicy,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            clock: ClockKind::Realtime,
            capacity: DEFAULT_CAPACITY,
            max_inline: DEFAULT_MAX_INLINE,
            error_policy: ErrorPolicy::Fatal,
        }
    }
}

/// Output health as seen by the consumer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkHealth {
    /// Failed device operations over the sink's lifetime
    pub io_errors: u64,
    /// Failures since the last successful write
    pub consecutive_failures: u64,
    pub last_error: Option<String>,
}

impl SinkHealth {
    pub fn is_healthy(&self) -> bool {
        self.consecutive_failures == 0
    }
}

/// Snapshot of a sink, as listed by [`Logger::sinks`](super::Logger::sinks)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkInfo {
    pub name: String,
    pub level: LogLevel,
    pub open: bool,
    pub dropped: u64,
    pub capacity: usize,
    pub output: OutputId,
    pub health: SinkHealth,
}

/// What a log call does when the ring buffer is full
pub trait Backpressure {
    const BLOCKING: bool;
}

/// Wait for the consumer to free space
pub struct Blocking;

/// Drop the record and count it
pub struct NonBlocking;

impl Backpressure for Blocking {
    const BLOCKING: bool = true;
}

impl Backpressure for NonBlocking {
    const BLOCKING: bool = false;
}

struct Producer {
    writer: Writer,
    next_sync: u64,
}

#[derive(Default)]
struct SyncState {
    completed: u64,
    detached: bool,
}

/// State shared by every handle of a sink, the registry and the consumer
pub(crate) struct SinkShared {
    name: RwLock<String>,
    producer: Mutex<Producer>,
    level: AtomicU8,
    open: AtomicBool,
    dropped: AtomicU64,
    sync: Mutex<SyncState>,
    synced: Condvar,
    health: Mutex<SinkHealth>,
    config: SinkConfig,
    capacity: usize,
    output: OutputId,
    registry: Weak<Registry>,
    metrics: Arc<LoggerMetrics>,
}

impl SinkShared {
    pub(crate) fn new(
        name: String,
        config: SinkConfig,
        output: OutputId,
        registry: Weak<Registry>,
        metrics: Arc<LoggerMetrics>,
    ) -> (Arc<Self>, Reader) {
        let (writer, reader) = ring_buffer::channel(config.capacity);
        let shared = Arc::new(Self {
            name: RwLock::new(name),
            level: AtomicU8::new(config.level as u8),
            open: AtomicBool::new(true),
            dropped: AtomicU64::new(0),
            sync: Mutex::new(SyncState::default()),
            synced: Condvar::new(),
            health: Mutex::new(SinkHealth::default()),
            capacity: writer.capacity(),
            producer: Mutex::new(Producer {
                writer,
                next_sync: 0,
            }),
            config,
            output,
            registry,
            metrics,
        });
        (shared, reader)
    }

    pub(crate) fn name(&self) -> String {
        self.name.read().clone()
    }

    pub(crate) fn set_registered_name(&self, name: &str) {
        *self.name.write() = name.to_string();
    }

    #[inline]
    pub(crate) fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    #[inline]
    fn is_enabled(&self, level: LogLevel) -> bool {
        level as u8 >= self.level.load(Ordering::Relaxed)
    }

    pub(crate) fn set_level(&self, level: LogLevel) {
        self.level.store(level as u8, Ordering::Relaxed);
    }

    fn level(&self) -> LogLevel {
        LogLevel::from_u8(self.level.load(Ordering::Relaxed)).unwrap_or_default()
    }

    pub(crate) fn output(&self) -> OutputId {
        self.output
    }

    pub(crate) fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn record_drop(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        self.metrics.record_dropped();
    }

    fn ingestion_error(&self, error: LoggerError) {
        match self.config.error_policy {
            ErrorPolicy::Fatal => panic!("{}", error),
            ErrorPolicy::Ignore => self.record_drop(),
        }
    }

    fn enqueue<C, B, A>(&self, level: LogLevel, callsite: &'static CallSite, args: A)
    where
        C: Clock,
        B: Backpressure,
        A: LogArgs,
    {
        if A::COUNT != callsite.arg_count {
            self.ingestion_error(LoggerError::argument_mismatch(
                callsite.format,
                callsite.arg_count,
                A::COUNT,
            ));
            return;
        }

        let max_inline = self.config.max_inline;
        let len = match args.encoded_len(max_inline) {
            Ok(len) => LOG_HEADER_LEN + len,
            Err(_) => {
                self.ingestion_error(LoggerError::EncodeError {
                    format: callsite.format,
                });
                return;
            }
        };
        let timestamp = C::now();

        let mut well_formed = true;
        let result = {
            let mut producer = self.producer.lock();
            if !self.is_open() {
                return;
            }
            producer
                .writer
                .write(RecordKind::Log.tag(), len, B::BLOCKING, |buf| {
                    well_formed = record::encode_log(
                        buf,
                        level,
                        timestamp,
                        C::KIND,
                        callsite,
                        A::COUNT,
                        max_inline,
                        |encoder| args.encode(encoder),
                    )
                })
        };

        match result {
            Ok(()) if !well_formed => self.ingestion_error(LoggerError::EncodeError {
                format: callsite.format,
            }),
            Ok(()) => {}
            Err(WriteError::Full) | Err(WriteError::Disconnected) => self.record_drop(),
            Err(WriteError::TooLarge { size, capacity }) => {
                self.ingestion_error(LoggerError::record_too_large(size, capacity))
            }
        }
    }

    /// Enqueue a control record, waiting for space
    fn enqueue_control(producer: &mut Producer, kind: RecordKind, payload: &[u8]) -> bool {
        producer
            .writer
            .write(kind.tag(), payload.len(), true, |buf| {
                buf.copy_from_slice(payload)
            })
            .is_ok()
    }

    fn sync(&self) {
        let seq = {
            let mut producer = self.producer.lock();
            if !self.is_open() {
                return;
            }
            producer.next_sync += 1;
            let seq = producer.next_sync;
            let written = producer
                .writer
                .write(RecordKind::Sync.tag(), 8, true, |buf| {
                    record::encode_sync(buf, seq)
                })
                .is_ok();
            if !written {
                return;
            }
            seq
        };

        let mut state = self.sync.lock();
        while state.completed < seq && !state.detached {
            self.synced.wait(&mut state);
        }
    }

    pub(crate) fn close(&self) {
        let mut producer = self.producer.lock();
        if !self.open.swap(false, Ordering::AcqRel) {
            return;
        }
        Self::enqueue_control(&mut producer, RecordKind::Close, &[]);
    }

    fn reopen(&self) {
        let mut producer = self.producer.lock();
        if self.is_open() {
            Self::enqueue_control(&mut producer, RecordKind::Reopen, &[]);
        }
    }

    fn set_name(self: &Arc<Self>, name: &str) -> Result<()> {
        let mut producer = self.producer.lock();
        if !self.is_open() {
            return Ok(());
        }
        if name.len() > producer.writer.max_payload() {
            return Err(LoggerError::config(
                "sink",
                format!("name of {} bytes does not fit the ring buffer", name.len()),
            ));
        }

        match self.registry.upgrade() {
            Some(registry) => registry.rename(self, name)?,
            None => self.set_registered_name(name),
        }
        Self::enqueue_control(&mut producer, RecordKind::SetName, name.as_bytes());
        Ok(())
    }

    /// Called by the consumer once every record up to `seq` is on the device
    pub(crate) fn complete_sync(&self, seq: u64) {
        let mut state = self.sync.lock();
        state.completed = state.completed.max(seq);
        self.synced.notify_all();
    }

    /// The consumer stopped reading this sink; release every waiter
    pub(crate) fn detach(&self) {
        self.open.store(false, Ordering::Release);
        let mut state = self.sync.lock();
        state.detached = true;
        self.synced.notify_all();
    }

    /// Mark the sink closed without the producer lock, for forced shutdown
    pub(crate) fn force_close(&self) {
        self.open.store(false, Ordering::Release);
    }

    pub(crate) fn record_io_error(&self, error: &LoggerError) {
        let mut health = self.health.lock();
        health.io_errors += 1;
        health.consecutive_failures += 1;
        health.last_error = Some(error.to_string());
    }

    pub(crate) fn record_recovery(&self) {
        self.health.lock().consecutive_failures = 0;
    }

    pub(crate) fn info(&self) -> SinkInfo {
        SinkInfo {
            name: self.name(),
            level: self.level(),
            open: self.is_open(),
            dropped: self.dropped_count(),
            capacity: self.capacity,
            output: self.output,
            health: self.health.lock().clone(),
        }
    }
}

/// Owner of a sink's lifetime; the sink closes when the last one drops
pub(crate) struct SinkHandle {
    pub(crate) shared: Arc<SinkShared>,
}

impl Drop for SinkHandle {
    fn drop(&mut self) {
        self.shared.close();
    }
}

/// Consumer half of a sink
pub(crate) struct SinkQueue {
    pub(crate) shared: Arc<SinkShared>,
    pub(crate) reader: Reader,
}

impl Drop for SinkQueue {
    fn drop(&mut self) {
        self.shared.detach();
    }
}

/// Producer handle of a named sink
///
/// Clones refer to the same sink: they share its buffer, level, name and
/// output, and closing one closes all of them. The sink is closed
/// asynchronously when the last clone is dropped.
///
/// Log calls are normally made through the macros:
///
/// ```
/// use ringlog::outputs::MemoryOutput;
/// use ringlog::{error, warn, Logger};
///
/// let output = MemoryOutput::new();
/// let logger = Logger::builder().device(output.clone()).build().unwrap();
/// let app = logger.get_sink("app");
///
/// warn!(app, "Warning: {}", "low disk");
/// error!(app, "Error: {}, code={}", "disk full", 28);
/// app.sync();
///
/// assert_eq!(output.lines().len(), 2);
/// ```
#[derive(Clone)]
pub struct Sink {
    handle: Arc<SinkHandle>,
}

impl Sink {
    pub(crate) fn from_handle(handle: Arc<SinkHandle>) -> Self {
        Self { handle }
    }

    #[inline]
    fn shared(&self) -> &Arc<SinkShared> {
        &self.handle.shared
    }

    /// Whether a record at `level` would be recorded
    #[inline]
    pub fn is_enabled(&self, level: LogLevel) -> bool {
        self.shared().is_enabled(level)
    }

    /// Log with the sink's default clock, waiting while the buffer is full
    #[inline]
    pub fn log<A: LogArgs>(&self, level: LogLevel, callsite: &'static CallSite, args: A) {
        if !self.is_enabled(level) {
            return;
        }
        match self.shared().config.clock {
            ClockKind::Realtime => self.shared().enqueue::<Realtime, Blocking, A>(level, callsite, args),
            ClockKind::Coarse => self.shared().enqueue::<Coarse, Blocking, A>(level, callsite, args),
            ClockKind::Tsc => self.shared().enqueue::<Tsc, Blocking, A>(level, callsite, args),
        }
    }

    /// Log with the sink's default clock, dropping the record if the buffer is full
    #[inline]
    pub fn try_log<A: LogArgs>(&self, level: LogLevel, callsite: &'static CallSite, args: A) {
        if !self.is_enabled(level) {
            return;
        }
        match self.shared().config.clock {
            ClockKind::Realtime => self.shared().enqueue::<Realtime, NonBlocking, A>(level, callsite, args),
            ClockKind::Coarse => self.shared().enqueue::<Coarse, NonBlocking, A>(level, callsite, args),
            ClockKind::Tsc => self.shared().enqueue::<Tsc, NonBlocking, A>(level, callsite, args),
        }
    }

    /// Log with a statically chosen clock and backpressure policy
    #[inline]
    pub fn log_with<C, B, A>(&self, level: LogLevel, callsite: &'static CallSite, args: A)
    where
        C: Clock,
        B: Backpressure,
        A: LogArgs,
    {
        if !self.is_enabled(level) {
            return;
        }
        self.shared().enqueue::<C, B, A>(level, callsite, args);
    }

    pub fn level(&self) -> LogLevel {
        self.shared().level()
    }

    /// Set the lowest recorded level; takes effect for subsequent calls
    pub fn set_level(&self, level: LogLevel) {
        self.shared().set_level(level);
    }

    pub fn name(&self) -> String {
        self.shared().name()
    }

    /// Rename the sink
    ///
    /// Records already enqueued keep the old name in the output. The
    /// registry is updated immediately.
    ///
    /// # Errors
    ///
    /// [`LoggerError::SinkNameInUse`] if another open sink has that name.
    pub fn set_name(&self, name: impl AsRef<str>) -> Result<()> {
        self.shared().set_name(name.as_ref())
    }

    /// Block until every record logged before this call has been written,
    /// flushed and synced
    ///
    /// Returns immediately on a closed sink, and returns early if the
    /// consumer stops reading the sink.
    pub fn sync(&self) {
        self.shared().sync();
    }

    /// Close the sink for every handle
    ///
    /// Pending records are still written; this call does not wait for them.
    /// Logging on a closed sink does nothing.
    pub fn close(&self) {
        self.shared().close();
    }

    /// Reopen the sink's output device after the records enqueued so far
    pub fn reopen(&self) {
        self.shared().reopen();
    }

    pub fn is_open(&self) -> bool {
        self.shared().is_open()
    }

    /// Records dropped because the buffer was full or a call was ignored
    pub fn dropped_count(&self) -> u64 {
        self.shared().dropped_count()
    }

    /// Ring buffer size in bytes
    pub fn capacity(&self) -> usize {
        self.shared().capacity
    }

    pub fn output(&self) -> OutputId {
        self.shared().output()
    }

    pub fn health(&self) -> SinkHealth {
        self.shared().health.lock().clone()
    }

    pub fn info(&self) -> SinkInfo {
        self.shared().info()
    }
}

impl std::fmt::Debug for Sink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sink")
            .field("name", &self.name())
            .field("level", &self.level())
            .field("open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::Record;

    static TWO: CallSite = CallSite::new("{} {}", file!(), line!(), module_path!(), 2);
    static NONE: CallSite = CallSite::new("tick", file!(), line!(), module_path!(), 0);

    fn detached_sink(config: SinkConfig) -> (Sink, SinkQueue) {
        let (shared, reader) = SinkShared::new(
            "test".to_string(),
            config,
            OutputId::DEFAULT,
            Weak::new(),
            Arc::new(LoggerMetrics::new()),
        );
        let sink = Sink::from_handle(Arc::new(SinkHandle {
            shared: Arc::clone(&shared),
        }));
        (sink, SinkQueue { shared, reader })
    }

    fn next_kind(queue: &mut SinkQueue) -> Option<&'static str> {
        queue.reader.read(|tag, payload| {
            match unsafe { Record::decode(tag, payload) }.unwrap() {
                Record::Log(record) => {
                    record.args().unwrap();
                    "log"
                }
                Record::Sync(_) => "sync",
                Record::Close => "close",
                Record::Reopen => "reopen",
                Record::SetName(_) => "set_name",
            }
        })
    }

    #[test]
    fn test_level_threshold_is_inclusive() {
        let (sink, mut queue) = detached_sink(SinkConfig {
            level: LogLevel::Warn,
            ..SinkConfig::default()
        });
        sink.log(LogLevel::Info, &NONE, ());
        sink.log(LogLevel::Warn, &NONE, ());
        sink.log(LogLevel::Error, &NONE, ());

        assert_eq!(next_kind(&mut queue), Some("log"));
        assert_eq!(next_kind(&mut queue), Some("log"));
        assert_eq!(next_kind(&mut queue), None);

        sink.set_level(LogLevel::Debug);
        assert_eq!(sink.level(), LogLevel::Debug);
        assert!(sink.is_enabled(LogLevel::Debug));
    }

    #[test]
    fn test_try_log_drops_exactly_one_when_full() {
        let (sink, mut queue) = detached_sink(SinkConfig {
            capacity: 64,
            ..SinkConfig::default()
        });
        // 8 byte frame header + 24 byte log header + 2 * 9 byte integers,
        // rounded up to 56 bytes: one record fills the buffer
        sink.try_log(LogLevel::Info, &TWO, (1u32, 2u32));
        sink.try_log(LogLevel::Info, &TWO, (3u32, 4u32));
        assert_eq!(sink.dropped_count(), 1);

        assert_eq!(next_kind(&mut queue), Some("log"));
        assert_eq!(next_kind(&mut queue), None);
    }

    #[test]
    fn test_ignore_policy_counts_bad_calls() {
        let (sink, mut queue) = detached_sink(SinkConfig {
            capacity: 64,
            error_policy: ErrorPolicy::Ignore,
            ..SinkConfig::default()
        });
        sink.log(LogLevel::Info, &TWO, (1u8,));
        sink.log(LogLevel::Info, &TWO, ("x".repeat(100), 1u8));
        assert_eq!(sink.dropped_count(), 2);
        assert_eq!(next_kind(&mut queue), None);
    }

    #[test]
    #[should_panic(expected = "expects 2 arguments, got 1")]
    fn test_fatal_policy_panics_on_mismatch() {
        let (sink, _queue) = detached_sink(SinkConfig::default());
        sink.log(LogLevel::Info, &TWO, (1u8,));
    }

    #[test]
    fn test_close_is_shared_and_final() {
        let (sink, mut queue) = detached_sink(SinkConfig::default());
        let clone = sink.clone();
        clone.close();
        assert!(!sink.is_open());

        sink.log(LogLevel::Error, &NONE, ());
        sink.sync();
        assert_eq!(next_kind(&mut queue), Some("close"));
        assert_eq!(next_kind(&mut queue), None);
    }

    #[test]
    fn test_last_handle_drop_enqueues_close() {
        let (sink, mut queue) = detached_sink(SinkConfig::default());
        let clone = sink.clone();
        drop(sink);
        assert!(clone.is_open());
        drop(clone);
        assert_eq!(next_kind(&mut queue), Some("close"));
    }

    #[test]
    fn test_control_records_keep_order() {
        let (sink, mut queue) = detached_sink(SinkConfig::default());
        sink.log(LogLevel::Info, &NONE, ());
        sink.reopen();
        sink.set_name("renamed").unwrap();
        sink.log(LogLevel::Info, &NONE, ());

        assert_eq!(sink.name(), "renamed");
        assert_eq!(next_kind(&mut queue), Some("log"));
        assert_eq!(next_kind(&mut queue), Some("reopen"));
        assert_eq!(next_kind(&mut queue), Some("set_name"));
        assert_eq!(next_kind(&mut queue), Some("log"));
    }

    #[test]
    fn test_sync_returns_when_consumer_detaches() {
        let (sink, queue) = detached_sink(SinkConfig::default());
        let waiter = std::thread::spawn({
            let sink = sink.clone();
            move || sink.sync()
        });
        std::thread::sleep(std::time::Duration::from_millis(20));
        drop(queue);
        waiter.join().unwrap();
        assert!(!sink.is_open());
    }

    #[test]
    fn test_sync_waits_for_completion() {
        let (sink, mut queue) = detached_sink(SinkConfig::default());
        sink.log(LogLevel::Info, &NONE, ());
        let consumer = std::thread::spawn(move || {
            let mut seen = Vec::new();
            while seen.last() != Some(&"sync") {
                let step = queue.reader.read(|tag, payload| {
                    match unsafe { Record::decode(tag, payload) }.unwrap() {
                        Record::Sync(seq) => Some(seq),
                        _ => None,
                    }
                });
                match step {
                    Some(Some(seq)) => {
                        seen.push("sync");
                        queue.shared.complete_sync(seq);
                    }
                    Some(None) => seen.push("log"),
                    None => std::thread::yield_now(),
                }
            }
            (seen, queue)
        });

        sink.sync();
        let (seen, _queue) = consumer.join().unwrap();
        assert_eq!(seen, vec!["log", "sync"]);
    }

    #[test]
    fn test_info_snapshot() {
        let (sink, _queue) = detached_sink(SinkConfig {
            capacity: 1000,
            ..SinkConfig::default()
        });
        let info = sink.info();
        assert_eq!(info.name, "test");
        assert_eq!(info.level, LogLevel::Info);
        assert_eq!(info.capacity, 1024);
        assert!(info.open);
        assert!(info.health.is_healthy());
    }

    #[test]
    fn test_config_from_partial_json() {
        let config: SinkConfig =
            serde_json::from_str(r#"{"level":"Debug","error_policy":"Ignore"}"#).unwrap();
        assert_eq!(config.level, LogLevel::Debug);
        assert_eq!(config.error_policy, ErrorPolicy::Ignore);
        assert_eq!(config.capacity, DEFAULT_CAPACITY);
    }
}
