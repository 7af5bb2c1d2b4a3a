//! Logger: the consumer thread plus the registry of its sinks

use super::clock::{ClockKind, DEFAULT_CALIBRATION_INTERVAL};
use super::consumer::{
    Command, Consumer, ConsumerSettings, ErrorHook, FlushHook, Hooks, OverflowCallback,
    ReopenHook, WaitStrategy, DEFAULT_BATCH_SIZE,
};
use super::error::{LoggerError, Result};
use super::log_level::{LevelStyle, LogLevel};
use super::metrics::LoggerMetrics;
use super::registry::Registry;
use super::render::{OutputFormat, Renderer};
use super::sink::{ErrorPolicy, Sink, SinkConfig, SinkHandle, SinkInfo, SinkQueue, SinkShared};
use super::timestamp::TimestampFormat;
use crate::control::{default_command_path, Pattern};
use crate::outputs::{FileOutput, OutputDevice, OutputId, StreamOutput};
use crossbeam_channel::{bounded, unbounded, Sender};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Default shutdown timeout for logger cleanup (5 seconds)
///
/// This timeout is used when the logger is dropped without explicit shutdown.
/// For custom timeout control, use the `shutdown()` method instead.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Time allowed past the shutdown deadline for the forced drain
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

static GLOBAL: OnceLock<Logger> = OnceLock::new();

/// Logger configuration that can be loaded from JSON
///
/// # Example
///
/// ```
/// use ringlog::{LogLevel, LoggerConfig};
///
/// let config = LoggerConfig::from_json(r#"{
///     "sink": { "level": "Debug", "capacity": 1048576 },
///     "format": "Json",
///     "batch_size": 128
/// }"#).unwrap();
///
/// assert_eq!(config.sink.level, LogLevel::Debug);
/// assert_eq!(config.batch_size, 128);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Defaults for every sink created by the logger
    pub sink: SinkConfig,
    /// Log file for the default output; stderr when unset
    pub path: Option<PathBuf>,
    pub format: OutputFormat,
    pub timestamp_format: TimestampFormat,
    pub level_style: LevelStyle,
    pub wait_strategy: WaitStrategy,
    /// Records handled per sink visit
    pub batch_size: usize,
    /// How long a cycle-counter anchor is trusted
    pub calibration_interval: Duration,
    /// Control endpoint path; a fresh one is chosen when unset
    pub command_path: Option<PathBuf>,
    pub thread_name: String,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            sink: SinkConfig::default(),
            path: None,
            format: OutputFormat::default(),
            timestamp_format: TimestampFormat::default(),
            level_style: LevelStyle::default(),
            wait_strategy: WaitStrategy::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            calibration_interval: DEFAULT_CALIBRATION_INTERVAL,
            command_path: None,
            thread_name: "ringlog".to_string(),
        }
    }
}

impl LoggerConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// An asynchronous logger
///
/// Owns one background consumer thread that renders and writes the records
/// of every sink created through it. Dropping the logger waits up to
/// [`DEFAULT_SHUTDOWN_TIMEOUT`] for the sinks to be closed, then closes the
/// rest itself.
///
/// # Example
///
/// ```
/// use ringlog::outputs::MemoryOutput;
/// use ringlog::{info, LogLevel, Logger};
///
/// let output = MemoryOutput::new();
/// let logger = Logger::builder()
///     .device(output.clone())
///     .level(LogLevel::Debug)
///     .build()
///     .unwrap();
///
/// let sink = logger.get_sink("main");
/// info!(sink, "Processing {} items", 100);
/// sink.sync();
///
/// assert!(output.contents().ends_with(": Processing 100 items\n"));
/// ```
pub struct Logger {
    registry: Arc<Registry>,
    commands: Sender<Command>,
    consumer: Option<JoinHandle<bool>>,
    next_output: AtomicUsize,
    defaults: SinkConfig,
    metrics: Arc<LoggerMetrics>,
    command_path: PathBuf,
}

impl Logger {
    /// Logger writing to stderr
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    /// Logger appending to the file at `path`
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Self::builder().path(path).build()
    }

    #[must_use]
    pub fn builder() -> LoggerBuilder {
        LoggerBuilder::new()
    }

    /// Install `logger` as the process-wide instance
    ///
    /// The global logger is never dropped, so its consumer keeps running
    /// until the process exits; call [`Sink::sync`] on anything that must
    /// reach its device.
    ///
    /// # Errors
    ///
    /// Fails if a global logger was already installed.
    pub fn set_global(logger: Logger) -> Result<()> {
        GLOBAL
            .set(logger)
            .map_err(|_| LoggerError::config("global logger", "already installed"))
    }

    /// The process-wide instance
    ///
    /// Installs a stderr logger on first use if none was set; `None` only if
    /// that logger could not be started.
    pub fn global() -> Option<&'static Logger> {
        if let Some(logger) = GLOBAL.get() {
            return Some(logger);
        }
        match Logger::new() {
            // losing a race to set_global drops ours
            Ok(logger) => {
                let _ = GLOBAL.set(logger);
            }
            Err(e) => eprintln!("[LOGGER ERROR] Cannot start the global logger: {}", e),
        }
        GLOBAL.get()
    }

    /// Sink named `name`, created with the logger's defaults unless an open
    /// one already exists
    pub fn get_sink(&self, name: impl AsRef<str>) -> Sink {
        let name = name.as_ref();
        loop {
            if let Some(handle) = self.registry.lookup(name) {
                return Sink::from_handle(handle);
            }
            // a concurrent caller may register the name first; look again
            if let Ok(sink) = self.create_sink(name, self.defaults.clone(), OutputId::DEFAULT) {
                return sink;
            }
        }
    }

    /// Builder for a sink with its own settings or output
    pub fn sink_builder(&self, name: impl Into<String>) -> SinkBuilder<'_> {
        SinkBuilder {
            logger: self,
            name: name.into(),
            config: self.defaults.clone(),
            output: OutputId::DEFAULT,
            device: None,
        }
    }

    fn create_sink(&self, name: &str, config: SinkConfig, output: OutputId) -> Result<Sink> {
        let (shared, reader) = SinkShared::new(
            name.to_string(),
            config,
            output,
            Arc::downgrade(&self.registry),
            Arc::clone(&self.metrics),
        );
        let handle = Arc::new(SinkHandle {
            shared: Arc::clone(&shared),
        });
        if let Err(e) = self.registry.insert(&handle) {
            // nothing to close on the consumer side
            shared.force_close();
            return Err(e);
        }

        let queue = SinkQueue { shared, reader };
        if self.commands.send(Command::AddSink(queue)).is_err() {
            // the rejected queue was dropped, which detached the sink
            self.registry.remove(&handle.shared);
        }
        Ok(Sink::from_handle(handle))
    }

    /// Register another output device for sinks to write to
    pub fn add_output(&self, device: impl OutputDevice + 'static) -> Result<OutputId> {
        self.add_output_boxed(Box::new(device))
    }

    fn add_output_boxed(&self, device: Box<dyn OutputDevice>) -> Result<OutputId> {
        let id = OutputId(self.next_output.fetch_add(1, Ordering::Relaxed));
        self.commands
            .send(Command::AddOutput { id, device })
            .map_err(|_| LoggerError::LoggerStopped)?;
        Ok(id)
    }

    /// Snapshot of every registered sink, sorted by name
    pub fn sinks(&self) -> Vec<SinkInfo> {
        self.registry.infos()
    }

    /// Set the level of every sink whose name matches `pattern`; returns how
    /// many sinks were changed
    pub fn set_level_matching(&self, pattern: &Pattern, level: LogLevel) -> Result<usize> {
        let matcher = pattern.matcher()?;
        let matched = self.registry.matching(|name| matcher.is_match(name));
        for shared in &matched {
            shared.set_level(level);
        }
        Ok(matched.len())
    }

    /// Write out everything logged so far, then reopen every output device
    ///
    /// Blocks until the consumer has done so.
    ///
    /// # Errors
    ///
    /// The first device error, or [`LoggerError::LoggerStopped`].
    pub fn reopen(&self) -> Result<()> {
        let (reply, outcome) = bounded(1);
        self.commands
            .send(Command::ReopenAll(reply))
            .map_err(|_| LoggerError::LoggerStopped)?;
        outcome.recv().map_err(|_| LoggerError::LoggerStopped)?
    }

    /// Get the logger metrics for detailed observability
    ///
    /// # Example
    ///
    /// ```
    /// use ringlog::outputs::MemoryOutput;
    /// use ringlog::Logger;
    ///
    /// let logger = Logger::builder().device(MemoryOutput::new()).build().unwrap();
    ///
    /// // After logging operations...
    /// let metrics = logger.metrics();
    /// println!("Dropped: {}", metrics.dropped_count());
    /// println!("Written: {}", metrics.written_count());
    /// println!("Drop rate: {:.2}%", metrics.drop_rate());
    /// ```
    pub fn metrics(&self) -> &LoggerMetrics {
        &self.metrics
    }

    /// Path of the control endpoint for this logger
    pub fn command_path(&self) -> &Path {
        &self.command_path
    }

    /// Defaults applied to sinks from [`get_sink`](Self::get_sink)
    pub fn sink_defaults(&self) -> &SinkConfig {
        &self.defaults
    }

    /// Stop the consumer thread
    ///
    /// The consumer keeps serving sinks until all of them are closed or
    /// `timeout` has passed, then closes the remaining ones after writing
    /// what they hold.
    ///
    /// **Note**: When the logger is dropped without calling `shutdown()` explicitly,
    /// it uses [`DEFAULT_SHUTDOWN_TIMEOUT`] (5 seconds).
    ///
    /// # Returns
    ///
    /// `true` if every sink was closed by its owners within the timeout,
    /// `false` otherwise
    ///
    /// # Example
    ///
    /// ```no_run
    /// use ringlog::{info, Logger};
    /// use std::time::Duration;
    ///
    /// let mut logger = Logger::new().unwrap();
    /// let sink = logger.get_sink("main");
    /// info!(sink, "Important message");
    /// drop(sink);
    ///
    /// if !logger.shutdown(Duration::from_secs(10)) {
    ///     eprintln!("Warning: Logger shutdown timed out");
    /// }
    /// ```
    pub fn shutdown(&mut self, timeout: Duration) -> bool {
        let Some(handle) = self.consumer.take() else {
            return true;
        };
        let _ = self.commands.send(Command::Shutdown {
            deadline: Instant::now() + timeout,
        });

        let limit = timeout + SHUTDOWN_GRACE;
        let start = Instant::now();
        loop {
            if handle.is_finished() {
                // Thread finished, join it to check for panics
                return match handle.join() {
                    Ok(graceful) => graceful,
                    Err(e) => {
                        eprintln!(
                            "[LOGGER ERROR] Consumer thread panicked during shutdown: {:?}",
                            e
                        );
                        false
                    }
                };
            }

            if start.elapsed() >= limit {
                eprintln!(
                    "[LOGGER WARNING] Consumer thread did not finish within {:?}. \
                     Some logs may be lost.",
                    limit
                );
                return false;
            }

            // Small sleep to avoid busy-waiting
            thread::sleep(Duration::from_millis(1));
        }
    }
}

impl Drop for Logger {
    fn drop(&mut self) {
        self.shutdown(DEFAULT_SHUTDOWN_TIMEOUT);

        let dropped = self.metrics.dropped_count();
        if dropped > 0 {
            eprintln!(
                "[LOGGER WARNING] Logger shutting down with {} dropped logs (drop rate: {:.2}%)",
                dropped,
                self.metrics.drop_rate()
            );
        }
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("sinks", &self.registry.len())
            .field("running", &self.consumer.is_some())
            .field("command_path", &self.command_path)
            .finish()
    }
}

/// Builder for constructing a Logger with a fluent API
///
/// # Example
/// ```
/// use ringlog::prelude::*;
/// use std::sync::Arc;
///
/// let logger = Logger::builder()
///     .device(MemoryOutput::new())
///     .level(LogLevel::Debug)
///     .clock(ClockKind::Tsc)
///     .capacity(1 << 20)
///     .format(OutputFormat::Json)
///     .on_overflow(Arc::new(|sink: &str, count: u64| {
///         eprintln!("ALERT: {} dropped {} records", sink, count);
///     }))
///     .build()
///     .unwrap();
/// ```
pub struct LoggerBuilder {
    config: LoggerConfig,
    output: Option<Box<dyn OutputDevice>>,
    hooks: Hooks,
}

impl LoggerBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self {
            config: LoggerConfig::default(),
            output: None,
            hooks: Hooks::default(),
        }
    }

    /// Replace the whole configuration, keeping the output and hooks
    #[must_use = "builder methods return a new value"]
    pub fn config(mut self, config: LoggerConfig) -> Self {
        self.config = config;
        self
    }

    /// Append to the file at `path` by default
    #[must_use = "builder methods return a new value"]
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.path = Some(path.into());
        self.output = None;
        self
    }

    /// Write to `stream` by default
    #[must_use = "builder methods return a new value"]
    pub fn stream(self, stream: impl Write + Send + 'static) -> Self {
        self.device(StreamOutput::new(stream, "stream"))
    }

    /// Use `device` as the default output
    #[must_use = "builder methods return a new value"]
    pub fn device(mut self, device: impl OutputDevice + 'static) -> Self {
        self.output = Some(Box::new(device));
        self
    }

    /// Default level of new sinks
    #[must_use = "builder methods return a new value"]
    pub fn level(mut self, level: LogLevel) -> Self {
        self.config.sink.level = level;
        self
    }

    /// Default clock of new sinks
    #[must_use = "builder methods return a new value"]
    pub fn clock(mut self, clock: ClockKind) -> Self {
        self.config.sink.clock = clock;
        self
    }

    /// Default ring buffer size of new sinks, in bytes
    #[must_use = "builder methods return a new value"]
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.config.sink.capacity = capacity;
        self
    }

    /// Longest string copied into a record by default
    #[must_use = "builder methods return a new value"]
    pub fn max_inline(mut self, max_inline: usize) -> Self {
        self.config.sink.max_inline = max_inline;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.config.sink.error_policy = policy;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn format(mut self, format: OutputFormat) -> Self {
        self.config.format = format;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn timestamp_format(mut self, format: TimestampFormat) -> Self {
        self.config.timestamp_format = format;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn level_style(mut self, style: LevelStyle) -> Self {
        self.config.level_style = style;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn wait_strategy(mut self, wait: WaitStrategy) -> Self {
        self.config.wait_strategy = wait;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.config.batch_size = batch_size;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn calibration_interval(mut self, interval: Duration) -> Self {
        self.config.calibration_interval = interval;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn command_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.command_path = Some(path.into());
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.config.thread_name = name.into();
        self
    }

    /// Receive consumer-side errors instead of the stderr diagnostic
    #[must_use = "builder methods return a new value"]
    pub fn on_error(mut self, hook: ErrorHook) -> Self {
        self.hooks.on_error = Some(hook);
        self
    }

    /// Called with the sink name whenever a sync completed
    #[must_use = "builder methods return a new value"]
    pub fn on_flush(mut self, hook: FlushHook) -> Self {
        self.hooks.on_flush = Some(hook);
        self
    }

    /// Called with the device name whenever a device was reopened
    #[must_use = "builder methods return a new value"]
    pub fn on_reopen(mut self, hook: ReopenHook) -> Self {
        self.hooks.on_reopen = Some(hook);
        self
    }

    /// Set a callback for overflow notifications
    ///
    /// The callback is invoked by the consumer after it reported new drops
    /// for a sink. The parameters are the sink name and the total count of
    /// records that sink dropped.
    #[must_use = "builder methods return a new value"]
    pub fn on_overflow(mut self, callback: OverflowCallback) -> Self {
        self.hooks.on_overflow = Some(callback);
        self
    }

    /// Open the default output and start the consumer thread
    ///
    /// # Errors
    ///
    /// Fails if the configuration is invalid, the log file cannot be opened
    /// or the thread cannot be spawned.
    pub fn build(self) -> Result<Logger> {
        let LoggerBuilder {
            config,
            output,
            hooks,
        } = self;

        if config.batch_size == 0 {
            return Err(LoggerError::config("batch_size", "must be at least 1"));
        }
        if config.sink.max_inline > u32::MAX as usize {
            return Err(LoggerError::config("max_inline", "must fit in 32 bits"));
        }

        let output: Box<dyn OutputDevice> = match (output, &config.path) {
            (Some(device), _) => device,
            (None, Some(path)) => Box::new(FileOutput::open(path)?),
            (None, None) => Box::new(StreamOutput::stderr()),
        };

        let registry = Arc::new(Registry::new());
        let metrics = Arc::new(LoggerMetrics::new());
        let (commands, receiver) = unbounded();
        let settings = ConsumerSettings {
            renderer: Renderer::new(
                config.format,
                config.timestamp_format.clone(),
                config.level_style,
                config.calibration_interval,
            ),
            wait: config.wait_strategy,
            batch_size: config.batch_size,
            hooks,
        };
        let consumer = Consumer::new(
            receiver,
            output,
            settings,
            Arc::clone(&registry),
            Arc::clone(&metrics),
        );

        let handle = thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || consumer.run())
            .map_err(|e| {
                LoggerError::io_operation("spawning consumer thread", e.to_string(), e)
            })?;

        Ok(Logger {
            registry,
            commands,
            consumer: Some(handle),
            next_output: AtomicUsize::new(OutputId::DEFAULT.index() + 1),
            defaults: config.sink,
            metrics,
            command_path: config.command_path.unwrap_or_else(default_command_path),
        })
    }
}

impl Default for LoggerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for a sink with its own settings or a dedicated output
///
/// Starts from the logger's sink defaults.
///
/// # Example
///
/// ```
/// use ringlog::outputs::MemoryOutput;
/// use ringlog::{ErrorPolicy, LogLevel, Logger};
///
/// let logger = Logger::builder().device(MemoryOutput::new()).build().unwrap();
/// let audit = MemoryOutput::new();
/// let sink = logger
///     .sink_builder("audit")
///     .level(LogLevel::Warn)
///     .capacity(4096)
///     .error_policy(ErrorPolicy::Ignore)
///     .device(audit.clone())
///     .build()
///     .unwrap();
///
/// assert_eq!(sink.capacity(), 4096);
/// assert!(logger.sink_builder("audit").build().is_err());
/// ```
pub struct SinkBuilder<'a> {
    logger: &'a Logger,
    name: String,
    config: SinkConfig,
    output: OutputId,
    device: Option<Box<dyn OutputDevice>>,
}

impl SinkBuilder<'_> {
    #[must_use = "builder methods return a new value"]
    pub fn config(mut self, config: SinkConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn level(mut self, level: LogLevel) -> Self {
        self.config.level = level;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn clock(mut self, clock: ClockKind) -> Self {
        self.config.clock = clock;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.config.capacity = capacity;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn max_inline(mut self, max_inline: usize) -> Self {
        self.config.max_inline = max_inline;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.config.error_policy = policy;
        self
    }

    /// Write to an output registered with [`Logger::add_output`]
    #[must_use = "builder methods return a new value"]
    pub fn output(mut self, output: OutputId) -> Self {
        self.output = output;
        self.device = None;
        self
    }

    /// Write to a dedicated device, closed together with the sink
    #[must_use = "builder methods return a new value"]
    pub fn device(mut self, device: impl OutputDevice + 'static) -> Self {
        self.device = Some(Box::new(device));
        self
    }

    /// Create and register the sink
    ///
    /// # Errors
    ///
    /// [`LoggerError::SinkNameInUse`] if an open sink already has the name.
    pub fn build(self) -> Result<Sink> {
        if self.logger.registry.lookup(&self.name).is_some() {
            return Err(LoggerError::SinkNameInUse { name: self.name });
        }
        let (output, dedicated) = match self.device {
            Some(device) => (self.logger.add_output_boxed(device)?, true),
            None => (self.output, false),
        };
        let result = self.logger.create_sink(&self.name, self.config, output);
        if result.is_err() && dedicated {
            // the name was taken after the lookup
            let _ = self.logger.commands.send(Command::DiscardOutput(output));
        }
        result
    }
}
