//! Core logger types and traits

pub mod args;
pub mod clock;
pub mod consumer;
pub mod error;
pub mod format;
pub mod log_level;
pub mod logger;
pub mod metrics;
pub mod record;
pub(crate) mod registry;
pub mod render;
pub mod ring_buffer;
pub mod sink;
pub mod timestamp;

pub use args::{debug, display, nocopy, nocopy_unchecked, DebugArg, DisplayArg, LogArg, LogArgs, NoCopy};
pub use clock::{Clock, ClockKind, Coarse, Realtime, Timestamp, Tsc, TscCalibration};
pub use consumer::{ErrorHook, FlushHook, OverflowCallback, ReopenHook, WaitStrategy};
pub use error::{LoggerError, Result};
pub use format::CallSite;
pub use log_level::{LevelStyle, LogLevel};
pub use logger::{Logger, LoggerBuilder, LoggerConfig, SinkBuilder, DEFAULT_SHUTDOWN_TIMEOUT};
pub use metrics::LoggerMetrics;
pub use render::OutputFormat;
pub use sink::{Backpressure, Blocking, ErrorPolicy, NonBlocking, Sink, SinkConfig, SinkHealth, SinkInfo};
pub use timestamp::TimestampFormat;
