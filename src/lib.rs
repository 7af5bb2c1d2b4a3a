//! # ringlog
//!
//! An asynchronous, low-latency logging engine.
//!
//! Log calls serialise their arguments into a binary record and push it onto
//! a per-sink ring buffer. Formatting and I/O happen on a single consumer
//! thread owned by the [`Logger`], so the calling thread only pays for a copy.
//!
//! ## Features
//!
//! - **Low latency**: format strings are validated at compile time and
//!   arguments are copied, not formatted, on the hot path
//! - **Per-sink ordering**: every sink has its own single-producer buffer;
//!   records from one sink reach the device in call order
//! - **Backpressure control**: block until space frees up, or drop and count
//! - **Clocks**: wall clock, cached coarse clock or the CPU cycle counter
//! - **Runtime control**: rename, reopen, sync and re-level sinks while
//!   running, locally or through [`control`] requests
//!
//! ## Example
//!
//! ```
//! use ringlog::prelude::*;
//! use ringlog::{info, warn};
//!
//! let output = MemoryOutput::new();
//! let logger = Logger::builder().device(output.clone()).build().unwrap();
//!
//! let app = logger.get_sink("app");
//! info!(app, "Starting {} workers", 4);
//! warn!(app, "Cache miss ratio {:.2}", 0.25);
//! app.sync();
//!
//! assert_eq!(output.lines().len(), 2);
//! ```

pub mod control;
pub mod core;
pub mod macros;
pub mod outputs;

pub mod prelude {
    pub use crate::control::{ControlRequest, ControlResponse, Pattern, PatternKind};
    pub use crate::core::{
        debug, display, nocopy, nocopy_unchecked, Blocking, CallSite, ClockKind, Coarse,
        ErrorPolicy, LevelStyle, LogLevel, Logger, LoggerBuilder, LoggerConfig, LoggerError,
        LoggerMetrics, NonBlocking, OutputFormat, Realtime, Result, Sink, SinkBuilder,
        SinkConfig, SinkInfo, TimestampFormat, Tsc, WaitStrategy, DEFAULT_SHUTDOWN_TIMEOUT,
    };
    pub use crate::outputs::{
        CallbackOutput, FileOutput, MemoryOutput, OutputDevice, OutputId, StreamOutput,
    };
}

pub use crate::core::{
    debug, display, nocopy, nocopy_unchecked, Backpressure, Blocking, CallSite, Clock,
    ClockKind, Coarse, ErrorHook, ErrorPolicy, FlushHook, LevelStyle, LogArg, LogArgs, LogLevel,
    Logger, LoggerBuilder, LoggerConfig, LoggerError, LoggerMetrics, NonBlocking, OutputFormat,
    OverflowCallback, Realtime, ReopenHook, Result, Sink, SinkBuilder, SinkConfig, SinkHealth,
    SinkInfo, Timestamp, TimestampFormat, Tsc, TscCalibration, WaitStrategy,
    DEFAULT_SHUTDOWN_TIMEOUT,
};
pub use crate::outputs::{OutputDevice, OutputId};
