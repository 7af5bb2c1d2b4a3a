//! Logging macros
//!
//! The macros take a [`Sink`](crate::Sink), a format string and its
//! arguments, like `println!`. Each call site becomes a `static`
//! [`CallSite`](crate::CallSite), so the format string is validated while
//! compiling and never copied at run time. Arguments are only evaluated when
//! the sink's level lets the record through.
//!
//! The format string accepts positional placeholders with the usual
//! fill, alignment, sign, `#`, `0`, width, precision and `?`, `x`, `X`,
//! `o`, `b`, `e`, `E` options. Named arguments and `*`/`name$` widths are
//! rejected.
//!
//! A leading `clock: Realtime`, `clock: Coarse` or `clock: Tsc` picks the
//! timestamp source statically instead of the sink's default.
//!
//! # Examples
//!
//! ```
//! use ringlog::outputs::MemoryOutput;
//! use ringlog::{info, warn, Logger};
//!
//! let logger = Logger::builder().device(MemoryOutput::new()).build().unwrap();
//! let sink = logger.get_sink("server");
//!
//! // Basic logging
//! info!(sink, "Server started");
//!
//! // With format arguments
//! let port = 8080;
//! info!(sink, "Server listening on port {}", port);
//!
//! // Cycle counter timestamps
//! let user_id = 42;
//! warn!(sink, clock: Tsc, "User {} failed to log in, attempt {:>2}", user_id, 3);
//! ```

#[doc(hidden)]
#[macro_export]
macro_rules! __ringlog_count {
    () => { 0usize };
    ($head:tt $($tail:tt)*) => { 1usize + $crate::__ringlog_count!($($tail)*) };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __ringlog_callsite {
    ($fmt:literal $(, $arg:expr)*) => {{
        static CALLSITE: $crate::CallSite = $crate::CallSite::new(
            $fmt,
            ::core::file!(),
            ::core::line!(),
            ::core::module_path!(),
            $crate::__ringlog_count!($($arg)*),
        );
        if false {
            // type-check the arguments against the format
            let _ = ::core::format_args!($fmt $(, $arg)*);
        }
        &CALLSITE
    }};
}

/// Evaluates every argument once, binding each to a name from a fixed pool,
/// then encodes the bound references through the given sink method
#[doc(hidden)]
#[macro_export]
macro_rules! __ringlog_dispatch {
    (@start $call:tt $fmt:literal $(, $arg:expr)*) => {
        $crate::__ringlog_dispatch!(
            [] [a0 a1 a2 a3 a4 a5 a6 a7 a8 a9 a10 a11] $call $fmt $(, $arg)*
        )
    };
    ([$($bound:tt)*] [$name:ident $($pool:ident)*] $call:tt $fmt:literal, $head:expr $(, $tail:expr)*) => {
        $crate::__ringlog_dispatch!(
            [$($bound)* ($name $head)] [$($pool)*] $call $fmt $(, $tail)*
        )
    };
    ([$(($name:ident $arg:expr))*] [$($pool:tt)*] ($sink:ident, $level:ident, {$($method:tt)+}) $fmt:literal) => {
        match ($(&$arg,)*) {
            ($($name,)*) => {
                let callsite = $crate::__ringlog_callsite!($fmt $(, $name)*);
                $sink.$($method)+($level, callsite, ($($name,)*));
            }
        }
    };
}

/// Log at a given level, waiting for buffer space if needed
///
/// # Examples
///
/// ```
/// # use ringlog::prelude::*;
/// # let logger = Logger::builder().device(MemoryOutput::new()).build().unwrap();
/// # let sink = logger.get_sink("doc");
/// use ringlog::log;
/// log!(sink, LogLevel::Info, "Simple message");
/// log!(sink, LogLevel::Error, "Error code: {}", 500);
/// log!(sink, LogLevel::Warn, clock: Coarse, "Queue at {:.1}%", 93.5);
/// ```
#[macro_export]
macro_rules! log {
    ($sink:expr, $level:expr, clock: $clock:ident, $fmt:literal $(, $arg:expr)* $(,)?) => {{
        let sink = &$sink;
        let level: $crate::LogLevel = $level;
        if sink.is_enabled(level) {
            $crate::__ringlog_dispatch!(
                @start (sink, level, {log_with::<$crate::$clock, $crate::Blocking, _>}) $fmt $(, $arg)*
            );
        }
    }};
    ($sink:expr, $level:expr, $fmt:literal $(, $arg:expr)* $(,)?) => {{
        let sink = &$sink;
        let level: $crate::LogLevel = $level;
        if sink.is_enabled(level) {
            $crate::__ringlog_dispatch!(@start (sink, level, {log}) $fmt $(, $arg)*);
        }
    }};
}

/// Log at a given level, dropping the record if the buffer is full
///
/// Dropped records are counted by the sink and reported in its output once
/// the consumer catches up.
///
/// # Examples
///
/// ```
/// # use ringlog::prelude::*;
/// # let logger = Logger::builder().device(MemoryOutput::new()).build().unwrap();
/// # let sink = logger.get_sink("doc");
/// use ringlog::try_log;
/// for seq in 0..1000u32 {
///     try_log!(sink, LogLevel::Info, "tick {}", seq);
/// }
/// sink.sync();
/// ```
#[macro_export]
macro_rules! try_log {
    ($sink:expr, $level:expr, clock: $clock:ident, $fmt:literal $(, $arg:expr)* $(,)?) => {{
        let sink = &$sink;
        let level: $crate::LogLevel = $level;
        if sink.is_enabled(level) {
            $crate::__ringlog_dispatch!(
                @start (sink, level, {log_with::<$crate::$clock, $crate::NonBlocking, _>}) $fmt $(, $arg)*
            );
        }
    }};
    ($sink:expr, $level:expr, $fmt:literal $(, $arg:expr)* $(,)?) => {{
        let sink = &$sink;
        let level: $crate::LogLevel = $level;
        if sink.is_enabled(level) {
            $crate::__ringlog_dispatch!(@start (sink, level, {try_log}) $fmt $(, $arg)*);
        }
    }};
}

/// Log a debug-level message.
///
/// # Examples
///
/// ```
/// # use ringlog::prelude::*;
/// # let logger = Logger::builder().device(MemoryOutput::new()).level(LogLevel::Debug).build().unwrap();
/// # let sink = logger.get_sink("doc");
/// use ringlog::debug;
/// debug!(sink, "Debug information");
/// debug!(sink, "Counter value: {}", 10);
/// ```
#[macro_export]
macro_rules! debug {
    ($sink:expr, $($rest:tt)+) => {
        $crate::log!($sink, $crate::LogLevel::Debug, $($rest)+)
    };
}

/// Log an info-level message.
///
/// # Examples
///
/// ```
/// # use ringlog::prelude::*;
/// # let logger = Logger::builder().device(MemoryOutput::new()).build().unwrap();
/// # let sink = logger.get_sink("doc");
/// use ringlog::info;
/// info!(sink, "Application started");
/// info!(sink, "Processing {} items", 100);
/// ```
#[macro_export]
macro_rules! info {
    ($sink:expr, $($rest:tt)+) => {
        $crate::log!($sink, $crate::LogLevel::Info, $($rest)+)
    };
}

/// Log a warning-level message.
///
/// # Examples
///
/// ```
/// # use ringlog::prelude::*;
/// # let logger = Logger::builder().device(MemoryOutput::new()).build().unwrap();
/// # let sink = logger.get_sink("doc");
/// use ringlog::warn;
/// warn!(sink, "Low disk space");
/// warn!(sink, "Retry attempt {} of {}", 3, 5);
/// ```
#[macro_export]
macro_rules! warn {
    ($sink:expr, $($rest:tt)+) => {
        $crate::log!($sink, $crate::LogLevel::Warn, $($rest)+)
    };
}

/// Log an error-level message.
///
/// # Examples
///
/// ```
/// # use ringlog::prelude::*;
/// # let logger = Logger::builder().device(MemoryOutput::new()).build().unwrap();
/// # let sink = logger.get_sink("doc");
/// use ringlog::error;
/// error!(sink, "Failed to connect to database");
/// error!(sink, "HTTP error: {} - {}", 404, "Not Found");
/// ```
#[macro_export]
macro_rules! error {
    ($sink:expr, $($rest:tt)+) => {
        $crate::log!($sink, $crate::LogLevel::Error, $($rest)+)
    };
}

/// Log a fatal-level message and wait until it reached the device.
///
/// The process is not aborted.
///
/// # Examples
///
/// ```
/// # use ringlog::prelude::*;
/// # let logger = Logger::builder().device(MemoryOutput::new()).build().unwrap();
/// # let sink = logger.get_sink("doc");
/// use ringlog::fatal;
/// fatal!(sink, "Critical system failure");
/// fatal!(sink, "Unrecoverable error: {}", "out of memory");
/// ```
#[macro_export]
macro_rules! fatal {
    ($sink:expr, $($rest:tt)+) => {{
        let sink = &$sink;
        $crate::log!(*sink, $crate::LogLevel::Fatal, $($rest)+);
        sink.sync();
    }};
}
