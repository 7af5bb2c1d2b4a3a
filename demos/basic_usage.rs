//! Basic logger usage example
//!
//! Demonstrates logging to stdout at different levels, level thresholds and
//! the clock selection of the macros.
//!
//! Run with: cargo run --example basic_usage

use ringlog::prelude::*;
use ringlog::{debug, error, fatal, info, warn};

fn main() -> Result<()> {
    println!("=== ringlog - Basic Usage Example ===\n");

    // Logger writing to stdout, showing every level
    let logger = Logger::builder()
        .device(StreamOutput::stdout())
        .level(LogLevel::Debug)
        .build()?;
    let app = logger.get_sink("app");

    println!("1. Logging at different levels:");
    debug!(app, "This is a debug message");
    info!(app, "This is an info message");
    warn!(app, "This is a warning message");
    error!(app, "This is an error message");
    fatal!(app, "This is a fatal message");

    println!("\n2. Logging with a higher threshold:");
    app.set_level(LogLevel::Warn);
    println!("   Level set to WARN - debug and info won't show:");
    debug!(app, "Debug message (hidden)");
    info!(app, "Info message (hidden)");
    warn!(app, "Warning message (visible)");
    app.sync();

    println!("\n3. Formatting and clocks:");
    app.set_level(LogLevel::Info);
    let user = String::from("alice");
    info!(app, "User {} logged in from {}", user, "10.0.0.7");
    info!(app, clock: Tsc, "Request took {:>8.3} ms", 12.3456);
    info!(app, clock: Coarse, "Cache hit ratio {:5.1}%", 97.25);
    info!(app, "Flags {:#010b}, id {:#x}", 5u8, 48879u32);
    app.sync();

    drop(app);
    println!("\n=== Example completed successfully! ===");

    Ok(())
}
