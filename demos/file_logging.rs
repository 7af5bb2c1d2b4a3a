//! File logging example
//!
//! Demonstrates logging to a file and rotating it with an external rename
//! followed by a reopen.
//!
//! Run with: cargo run --example file_logging

use ringlog::prelude::*;
use ringlog::{error, info, warn};
use std::fs;

fn main() -> Result<()> {
    println!("=== ringlog - File Logging Example ===\n");

    let logger = Logger::builder()
        .path("application.log")
        .timestamp_format(TimestampFormat::Iso8601)
        .build()?;
    let app = logger.get_sink("app");

    println!("1. Logging to application.log:");
    info!(app, "Application started");
    info!(app, "Configuration loaded successfully");
    warn!(app, "Using default settings for some options");
    error!(app, "Failed to load optional plugin");

    println!("\n2. Performing some operations:");
    for i in 1..=5 {
        info!(app, "Processing item {}/5", i);
        if i == 3 {
            warn!(app, "Item 3 took longer than expected");
        }
    }
    app.sync();

    println!("\n3. Rotating the log file:");
    fs::rename("application.log", "application.log.1")?;
    logger.reopen()?;
    info!(app, "Logging continues in a fresh file");
    app.sync();

    for path in ["application.log.1", "application.log"] {
        let lines = fs::read_to_string(path)?.lines().count();
        println!("   {}: {} lines", path, lines);
    }

    drop(app);
    println!("\n=== Example completed successfully! ===");

    Ok(())
}
