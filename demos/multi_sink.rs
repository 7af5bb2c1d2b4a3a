//! Multiple sinks example
//!
//! Demonstrates several named sinks sharing one output, a sink with a
//! dedicated JSON output, and the control protocol.
//!
//! Run with: cargo run --example multi_sink

use ringlog::control::{handle_json, handle_request};
use ringlog::prelude::*;
use ringlog::{debug, info, warn};
use std::sync::Arc;
use std::thread;

fn main() -> Result<()> {
    println!("=== ringlog - Multiple Sinks Example ===\n");

    let logger = Logger::builder()
        .device(StreamOutput::stdout())
        .on_overflow(Arc::new(|sink: &str, total: u64| {
            eprintln!("sink {} has dropped {} records", sink, total);
        }))
        .build()?;

    println!("1. One sink per subsystem, logged from several threads:");
    let subsystems = ["net.rx", "net.tx", "disk"];
    thread::scope(|scope| {
        for name in subsystems {
            let sink = logger.get_sink(name);
            scope.spawn(move || {
                for i in 0..3 {
                    info!(sink, "{} step {}", name, i);
                }
                sink.sync();
            });
        }
    });

    println!("\n2. A sink with its own JSON output:");
    let json_output = CallbackOutput::new("json-stdout", |_level, bytes| {
        print!("json: {}", String::from_utf8_lossy(bytes));
        Ok(bytes.len())
    });
    let audit = logger
        .sink_builder("audit")
        .level(LogLevel::Warn)
        .device(json_output)
        .build()?;
    warn!(audit, "Permission denied for user {}", 1001);
    audit.sync();

    println!("\n3. Control requests:");
    let net = logger.get_sink("net.rx");
    let request = ControlRequest::SetLevel {
        level: LogLevel::Debug,
        pattern: Pattern::wildcard("net.*"),
    };
    println!("   SetLevel -> {:?}", handle_request(&logger, &request));
    debug!(net, "Debug output enabled at run time");
    net.sync();
    println!("   Status -> {}", handle_json(&logger, r#"{"Status":{}}"#));

    drop(net);
    drop(audit);
    println!("\n=== Example completed successfully! ===");

    Ok(())
}
