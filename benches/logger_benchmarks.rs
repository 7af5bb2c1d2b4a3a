//! Criterion benchmarks for ringlog

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use ringlog::core::format::render;
use ringlog::core::record::Arg;
use ringlog::prelude::*;
use ringlog::{info, try_log};
use std::sync::Arc;
use std::thread;

fn discard() -> CallbackOutput {
    CallbackOutput::new("discard", |_level, bytes| Ok(bytes.len()))
}

fn bench_logger() -> Logger {
    Logger::builder()
        .device(discard())
        .capacity(1 << 20)
        .build()
        .expect("Failed to build logger")
}

// ============================================================================
// Logger Creation Benchmarks
// ============================================================================

fn bench_logger_creation(c: &mut Criterion) {
    let mut group = c.benchmark_group("logger_creation");
    group.throughput(Throughput::Elements(1));

    group.bench_function("build_and_shutdown", |b| {
        b.iter(|| {
            let logger = bench_logger();
            black_box(&logger);
        });
    });

    let logger = bench_logger();
    group.bench_function("get_existing_sink", |b| {
        let _sink = logger.get_sink("existing");
        b.iter(|| black_box(logger.get_sink("existing")));
    });

    group.finish();
}

// ============================================================================
// Producer-side Latency Benchmarks
// ============================================================================

fn bench_log_calls(c: &mut Criterion) {
    let mut group = c.benchmark_group("log_calls");
    group.throughput(Throughput::Elements(1));

    let logger = bench_logger();
    let sink = logger.get_sink("bench");

    group.bench_function("filtered_out", |b| {
        b.iter(|| ringlog::debug!(sink, "Debug {}", black_box(1)));
    });

    group.bench_function("no_args", |b| {
        b.iter(|| info!(sink, "Info message"));
    });

    group.bench_function("integers", |b| {
        b.iter(|| info!(sink, "a={} b={} c={}", black_box(1u32), black_box(-2i64), black_box(3usize)));
    });

    group.bench_function("float_precision", |b| {
        b.iter(|| info!(sink, "ratio {:.3}", black_box(0.125f64)));
    });

    let text = "a moderately long string argument copied into the record";
    group.bench_function("string_copy", |b| {
        b.iter(|| info!(sink, "text {}", black_box(text)));
    });

    group.bench_function("string_nocopy", |b| {
        b.iter(|| info!(sink, "text {}", nocopy("a static string logged by address")));
    });

    let shared: Arc<str> = Arc::from("shared string");
    group.bench_function("shared_str", |b| {
        b.iter(|| info!(sink, "text {}", shared));
    });

    group.bench_function("display_wrapper", |b| {
        b.iter(|| info!(sink, "addr {}", display(std::net::Ipv4Addr::LOCALHOST)));
    });

    group.bench_function("tsc_clock", |b| {
        b.iter(|| info!(sink, clock: Tsc, "tick {}", black_box(7u8)));
    });

    group.bench_function("coarse_clock", |b| {
        b.iter(|| info!(sink, clock: Coarse, "tick {}", black_box(7u8)));
    });

    group.bench_function("try_log", |b| {
        b.iter(|| try_log!(sink, LogLevel::Info, "tick {}", black_box(7u8)));
    });

    group.finish();
    sink.sync();
}

// ============================================================================
// Throughput Benchmarks
// ============================================================================

fn bench_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("throughput");
    const BATCH: u64 = 10_000;
    group.throughput(Throughput::Elements(BATCH));

    let logger = bench_logger();
    let sink = logger.get_sink("throughput");
    group.bench_function("single_sink_synced", |b| {
        b.iter(|| {
            for i in 0..BATCH {
                info!(sink, "message {}", i);
            }
            sink.sync();
        });
    });

    let sinks: Vec<Sink> = (0..4).map(|i| logger.get_sink(format!("worker-{}", i))).collect();
    group.bench_function("four_threads", |b| {
        b.iter(|| {
            thread::scope(|scope| {
                for sink in &sinks {
                    scope.spawn(move || {
                        for i in 0..BATCH / 4 {
                            info!(sink, "message {}", i);
                        }
                        sink.sync();
                    });
                }
            });
        });
    });

    group.finish();
}

// ============================================================================
// Consumer-side Rendering Benchmarks
// ============================================================================

fn bench_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("render");
    group.throughput(Throughput::Elements(1));

    let args = [Arg::Str("db-01"), Arg::U64(42), Arg::F64(12.5)];
    let mut out = String::with_capacity(256);
    group.bench_function("mixed_placeholders", |b| {
        b.iter(|| {
            out.clear();
            render(black_box("host {} served {:>6} requests in {:.2} ms"), &args, &mut out);
            black_box(out.len())
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_logger_creation,
    bench_log_calls,
    bench_throughput,
    bench_render
);

criterion_main!(benches);
