//! Timestamp sources
//!
//! Three clocks are available. [`Realtime`] reads the system wall clock on
//! every call. [`Coarse`] reads a cached wall-clock value that consumer
//! threads refresh once per polling cycle, which costs a single atomic load
//! at the call site but is only as precise as the consumer's cycle. [`Tsc`]
//! reads the CPU cycle counter; the consumer converts ticks back to wall
//! time through a [`TscCalibration`].
//!
//! The clock is chosen statically through the [`Clock`] trait on the hot
//! path, or at runtime through [`ClockKind`] for a sink's default.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Default interval between cycle-counter re-anchoring
pub const DEFAULT_CALIBRATION_INTERVAL: Duration = Duration::from_secs(60);

/// Runtime selector for the clock used by a sink when no clock is given
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ClockKind {
    #[default]
    Realtime = 0,
    Coarse = 1,
    Tsc = 2,
}

impl ClockKind {
    #[inline]
    pub fn now(self) -> Timestamp {
        match self {
            ClockKind::Realtime => Realtime::now(),
            ClockKind::Coarse => Coarse::now(),
            ClockKind::Tsc => Tsc::now(),
        }
    }
}

/// A timestamp as captured by the producer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timestamp {
    /// Nanoseconds since the Unix epoch
    Wall(i64),
    /// Raw cycle-counter reading
    Ticks(u64),
}

impl Timestamp {
    pub fn kind(&self) -> ClockKind {
        match self {
            Timestamp::Wall(_) => ClockKind::Realtime,
            Timestamp::Ticks(_) => ClockKind::Tsc,
        }
    }
}

/// Static clock strategy
pub trait Clock {
    const KIND: ClockKind;

    fn now() -> Timestamp;
}

/// System wall clock
pub struct Realtime;

/// Cached wall clock refreshed by the consumer
pub struct Coarse;

/// CPU cycle counter
pub struct Tsc;

impl Clock for Realtime {
    const KIND: ClockKind = ClockKind::Realtime;

    #[inline]
    fn now() -> Timestamp {
        Timestamp::Wall(wall_nanos())
    }
}

static COARSE_NANOS: AtomicI64 = AtomicI64::new(0);

impl Clock for Coarse {
    const KIND: ClockKind = ClockKind::Coarse;

    #[inline]
    fn now() -> Timestamp {
        let cached = COARSE_NANOS.load(Ordering::Relaxed);
        if cached != 0 {
            return Timestamp::Wall(cached);
        }
        Timestamp::Wall(refresh_coarse())
    }
}

impl Clock for Tsc {
    const KIND: ClockKind = ClockKind::Tsc;

    #[inline]
    fn now() -> Timestamp {
        Timestamp::Ticks(read_ticks())
    }
}

/// Current wall-clock time in nanoseconds since the Unix epoch
pub fn wall_nanos() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_nanos() as i64,
        Err(e) => -(e.duration().as_nanos() as i64),
    }
}

/// Update the cached value read by [`Coarse`] and return it
pub fn refresh_coarse() -> i64 {
    let now = wall_nanos();
    COARSE_NANOS.store(now, Ordering::Relaxed);
    now
}

/// Convert nanoseconds since the epoch into a chrono timestamp
pub fn nanos_to_datetime(nanos: i64) -> DateTime<Utc> {
    Utc.timestamp_nanos(nanos)
}

/// Read the cycle counter
#[cfg(target_arch = "x86_64")]
#[inline]
pub fn read_ticks() -> u64 {
    // SAFETY: rdtsc is available on every x86_64 CPU and has no side effects.
    unsafe { core::arch::x86_64::_rdtsc() }
}

/// Read the cycle counter
///
/// Targets without an accessible cycle counter use a monotonic nanosecond
/// count instead, which makes the tick frequency exactly 1 GHz.
#[cfg(not(target_arch = "x86_64"))]
#[inline]
pub fn read_ticks() -> u64 {
    static ORIGIN: OnceLock<Instant> = OnceLock::new();
    ORIGIN.get_or_init(Instant::now).elapsed().as_nanos() as u64
}

/// Cycle-counter frequency in Hz, measured once per process
pub fn tick_frequency() -> f64 {
    static FREQUENCY: OnceLock<f64> = OnceLock::new();
    *FREQUENCY.get_or_init(|| {
        if cfg!(target_arch = "x86_64") {
            estimate_tick_frequency()
        } else {
            1e9
        }
    })
}

/// Measure the cycle-counter frequency against the monotonic clock
///
/// Samples every 10 ms until five consecutive estimates agree within
/// 1000 Hz, giving up after two seconds.
fn estimate_tick_frequency() -> f64 {
    const SAMPLE_INTERVAL: Duration = Duration::from_millis(10);
    const MAX_SAMPLES: usize = 200;
    const TOLERANCE_HZ: f64 = 1000.0;

    let ticks0 = read_ticks();
    let instant0 = Instant::now();

    let mut history = [0.0f64; 5];
    let mut samples = 0usize;

    loop {
        std::thread::sleep(SAMPLE_INTERVAL);

        let elapsed_ticks = read_ticks().wrapping_sub(ticks0) as f64;
        let elapsed_nanos = instant0.elapsed().as_nanos() as f64;
        let hz = elapsed_ticks * 1e9 / elapsed_nanos;

        history[samples % history.len()] = hz;
        samples += 1;

        if samples >= history.len() {
            let min = history.iter().copied().fold(f64::INFINITY, f64::min);
            let max = history.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            if max - min < TOLERANCE_HZ || samples >= MAX_SAMPLES {
                return hz;
            }
        }
    }
}

/// Paired (ticks, wall nanos) reading used to anchor conversions
pub type AnchorSample = fn() -> (u64, i64);

fn sample_now() -> (u64, i64) {
    (read_ticks(), wall_nanos())
}

/// Converts cycle-counter readings into wall-clock time
///
/// The mapping is anchored on a paired sample of the counter and the wall
/// clock. A reading more than one calibration interval past the anchor
/// re-anchors first, so the error of a converted timestamp is bounded by the
/// counter drift accumulated over one interval.
pub struct TscCalibration {
    frequency: Option<f64>,
    interval: Duration,
    anchor: Option<(u64, i64)>,
    sample: AnchorSample,
}

impl TscCalibration {
    pub fn new(interval: Duration) -> Self {
        Self {
            frequency: None,
            interval,
            anchor: None,
            sample: sample_now,
        }
    }

    /// Calibration with a known frequency and anchor source
    pub fn with_source(frequency: f64, interval: Duration, sample: AnchorSample) -> Self {
        Self {
            frequency: Some(frequency),
            interval,
            anchor: None,
            sample,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    fn frequency(&mut self) -> f64 {
        *self.frequency.get_or_insert_with(tick_frequency)
    }

    /// Take a fresh anchor sample
    pub fn recalibrate(&mut self) {
        self.anchor = Some((self.sample)());
    }

    /// Wall-clock nanoseconds corresponding to `ticks`
    pub fn to_wall_nanos(&mut self, ticks: u64) -> i64 {
        let hz = self.frequency();
        let interval_ticks = (self.interval.as_secs_f64() * hz) as u64;

        let stale = match self.anchor {
            None => true,
            Some((anchor_ticks, _)) => ticks > anchor_ticks.saturating_add(interval_ticks),
        };
        if stale {
            self.recalibrate();
        }

        let (anchor_ticks, anchor_nanos) = self.anchor.unwrap_or_else(self.sample);
        let tick_delta = ticks.wrapping_sub(anchor_ticks) as i64;
        let nano_delta = (tick_delta as f64 * 1e9 / hz) as i64;
        anchor_nanos + nano_delta
    }

    /// Wall-clock time of any timestamp
    pub fn to_wall_clock(&mut self, timestamp: Timestamp) -> DateTime<Utc> {
        match timestamp {
            Timestamp::Wall(nanos) => nanos_to_datetime(nanos),
            Timestamp::Ticks(ticks) => nanos_to_datetime(self.to_wall_nanos(ticks)),
        }
    }
}

impl Default for TscCalibration {
    fn default() -> Self {
        Self::new(DEFAULT_CALIBRATION_INTERVAL)
    }
}
