//! Logger metrics for observability
//!
//! Counters shared by every sink of a logger and its consumer thread.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters describing what a logger did
///
/// # Example
///
/// ```
/// use ringlog::LoggerMetrics;
///
/// let metrics = LoggerMetrics::new();
/// metrics.record_written();
/// metrics.record_dropped();
///
/// assert_eq!(metrics.written_count(), 1);
/// assert_eq!(metrics.dropped_count(), 1);
/// ```
#[derive(Debug)]
pub struct LoggerMetrics {
    /// Records rendered and handed to an output device
    written: AtomicU64,

    /// Records lost to a full buffer or an ignored ingestion error
    dropped: AtomicU64,

    /// Failed device operations
    io_errors: AtomicU64,

    /// Sync markers completed
    syncs: AtomicU64,

    /// Device flushes performed while idle
    flushes: AtomicU64,

    /// Device reopens
    reopens: AtomicU64,
}

impl LoggerMetrics {
    pub const fn new() -> Self {
        Self {
            written: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            io_errors: AtomicU64::new(0),
            syncs: AtomicU64::new(0),
            flushes: AtomicU64::new(0),
            reopens: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn written_count(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn io_error_count(&self) -> u64 {
        self.io_errors.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn sync_count(&self) -> u64 {
        self.syncs.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn flush_count(&self) -> u64 {
        self.flushes.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn reopen_count(&self) -> u64 {
        self.reopens.load(Ordering::Relaxed)
    }

    /// Record a written entry, returning the previous count
    #[inline]
    pub fn record_written(&self) -> u64 {
        self.written.fetch_add(1, Ordering::Relaxed)
    }

    /// Record a dropped entry, returning the previous count
    #[inline]
    pub fn record_dropped(&self) -> u64 {
        self.dropped.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_io_error(&self) -> u64 {
        self.io_errors.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_sync(&self) -> u64 {
        self.syncs.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_flush(&self) -> u64 {
        self.flushes.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_reopen(&self) -> u64 {
        self.reopens.fetch_add(1, Ordering::Relaxed)
    }

    /// Share of records dropped, as a percentage (0.0 - 100.0)
    ///
    /// Returns 0.0 if nothing was logged yet.
    pub fn drop_rate(&self) -> f64 {
        let dropped = self.dropped_count() as f64;
        let total = self.written_count() as f64 + dropped;
        if total == 0.0 {
            0.0
        } else {
            (dropped / total) * 100.0
        }
    }

    pub fn reset(&self) {
        self.written.store(0, Ordering::Relaxed);
        self.dropped.store(0, Ordering::Relaxed);
        self.io_errors.store(0, Ordering::Relaxed);
        self.syncs.store(0, Ordering::Relaxed);
        self.flushes.store(0, Ordering::Relaxed);
        self.reopens.store(0, Ordering::Relaxed);
    }
}

impl Default for LoggerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for LoggerMetrics {
    /// Snapshot of the current values
    fn clone(&self) -> Self {
        Self {
            written: AtomicU64::new(self.written_count()),
            dropped: AtomicU64::new(self.dropped_count()),
            io_errors: AtomicU64::new(self.io_error_count()),
            syncs: AtomicU64::new(self.sync_count()),
            flushes: AtomicU64::new(self.flush_count()),
            reopens: AtomicU64::new(self.reopen_count()),
        }
    }
}
