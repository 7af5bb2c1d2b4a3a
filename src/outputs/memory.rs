//! In-memory output

use super::OutputDevice;
use crate::core::{LogLevel, Result};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Default)]
struct Generations {
    closed: Vec<Vec<u8>>,
    current: Vec<u8>,
    flushes: u64,
}

/// Collects output in memory, mainly for tests and embedding
///
/// Clones share the same buffer, so a clone kept by the caller observes
/// what the consumer wrote. `reopen` starts a new generation, which makes
/// rotation boundaries visible.
#[derive(Debug, Clone, Default)]
pub struct MemoryOutput {
    inner: Arc<Mutex<Generations>>,
}

impl MemoryOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text of the current generation
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.inner.lock().current).into_owned()
    }

    /// Lines of the current generation
    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_owned).collect()
    }

    /// Text of every generation, oldest first
    pub fn generations(&self) -> Vec<String> {
        let inner = self.inner.lock();
        inner
            .closed
            .iter()
            .chain(std::iter::once(&inner.current))
            .map(|g| String::from_utf8_lossy(g).into_owned())
            .collect()
    }

    pub fn flush_count(&self) -> u64 {
        self.inner.lock().flushes
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.closed.clear();
        inner.current.clear();
    }
}

impl OutputDevice for MemoryOutput {
    fn write(&mut self, _level: LogLevel, bytes: &[u8]) -> Result<()> {
        self.inner.lock().current.extend_from_slice(bytes);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.lock().flushes += 1;
        Ok(())
    }

    fn reopen(&mut self) -> Result<()> {
        let mut inner = self.inner.lock();
        let finished = std::mem::take(&mut inner.current);
        inner.closed.push(finished);
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
