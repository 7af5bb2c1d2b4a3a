//! Output devices written by the consumer thread

pub mod callback;
pub mod file;
pub mod memory;
pub mod stream;

pub use callback::CallbackOutput;
pub use file::FileOutput;
pub use memory::MemoryOutput;
pub use stream::StreamOutput;

use crate::core::{LogLevel, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Destination for rendered log lines
///
/// Devices are owned and driven by the consumer thread only, so
/// implementations need `Send` but not `Sync`.
pub trait OutputDevice: Send {
    /// Write one rendered record
    fn write(&mut self, level: LogLevel, bytes: &[u8]) -> Result<()>;

    /// Push buffered bytes to the underlying target
    fn flush(&mut self) -> Result<()>;

    /// Flush and ask the target to persist what it received
    fn sync(&mut self) -> Result<()> {
        self.flush()
    }

    /// Release the current target and open it again, e.g. after rotation
    fn reopen(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called once when no sink writes to this device any more
    fn close(&mut self) -> Result<()> {
        self.flush()
    }

    fn name(&self) -> &str;
}

impl<T: OutputDevice + ?Sized> OutputDevice for Box<T> {
    fn write(&mut self, level: LogLevel, bytes: &[u8]) -> Result<()> {
        (**self).write(level, bytes)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }

    fn sync(&mut self) -> Result<()> {
        (**self).sync()
    }

    fn reopen(&mut self) -> Result<()> {
        (**self).reopen()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Handle to a device registered with a logger
///
/// The logger's default device is [`OutputId::DEFAULT`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutputId(pub(crate) usize);

impl OutputId {
    pub const DEFAULT: OutputId = OutputId(0);

    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for OutputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
