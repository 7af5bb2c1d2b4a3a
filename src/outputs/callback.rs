//! Output through user-supplied closures

use super::OutputDevice;
use crate::core::{LogLevel, LoggerError, Result};

type WriteFn = Box<dyn FnMut(LogLevel, &[u8]) -> std::io::Result<usize> + Send>;
type ActionFn = Box<dyn FnMut() -> std::io::Result<()> + Send>;

/// A device made of closures
///
/// The write closure returns how many bytes it accepted; accepting fewer
/// than it was given is reported as a short write. Flush, sync and reopen
/// closures are optional.
///
/// # Example
///
/// ```
/// use ringlog::outputs::CallbackOutput;
///
/// let output = CallbackOutput::new("syslog", |_level, bytes| {
///     // forward to another system
///     Ok(bytes.len())
/// })
/// .on_flush(|| Ok(()));
/// ```
pub struct CallbackOutput {
    name: String,
    write: WriteFn,
    flush: Option<ActionFn>,
    sync: Option<ActionFn>,
    reopen: Option<ActionFn>,
}

impl CallbackOutput {
    pub fn new<F>(name: impl Into<String>, write: F) -> Self
    where
        F: FnMut(LogLevel, &[u8]) -> std::io::Result<usize> + Send + 'static,
    {
        Self {
            name: name.into(),
            write: Box::new(write),
            flush: None,
            sync: None,
            reopen: None,
        }
    }

    #[must_use = "builder methods return a new value"]
    pub fn on_flush<F>(mut self, f: F) -> Self
    where
        F: FnMut() -> std::io::Result<()> + Send + 'static,
    {
        self.flush = Some(Box::new(f));
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn on_sync<F>(mut self, f: F) -> Self
    where
        F: FnMut() -> std::io::Result<()> + Send + 'static,
    {
        self.sync = Some(Box::new(f));
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn on_reopen<F>(mut self, f: F) -> Self
    where
        F: FnMut() -> std::io::Result<()> + Send + 'static,
    {
        self.reopen = Some(Box::new(f));
        self
    }
}

impl OutputDevice for CallbackOutput {
    fn write(&mut self, level: LogLevel, bytes: &[u8]) -> Result<()> {
        let written = (self.write)(level, bytes)?;
        if written < bytes.len() {
            return Err(LoggerError::short_write(&self.name, written, bytes.len()));
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if let Some(ref mut flush) = self.flush {
            flush()?;
        }
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        self.flush()?;
        if let Some(ref mut sync) = self.sync {
            sync()?;
        }
        Ok(())
    }

    fn reopen(&mut self) -> Result<()> {
        match self.reopen {
            Some(ref mut reopen) => Ok(reopen()?),
            None => Err(LoggerError::unsupported(&self.name, "reopen")),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
