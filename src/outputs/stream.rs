//! Output to an already-open stream

use super::OutputDevice;
use crate::core::{LogLevel, Result};
use std::io::{self, Write};

/// Writes to any `Write` stream: stdout, stderr, a socket, a pipe
///
/// There is no path to reopen, so `reopen` only flushes.
pub struct StreamOutput {
    stream: Box<dyn Write + Send>,
    name: String,
}

impl StreamOutput {
    pub fn new(stream: impl Write + Send + 'static, name: impl Into<String>) -> Self {
        Self {
            stream: Box::new(stream),
            name: name.into(),
        }
    }

    pub fn stdout() -> Self {
        Self::new(io::stdout(), "stdout")
    }

    pub fn stderr() -> Self {
        Self::new(io::stderr(), "stderr")
    }
}

impl OutputDevice for StreamOutput {
    fn write(&mut self, _level: LogLevel, bytes: &[u8]) -> Result<()> {
        self.stream.write_all(bytes)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.stream.flush()?;
        Ok(())
    }

    fn reopen(&mut self) -> Result<()> {
        self.flush()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedVec(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedVec {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_stream_writes_through() {
        let target = SharedVec::default();
        let mut output = StreamOutput::new(target.clone(), "vec");
        output.write(LogLevel::Info, b"hello\n").unwrap();
        output.reopen().unwrap();
        output.write(LogLevel::Info, b"again\n").unwrap();
        output.sync().unwrap();

        assert_eq!(&*target.0.lock().unwrap(), b"hello\nagain\n");
        assert_eq!(output.name(), "vec");
    }

    #[test]
    fn test_standard_stream_names() {
        assert_eq!(StreamOutput::stdout().name(), "stdout");
        assert_eq!(StreamOutput::stderr().name(), "stderr");
    }
}
