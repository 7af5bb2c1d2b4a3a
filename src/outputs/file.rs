//! File output

use super::OutputDevice;
use crate::core::{LogLevel, LoggerError, Result};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Appends to a file opened by path
///
/// `reopen` closes the current handle and opens the path again, so an
/// external tool can rename the file and have logging continue in a fresh
/// file of the original name.
pub struct FileOutput {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    name: String,
}

fn open_append(path: &Path) -> Result<BufWriter<File>> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| {
            LoggerError::io_operation(
                "opening log file",
                format!("cannot open '{}'", path.display()),
                e,
            )
        })?;
    Ok(BufWriter::new(file))
}

impl FileOutput {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let writer = open_append(&path)?;
        Ok(Self {
            name: format!("file:{}", path.display()),
            path,
            writer: Some(writer),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn writer(&mut self) -> Result<&mut BufWriter<File>> {
        let path = &self.path;
        self.writer
            .as_mut()
            .ok_or_else(|| LoggerError::file_output(path.display().to_string(), "file is closed"))
    }
}

impl OutputDevice for FileOutput {
    fn write(&mut self, _level: LogLevel, bytes: &[u8]) -> Result<()> {
        self.writer()?.write_all(bytes)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if let Some(ref mut writer) = self.writer {
            writer.flush()?;
        }
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        if let Some(ref mut writer) = self.writer {
            writer.flush()?;
            writer.get_ref().sync_data()?;
        }
        Ok(())
    }

    fn reopen(&mut self) -> Result<()> {
        // keep the current handle if the path cannot be opened
        let fresh = open_append(&self.path)?;
        if let Some(mut old) = self.writer.replace(fresh) {
            old.flush()?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for FileOutput {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}
