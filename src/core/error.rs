//! Error types for the logger system

pub type Result<T> = std::result::Result<T, LoggerError>;

#[derive(Debug, thiserror::Error)]
pub enum LoggerError {
    /// IO error with context
    #[error("IO error while {operation}: {message}")]
    IoOperation {
        operation: String,
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// Generic IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Output device accepted fewer bytes than it was given
    #[error("Short write on '{device}': {written}/{expected} bytes")]
    ShortWrite {
        device: String,
        written: usize,
        expected: usize,
    },

    /// Record can never fit into the sink's ring buffer
    #[error("Record of {size} bytes exceeds ring buffer capacity of {capacity} bytes")]
    RecordTooLarge { size: usize, capacity: usize },

    /// Argument list does not match the format description
    #[error("Format '{format}' expects {expected} arguments, got {actual}")]
    ArgumentMismatch {
        format: &'static str,
        expected: usize,
        actual: usize,
    },

    /// An argument failed to serialize into the record
    #[error("Failed to encode argument for '{format}'")]
    EncodeError { format: &'static str },

    /// Another open sink already uses the requested name
    #[error("Sink name '{name}' is already in use")]
    SinkNameInUse { name: String },

    /// Output device does not support the operation
    #[error("Output '{device}' does not support {operation}")]
    Unsupported {
        device: String,
        operation: &'static str,
    },

    /// Consumer thread is no longer running
    #[error("Logger already stopped")]
    LoggerStopped,

    /// Invalid configuration with details
    #[error("Invalid configuration for {component}: {message}")]
    InvalidConfiguration { component: String, message: String },

    /// File output error with path
    #[error("File output error for '{path}': {message}")]
    FileOutputError { path: String, message: String },

    /// Invalid sink name pattern in a control request
    #[error("Invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl LoggerError {
    /// Create an IO operation error with context
    pub fn io_operation(
        operation: impl Into<String>,
        message: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        LoggerError::IoOperation {
            operation: operation.into(),
            message: message.into(),
            source,
        }
    }

    /// Create a short write error
    pub fn short_write(device: impl Into<String>, written: usize, expected: usize) -> Self {
        LoggerError::ShortWrite {
            device: device.into(),
            written,
            expected,
        }
    }

    /// Create a record too large error
    pub fn record_too_large(size: usize, capacity: usize) -> Self {
        LoggerError::RecordTooLarge { size, capacity }
    }

    /// Create an argument mismatch error
    pub fn argument_mismatch(format: &'static str, expected: usize, actual: usize) -> Self {
        LoggerError::ArgumentMismatch {
            format,
            expected,
            actual,
        }
    }

    /// Create an unsupported operation error
    pub fn unsupported(device: impl Into<String>, operation: &'static str) -> Self {
        LoggerError::Unsupported {
            device: device.into(),
            operation,
        }
    }

    /// Create an invalid configuration error
    pub fn config(component: impl Into<String>, message: impl Into<String>) -> Self {
        LoggerError::InvalidConfiguration {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Create a file output error
    pub fn file_output(path: impl Into<String>, message: impl Into<String>) -> Self {
        LoggerError::FileOutputError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an invalid pattern error
    pub fn pattern(pattern: impl Into<String>, message: impl Into<String>) -> Self {
        LoggerError::InvalidPattern {
            pattern: pattern.into(),
            message: message.into(),
        }
    }

    /// Create a generic error
    pub fn other<S: Into<String>>(msg: S) -> Self {
        LoggerError::Other(msg.into())
    }
}
