//! Error types for the capture pipeline.

use std::path::PathBuf;

/// Errors raised by the capture pipeline and the log reader.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// Recording destination could not be created or written
    #[error("Recording destination unavailable '{}': {source}", path.display())]
    IoUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Operation attempted on a sink that was already closed
    #[error("Session closed")]
    SessionClosed,

    /// Send or receive on the streaming sink failed; the sink stays active
    #[error("Network error: {0}")]
    NetworkTransient(#[source] std::io::Error),

    /// Plane or point rejected from the current tick's output
    #[error("Malformed trackable: {0}")]
    MalformedTrackable(String),

    /// A log line could not be parsed
    #[error("Protocol error at line {line}: {message}")]
    Protocol { line: usize, message: String },

    /// Generic I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CaptureError {
    pub(crate) fn unavailable(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CaptureError::IoUnavailable {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn protocol(line: usize, message: impl Into<String>) -> Self {
        CaptureError::Protocol {
            line,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CaptureError>;
