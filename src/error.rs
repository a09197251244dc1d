//! Centralized error types for msg2eml.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the msg2eml library.
///
/// Only failures that stop the conversion of one whole input file live here.
/// Recoverable problems (bad dates, undecodable text, a broken attachment, a
/// malformed archive entry) are reported through
/// [`Diagnostics`](crate::diagnostics::Diagnostics) instead.
#[derive(Error, Debug)]
pub enum ConvertError {
    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The specified input file does not exist.
    #[error("Input file not found: {0}")]
    FileNotFound(PathBuf),

    /// The binary message container could not be read.
    #[error("Unreadable message container '{path}': {reason}")]
    Container { path: PathBuf, reason: String },

    /// The input is neither a `.msg` container nor an `.mbox` archive.
    #[error("Unsupported input type: {0}")]
    UnsupportedInput(PathBuf),

    /// The batch was cancelled before this input was started.
    #[error("Conversion cancelled")]
    Cancelled,

    /// The configuration could not be read or written.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Convenience alias for `Result<T, ConvertError>`.
pub type Result<T> = std::result::Result<T, ConvertError>;

impl ConvertError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Allow `?` on `std::io::Error` when no path context is available
/// (prefer `ConvertError::io`).
impl From<std::io::Error> for ConvertError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::from("<unknown>"),
            source,
        }
    }
}

/// A labeled failure for one input of a batch.
///
/// Reported to the driver in place of an output path; the batch keeps going.
#[derive(Error, Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[error("{}: {message}", path.display())]
pub struct ConversionFailure {
    /// The input that failed.
    pub path: PathBuf,
    /// Human-readable cause.
    pub message: String,
}

impl ConversionFailure {
    pub fn new(path: impl Into<PathBuf>, error: &ConvertError) -> Self {
        Self {
            path: path.into(),
            message: error.to_string(),
        }
    }
}
