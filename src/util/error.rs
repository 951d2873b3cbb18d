//! Error types for the bakestream library.

use std::path::PathBuf;
use thiserror::Error;

use crate::container::Version;

/// Main error type for container parsing and frame streaming.
#[derive(Error, Debug)]
pub enum Error {
    /// File major.minor doesn't match the engine's
    #[error("Incompatible version: file is {file}, engine is {engine}")]
    IncompatibleVersion { file: Version, engine: Version },

    /// File does not exist or cannot be accessed
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// File is truncated or a read came back short
    #[error("Unexpected end of file at position {0}")]
    UnexpectedEof(u64),

    /// Invalid data structure in file
    #[error("Invalid file structure: {0}")]
    InvalidStructure(String),

    /// Memory mapping failed
    #[error("Memory mapping failed: {0}")]
    MmapFailed(String),

    /// The background worker is no longer running
    #[error("Player has shut down")]
    ShutDown,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed player options
    #[error("Invalid options: {0}")]
    Options(#[from] serde_json::Error),

    /// UTF-8 conversion error
    #[error("Invalid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an "other" error from a string.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Create an invalid structure error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidStructure(msg.into())
    }

    /// Whether retrying the same read could plausibly succeed.
    ///
    /// Structural problems and version mismatches are deterministic; only
    /// raw I/O failures are worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Io(_) | Self::UnexpectedEof(_))
    }
}

/// Result type alias for bakestream operations.
pub type Result<T> = std::result::Result<T, Error>;
