//! Error types for tmstore

use std::fmt;
use std::io;

/// Result type alias for translation memory operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for translation memory operations
#[derive(Debug)]
pub enum Error {
    /// Rejected input (blank source text, translation or language)
    Validation(String),

    /// Snapshot file is unparseable, has the wrong schema, or breaks a store invariant
    CorruptSnapshot(String),

    /// I/O error
    Io(io::Error),

    /// Snapshot could not be serialized
    Serialize(String),

    /// Invalid configuration value
    Config(String),
}

impl Error {
    /// True if this error should make the caller start with an empty cache
    /// instead of surfacing the failure.
    pub fn is_recoverable_by_reset(&self) -> bool {
        matches!(self, Error::CorruptSnapshot(_) | Error::Io(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Validation(msg) => write!(f, "Validation error: {}", msg),
            Error::CorruptSnapshot(msg) => write!(f, "Corrupt snapshot: {}", msg),
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Serialize(msg) => write!(f, "Serialization error: {}", msg),
            Error::Config(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialize(err.to_string())
    }
}
