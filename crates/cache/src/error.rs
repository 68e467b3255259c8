//! Cache Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.
//!
//! Only a few operations can fail outright: fingerprinting sources that cannot
//! be stat'ed, write-back, and explicit maintenance. Everything that goes wrong
//! while *reading* the cache is a miss, not an error.

use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::path::PathBuf;

/// A cache error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// A source file could not be found while fingerprinting.
    #[display("file not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// A source file or cache file could not be accessed.
    #[display("permission denied: {}", _0.display())]
    PermissionDenied(#[error(not(source))] PathBuf),
    /// Underlying I/O error
    #[display("I/O error: {_0}")]
    Io(IoError),
    /// A cache key supplied by the caller is malformed.
    #[display("invalid cache key: {_0:?}")]
    InvalidKey(#[error(not(source))] String),
    /// Another process held the write lock for too long.
    #[display("timed out after {waited_secs}s waiting for the cache lock on {key}")]
    LockTimeout { key: String, waited_secs: u64 },
    /// The sources changed between lookup and write-back.
    #[display("sources changed while preparing cache entry {_0}")]
    SourcesChanged(#[error(not(source))] String),
    /// The importer finished without producing an artifact.
    #[display("no artifact was written to {}", _0.display())]
    ArtifactMissing(#[error(not(source))] PathBuf),
    /// Serialization/deserialization error.
    #[display("invalid cache data")]
    InvalidData,
    /// The caller cancelled the operation.
    #[display("cache operation cancelled")]
    Cancelled,
}

impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Classify an I/O error against the path it happened on.
    pub(crate) fn from_io(err: IoError, path: impl Into<PathBuf>) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(path.into()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.into()),
            _ => Self::Io(err),
        }
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::LockTimeout { .. } | Self::SourcesChanged(_))
    }
}
