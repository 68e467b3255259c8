//! Resolution Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.
//!
//! Every variant here is fatal for the current invocation: a source the user
//! named could not be turned into a local file.

use dataql_compress::error::{Error as CompressionError, ErrorKind as CompressionErrorKind};
use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::path::PathBuf;

/// A resolution error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for resolution operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// File does not exist
    #[display("file not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// Access denied (filesystem permissions)
    #[display("permission denied: {}", _0.display())]
    PermissionDenied(#[error(not(source))] PathBuf),
    /// Underlying I/O error
    #[display("I/O error: {_0}")]
    Io(IoError),
    /// Transport failure talking to a remote endpoint (connect, timeout, reset).
    #[display("network error: {_0}")]
    Network(#[error(not(source))] String),
    /// The remote endpoint answered, but not with a 2xx status.
    #[display("unexpected HTTP status {status} from {url}")]
    HttpStatus {
        url: String,
        status: u16,
    },
    /// Object storage client could not be configured (credentials, region).
    #[display("object storage configuration error: {_0}")]
    Credentials(#[error(not(source))] String),
    /// The source reference itself is malformed.
    #[display("invalid source: {_0}")]
    InvalidSource(#[error(not(source))] String),
    /// The source needs a backend that was not compiled in.
    #[display("{_0} support is not enabled in this build")]
    BackendDisabled(#[error(not(source))] &'static str),
    /// Compression/decompression error
    #[display("compression error: {_0}")]
    Compression(CompressionErrorKind),
    /// The caller cancelled resolution.
    #[display("resolution cancelled")]
    Cancelled,
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}
impl ErrorKind {
    /// Convert a compression error into a resolution error, preserving the
    /// compress crate's `Exn` frame (error tree) as a child in its own
    /// error tree.
    #[track_caller]
    pub fn compression(err: CompressionError) -> Error {
        let inner = (*err).clone();
        err.raise(ErrorKind::Compression(inner))
    }

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
        match self {
            Self::Io(_) | Self::Network(_) => true,
            Self::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
