//! Queue Error Types
//!
//! Registry errors are deliberately fine-grained: a caller must be able to
//! tell "this build cannot read SQS" apart from "this queue URL is wrong".

use crate::QueueKind;
use derive_more::{Display, Error};

/// A queue error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for queue operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The connection string is not a URL at all.
    #[display("invalid queue URL: {_0}")]
    InvalidUrl(#[error(not(source))] String),
    /// A query parameter has an unusable value.
    #[display("invalid value for queue option {name}: {value:?}")]
    InvalidOption { name: String, value: String },
    /// The backend exists, but no reader for it was registered in this build.
    #[display("no {kind} reader is registered (requires {package})")]
    NotRegistered { kind: QueueKind, package: &'static str },
    /// The queue type is recognised but has no reader implementation yet.
    #[display("{_0} queues are not yet supported")]
    NotYetAvailable(#[error(not(source))] QueueKind),
    /// The URL scheme is not a queue type at all.
    #[display("unsupported queue type: {_0}")]
    Unsupported(#[error(not(source))] String),
    /// Client could not be configured (credentials, region, endpoint).
    #[display("queue client configuration error: {_0}")]
    Configuration(#[error(not(source))] String),
    /// The broker rejected or failed a request.
    #[display("queue backend error: {_0}")]
    Backend(#[error(not(source))] String),
    /// The reader has been closed.
    #[display("reader is closed")]
    Closed,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Backend(_))
    }

    /// Whether the failure is a missing or unimplemented backend, as opposed to
    /// a misconfigured queue.
    pub fn is_unavailable_backend(&self) -> bool {
        matches!(self, Self::NotRegistered { .. } | Self::NotYetAvailable(_) | Self::Unsupported(_))
    }
}
