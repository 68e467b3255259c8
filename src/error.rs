//! Pipeline Error Types
//!
//! Errors from the component crates are raised as children of one of these
//! kinds, so the full error tree is kept while the top level says which stage
//! failed.

use derive_more::{Display, Error};

/// A pipeline error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Configuration could not be loaded or is invalid.
    #[display("invalid configuration")]
    Config,
    /// A source could not be turned into a readable local file.
    #[display("failed to resolve sources")]
    Resolve,
    /// A message queue source was passed where files are expected.
    #[display("{_0} is a message queue; open it as a queue instead of importing it")]
    QueueSource(#[error(not(source))] String),
    /// A queue reader could not be opened or read.
    #[display("failed to read message queue")]
    Queue,
    /// Fingerprinting or write-back failed.
    #[display("cache operation failed")]
    Cache,
    /// The query engine rejected the import. Holds the engine's own message.
    #[display("query engine error: {_0}")]
    Engine(#[error(not(source))] String),
    /// The caller cancelled the operation.
    #[display("operation cancelled")]
    Cancelled,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    ///
    /// The wrapping kinds defer to the component error they were raised from;
    /// use [`is_retryable`] on a full [`Error`] for that.
    pub fn is_retryable(&self) -> bool {
        false
    }
}

/// Whether any component error in the tree says a retry might succeed.
pub fn is_retryable(err: &Error) -> bool {
    fn visit(frame: &exn::Frame) -> bool {
        let error = frame.error();
        let retryable = if let Some(kind) = error.downcast_ref::<dataql_resolve::error::ErrorKind>() {
            kind.is_retryable()
        } else if let Some(kind) = error.downcast_ref::<dataql_cache::error::ErrorKind>() {
            kind.is_retryable()
        } else if let Some(kind) = error.downcast_ref::<dataql_queue::error::ErrorKind>() {
            kind.is_retryable()
        } else {
            false
        };
        retryable || frame.children().iter().any(visit)
    }
    visit(err.frame())
}
