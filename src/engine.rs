use crate::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// What an import produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub tables: Vec<String>,
    pub total_rows: u64,
}

/// The query engine that turns resolved files into a queryable store.
///
/// The pipeline never interprets the store itself; it only decides where the
/// engine should write it and whether an existing one can be reused.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Import `files` into a new store at `target`, or into an in-memory
    /// store owned by the engine when `target` is `None` (caching disabled).
    ///
    /// Failures should be raised as [`ErrorKind::Engine`](crate::error::ErrorKind::Engine)
    /// carrying the engine's message, so they can be passed to
    /// [`Pipeline::explain`](crate::Pipeline::explain).
    async fn import(&self, files: &[PathBuf], target: Option<&Path>) -> Result<ImportSummary>;
}
