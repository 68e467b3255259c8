//! Lazily created, per-resolver temporary directories.

use crate::error::{ErrorKind, Result};
use crate::file::CleanupWarning;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tempfile::TempDir;

/// A temporary directory that is only created when first needed.
///
/// Every resolver owns its own area so that concurrent invocations never share
/// (or clean up) each other's files. The directory is removed on
/// [`cleanup`](Self::cleanup) or when the area is dropped.
#[derive(Debug)]
pub(crate) struct TempArea {
    prefix: &'static str,
    root: Option<PathBuf>,
    dir: Mutex<Option<TempDir>>,
}

impl TempArea {
    pub(crate) fn new(prefix: &'static str) -> Self {
        Self { prefix, root: None, dir: Mutex::new(None) }
    }

    /// Place the area under `root` instead of the system temp directory.
    pub(crate) fn in_dir(prefix: &'static str, root: impl Into<PathBuf>) -> Self {
        Self { prefix, root: Some(root.into()), dir: Mutex::new(None) }
    }

    fn lock(&self) -> MutexGuard<'_, Option<TempDir>> {
        // A panic while holding the lock cannot leave the Option half-written.
        self.dir.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Path of the directory, creating it on first use.
    pub(crate) fn dir(&self) -> Result<PathBuf> {
        let mut guard = self.lock();
        if let Some(dir) = guard.as_ref() {
            return Ok(dir.path().to_path_buf());
        }
        let mut builder = tempfile::Builder::new();
        builder.prefix(self.prefix);
        let created = match &self.root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(ErrorKind::Io)?;
        let path = created.path().to_path_buf();
        tracing::debug!(path = %path.display(), "created temporary directory");
        *guard = Some(created);
        Ok(path)
    }

    /// Whether the directory has been created (and not yet cleaned up).
    #[cfg(test)]
    pub(crate) fn is_created(&self) -> bool {
        self.lock().is_some()
    }

    /// Remove the directory and everything in it. Safe to call repeatedly.
    pub(crate) fn cleanup(&self) -> Vec<CleanupWarning> {
        let Some(dir) = self.lock().take() else {
            return Vec::new();
        };
        let path = dir.path().to_path_buf();
        match dir.close() {
            Ok(()) => Vec::new(),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(error) => vec![CleanupWarning { path, error }],
        }
    }
}
