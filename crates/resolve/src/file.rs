//! Resolved files and cleanup reporting.

use crate::Source;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::io::Error as IoError;
use std::path::{Path, PathBuf};

/// A local file ready for import.
///
/// Files produced by decompression or download live in a resolver's
/// temporary area and are removed when that resolver is cleaned up (or
/// dropped); keep the resolver alive for as long as the file is needed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFile {
    /// Local path to read.
    pub path: PathBuf,
    /// The source this file was derived from, if it was not used as-is.
    pub origin: Option<Source>,
    /// The compressed file this one was decompressed from.
    pub compressed_from: Option<PathBuf>,
}

impl ResolvedFile {
    /// A local file used as-is.
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), origin: None, compressed_from: None }
    }

    pub fn with_origin(mut self, origin: Source) -> Self {
        self.origin = Some(origin);
        self
    }

    /// The path whose identity (path + mtime) fingerprints this file.
    ///
    /// A decompressed temp file is recreated with a fresh mtime on every run,
    /// so the compressed original stands in for it.
    pub fn cache_identity(&self) -> &Path {
        self.compressed_from.as_deref().unwrap_or(&self.path)
    }

    /// Whether the file was downloaded. Downloads land at a fresh temporary
    /// path on every run, so they have no stable cache identity.
    pub fn is_remote(&self) -> bool {
        self.origin.as_ref().is_some_and(Source::is_remote)
    }

    /// Whether the file lives in a temporary area.
    pub fn is_temporary(&self) -> bool {
        self.origin.is_some() || self.compressed_from.is_some()
    }
}

/// A temporary file or directory that could not be removed.
///
/// Cleanup never fails the overall operation; these are reported so that
/// callers (and tests) can see partial failures.
#[derive(Debug)]
pub struct CleanupWarning {
    pub path: PathBuf,
    pub error: IoError,
}

impl Display for CleanupWarning {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "failed to remove {}: {}", self.path.display(), self.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_identity_prefers_compressed_original() {
        let mut file = ResolvedFile::local("/tmp/dataql-x/data.csv");
        assert_eq!(file.cache_identity(), Path::new("/tmp/dataql-x/data.csv"));
        assert!(!file.is_temporary());
        file.compressed_from = Some(PathBuf::from("/data/data.csv.gz"));
        assert_eq!(file.cache_identity(), Path::new("/data/data.csv.gz"));
        assert!(file.is_temporary());
        assert!(!file.is_remote());
    }

    #[test]
    fn test_downloaded_file_is_remote_even_after_decompression() {
        let mut file = ResolvedFile::local("/tmp/dataql-x/data.csv.gz")
            .with_origin(Source::new("https://example.com/data.csv.gz"));
        assert!(file.is_remote());
        file.compressed_from = Some(std::mem::replace(&mut file.path, PathBuf::from("/tmp/dataql-y/data.csv")));
        assert!(file.is_remote());
    }
}
