//! Listing and eviction.
//!
//! These operations walk the whole cache directory. A single unreadable or
//! undeletable file never fails the operation; it is collected as a
//! [`Warning`] next to the result instead.

use crate::CacheKey;
use crate::error::{ErrorKind, Result};
use crate::lock::KeyLock;
use crate::manager::{ARTIFACT_EXTENSION, CacheManager, LOCK_EXTENSION, METADATA_EXTENSION};
use crate::metadata::CacheMetadata;
use derive_more::Display;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tracing::instrument;

/// A file that was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
#[display("{}: {reason}", path.display())]
pub struct Warning {
    pub path: PathBuf,
    pub reason: String,
}

/// The result of a best-effort operation plus everything it had to skip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report<T> {
    pub value: T,
    pub warnings: Vec<Warning>,
}

/// One cached import, as shown by [`CacheManager::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub source_files: Vec<PathBuf>,
    pub cached_at: OffsetDateTime,
    pub total_rows: u64,
    pub tables: Vec<String>,
    pub artifact: PathBuf,
    /// `None` when the artifact is gone but its metadata remains.
    pub artifact_size: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display)]
#[display("{entries} cached entries, {}", format_size(*total_bytes))]
pub struct CacheStats {
    pub entries: usize,
    pub total_bytes: u64,
}

impl<T> Report<T> {
    fn new(value: T) -> Self {
        Self { value, warnings: Vec::new() }
    }

    fn warn(&mut self, path: impl Into<PathBuf>, reason: impl ToString) {
        let warning = Warning { path: path.into(), reason: reason.to_string() };
        tracing::warn!(%warning, "skipped cache file");
        self.warnings.push(warning);
    }
}

impl CacheManager {
    /// Every entry with readable metadata, newest first.
    #[instrument(skip(self), fields(dir = %self.cache_dir().display()))]
    pub fn list(&self) -> Result<Report<Vec<CacheEntry>>> {
        let mut report = Report::new(Vec::new());
        for path in self.files(&mut report)? {
            if !has_extension(&path, METADATA_EXTENSION) {
                continue;
            }
            let Some(key) = key_of(&path).and_then(|key| CacheKey::parse(key).ok()) else {
                continue;
            };
            let metadata = match CacheMetadata::read(&path) {
                Ok(metadata) => metadata,
                Err(e) => {
                    report.warn(path, &*e);
                    continue;
                },
            };
            if metadata.file_hash != key {
                report.warn(path, format_args!("records key {} but is named for {key}", metadata.file_hash));
                continue;
            }
            let artifact = self.artifact_path(&key);
            let artifact_size = fs::metadata(&artifact).ok().map(|m| m.len());
            report.value.push(CacheEntry {
                key,
                source_files: metadata.source_files,
                cached_at: metadata.cached_at,
                total_rows: metadata.total_rows,
                tables: metadata.tables,
                artifact,
                artifact_size,
            });
        }
        report.value.sort_by(|a, b| b.cached_at.cmp(&a.cached_at).then_with(|| a.key.cmp(&b.key)));
        Ok(report)
    }

    /// Remove every file in the cache directory except the lock files, and
    /// return how many were removed.
    ///
    /// Each entry is removed while holding its write lock. Entries whose lock
    /// is held by a writer are left alone. Lock files are never removed: a
    /// writer that already opened one would otherwise lock a file nobody else
    /// can see.
    #[instrument(skip(self), fields(dir = %self.cache_dir().display()))]
    pub fn clear_all(&self) -> Result<Report<usize>> {
        let mut report = Report::new(0);
        let mut entries: BTreeMap<CacheKey, Vec<PathBuf>> = BTreeMap::new();
        for path in self.files(&mut report)? {
            if path.extension().is_some_and(|ext| ext == LOCK_EXTENSION) {
                continue;
            }
            match key_of(&path).and_then(|key| CacheKey::parse(key).ok()) {
                Some(key) => entries.entry(key).or_default().push(path),
                None => remove(&mut report, path),
            }
        }
        for (key, paths) in entries {
            let lock_path = self.lock_path(key.as_str());
            match KeyLock::try_acquire(&lock_path) {
                Ok(Some(_lock)) => paths.into_iter().for_each(|path| remove(&mut report, path)),
                Ok(None) => tracing::debug!(%key, "skipping entry being written"),
                Err(e) => report.warn(lock_path, &*e),
            }
        }
        tracing::info!(removed = report.value, "cleared cache");
        Ok(report)
    }

    /// Remove one entry's artifact and metadata. An entry that does not exist
    /// is not an error.
    pub fn clear_entry(&self, key: &str) -> Result<()> {
        let key = CacheKey::parse(key)?;
        for path in [self.artifact_path(&key), self.metadata_path(&key)] {
            match fs::remove_file(&path) {
                Ok(()) => tracing::debug!(path = %path.display(), "removed cache file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
                Err(e) => exn::bail!(ErrorKind::from_io(e, path)),
            }
        }
        Ok(())
    }

    /// Number of artifacts and their combined size.
    pub fn stats(&self) -> Result<CacheStats> {
        let mut ignored = Report::new(());
        let mut stats = CacheStats::default();
        for path in self.files(&mut ignored)? {
            if !has_extension(&path, ARTIFACT_EXTENSION) {
                continue;
            }
            if let Ok(metadata) = fs::metadata(&path) {
                stats.entries += 1;
                stats.total_bytes += metadata.len();
            }
        }
        Ok(stats)
    }

    /// Regular files directly inside the cache directory. A directory that
    /// does not exist yet is empty.
    fn files<T>(&self, report: &mut Report<T>) -> Result<Vec<PathBuf>> {
        let dir = self.cache_dir();
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => exn::bail!(ErrorKind::from_io(e, dir)),
        };
        let mut files = Vec::new();
        for entry in entries {
            match entry.and_then(|entry| entry.file_type().map(|kind| (entry.path(), kind))) {
                Ok((path, kind)) if kind.is_file() => files.push(path),
                Ok(_) => {},
                Err(e) => report.warn(dir, e),
            }
        }
        files.sort();
        Ok(files)
    }
}

fn remove(report: &mut Report<usize>, path: PathBuf) {
    match fs::remove_file(&path) {
        Ok(()) => report.value += 1,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
        Err(e) => report.warn(path, e),
    }
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension().is_some_and(|ext| ext == extension) && key_of(path).is_some()
}

/// The key a cache file belongs to: `<key>.<ext>` or a staged `.<key>.<ext>.tmp`.
fn key_of(path: &Path) -> Option<&str> {
    let name = path.file_name()?.to_str()?;
    let name = name.strip_prefix('.').unwrap_or(name);
    let (key, _) = name.split_once('.')?;
    (!key.is_empty()).then_some(key)
}

/// Render a byte count with binary (1024-based) units.
///
/// ```
/// use dataql_cache::format_size;
///
/// assert_eq!(format_size(512), "512 B");
/// assert_eq!(format_size(1536), "1.5 KB");
/// assert_eq!(format_size(2 * 1024 * 1024), "2.0 MB");
/// ```
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}
