use crate::CacheKey;
use crate::error::{ErrorKind, Result};
use crate::key::SourceStamp;
use exn::ResultExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

/// Bumped whenever the artifact or metadata layout changes. Entries written
/// with any other version are misses.
pub const FORMAT_VERSION: u32 = 1;

/// The `<key>.json` file stored next to every artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMetadata {
    /// Absolute source paths, sorted.
    pub source_files: Vec<PathBuf>,
    /// Modification times (nanoseconds since the epoch), parallel to `source_files`.
    pub mod_times: Vec<i64>,
    #[serde(with = "time::serde::rfc3339")]
    pub cached_at: OffsetDateTime,
    /// Where the artifact was written.
    pub cache_file: PathBuf,
    pub total_rows: u64,
    pub tables: Vec<String>,
    /// The entry's key.
    pub file_hash: CacheKey,
    pub format_version: u32,
}

impl CacheMetadata {
    pub(crate) fn new(
        key: CacheKey,
        stamps: &[SourceStamp],
        cache_file: PathBuf,
        tables: Vec<String>,
        total_rows: u64,
    ) -> Self {
        Self {
            source_files: stamps.iter().map(|s| s.path.clone()).collect(),
            mod_times: stamps.iter().map(|s| s.mtime_nanos).collect(),
            cached_at: OffsetDateTime::now_utc(),
            cache_file,
            total_rows,
            tables,
            file_hash: key,
            format_version: FORMAT_VERSION,
        }
    }

    pub fn read(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| ErrorKind::from_io(e, path))?;
        serde_json::from_slice(&bytes).or_raise(|| ErrorKind::InvalidData)
    }

    pub(crate) fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self).or_raise(|| ErrorKind::InvalidData)
    }

    /// Whether the recorded sources are exactly `current`: same number of
    /// files, and every current path recorded with the same mtime.
    pub(crate) fn matches(&self, current: &[SourceStamp]) -> bool {
        if self.source_files.len() != self.mod_times.len() || self.source_files.len() != current.len() {
            return false;
        }
        let recorded: HashMap<&Path, i64> = self
            .source_files
            .iter()
            .map(PathBuf::as_path)
            .zip(self.mod_times.iter().copied())
            .collect();
        recorded.len() == current.len()
            && current
                .iter()
                .all(|stamp| recorded.get(stamp.path.as_path()) == Some(&stamp.mtime_nanos))
    }
}
