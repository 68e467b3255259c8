use crate::CacheKey;
use crate::error::{ErrorKind, Result};
use crate::key::{self, SourceStamp};
use crate::lock::KeyLock;
use crate::metadata::{CacheMetadata, FORMAT_VERSION};
use crate::write::PendingWrite;
use derive_more::Display;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// How long [`CacheManager::begin_write`] waits for a competing writer.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) const ARTIFACT_EXTENSION: &str = "duckdb";
pub(crate) const METADATA_EXTENSION: &str = "json";
pub(crate) const LOCK_EXTENSION: &str = "lock";

/// Owns one cache directory.
///
/// Layout: `<dir>/<key>.duckdb` (artifact), `<dir>/<key>.json` (metadata) and
/// `<dir>/<key>.lock` (write lock). Nothing is created until the first write.
#[derive(Debug, Clone)]
pub struct CacheManager {
    dir: PathBuf,
    enabled: bool,
    lock_timeout: Duration,
}

/// The verdict of a [`CacheManager::lookup`].
#[derive(Debug, Clone)]
pub enum Lookup {
    Hit { key: CacheKey, artifact: PathBuf, metadata: CacheMetadata },
    Miss { key: CacheKey, reason: MissReason },
}

/// Why a lookup missed. None of these are errors.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum MissReason {
    #[display("cache is disabled")]
    Disabled,
    #[display("artifact does not exist")]
    ArtifactMissing,
    #[display("metadata does not exist")]
    MetadataMissing,
    #[display("metadata is unreadable: {_0}")]
    MetadataUnreadable(String),
    #[display("format version {found} does not match {expected}")]
    VersionMismatch { found: u32, expected: u32 },
    #[display("source files or modification times changed")]
    SourcesChanged,
}

impl Lookup {
    pub fn key(&self) -> &CacheKey {
        match self {
            Self::Hit { key, .. } | Self::Miss { key, .. } => key,
        }
    }

    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit { .. })
    }
}

impl CacheManager {
    pub fn new(dir: impl Into<PathBuf>, enabled: bool) -> Self {
        Self { dir: dir.into(), enabled, lock_timeout: DEFAULT_LOCK_TIMEOUT }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn cache_dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn artifact_path(&self, key: &CacheKey) -> PathBuf {
        self.entry_path(key.as_str(), ARTIFACT_EXTENSION)
    }

    pub fn metadata_path(&self, key: &CacheKey) -> PathBuf {
        self.entry_path(key.as_str(), METADATA_EXTENSION)
    }

    pub(crate) fn lock_path(&self, key: &str) -> PathBuf {
        self.entry_path(key, LOCK_EXTENSION)
    }

    pub(crate) fn entry_path(&self, key: &str, extension: &str) -> PathBuf {
        self.dir.join(format!("{key}.{extension}"))
    }

    /// Fingerprint `paths` and check for a usable entry.
    ///
    /// Only fingerprinting can fail (a source that cannot be stat'ed). Every
    /// problem with the cache itself is reported as a [`Lookup::Miss`].
    #[instrument(skip_all, fields(sources = paths.len(), key))]
    pub fn lookup<P: AsRef<Path>>(&self, paths: &[P]) -> Result<Lookup> {
        let stamps = key::stamp(paths)?;
        let key = CacheKey::from_stamps(&stamps);
        tracing::Span::current().record("key", key.as_str());
        let lookup = if self.enabled {
            self.check(key, &stamps)
        } else {
            Lookup::Miss { key, reason: MissReason::Disabled }
        };
        match &lookup {
            Lookup::Hit { artifact, .. } => tracing::debug!(artifact = %artifact.display(), "cache hit"),
            Lookup::Miss { reason, .. } => tracing::debug!(%reason, "cache miss"),
        }
        Ok(lookup)
    }

    /// Whether a valid entry exists for `paths`. Never fails.
    pub fn is_valid<P: AsRef<Path>>(&self, paths: &[P]) -> bool {
        self.lookup(paths).is_ok_and(|lookup| lookup.is_hit())
    }

    pub(crate) fn check(&self, key: CacheKey, stamps: &[SourceStamp]) -> Lookup {
        let artifact = self.artifact_path(&key);
        let metadata_path = self.metadata_path(&key);
        let miss = |reason| Lookup::Miss { key: key.clone(), reason };
        if !artifact.is_file() {
            return miss(MissReason::ArtifactMissing);
        }
        if !metadata_path.is_file() {
            return miss(MissReason::MetadataMissing);
        }
        let metadata = match CacheMetadata::read(&metadata_path) {
            Ok(metadata) => metadata,
            Err(e) => return miss(MissReason::MetadataUnreadable(e.to_string())),
        };
        if metadata.format_version != FORMAT_VERSION {
            return miss(MissReason::VersionMismatch { found: metadata.format_version, expected: FORMAT_VERSION });
        }
        if !metadata.matches(stamps) {
            return miss(MissReason::SourcesChanged);
        }
        Lookup::Hit { key, artifact, metadata }
    }

    /// Take the write lock for `key` and prepare a staging artifact.
    ///
    /// The sources are fingerprinted again under the lock; if they no longer
    /// produce `key` this fails with [`ErrorKind::SourcesChanged`]. Blocks while
    /// another writer holds the lock, up to the configured timeout.
    #[instrument(skip_all, fields(key = %key))]
    pub fn begin_write<P: AsRef<Path>>(
        &self,
        key: &CacheKey,
        paths: &[P],
        cancel: &CancellationToken,
    ) -> Result<PendingWrite> {
        std::fs::create_dir_all(&self.dir).map_err(|e| ErrorKind::from_io(e, &self.dir))?;
        let lock = KeyLock::acquire(&self.lock_path(key.as_str()), key.as_str(), self.lock_timeout, cancel)?;
        let stamps = key::stamp(paths)?;
        if CacheKey::from_stamps(&stamps) != *key {
            exn::bail!(ErrorKind::SourcesChanged(key.to_string()));
        }
        PendingWrite::new(self.clone(), key.clone(), stamps, lock, cancel.clone())
    }
}
