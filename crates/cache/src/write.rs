use crate::CacheKey;
use crate::error::{ErrorKind, Result};
use crate::key::SourceStamp;
use crate::lock::KeyLock;
use crate::manager::{ARTIFACT_EXTENSION, CacheManager, Lookup, METADATA_EXTENSION};
use crate::metadata::CacheMetadata;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

/// A write-back in progress, holding the key's lock.
///
/// The importer writes the artifact to [`staging_path`](Self::staging_path),
/// then [`commit`](Self::commit) moves it and its metadata into place. Dropping
/// without committing removes the staging files and releases the lock, so
/// readers only ever see complete entries.
#[derive(Debug)]
pub struct PendingWrite {
    manager: CacheManager,
    key: CacheKey,
    stamps: Vec<SourceStamp>,
    staging: PathBuf,
    metadata_staging: PathBuf,
    cancel: CancellationToken,
    _lock: KeyLock,
}

impl PendingWrite {
    pub(crate) fn new(
        manager: CacheManager,
        key: CacheKey,
        stamps: Vec<SourceStamp>,
        lock: KeyLock,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let staging = manager.entry_path(&format!(".{key}"), &format!("{ARTIFACT_EXTENSION}.tmp"));
        let metadata_staging = manager.entry_path(&format!(".{key}"), &format!("{METADATA_EXTENSION}.tmp"));
        // Left behind by a writer that crashed while holding the lock.
        for stale in [&staging, &metadata_staging] {
            remove_if_exists(stale)?;
        }
        Ok(Self { manager, key, stamps, staging, metadata_staging, cancel, _lock: lock })
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Where the importer must write the artifact.
    pub fn staging_path(&self) -> &Path {
        &self.staging
    }

    /// A valid entry committed by another writer while this one waited for the lock.
    pub fn existing_entry(&self) -> Option<CacheMetadata> {
        match self.manager.check(self.key.clone(), &self.stamps) {
            Lookup::Hit { metadata, .. } => Some(metadata),
            Lookup::Miss { .. } => None,
        }
    }

    /// Publish the staged artifact together with its metadata.
    ///
    /// The previous metadata is removed first and the new metadata is renamed
    /// into place last, so a concurrent lookup sees either no entry or a
    /// complete one.
    pub fn commit(self, tables: Vec<String>, total_rows: u64) -> Result<CacheMetadata> {
        if self.cancel.is_cancelled() {
            exn::bail!(ErrorKind::Cancelled);
        }
        if !self.staging.is_file() {
            exn::bail!(ErrorKind::ArtifactMissing(self.staging.clone()));
        }
        let artifact = self.manager.artifact_path(&self.key);
        let metadata_path = self.manager.metadata_path(&self.key);
        let metadata = CacheMetadata::new(self.key.clone(), &self.stamps, artifact.clone(), tables, total_rows);

        let mut file = File::create(&self.metadata_staging).map_err(|e| ErrorKind::from_io(e, &self.metadata_staging))?;
        file.write_all(&metadata.to_json()?)
            .and_then(|()| file.sync_all())
            .map_err(|e| ErrorKind::from_io(e, &self.metadata_staging))?;
        drop(file);

        remove_if_exists(&metadata_path)?;
        fs::rename(&self.staging, &artifact).map_err(|e| ErrorKind::from_io(e, &self.staging))?;
        fs::rename(&self.metadata_staging, &metadata_path).map_err(|e| ErrorKind::from_io(e, &self.metadata_staging))?;
        tracing::info!(key = %self.key, artifact = %artifact.display(), total_rows, "cached import");
        Ok(metadata)
    }
}

impl Drop for PendingWrite {
    fn drop(&mut self) {
        for path in [&self.staging, &self.metadata_staging] {
            if let Err(e) = remove_if_exists(path) {
                tracing::warn!(path = %path.display(), error = %e, "failed to remove staged cache file");
            }
        }
    }
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ErrorKind::from_io(e, path).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn setup() -> (tempfile::TempDir, CacheManager, Vec<PathBuf>, CacheKey) {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("a.csv");
        fs::write(&source, "id\n1\n").unwrap();
        let cache = CacheManager::new(dir.path().join("cache"), true).with_lock_timeout(Duration::from_millis(50));
        let sources = vec![source];
        let key = CacheKey::generate(&sources).unwrap();
        (dir, cache, sources, key)
    }

    fn cache_files(cache: &CacheManager) -> Vec<String> {
        let mut names: Vec<_> = fs::read_dir(cache.cache_dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_commit_publishes_artifact_and_metadata() {
        let (_dir, cache, sources, key) = setup();
        let pending = cache.begin_write(&key, &sources, &CancellationToken::new()).unwrap();
        assert!(pending.existing_entry().is_none());
        fs::write(pending.staging_path(), b"db").unwrap();
        let metadata = pending.commit(vec!["a".into()], 1).unwrap();

        assert_eq!(metadata.file_hash, key);
        assert_eq!(metadata.cache_file, cache.artifact_path(&key));
        assert_eq!(fs::read(cache.artifact_path(&key)).unwrap(), b"db");
        assert_eq!(CacheMetadata::read(&cache.metadata_path(&key)).unwrap(), metadata);
        assert_eq!(cache_files(&cache), [format!("{key}.duckdb"), format!("{key}.json"), format!("{key}.lock")]);
    }

    #[test]
    fn test_lock_released_after_commit() {
        let (_dir, cache, sources, key) = setup();
        let pending = cache.begin_write(&key, &sources, &CancellationToken::new()).unwrap();
        fs::write(pending.staging_path(), b"db").unwrap();
        pending.commit(vec![], 0).unwrap();
        let again = cache.begin_write(&key, &sources, &CancellationToken::new()).unwrap();
        assert!(again.existing_entry().is_some());
    }

    #[test]
    fn test_commit_without_artifact() {
        let (_dir, cache, sources, key) = setup();
        let pending = cache.begin_write(&key, &sources, &CancellationToken::new()).unwrap();
        let staging = pending.staging_path().to_path_buf();
        let err = pending.commit(vec![], 0).unwrap_err();
        assert!(matches!(&*err, ErrorKind::ArtifactMissing(p) if *p == staging));
        assert!(!cache.metadata_path(&key).exists());
    }

    #[test]
    fn test_cancelled_commit_leaves_nothing() {
        let (_dir, cache, sources, key) = setup();
        let cancel = CancellationToken::new();
        let pending = cache.begin_write(&key, &sources, &cancel).unwrap();
        fs::write(pending.staging_path(), b"db").unwrap();
        cancel.cancel();
        let err = pending.commit(vec![], 0).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Cancelled));
        assert_eq!(cache_files(&cache), [format!("{key}.lock")]);
    }

    #[test]
    fn test_abandoned_write_is_cleaned_up() {
        let (_dir, cache, sources, key) = setup();
        let pending = cache.begin_write(&key, &sources, &CancellationToken::new()).unwrap();
        fs::write(pending.staging_path(), b"partial").unwrap();
        drop(pending);
        assert_eq!(cache_files(&cache), [format!("{key}.lock")]);
        assert!(!cache.is_valid(&sources));
    }

    #[test]
    fn test_rewrite_replaces_metadata() {
        let (_dir, cache, sources, key) = setup();
        for rows in [1, 2] {
            let pending = cache.begin_write(&key, &sources, &CancellationToken::new()).unwrap();
            fs::write(pending.staging_path(), b"db").unwrap();
            pending.commit(vec!["t".into()], rows).unwrap();
        }
        let metadata = CacheMetadata::read(&cache.metadata_path(&key)).unwrap();
        assert_eq!(metadata.total_rows, 2);
    }
}
