//! Fingerprints of source sets.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use time::OffsetDateTime;

/// Hex characters kept from the BLAKE3 digest.
pub const KEY_LEN: usize = 16;
const MAX_KEY_LEN: usize = 128;
const ENTRY_SEPARATOR: &str = "|";

/// Identifies one cache entry.
///
/// Generated keys are [`KEY_LEN`] lowercase hex characters. Keys parsed from
/// user input only need to be safe to use as a file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

/// An absolute source path and its modification time in nanoseconds since the epoch.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct SourceStamp {
    pub(crate) path: PathBuf,
    pub(crate) mtime_nanos: i64,
}

impl CacheKey {
    /// Fingerprint a set of local files.
    ///
    /// Order and duplicates in `paths` do not matter; any change in membership
    /// or in any file's modification time produces a different key. Fails if a
    /// file cannot be stat'ed.
    pub fn generate<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        Ok(Self::from_stamps(&stamp(paths)?))
    }

    pub(crate) fn from_stamps(stamps: &[SourceStamp]) -> Self {
        let joined = stamps
            .iter()
            .map(|s| format!("{}:{}", s.path.display(), s.mtime_nanos))
            .collect::<Vec<_>>()
            .join(ENTRY_SEPARATOR);
        let digest = blake3::hash(joined.as_bytes());
        Self(digest.to_hex()[..KEY_LEN].to_string())
    }

    /// Validate a key supplied from outside (for example on a command line).
    ///
    /// ```
    /// use dataql_cache::CacheKey;
    ///
    /// assert!(CacheKey::parse("3f9a0c1d2e4b5a69").is_ok());
    /// assert!(CacheKey::parse("../etc/passwd").is_err());
    /// assert!(CacheKey::parse("").is_err());
    /// ```
    pub fn parse(input: &str) -> Result<Self> {
        let valid = !input.is_empty()
            && input.len() <= MAX_KEY_LEN
            && input.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            exn::bail!(ErrorKind::InvalidKey(input.to_string()));
        }
        Ok(Self(input.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.0)
    }
}

impl FromStr for CacheKey {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Absolute path and mtime of every source, sorted by path and deduplicated.
pub(crate) fn stamp<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<SourceStamp>> {
    let mut stamps = paths
        .iter()
        .map(|path| {
            let path = path.as_ref();
            let absolute = std::path::absolute(path).map_err(|e| ErrorKind::from_io(e, path))?;
            let mtime_nanos = mtime_nanos(&absolute)?;
            Ok(SourceStamp { path: absolute, mtime_nanos })
        })
        .collect::<Result<Vec<_>>>()?;
    stamps.sort();
    stamps.dedup();
    Ok(stamps)
}

pub(crate) fn mtime_nanos(path: &Path) -> Result<i64> {
    let modified = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map_err(|e| ErrorKind::from_io(e, path))?;
    let nanos = OffsetDateTime::from(modified).unix_timestamp_nanos();
    i64::try_from(nanos).or_raise(|| ErrorKind::InvalidData)
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::{FileTime, set_file_mtime};
    use rstest::rstest;

    fn fixture(dir: &Path, names: &[&str]) -> Vec<PathBuf> {
        names
            .iter()
            .map(|name| {
                let path = dir.join(name);
                std::fs::write(&path, name.as_bytes()).unwrap();
                set_file_mtime(&path, FileTime::from_unix_time(1_700_000_000, 0)).unwrap();
                path
            })
            .collect()
    }

    #[test]
    fn test_key_shape() {
        let dir = tempfile::tempdir().unwrap();
        let files = fixture(dir.path(), &["a.csv"]);
        let key = CacheKey::generate(&files).unwrap();
        assert_eq!(key.as_str().len(), KEY_LEN);
        assert!(key.as_str().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[rstest]
    #[case(&[0, 1, 2])]
    #[case(&[2, 1, 0])]
    #[case(&[1, 2, 0])]
    #[case(&[0, 2, 1, 0])]
    fn test_order_and_duplicates_do_not_matter(#[case] order: &[usize]) {
        let dir = tempfile::tempdir().unwrap();
        let files = fixture(dir.path(), &["a.csv", "b.json", "c.parquet"]);
        let expected = CacheKey::generate(&files).unwrap();
        let shuffled: Vec<_> = order.iter().map(|&i| files[i].clone()).collect();
        assert_eq!(CacheKey::generate(&shuffled).unwrap(), expected);
    }

    #[test]
    fn test_mtime_change_changes_key() {
        let dir = tempfile::tempdir().unwrap();
        let files = fixture(dir.path(), &["a.csv", "b.csv"]);
        let before = CacheKey::generate(&files).unwrap();
        set_file_mtime(&files[1], FileTime::from_unix_time(1_700_000_000, 1)).unwrap();
        assert_ne!(CacheKey::generate(&files).unwrap(), before);
    }

    #[test]
    fn test_membership_change_changes_key() {
        let dir = tempfile::tempdir().unwrap();
        let files = fixture(dir.path(), &["a.csv", "b.csv"]);
        let both = CacheKey::generate(&files).unwrap();
        let one = CacheKey::generate(&files[..1]).unwrap();
        assert_ne!(both, one);
    }

    #[test]
    fn test_paths_are_normalised() {
        let dir = tempfile::tempdir().unwrap();
        let files = fixture(dir.path(), &["a.csv"]);
        let stamps = stamp(&files).unwrap();
        assert!(stamps[0].path.is_absolute());
        let dotted = dir.path().join(".").join("a.csv");
        assert_eq!(CacheKey::generate(&[dotted]).unwrap(), CacheKey::generate(&files).unwrap());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("gone.csv");
        let err = CacheKey::generate(&[&missing]).unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(p) if *p == missing));
    }

    #[rstest]
    #[case("abc123", true)]
    #[case("with-dash_and_underscore", true)]
    #[case("a/b", false)]
    #[case("a\\b", false)]
    #[case("..", false)]
    #[case("key.json", false)]
    fn test_parse(#[case] input: &str, #[case] valid: bool) {
        assert_eq!(CacheKey::parse(input).is_ok(), valid);
    }
}
