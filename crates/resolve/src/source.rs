//! Source references and their classification.

use crate::error::{ErrorKind, Result};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::PathBuf;
use url::Url;

const S3_SCHEME: &str = "s3://";

/// An unresolved reference to input data, exactly as the user wrote it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Source(String);

/// What a [`Source`] points at, decided purely from its text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    /// A filesystem path (relative paths are relative to the working directory).
    Local(PathBuf),
    /// An `http://` or `https://` URL.
    Http(Url),
    /// An object in an S3 bucket (`s3://bucket/key`).
    S3 { bucket: String, key: String },
}

impl Source {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the source is fetched over the network (HTTP or S3).
    pub fn is_remote(&self) -> bool {
        is_http(&self.0) || self.0.starts_with(S3_SCHEME)
    }

    /// Classify the source.
    ///
    /// `file://` URLs are treated as local paths.
    pub fn kind(&self) -> Result<SourceKind> {
        let reference = self.0.as_str();
        if is_http(reference) {
            let url = Url::parse(reference).map_err(|e| ErrorKind::InvalidSource(format!("{reference}: {e}")))?;
            return Ok(SourceKind::Http(url));
        }
        if reference.starts_with(S3_SCHEME) {
            let (bucket, key) =
                parse_s3(reference).ok_or_else(|| ErrorKind::InvalidSource(format!("{reference}: expected s3://bucket/key")))?;
            return Ok(SourceKind::S3 { bucket, key });
        }
        if reference.starts_with("file://") {
            let path = Url::parse(reference)
                .ok()
                .and_then(|url| url.to_file_path().ok())
                .ok_or_else(|| ErrorKind::InvalidSource(reference.to_string()))?;
            return Ok(SourceKind::Local(path));
        }
        if reference.is_empty() {
            exn::bail!(ErrorKind::InvalidSource("empty source".to_string()));
        }
        Ok(SourceKind::Local(PathBuf::from(reference)))
    }
}

impl Display for Source {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.0)
    }
}

impl From<&str> for Source {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Source {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<PathBuf> for Source {
    fn from(value: PathBuf) -> Self {
        Self(value.to_string_lossy().into_owned())
    }
}

/// `http://` or `https://` prefix.
pub fn is_http(reference: &str) -> bool {
    reference.starts_with("http://") || reference.starts_with("https://")
}

/// Split `s3://bucket/key` into its bucket and object key.
///
/// Returns `None` if either part is missing.
///
/// ```
/// use dataql_resolve::parse_s3;
///
/// assert_eq!(
///     parse_s3("s3://lake/raw/2024/events.csv.gz"),
///     Some(("lake".to_string(), "raw/2024/events.csv.gz".to_string())),
/// );
/// assert_eq!(parse_s3("s3://lake/"), None);
/// assert_eq!(parse_s3("https://lake/events.csv"), None);
/// ```
pub fn parse_s3(reference: &str) -> Option<(String, String)> {
    let rest = reference.strip_prefix(S3_SCHEME)?;
    let (bucket, key) = rest.split_once('/')?;
    if bucket.is_empty() || key.is_empty() {
        return None;
    }
    Some((bucket.to_string(), key.to_string()))
}
