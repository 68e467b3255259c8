//! Remote Resolver
//!
//! Downloads `http(s)://` and `s3://` sources into a per-resolver temporary
//! directory. The local file keeps the remote file name, so compression and
//! format detection work on downloads exactly as they do on local files.

mod http;
#[cfg(feature = "s3")]
mod s3;

pub use self::http::DEFAULT_HTTP_TIMEOUT;

use self::http::HttpDownloader;
use crate::error::Result;
use crate::file::CleanupWarning;
use crate::ResolvedFile;
use crate::source::{Source, SourceKind};
use crate::temp::TempArea;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

const TEMP_PREFIX: &str = "dataql-remote-";
const FALLBACK_NAME: &str = "download";

/// Overrides for the S3 client; anything unset comes from the ambient AWS
/// configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct S3Settings {
    pub region: Option<String>,
    /// Custom endpoint for S3-compatible services. Implies path-style addressing.
    pub endpoint: Option<String>,
}

#[derive(Debug)]
pub struct RemoteResolver {
    area: TempArea,
    http: HttpDownloader,
    #[cfg(feature = "s3")]
    s3: s3::S3Downloader,
    names: Mutex<HashSet<String>>,
}

impl RemoteResolver {
    /// Resolver with the default HTTP timeout and ambient S3 configuration.
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    pub fn builder() -> RemoteResolverBuilder {
        RemoteResolverBuilder::default()
    }

    /// Whether `reference` names an HTTP(S) or S3 source.
    pub fn is_remote(reference: &str) -> bool {
        Source::new(reference).is_remote()
    }

    /// See [`crate::parse_s3`].
    pub fn parse_s3(reference: &str) -> Option<(String, String)> {
        crate::source::parse_s3(reference)
    }

    /// Download a remote source.
    ///
    /// Local sources are returned unchanged.
    #[instrument(skip(self, cancel), fields(source = %source))]
    pub async fn resolve(&self, source: &Source, cancel: &CancellationToken) -> Result<ResolvedFile> {
        match source.kind()? {
            SourceKind::Local(path) => Ok(ResolvedFile::local(path)),
            SourceKind::Http(url) => {
                let name = url
                    .path_segments()
                    .and_then(|mut segments| segments.next_back())
                    .unwrap_or_default()
                    .to_string();
                let target = self.target(&name)?;
                let bytes = self.http.download(&url, &target, cancel).await?;
                tracing::info!(bytes, path = %target.display(), "downloaded");
                Ok(ResolvedFile::local(target).with_origin(source.clone()))
            },
            #[cfg(feature = "s3")]
            SourceKind::S3 { bucket, key } => {
                let name = key.rsplit('/').next().unwrap_or_default().to_string();
                let target = self.target(&name)?;
                let bytes = self.s3.download(&bucket, &key, &target, cancel).await?;
                tracing::info!(bytes, path = %target.display(), "downloaded");
                Ok(ResolvedFile::local(target).with_origin(source.clone()))
            },
            #[cfg(not(feature = "s3"))]
            SourceKind::S3 { .. } => exn::bail!(crate::error::ErrorKind::BackendDisabled("s3")),
        }
    }

    /// Remove the temporary directory and every download in it.
    pub fn cleanup(&self) -> Vec<CleanupWarning> {
        self.names.lock().unwrap_or_else(PoisonError::into_inner).clear();
        self.area.cleanup()
    }

    /// Reserve a unique local path for a download named `name`.
    fn target(&self, name: &str) -> Result<PathBuf> {
        let dir = self.area.dir()?;
        let name = local_name(name);
        let mut names = self.names.lock().unwrap_or_else(PoisonError::into_inner);
        let mut candidate = name.clone();
        let mut index = 1;
        while !names.insert(candidate.clone()) {
            candidate = format!("{index}-{name}");
            index += 1;
        }
        Ok(dir.join(candidate))
    }
}

/// Sanitise a remote file name for use on the local filesystem.
fn local_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_control() || matches!(c, '/' | '\\' | ':') { '_' } else { c })
        .collect();
    if cleaned.trim_matches('.').is_empty() { FALLBACK_NAME.to_string() } else { cleaned }
}

#[derive(Debug, Clone)]
pub struct RemoteResolverBuilder {
    http_timeout: Duration,
    s3: S3Settings,
    temp_root: Option<PathBuf>,
}

impl Default for RemoteResolverBuilder {
    fn default() -> Self {
        Self { http_timeout: DEFAULT_HTTP_TIMEOUT, s3: S3Settings::default(), temp_root: None }
    }
}

impl RemoteResolverBuilder {
    pub fn http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    pub fn s3(mut self, settings: S3Settings) -> Self {
        self.s3 = settings;
        self
    }

    /// Download under `root` instead of the system temp directory.
    pub fn temp_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.temp_root = Some(root.into());
        self
    }

    pub fn build(self) -> Result<RemoteResolver> {
        let area = match self.temp_root {
            Some(root) => TempArea::in_dir(TEMP_PREFIX, root),
            None => TempArea::new(TEMP_PREFIX),
        };
        #[cfg(not(feature = "s3"))]
        let _ = self.s3;
        Ok(RemoteResolver {
            area,
            http: HttpDownloader::new(self.http_timeout)?,
            #[cfg(feature = "s3")]
            s3: s3::S3Downloader::new(self.s3),
            names: Mutex::new(HashSet::new()),
        })
    }
}
