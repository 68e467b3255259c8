//! Turns source references into local files ready for import.
//!
//! A [`Source`] is whatever the user typed: a path, an `http(s)://` URL or an
//! `s3://bucket/key` URI. [`SourceResolver`] chains the two resolvers:
//!
//! 1. [`RemoteResolver`] downloads remote sources into a temporary directory;
//! 2. [`CompressionResolver`] decompresses `.gz`/`.bz2`/`.xz` files (local or
//!    downloaded) into temporary files that keep the inner extension;
//! 3. whatever is left must be a readable local file.
//!
//! Temporary files belong to the resolver that created them. They are removed
//! by `cleanup()` or when the resolver is dropped, whichever happens first.

pub mod compression;
pub mod error;
mod file;
pub mod remote;
mod source;
mod temp;

pub use crate::compression::CompressionResolver;
pub use crate::file::{CleanupWarning, ResolvedFile};
pub use crate::remote::{DEFAULT_HTTP_TIMEOUT, RemoteResolver, S3Settings};
pub use crate::source::{Source, SourceKind, is_http, parse_s3};

use crate::error::{ErrorKind, Result};
use futures::future::join_all;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Remote download, then decompression, then a local readability check.
#[derive(Debug)]
pub struct SourceResolver {
    remote: RemoteResolver,
    compression: CompressionResolver,
}

impl SourceResolver {
    pub fn new(remote: RemoteResolver, compression: CompressionResolver) -> Self {
        Self { remote, compression }
    }

    /// Resolve a single source to a readable local file.
    #[instrument(skip(self, cancel), fields(source = %source))]
    pub async fn resolve(&self, source: &Source, cancel: &CancellationToken) -> Result<ResolvedFile> {
        let file = self.remote.resolve(source, cancel).await?;
        let file = self.compression.resolve_one(file, cancel).await?;
        check_readable(&file.path).await?;
        Ok(file)
    }

    /// Resolve all sources concurrently. The output keeps the input order.
    ///
    /// Every source settles before this returns, even after a failure, so no
    /// download or decompression is still writing into a temporary area when
    /// the caller runs [`cleanup`](Self::cleanup). The first error (in input
    /// order) is returned.
    pub async fn resolve_all(&self, sources: &[Source], cancel: &CancellationToken) -> Result<Vec<ResolvedFile>> {
        join_all(sources.iter().map(|source| self.resolve(source, cancel)))
            .await
            .into_iter()
            .collect()
    }

    pub fn compression(&self) -> &CompressionResolver {
        &self.compression
    }

    pub fn remote(&self) -> &RemoteResolver {
        &self.remote
    }

    /// Remove every temporary file and directory created by either resolver.
    pub fn cleanup(&self) -> Vec<CleanupWarning> {
        let mut warnings = self.compression.cleanup();
        warnings.extend(self.remote.cleanup());
        warnings
    }
}

async fn check_readable(path: &Path) -> Result<()> {
    let metadata = tokio::fs::metadata(path).await.map_err(|e| ErrorKind::from_io(e, path))?;
    if metadata.is_dir() {
        exn::bail!(ErrorKind::InvalidSource(format!("{} is a directory", path.display())));
    }
    tokio::fs::File::open(path).await.map_err(|e| ErrorKind::from_io(e, path))?;
    Ok(())
}
