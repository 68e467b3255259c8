//! Compression Resolver
//!
//! Materialises compressed sources (`data.csv.gz`) as decompressed temporary
//! files (`data-XXXXXX.csv`) so that the query engine sees the inner format.

use crate::ResolvedFile;
use crate::error::{ErrorKind, Result};
use crate::file::CleanupWarning;
use crate::temp::TempArea;
use dataql_compress::error::ErrorKind as CompressionErrorKind;
use dataql_compress::{Compression, inner_extension, uncompressed_path};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Error as IoError, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tempfile::TempPath;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

const TEMP_PREFIX: &str = "dataql-decompress-";

/// Decompresses sources into a private temporary area.
///
/// The resolver remembers which original file every temporary file came
/// from; see [`original_path`](Self::original_path). All temporary files are
/// removed by [`cleanup`](Self::cleanup), or when the resolver is dropped.
#[derive(Debug)]
pub struct CompressionResolver {
    area: TempArea,
    created: Mutex<Vec<TempPath>>,
    originals: Mutex<HashMap<PathBuf, PathBuf>>,
}

impl Default for CompressionResolver {
    fn default() -> Self {
        Self::with_area(TempArea::new(TEMP_PREFIX))
    }
}

impl CompressionResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create temporary files under `root` instead of the system temp directory.
    pub fn in_dir(root: impl Into<PathBuf>) -> Self {
        Self::with_area(TempArea::in_dir(TEMP_PREFIX, root))
    }

    fn with_area(area: TempArea) -> Self {
        Self { area, created: Mutex::new(Vec::new()), originals: Mutex::new(HashMap::new()) }
    }

    /// The compression scheme implied by the file extension, if any.
    pub fn detect(path: impl AsRef<Path>) -> Option<Compression> {
        Some(Compression::from_path(path)).filter(Compression::is_compressed)
    }

    /// Resolve every path, in order.
    ///
    /// Stops at the first failure. Files already decompressed stay registered
    /// with the resolver and are removed by [`cleanup`](Self::cleanup).
    pub async fn resolve<I, P>(&self, paths: I, cancel: &CancellationToken) -> Result<Vec<ResolvedFile>>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut resolved = Vec::new();
        for path in paths {
            resolved.push(self.resolve_one(ResolvedFile::local(path), cancel).await?);
        }
        Ok(resolved)
    }

    /// Decompress `file` if its name carries a compression suffix, otherwise
    /// return it unchanged.
    #[instrument(skip(self, file, cancel), fields(path = %file.path.display()))]
    pub async fn resolve_one(&self, file: ResolvedFile, cancel: &CancellationToken) -> Result<ResolvedFile> {
        let Some(format) = Self::detect(&file.path) else {
            return Ok(file);
        };
        if !format.is_decodable() {
            exn::bail!(ErrorKind::Compression(CompressionErrorKind::NotYetSupported(format.as_str())));
        }
        if cancel.is_cancelled() {
            exn::bail!(ErrorKind::Cancelled);
        }

        let dir = self.area.dir()?;
        let source = file.path.clone();
        let token = cancel.clone();
        let temp = tokio::task::spawn_blocking(move || decompress_to(format, &source, &dir, token))
            .await
            .map_err(|e| ErrorKind::Io(IoError::other(e)))??;

        let path = temp.to_path_buf();
        tracing::debug!(format = %format, output = %path.display(), "decompressed source");
        self.originals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.clone(), file.path.clone());
        self.created.lock().unwrap_or_else(PoisonError::into_inner).push(temp);
        Ok(ResolvedFile { path, origin: file.origin, compressed_from: Some(file.path) })
    }

    /// The compressed file a temporary file was decompressed from.
    pub fn original_path(&self, temp: impl AsRef<Path>) -> Option<PathBuf> {
        self.originals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(temp.as_ref())
            .cloned()
    }

    /// Number of temporary files currently owned by the resolver.
    pub fn len(&self) -> usize {
        self.created.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delete every temporary file created so far.
    ///
    /// Files that are already gone are not reported. Safe to call repeatedly.
    pub fn cleanup(&self) -> Vec<CleanupWarning> {
        let created = std::mem::take(&mut *self.created.lock().unwrap_or_else(PoisonError::into_inner));
        self.originals.lock().unwrap_or_else(PoisonError::into_inner).clear();
        let mut warnings = Vec::new();
        for temp in created {
            let path = temp.to_path_buf();
            match temp.close() {
                Ok(()) => {},
                Err(error) if error.kind() == std::io::ErrorKind::NotFound => {},
                Err(error) => warnings.push(CleanupWarning { path, error }),
            }
        }
        warnings.extend(self.area.cleanup());
        warnings
    }
}

/// Stream-decompress `source` into a new file in `dir`.
///
/// The returned [`TempPath`] deletes the file when dropped, so every error
/// path below leaves nothing behind.
fn decompress_to(format: Compression, source: &Path, dir: &Path, cancel: CancellationToken) -> Result<TempPath> {
    let input = File::open(source).map_err(|e| ErrorKind::from_io(e, source))?;
    let mut reader = BufReader::new(input);
    let head = reader.fill_buf().map_err(|e| ErrorKind::from_io(e, source))?;
    if !head.is_empty() && !format.check_magic_bytes(head) {
        tracing::warn!(
            path = %source.display(),
            expected = %format,
            detected = %Compression::from_magic_bytes(head),
            "file contents do not match the compression suffix"
        );
    }

    let stem = uncompressed_path(source)
        .file_stem()
        .map(|s| format!("{}-", s.to_string_lossy()))
        .unwrap_or_else(|| "data-".to_string());
    let suffix = inner_extension(source);
    let (output, temp) = tempfile::Builder::new()
        .prefix(&stem)
        .suffix(&suffix)
        .tempfile_in(dir)
        .map_err(ErrorKind::Io)?
        .into_parts();

    let writer = Cancellable { inner: BufWriter::new(output), cancel: &cancel };
    match format.decompress_stream(reader, writer) {
        Ok(_) => Ok(temp),
        Err(_) if cancel.is_cancelled() => exn::bail!(ErrorKind::Cancelled),
        Err(err) => Err(ErrorKind::compression(err)),
    }
}

/// Writer that starts failing once its token is cancelled.
struct Cancellable<'a, W> {
    inner: W,
    cancel: &'a CancellationToken,
}

impl<W: Write> Write for Cancellable<'_, W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if self.cancel.is_cancelled() {
            return Err(IoError::other("cancelled"));
        }
        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}
