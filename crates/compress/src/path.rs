//! Path helpers for compressed sources.
//!
//! Downstream format detection looks at the file extension, so a source
//! named `data.csv.gz` must be presented as `data.csv` once decompressed.

use crate::Compression;
use std::path::{Path, PathBuf};

/// Strip the compression suffix from a path.
///
/// Paths without a recognised compression suffix are returned unchanged.
///
/// ```
/// use std::path::Path;
/// use dataql_compress::uncompressed_path;
///
/// assert_eq!(uncompressed_path("data.csv.gz"), Path::new("data.csv"));
/// assert_eq!(uncompressed_path("data.csv"), Path::new("data.csv"));
/// ```
pub fn uncompressed_path(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    match Compression::from_path(path) {
        Compression::None => path.to_path_buf(),
        _ => path.with_extension(""),
    }
}

/// Extension (with leading dot) of the path once the compression suffix has
/// been stripped. Empty when there is no inner extension.
///
/// ```
/// use dataql_compress::inner_extension;
///
/// assert_eq!(inner_extension("data.csv.gz"), ".csv");
/// assert_eq!(inner_extension("data.csv"), ".csv");
/// assert_eq!(inner_extension("archive.gz"), "");
/// ```
pub fn inner_extension(path: impl AsRef<Path>) -> String {
    uncompressed_path(path)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default()
}
