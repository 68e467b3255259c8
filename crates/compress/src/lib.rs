//! Compression detection and decompression for data sources.
//!
//! This crate wraps several compression libraries behind a unified
//! [`Compression`] enum, providing:
//!
//! - **Format detection** from file extensions ([`Compression::from_path`]) or
//!   magic bytes ([`Compression::from_magic_bytes`])
//! - **Path helpers** that strip the compression suffix so downstream format
//!   detection still sees the inner extension ([`uncompressed_path`],
//!   [`inner_extension`])
//! - **Streaming** via wrapped readers/writers ([`Compression::wrap_reader`],
//!   [`Compression::wrap_writer`], [`Compression::decompress_stream`])
//!
//! Gzip, Bzip2 and XZ are always available. Zstd is always *detected*, but
//! decoding it is behind the `zstd` feature; without it every Zstd operation
//! fails with [`ErrorKind::NotYetSupported`](crate::error::ErrorKind::NotYetSupported)
//! rather than passing the compressed bytes through untouched.

mod construct;
pub mod error;
mod ops;
mod path;
mod util;

pub use crate::path::{inner_extension, uncompressed_path};

/// A supported compression format.
///
/// Defaults to [`None`](Self::None) (uncompressed).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Compression {
    /// Uncompressed
    #[default]
    None,
    /// Bzip2 compression (.bz2)
    Bzip2,
    /// Gzip compression (.gz, .gzip)
    Gzip,
    /// XZ/LZMA compression (.xz)
    Xz,
    /// Zstd compression (.zst, .zstd)
    Zstd,
}

#[cfg(test)]
mod tests {
    use crate::Compression;

    #[test]
    fn compression_default() {
        assert_eq!(Compression::default(), Compression::None);
    }

    #[test]
    fn compression_is_compressed() {
        assert!(!Compression::None.is_compressed());
        assert!(Compression::Gzip.is_compressed());
        assert!(Compression::Zstd.is_compressed());
    }
}
