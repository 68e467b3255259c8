use crate::Compression;
use std::fmt::{Display, Formatter, Result as FmtResult};

impl Display for Compression {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

impl AsRef<str> for Compression {
    fn as_ref(&self) -> &'static str {
        self.as_str()
    }
}

impl Compression {
    /// Returns the canonical file extension for this compression format.
    #[inline]
    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self {
            Compression::None => "",
            Compression::Bzip2 => ".bz2",
            Compression::Gzip => ".gz",
            Compression::Xz => ".xz",
            Compression::Zstd => ".zst",
        }
    }

    /// Returns the short name for configuration (for displaying to user)
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Compression::None => "none",
            Compression::Bzip2 => "bzip2",
            Compression::Gzip => "gzip",
            Compression::Xz => "xz",
            Compression::Zstd => "zstd",
        }
    }

    #[inline]
    #[must_use]
    pub fn is_compressed(&self) -> bool {
        !matches!(self, Compression::None)
    }

    /// Whether this build can actually decode the format.
    #[inline]
    #[must_use]
    pub fn is_decodable(&self) -> bool {
        match self {
            Compression::Zstd => cfg!(feature = "zstd"),
            _ => true,
        }
    }

    /// Verify that `bytes` start with the expected magic bytes for this format.
    ///
    /// Useful for cross-checking a format detected from a file extension against
    /// actual file contents.
    #[must_use]
    pub fn check_magic_bytes(&self, bytes: &[u8]) -> bool {
        *self == Self::from_magic_bytes(bytes)
    }
}

#[cfg(test)]
mod tests {
    use crate::Compression;
    use rstest::rstest;

    #[rstest]
    #[case(Compression::None, "")]
    #[case(Compression::Bzip2, ".bz2")]
    #[case(Compression::Gzip, ".gz")]
    #[case(Compression::Xz, ".xz")]
    #[case(Compression::Zstd, ".zst")]
    fn test_extension(#[case] format: Compression, #[case] expected: &str) {
        assert_eq!(format.extension(), expected);
    }

    #[rstest]
    #[case(Compression::Gzip, &[0x1F, 0x8B, 0x08], true)]
    #[case(Compression::Gzip, b"id,name\n", false)]
    #[case(Compression::None, b"id,name\n", true)]
    #[case(Compression::Xz, &[0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00], true)]
    fn test_check_magic_bytes(#[case] format: Compression, #[case] bytes: &[u8], #[case] expected: bool) {
        assert_eq!(format.check_magic_bytes(bytes), expected);
    }

    #[test]
    fn test_zstd_decodable_follows_feature() {
        assert_eq!(Compression::Zstd.is_decodable(), cfg!(feature = "zstd"));
        assert!(Compression::Gzip.is_decodable());
    }
}
