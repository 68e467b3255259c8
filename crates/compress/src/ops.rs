//! Compression Operations

use crate::Compression;
use crate::error::{ErrorKind, Result};
use bzip2::{Compression as BzCompression, read::MultiBzDecoder, write::BzEncoder};
use exn::ResultExt;
use flate2::{Compression as GzCompression, read::MultiGzDecoder, write::GzEncoder};
use std::io::{ErrorKind as IoErrorKind, Read, Write};
use tracing::instrument;
use xz2::{read::XzDecoder, write::XzEncoder};
#[cfg(feature = "zstd")]
use zstd::stream::{read::Decoder as ZstdDecoder, write::Encoder as ZstdEncoder};

// Encoding only exists to produce fixtures and round-trip data, so favour
// speed over ratio.
const BZIP2_LEVEL: BzCompression = BzCompression::fast();
const GZIP_LEVEL: GzCompression = GzCompression::fast();
const XZ_LEVEL: u32 = 1;
#[cfg(feature = "zstd")]
const ZSTD_LEVEL: i32 = 3;
const COPY_BUFFER_SIZE: usize = 64 * 1024;

impl Compression {
    /// Compress a byte slice in memory.
    ///
    /// # Examples
    ///
    /// ```
    /// use dataql_compress::Compression;
    ///
    /// let data = b"id,name\n1,alice\n";
    /// let compressed = Compression::Gzip.compress(data).unwrap();
    /// assert_ne!(compressed, data);
    /// ```
    pub fn compress(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        self.compress_stream(input, &mut output)?;
        Ok(output)
    }

    /// Decompress a byte slice in memory.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use dataql_compress::Compression;
    ///
    /// let original = b"id,name\n1,alice\n";
    /// let compressed = Compression::Bzip2.compress(original).unwrap();
    /// let decompressed = Compression::Bzip2.decompress(&compressed).unwrap();
    /// assert_eq!(decompressed, original);
    /// ```
    pub fn decompress(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        self.decompress_stream(input, &mut output)?;
        Ok(output)
    }

    /// Wrap a reader with the appropriate decompression layer.
    ///
    /// Gzip and Bzip2 decoders accept multi-member streams (concatenated
    /// archives), which is what `cat a.gz b.gz > c.gz` produces.
    pub fn wrap_reader<'a, R: Read + 'a>(&self, reader: R) -> Result<Box<dyn Read + 'a>> {
        Ok(match self {
            Compression::None => Box::new(reader),
            Compression::Bzip2 => Box::new(MultiBzDecoder::new(reader)),
            Compression::Gzip => Box::new(MultiGzDecoder::new(reader)),
            Compression::Xz => Box::new(XzDecoder::new_multi_decoder(reader)),
            #[cfg(feature = "zstd")]
            Compression::Zstd => Box::new(ZstdDecoder::new(reader).or_raise(|| ErrorKind::Encoder)?),
            #[cfg(not(feature = "zstd"))]
            Compression::Zstd => exn::bail!(ErrorKind::NotYetSupported(self.as_str())),
        })
    }

    /// Wrap a writer with the appropriate compression layer.
    ///
    /// The returned writer finishes the stream when dropped.
    pub fn wrap_writer<'a, W: Write + 'a>(&self, writer: W) -> Result<Box<dyn Write + 'a>> {
        Ok(match self {
            Compression::None => Box::new(writer),
            Compression::Bzip2 => Box::new(BzEncoder::new(writer, BZIP2_LEVEL)),
            Compression::Gzip => Box::new(GzEncoder::new(writer, GZIP_LEVEL)),
            Compression::Xz => Box::new(XzEncoder::new(writer, XZ_LEVEL)),
            #[cfg(feature = "zstd")]
            Compression::Zstd => {
                Box::new(ZstdEncoder::new(writer, ZSTD_LEVEL).or_raise(|| ErrorKind::Encoder)?.auto_finish())
            },
            #[cfg(not(feature = "zstd"))]
            Compression::Zstd => exn::bail!(ErrorKind::NotYetSupported(self.as_str())),
        })
    }

    /// Compress from a reader to a writer, returning bytes read.
    #[instrument(skip(reader, writer), fields(format = %self))]
    pub fn compress_stream<'a, R: Read, W: Write + 'a>(&self, mut reader: R, writer: W) -> Result<u64> {
        let mut writer = self.wrap_writer(writer)?;
        let bytes = std::io::copy(&mut reader, &mut writer).or_raise(|| ErrorKind::Io)?;
        writer.flush().or_raise(|| ErrorKind::Io)?;
        Ok(bytes)
    }

    /// Decompress from a reader to a writer, returning bytes written.
    ///
    /// Failures while *decoding* are reported as
    /// [`InvalidData`](ErrorKind::InvalidData) (don't retry with the same
    /// input); failures while *writing* are reported as [`Io`](ErrorKind::Io).
    ///
    /// # Examples
    ///
    /// ```
    /// use std::io::Cursor;
    /// use dataql_compress::Compression;
    ///
    /// let original = b"id,name\n1,alice\n";
    /// let compressed = Compression::Xz.compress(original).unwrap();
    ///
    /// let mut output = Vec::new();
    /// let bytes = Compression::Xz.decompress_stream(Cursor::new(compressed), &mut output).unwrap();
    /// assert_eq!(output, original);
    /// assert_eq!(bytes, original.len() as u64);
    /// ```
    #[instrument(skip(reader, writer), fields(format = %self, output_size))]
    pub fn decompress_stream<'a, R: Read + 'a, W: Write>(&self, reader: R, mut writer: W) -> Result<u64> {
        let mut reader = self.wrap_reader(reader)?;
        let mut buffer = vec![0; COPY_BUFFER_SIZE];
        let mut total: u64 = 0;
        loop {
            let read = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(read) => read,
                Err(e) if e.kind() == IoErrorKind::Interrupted => continue,
                Err(e) => return Err(e).or_raise(|| ErrorKind::InvalidData),
            };
            writer.write_all(&buffer[..read]).or_raise(|| ErrorKind::Io)?;
            total += read as u64;
        }
        writer.flush().or_raise(|| ErrorKind::Io)?;
        tracing::Span::current().record("output_size", total);
        Ok(total)
    }
}
