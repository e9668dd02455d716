//! Whole-buffer stream compression
//!
//! The binary format wraps its chunk stream in zlib, the textual format
//! is gzipped. Both use the highest compression level.

use std::io::{Read, Write};

use flate2::read::{GzDecoder, ZlibDecoder};
use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::Compression;
use thiserror::Error;

/// Compression level used for every stream
pub const LEVEL: u32 = 9;

/// Compression errors
#[derive(Error, Debug)]
pub enum CompressionError {
    #[error("{method} compression failed: {source}")]
    Compress {
        method: StreamCompression,
        source: std::io::Error,
    },

    #[error("{method} decompression failed: {source}")]
    Decompress {
        method: StreamCompression,
        source: std::io::Error,
    },
}

pub type CompressionResult<T> = Result<T, CompressionError>;

impl From<CompressionError> for m3dkit_core::Error {
    fn from(err: CompressionError) -> Self {
        m3dkit_core::Error::Compression {
            message: err.to_string(),
        }
    }
}

/// Stream compression method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamCompression {
    None,
    /// zlib framed deflate, used by the binary format
    Zlib,
    /// gzip framed deflate, used by the textual format
    Gzip,
}

impl std::fmt::Display for StreamCompression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamCompression::None => write!(f, "none"),
            StreamCompression::Zlib => write!(f, "zlib"),
            StreamCompression::Gzip => write!(f, "gzip"),
        }
    }
}

/// Compresses and decompresses model buffers
pub struct ModelCompression;

impl ModelCompression {
    /// Compress data using the specified method
    pub fn compress(data: &[u8], method: StreamCompression) -> CompressionResult<Vec<u8>> {
        let level = Compression::new(LEVEL);
        let result = match method {
            StreamCompression::None => return Ok(data.to_vec()),
            StreamCompression::Zlib => {
                let mut encoder = ZlibEncoder::new(Vec::new(), level);
                encoder.write_all(data).and_then(|_| encoder.finish())
            }
            StreamCompression::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), level);
                encoder.write_all(data).and_then(|_| encoder.finish())
            }
        };
        result.map_err(|source| CompressionError::Compress { method, source })
    }

    /// Decompress data using the specified method
    pub fn decompress(data: &[u8], method: StreamCompression) -> CompressionResult<Vec<u8>> {
        let mut output = Vec::with_capacity(data.len() * 4);
        let result = match method {
            StreamCompression::None => return Ok(data.to_vec()),
            StreamCompression::Zlib => ZlibDecoder::new(data).read_to_end(&mut output),
            StreamCompression::Gzip => GzDecoder::new(data).read_to_end(&mut output),
        };
        result.map_err(|source| CompressionError::Decompress { method, source })?;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zlib_stream() {
        let data = b"VRTS".repeat(64);
        let compressed = ModelCompression::compress(&data, StreamCompression::Zlib).unwrap();
        assert!(compressed.len() < data.len());
        // zlib header with maximum compression
        assert_eq!(compressed[0], 0x78);
        assert_eq!(compressed[1], 0xDA);
        assert_eq!(ModelCompression::decompress(&compressed, StreamCompression::Zlib).unwrap(), data);
    }

    #[test]
    fn test_gzip_stream() {
        let data = b"Vertex\r\n0 0 0 1\r\n".repeat(16);
        let compressed = ModelCompression::compress(&data, StreamCompression::Gzip).unwrap();
        assert_eq!(&compressed[..2], &[0x1F, 0x8B]);
        assert_eq!(ModelCompression::decompress(&compressed, StreamCompression::Gzip).unwrap(), data);
    }

    #[test]
    fn test_corrupt_stream_errors() {
        let err = ModelCompression::decompress(b"not zlib at all", StreamCompression::Zlib).unwrap_err();
        assert!(err.to_string().contains("zlib"));
    }
}
