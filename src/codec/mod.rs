//! Entry payload encoding.
//!
//! ZIP entries are either STORED or DEFLATE compressed. [`compress`] always
//! tries DEFLATE and falls back to STORED when compression does not make the
//! payload smaller, so a compressed entry never occupies more space than its
//! raw data.

pub mod deflate;

use std::io;

use crate::format::CompressionMethod;

pub use deflate::DeflateOptions;

/// Entry data ready to be written after a local file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedPayload {
    /// Method the data is encoded with.
    pub method: CompressionMethod,
    /// CRC-32 of the uncompressed data.
    pub crc32: u32,
    /// Size of the uncompressed data.
    pub uncompressed_size: u64,
    /// Encoded bytes.
    pub data: Vec<u8>,
}

impl CompressedPayload {
    /// Wraps raw data as a STORED payload.
    pub fn stored(data: Vec<u8>, crc32: u32) -> Self {
        Self {
            method: CompressionMethod::Stored,
            crc32,
            uncompressed_size: data.len() as u64,
            data,
        }
    }

    /// Size of the encoded bytes.
    pub fn compressed_size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Compresses `data` with DEFLATE, falling back to STORED if that is not
/// smaller. `crc32` is the checksum already computed for `data`.
pub fn compress(data: Vec<u8>, crc32: u32, options: &DeflateOptions) -> io::Result<CompressedPayload> {
    let compressed = deflate::deflate(&data, options)?;
    if compressed.len() < data.len() {
        Ok(CompressedPayload {
            method: CompressionMethod::Deflate,
            crc32,
            uncompressed_size: data.len() as u64,
            data: compressed,
        })
    } else {
        Ok(CompressedPayload::stored(data, crc32))
    }
}

/// Decodes entry data and returns the uncompressed bytes.
///
/// Decoding stops one byte past `uncompressed_size`, so a stream that
/// expands further than declared is rejected without being fully inflated.
pub fn decompress(method: CompressionMethod, data: &[u8], uncompressed_size: u64) -> io::Result<Vec<u8>> {
    let out = match method {
        CompressionMethod::Stored => data.to_vec(),
        CompressionMethod::Deflate => deflate::inflate(data, uncompressed_size)?,
    };
    if out.len() as u64 != uncompressed_size {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "decoded {} bytes, expected {}",
                out.len(),
                uncompressed_size
            ),
        ));
    }
    Ok(out)
}
