//! Raw DEFLATE streams (ZIP method 8).
//!
//! ZIP stores DEFLATE data without the zlib header or trailer; the CRC-32 in
//! the entry headers takes the place of the Adler-32 checksum.

use std::io::{self, Read, Write};

use flate2::Compression;
use flate2::bufread::DeflateDecoder;
use flate2::write::DeflateEncoder;

/// Upper bound on the output buffer reserved up front from a declared size.
const MAX_PREALLOC: u64 = 16 * 1024 * 1024;

/// Encoder settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeflateOptions {
    /// Compression level, 0 (store-only blocks) to 9 (best).
    pub level: u32,
}

impl Default for DeflateOptions {
    fn default() -> Self {
        Self { level: 6 }
    }
}

impl DeflateOptions {
    /// Options with `level`, clamped to 9.
    pub fn with_level(level: u32) -> Self {
        Self {
            level: level.min(9),
        }
    }
}

/// Compresses `data` into a raw DEFLATE stream.
pub fn deflate(data: &[u8], options: &DeflateOptions) -> io::Result<Vec<u8>> {
    let sink = Vec::with_capacity(data.len() / 2 + 64);
    let mut encoder = DeflateEncoder::new(sink, Compression::new(options.level));
    encoder.write_all(data)?;
    encoder.finish()
}

/// Decompresses a raw DEFLATE stream, producing at most `limit + 1` bytes.
///
/// Stopping one byte past the limit lets the caller tell a stream that
/// expands beyond its declared size from one that matches it, without
/// inflating the rest.
pub fn inflate(data: &[u8], limit: u64) -> io::Result<Vec<u8>> {
    let mut out = Vec::with_capacity(limit.min(MAX_PREALLOC) as usize);
    DeflateDecoder::new(data)
        .take(limit.saturating_add(1))
        .read_to_end(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deflate_inflate() {
        let data = b"Hello, World! This is a test of Deflate compression.".repeat(20);
        let compressed = deflate(&data, &DeflateOptions::default()).unwrap();
        assert!(compressed.len() < data.len());
        assert_eq!(inflate(&compressed, data.len() as u64).unwrap(), data);
    }

    #[test]
    fn test_levels() {
        assert_eq!(DeflateOptions::default().level, 6);
        assert_eq!(DeflateOptions::with_level(15).level, 9);

        let data = b"abcdefgh".repeat(1000);
        let fast = deflate(&data, &DeflateOptions::with_level(1)).unwrap();
        let stored = deflate(&data, &DeflateOptions::with_level(0)).unwrap();
        assert!(fast.len() < stored.len());
        assert_eq!(inflate(&stored, 8000).unwrap(), data);
    }

    #[test]
    fn test_inflate_stops_past_limit() {
        let data = vec![0u8; 100_000];
        let compressed = deflate(&data, &DeflateOptions::default()).unwrap();
        assert_eq!(inflate(&compressed, 10).unwrap().len(), 11);
    }

    #[test]
    fn test_inflate_garbage_fails() {
        assert!(inflate(&[0xFF, 0xFF, 0xFF, 0xFF], 0).is_err());
    }
}
