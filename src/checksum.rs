//! CRC-32 of entry data.
//!
//! ZIP records the CRC-32 (IEEE 802.3 polynomial) of each entry's
//! uncompressed data. New entries are checksummed while their source stream
//! is read on the calling thread, before any compression is scheduled, so
//! the checksum is final even while the entry is pending.

use std::io::{self, Read};

use crate::{Error, Result};

/// Returns the CRC-32 of `data`.
///
/// ```rust
/// assert_eq!(zipweave::checksum::crc32(b"Hello, World!"), 0xEC4AC3D0);
/// ```
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// Checks extracted data against the CRC-32 recorded for entry `name`.
///
/// # Errors
///
/// Returns [`Error::CrcMismatch`] if the checksums differ.
pub fn verify(name: &str, expected: u32, data: &[u8]) -> Result<()> {
    let actual = crc32(data);
    if actual != expected {
        return Err(Error::crc_mismatch(name, expected, actual));
    }
    Ok(())
}

/// An entry source drained into memory together with its checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceData {
    /// Everything the source produced.
    pub bytes: Vec<u8>,
    /// CRC-32 of `bytes`.
    pub crc32: u32,
}

impl SourceData {
    /// Reads `source` to its end, checksumming each chunk as it arrives.
    pub fn read_from<R: Read>(mut source: R) -> io::Result<Self> {
        let mut hasher = crc32fast::Hasher::new();
        let mut bytes = Vec::new();
        let mut chunk = [0u8; 16 * 1024];
        loop {
            let n = match source.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            hasher.update(&chunk[..n]);
            bytes.extend_from_slice(&chunk[..n]);
        }
        Ok(Self {
            bytes,
            crc32: hasher.finalize(),
        })
    }

    /// Number of bytes read.
    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Returns `true` if the source was empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
