//! ZIP wire format records.
//!
//! All multi-byte fields are little-endian. An archive written by this crate
//! looks like:
//!
//! ```text
//! +---------------------------+
//! | [free space]              |  <- alignment padding / reclaimed gaps
//! | local file header 1       |
//! | data 1                    |
//! | [data descriptor 1]       |  <- only in archives from other tools
//! | ...                       |
//! | central directory headers |
//! | end of central directory  |
//! +---------------------------+
//! ```
//!
//! Only the central directory is authoritative: local headers are located
//! through the offsets it records, so unreferenced bytes between entries
//! are tolerated by every standard reader.

pub mod central;
pub mod eocd;
pub mod local;

pub use central::CentralDirectoryHeader;
pub use eocd::EndOfCentralDirectory;
pub use local::{DataDescriptor, LocalFileHeader};

use crate::{Error, Result};

/// General purpose flag: entry is encrypted.
pub const FLAG_ENCRYPTED: u16 = 1 << 0;

/// General purpose flag: CRC and sizes follow the data in a data descriptor.
pub const FLAG_DATA_DESCRIPTOR: u16 = 1 << 3;

/// General purpose flag: name and comment are UTF-8.
pub const FLAG_UTF8: u16 = 1 << 11;

/// "Version needed to extract" for STORED entries (1.0).
pub const VERSION_STORED: u16 = 10;

/// "Version needed to extract" for DEFLATE entries and directories (2.0).
pub const VERSION_DEFLATE: u16 = 20;

/// "Version made by" written for new entries: MS-DOS host, ZIP version 2.0.
pub const VERSION_MADE_BY: u16 = 20;

/// Largest value a 16-bit count field can hold before ZIP64 is required.
pub const MAX_ENTRIES: usize = 0xFFFF - 1;

/// Largest value a 32-bit size or offset field can hold before ZIP64 is required.
pub const MAX_32: u64 = 0xFFFF_FFFF - 1;

/// Compression method of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressionMethod {
    /// Data stored as-is (method 0).
    Stored,
    /// Raw DEFLATE stream (method 8).
    Deflate,
}

impl CompressionMethod {
    /// Parses a ZIP method code.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedMethod`] for anything but 0 and 8.
    pub fn from_code(code: u16) -> Result<Self> {
        match code {
            0 => Ok(Self::Stored),
            8 => Ok(Self::Deflate),
            method => Err(Error::UnsupportedMethod { method }),
        }
    }

    /// Returns the ZIP method code.
    pub fn code(&self) -> u16 {
        match self {
            Self::Stored => 0,
            Self::Deflate => 8,
        }
    }

    /// Returns the "version needed to extract" for this method.
    pub fn version_needed(&self) -> u16 {
        match self {
            Self::Stored => VERSION_STORED,
            Self::Deflate => VERSION_DEFLATE,
        }
    }

    /// Returns a human-readable name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Stored => "STORED",
            Self::Deflate => "DEFLATE",
        }
    }
}

impl std::fmt::Display for CompressionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Decodes an entry name from its header bytes.
///
/// Names flagged UTF-8 and names that happen to be valid UTF-8 decode
/// exactly; anything else is decoded lossily. The raw bytes are always kept
/// alongside so the record is written back unchanged.
pub fn decode_name(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Returns the general purpose flags to use for a new entry named `name`.
pub fn flags_for_name(name: &str) -> u16 {
    if name.is_ascii() { 0 } else { FLAG_UTF8 }
}
