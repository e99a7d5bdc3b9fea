//! Local file headers and data descriptors.

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::timestamp::DosDateTime;
use crate::{Error, Result};

/// Local file header, written immediately before each entry's data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFileHeader {
    /// Version needed to extract.
    pub version_needed: u16,
    /// General purpose bit flags.
    pub flags: u16,
    /// Compression method code.
    pub method: u16,
    /// Last modification time.
    pub modified: DosDateTime,
    /// CRC-32 of the uncompressed data (0 when a data descriptor follows).
    pub crc32: u32,
    /// Size of the data as stored.
    pub compressed_size: u32,
    /// Size of the data after extraction.
    pub uncompressed_size: u32,
    /// Raw name bytes.
    pub name: Vec<u8>,
    /// Raw extra field.
    pub extra: Vec<u8>,
}

impl LocalFileHeader {
    /// Record signature (`PK\x03\x04`).
    pub const SIGNATURE: u32 = 0x0403_4b50;

    /// Size of the fixed part of the record.
    pub const FIXED_SIZE: usize = 30;

    /// Total encoded size: fixed part, name, and extra field.
    pub fn len(&self) -> u64 {
        (Self::FIXED_SIZE + self.name.len() + self.extra.len()) as u64
    }

    /// Returns `true` if a data descriptor follows the entry data.
    pub fn has_data_descriptor(&self) -> bool {
        self.flags & super::FLAG_DATA_DESCRIPTOR != 0
    }

    /// Encodes the header.
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u32::<LittleEndian>(Self::SIGNATURE)?;
        w.write_u16::<LittleEndian>(self.version_needed)?;
        w.write_u16::<LittleEndian>(self.flags)?;
        w.write_u16::<LittleEndian>(self.method)?;
        w.write_u16::<LittleEndian>(self.modified.time())?;
        w.write_u16::<LittleEndian>(self.modified.date())?;
        w.write_u32::<LittleEndian>(self.crc32)?;
        w.write_u32::<LittleEndian>(self.compressed_size)?;
        w.write_u32::<LittleEndian>(self.uncompressed_size)?;
        w.write_u16::<LittleEndian>(self.name.len() as u16)?;
        w.write_u16::<LittleEndian>(self.extra.len() as u16)?;
        w.write_all(&self.name)?;
        w.write_all(&self.extra)?;
        Ok(())
    }

    /// Encodes the header into a new buffer.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len() as usize);
        // Writing into a Vec cannot fail.
        let _ = self.write_to(&mut out);
        out
    }

    /// Decodes a header from `r`.
    ///
    /// `offset` is the position of the record in the file and is only used
    /// for error reporting.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CorruptHeader`] if the signature is wrong or the
    /// record is truncated.
    pub fn read_from<R: Read>(r: &mut R, offset: u64) -> Result<Self> {
        let mut fixed = [0u8; Self::FIXED_SIZE];
        r.read_exact(&mut fixed)
            .map_err(|e| truncated(offset, "local file header", e))?;

        let mut cursor = &fixed[..];
        let signature = cursor.read_u32::<LittleEndian>()?;
        if signature != Self::SIGNATURE {
            return Err(Error::corrupt_header(
                offset,
                format!("bad local file header signature {:#010x}", signature),
            ));
        }

        let version_needed = cursor.read_u16::<LittleEndian>()?;
        let flags = cursor.read_u16::<LittleEndian>()?;
        let method = cursor.read_u16::<LittleEndian>()?;
        let time = cursor.read_u16::<LittleEndian>()?;
        let date = cursor.read_u16::<LittleEndian>()?;
        let crc32 = cursor.read_u32::<LittleEndian>()?;
        let compressed_size = cursor.read_u32::<LittleEndian>()?;
        let uncompressed_size = cursor.read_u32::<LittleEndian>()?;
        let name_len = cursor.read_u16::<LittleEndian>()? as usize;
        let extra_len = cursor.read_u16::<LittleEndian>()? as usize;

        let mut name = vec![0u8; name_len];
        r.read_exact(&mut name)
            .map_err(|e| truncated(offset, "local file name", e))?;
        let mut extra = vec![0u8; extra_len];
        r.read_exact(&mut extra)
            .map_err(|e| truncated(offset, "local extra field", e))?;

        Ok(Self {
            version_needed,
            flags,
            method,
            modified: DosDateTime::from_raw(date, time),
            crc32,
            compressed_size,
            uncompressed_size,
            name,
            extra,
        })
    }
}

/// Data descriptor that follows entry data when GP bit 3 is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataDescriptor {
    /// Whether the optional signature was present.
    pub signed: bool,
    /// CRC-32 of the uncompressed data.
    pub crc32: u32,
    /// Size of the data as stored.
    pub compressed_size: u32,
    /// Size of the data after extraction.
    pub uncompressed_size: u32,
}

impl DataDescriptor {
    /// Optional record signature (`PK\x07\x08`).
    pub const SIGNATURE: u32 = 0x0807_4b50;

    /// Encoded size with the signature.
    pub const SIGNED_SIZE: usize = 16;

    /// Encoded size without the signature.
    pub const UNSIGNED_SIZE: usize = 12;

    /// Encoded size of this descriptor.
    pub fn len(&self) -> u64 {
        if self.signed {
            Self::SIGNED_SIZE as u64
        } else {
            Self::UNSIGNED_SIZE as u64
        }
    }

    /// Decodes a descriptor from up to 16 bytes following the entry data.
    ///
    /// The signature is optional in the format, so its presence is detected
    /// from the first word.
    pub fn parse(data: &[u8], offset: u64) -> Result<Self> {
        let mut cursor = data;
        let first = cursor
            .read_u32::<LittleEndian>()
            .map_err(|e| truncated(offset, "data descriptor", e))?;
        let (signed, crc32) = if first == Self::SIGNATURE {
            let crc = cursor
                .read_u32::<LittleEndian>()
                .map_err(|e| truncated(offset, "data descriptor", e))?;
            (true, crc)
        } else {
            (false, first)
        };
        let compressed_size = cursor
            .read_u32::<LittleEndian>()
            .map_err(|e| truncated(offset, "data descriptor", e))?;
        let uncompressed_size = cursor
            .read_u32::<LittleEndian>()
            .map_err(|e| truncated(offset, "data descriptor", e))?;
        Ok(Self {
            signed,
            crc32,
            compressed_size,
            uncompressed_size,
        })
    }
}

pub(crate) fn truncated(offset: u64, what: &str, e: io::Error) -> Error {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        Error::corrupt_header(offset, format!("truncated {}", what))
    } else {
        Error::Io(e)
    }
}
