//! Central directory file headers.

use std::io::{self, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::local::truncated;
use crate::timestamp::DosDateTime;
use crate::{Error, Result};

/// One central directory file header.
///
/// Fields this crate does not interpret (extra field, comment, attributes,
/// version made by) are carried through unchanged when an existing archive
/// is rewritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CentralDirectoryHeader {
    /// Version made by.
    pub version_made_by: u16,
    /// Version needed to extract.
    pub version_needed: u16,
    /// General purpose bit flags.
    pub flags: u16,
    /// Compression method code.
    pub method: u16,
    /// Last modification time.
    pub modified: DosDateTime,
    /// CRC-32 of the uncompressed data.
    pub crc32: u32,
    /// Size of the data as stored.
    pub compressed_size: u32,
    /// Size of the data after extraction.
    pub uncompressed_size: u32,
    /// Disk number where the entry starts.
    pub disk_start: u16,
    /// Internal file attributes.
    pub internal_attrs: u16,
    /// External file attributes.
    pub external_attrs: u32,
    /// Offset of the local file header.
    pub local_header_offset: u32,
    /// Raw name bytes.
    pub name: Vec<u8>,
    /// Raw extra field.
    pub extra: Vec<u8>,
    /// Raw entry comment.
    pub comment: Vec<u8>,
}

impl CentralDirectoryHeader {
    /// Record signature (`PK\x01\x02`).
    pub const SIGNATURE: u32 = 0x0201_4b50;

    /// Size of the fixed part of the record.
    pub const FIXED_SIZE: usize = 46;

    /// Total encoded size.
    pub fn len(&self) -> u64 {
        (Self::FIXED_SIZE + self.name.len() + self.extra.len() + self.comment.len()) as u64
    }

    /// Encodes the header.
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u32::<LittleEndian>(Self::SIGNATURE)?;
        w.write_u16::<LittleEndian>(self.version_made_by)?;
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
        w.write_u16::<LittleEndian>(self.comment.len() as u16)?;
        w.write_u16::<LittleEndian>(self.disk_start)?;
        w.write_u16::<LittleEndian>(self.internal_attrs)?;
        w.write_u32::<LittleEndian>(self.external_attrs)?;
        w.write_u32::<LittleEndian>(self.local_header_offset)?;
        w.write_all(&self.name)?;
        w.write_all(&self.extra)?;
        w.write_all(&self.comment)?;
        Ok(())
    }

    /// Decodes `count` consecutive headers from `data`.
    ///
    /// `base_offset` is the file offset of `data[0]`, used for error
    /// reporting.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CorruptHeader`] on a bad signature or truncation.
    pub fn parse_all(data: &[u8], base_offset: u64, count: usize) -> Result<Vec<Self>> {
        let mut headers = Vec::with_capacity(count.min(data.len() / Self::FIXED_SIZE));
        let mut pos = 0usize;
        for _ in 0..count {
            let offset = base_offset + pos as u64;
            let (header, used) = Self::parse(&data[pos..], offset)?;
            headers.push(header);
            pos += used;
        }
        Ok(headers)
    }

    /// Decodes one header, returning it and the number of bytes consumed.
    pub fn parse(data: &[u8], offset: u64) -> Result<(Self, usize)> {
        if data.len() < Self::FIXED_SIZE {
            return Err(Error::corrupt_header(
                offset,
                "truncated central directory header",
            ));
        }

        let mut cursor = data;
        let signature = cursor.read_u32::<LittleEndian>()?;
        if signature != Self::SIGNATURE {
            return Err(Error::corrupt_header(
                offset,
                format!("bad central directory signature {:#010x}", signature),
            ));
        }

        let version_made_by = cursor.read_u16::<LittleEndian>()?;
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
        let comment_len = cursor.read_u16::<LittleEndian>()? as usize;
        let disk_start = cursor.read_u16::<LittleEndian>()?;
        let internal_attrs = cursor.read_u16::<LittleEndian>()?;
        let external_attrs = cursor.read_u32::<LittleEndian>()?;
        let local_header_offset = cursor.read_u32::<LittleEndian>()?;

        let total = Self::FIXED_SIZE + name_len + extra_len + comment_len;
        if data.len() < total {
            return Err(truncated(
                offset,
                "central directory header",
                io::ErrorKind::UnexpectedEof.into(),
            ));
        }

        let name_start = Self::FIXED_SIZE;
        let extra_start = name_start + name_len;
        let comment_start = extra_start + extra_len;

        Ok((
            Self {
                version_made_by,
                version_needed,
                flags,
                method,
                modified: DosDateTime::from_raw(date, time),
                crc32,
                compressed_size,
                uncompressed_size,
                disk_start,
                internal_attrs,
                external_attrs,
                local_header_offset,
                name: data[name_start..extra_start].to_vec(),
                extra: data[extra_start..comment_start].to_vec(),
                comment: data[comment_start..total].to_vec(),
            },
            total,
        ))
    }
}
