//! End of central directory record.

use std::io::{self, Read, Seek, SeekFrom, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::{Error, Result};

/// Maximum length of the archive comment.
pub const MAX_COMMENT_SIZE: usize = u16::MAX as usize;

/// Signature of the ZIP64 end of central directory locator.
const ZIP64_LOCATOR_SIGNATURE: u32 = 0x0706_4b50;

/// Size of the ZIP64 end of central directory locator.
const ZIP64_LOCATOR_SIZE: u64 = 20;

/// End of central directory record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndOfCentralDirectory {
    /// Number of this disk.
    pub disk_number: u16,
    /// Disk where the central directory starts.
    pub cd_disk: u16,
    /// Number of central directory records on this disk.
    pub disk_entries: u16,
    /// Total number of central directory records.
    pub total_entries: u16,
    /// Size of the central directory in bytes.
    pub cd_size: u32,
    /// Offset of the start of the central directory.
    pub cd_offset: u32,
    /// Archive comment.
    pub comment: Vec<u8>,
}

/// Where an end of central directory record was found.
#[derive(Debug, Clone)]
pub struct LocatedEocd {
    /// The decoded record.
    pub record: EndOfCentralDirectory,
    /// File offset of the record signature.
    pub offset: u64,
    /// Bytes found after the record and its comment.
    pub trailing: u64,
}

impl EndOfCentralDirectory {
    /// Record signature (`PK\x05\x06`).
    pub const SIGNATURE: u32 = 0x0605_4b50;

    /// Size of the fixed part of the record.
    pub const SIZE: usize = 22;

    /// Builds a single-disk record for `entries` records occupying
    /// `[cd_offset, cd_offset + cd_size)`.
    pub fn new(entries: u16, cd_size: u32, cd_offset: u32, comment: Vec<u8>) -> Self {
        Self {
            disk_number: 0,
            cd_disk: 0,
            disk_entries: entries,
            total_entries: entries,
            cd_size,
            cd_offset,
            comment,
        }
    }

    /// Total encoded size including the comment.
    pub fn len(&self) -> u64 {
        (Self::SIZE + self.comment.len()) as u64
    }

    /// Encodes the record.
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u32::<LittleEndian>(Self::SIGNATURE)?;
        w.write_u16::<LittleEndian>(self.disk_number)?;
        w.write_u16::<LittleEndian>(self.cd_disk)?;
        w.write_u16::<LittleEndian>(self.disk_entries)?;
        w.write_u16::<LittleEndian>(self.total_entries)?;
        w.write_u32::<LittleEndian>(self.cd_size)?;
        w.write_u32::<LittleEndian>(self.cd_offset)?;
        w.write_u16::<LittleEndian>(self.comment.len() as u16)?;
        w.write_all(&self.comment)?;
        Ok(())
    }

    /// Decodes the fixed part of the record; the comment is left empty.
    fn parse_fixed(buf: &[u8]) -> io::Result<(Self, usize)> {
        let mut cursor = buf;
        let _signature = cursor.read_u32::<LittleEndian>()?;
        let disk_number = cursor.read_u16::<LittleEndian>()?;
        let cd_disk = cursor.read_u16::<LittleEndian>()?;
        let disk_entries = cursor.read_u16::<LittleEndian>()?;
        let total_entries = cursor.read_u16::<LittleEndian>()?;
        let cd_size = cursor.read_u32::<LittleEndian>()?;
        let cd_offset = cursor.read_u32::<LittleEndian>()?;
        let comment_len = cursor.read_u16::<LittleEndian>()? as usize;
        Ok((
            Self {
                disk_number,
                cd_disk,
                disk_entries,
                total_entries,
                cd_size,
                cd_offset,
                comment: Vec::new(),
            },
            comment_len,
        ))
    }

    /// Checks that the record describes a single-disk, non-ZIP64 archive.
    fn check_supported(&self) -> Result<()> {
        if self.disk_number != 0 || self.cd_disk != 0 || self.disk_entries != self.total_entries {
            return Err(Error::UnsupportedFeature {
                feature: "multi-disk archives",
            });
        }
        if self.total_entries == u16::MAX
            || self.cd_size == u32::MAX
            || self.cd_offset == u32::MAX
        {
            return Err(Error::UnsupportedFeature { feature: "ZIP64" });
        }
        Ok(())
    }

    /// Locates the record by scanning backwards from the end of the file.
    ///
    /// The record sits at the very end unless the archive has a comment, so
    /// the common case is tried first with a single 22-byte read. Otherwise
    /// the last 64 KiB + 22 bytes are searched for a signature whose comment
    /// length reaches exactly to the end of the file. A candidate whose
    /// comment ends before the end of the file is accepted as a last resort
    /// and the extra bytes are reported as trailing data.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidFormat`] if no record is found
    /// - [`Error::UnsupportedFeature`] for ZIP64 or multi-disk archives
    pub fn find<R: Read + Seek>(r: &mut R, file_len: u64) -> Result<LocatedEocd> {
        if file_len < Self::SIZE as u64 {
            return Err(Error::InvalidFormat(format!(
                "file too small ({} bytes) to be a ZIP archive",
                file_len
            )));
        }

        let tail_offset = file_len - Self::SIZE as u64;
        let mut tail = [0u8; Self::SIZE];
        r.seek(SeekFrom::Start(tail_offset))?;
        r.read_exact(&mut tail)?;
        if tail[..4] == Self::SIGNATURE.to_le_bytes() && tail[20..22] == [0, 0] {
            let (record, _) = Self::parse_fixed(&tail)?;
            let located = LocatedEocd {
                record,
                offset: tail_offset,
                trailing: 0,
            };
            return Self::finish(r, located);
        }

        let search_size = ((MAX_COMMENT_SIZE + Self::SIZE) as u64).min(file_len);
        let search_start = file_len - search_size;
        let mut buf = vec![0u8; search_size as usize];
        r.seek(SeekFrom::Start(search_start))?;
        r.read_exact(&mut buf)?;

        let signature = Self::SIGNATURE.to_le_bytes();
        let mut fallback = None;
        for i in (0..=buf.len() - Self::SIZE).rev() {
            if buf[i..i + 4] != signature {
                continue;
            }
            let (mut record, comment_len) = Self::parse_fixed(&buf[i..i + Self::SIZE])?;
            let available = buf.len() - i - Self::SIZE;
            if comment_len > available {
                continue;
            }
            let comment_start = i + Self::SIZE;
            record.comment = buf[comment_start..comment_start + comment_len].to_vec();
            let located = LocatedEocd {
                record,
                offset: search_start + i as u64,
                trailing: (available - comment_len) as u64,
            };
            if comment_len == available {
                return Self::finish(r, located);
            }
            if fallback.is_none() {
                fallback = Some(located);
            }
        }

        match fallback {
            Some(located) => Self::finish(r, located),
            None => Err(Error::InvalidFormat(
                "end of central directory record not found".into(),
            )),
        }
    }

    fn finish<R: Read + Seek>(r: &mut R, located: LocatedEocd) -> Result<LocatedEocd> {
        located.record.check_supported()?;

        if located.offset >= ZIP64_LOCATOR_SIZE {
            r.seek(SeekFrom::Start(located.offset - ZIP64_LOCATOR_SIZE))?;
            if r.read_u32::<LittleEndian>()? == ZIP64_LOCATOR_SIGNATURE {
                return Err(Error::UnsupportedFeature { feature: "ZIP64" });
            }
        }

        let cd_end = u64::from(located.record.cd_offset) + u64::from(located.record.cd_size);
        if cd_end > located.offset {
            return Err(Error::InvalidFormat(format!(
                "central directory [{:#x}, {:#x}) overlaps end record at {:#x}",
                located.record.cd_offset, cd_end, located.offset
            )));
        }
        Ok(located)
    }
}
