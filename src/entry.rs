//! In-memory representation of archive entries.

use std::fmt;
use std::ops::Range;

use crate::codec::CompressedPayload;
use crate::format::{
    self, CentralDirectoryHeader, CompressionMethod, LocalFileHeader, VERSION_DEFLATE,
    VERSION_MADE_BY,
};
use crate::timestamp::DosDateTime;
use crate::{EntryName, Error, Result};

/// Identity of one stored entry for the lifetime of an [`Archive`](crate::Archive).
///
/// Ids are never reused, so a background result for an entry that has been
/// deleted or replaced in the meantime can be recognized and discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryId(u64);

impl EntryId {
    /// Wraps a raw id.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw id.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryState {
    /// Added with deferred compression; the task has not been merged yet.
    /// Sizes are pre-compression estimates.
    PendingCompression,
    /// Data is written and every header field is final.
    Ready,
    /// Removed from the archive. Never visible through lookups.
    Deleted,
}

impl EntryState {
    /// Returns `true` for states visible through lookups.
    pub fn is_live(&self) -> bool {
        !matches!(self, EntryState::Deleted)
    }
}

/// One entry of the archive.
///
/// Holds the header fields and the position of the entry in the backing
/// file. The occupied range is `[offset, end())` and covers the local file
/// header, the data, and an optional data descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    pub(crate) id: EntryId,
    pub(crate) name: String,
    pub(crate) raw_name: Vec<u8>,
    pub(crate) state: EntryState,
    pub(crate) method: CompressionMethod,
    pub(crate) crc32: u32,
    pub(crate) compressed_size: u64,
    pub(crate) uncompressed_size: u64,
    pub(crate) offset: u64,
    pub(crate) local_header_len: u64,
    pub(crate) data_descriptor_len: u64,
    pub(crate) flags: u16,
    pub(crate) version_made_by: u16,
    pub(crate) version_needed: u16,
    pub(crate) modified: DosDateTime,
    pub(crate) local_extra: Vec<u8>,
    pub(crate) central_extra: Vec<u8>,
    pub(crate) comment: Vec<u8>,
    pub(crate) internal_attrs: u16,
    pub(crate) external_attrs: u32,
}

impl StoredEntry {
    fn new(id: EntryId, name: &EntryName, modified: DosDateTime) -> Self {
        let name = name.as_str();
        Self {
            id,
            name: name.to_string(),
            raw_name: name.as_bytes().to_vec(),
            state: EntryState::Ready,
            method: CompressionMethod::Stored,
            crc32: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            offset: 0,
            local_header_len: (LocalFileHeader::FIXED_SIZE + name.len()) as u64,
            data_descriptor_len: 0,
            flags: format::flags_for_name(name),
            version_made_by: VERSION_MADE_BY,
            version_needed: VERSION_DEFLATE,
            modified,
            local_extra: Vec::new(),
            central_extra: Vec::new(),
            comment: Vec::new(),
            internal_attrs: 0,
            external_attrs: 0,
        }
    }

    /// Creates an entry whose data is already encoded.
    pub(crate) fn ready(
        id: EntryId,
        name: &EntryName,
        payload: &CompressedPayload,
        modified: DosDateTime,
    ) -> Self {
        let mut entry = Self::new(id, name, modified);
        entry.apply_payload(payload);
        if name.is_directory() {
            entry.version_needed = VERSION_DEFLATE;
            entry.external_attrs = 0x10;
        }
        entry
    }

    /// Creates an entry whose compression has been deferred.
    ///
    /// Until the task is merged the entry claims its uncompressed size as
    /// compressed size, which is the most space the encoded data can take.
    pub(crate) fn pending(
        id: EntryId,
        name: &EntryName,
        crc32: u32,
        uncompressed_size: u64,
        modified: DosDateTime,
    ) -> Self {
        let mut entry = Self::new(id, name, modified);
        entry.state = EntryState::PendingCompression;
        entry.method = CompressionMethod::Deflate;
        entry.crc32 = crc32;
        entry.compressed_size = uncompressed_size;
        entry.uncompressed_size = uncompressed_size;
        entry
    }

    /// Rebuilds an entry read from an existing archive.
    pub(crate) fn from_headers(
        id: EntryId,
        central: CentralDirectoryHeader,
        local: &LocalFileHeader,
        data_descriptor_len: u64,
    ) -> Result<Self> {
        let method = CompressionMethod::from_code(central.method)?;
        Ok(Self {
            id,
            name: format::decode_name(&central.name),
            raw_name: central.name,
            state: EntryState::Ready,
            method,
            crc32: central.crc32,
            compressed_size: u64::from(central.compressed_size),
            uncompressed_size: u64::from(central.uncompressed_size),
            offset: u64::from(central.local_header_offset),
            local_header_len: local.len(),
            data_descriptor_len,
            flags: central.flags,
            version_made_by: central.version_made_by,
            version_needed: central.version_needed,
            modified: central.modified,
            local_extra: local.extra.clone(),
            central_extra: central.extra,
            comment: central.comment,
            internal_attrs: central.internal_attrs,
            external_attrs: central.external_attrs,
        })
    }

    /// Copies a ready entry of another archive under a new id.
    ///
    /// The copy gets a fresh local header without extra field or data
    /// descriptor; the encoded data itself is reused as-is.
    pub(crate) fn copied_from(other: &StoredEntry, id: EntryId) -> Self {
        Self {
            id,
            name: other.name.clone(),
            raw_name: other.raw_name.clone(),
            state: EntryState::Ready,
            method: other.method,
            crc32: other.crc32,
            compressed_size: other.compressed_size,
            uncompressed_size: other.uncompressed_size,
            offset: 0,
            local_header_len: (LocalFileHeader::FIXED_SIZE + other.raw_name.len()) as u64,
            data_descriptor_len: 0,
            flags: other.flags & !format::FLAG_DATA_DESCRIPTOR,
            version_made_by: other.version_made_by,
            version_needed: other.version_needed,
            modified: other.modified,
            local_extra: Vec::new(),
            central_extra: other.central_extra.clone(),
            comment: other.comment.clone(),
            internal_attrs: other.internal_attrs,
            external_attrs: other.external_attrs,
        }
    }

    /// Takes the method, checksum, and sizes of an encoded payload and marks
    /// the entry ready.
    pub(crate) fn apply_payload(&mut self, payload: &CompressedPayload) {
        self.method = payload.method;
        self.crc32 = payload.crc32;
        self.compressed_size = payload.compressed_size();
        self.uncompressed_size = payload.uncompressed_size;
        self.version_needed = payload.method.version_needed();
        self.state = EntryState::Ready;
    }

    /// Unique id within the owning archive.
    pub fn id(&self) -> EntryId {
        self.id
    }

    /// Archive-relative path.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw name bytes as stored in the headers.
    pub fn raw_name(&self) -> &[u8] {
        &self.raw_name
    }

    /// Lifecycle state.
    pub fn state(&self) -> EntryState {
        self.state
    }

    /// Returns `true` while compression is still pending.
    pub fn is_pending(&self) -> bool {
        self.state == EntryState::PendingCompression
    }

    /// Returns `true` for directory entries.
    pub fn is_directory(&self) -> bool {
        self.name.ends_with('/')
    }

    /// Compression method. Tentative while pending.
    pub fn method(&self) -> CompressionMethod {
        self.method
    }

    /// CRC-32 of the uncompressed data.
    pub fn crc32(&self) -> u32 {
        self.crc32
    }

    /// Size of the encoded data. An upper bound while pending.
    pub fn compressed_size(&self) -> u64 {
        self.compressed_size
    }

    /// Size of the data after extraction.
    pub fn uncompressed_size(&self) -> u64 {
        self.uncompressed_size
    }

    /// Offset of the local file header.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Length of the local file header.
    pub fn local_header_len(&self) -> u64 {
        self.local_header_len
    }

    /// Offset of the first data byte.
    pub fn data_offset(&self) -> u64 {
        self.offset + self.local_header_len
    }

    /// One past the last byte occupied by the entry.
    pub fn end(&self) -> u64 {
        self.data_offset() + self.compressed_size + self.data_descriptor_len
    }

    /// The occupied byte range.
    pub fn range(&self) -> Range<u64> {
        self.offset..self.end()
    }

    /// Returns `true` if a data descriptor follows the data.
    pub fn has_data_descriptor(&self) -> bool {
        self.data_descriptor_len > 0
    }

    /// General purpose bit flags.
    pub fn flags(&self) -> u16 {
        self.flags
    }

    /// Last modification time.
    pub fn modified(&self) -> DosDateTime {
        self.modified
    }

    /// Entry comment bytes.
    pub fn comment(&self) -> &[u8] {
        &self.comment
    }

    /// External file attributes.
    pub fn external_attrs(&self) -> u32 {
        self.external_attrs
    }

    /// Returns `true` if the data starts on a multiple of `boundary`.
    pub fn is_aligned_to(&self, boundary: u64) -> bool {
        boundary <= 1 || self.data_offset() % boundary == 0
    }

    /// Builds the local file header for writing.
    pub(crate) fn local_header(&self) -> Result<LocalFileHeader> {
        let (compressed_size, uncompressed_size) = self.sizes_32()?;
        let descriptor = self.flags & format::FLAG_DATA_DESCRIPTOR != 0;
        Ok(LocalFileHeader {
            version_needed: self.version_needed,
            flags: self.flags,
            method: self.method.code(),
            modified: self.modified,
            crc32: if descriptor { 0 } else { self.crc32 },
            compressed_size: if descriptor { 0 } else { compressed_size },
            uncompressed_size: if descriptor { 0 } else { uncompressed_size },
            name: self.raw_name.clone(),
            extra: self.local_extra.clone(),
        })
    }

    /// Builds the central directory record.
    pub(crate) fn central_header(&self) -> Result<CentralDirectoryHeader> {
        let (compressed_size, uncompressed_size) = self.sizes_32()?;
        if self.offset > format::MAX_32 {
            return Err(Error::UnsupportedFeature { feature: "ZIP64" });
        }
        Ok(CentralDirectoryHeader {
            version_made_by: self.version_made_by,
            version_needed: self.version_needed,
            flags: self.flags,
            method: self.method.code(),
            modified: self.modified,
            crc32: self.crc32,
            compressed_size,
            uncompressed_size,
            disk_start: 0,
            internal_attrs: self.internal_attrs,
            external_attrs: self.external_attrs,
            local_header_offset: self.offset as u32,
            name: self.raw_name.clone(),
            extra: self.central_extra.clone(),
            comment: self.comment.clone(),
        })
    }

    fn sizes_32(&self) -> Result<(u32, u32)> {
        if self.compressed_size > format::MAX_32 || self.uncompressed_size > format::MAX_32 {
            return Err(Error::UnsupportedFeature { feature: "ZIP64" });
        }
        Ok((self.compressed_size as u32, self.uncompressed_size as u32))
    }
}
