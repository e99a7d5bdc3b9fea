//! Reading entry contents back.

use super::{Archive, read_at};
use crate::{checksum, codec};
use crate::{Error, Result};

impl Archive {
    /// Returns the extracted contents of an entry.
    ///
    /// An entry still pending compression is waited for first. The CRC-32 of
    /// the extracted data is verified.
    ///
    /// # Errors
    ///
    /// - [`Error::EntryNotFound`] if no live entry has this name
    /// - [`Error::CorruptHeader`] if the data cannot be decoded
    /// - [`Error::CrcMismatch`] if the checksum does not match
    pub fn read(&mut self, name: &str) -> Result<Vec<u8>> {
        let raw = self.read_raw(name)?;
        let entry = self
            .directory
            .get(name)
            .ok_or_else(|| Error::entry_not_found(name))?;

        let data = codec::decompress(entry.method, &raw, entry.uncompressed_size).map_err(|e| {
            Error::corrupt_header(
                entry.data_offset(),
                format!("cannot decode '{}': {}", entry.name, e),
            )
        })?;

        checksum::verify(&entry.name, entry.crc32, &data)?;
        Ok(data)
    }

    /// Returns the encoded bytes of an entry exactly as stored.
    pub fn read_raw(&mut self, name: &str) -> Result<Vec<u8>> {
        self.ensure_open()?;
        self.merge_finished();

        let pending = self
            .directory
            .get(name)
            .ok_or_else(|| Error::entry_not_found(name))?
            .is_pending();
        if pending {
            self.drain_tasks();
            self.take_error()?;
        }

        let entry = self
            .directory
            .get(name)
            .ok_or_else(|| Error::entry_not_found(name))?;
        Ok(read_at(self.file()?, entry.data_offset(), entry.compressed_size)?)
    }
}
