//! Adding, replacing, and deleting entries.

use std::io::Read;

use super::{Archive, notify, read_at, write_at};
use crate::checksum::SourceData;
use crate::codec::CompressedPayload;
use crate::entry::StoredEntry;
use crate::task::CompressionTask;
use crate::{EntryName, Error, Result};

impl Archive {
    /// Adds an entry read from `source`, replacing any entry with the same
    /// name.
    ///
    /// The source is read to the end and checksummed on the calling thread.
    /// With `compress`, DEFLATE runs as a background task: the entry is
    /// visible immediately as pending, with its uncompressed size reserved
    /// in the file, and the call does not wait for compression. Without
    /// `compress` the data is stored and written before returning.
    ///
    /// The data start is placed on the boundary of the first matching
    /// alignment rule.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidEntryName`] if `name` is not a valid entry name
    /// - [`Error::Io`] if the source or the backing file fails
    /// - [`Error::Compression`] if compression ran inline and failed
    /// - any error returned by an observer, after the entry has been added
    pub fn add<R: Read>(&mut self, name: &str, source: R, compress: bool) -> Result<&StoredEntry> {
        self.ensure_open()?;
        self.add_entry(name, source, compress)
    }

    /// Body of [`add`](Self::add), also used for observer updates while
    /// closing.
    pub(super) fn add_entry<R: Read>(
        &mut self,
        name: &str,
        source: R,
        compress: bool,
    ) -> Result<&StoredEntry> {
        self.merge_finished();

        let name = EntryName::new(name)?;
        let SourceData { bytes: data, crc32 } = SourceData::read_from(source)?;

        if name.is_directory() && !data.is_empty() {
            return Err(Error::InvalidEntryName(format!(
                "directory entry '{}' cannot hold data",
                name
            )));
        }

        let id = self.allocate_id();
        let boundary = self.rules.boundary_for(name.as_str());
        let modified = self.options.entry_timestamp();

        let entry = if compress && !data.is_empty() {
            let mut entry = StoredEntry::pending(id, &name, crc32, data.len() as u64, modified);
            let size = entry.end();
            entry.offset = self
                .map
                .allocate_aligned(size, boundary, entry.local_header_len, id);

            let task = CompressionTask {
                id,
                name: name.to_string(),
                data,
                crc32,
                options: self.options.deflate_options(),
            };
            if let Err(e) = self.pool.submit(task) {
                self.map.free(entry.offset);
                return Err(e);
            }
            entry
        } else {
            let payload = CompressedPayload::stored(data, crc32);
            let mut entry = StoredEntry::ready(id, &name, &payload, modified);
            let size = entry.end();
            entry.offset = self
                .map
                .allocate_aligned(size, boundary, entry.local_header_len, id);

            if let Err(e) = self.write_entry(&entry, &payload.data) {
                self.map.free(entry.offset);
                return Err(e);
            }
            entry
        };

        log::debug!(
            "added '{}' at {:#x} (data at {:#x}, boundary {}, {})",
            entry.name,
            entry.offset,
            entry.data_offset(),
            boundary,
            if entry.is_pending() { "pending" } else { "stored" }
        );

        let replaced = self.directory.insert(entry);
        if let Some(old) = &replaced {
            self.map.free(old.offset);
            log::debug!("replaced previous '{}' at {:#x}", old.name, old.offset);
        }
        self.dirty = true;

        let notified = match self.directory.by_id(id) {
            Some(entry) => notify(&mut self.observers, |o| o.added(entry, replaced.as_ref())),
            None => Ok(()),
        };

        // Inline tasks have already finished; merging now makes the entry
        // ready before returning.
        if !self.pool.is_background() {
            self.merge_finished();
        }

        // An inline compression failure has already removed the entry.
        if self.directory.by_id(id).is_none() {
            self.take_error()?;
            return Err(Error::entry_not_found(name.as_str()));
        }
        notified?;
        self.directory
            .by_id(id)
            .ok_or_else(|| Error::entry_not_found(name.as_str()))
    }

    /// Adds an entry from a byte slice. See [`add`](Self::add).
    pub fn add_bytes(&mut self, name: &str, data: &[u8], compress: bool) -> Result<&StoredEntry> {
        self.add(name, data, compress)
    }

    /// Adds an empty directory entry. `name` must end with `/`.
    pub fn add_directory(&mut self, name: &str) -> Result<&StoredEntry> {
        if !name.ends_with('/') {
            return Err(Error::InvalidEntryName(format!(
                "directory name '{}' must end with '/'",
                name
            )));
        }
        self.add(name, std::io::empty(), false)
    }

    /// Deletes an entry.
    ///
    /// The entry is invisible to lookups as soon as this returns and its
    /// space is reusable by the next add. The bytes stay in the file until
    /// overwritten or compacted away.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EntryNotFound`] if no live entry has this name.
    pub fn delete(&mut self, name: &str) -> Result<()> {
        self.ensure_open()?;
        self.delete_entry(name)
    }

    pub(super) fn delete_entry(&mut self, name: &str) -> Result<()> {
        self.merge_finished();

        let removed = self
            .directory
            .remove(name)
            .ok_or_else(|| Error::entry_not_found(name))?;
        self.map.free(removed.offset);
        self.dirty = true;
        log::debug!(
            "deleted '{}', freed [{:#x}, {:#x})",
            removed.name,
            removed.offset,
            removed.end()
        );

        notify(&mut self.observers, |o| o.removed(&removed))
    }

    /// Copies entries of `other` into this archive.
    ///
    /// Encoded data is copied verbatim, without recompressing. Each copy gets
    /// a fresh local header and is placed according to this archive's
    /// alignment rules; an entry with the same name is replaced. `filter`
    /// selects which entries to copy. Returns the number copied.
    ///
    /// `other` has its background tasks drained first.
    pub fn merge_from<F>(&mut self, other: &mut Archive, mut filter: F) -> Result<usize>
    where
        F: FnMut(&StoredEntry) -> bool,
    {
        self.ensure_open()?;
        other.ensure_open()?;
        other.drain_tasks();
        other.take_error()?;
        self.merge_finished();

        let selected: Vec<StoredEntry> = other
            .directory
            .by_offset()
            .into_iter()
            .filter(|e| filter(*e))
            .cloned()
            .collect();

        let mut copied = 0;
        for source in &selected {
            let raw = read_at(other.file()?, source.data_offset(), source.compressed_size)?;

            let id = self.allocate_id();
            let mut entry = StoredEntry::copied_from(source, id);
            let boundary = self.rules.boundary_for(&entry.name);
            let size = entry.end();
            entry.offset = self
                .map
                .allocate_aligned(size, boundary, entry.local_header_len, id);
            if let Err(e) = self.write_entry(&entry, &raw) {
                self.map.free(entry.offset);
                return Err(e);
            }

            let replaced = self.directory.insert(entry);
            if let Some(old) = &replaced {
                self.map.free(old.offset);
            }
            self.dirty = true;
            copied += 1;

            if let Some(entry) = self.directory.by_id(id) {
                notify(&mut self.observers, |o| o.added(entry, replaced.as_ref()))?;
            }
        }

        log::debug!(
            "merged {} entries from {}",
            copied,
            other.path().display()
        );
        Ok(copied)
    }

    /// Writes the local header of `entry` followed by `data` at its offset.
    fn write_entry(&self, entry: &StoredEntry, data: &[u8]) -> Result<()> {
        let mut buf = entry.local_header()?.to_bytes();
        buf.extend_from_slice(data);
        write_at(self.file()?, entry.offset, &buf)?;
        Ok(())
    }
}
