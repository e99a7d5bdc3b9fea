//! Moving entries: realignment and compaction.

use super::{Archive, read_at, write_at};
use crate::entry::EntryId;
use crate::{Error, Result};

impl Archive {
    /// Moves every entry whose data start violates its alignment rule.
    ///
    /// Waits for background tasks first. Entries that already satisfy their
    /// rule stay where they are, so a second call is a no-op. Returns `true`
    /// if anything moved.
    pub fn realign(&mut self) -> Result<bool> {
        self.ensure_open()?;
        self.drain_tasks();
        self.take_error()?;

        let mut moved = 0;
        for id in self.directory.ids_by_offset() {
            if self.realign_id(id)? {
                moved += 1;
            }
        }
        if moved > 0 {
            log::debug!("realigned {} entries", moved);
        }
        Ok(moved > 0)
    }

    /// Realigns a single entry. Returns `true` if it moved.
    ///
    /// An entry still pending compression is waited for first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EntryNotFound`] if no live entry has this name.
    pub fn realign_entry(&mut self, name: &str) -> Result<bool> {
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

        let id = self
            .directory
            .get(name)
            .map(|e| e.id)
            .ok_or_else(|| Error::entry_not_found(name))?;
        self.realign_id(id)
    }

    /// Packs entries towards the start of the file, closing the gaps left by
    /// deletions and replacements.
    ///
    /// Entries keep their alignment if they currently satisfy their rule.
    /// Returns `true` if anything moved.
    pub fn compact(&mut self) -> Result<bool> {
        self.ensure_open()?;
        self.drain_tasks();
        self.take_error()?;
        self.compact_entries()
    }

    pub(super) fn compact_entries(&mut self) -> Result<bool> {
        let before = self.map.used_end();
        let mut moved = 0;

        for id in self.directory.ids_by_offset() {
            let Some(entry) = self.directory.by_id(id) else {
                continue;
            };
            let rule = self.rules.boundary_for(&entry.name);
            let boundary = if entry.is_aligned_to(rule) { rule } else { 1 };
            let (start, end, skew) = (entry.offset, entry.end(), entry.local_header_len);

            let bytes = read_at(self.file()?, start, end - start)?;
            self.map.free(start);
            let target = self.map.allocate_aligned(end - start, boundary, skew, id);
            if target == start {
                continue;
            }

            if let Err(e) = write_at(self.file()?, target, &bytes) {
                self.map.free(target);
                self.map.reserve(start, end, id)?;
                return Err(e.into());
            }
            if let Some(slot) = self.directory.by_id_mut(id) {
                slot.offset = target;
            }
            self.dirty = true;
            moved += 1;
        }

        self.map.truncate_free_tail();
        if moved > 0 {
            log::debug!(
                "compacted {} entries, used end {:#x} -> {:#x}",
                moved,
                before,
                self.map.used_end()
            );
        }
        Ok(moved > 0)
    }

    fn realign_id(&mut self, id: EntryId) -> Result<bool> {
        let Some(entry) = self.directory.by_id(id) else {
            return Ok(false);
        };
        let boundary = self.rules.boundary_for(&entry.name);
        if entry.is_aligned_to(boundary) {
            return Ok(false);
        }
        self.relocate(id, boundary)?;
        Ok(true)
    }

    /// Copies an entry to a fresh aligned range and frees the old one.
    ///
    /// Local headers hold no offsets, so the bytes move verbatim.
    fn relocate(&mut self, id: EntryId, boundary: u64) -> Result<()> {
        let entry = self
            .directory
            .by_id(id)
            .ok_or_else(|| Error::Conflict(format!("entry {} vanished during move", id)))?;
        let (start, end, skew) = (entry.offset, entry.end(), entry.local_header_len);

        let bytes = read_at(self.file()?, start, end - start)?;
        let target = self.map.allocate_aligned(end - start, boundary, skew, id);
        if let Err(e) = write_at(self.file()?, target, &bytes) {
            self.map.free(target);
            return Err(e.into());
        }
        self.map.free(start);

        if let Some(slot) = self.directory.by_id_mut(id) {
            log::debug!(
                "moved '{}' from {:#x} to {:#x} (data at {:#x})",
                slot.name,
                start,
                target,
                target + skew
            );
            slot.offset = target;
        }
        self.dirty = true;
        Ok(())
    }
}
