//! The authoritative set of live entries.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::entry::{EntryId, EntryState, StoredEntry};
use crate::format::{self, EndOfCentralDirectory};
use crate::{Error, Result};

/// Live entries of an archive, looked up by path.
///
/// Deleted entries are removed immediately, so every entry held here is
/// either ready or pending compression. Iteration is in path order; the
/// serialized central directory is in offset order.
#[derive(Debug, Clone, Default)]
pub struct CentralDirectory {
    entries: HashMap<EntryId, StoredEntry>,
    by_name: BTreeMap<String, EntryId>,
}

impl CentralDirectory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// Returns `true` if there are no live entries.
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Looks up an entry by path.
    pub fn get(&self, name: &str) -> Option<&StoredEntry> {
        self.by_name.get(name).and_then(|id| self.entries.get(id))
    }

    /// Looks up an entry by id.
    pub fn by_id(&self, id: EntryId) -> Option<&StoredEntry> {
        self.entries.get(&id)
    }

    pub(crate) fn by_id_mut(&mut self, id: EntryId) -> Option<&mut StoredEntry> {
        self.entries.get_mut(&id)
    }

    /// Returns `true` if a live entry has this path.
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Inserts an entry, returning the entry it replaced (marked deleted).
    pub(crate) fn insert(&mut self, entry: StoredEntry) -> Option<StoredEntry> {
        let replaced = self.remove(&entry.name);
        self.by_name.insert(entry.name.clone(), entry.id);
        self.entries.insert(entry.id, entry);
        replaced
    }

    /// Removes the entry with this path, returning it marked deleted.
    pub(crate) fn remove(&mut self, name: &str) -> Option<StoredEntry> {
        let id = self.by_name.remove(name)?;
        let mut entry = self.entries.remove(&id)?;
        entry.state = EntryState::Deleted;
        Some(entry)
    }

    /// Set of live paths.
    pub fn names(&self) -> BTreeSet<String> {
        self.by_name.keys().cloned().collect()
    }

    /// Iterates over live entries in path order.
    pub fn iter(&self) -> impl Iterator<Item = &StoredEntry> {
        self.by_name.values().filter_map(|id| self.entries.get(id))
    }

    /// Live entries sorted by ascending offset.
    pub fn by_offset(&self) -> Vec<&StoredEntry> {
        let mut entries: Vec<_> = self.entries.values().collect();
        entries.sort_by_key(|e| (e.offset, e.id));
        entries
    }

    /// Ids of live entries sorted by ascending offset.
    pub(crate) fn ids_by_offset(&self) -> Vec<EntryId> {
        self.by_offset().into_iter().map(|e| e.id).collect()
    }

    /// Number of entries still pending compression.
    pub fn pending_count(&self) -> usize {
        self.entries.values().filter(|e| e.is_pending()).count()
    }

    /// Encodes the central directory records followed by the end record.
    ///
    /// `cd_offset` is where the first record will be written.
    ///
    /// # Errors
    ///
    /// - [`Error::Conflict`] if an entry is still pending compression
    /// - [`Error::UnsupportedFeature`] if the archive would need ZIP64
    pub fn serialize(&self, cd_offset: u64, comment: &[u8]) -> Result<Vec<u8>> {
        if self.len() > format::MAX_ENTRIES {
            return Err(Error::UnsupportedFeature { feature: "ZIP64" });
        }

        let mut out = Vec::new();
        for entry in self.by_offset() {
            if entry.is_pending() {
                return Err(Error::Conflict(format!(
                    "entry '{}' is still pending compression",
                    entry.name
                )));
            }
            entry.central_header()?.write_to(&mut out)?;
        }

        let cd_size = out.len() as u64;
        if cd_offset > format::MAX_32 || cd_size > format::MAX_32 {
            return Err(Error::UnsupportedFeature { feature: "ZIP64" });
        }

        EndOfCentralDirectory::new(
            self.len() as u16,
            cd_size as u32,
            cd_offset as u32,
            comment.to_vec(),
        )
        .write_to(&mut out)?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CompressedPayload;
    use crate::format::CentralDirectoryHeader;
    use crate::timestamp::DosDateTime;
    use crate::EntryName;

    fn entry(id: u64, name: &str, offset: u64) -> StoredEntry {
        let payload = CompressedPayload::stored(name.as_bytes().to_vec(), 0);
        let mut e = StoredEntry::ready(
            EntryId::new(id),
            &EntryName::new(name).unwrap(),
            &payload,
            DosDateTime::ZERO,
        );
        e.offset = offset;
        e
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut cd = CentralDirectory::new();
        assert!(cd.insert(entry(1, "b.txt", 0)).is_none());
        assert!(cd.insert(entry(2, "a.txt", 100)).is_none());
        assert_eq!(cd.len(), 2);
        assert_eq!(cd.get("a.txt").unwrap().id(), EntryId::new(2));
        assert_eq!(cd.by_id(EntryId::new(1)).unwrap().name(), "b.txt");
        assert!(cd.get("c.txt").is_none());
        let names: Vec<_> = cd.iter().map(|e| e.name()).collect();
        assert_eq!(names, ["a.txt", "b.txt"]);
    }

    #[test]
    fn test_replace_returns_old_entry() {
        let mut cd = CentralDirectory::new();
        cd.insert(entry(1, "a.txt", 0));
        let old = cd.insert(entry(2, "a.txt", 50)).unwrap();
        assert_eq!(old.id(), EntryId::new(1));
        assert_eq!(old.state(), EntryState::Deleted);
        assert_eq!(cd.len(), 1);
        assert!(cd.by_id(EntryId::new(1)).is_none());
    }

    #[test]
    fn test_remove_is_immediately_invisible() {
        let mut cd = CentralDirectory::new();
        cd.insert(entry(1, "a.txt", 0));
        let removed = cd.remove("a.txt").unwrap();
        assert_eq!(removed.state(), EntryState::Deleted);
        assert!(cd.get("a.txt").is_none());
        assert!(!cd.contains("a.txt"));
        assert!(cd.remove("a.txt").is_none());
    }

    #[test]
    fn test_serialize_in_offset_order() {
        let mut cd = CentralDirectory::new();
        cd.insert(entry(1, "z.txt", 0));
        cd.insert(entry(2, "a.txt", 500));
        let bytes = cd.serialize(1000, b"hi").unwrap();

        let headers = CentralDirectoryHeader::parse_all(&bytes, 1000, 2).unwrap();
        assert_eq!(headers[0].name, b"z.txt");
        assert_eq!(headers[1].local_header_offset, 500);

        let cd_size: u64 = headers.iter().map(|h| h.len()).sum();
        let eocd = &bytes[cd_size as usize..];
        assert_eq!(eocd.len(), EndOfCentralDirectory::SIZE + 2);
        assert_eq!(&eocd[..4], b"PK\x05\x06");
        assert_eq!(u32::from_le_bytes([eocd[16], eocd[17], eocd[18], eocd[19]]), 1000);
    }

    #[test]
    fn test_serialize_rejects_pending() {
        let mut cd = CentralDirectory::new();
        cd.insert(StoredEntry::pending(
            EntryId::new(1),
            &EntryName::new("p.bin").unwrap(),
            0,
            10,
            DosDateTime::ZERO,
        ));
        assert_eq!(cd.pending_count(), 1);
        assert!(cd.serialize(0, b"").unwrap_err().is_conflict());
    }
}
