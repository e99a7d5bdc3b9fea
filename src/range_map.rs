//! Free/used byte-range bookkeeping for the backing file.
//!
//! [`ByteRangeMap`] tiles `[0, len)` with disjoint ranges, each either free
//! or owned by one entry. Free space is an explicit range, never an absence,
//! so the map always accounts for every byte of the file. Two free ranges are
//! never adjacent: freeing coalesces with free neighbours.
//!
//! Allocation is first-fit over free ranges in ascending offset order. When
//! nothing fits, the file grows: from the start of a trailing free range if
//! there is one, otherwise from the end of the file. Allocation never fails.
//!
//! ```text
//! 0        986            1024       1062                 len
//! | free   | header 38 B  | data ... | free               |
//!          ^ allocate_aligned(size, 1024, 38) returns 986
//! ```
//!
//! The map holds only entry ids; the entries themselves live in the
//! [`CentralDirectory`](crate::CentralDirectory).

use std::collections::BTreeMap;

use crate::entry::EntryId;
use crate::{Error, Result};

/// Who a range belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RangeOwner {
    /// Unused space, available for allocation.
    Free,
    /// Occupied by the local header, data, and data descriptor of an entry.
    Entry(EntryId),
}

/// A half-open byte range `[start, end)` of the backing file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    /// First byte of the range.
    pub start: u64,
    /// One past the last byte.
    pub end: u64,
    /// Owner of the bytes.
    pub owner: RangeOwner,
}

impl ByteRange {
    /// Length in bytes.
    #[inline]
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    /// Returns `true` if the range is free.
    #[inline]
    pub fn is_free(&self) -> bool {
        self.owner == RangeOwner::Free
    }

    /// Returns the owning entry, if any.
    pub fn entry(&self) -> Option<EntryId> {
        match self.owner {
            RangeOwner::Free => None,
            RangeOwner::Entry(id) => Some(id),
        }
    }
}

/// Ordered arena of ranges covering the backing file.
#[derive(Debug, Clone, Default)]
pub struct ByteRangeMap {
    ranges: BTreeMap<u64, ByteRange>,
    len: u64,
}

/// Rounds `value` up to a multiple of `boundary`.
#[inline]
fn align_up(value: u64, boundary: u64) -> u64 {
    match value % boundary {
        0 => value,
        rem => value + (boundary - rem),
    }
}

/// Smallest `c >= from` such that `(c + skew) % boundary == 0`.
#[inline]
fn aligned_start(from: u64, boundary: u64, skew: u64) -> u64 {
    align_up(from + skew, boundary) - skew
}

impl ByteRangeMap {
    /// Creates an empty map for an empty file.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a map for a file of `len` bytes that are all free.
    pub fn with_len(len: u64) -> Self {
        let mut map = Self::new();
        if len > 0 {
            map.insert(0, len, RangeOwner::Free);
            map.len = len;
        }
        map
    }

    /// Tracked file length.
    #[inline]
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Returns `true` if the map covers no bytes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// End of the last owned range, or 0 if nothing is owned.
    pub fn used_end(&self) -> u64 {
        self.ranges
            .values()
            .rev()
            .find(|r| !r.is_free())
            .map_or(0, |r| r.end)
    }

    /// Total number of free bytes.
    pub fn free_bytes(&self) -> u64 {
        self.free_ranges().map(|r| r.len()).sum()
    }

    /// Iterates over all ranges in ascending offset order.
    pub fn iter(&self) -> impl Iterator<Item = &ByteRange> {
        self.ranges.values()
    }

    /// Iterates over free ranges in ascending offset order.
    pub fn free_ranges(&self) -> impl Iterator<Item = &ByteRange> {
        self.ranges.values().filter(|r| r.is_free())
    }

    /// Iterates over owned ranges in ascending offset order.
    pub fn owned_ranges(&self) -> impl Iterator<Item = &ByteRange> {
        self.ranges.values().filter(|r| !r.is_free())
    }

    /// Returns the range starting exactly at `start`.
    pub fn get(&self, start: u64) -> Option<&ByteRange> {
        self.ranges.get(&start)
    }

    /// Returns the range containing byte `offset`.
    pub fn range_containing(&self, offset: u64) -> Option<&ByteRange> {
        self.ranges
            .range(..=offset)
            .next_back()
            .map(|(_, r)| r)
            .filter(|r| offset < r.end)
    }

    /// Allocates `size` bytes for `owner` in the lowest free range that fits.
    pub fn allocate(&mut self, size: u64, owner: EntryId) -> u64 {
        self.allocate_aligned(size, 1, 0, owner)
    }

    /// Allocates `size` bytes for `owner` such that `start + skew` is a
    /// multiple of `boundary`.
    ///
    /// `skew` is the position inside the allocation that must be aligned; for
    /// an entry it is the length of its local header, so the data lands on
    /// the boundary. Bytes skipped to reach alignment stay free. A
    /// `boundary` of 0 is treated as 1.
    pub fn allocate_aligned(&mut self, size: u64, boundary: u64, skew: u64, owner: EntryId) -> u64 {
        debug_assert!(size > 0, "zero-sized allocation");
        let boundary = boundary.max(1);

        let fit = self
            .free_ranges()
            .map(|r| (r.start, aligned_start(r.start, boundary, skew), r.end))
            .find(|&(_, candidate, end)| candidate + size <= end);

        let start = match fit {
            Some((range_start, candidate, _)) => {
                self.carve(range_start, candidate, size, owner);
                candidate
            }
            None => self.grow(size, boundary, skew, owner),
        };

        log::trace!(
            "allocated [{}, {}) for entry {} (boundary {}, skew {})",
            start,
            start + size,
            owner,
            boundary,
            skew
        );
        start
    }

    /// Splits the free range at `range_start` so that `[start, start + size)`
    /// belongs to `owner`.
    fn carve(&mut self, range_start: u64, start: u64, size: u64, owner: EntryId) {
        let Some(free) = self.ranges.remove(&range_start) else {
            return;
        };
        debug_assert!(free.is_free());
        if free.start < start {
            self.insert(free.start, start, RangeOwner::Free);
        }
        self.insert(start, start + size, RangeOwner::Entry(owner));
        if start + size < free.end {
            self.insert(start + size, free.end, RangeOwner::Free);
        }
    }

    /// Extends the file to fit an allocation that no free range could hold.
    fn grow(&mut self, size: u64, boundary: u64, skew: u64, owner: EntryId) -> u64 {
        let base = match self.ranges.values().next_back() {
            Some(last) if last.is_free() => {
                let start = last.start;
                self.ranges.remove(&start);
                start
            }
            _ => self.len,
        };

        let start = aligned_start(base, boundary, skew);
        if base < start {
            self.insert(base, start, RangeOwner::Free);
        }
        self.insert(start, start + size, RangeOwner::Entry(owner));
        self.len = start + size;
        start
    }

    /// Frees the owned range starting at `start`, coalescing with free
    /// neighbours. Returns the range as it was before being freed.
    pub fn free(&mut self, start: u64) -> Option<ByteRange> {
        let range = *self.ranges.get(&start)?;
        if range.is_free() {
            return None;
        }
        self.ranges.remove(&start);
        self.insert_free_coalesced(range.start, range.end);
        log::trace!("freed [{}, {})", range.start, range.end);
        Some(range)
    }

    /// Shrinks the owned range at `start` to `new_len` bytes, freeing the tail.
    pub fn shrink(&mut self, start: u64, new_len: u64) {
        let Some(range) = self.ranges.get_mut(&start) else {
            return;
        };
        if range.is_free() || new_len == 0 || new_len >= range.len() {
            return;
        }
        let old_end = range.end;
        range.end = start + new_len;
        self.insert_free_coalesced(start + new_len, old_end);
    }

    /// Marks `[start, end)` as owned by `owner`.
    ///
    /// Used when rebuilding the map for an existing file: the whole file
    /// starts free and every entry found in the central directory reserves
    /// its bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CorruptHeader`] if the range is empty, extends past
    /// the end of the file, or overlaps a range already reserved.
    pub fn reserve(&mut self, start: u64, end: u64, owner: EntryId) -> Result<()> {
        if start >= end || end > self.len {
            return Err(Error::corrupt_header(
                start,
                format!(
                    "entry range [{}, {}) outside file of {} bytes",
                    start, end, self.len
                ),
            ));
        }
        let free = match self.range_containing(start) {
            Some(r) if r.is_free() && end <= r.end => *r,
            _ => {
                return Err(Error::corrupt_header(
                    start,
                    format!("entry range [{}, {}) overlaps another entry", start, end),
                ));
            }
        };
        self.carve(free.start, start, end - start, owner);
        Ok(())
    }

    /// Drops trailing free space and returns the new length.
    pub fn truncate_free_tail(&mut self) -> u64 {
        if let Some(last) = self.ranges.values().next_back().copied() {
            if last.is_free() {
                self.ranges.remove(&last.start);
                self.len = last.start;
            }
        }
        self.len
    }

    fn insert(&mut self, start: u64, end: u64, owner: RangeOwner) {
        self.ranges.insert(start, ByteRange { start, end, owner });
    }

    fn insert_free_coalesced(&mut self, mut start: u64, mut end: u64) {
        if let Some(prev) = self
            .ranges
            .range(..start)
            .next_back()
            .map(|(_, r)| *r)
            .filter(|r| r.is_free() && r.end == start)
        {
            self.ranges.remove(&prev.start);
            start = prev.start;
        }
        if let Some(next) = self.ranges.get(&end).copied().filter(|r| r.is_free()) {
            self.ranges.remove(&next.start);
            end = next.end;
        }
        self.insert(start, end, RangeOwner::Free);
    }

    /// Checks the tiling invariants. Returns a description of the first
    /// violation found.
    pub fn check(&self) -> std::result::Result<(), String> {
        let mut expected = 0;
        let mut prev_free = false;
        for (key, r) in &self.ranges {
            if *key != r.start {
                return Err(format!("range keyed at {} starts at {}", key, r.start));
            }
            if r.start != expected {
                return Err(format!("gap or overlap at {}", expected));
            }
            if r.start >= r.end {
                return Err(format!("empty range at {}", r.start));
            }
            if prev_free && r.is_free() {
                return Err(format!("uncoalesced free range at {}", r.start));
            }
            prev_free = r.is_free();
            expected = r.end;
        }
        if expected != self.len {
            return Err(format!("ranges end at {}, file length {}", expected, self.len));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u64) -> EntryId {
        EntryId::new(n)
    }

    #[test]
    fn test_grows_when_empty() {
        let mut map = ByteRangeMap::new();
        assert_eq!(map.allocate(10, id(1)), 0);
        assert_eq!(map.allocate(5, id(2)), 10);
        assert_eq!(map.len(), 15);
        assert_eq!(map.used_end(), 15);
        map.check().unwrap();
    }

    #[test]
    fn test_first_fit_reuses_gap() {
        let mut map = ByteRangeMap::new();
        let a = map.allocate(100, id(1));
        map.allocate(100, id(2));
        map.free(a).unwrap();

        assert_eq!(map.allocate(40, id(3)), 0);
        assert_eq!(map.allocate(60, id(4)), 40);
        assert_eq!(map.len(), 200);
        assert_eq!(map.free_bytes(), 0);
        map.check().unwrap();
    }

    #[test]
    fn test_free_coalesces_both_sides() {
        let mut map = ByteRangeMap::new();
        let a = map.allocate(10, id(1));
        let b = map.allocate(10, id(2));
        let c = map.allocate(10, id(3));
        map.allocate(10, id(4));
        map.free(a);
        map.free(c);
        map.free(b);
        let free: Vec<_> = map.free_ranges().copied().collect();
        assert_eq!(free.len(), 1);
        assert_eq!((free[0].start, free[0].end), (0, 30));
        map.check().unwrap();
    }

    #[test]
    fn test_free_unknown_is_none() {
        let mut map = ByteRangeMap::with_len(50);
        assert!(map.free(0).is_none());
        assert!(map.free(7).is_none());
    }

    #[test]
    fn test_aligned_padding_stays_free() {
        let mut map = ByteRangeMap::new();
        let start = map.allocate_aligned(100, 1024, 38, id(1));
        assert_eq!(start, 986);
        assert_eq!((start + 38) % 1024, 0);
        let first = map.get(0).unwrap();
        assert!(first.is_free());
        assert_eq!(first.end, 986);
        map.check().unwrap();
    }

    #[test]
    fn test_aligned_uses_gap_when_possible() {
        let mut map = ByteRangeMap::with_len(4096);
        map.reserve(0, 10, id(1)).unwrap();
        let start = map.allocate_aligned(16, 512, 0, id(2));
        assert_eq!(start, 512);
        assert_eq!(map.len(), 4096);
        map.check().unwrap();
    }

    #[test]
    fn test_aligned_grows_from_trailing_free_range() {
        let mut map = ByteRangeMap::new();
        map.allocate(126, id(1));
        let tail = map.allocate(132, id(2));
        map.free(tail);
        assert_eq!(map.len(), 258);

        let start = map.allocate_aligned(52, 1024, 39, id(3));
        assert_eq!(start, 985);
        assert_eq!(map.len(), 1037);
        map.check().unwrap();
    }

    #[test]
    fn test_boundary_zero_means_unaligned() {
        let mut map = ByteRangeMap::new();
        assert_eq!(map.allocate_aligned(3, 0, 0, id(1)), 0);
        assert_eq!(map.allocate_aligned(3, 0, 0, id(2)), 3);
    }

    #[test]
    fn test_shrink_frees_tail_and_merges() {
        let mut map = ByteRangeMap::new();
        let a = map.allocate(100, id(1));
        let b = map.allocate(50, id(2));
        map.free(b);
        map.shrink(a, 30);
        assert_eq!(map.get(a).unwrap().end, 30);
        let tail = map.get(30).unwrap();
        assert!(tail.is_free());
        assert_eq!(tail.end, 150);
        assert_eq!(map.truncate_free_tail(), 30);
        map.check().unwrap();
    }

    #[test]
    fn test_reserve_detects_overlap() {
        let mut map = ByteRangeMap::with_len(100);
        map.reserve(10, 20, id(1)).unwrap();
        assert!(map.reserve(15, 25, id(2)).is_err());
        assert!(map.reserve(5, 11, id(2)).is_err());
        assert!(map.reserve(90, 101, id(2)).is_err());
        assert!(map.reserve(20, 20, id(2)).is_err());
        map.reserve(20, 30, id(2)).unwrap();
        map.check().unwrap();
        assert_eq!(map.used_end(), 30);
    }

    #[test]
    fn test_range_containing() {
        let mut map = ByteRangeMap::with_len(100);
        map.reserve(10, 20, id(7)).unwrap();
        assert_eq!(map.range_containing(15).unwrap().entry(), Some(id(7)));
        assert!(map.range_containing(20).unwrap().is_free());
        assert!(map.range_containing(100).is_none());
    }
}
