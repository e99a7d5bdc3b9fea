//! The archive engine.
//!
//! [`Archive`] keeps a ZIP file on disk as a live data structure. Entries
//! are added, deleted, and moved in place; the central directory is only
//! written when the archive is closed.
//!
//! # Example
//!
//! ```rust,no_run
//! use zipweave::{AlignmentRule, Archive};
//!
//! let mut archive = Archive::open("app.zip")?;
//! archive
//!     .alignment_rules_mut()?
//!     .add(AlignmentRule::suffix(".so", 4096)?);
//!
//! archive.add_bytes("lib/arm64-v8a/libapp.so", &[0u8; 10_000], false)?;
//! archive.add_bytes("classes.dex", &[1u8; 10_000], true)?;
//! archive.delete("stale.txt").ok();
//!
//! archive.close()?;
//! # Ok::<(), zipweave::Error>(())
//! ```
//!
//! # Concurrency
//!
//! All operations run on the calling thread and take `&mut self`, which is
//! the exclusive lock over the range map and the directory. Only deferred
//! compression runs elsewhere: its results come back over a channel and are
//! merged at the start of the next mutating call, or at a barrier
//! ([`finish_all_background_tasks`](Archive::finish_all_background_tasks),
//! [`close`](Archive::close)).
//!
//! # Lifecycle
//!
//! `Open` → any number of mutations → `Closing` (draining tasks) →
//! `Closed`. Once closed, every operation fails with
//! [`Error::ArchiveClosed`]; only [`state`](Archive::state),
//! [`path`](Archive::path), [`options`](Archive::options),
//! [`diagnostics`](Archive::diagnostics), [`is_dirty`](Archive::is_dirty)
//! and [`pending_tasks`](Archive::pending_tasks) stay readable. A failed
//! close returns the archive to `Open` so the caller can retry.
//!
//! # Writing out
//!
//! Closing a modified archive first asks every observer for last-minute
//! changes ([`ArchiveObserver::before_update`]), applies them, and then
//! writes the central directory after the last entry, separated from it by
//! the extra directory block if one is set
//! ([`set_extra_directory_block`](Archive::set_extra_directory_block)).

mod content;
mod diagnostics;
mod mutate;
mod open;
mod realign;

pub use diagnostics::Diagnostics;

use std::collections::{BTreeSet, VecDeque};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::align::AlignmentRules;
use crate::directory::CentralDirectory;
use crate::entry::{EntryId, StoredEntry};
use crate::observer::{ArchiveObserver, Update};
use crate::options::ArchiveOptions;
use crate::range_map::ByteRangeMap;
use crate::task::{CompressionPool, TaskOutcome};
use crate::{Error, Result};

/// Lifecycle state of an [`Archive`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveState {
    /// Accepting operations.
    Open,
    /// `close()` is draining background work.
    Closing,
    /// Closed; every operation fails.
    Closed,
}

/// A ZIP archive open for incremental modification.
pub struct Archive {
    path: PathBuf,
    file: Option<File>,
    state: ArchiveState,
    options: ArchiveOptions,
    rules: AlignmentRules,
    directory: CentralDirectory,
    map: ByteRangeMap,
    pool: CompressionPool,
    unmerged: Vec<TaskOutcome>,
    errors: VecDeque<Error>,
    observers: Vec<Box<dyn ArchiveObserver>>,
    comment: Vec<u8>,
    extra_block: Vec<u8>,
    next_id: u64,
    dirty: bool,
    diagnostics: Diagnostics,
}

impl std::fmt::Debug for Archive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Archive")
            .field("path", &self.path)
            .field("state", &self.state)
            .field("entries", &self.directory.len())
            .field("pending", &self.pool.outstanding())
            .field("dirty", &self.dirty)
            .finish_non_exhaustive()
    }
}

impl Archive {
    /// Current lifecycle state.
    pub fn state(&self) -> ArchiveState {
        self.state
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Options the archive was opened with.
    pub fn options(&self) -> &ArchiveOptions {
        &self.options
    }

    /// Looks up a live entry.
    ///
    /// Entries pending compression are visible, with pre-compression sizes.
    /// Never blocks.
    pub fn get(&self, name: &str) -> Result<Option<&StoredEntry>> {
        self.ensure_open()?;
        Ok(self.directory.get(name))
    }

    /// Returns `true` if a live entry has this name.
    pub fn contains(&self, name: &str) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.directory.contains(name))
    }

    /// Names of all live entries.
    pub fn names(&self) -> Result<BTreeSet<String>> {
        self.ensure_open()?;
        Ok(self.directory.names())
    }

    /// Iterates over live entries in name order.
    pub fn entries(&self) -> Result<impl Iterator<Item = &StoredEntry>> {
        self.ensure_open()?;
        Ok(self.directory.iter())
    }

    /// Number of live entries.
    pub fn len(&self) -> Result<usize> {
        self.ensure_open()?;
        Ok(self.directory.len())
    }

    /// Returns `true` if the archive has no live entries.
    pub fn is_empty(&self) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.directory.is_empty())
    }

    /// The entry set.
    pub fn directory(&self) -> Result<&CentralDirectory> {
        self.ensure_open()?;
        Ok(&self.directory)
    }

    /// Free/used bookkeeping of the backing file.
    pub fn range_map(&self) -> Result<&ByteRangeMap> {
        self.ensure_open()?;
        Ok(&self.map)
    }

    /// One-time warnings raised so far.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Number of compression tasks whose result has not been merged.
    pub fn pending_tasks(&self) -> usize {
        self.pool.outstanding() + self.unmerged.len()
    }

    /// Returns `true` if closing would rewrite the central directory.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Archive comment.
    pub fn comment(&self) -> Result<&[u8]> {
        self.ensure_open()?;
        Ok(&self.comment)
    }

    /// Replaces the archive comment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFormat`] if the comment is longer than
    /// 65535 bytes.
    pub fn set_comment(&mut self, comment: impl Into<Vec<u8>>) -> Result<()> {
        self.ensure_open()?;
        let comment = comment.into();
        if comment.len() > crate::format::eocd::MAX_COMMENT_SIZE {
            return Err(Error::InvalidFormat(format!(
                "archive comment of {} bytes exceeds 65535",
                comment.len()
            )));
        }
        if comment != self.comment {
            self.comment = comment;
            self.dirty = true;
        }
        Ok(())
    }

    /// Bytes reserved between the last entry and the central directory.
    pub fn extra_directory_offset(&self) -> Result<u64> {
        self.ensure_open()?;
        Ok(self.extra_block.len() as u64)
    }

    /// Reserves `len` zero bytes between the last entry and the central
    /// directory written by `close`.
    ///
    /// Replaces any block set before. A gap found in an archive on open is
    /// not kept: it is free space like any other.
    pub fn set_extra_directory_offset(&mut self, len: u64) -> Result<()> {
        self.ensure_open()?;
        let len = usize::try_from(len)
            .ok()
            .filter(|&len| len <= u32::MAX as usize)
            .ok_or(Error::UnsupportedFeature { feature: "ZIP64" })?;
        self.replace_extra_block(vec![0u8; len]);
        Ok(())
    }

    /// Sets the bytes written between the last entry and the central
    /// directory, such as an APK signing block.
    pub fn set_extra_directory_block(&mut self, block: impl Into<Vec<u8>>) -> Result<()> {
        self.ensure_open()?;
        let block = block.into();
        if block.len() > u32::MAX as usize {
            return Err(Error::UnsupportedFeature { feature: "ZIP64" });
        }
        self.replace_extra_block(block);
        Ok(())
    }

    fn replace_extra_block(&mut self, block: Vec<u8>) {
        if block != self.extra_block {
            self.extra_block = block;
            self.dirty = true;
        }
    }

    /// The live alignment rules.
    pub fn alignment_rules(&self) -> Result<&AlignmentRules> {
        self.ensure_open()?;
        Ok(&self.rules)
    }

    /// Mutable access to the live alignment rules.
    ///
    /// Changes apply to entries added or realigned afterwards; existing
    /// entries do not move.
    pub fn alignment_rules_mut(&mut self) -> Result<&mut AlignmentRules> {
        self.ensure_open()?;
        Ok(&mut self.rules)
    }

    /// Registers an observer notified of every subsequent mutation.
    pub fn add_observer<O: ArchiveObserver + 'static>(&mut self, observer: O) -> Result<()> {
        self.ensure_open()?;
        self.observers.push(Box::new(observer));
        Ok(())
    }

    /// Blocks until every scheduled compression task has finished and its
    /// result has been merged.
    ///
    /// # Errors
    ///
    /// Returns the oldest queued background error, if any. Each queued error
    /// is returned once; call again to get the next.
    pub fn finish_all_background_tasks(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.drain_tasks();
        self.take_error()
    }

    /// Drains background work, writes the central directory, and releases
    /// the file.
    ///
    /// An archive opened and closed without modification is left untouched.
    ///
    /// # Errors
    ///
    /// Returns a queued background error or the I/O error that stopped the
    /// write. The archive is then open again and `close` may be retried.
    pub fn close(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.state = ArchiveState::Closing;

        if let Err(e) = self.write_out() {
            self.state = ArchiveState::Open;
            return Err(e);
        }

        self.state = ArchiveState::Closed;
        self.file = None;
        for observer in &mut self.observers {
            observer.closed();
        }
        log::debug!("closed {}", self.path.display());
        Ok(())
    }

    fn write_out(&mut self) -> Result<()> {
        self.drain_tasks();
        self.take_error()?;

        if self.dirty {
            self.apply_observer_updates()?;
        }

        if self.options.compact_on_close {
            self.compact_entries()?;
        }

        if self.dirty {
            let entries_end = self.map.used_end();
            let cd_offset = entries_end + self.extra_block.len() as u64;
            let bytes = self.directory.serialize(cd_offset, &self.comment)?;
            let file = self.file()?;
            if !self.extra_block.is_empty() {
                write_at(file, entries_end, &self.extra_block)?;
                log::debug!(
                    "wrote {} byte extra directory block at {:#x}",
                    self.extra_block.len(),
                    entries_end
                );
            }
            write_at(file, cd_offset, &bytes)?;
            file.set_len(cd_offset + bytes.len() as u64)?;
            let mut handle = file;
            handle.flush()?;
            self.map.truncate_free_tail();
            self.dirty = false;
            log::debug!(
                "wrote central directory for {} entries at {:#x} ({} bytes)",
                self.directory.len(),
                cd_offset,
                bytes.len()
            );

            notify(&mut self.observers, |o| o.entries_written(&self.directory))?;
        }

        if self.options.sync_on_close {
            self.file()?.sync_all()?;
        }
        Ok(())
    }

    /// Collects the changes observers want before the central directory is
    /// written, applies them, and waits for any compression they started.
    fn apply_observer_updates(&mut self) -> Result<()> {
        let mut updates = Vec::new();
        for observer in &mut self.observers {
            updates.extend(observer.before_update(&self.directory)?);
        }
        if updates.is_empty() {
            return Ok(());
        }

        log::debug!("applying {} observer updates before writing out", updates.len());
        for update in updates {
            match update {
                Update::Add {
                    name,
                    data,
                    compress,
                } => {
                    self.add_entry(&name, &data[..], compress)?;
                }
                Update::Delete { name } => self.delete_entry(&name)?,
                Update::ExtraDirectoryBlock(block) => self.replace_extra_block(block),
            }
        }

        self.drain_tasks();
        self.take_error()
    }

    /// Checks that the range map and the directory agree: every live entry
    /// owns exactly its range and no range is owned by anything else.
    ///
    /// Only meaningful once background tasks have been merged.
    pub fn verify_bookkeeping(&self) -> Result<()> {
        self.map.check().map_err(Error::InvalidFormat)?;
        let mut owned = 0;
        for range in self.map.owned_ranges() {
            owned += 1;
            let entry = range
                .entry()
                .and_then(|id| self.directory.by_id(id))
                .ok_or_else(|| {
                    Error::InvalidFormat(format!("orphaned range at {:#x}", range.start))
                })?;
            if entry.range() != (range.start..range.end) {
                return Err(Error::InvalidFormat(format!(
                    "entry '{}' spans {:?} but owns [{:#x}, {:#x})",
                    entry.name(),
                    entry.range(),
                    range.start,
                    range.end
                )));
            }
        }
        if owned != self.directory.len() {
            return Err(Error::InvalidFormat(format!(
                "{} owned ranges for {} entries",
                owned,
                self.directory.len()
            )));
        }
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state {
            ArchiveState::Open => Ok(()),
            ArchiveState::Closing => Err(Error::Conflict("archive is closing".into())),
            ArchiveState::Closed => Err(Error::ArchiveClosed),
        }
    }

    fn file(&self) -> Result<&File> {
        self.file.as_ref().ok_or(Error::ArchiveClosed)
    }

    fn allocate_id(&mut self) -> EntryId {
        self.next_id += 1;
        EntryId::new(self.next_id)
    }

    fn take_error(&mut self) -> Result<()> {
        match self.errors.pop_front() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Merges results of tasks that already finished, without blocking.
    fn merge_finished(&mut self) {
        let mut outcomes = std::mem::take(&mut self.unmerged);
        outcomes.extend(self.pool.try_collect());
        for outcome in outcomes {
            self.merge(outcome);
        }
    }

    /// Waits for every scheduled task and merges the results.
    fn drain_tasks(&mut self) {
        let mut outcomes = std::mem::take(&mut self.unmerged);
        outcomes.extend(self.pool.wait_all());
        for outcome in outcomes {
            self.merge(outcome);
        }
    }

    /// Writes a task result into the entry's placeholder.
    ///
    /// Results for entries deleted or replaced since scheduling are dropped.
    /// A failed write keeps the result for the next merge and queues the error.
    fn merge(&mut self, outcome: TaskOutcome) {
        let Some(entry) = self.directory.by_id(outcome.id).filter(|e| e.is_pending()) else {
            log::debug!(
                "discarding compression result for '{}': entry no longer pending",
                outcome.name
            );
            return;
        };
        let offset = entry.offset;
        let mut updated = entry.clone();

        let payload = match outcome.result {
            Ok(payload) => payload,
            Err(e) => {
                log::debug!("compression of '{}' failed: {}", outcome.name, e);
                self.errors.push_back(e);
                if let Some(removed) = self.directory.remove(&outcome.name) {
                    self.map.free(removed.offset);
                    self.dirty = true;
                    if let Err(e) = notify(&mut self.observers, |o| o.removed(&removed)) {
                        self.errors.push_back(e);
                    }
                }
                return;
            }
        };

        updated.apply_payload(&payload);
        let written = updated
            .local_header()
            .and_then(|header| {
                let file = self.file()?;
                let mut buf = header.to_bytes();
                buf.extend_from_slice(&payload.data);
                write_at(file, offset, &buf)?;
                Ok(())
            });

        match written {
            Ok(()) => {
                let len = updated.end() - updated.offset;
                self.map.shrink(offset, len);
                log::debug!(
                    "merged '{}': {} -> {} bytes ({})",
                    updated.name,
                    payload.uncompressed_size,
                    payload.compressed_size(),
                    payload.method
                );
                if let Some(slot) = self.directory.by_id_mut(outcome.id) {
                    *slot = updated;
                }
                self.dirty = true;
            }
            Err(e) => {
                log::debug!("writing '{}' failed, will retry: {}", outcome.name, e);
                self.errors.push_back(e);
                self.unmerged.push(TaskOutcome {
                    id: outcome.id,
                    name: outcome.name,
                    result: Ok(payload),
                });
            }
        }
    }
}

impl Drop for Archive {
    fn drop(&mut self) {
        if self.state != ArchiveState::Open {
            return;
        }
        if let Err(e) = self.close() {
            log::warn!("failed to close {}: {}", self.path.display(), e);
        }
    }
}

/// Calls `f` on every observer and returns the first error, after all of
/// them have been notified.
fn notify<F>(observers: &mut [Box<dyn ArchiveObserver>], mut f: F) -> Result<()>
where
    F: FnMut(&mut Box<dyn ArchiveObserver>) -> Result<()>,
{
    let mut first = None;
    for observer in observers.iter_mut() {
        if let Err(e) = f(observer) {
            first.get_or_insert(e);
        }
    }
    match first {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn read_at(file: &File, offset: u64, len: u64) -> io::Result<Vec<u8>> {
    let mut handle = file;
    handle.seek(SeekFrom::Start(offset))?;
    let mut buf = vec![0u8; len as usize];
    handle.read_exact(&mut buf)?;
    Ok(buf)
}

fn write_at(file: &File, offset: u64, data: &[u8]) -> io::Result<()> {
    let mut handle = file;
    handle.seek(SeekFrom::Start(offset))?;
    handle.write_all(data)
}
