//! Mutation notifications.
//!
//! Layers built on top of an archive, such as a signer keeping a manifest
//! of entry digests, need to see every mutation as it happens rather than
//! the final state. They implement [`ArchiveObserver`] and register with
//! [`Archive::add_observer`](crate::Archive::add_observer).
//!
//! Callbacks run on the thread that performed the mutation, after the
//! mutation has been applied. An error returned from a callback is passed
//! to the caller of the mutating operation; the mutation is not undone.
//! Errors from notifications raised during a merge of background results
//! are queued and returned by the next barrier, like compression errors.
//!
//! Observers may also change the archive while it is written out: see
//! [`ArchiveObserver::before_update`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::directory::CentralDirectory;
use crate::entry::StoredEntry;
use crate::Result;

/// A change requested by [`ArchiveObserver::before_update`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Update {
    /// Add an entry, replacing any entry of the same name.
    Add {
        /// Entry name.
        name: String,
        /// Uncompressed contents.
        data: Vec<u8>,
        /// Whether to DEFLATE the contents.
        compress: bool,
    },
    /// Delete an entry.
    Delete {
        /// Entry name.
        name: String,
    },
    /// Write `block` between the last entry and the central directory.
    ExtraDirectoryBlock(Vec<u8>),
}

impl Update {
    /// Shorthand for [`Update::Add`].
    pub fn add(name: impl Into<String>, data: impl Into<Vec<u8>>, compress: bool) -> Self {
        Update::Add {
            name: name.into(),
            data: data.into(),
            compress,
        }
    }
}

/// Receives notifications about archive mutations.
///
/// Every method has a no-op default.
pub trait ArchiveObserver: Send {
    /// A modified archive is about to be written out by `close`.
    ///
    /// Runs once per close, before the central directory is serialized and
    /// only if something changed. The returned updates are applied in order
    /// and reported back through [`added`](Self::added) and
    /// [`removed`](Self::removed) like any other mutation. An error aborts
    /// the close, which may then be retried.
    fn before_update(&mut self, directory: &CentralDirectory) -> Result<Vec<Update>> {
        let _ = directory;
        Ok(Vec::new())
    }

    /// An entry was added. `replaced` is the entry of the same name that it
    /// replaced, if any.
    ///
    /// The entry may still be pending compression; its name and CRC-32 are
    /// final but its compressed size is not.
    fn added(&mut self, entry: &StoredEntry, replaced: Option<&StoredEntry>) -> Result<()> {
        let _ = (entry, replaced);
        Ok(())
    }

    /// An entry was deleted.
    fn removed(&mut self, entry: &StoredEntry) -> Result<()> {
        let _ = entry;
        Ok(())
    }

    /// The central directory was written out during close.
    fn entries_written(&mut self, directory: &CentralDirectory) -> Result<()> {
        let _ = directory;
        Ok(())
    }

    /// The archive has been closed.
    fn closed(&mut self) {}
}

/// An observer that records every notification as a line of text.
///
/// Clones share the same log, so a clone can be registered with an archive
/// while the original is kept for inspection.
#[derive(Debug, Default, Clone)]
pub struct RecordingObserver {
    events: Arc<Mutex<Vec<String>>>,
}

impl RecordingObserver {
    /// Creates an observer with an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the notifications so far, e.g. `added a.txt` or `removed b.txt`.
    pub fn events(&self) -> Vec<String> {
        self.log().clone()
    }

    fn log(&self) -> MutexGuard<'_, Vec<String>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ArchiveObserver for RecordingObserver {
    fn added(&mut self, entry: &StoredEntry, replaced: Option<&StoredEntry>) -> Result<()> {
        let event = match replaced {
            Some(_) => format!("replaced {}", entry.name()),
            None => format!("added {}", entry.name()),
        };
        self.log().push(event);
        Ok(())
    }

    fn removed(&mut self, entry: &StoredEntry) -> Result<()> {
        self.log().push(format!("removed {}", entry.name()));
        Ok(())
    }

    fn entries_written(&mut self, directory: &CentralDirectory) -> Result<()> {
        self.log().push(format!("written {}", directory.len()));
        Ok(())
    }

    fn closed(&mut self) {
        self.log().push("closed".to_string());
    }
}
