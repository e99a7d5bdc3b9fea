//! # zipweave
//!
//! Incremental, in-place modification of ZIP and JAR archives.
//!
//! An [`Archive`] treats the file on disk as a live data structure: entries
//! are added, replaced, deleted, and moved without rewriting the rest of
//! the file, and the central directory is written once, on close. Freed
//! space is tracked in a [`ByteRangeMap`] and reused by later additions.
//!
//! Two features matter for packaging tools:
//!
//! - **Alignment.** [`AlignmentRule`]s place the data of matching entries on
//!   a byte boundary, e.g. uncompressed native libraries on 4 KiB pages so
//!   they can be memory-mapped straight out of the archive.
//! - **Background compression.** Entries added with compression return
//!   immediately; DEFLATE runs on a worker pool and the result is written
//!   into a reserved placeholder later.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use zipweave::{AlignmentRule, Archive, ArchiveOptions, Result};
//!
//! fn main() -> Result<()> {
//!     let options = ArchiveOptions::new()
//!         .alignment_rule(AlignmentRule::suffix(".so", 4096)?)
//!         .deterministic(true);
//!     let mut archive = Archive::open_with_options("app.apk", options)?;
//!
//!     archive.add_bytes("lib/arm64-v8a/libmain.so", b"\x7fELF...", false)?;
//!     archive.add_bytes("assets/readme.txt", b"Hello, World!", true)?;
//!
//!     for entry in archive.entries()? {
//!         println!("{} at {:#x}", entry.name(), entry.data_offset());
//!     }
//!
//!     archive.close()
//! }
//! ```
//!
//! ## Reopening
//!
//! Opening an existing archive rebuilds the entry set and the free-space map
//! from the central directory and the local headers. Anything that does not
//! add up (overlapping entries, headers that disagree, a directory running
//! past the end of the file) fails with a format error.
//!
//! ```rust,no_run
//! use zipweave::{Archive, Result};
//!
//! fn main() -> Result<()> {
//!     let mut archive = Archive::open("app.apk")?;
//!     let text = archive.read("assets/readme.txt")?;
//!     assert_eq!(text, b"Hello, World!");
//!     archive.delete("assets/readme.txt")?;
//!     archive.close()
//! }
//! ```
//!
//! ## Features
//!
//! - `parallel` (default): compress on a rayon worker pool. Without it,
//!   compression runs inline when an entry is added.
//!
//! ## Limitations
//!
//! ZIP64, multi-disk archives, and encrypted entries are rejected with
//! [`Error::UnsupportedFeature`]. Only the STORED and DEFLATE methods are
//! supported.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod align;
pub mod archive;
pub mod checksum;
pub mod codec;
pub mod directory;
pub mod entry;
pub mod entry_name;
pub mod error;
pub mod format;
pub mod observer;
pub mod options;
pub mod range_map;
pub mod task;
pub mod timestamp;

pub use entry_name::EntryName;
pub use error::{Error, Result};
pub use timestamp::DosDateTime;

// Re-export the archive API at crate root for convenience
pub use align::{AlignmentRule, AlignmentRules};
pub use archive::{Archive, ArchiveState, Diagnostics};
pub use directory::CentralDirectory;
pub use entry::{EntryId, EntryState, StoredEntry};
pub use observer::{ArchiveObserver, RecordingObserver, Update};
pub use options::ArchiveOptions;

// Lower-level building blocks
pub use format::CompressionMethod;
pub use range_map::{ByteRange, ByteRangeMap, RangeOwner};
pub use task::{CompressionPool, CompressionTask, TaskOutcome};
