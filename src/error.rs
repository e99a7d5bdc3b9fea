//! Failures reported by [`Archive`](crate::Archive) and its helpers.
//!
//! Every fallible call returns [`Result<T>`], so `?` composes them:
//!
//! ```rust,no_run
//! use zipweave::{Archive, Result};
//!
//! fn add_readme(path: &str) -> Result<()> {
//!     let mut archive = Archive::open(path)?;
//!     archive.add_bytes("README.txt", b"hello", true)?;
//!     archive.close()
//! }
//! ```
//!
//! Errors produced by background compression are not returned by the call
//! that scheduled the work. They are queued and surface from the next
//! blocking barrier ([`Archive::finish_all_background_tasks`] or
//! [`Archive::close`]):
//!
//! ```rust,no_run
//! use zipweave::{Archive, Error};
//!
//! fn drain(archive: &mut Archive) {
//!     match archive.finish_all_background_tasks() {
//!         Ok(()) => {}
//!         Err(Error::Compression { name, reason }) => {
//!             eprintln!("could not compress {}: {}", name, reason);
//!         }
//!         Err(e) => eprintln!("error: {}", e),
//!     }
//! }
//! ```
//!
//! [`Archive::finish_all_background_tasks`]: crate::Archive::finish_all_background_tasks
//! [`Archive::close`]: crate::Archive::close

use std::io;

/// Everything that can go wrong while opening, editing or closing an archive.
///
/// The predicates [`is_format_error`](Self::is_format_error),
/// [`is_conflict`](Self::is_conflict) and [`is_corruption`](Self::is_corruption)
/// group the variants for callers that only care about the kind of failure.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An I/O error occurred while reading or writing the backing file.
    ///
    /// For background work this is raised at the next drain point rather
    /// than by the call that scheduled the work.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The file is not recognizable as a ZIP archive.
    ///
    /// Returned by [`Archive::open`](crate::Archive::open) when, for example,
    /// no End Of Central Directory record can be found.
    #[error("Invalid ZIP format: {0}")]
    InvalidFormat(String),

    /// A ZIP record is corrupt, truncated, or inconsistent with another
    /// record describing the same entry.
    #[error("Corrupt header at offset {offset:#x}: {reason}")]
    CorruptHeader {
        /// The byte offset of the offending record.
        offset: u64,
        /// What was wrong with the record.
        reason: String,
    },

    /// The archive has been closed; no further operation is valid.
    #[error("archive is closed")]
    ArchiveClosed,

    /// An operation was attempted in a state where it is not allowed.
    #[error("Conflicting operation: {0}")]
    Conflict(String),

    /// Compressing an entry failed inside a background task.
    #[error("Compression of '{name}' failed: {reason}")]
    Compression {
        /// The entry whose compression failed.
        name: String,
        /// Description of the failure.
        reason: String,
    },

    /// No live entry has the given name.
    #[error("Entry not found: {name}")]
    EntryNotFound {
        /// The name that was looked up.
        name: String,
    },

    /// An entry name is not acceptable for a new entry.
    ///
    /// See [`EntryName`](crate::EntryName) for the rules.
    #[error("Invalid entry name: {0}")]
    InvalidEntryName(String),

    /// An alignment boundary is zero.
    #[error("invalid alignment boundary {boundary}: must be at least 1")]
    InvalidAlignment {
        /// The rejected boundary.
        boundary: u64,
    },

    /// An alignment rule pattern is not a valid regular expression.
    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The rejected pattern.
        pattern: String,
        /// Why the regex engine rejected it.
        reason: String,
    },

    /// A deflate level above 9 was requested.
    ///
    /// ```rust
    /// use zipweave::{ArchiveOptions, Error};
    ///
    /// assert!(ArchiveOptions::new().level(9).is_ok());
    /// assert!(matches!(
    ///     ArchiveOptions::new().level(12),
    ///     Err(Error::InvalidCompressionLevel { level: 12 })
    /// ));
    /// ```
    #[error("invalid compression level {level}: must be 0-9")]
    InvalidCompressionLevel {
        /// The requested level.
        level: u32,
    },

    /// An entry uses a compression method other than STORED or DEFLATE.
    #[error("Unsupported compression method: {method}")]
    UnsupportedMethod {
        /// The ZIP method code.
        method: u16,
    },

    /// The archive needs a ZIP feature this engine does not implement.
    #[error("Unsupported feature: {feature}")]
    UnsupportedFeature {
        /// Short name of the feature, such as `"ZIP64"`.
        feature: &'static str,
    },

    /// Entry content does not match its recorded CRC-32.
    #[error("CRC mismatch for '{name}': expected {expected:#x}, got {actual:#x}")]
    CrcMismatch {
        /// The entry name.
        name: String,
        /// CRC recorded in the central directory.
        expected: u32,
        /// CRC of the data actually read.
        actual: u32,
    },
}

impl Error {
    /// Returns `true` if this error reports malformed ZIP structures.
    pub fn is_format_error(&self) -> bool {
        matches!(self, Error::InvalidFormat(_) | Error::CorruptHeader { .. })
    }

    /// Returns `true` if this error is a programming error: an operation on
    /// a closed archive or in a conflicting state.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::ArchiveClosed | Error::Conflict(_))
    }

    /// Returns `true` if stored bytes were damaged: a bad record or a bad checksum.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Error::CrcMismatch { .. } | Error::CorruptHeader { .. }
        )
    }

    /// Returns `true` if retrying the operation might succeed.
    ///
    /// Only transient I/O errors qualify. There is no automatic retry; the
    /// caller decides whether to retry an `add` or `close`.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted | io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }

    /// Returns the entry name associated with this error, if any.
    pub fn entry_name(&self) -> Option<&str> {
        match self {
            Error::Compression { name, .. } => Some(name.as_str()),
            Error::EntryNotFound { name } => Some(name.as_str()),
            Error::CrcMismatch { name, .. } => Some(name.as_str()),
            _ => None,
        }
    }

    /// Reports a bad record at `offset`.
    pub fn corrupt_header(offset: u64, reason: impl Into<String>) -> Self {
        Error::CorruptHeader {
            offset,
            reason: reason.into(),
        }
    }

    /// Reports a checksum failure for entry `name`.
    pub fn crc_mismatch(name: impl Into<String>, expected: u32, actual: u32) -> Self {
        Error::CrcMismatch {
            name: name.into(),
            expected,
            actual,
        }
    }

    /// Reports a lookup of a name that is not in the archive.
    pub fn entry_not_found(name: impl Into<String>) -> Self {
        Error::EntryNotFound { name: name.into() }
    }
}

/// A specialized Result type for archive operations.
pub type Result<T> = std::result::Result<T, Error>;
