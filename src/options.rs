//! Archive configuration.

use crate::align::{AlignmentRule, AlignmentRules};
use crate::codec::DeflateOptions;
use crate::timestamp::DosDateTime;

/// Options for opening an archive.
///
/// # Example
///
/// ```rust
/// use zipweave::{AlignmentRule, ArchiveOptions};
///
/// let options = ArchiveOptions::new()
///     .level(9)?
///     .alignment_rule(AlignmentRule::suffix(".so", 4096)?)
///     .deterministic(true)
///     .compact_on_close(true);
/// assert_eq!(options.level, 9);
/// assert_eq!(options.alignment_rules.boundary_for("lib/libx.so"), 4096);
/// # Ok::<(), zipweave::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct ArchiveOptions {
    /// DEFLATE level (0-9).
    pub level: u32,
    /// Whether deferred compression runs on the worker pool.
    ///
    /// When `false`, deferred compression runs on the calling thread but its
    /// result is merged the same way.
    pub background_compression: bool,
    /// Number of worker threads; 0 picks the available parallelism.
    pub worker_threads: usize,
    /// Fixed modification time for new entries; `None` uses the current time.
    pub timestamp: Option<DosDateTime>,
    /// Initial alignment rules.
    pub alignment_rules: AlignmentRules,
    /// Whether `close()` compacts the archive before writing it out.
    pub compact_on_close: bool,
    /// Whether `close()` syncs the file to stable storage.
    pub sync_on_close: bool,
    /// Whether opening a missing path creates a new archive.
    pub create_if_missing: bool,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            level: 6,
            background_compression: true,
            worker_threads: 0,
            timestamp: None,
            alignment_rules: AlignmentRules::new(),
            compact_on_close: false,
            sync_on_close: false,
            create_if_missing: true,
        }
    }
}

impl ArchiveOptions {
    /// Creates options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the DEFLATE level.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCompressionLevel`] if level is greater than 9.
    ///
    /// [`Error::InvalidCompressionLevel`]: crate::Error::InvalidCompressionLevel
    pub fn level(mut self, level: u32) -> crate::Result<Self> {
        if level > 9 {
            return Err(crate::Error::InvalidCompressionLevel { level });
        }
        self.level = level;
        Ok(self)
    }

    /// Enables or disables the background worker pool.
    pub fn background_compression(mut self, enabled: bool) -> Self {
        self.background_compression = enabled;
        self
    }

    /// Sets the worker pool size.
    pub fn worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }

    /// Uses a fixed modification time for every new entry.
    pub fn timestamp(mut self, timestamp: DosDateTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Stamps new entries with [`DosDateTime::ZERO`] so identical inputs
    /// produce identical archives, or restores the current-time default.
    pub fn deterministic(mut self, enabled: bool) -> Self {
        self.timestamp = enabled.then_some(DosDateTime::ZERO);
        self
    }

    /// Appends an alignment rule.
    pub fn alignment_rule(mut self, rule: AlignmentRule) -> Self {
        self.alignment_rules.add(rule);
        self
    }

    /// Compacts the archive on close.
    pub fn compact_on_close(mut self, enabled: bool) -> Self {
        self.compact_on_close = enabled;
        self
    }

    /// Syncs the file to stable storage on close.
    pub fn sync_on_close(mut self, enabled: bool) -> Self {
        self.sync_on_close = enabled;
        self
    }

    /// Controls whether opening a missing path creates it.
    pub fn create_if_missing(mut self, enabled: bool) -> Self {
        self.create_if_missing = enabled;
        self
    }

    pub(crate) fn deflate_options(&self) -> DeflateOptions {
        DeflateOptions::with_level(self.level)
    }

    pub(crate) fn entry_timestamp(&self) -> DosDateTime {
        self.timestamp.unwrap_or_else(DosDateTime::now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ArchiveOptions::default();
        assert_eq!(options.level, 6);
        assert!(options.background_compression);
        assert!(options.create_if_missing);
        assert!(!options.compact_on_close);
        assert!(!options.sync_on_close);
        assert!(options.alignment_rules.is_empty());
        assert!(options.timestamp.is_none());
    }

    #[test]
    fn test_level_validation() {
        assert_eq!(ArchiveOptions::new().level(0).unwrap().level, 0);
        assert!(ArchiveOptions::new().level(10).is_err());
    }

    #[test]
    fn test_deterministic() {
        let options = ArchiveOptions::new().deterministic(true);
        assert_eq!(options.entry_timestamp(), DosDateTime::ZERO);
        assert!(ArchiveOptions::new().deterministic(true).deterministic(false).timestamp.is_none());
    }

    #[test]
    fn test_builder_chain() {
        let options = ArchiveOptions::new()
            .background_compression(false)
            .worker_threads(3)
            .sync_on_close(true)
            .create_if_missing(false);
        assert!(!options.background_compression);
        assert_eq!(options.worker_threads, 3);
        assert!(options.sync_on_close);
        assert!(!options.create_if_missing);
        assert_eq!(options.deflate_options().level, 6);
    }
}
