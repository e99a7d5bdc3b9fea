//! One-time warnings scoped to an archive.

use std::collections::HashSet;

/// Warnings about recoverable oddities, each logged at most once per archive.
///
/// Owned by the [`Archive`](crate::Archive) and dropped with it, so two
/// archives opened in the same process warn independently.
#[derive(Debug, Default)]
pub struct Diagnostics {
    seen: HashSet<&'static str>,
    warnings: Vec<String>,
}

impl Diagnostics {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Logs `message` with `log::warn!` unless a warning with the same `key`
    /// was already issued. Returns `true` if the warning was issued.
    pub(crate) fn warn_once(&mut self, key: &'static str, message: impl FnOnce() -> String) -> bool {
        if !self.seen.insert(key) {
            return false;
        }
        let message = message();
        log::warn!("{}", message);
        self.warnings.push(message);
        true
    }

    /// Warnings issued so far, in order.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Returns `true` if a warning with this key was issued.
    pub fn has_warned(&self, key: &str) -> bool {
        self.seen.contains(key)
    }
}
