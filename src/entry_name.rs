//! Validated names for new archive entries.

use crate::{Error, Result};
use std::fmt;

/// Maximum length of an entry name in bytes.
///
/// Both the local and the central directory header store the name length in
/// a 16-bit field.
pub const MAX_NAME_LENGTH: usize = u16::MAX as usize;

/// A validated name for an entry added to an archive.
///
/// `EntryName` checks that:
/// - the name is not empty and has no NUL bytes
/// - the UTF-8 encoding fits the 16-bit ZIP name length field
/// - the name is relative (does not start with `/`) and uses `/` separators
/// - no segment is empty, `.` or `..`; a single trailing `/` is allowed and
///   marks a directory entry
///
/// Names of entries read from an existing archive are not validated; whatever
/// the central directory holds is kept.
///
/// # Examples
///
/// ```
/// use zipweave::EntryName;
///
/// let name = EntryName::new("lib/arm64-v8a/libnative.so").unwrap();
/// assert_eq!(name.as_str(), "lib/arm64-v8a/libnative.so");
/// assert!(!name.is_directory());
///
/// assert!(EntryName::new("res/").unwrap().is_directory());
/// assert!(EntryName::new("../escape").is_err());
/// assert!(EntryName::new("/absolute").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryName(String);

impl EntryName {
    /// Creates a new `EntryName`, validating it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEntryName`] if the name breaks any of the
    /// rules listed on the type.
    pub fn new(s: &str) -> Result<Self> {
        Self::validate(s)?;
        Ok(Self(s.to_string()))
    }

    fn validate(s: &str) -> Result<()> {
        if s.is_empty() {
            return Err(Error::InvalidEntryName("empty name".into()));
        }

        if s.contains('\0') {
            return Err(Error::InvalidEntryName("contains NUL byte".into()));
        }

        if s.len() > MAX_NAME_LENGTH {
            return Err(Error::InvalidEntryName(format!(
                "name exceeds maximum length of {} bytes",
                MAX_NAME_LENGTH
            )));
        }

        if s.starts_with('/') {
            return Err(Error::InvalidEntryName("absolute name not allowed".into()));
        }

        if s.contains('\\') {
            return Err(Error::InvalidEntryName(
                "backslash separators not allowed".into(),
            ));
        }

        let body = s.strip_suffix('/').unwrap_or(s);
        for segment in body.split('/') {
            if segment.is_empty() {
                return Err(Error::InvalidEntryName(
                    "empty segment (consecutive slashes)".into(),
                ));
            }
            if segment == "." || segment == ".." {
                return Err(Error::InvalidEntryName(format!(
                    "'{}' segment not allowed",
                    segment
                )));
            }
        }

        Ok(())
    }

    /// Returns the name as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if this name denotes a directory entry.
    pub fn is_directory(&self) -> bool {
        self.0.ends_with('/')
    }

    /// Returns the last segment of the name.
    pub fn file_name(&self) -> &str {
        let body = self.0.strip_suffix('/').unwrap_or(&self.0);
        body.rsplit('/').next().unwrap_or(body)
    }

    /// Consumes the name and returns the inner string.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for EntryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for EntryName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for EntryName {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for EntryName {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::validate(&s)?;
        Ok(Self(s))
    }
}
