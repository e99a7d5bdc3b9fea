//! Alignment rules for entry data.
//!
//! A rule pairs a name pattern with a byte boundary. The rules of an archive
//! form an ordered list and the **first** rule matching a path decides the
//! boundary for that entry; paths no rule matches have a boundary of 1.
//!
//! Patterns are regular expressions that must match the whole path, so
//! `.*\.so` matches `lib/x86/libfoo.so` but not `libfoo.so.1`.
//!
//! ```rust
//! use zipweave::{AlignmentRule, AlignmentRules};
//!
//! let mut rules = AlignmentRules::new();
//! rules.add(AlignmentRule::new(r".*\.so", 4096).unwrap());
//! rules.add(AlignmentRule::suffix(".arsc", 4).unwrap());
//!
//! assert_eq!(rules.boundary_for("lib/arm64-v8a/libapp.so"), 4096);
//! assert_eq!(rules.boundary_for("resources.arsc"), 4);
//! assert_eq!(rules.boundary_for("classes.dex"), 1);
//! ```

use std::fmt;

use regex::Regex;

use crate::{Error, Result};

/// A name pattern and the boundary the data of matching entries must start on.
#[derive(Clone)]
pub struct AlignmentRule {
    source: String,
    regex: Regex,
    boundary: u64,
}

impl AlignmentRule {
    /// Creates a rule from a regular expression matched against whole paths.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidPattern`] if `pattern` is not a valid regex
    /// - [`Error::InvalidAlignment`] if `boundary` is 0
    pub fn new(pattern: &str, boundary: u64) -> Result<Self> {
        if boundary == 0 {
            return Err(Error::InvalidAlignment { boundary });
        }
        let regex = Regex::new(&format!("^(?:{})$", pattern)).map_err(|e| Error::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
            boundary,
        })
    }

    /// Creates a rule matching every path ending in `suffix`.
    pub fn suffix(suffix: &str, boundary: u64) -> Result<Self> {
        Self::new(&format!(".*{}", regex::escape(suffix)), boundary)
    }

    /// The pattern as given.
    pub fn pattern(&self) -> &str {
        &self.source
    }

    /// The required boundary.
    pub fn boundary(&self) -> u64 {
        self.boundary
    }

    /// Returns `true` if the rule applies to `name`.
    pub fn matches(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }
}

impl fmt::Debug for AlignmentRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlignmentRule")
            .field("pattern", &self.source)
            .field("boundary", &self.boundary)
            .finish()
    }
}

impl PartialEq for AlignmentRule {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source && self.boundary == other.boundary
    }
}

impl Eq for AlignmentRule {}

/// Ordered, mutable set of alignment rules.
///
/// Changing the rules never moves entries already in the archive; it only
/// affects entries added or realigned afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlignmentRules {
    rules: Vec<AlignmentRule>,
}

impl AlignmentRules {
    /// Creates an empty rule set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a rule. Earlier rules take precedence.
    pub fn add(&mut self, rule: AlignmentRule) {
        self.rules.push(rule);
    }

    /// Inserts a rule at `index`, shifting later rules down in precedence.
    ///
    /// `index` is clamped to the number of rules.
    pub fn insert(&mut self, index: usize, rule: AlignmentRule) {
        let index = index.min(self.rules.len());
        self.rules.insert(index, rule);
    }

    /// Removes the rule at `index`.
    pub fn remove(&mut self, index: usize) -> Option<AlignmentRule> {
        (index < self.rules.len()).then(|| self.rules.remove(index))
    }

    /// Removes every rule with this pattern and returns how many were removed.
    pub fn remove_pattern(&mut self, pattern: &str) -> usize {
        let before = self.rules.len();
        self.rules.retain(|r| r.pattern() != pattern);
        before - self.rules.len()
    }

    /// Removes all rules.
    pub fn clear(&mut self) {
        self.rules.clear();
    }

    /// Number of rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns `true` if there are no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Iterates over the rules in precedence order.
    pub fn iter(&self) -> impl Iterator<Item = &AlignmentRule> {
        self.rules.iter()
    }

    /// The first rule matching `name`.
    pub fn rule_for(&self, name: &str) -> Option<&AlignmentRule> {
        self.rules.iter().find(|r| r.matches(name))
    }

    /// The boundary required for `name`: that of the first matching rule,
    /// or 1.
    pub fn boundary_for(&self, name: &str) -> u64 {
        self.rule_for(name).map_or(1, AlignmentRule::boundary)
    }
}

impl FromIterator<AlignmentRule> for AlignmentRules {
    fn from_iter<I: IntoIterator<Item = AlignmentRule>>(iter: I) -> Self {
        Self {
            rules: iter.into_iter().collect(),
        }
    }
}
