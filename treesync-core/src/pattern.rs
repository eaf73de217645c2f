//! Name patterns for ignore lists and full-compare lists.
//!
//! Patterns match a single file or directory *name*, never a path. Three
//! forms exist: an exact name, `*suffix` and `prefix*`. Ignore lists only
//! accept the first two. All comparisons are case-insensitive.
//!
//! Lists are semicolon-delimited; surrounding whitespace and empty tokens are
//! dropped, so `"bin; *.pdb;;"` yields two patterns.

use std::collections::HashSet;
use std::ffi::{OsStr, OsString};

use crate::error::CoreError;

/// Lowercased comparison key for a file or directory name.
pub fn name_key(name: &str) -> String {
    name.to_lowercase()
}

/// Comparison key for a name as stored on disk.
///
/// UTF-8 names are lowercased like [`name_key`]. Other names are kept byte
/// for byte, so two distinct undecodable names never share a key.
pub fn os_name_key(name: &OsStr) -> OsString {
    match name.to_str() {
        Some(name) => name_key(name).into(),
        None => name.to_os_string(),
    }
}

fn has_separator(token: &str) -> bool {
    token.contains('/') || token.contains('\\')
}

fn tokens(list: &str) -> impl Iterator<Item = &str> {
    list.split(';').map(str::trim).filter(|t| !t.is_empty())
}

// ---------------------------------------------------------------------------
// NamePattern
// ---------------------------------------------------------------------------

/// One parsed name pattern. Stored text is already lowercased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamePattern {
    Exact(String),
    Suffix(String),
    Prefix(String),
}

impl NamePattern {
    pub fn matches(&self, name: &str) -> bool {
        let name = name_key(name);
        match self {
            NamePattern::Exact(exact) => name == *exact,
            NamePattern::Suffix(suffix) => name.ends_with(suffix.as_str()),
            NamePattern::Prefix(prefix) => name.starts_with(prefix.as_str()),
        }
    }

    /// Parse a full-compare token: `name`, `*suffix` or `prefix*`.
    pub fn parse_compare(token: &str) -> Result<Self, CoreError> {
        let invalid = || CoreError::InvalidComparePattern {
            pattern: token.to_string(),
        };
        if has_separator(token) || token.contains('?') {
            return Err(invalid());
        }

        let stars = token.matches('*').count();
        if stars == 0 {
            return Ok(NamePattern::Exact(name_key(token)));
        }
        if stars > 1 || token.len() == 1 {
            return Err(invalid());
        }
        if let Some(suffix) = token.strip_prefix('*') {
            return Ok(NamePattern::Suffix(name_key(suffix)));
        }
        if let Some(prefix) = token.strip_suffix('*') {
            return Ok(NamePattern::Prefix(name_key(prefix)));
        }
        Err(invalid())
    }
}

// ---------------------------------------------------------------------------
// NameMatcher
// ---------------------------------------------------------------------------

/// A list of [`NamePattern`]s; a name matches if any pattern does.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameMatcher {
    patterns: Vec<NamePattern>,
}

impl NameMatcher {
    /// Parse a semicolon-delimited full-compare list.
    pub fn parse(list: &str) -> Result<Self, CoreError> {
        let patterns = tokens(list)
            .map(NamePattern::parse_compare)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Matcher over a fixed set of exact names.
    pub fn exact<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            patterns: names
                .into_iter()
                .map(|n| NamePattern::Exact(name_key(n.as_ref())))
                .collect(),
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(name))
    }

    pub fn patterns(&self) -> &[NamePattern] {
        &self.patterns
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

// ---------------------------------------------------------------------------
// IgnoreSpec
// ---------------------------------------------------------------------------

/// Exact names plus `*suffix` patterns that the walk never copies, deletes or
/// records in the manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IgnoreSpec {
    names: HashSet<String>,
    suffixes: Vec<String>,
}

impl IgnoreSpec {
    /// Parse a semicolon-delimited ignore list.
    ///
    /// Fails with [`CoreError::InvalidIgnorePattern`] when a token has `*`
    /// outside the leading position, is nothing but `*`, or contains a path
    /// separator.
    pub fn parse(list: &str) -> Result<Self, CoreError> {
        let mut spec = Self::default();
        for token in tokens(list) {
            let invalid = || CoreError::InvalidIgnorePattern {
                pattern: token.to_string(),
            };
            if has_separator(token) {
                return Err(invalid());
            }
            match token.strip_prefix('*') {
                Some(suffix) => {
                    let suffix = suffix.trim_start_matches('*');
                    if suffix.is_empty() || suffix.contains('*') {
                        return Err(invalid());
                    }
                    spec.suffixes.push(name_key(suffix));
                }
                None if token.contains('*') => return Err(invalid()),
                None => {
                    spec.names.insert(name_key(token));
                }
            }
        }
        Ok(spec)
    }

    pub fn is_ignored(&self, name: &str) -> bool {
        let key = name_key(name);
        self.names.contains(&key) || self.suffixes.iter().any(|s| key.ends_with(s.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty() && self.suffixes.is_empty()
    }
}
