//! Change detection: decides whether a source file must be (re)copied.
//!
//! ## Rules
//!
//! 1. Deferred files (e.g. `web.config`) and files matching the full-compare
//!    list are compared by SHA-256 of their content. Identical content skips
//!    the copy even when timestamps differ.
//! 2. Everything else is compared by last-write time: equal (exactly, not
//!    "newer than") skips, anything else copies.
//! 3. A deferred file that needs copying yields [`Decision::Defer`] instead of
//!    [`Decision::Copy`].

use std::io::{self, BufReader, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

use treesync_core::{FileEntry, NameMatcher};

/// Outcome for one source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Skip,
    Copy,
    /// Copy after the whole tree has been reconciled.
    Defer,
}

/// Applies the change rules for one run.
#[derive(Debug, Clone, Copy)]
pub struct ChangeDetector<'a> {
    full_compare: &'a NameMatcher,
    deferred: &'a NameMatcher,
}

impl<'a> ChangeDetector<'a> {
    pub fn new(full_compare: &'a NameMatcher, deferred: &'a NameMatcher) -> Self {
        Self {
            full_compare,
            deferred,
        }
    }

    pub fn is_deferred(&self, name: &str) -> bool {
        self.deferred.matches(name)
    }

    /// Whether `name` is compared by content instead of timestamp.
    pub fn compares_content(&self, name: &str) -> bool {
        self.is_deferred(name) || self.full_compare.matches(name)
    }

    /// Decide what to do with `source` given the same-named destination file,
    /// if any.
    pub fn decide(
        &self,
        source: &FileEntry,
        destination: Option<&FileEntry>,
    ) -> io::Result<Decision> {
        let unchanged = match destination {
            None => false,
            Some(dest) if self.compares_content(source.name()) => {
                hash_file(source.path())? == hash_file(dest.path())?
            }
            Some(dest) => dest.modified() == source.modified(),
        };

        Ok(if unchanged {
            Decision::Skip
        } else if self.is_deferred(source.name()) {
            Decision::Defer
        } else {
            Decision::Copy
        })
    }
}

/// SHA-256 of the file content as lowercase hex.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let mut reader = BufReader::new(std::fs::File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
