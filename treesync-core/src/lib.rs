//! treesync core library: configuration, name patterns, manifest, entries.
//!
//! Public API surface:
//! - [`options`]: raw [`SyncOptions`] and the validated per-run [`SyncContext`]
//! - [`pattern`]: [`IgnoreSpec`] and the full-compare [`NameMatcher`]
//! - [`manifest`]: the [`Manifest`] of paths placed by a previous run
//! - [`entry`]: file/directory snapshots taken while walking a tree
//! - [`retry`]: [`RetryPolicy`], the fixed-delay retry loop
//! - [`error`]: [`CoreError`]

pub mod entry;
pub mod error;
pub mod manifest;
pub mod options;
pub mod pattern;
pub mod retry;

pub use entry::{DirEntry, EntryInfo, FileEntry, FsEntry};
pub use error::CoreError;
pub use manifest::Manifest;
pub use options::{SyncContext, SyncOptions};
pub use pattern::{IgnoreSpec, NameMatcher, NamePattern};
pub use retry::RetryPolicy;
