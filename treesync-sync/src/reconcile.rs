//! Recursive tree reconciliation.
//!
//! ## Per-directory protocol
//!
//! For each (source, destination) directory pair:
//!
//! 1. Skip ignored source directories and a directory paired with itself.
//! 2. Create the destination directory if missing.
//! 3. List both sides, keyed by lowercased name.
//! 4. Delete destination-only files the previous manifest authorizes.
//! 5. Record every source file in the next manifest; copy changed files,
//!    queue deferred ones.
//! 6. Delete destination-only directories, depth first, under the same
//!    authorization rule. A directory symlink is unlinked, never descended
//!    into.
//! 7. Record and recurse into every source sub-directory.
//!
//! Destination paths are built from names as stored on disk. A path that is
//! not valid UTF-8 is still mirrored but has no manifest form, so it is never
//! recorded and never deleted on manifest authority.
//!
//! File copies and deletes run through the retry loop with the quarantine
//! fallback. Directory creation and removal errors propagate immediately.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::Permissions;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use filetime::FileTime;
use serde::Serialize;

use treesync_core::{
    manifest, pattern::os_name_key, CoreError, DirEntry, EntryInfo, FileEntry, FsEntry, Manifest,
    SyncContext,
};

use crate::detect::{ChangeDetector, Decision};
use crate::error::{io_err, SyncError};
use crate::log::{ActionLog, SyncAction};
use crate::quarantine::{self, QuarantineArea};

/// A file whose copy is postponed until the whole tree has been reconciled.
#[derive(Debug, Clone)]
pub struct DeferredFile {
    pub source: FileEntry,
    pub destination: PathBuf,
    /// Source-relative path.
    pub path: String,
    /// Log description: relative path plus attribute tag.
    pub description: String,
}

/// Counters for one run. In what-if mode they count planned actions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub files_copied: usize,
    pub files_skipped: usize,
    pub files_deleted: usize,
    pub directories_created: usize,
    pub directories_deleted: usize,
    pub deferred_copied: usize,
}

/// Files and sub-directories of one directory, keyed by [`os_name_key`].
#[derive(Debug, Default)]
struct Listing {
    files: BTreeMap<OsString, FileEntry>,
    dirs: BTreeMap<OsString, DirEntry>,
}

impl Listing {
    fn build(dir: &Path, children: Vec<FsEntry>) -> Result<Self, SyncError> {
        let mut listing = Self::default();
        for child in children {
            let key = os_name_key(child.file_name());
            let existing = listing
                .files
                .get(&key)
                .map(FileEntry::name)
                .or_else(|| listing.dirs.get(&key).map(DirEntry::name));
            if let Some(first) = existing {
                return Err(SyncError::CaseConflict {
                    dir: dir.to_path_buf(),
                    first: first.to_string(),
                    second: child.name().to_string(),
                });
            }
            match child {
                FsEntry::File(file) => {
                    listing.files.insert(key, file);
                }
                FsEntry::Directory(sub) => {
                    listing.dirs.insert(key, sub);
                }
            }
        }
        Ok(listing)
    }
}

// ---------------------------------------------------------------------------
// TreeReconciler
// ---------------------------------------------------------------------------

/// Walks the source tree and brings the destination in line with it.
///
/// Holds the previous manifest read-only and builds the next one as it goes.
/// Call [`Self::reconcile`], then [`Self::flush_deferred`], then
/// [`Self::finish`].
pub struct TreeReconciler<'a> {
    ctx: &'a SyncContext,
    previous: &'a Manifest,
    quarantine: Option<&'a QuarantineArea>,
    log: &'a mut dyn ActionLog,
    next: Manifest,
    deferred: Vec<DeferredFile>,
    stats: SyncStats,
}

impl<'a> TreeReconciler<'a> {
    pub fn new(
        ctx: &'a SyncContext,
        previous: &'a Manifest,
        quarantine: Option<&'a QuarantineArea>,
        log: &'a mut dyn ActionLog,
    ) -> Self {
        Self {
            ctx,
            previous,
            quarantine,
            log,
            next: Manifest::new(),
            deferred: Vec::new(),
            stats: SyncStats::default(),
        }
    }

    /// Reconcile the source root onto the destination root.
    pub fn reconcile(&mut self) -> Result<(), SyncError> {
        let root = &self.ctx.source_root;
        let source = DirEntry::open(root)
            .map_err(|e| io_err(root, e))?
            .ok_or_else(|| CoreError::SourceNotFound { path: root.clone() })?;
        let destination = self.ctx.destination_root.clone();
        self.sync_dir(&source, &destination)
    }

    /// Copy every deferred file, in the order they were queued.
    pub fn flush_deferred(&mut self) -> Result<(), SyncError> {
        for item in std::mem::take(&mut self.deferred) {
            self.log.record(&SyncAction::CopyFile {
                path: item.path.clone(),
                details: item.description.clone(),
            });
            self.copy_file(&item.source, &item.destination)?;
            self.stats.deferred_copied += 1;
        }
        Ok(())
    }

    pub fn deferred(&self) -> &[DeferredFile] {
        &self.deferred
    }

    pub fn next_manifest(&self) -> &Manifest {
        &self.next
    }

    pub fn stats(&self) -> SyncStats {
        self.stats
    }

    /// Hand back the next manifest and the counters.
    pub fn finish(self) -> (Manifest, SyncStats) {
        (self.next, self.stats)
    }

    // -----------------------------------------------------------------------
    // Walk
    // -----------------------------------------------------------------------

    fn sync_dir(&mut self, source: &DirEntry, destination: &Path) -> Result<(), SyncError> {
        let ctx = self.ctx;
        if ctx.ignore.is_ignored(source.name()) {
            return Ok(());
        }
        if destination == source.path() {
            return Ok(());
        }

        let dest_listing = match DirEntry::open(destination).map_err(|e| io_err(destination, e))? {
            Some(dir) => self.list(&dir)?,
            None => {
                self.create_dir(source, destination)?;
                Listing::default()
            }
        };
        let source_listing = self.list(source)?;

        for (key, file) in &dest_listing.files {
            if ctx.ignore.is_ignored(file.name()) || source_listing.files.contains_key(key) {
                continue;
            }
            if self.is_authorized(file.path()) {
                self.delete_file(file)?;
            } else {
                tracing::debug!(
                    path = %file.path().display(),
                    "keeping file not placed by a previous sync"
                );
            }
        }

        let detector = ChangeDetector::new(&ctx.full_compare, &ctx.deferred);
        for (key, file) in &source_listing.files {
            if ctx.ignore.is_ignored(file.name()) {
                continue;
            }
            self.record(file.path());

            let existing = dest_listing.files.get(key);
            if existing.is_some_and(|dest| dest.modified() == file.modified()) {
                self.stats.files_skipped += 1;
                continue;
            }

            let decision = ctx
                .retry
                .attempt(|| detector.decide(file, existing))
                .map_err(|e| io_err(file.path(), e))?;
            let target = existing
                .map(|dest| dest.path().to_path_buf())
                .unwrap_or_else(|| destination.join(file.file_name()));
            let path = relative(&ctx.source_root, file.path());
            let description = self.describe(&path, file.info());

            match decision {
                Decision::Skip => {
                    tracing::debug!(path = %path, "content unchanged");
                    self.stats.files_skipped += 1;
                }
                Decision::Defer => {
                    tracing::debug!(path = %path, "deferring copy");
                    self.deferred.push(DeferredFile {
                        source: file.clone(),
                        destination: target,
                        path,
                        description,
                    });
                }
                Decision::Copy => {
                    self.log.record(&SyncAction::CopyFile {
                        path,
                        details: description,
                    });
                    self.copy_file(file, &target)?;
                }
            }
        }

        for (key, dir) in &dest_listing.dirs {
            if !source_listing.dirs.contains_key(key) {
                self.delete_dir(dir)?;
            }
        }

        for (key, sub) in &source_listing.dirs {
            if ctx.ignore.is_ignored(sub.name()) {
                continue;
            }
            let target = dest_listing
                .dirs
                .get(key)
                .map(|d| d.path().to_path_buf())
                .unwrap_or_else(|| destination.join(sub.file_name()));
            self.record(sub.path());
            self.sync_dir(sub, &target)?;
        }

        Ok(())
    }

    /// Delete an authorized destination-only directory, depth first.
    ///
    /// Returns whether the directory was removed. Ignored children and
    /// children missing from the previous manifest are left in place and
    /// keep the directory alive. A symlinked directory is unlinked without
    /// touching what it points to.
    fn delete_dir(&mut self, dir: &DirEntry) -> Result<bool, SyncError> {
        let ctx = self.ctx;
        if ctx.ignore.is_ignored(dir.name()) {
            return Ok(false);
        }
        let dir_relative = self.destination_relative(dir.path());
        if !self.is_authorized(dir.path()) {
            tracing::debug!(
                path = %dir_relative,
                "keeping directory not placed by a previous sync"
            );
            return Ok(false);
        }

        if dir.is_symlink() {
            self.log.record(&SyncAction::DeleteDirectory {
                path: dir_relative,
            });
            self.stats.directories_deleted += 1;
            if !ctx.what_if {
                let link = dir.path();
                self.resilient(link, || remove_link_if_present(link))?;
            }
            return Ok(true);
        }

        let listing = self.list(dir)?;
        let mut cleared = true;
        for file in listing.files.values() {
            if ctx.ignore.is_ignored(file.name()) || !self.is_authorized(file.path()) {
                cleared = false;
                continue;
            }
            self.delete_file(file)?;
        }
        for sub in listing.dirs.values() {
            if !self.delete_dir(sub)? {
                cleared = false;
            }
        }

        let empty = if ctx.what_if {
            cleared
        } else {
            dir.is_empty().map_err(|e| io_err(dir.path(), e))?
        };
        if !empty {
            tracing::debug!(path = %dir_relative, "directory not empty after cleanup, keeping");
            return Ok(false);
        }

        self.log.record(&SyncAction::DeleteDirectory {
            path: dir_relative,
        });
        self.stats.directories_deleted += 1;
        if !ctx.what_if {
            std::fs::remove_dir(dir.path()).map_err(|e| io_err(dir.path(), e))?;
        }
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // File operations
    // -----------------------------------------------------------------------

    fn create_dir(&mut self, source: &DirEntry, destination: &Path) -> Result<(), SyncError> {
        self.stats.directories_created += 1;
        if self.ctx.what_if {
            return Ok(());
        }
        std::fs::create_dir_all(destination).map_err(|e| io_err(destination, e))?;
        if self.ctx.copy_metadata {
            std::fs::set_permissions(destination, directory_permissions(source.info()))
                .map_err(|e| io_err(destination, e))?;
        }
        Ok(())
    }

    fn delete_file(&mut self, file: &FileEntry) -> Result<(), SyncError> {
        let relative = self.destination_relative(file.path());
        self.log.record(&SyncAction::DeleteFile { path: relative });
        self.stats.files_deleted += 1;
        if self.ctx.what_if {
            return Ok(());
        }
        let path = file.path();
        self.resilient(path, || remove_file_if_present(path))
    }

    fn copy_file(&mut self, source: &FileEntry, target: &Path) -> Result<(), SyncError> {
        self.stats.files_copied += 1;
        if self.ctx.what_if {
            return Ok(());
        }
        let modified = source.modified();
        self.resilient(target, || copy_preserving_mtime(source.path(), target, modified))?;
        if self.ctx.copy_metadata {
            self.ctx
                .retry
                .attempt(|| apply_metadata(source.info(), target))
                .map_err(|e| io_err(target, e))?;
        }
        Ok(())
    }

    /// Retry `op` with the quarantine fallback for `target`.
    fn resilient<T>(
        &mut self,
        target: &Path,
        mut op: impl FnMut() -> io::Result<T>,
    ) -> Result<T, SyncError> {
        let retry = self.ctx.retry;
        let area = self.quarantine;
        let log = &mut *self.log;
        retry.attempt(|| quarantine::run_or_move_aside(area, target, &mut op, &mut *log))
    }

    fn list(&self, dir: &DirEntry) -> Result<Listing, SyncError> {
        let children = self
            .ctx
            .retry
            .attempt(|| dir.children())
            .map_err(|e| io_err(dir.path(), e))?;
        Listing::build(dir.path(), children)
    }

    // -----------------------------------------------------------------------
    // Paths and authorization
    // -----------------------------------------------------------------------

    /// Whether the destination entry at `path` may be deleted.
    ///
    /// Paths without a manifest form are only deleted when manifests are
    /// ignored.
    fn is_authorized(&self, path: &Path) -> bool {
        if self.ctx.ignore_manifest {
            return true;
        }
        let sub_folder = self.ctx.target_sub_folder.as_deref();
        manifest::relative_path(&self.ctx.destination_root, path, sub_folder)
            .is_some_and(|recorded| self.previous.contains(&recorded))
    }

    /// Add the source entry at `path` to the next manifest.
    fn record(&mut self, path: &Path) {
        let sub_folder = self.ctx.target_sub_folder.as_deref();
        match manifest::relative_path(&self.ctx.source_root, path, sub_folder) {
            Some(recorded) => {
                self.next.insert(&recorded);
            }
            None => {
                tracing::warn!(path = %path.display(), "name is not valid UTF-8, not recorded");
            }
        }
    }

    fn destination_relative(&self, path: &Path) -> String {
        relative(&self.ctx.destination_root, path)
    }

    fn describe(&self, relative: &str, info: &EntryInfo) -> String {
        let tag = if self.ctx.copy_metadata {
            info.attribute_tag()
        } else {
            String::new()
        };
        if tag.is_empty() {
            relative.to_string()
        } else {
            format!("{relative} {tag}")
        }
    }
}

/// `path` relative to `root` for log lines; undecodable bytes are replaced.
fn relative(root: &Path, path: &Path) -> String {
    let rest = path.strip_prefix(root).unwrap_or(path);
    manifest::normalize(&rest.to_string_lossy())
}

/// Deleting a file that is already gone counts as success; a quarantine move
/// may have taken it.
fn remove_file_if_present(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Remove a directory symlink, leaving its target alone.
fn remove_link_if_present(link: &Path) -> io::Result<()> {
    #[cfg(windows)]
    let removed = std::fs::remove_dir(link);
    #[cfg(not(windows))]
    let removed = std::fs::remove_file(link);
    match removed {
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Copy `source` over `target` and give `target` the source's last-write
/// time, so the next run's timestamp comparison sees it as unchanged.
fn copy_preserving_mtime(source: &Path, target: &Path, modified: SystemTime) -> io::Result<()> {
    std::fs::copy(source, target)?;
    filetime::set_file_mtime(target, FileTime::from_system_time(modified))
}

/// Replicate timestamps and permissions from `source` onto `target`.
///
/// The target is made writable first; a read-only file rejects timestamp
/// writes on some platforms. Source permissions are restored last.
fn apply_metadata(source: &EntryInfo, target: &Path) -> io::Result<()> {
    let mut writable = std::fs::metadata(target)?.permissions();
    make_writable(&mut writable);
    std::fs::set_permissions(target, writable)?;

    let modified = FileTime::from_system_time(source.modified);
    let accessed = source
        .accessed
        .map(FileTime::from_system_time)
        .unwrap_or(modified);
    filetime::set_file_times(target, accessed, modified)?;

    std::fs::set_permissions(target, source.permissions.clone())
}

#[cfg(unix)]
fn make_writable(perms: &mut Permissions) {
    use std::os::unix::fs::PermissionsExt;
    perms.set_mode(perms.mode() | 0o200);
}

#[cfg(not(unix))]
#[allow(clippy::permissions_set_readonly_false)]
fn make_writable(perms: &mut Permissions) {
    perms.set_readonly(false);
}

/// Source directory permissions, keeping the owner able to fill the new
/// directory.
#[cfg(unix)]
fn directory_permissions(source: &EntryInfo) -> Permissions {
    use std::os::unix::fs::PermissionsExt;
    Permissions::from_mode(source.permissions.mode() | 0o700)
}

#[cfg(not(unix))]
fn directory_permissions(source: &EntryInfo) -> Permissions {
    source.permissions.clone()
}
