//! Quarantine area for files that cannot be replaced or deleted in place.
//!
//! When a copy or delete fails because the destination file is held open,
//! the file is renamed into the quarantine directory under a random suffix
//! and the operation is tried once more. Quarantined files are never read
//! back; the directory is purged (best effort) at the start and end of a run.
//!
//! The rename only succeeds when the quarantine directory lives on the same
//! filesystem as the destination.

use std::cell::Cell;
use std::io;
use std::path::{Path, PathBuf};

use treesync_core::RetryPolicy;
use uuid::Uuid;

use crate::error::{io_err, SyncError};
use crate::log::{ActionLog, SyncAction};

/// Scratch directory receiving locked files.
#[derive(Debug)]
pub struct QuarantineArea {
    dir: PathBuf,
    moved: Cell<usize>,
}

impl QuarantineArea {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            moved: Cell::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Number of files moved aside so far.
    pub fn moved_count(&self) -> usize {
        self.moved.get()
    }

    /// Remove the quarantine directory and everything in it.
    ///
    /// Returns `false` when it could not be removed; callers log and carry
    /// on.
    pub fn purge(&self, retry: &RetryPolicy) -> bool {
        if !self.dir.exists() {
            return true;
        }
        match retry.attempt(|| std::fs::remove_dir_all(&self.dir)) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(path = %self.dir.display(), error = %err, "quarantine purge failed");
                false
            }
        }
    }

    /// Move `file` into the quarantine directory under a collision-free name
    /// and return its new path.
    pub fn move_aside(&self, file: &Path, log: &mut dyn ActionLog) -> io::Result<PathBuf> {
        if !self.dir.exists() {
            std::fs::create_dir_all(&self.dir)?;
            log.record(&SyncAction::CreateScratch {
                path: self.dir.clone(),
            });
        }

        let mut name = file.file_name().unwrap_or_default().to_os_string();
        name.push(format!(".{}", Uuid::new_v4().simple()));
        let target = self.dir.join(name);
        std::fs::rename(file, &target)?;

        self.moved.set(self.moved.get() + 1);
        log.record(&SyncAction::Quarantine {
            path: file.to_path_buf(),
            moved_to: target.clone(),
        });
        Ok(target)
    }
}

/// Run `op`, which replaces or deletes the file at `target`.
///
/// On failure (other than `NotFound`), and when `area` is set and a file
/// exists at `target`, the file is moved aside and `op` runs once more. A
/// failed move is reported as [`SyncError::Locked`].
pub fn run_or_move_aside<T>(
    area: Option<&QuarantineArea>,
    target: &Path,
    op: &mut dyn FnMut() -> io::Result<T>,
    log: &mut dyn ActionLog,
) -> Result<T, SyncError> {
    let err = match op() {
        Ok(value) => return Ok(value),
        Err(err) => err,
    };

    let Some(area) = area else {
        return Err(io_err(target, err));
    };
    if err.kind() == io::ErrorKind::NotFound || !target.is_file() {
        return Err(io_err(target, err));
    }

    tracing::debug!(path = %target.display(), error = %err, "moving locked file aside");
    match area.move_aside(target, log) {
        Ok(_) => op().map_err(|e| io_err(target, e)),
        Err(move_err) => {
            tracing::debug!(error = %move_err, "quarantine move failed");
            Err(SyncError::Locked {
                path: target.to_path_buf(),
                source: err,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::MemoryLog;
    use tempfile::TempDir;

    fn locked() -> io::Error {
        io::Error::new(io::ErrorKind::PermissionDenied, "file is in use")
    }

    /// Simulates a delete blocked by a lock held on whatever sits at `path`:
    /// the delete only goes through once the original file is gone.
    fn delete_blocked_while_present(path: PathBuf) -> impl FnMut() -> io::Result<()> {
        move || {
            if path.exists() {
                Err(locked())
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn locked_file_is_moved_aside_and_operation_retried() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("app.dll");
        std::fs::write(&target, "in use").unwrap();
        let area = QuarantineArea::new(tmp.path().join("data").join("tobedeleted"));
        let mut log = MemoryLog::new();

        let mut op = delete_blocked_while_present(target.clone());
        run_or_move_aside(Some(&area), &target, &mut op, &mut log).unwrap();

        assert!(!target.exists());
        assert_eq!(area.moved_count(), 1);
        let moved: Vec<_> = std::fs::read_dir(area.path()).unwrap().collect();
        assert_eq!(moved.len(), 1);
        assert!(matches!(log.actions[0], SyncAction::CreateScratch { .. }));
        assert!(matches!(log.actions[1], SyncAction::Quarantine { .. }));
    }

    #[test]
    fn repeated_moves_do_not_collide() {
        let tmp = TempDir::new().unwrap();
        let area = QuarantineArea::new(tmp.path().join("q"));
        let mut log = MemoryLog::new();
        for _ in 0..3 {
            let target = tmp.path().join("same.txt");
            std::fs::write(&target, "x").unwrap();
            area.move_aside(&target, &mut log).unwrap();
        }
        assert_eq!(std::fs::read_dir(area.path()).unwrap().count(), 3);
    }

    #[test]
    fn disabled_area_surfaces_the_original_error() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("f");
        std::fs::write(&target, "x").unwrap();
        let mut log = MemoryLog::new();

        let mut op = delete_blocked_while_present(target.clone());
        let err = run_or_move_aside(None, &target, &mut op, &mut log).unwrap_err();
        assert!(matches!(err, SyncError::Io { .. }));
        assert!(target.exists());
    }

    #[test]
    fn failed_move_reports_locked_path() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("f");
        std::fs::write(&target, "x").unwrap();
        // A file where the quarantine directory should be makes the move fail.
        let blocker = tmp.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let area = QuarantineArea::new(blocker.join("tobedeleted"));
        let mut log = MemoryLog::new();

        let mut op = delete_blocked_while_present(target.clone());
        let err = run_or_move_aside(Some(&area), &target, &mut op, &mut log).unwrap_err();
        match err {
            SyncError::Locked { path, .. } => assert_eq!(path, target),
            other => panic!("expected Locked, got {other:?}"),
        }
    }

    #[test]
    fn missing_target_is_not_quarantined() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("absent");
        let area = QuarantineArea::new(tmp.path().join("q"));
        let mut log = MemoryLog::new();

        let mut op = || -> io::Result<()> { Err(locked()) };
        let err = run_or_move_aside(Some(&area), &target, &mut op, &mut log).unwrap_err();
        assert!(matches!(err, SyncError::Io { .. }));
        assert_eq!(area.moved_count(), 0);
        assert!(!area.path().exists());
    }

    #[test]
    fn purge_removes_stale_entries() {
        let tmp = TempDir::new().unwrap();
        let area = QuarantineArea::new(tmp.path().join("q"));
        std::fs::create_dir_all(area.path()).unwrap();
        std::fs::write(area.path().join("stale.abc"), "old").unwrap();

        assert!(area.purge(&RetryPolicy::immediate(1)));
        assert!(!area.path().exists());
        assert!(area.purge(&RetryPolicy::immediate(1)));
    }
}
