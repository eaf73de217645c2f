//! Error types for treesync-sync.

use std::path::PathBuf;

use thiserror::Error;

use treesync_core::CoreError;

/// All errors that can abort a sync run.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Configuration or manifest error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file could not be replaced and could not be moved aside either.
    #[error("failed to change file that is currently being used \"{path}\": {source}")]
    Locked {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Two entries in one directory differ only by case.
    #[error("'{first}' and '{second}' in {dir} differ only by case")]
    CaseConflict {
        dir: PathBuf,
        first: String,
        second: String,
    },
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
