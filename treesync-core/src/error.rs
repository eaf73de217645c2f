//! Error types for treesync-core.

use std::path::PathBuf;

use thiserror::Error;

/// Configuration and manifest errors.
///
/// Everything here is raised before the destination tree is touched, except
/// [`CoreError::Io`] coming from [`crate::Manifest::save`] at the end of a run.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An ignore token used `*` anywhere but the leading position, or
    /// contained a path separator.
    #[error(
        "invalid ignore pattern '{pattern}': wildcards are limited to prefix matching \
         such as '*.txt' and patterns cannot contain path separators"
    )]
    InvalidIgnorePattern { pattern: String },

    /// A full-compare token was not an exact name, `*suffix` or `prefix*`.
    #[error(
        "invalid full-compare pattern '{pattern}': only exact names, '*suffix' and \
         'prefix*' are supported"
    )]
    InvalidComparePattern { pattern: String },

    /// Source and destination are the same directory or nest inside each other.
    #[error(
        "source and destination directories cannot be sub-directories of each other \
         ({from} / {to})"
    )]
    OverlappingRoots { from: PathBuf, to: PathBuf },

    /// The target sub-folder must be a plain relative path.
    #[error("invalid target sub-folder '{0}': must be a relative path without '..'")]
    InvalidSubFolder(String),

    /// A required option was not supplied.
    #[error("the '{0}' option must be specified")]
    MissingOption(&'static str),

    /// The source root does not exist or is not a directory.
    #[error("source directory not found: {path}")]
    SourceNotFound { path: PathBuf },

    /// Underlying I/O failure, annotated with the offending path.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error on a config file.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Convenience constructor for [`CoreError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> CoreError {
    CoreError::Io {
        path: path.into(),
        source,
    }
}
