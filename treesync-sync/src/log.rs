//! Action reporting.
//!
//! The reconciler reports one [`SyncAction`] per externally visible change
//! through an [`ActionLog`] handle owned by the caller. How lines are
//! rendered, throttled or stored is the handle's business.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

/// One externally visible action taken (or, in what-if mode, planned).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SyncAction {
    /// `details` is the source-relative path plus an optional attribute tag.
    CopyFile { path: String, details: String },
    DeleteFile { path: String },
    DeleteDirectory { path: String },
    /// A locked file was moved into the quarantine area.
    Quarantine { path: PathBuf, moved_to: PathBuf },
    /// A scratch directory was created.
    CreateScratch { path: PathBuf },
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncAction::CopyFile { details, .. } => write!(f, "Copying file: '{details}'"),
            SyncAction::DeleteFile { path } => write!(f, "Deleting file: '{path}'"),
            SyncAction::DeleteDirectory { path } => write!(f, "Deleting directory: '{path}'"),
            SyncAction::Quarantine { path, moved_to } => write!(
                f,
                "Moving locked file '{}' to '{}'",
                path.display(),
                moved_to.display()
            ),
            SyncAction::CreateScratch { path } => {
                write!(f, "Creating directory: '{}'", path.display())
            }
        }
    }
}

/// Sink for actions and free-form notes.
pub trait ActionLog {
    fn record(&mut self, action: &SyncAction);

    /// Informational line that is not an action (run banner, ignored cleanup
    /// failures).
    fn note(&mut self, message: &str) {
        let _ = message;
    }
}

/// Collects everything in memory.
#[derive(Debug, Default)]
pub struct MemoryLog {
    pub actions: Vec<SyncAction>,
    pub notes: Vec<String>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rendered lines, in order.
    pub fn lines(&self) -> Vec<String> {
        self.actions.iter().map(ToString::to_string).collect()
    }

    pub fn copied(&self) -> Vec<&str> {
        self.actions
            .iter()
            .filter_map(|a| match a {
                SyncAction::CopyFile { path, .. } => Some(path.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn deleted(&self) -> Vec<&str> {
        self.actions
            .iter()
            .filter_map(|a| match a {
                SyncAction::DeleteFile { path } | SyncAction::DeleteDirectory { path } => {
                    Some(path.as_str())
                }
                _ => None,
            })
            .collect()
    }
}

impl ActionLog for MemoryLog {
    fn record(&mut self, action: &SyncAction) {
        self.actions.push(action.clone());
    }

    fn note(&mut self, message: &str) {
        self.notes.push(message.to_string());
    }
}
