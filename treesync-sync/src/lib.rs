//! # treesync-sync
//!
//! Manifest-aware incremental tree reconciliation.
//!
//! Call [`pipeline::run`] with a validated [`treesync_core::SyncContext`] and
//! an [`ActionLog`] to mirror the source tree onto the destination, or drive
//! a [`TreeReconciler`] directly for finer control.

pub mod detect;
pub mod error;
pub mod log;
pub mod pipeline;
pub mod quarantine;
pub mod reconcile;

pub use detect::{ChangeDetector, Decision};
pub use error::SyncError;
pub use log::{ActionLog, MemoryLog, SyncAction};
pub use pipeline::{run, SyncReport};
pub use quarantine::QuarantineArea;
pub use reconcile::{DeferredFile, SyncStats, TreeReconciler};
