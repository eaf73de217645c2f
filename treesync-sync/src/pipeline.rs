//! Run orchestration shared by the CLI and library callers.
//!
//! 1. Load the previous manifest (skipped when ignoring manifests).
//! 2. Purge stale quarantine entries, best effort.
//! 3. Reconcile the tree, then flush deferred files.
//! 4. Save the next manifest (not in what-if mode).
//! 5. Purge the quarantine again, best effort.
//!
//! An error anywhere before step 4 leaves the previous manifest untouched so
//! the next run re-derives state from it.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

use treesync_core::{Manifest, SyncContext};

use crate::error::SyncError;
use crate::log::ActionLog;
use crate::quarantine::QuarantineArea;
use crate::reconcile::{SyncStats, TreeReconciler};

/// Summary of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    #[serde(flatten)]
    pub stats: SyncStats,
    pub files_quarantined: usize,
    pub manifest_entries: usize,
    pub manifest_written: bool,
    pub what_if: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

/// Mirror `ctx.source_root` onto `ctx.destination_root`.
pub fn run(ctx: &SyncContext, log: &mut dyn ActionLog) -> Result<SyncReport, SyncError> {
    let started_at = Utc::now();
    let timer = Instant::now();

    let previous = if ctx.ignore_manifest {
        Manifest::new()
    } else {
        Manifest::load(ctx.previous_manifest.as_deref())?
    };

    let quarantine = ctx
        .quarantine_dir
        .as_ref()
        .filter(|_| !ctx.what_if)
        .map(QuarantineArea::new);
    purge(quarantine.as_ref(), ctx, log);

    log.note(&format!(
        "treesync from: '{}' to: '{}'",
        ctx.source_root.display(),
        ctx.destination_root.display()
    ));
    tracing::info!(
        from = %ctx.source_root.display(),
        to = %ctx.destination_root.display(),
        what_if = ctx.what_if,
        "sync started"
    );

    let mut reconciler = TreeReconciler::new(ctx, &previous, quarantine.as_ref(), &mut *log);
    reconciler.reconcile()?;
    reconciler.flush_deferred()?;
    let (next, stats) = reconciler.finish();

    let manifest_written = match &ctx.next_manifest {
        Some(path) if !ctx.what_if => {
            next.save(path)?;
            true
        }
        _ => false,
    };

    purge(quarantine.as_ref(), ctx, log);

    let report = SyncReport {
        stats,
        files_quarantined: quarantine.as_ref().map_or(0, QuarantineArea::moved_count),
        manifest_entries: next.len(),
        manifest_written,
        what_if: ctx.what_if,
        started_at,
        finished_at: Utc::now(),
        elapsed_ms: u64::try_from(timer.elapsed().as_millis()).unwrap_or(u64::MAX),
    };
    tracing::info!(
        copied = report.stats.files_copied,
        deleted = report.stats.files_deleted,
        elapsed_ms = report.elapsed_ms,
        "sync finished"
    );
    Ok(report)
}

fn purge(area: Option<&QuarantineArea>, ctx: &SyncContext, log: &mut dyn ActionLog) {
    if let Some(area) = area {
        if !area.purge(&ctx.retry) {
            log.note(&format!(
                "Cannot remove the quarantine directory '{}', ignoring",
                area.path().display()
            ));
        }
    }
}
