//! The sync command: mirror `--from` onto `--to`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use treesync_core::{SyncContext, SyncOptions};
use treesync_sync::{pipeline, MemoryLog, SyncAction, SyncReport};

use crate::console::{ConsoleLog, Verbosity};

/// Arguments for a sync run. Values given here override `--config`.
#[derive(Args, Debug, Default)]
pub struct SyncArgs {
    /// Source directory to sync.
    #[arg(short = 'f', long)]
    pub from: Option<PathBuf>,

    /// Destination directory to sync to.
    #[arg(short = 't', long)]
    pub to: Option<PathBuf>,

    /// Sub-folder of the destination to sync into; manifest paths stay
    /// relative to `--to`.
    #[arg(short = 's', long)]
    pub target_sub_folder: Option<String>,

    /// Manifest file to write after the run.
    #[arg(short = 'n', long)]
    pub next_manifest: Option<PathBuf>,

    /// Manifest written by the previous run.
    #[arg(short = 'p', long)]
    pub previous_manifest: Option<PathBuf>,

    /// Disregard manifests: delete everything in the destination that is not
    /// in the source.
    #[arg(short = 'x', long)]
    pub ignore_manifest: bool,

    /// Copy timestamps and permissions along with content.
    #[arg(short = 'm', long)]
    pub copy_metadata: bool,

    /// Semicolon-delimited names to ignore (`.git;*.pdb`).
    #[arg(short = 'i', long)]
    pub ignore: Option<String>,

    /// Semicolon-delimited names compared by content instead of timestamp.
    #[arg(long)]
    pub full_compare: Option<String>,

    /// Print no action lines.
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Print at most this many action lines (0 prints all).
    #[arg(short = 'v', long, value_name = "LINES")]
    pub verbose: Option<usize>,

    /// Report what would change without touching anything.
    #[arg(short = 'w', long)]
    pub what_if: bool,

    /// Print the elapsed time in milliseconds.
    #[arg(long)]
    pub perf: bool,

    /// Print a JSON run summary instead of action lines.
    #[arg(long, conflicts_with_all = ["quiet", "verbose"])]
    pub json: bool,

    /// Directory for treesync state (quarantined files).
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// YAML file with default option values.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Fail on locked files instead of moving them aside.
    #[arg(long)]
    pub no_quarantine: bool,
}

#[derive(Serialize)]
struct JsonSummary<'a> {
    #[serde(flatten)]
    report: &'a SyncReport,
    actions: &'a [SyncAction],
}

impl SyncArgs {
    pub fn run(self) -> Result<()> {
        let options = self.options()?;
        let ctx = SyncContext::from_options(&options).context("invalid sync options")?;

        if self.json {
            let mut log = MemoryLog::new();
            let report = pipeline::run(&ctx, &mut log).context("sync failed")?;
            let summary = JsonSummary {
                report: &report,
                actions: &log.actions,
            };
            println!("{}", serde_json::to_string_pretty(&summary)?);
            return Ok(());
        }

        let mut log = ConsoleLog::stdout(Verbosity::from_flags(self.quiet, self.verbose));
        let report = pipeline::run(&ctx, &mut log).context("sync failed")?;
        if self.perf {
            println!("Time {}", report.elapsed_ms);
        }
        Ok(())
    }

    /// Options from `--config`, if any, overlaid with the flags.
    fn options(&self) -> Result<SyncOptions> {
        let base = match &self.config {
            Some(path) => SyncOptions::load_yaml(path)
                .with_context(|| format!("failed to read config {}", path.display()))?,
            None => SyncOptions::default(),
        };
        Ok(base.overlay(self.flag_options()))
    }

    fn flag_options(&self) -> SyncOptions {
        SyncOptions {
            from: self.from.clone(),
            to: self.to.clone(),
            target_sub_folder: self.target_sub_folder.clone(),
            previous_manifest: self.previous_manifest.clone(),
            next_manifest: self.next_manifest.clone(),
            ignore_manifest: self.ignore_manifest,
            copy_metadata: self.copy_metadata,
            ignore: self.ignore.clone(),
            full_compare: self.full_compare.clone(),
            what_if: self.what_if,
            data_dir: self.data_dir.clone(),
            disable_quarantine: self.no_quarantine,
            retry: None,
        }
    }
}
