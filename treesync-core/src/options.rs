//! Sync parameters and the validated per-run context.
//!
//! [`SyncOptions`] is the raw parameter set, filled from a YAML config file
//! and/or command-line flags. [`SyncContext::from_options`] validates it and
//! resolves everything a run needs; the context is immutable afterwards.
//!
//! # Config file
//!
//! ```yaml
//! from: ./build/output
//! to: /srv/site
//! target_sub_folder: app
//! previous_manifest: /srv/state/manifest
//! next_manifest: /srv/state/manifest
//! ignore: ".git;*.pdb"
//! full_compare: "appsettings*"
//! copy_metadata: true
//! retry:
//!   attempts: 10
//!   delay_ms: 250
//! ```

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{io_err, CoreError};
use crate::manifest;
use crate::pattern::{IgnoreSpec, NameMatcher};
use crate::retry::RetryPolicy;

/// Files whose replacement has side effects downstream (an application
/// restart); they are content-compared and copied after the main walk.
pub const DEFAULT_DEFERRED_FILES: &[&str] = &["web.config"];

/// Any non-empty value disables moving locked files into quarantine.
pub const DISABLE_QUARANTINE_ENV: &str = "TREESYNC_DISABLE_QUARANTINE";

/// Sub-directory of the data directory that holds quarantined files.
pub const QUARANTINE_DIR_NAME: &str = "tobedeleted";

// ---------------------------------------------------------------------------
// SyncOptions
// ---------------------------------------------------------------------------

/// Raw sync parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncOptions {
    pub from: Option<PathBuf>,
    pub to: Option<PathBuf>,
    pub target_sub_folder: Option<String>,
    pub previous_manifest: Option<PathBuf>,
    pub next_manifest: Option<PathBuf>,
    pub ignore_manifest: bool,
    pub copy_metadata: bool,
    /// Semicolon-delimited exact names and `*suffix` patterns.
    pub ignore: Option<String>,
    /// Semicolon-delimited names compared by content hash instead of
    /// timestamp.
    pub full_compare: Option<String>,
    pub what_if: bool,
    pub data_dir: Option<PathBuf>,
    pub disable_quarantine: bool,
    pub retry: Option<RetryPolicy>,
}

impl SyncOptions {
    /// Read options from a YAML file.
    pub fn load_yaml(path: &Path) -> Result<Self, CoreError> {
        let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
        serde_yaml::from_str(&contents).map_err(|e| CoreError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Layer `over` on top of `self`: values set in `over` win, flags are
    /// OR-ed.
    pub fn overlay(self, over: SyncOptions) -> SyncOptions {
        SyncOptions {
            from: over.from.or(self.from),
            to: over.to.or(self.to),
            target_sub_folder: over.target_sub_folder.or(self.target_sub_folder),
            previous_manifest: over.previous_manifest.or(self.previous_manifest),
            next_manifest: over.next_manifest.or(self.next_manifest),
            ignore_manifest: over.ignore_manifest || self.ignore_manifest,
            copy_metadata: over.copy_metadata || self.copy_metadata,
            ignore: over.ignore.or(self.ignore),
            full_compare: over.full_compare.or(self.full_compare),
            what_if: over.what_if || self.what_if,
            data_dir: over.data_dir.or(self.data_dir),
            disable_quarantine: over.disable_quarantine || self.disable_quarantine,
            retry: over.retry.or(self.retry),
        }
    }
}

// ---------------------------------------------------------------------------
// SyncContext
// ---------------------------------------------------------------------------

/// Validated, immutable configuration for one run.
#[derive(Debug, Clone)]
pub struct SyncContext {
    pub source_root: PathBuf,
    /// Destination root as given, without the target sub-folder.
    pub destination_base: PathBuf,
    /// Directory the source tree is mirrored onto (base + sub-folder).
    pub destination_root: PathBuf,
    /// Normalised sub-folder; manifest paths are prefixed with it.
    pub target_sub_folder: Option<String>,
    pub previous_manifest: Option<PathBuf>,
    pub next_manifest: Option<PathBuf>,
    pub ignore_manifest: bool,
    pub copy_metadata: bool,
    pub what_if: bool,
    pub ignore: IgnoreSpec,
    pub full_compare: NameMatcher,
    pub deferred: NameMatcher,
    /// `None` when the quarantine fallback is disabled.
    pub quarantine_dir: Option<PathBuf>,
    pub retry: RetryPolicy,
}

impl SyncContext {
    /// Validate `opts`.
    ///
    /// Fails before anything on disk is touched when a required option is
    /// missing, a pattern is invalid, the source is missing, or source and
    /// destination overlap.
    pub fn from_options(opts: &SyncOptions) -> Result<Self, CoreError> {
        let from = opts.from.as_deref().ok_or(CoreError::MissingOption("from"))?;
        let to = opts.to.as_deref().ok_or(CoreError::MissingOption("to"))?;
        if !opts.ignore_manifest && opts.next_manifest.is_none() {
            return Err(CoreError::MissingOption("next_manifest"));
        }

        let ignore = IgnoreSpec::parse(opts.ignore.as_deref().unwrap_or_default())?;
        let full_compare = NameMatcher::parse(opts.full_compare.as_deref().unwrap_or_default())?;
        let target_sub_folder = opts
            .target_sub_folder
            .as_deref()
            .map(parse_sub_folder)
            .transpose()?
            .flatten();

        let source_root = absolute(from)?;
        let destination_base = absolute(to)?;
        if source_root.starts_with(&destination_base) || destination_base.starts_with(&source_root)
        {
            return Err(CoreError::OverlappingRoots {
                from: source_root,
                to: destination_base,
            });
        }
        if !source_root.is_dir() {
            return Err(CoreError::SourceNotFound { path: source_root });
        }

        let mut destination_root = destination_base.clone();
        if let Some(sub) = &target_sub_folder {
            destination_root.extend(sub.split('/'));
        }

        let quarantine_dir = if opts.disable_quarantine || quarantine_disabled_by_env() {
            None
        } else {
            let data_dir = opts.data_dir.clone().unwrap_or_else(default_data_dir);
            Some(data_dir.join(QUARANTINE_DIR_NAME))
        };

        Ok(Self {
            source_root,
            destination_base,
            destination_root,
            target_sub_folder,
            previous_manifest: opts.previous_manifest.clone(),
            next_manifest: opts.next_manifest.clone(),
            ignore_manifest: opts.ignore_manifest,
            copy_metadata: opts.copy_metadata,
            what_if: opts.what_if,
            ignore,
            full_compare,
            deferred: NameMatcher::exact(DEFAULT_DEFERRED_FILES),
            quarantine_dir,
            retry: opts.retry.unwrap_or_default(),
        })
    }
}

/// `<local data dir>/treesync`, or `<temp>/treesync` when the platform has no
/// data directory.
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("treesync")
}

pub fn quarantine_disabled_by_env() -> bool {
    std::env::var_os(DISABLE_QUARANTINE_ENV).is_some_and(|v| !v.is_empty())
}

fn parse_sub_folder(raw: &str) -> Result<Option<String>, CoreError> {
    let invalid = || CoreError::InvalidSubFolder(raw.to_string());
    let trimmed = raw.trim();
    if trimmed.starts_with(['/', '\\']) || Path::new(trimmed).is_absolute() {
        return Err(invalid());
    }
    let normalized = manifest::normalize(trimmed);
    if normalized.split('/').any(|segment| segment == ".." || segment.contains(':')) {
        return Err(invalid());
    }
    Ok(Some(normalized).filter(|s| !s.is_empty()))
}

/// Absolute form of `path` with `.` and `..` resolved lexically. Symlinks are
/// not followed and the path need not exist.
fn absolute(path: &Path) -> Result<PathBuf, CoreError> {
    let abs = std::path::absolute(path).map_err(|e| io_err(path, e))?;
    let mut out = PathBuf::new();
    for component in abs.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn opts(src: &Path, dst: &Path) -> SyncOptions {
        SyncOptions {
            from: Some(src.to_path_buf()),
            to: Some(dst.to_path_buf()),
            next_manifest: Some(dst.with_extension("manifest")),
            ..SyncOptions::default()
        }
    }

    #[test]
    fn valid_options_resolve_to_context() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        std::fs::create_dir(&src).unwrap();
        let dst = tmp.path().join("dst");

        let mut o = opts(&src, &dst);
        o.ignore = Some(".git;*.pdb".into());
        o.data_dir = Some(tmp.path().join("data"));
        o.disable_quarantine = false;
        let ctx = SyncContext::from_options(&o).unwrap();

        assert_eq!(ctx.source_root, src);
        assert_eq!(ctx.destination_root, dst);
        assert!(ctx.ignore.is_ignored("App.PDB"));
        assert!(ctx.deferred.matches("Web.config"));
        assert_eq!(ctx.retry, RetryPolicy::default());
        if !quarantine_disabled_by_env() {
            assert_eq!(
                ctx.quarantine_dir,
                Some(tmp.path().join("data").join(QUARANTINE_DIR_NAME))
            );
        }
    }

    #[test]
    fn missing_roots_are_reported() {
        let err = SyncContext::from_options(&SyncOptions::default()).unwrap_err();
        assert!(matches!(err, CoreError::MissingOption("from")));
    }

    #[test]
    fn next_manifest_required_unless_ignoring_manifest() {
        let tmp = TempDir::new().unwrap();
        let mut o = opts(&tmp.path().join("a"), &tmp.path().join("b"));
        std::fs::create_dir(tmp.path().join("a")).unwrap();
        o.next_manifest = None;
        let err = SyncContext::from_options(&o).unwrap_err();
        assert!(matches!(err, CoreError::MissingOption("next_manifest")));

        o.ignore_manifest = true;
        assert!(SyncContext::from_options(&o).is_ok());
    }

    #[test]
    fn nested_roots_are_rejected() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("site");
        std::fs::create_dir(&src).unwrap();

        let err = SyncContext::from_options(&opts(&src, &src.join("out"))).unwrap_err();
        assert!(matches!(err, CoreError::OverlappingRoots { .. }));

        let err = SyncContext::from_options(&opts(&src, &src)).unwrap_err();
        assert!(matches!(err, CoreError::OverlappingRoots { .. }));

        let dotted = src.join("x").join("..");
        let err = SyncContext::from_options(&opts(&src, &dotted)).unwrap_err();
        assert!(matches!(err, CoreError::OverlappingRoots { .. }));
    }

    #[test]
    fn missing_source_is_a_config_error() {
        let tmp = TempDir::new().unwrap();
        let err = SyncContext::from_options(&opts(&tmp.path().join("nope"), &tmp.path().join("d")))
            .unwrap_err();
        assert!(matches!(err, CoreError::SourceNotFound { .. }));
    }

    #[test]
    fn sub_folder_extends_destination_root() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        std::fs::create_dir(&src).unwrap();
        let dst = tmp.path().join("dst");

        let mut o = opts(&src, &dst);
        o.target_sub_folder = Some("app\\v2/".into());
        let ctx = SyncContext::from_options(&o).unwrap();
        assert_eq!(ctx.target_sub_folder.as_deref(), Some("app/v2"));
        assert_eq!(ctx.destination_root, dst.join("app").join("v2"));
        assert_eq!(ctx.destination_base, dst);

        o.target_sub_folder = Some("../escape".into());
        assert!(matches!(
            SyncContext::from_options(&o).unwrap_err(),
            CoreError::InvalidSubFolder(_)
        ));
    }

    #[test]
    fn invalid_ignore_pattern_fails_validation() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        std::fs::create_dir(&src).unwrap();
        let mut o = opts(&src, &tmp.path().join("dst"));
        o.ignore = Some("bin/*".into());
        assert!(matches!(
            SyncContext::from_options(&o).unwrap_err(),
            CoreError::InvalidIgnorePattern { .. }
        ));
    }

    #[test]
    fn overlay_prefers_set_values_and_ors_flags() {
        let base = SyncOptions {
            from: Some("a".into()),
            to: Some("b".into()),
            copy_metadata: true,
            ..SyncOptions::default()
        };
        let cli = SyncOptions {
            to: Some("c".into()),
            what_if: true,
            ..SyncOptions::default()
        };
        let merged = base.overlay(cli);
        assert_eq!(merged.from, Some(PathBuf::from("a")));
        assert_eq!(merged.to, Some(PathBuf::from("c")));
        assert!(merged.copy_metadata);
        assert!(merged.what_if);
    }
}
