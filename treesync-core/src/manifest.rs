//! Deployment manifest: the paths a previous run placed at the destination.
//!
//! # On-disk format
//!
//! Plain text, one destination-relative path per line, no escaping. Paths use
//! `/` as separator; `\` separators from older manifests are normalised on
//! load. A missing file is an empty manifest.
//!
//! Writes use the `.tmp` + rename pattern so a run that aborts never leaves a
//! partial manifest behind.

use std::collections::HashSet;
use std::path::{Component, Path};

use crate::error::{io_err, CoreError};
use crate::pattern::name_key;

/// Ordered, case-insensitive set of destination-relative paths.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    paths: Vec<String>,
    index: HashSet<String>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a manifest file. `None` or a missing file yields an empty manifest.
    pub fn load(path: Option<&Path>) -> Result<Self, CoreError> {
        let mut manifest = Self::new();
        let Some(path) = path else {
            return Ok(manifest);
        };
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no previous manifest");
            return Ok(manifest);
        }

        let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
        for line in contents.lines() {
            manifest.insert(line);
        }
        Ok(manifest)
    }

    /// Save the manifest atomically.
    ///
    /// Writes to `<path>.tmp` then renames to `<path>`.
    pub fn save(&self, path: &Path) -> Result<(), CoreError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        }

        let mut contents = self.paths.join("\n");
        if !contents.is_empty() {
            contents.push('\n');
        }

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = std::path::PathBuf::from(tmp);
        std::fs::write(&tmp, contents).map_err(|e| io_err(&tmp, e))?;
        if let Err(e) = std::fs::rename(&tmp, path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(io_err(path, e));
        }
        tracing::debug!(path = %path.display(), entries = self.paths.len(), "manifest saved");
        Ok(())
    }

    /// Record a relative path. Duplicates (ignoring case) are dropped.
    pub fn insert(&mut self, relative: &str) -> bool {
        let relative = normalize(relative);
        if relative.is_empty() {
            return false;
        }
        if !self.index.insert(name_key(&relative)) {
            return false;
        }
        self.paths.push(relative);
        true
    }

    pub fn contains(&self, relative: &str) -> bool {
        self.index.contains(&name_key(&normalize(relative)))
    }

    /// Paths in insertion order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Canonical form of a relative manifest path: `/` separators, no leading,
/// trailing or doubled separators, no `.` segments.
///
/// Only line terminators are stripped; spaces are part of a name.
pub fn normalize(relative: &str) -> String {
    relative
        .trim_end_matches(['\r', '\n'])
        .split(['/', '\\'])
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// `path` relative to `root` in canonical manifest form, optionally prefixed
/// with `sub_folder`.
///
/// Returns `None` when `path` is not under `root` or when a component is not
/// valid UTF-8; such paths cannot be written to a manifest line.
pub fn relative_path(root: &Path, path: &Path, sub_folder: Option<&str>) -> Option<String> {
    let rest = path.strip_prefix(root).ok()?;
    let mut segments: Vec<String> = Vec::new();
    if let Some(sub) = sub_folder {
        let sub = normalize(sub);
        if !sub.is_empty() {
            segments.push(sub);
        }
    }
    for component in rest.components() {
        if let Component::Normal(part) = component {
            segments.push(part.to_str()?.to_string());
        }
    }
    Some(segments.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn empty_manifest_when_file_missing() {
        let tmp = TempDir::new().unwrap();
        let manifest = Manifest::load(Some(&tmp.path().join("absent.txt"))).unwrap();
        assert!(manifest.is_empty());
        assert!(Manifest::load(None).unwrap().is_empty());
    }

    #[test]
    fn roundtrip_save_load_preserves_order() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("manifest");
        let mut manifest = Manifest::new();
        manifest.insert("b.txt");
        manifest.insert("a/c.txt");
        manifest.insert("a");

        manifest.save(&path).unwrap();
        let loaded = Manifest::load(Some(&path)).unwrap();
        assert_eq!(
            loaded.paths().collect::<Vec<_>>(),
            ["b.txt", "a/c.txt", "a"]
        );
    }

    #[test]
    fn membership_ignores_case_and_separator_style() {
        let mut manifest = Manifest::new();
        manifest.insert("Bin\\App.dll");
        assert!(manifest.contains("bin/app.dll"));
        assert!(manifest.contains("BIN\\APP.DLL"));
        assert!(!manifest.contains("bin"));
    }

    #[test]
    fn duplicate_insert_is_dropped() {
        let mut manifest = Manifest::new();
        assert!(manifest.insert("a.txt"));
        assert!(!manifest.insert("A.TXT"));
        assert_eq!(manifest.len(), 1);
    }

    #[test]
    fn blank_lines_and_crlf_are_skipped_on_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("manifest");
        std::fs::write(&path, "a.txt\r\n\r\nsub\\b.txt\r\n").unwrap();
        let loaded = Manifest::load(Some(&path)).unwrap();
        assert_eq!(loaded.paths().collect::<Vec<_>>(), ["a.txt", "sub/b.txt"]);
    }

    #[test]
    fn tmp_file_cleaned_up_after_save() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("manifest");
        Manifest::new().save(&path).unwrap();
        assert!(path.exists());
        assert!(!tmp.path().join("nested").join("manifest.tmp").exists());
    }

    #[test]
    fn relative_path_applies_sub_folder_prefix() {
        let root = PathBuf::from("/deploy/site");
        let file = root.join("css").join("site.css");
        assert_eq!(
            relative_path(&root, &file, None).as_deref(),
            Some("css/site.css")
        );
        assert_eq!(
            relative_path(&root, &file, Some("app\\v2")).as_deref(),
            Some("app/v2/css/site.css")
        );
        assert_eq!(relative_path(&root, Path::new("/elsewhere"), None), None);
    }

    #[test]
    fn surrounding_spaces_are_part_of_the_name() {
        let mut manifest = Manifest::new();
        manifest.insert("a.txt ");
        manifest.insert(" b.txt");
        assert!(!manifest.contains("a.txt"));
        assert!(!manifest.contains("b.txt"));
        assert!(manifest.contains("a.txt "));
        assert_eq!(manifest.paths().collect::<Vec<_>>(), ["a.txt ", " b.txt"]);
    }

    #[test]
    #[cfg(unix)]
    fn undecodable_path_has_no_manifest_form() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let root = PathBuf::from("/deploy");
        let file = root.join(OsStr::from_bytes(b"caf\xe9.txt"));
        assert_eq!(relative_path(&root, &file, None), None);
    }
}
