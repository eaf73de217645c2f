//! File and directory snapshots taken while walking a tree.
//!
//! An [`FsEntry`] is either a [`FileEntry`] or a [`DirEntry`]. Both carry the
//! same [`EntryInfo`] (name, full path, timestamps, size, permissions); files
//! can be opened for reading and directories can list their children.
//!
//! Snapshots are not refreshed: metadata is read once when the entry is
//! created.
//!
//! Symlinks are followed to decide whether an entry is a file or a
//! directory, and [`EntryInfo::is_symlink`] records that a link was
//! followed. Callers that must not act through links check it.

use std::ffi::{OsStr, OsString};
use std::fs::{File, Metadata, Permissions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Attributes shared by files and directories.
#[derive(Debug, Clone)]
pub struct EntryInfo {
    /// Name as stored on disk; target paths are built from this.
    pub file_name: OsString,
    /// Lossy UTF-8 rendering of `file_name`, for patterns and log lines.
    pub name: String,
    pub path: PathBuf,
    pub is_symlink: bool,
    pub modified: SystemTime,
    pub accessed: Option<SystemTime>,
    pub len: u64,
    pub permissions: Permissions,
}

impl EntryInfo {
    fn from_metadata(path: PathBuf, metadata: &Metadata, is_symlink: bool) -> io::Result<Self> {
        let file_name = path.file_name().unwrap_or_default().to_os_string();
        Ok(Self {
            name: file_name.to_string_lossy().into_owned(),
            file_name,
            is_symlink,
            modified: metadata.modified()?,
            accessed: metadata.accessed().ok(),
            len: metadata.len(),
            permissions: metadata.permissions(),
            path,
        })
    }

    pub fn is_readonly(&self) -> bool {
        self.permissions.readonly()
    }

    /// Dot-files count as hidden.
    pub fn is_hidden(&self) -> bool {
        self.name.starts_with('.')
    }

    /// Short attribute tag such as `[HR]`, or an empty string when no
    /// attribute is set.
    pub fn attribute_tag(&self) -> String {
        let mut tag = String::new();
        if self.is_hidden() {
            tag.push('H');
        }
        if self.is_readonly() {
            tag.push('R');
        }
        if tag.is_empty() {
            tag
        } else {
            format!("[{tag}]")
        }
    }
}

/// A regular file.
#[derive(Debug, Clone)]
pub struct FileEntry(EntryInfo);

impl FileEntry {
    pub fn info(&self) -> &EntryInfo {
        &self.0
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn file_name(&self) -> &OsStr {
        &self.0.file_name
    }

    pub fn path(&self) -> &Path {
        &self.0.path
    }

    pub fn modified(&self) -> SystemTime {
        self.0.modified
    }

    pub fn open_read(&self) -> io::Result<File> {
        File::open(&self.0.path)
    }
}

/// A directory.
#[derive(Debug, Clone)]
pub struct DirEntry(EntryInfo);

impl DirEntry {
    /// Snapshot the directory at `path`.
    ///
    /// Returns `Ok(None)` when nothing exists there; a file at `path` is an
    /// `InvalidInput` error.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Option<Self>> {
        let path = path.into();
        match FsEntry::probe(path.clone())? {
            None => Ok(None),
            Some(FsEntry::Directory(dir)) => Ok(Some(dir)),
            Some(FsEntry::File(_)) => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is a file, expected a directory", path.display()),
            )),
        }
    }

    pub fn info(&self) -> &EntryInfo {
        &self.0
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn file_name(&self) -> &OsStr {
        &self.0.file_name
    }

    pub fn path(&self) -> &Path {
        &self.0.path
    }

    /// Whether this directory is reached through a symlink.
    pub fn is_symlink(&self) -> bool {
        self.0.is_symlink
    }

    /// All children, files and directories, in directory order.
    ///
    /// Entries that vanish between listing and metadata lookup, and dangling
    /// symlinks, are skipped.
    pub fn children(&self) -> io::Result<Vec<FsEntry>> {
        let mut out = Vec::new();
        for item in std::fs::read_dir(&self.0.path)? {
            let item = item?;
            if let Some(entry) = FsEntry::probe(item.path())? {
                out.push(entry);
            }
        }
        Ok(out)
    }

    pub fn is_empty(&self) -> io::Result<bool> {
        Ok(std::fs::read_dir(&self.0.path)?.next().is_none())
    }
}

/// A file or a directory.
#[derive(Debug, Clone)]
pub enum FsEntry {
    File(FileEntry),
    Directory(DirEntry),
}

impl FsEntry {
    /// Snapshot whatever is at `path`, following symlinks.
    ///
    /// Returns `Ok(None)` when nothing exists there (including a dangling
    /// symlink) or when the entry is neither a file nor a directory.
    pub fn probe(path: impl Into<PathBuf>) -> io::Result<Option<Self>> {
        let path = path.into();
        let Some(link) = not_found_as_none(std::fs::symlink_metadata(&path))? else {
            return Ok(None);
        };
        let is_symlink = link.file_type().is_symlink();
        let metadata = if is_symlink {
            match not_found_as_none(std::fs::metadata(&path))? {
                Some(target) => target,
                None => return Ok(None),
            }
        } else {
            link
        };

        if metadata.is_dir() {
            let info = EntryInfo::from_metadata(path, &metadata, is_symlink)?;
            Ok(Some(FsEntry::Directory(DirEntry(info))))
        } else if metadata.is_file() {
            let info = EntryInfo::from_metadata(path, &metadata, is_symlink)?;
            Ok(Some(FsEntry::File(FileEntry(info))))
        } else {
            tracing::debug!(path = %path.display(), "skipping special file");
            Ok(None)
        }
    }

    pub fn info(&self) -> &EntryInfo {
        match self {
            FsEntry::File(f) => f.info(),
            FsEntry::Directory(d) => d.info(),
        }
    }

    pub fn name(&self) -> &str {
        &self.info().name
    }

    pub fn file_name(&self) -> &OsStr {
        &self.info().file_name
    }

    pub fn path(&self) -> &Path {
        &self.info().path
    }
}

fn not_found_as_none<T>(result: io::Result<T>) -> io::Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}
