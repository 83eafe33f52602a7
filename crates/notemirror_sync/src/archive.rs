//! Local archive directory management.
//!
//! This module handles the file system layout of a mirror:
//!
//! ```text
//! <root>/
//! ├─ metadata.json     # Notebooks, tags, notes and sync cursors
//! ├─ LOCK              # Advisory lock, taken by callers that want one
//! ├─ notes/<id>        # Note content (text)
//! └─ files/<id>        # Resource bodies (binary)
//! ```

use crate::error::{IoResultExt, SyncError, SyncResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

/// File names within the archive directory.
const METADATA_FILE: &str = "metadata.json";
const LOCK_FILE: &str = "LOCK";
const NOTES_DIR: &str = "notes";
const FILES_DIR: &str = "files";

/// The directory layout of a local mirror.
#[derive(Debug, Clone)]
pub struct ArchiveDir {
    root: PathBuf,
}

impl ArchiveDir {
    /// Opens an archive, creating the root and its sub-areas if absent.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Filesystem`] if a directory cannot be created or
    /// the root exists but is not a directory.
    pub fn open(root: &Path) -> SyncResult<Self> {
        let archive = Self {
            root: root.to_path_buf(),
        };
        fs::create_dir_all(&archive.root).at_path(&archive.root)?;
        if !archive.root.is_dir() {
            return Err(SyncError::filesystem(
                &archive.root,
                std::io::Error::other("archive root is not a directory"),
            ));
        }
        for dir in [archive.notes_dir(), archive.files_dir()] {
            fs::create_dir_all(&dir).at_path(&dir)?;
        }
        Ok(archive)
    }

    /// Returns the archive root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the path to the metadata file.
    #[must_use]
    pub fn metadata_path(&self) -> PathBuf {
        self.root.join(METADATA_FILE)
    }

    /// Returns the directory holding note content.
    #[must_use]
    pub fn notes_dir(&self) -> PathBuf {
        self.root.join(NOTES_DIR)
    }

    /// Returns the directory holding resource bodies.
    #[must_use]
    pub fn files_dir(&self) -> PathBuf {
        self.root.join(FILES_DIR)
    }

    /// Takes the single-writer lock for this archive.
    pub fn lock(&self) -> SyncResult<ArchiveLock> {
        ArchiveLock::acquire(&self.root)
    }
}

/// Exclusive advisory lock on an archive directory.
///
/// The sync engine assumes a single writer but does not enforce it; callers
/// that may run concurrently hold this lock for the duration of a sync.
/// The lock is released when the value is dropped.
#[derive(Debug)]
pub struct ArchiveLock {
    path: PathBuf,
    _file: File,
}

impl ArchiveLock {
    /// Acquires the lock without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::ArchiveLocked`] if another process holds it.
    pub fn acquire(root: &Path) -> SyncResult<Self> {
        let path = root.join(LOCK_FILE);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .at_path(&path)?;

        if file.try_lock_exclusive().is_err() {
            return Err(SyncError::ArchiveLocked);
        }

        Ok(Self { path, _file: file })
    }

    /// Returns the path of the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_creates_layout() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("mirror");

        let archive = ArchiveDir::open(&root).unwrap();
        assert!(archive.notes_dir().is_dir());
        assert!(archive.files_dir().is_dir());
        assert_eq!(archive.metadata_path(), root.join("metadata.json"));
        assert!(!archive.metadata_path().exists());
    }

    #[test]
    fn open_is_idempotent() {
        let dir = tempdir().unwrap();
        ArchiveDir::open(dir.path()).unwrap();
        fs::write(dir.path().join("notes").join("n1"), "body").unwrap();

        let archive = ArchiveDir::open(dir.path()).unwrap();
        assert!(archive.notes_dir().join("n1").exists());
    }

    #[test]
    fn open_rejects_file_root() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("plain");
        fs::write(&file, "x").unwrap();

        assert!(matches!(
            ArchiveDir::open(&file),
            Err(SyncError::Filesystem { .. })
        ));
    }

    #[test]
    fn lock_is_exclusive() {
        let dir = tempdir().unwrap();
        let archive = ArchiveDir::open(dir.path()).unwrap();

        let lock = archive.lock().unwrap();
        assert!(lock.path().exists());
        assert!(matches!(archive.lock(), Err(SyncError::ArchiveLocked)));

        drop(lock);
        assert!(archive.lock().is_ok());
    }
}
