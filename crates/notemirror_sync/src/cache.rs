//! Hash-validated content cache.
//!
//! Every note body and resource body lives in its own file named after the
//! entity id. A cached file is trusted whenever its digest matches the one
//! recorded in metadata, no matter how it got there, so a run that crashed
//! after downloading a file never downloads it twice.

use crate::archive::ArchiveDir;
use crate::error::{IoResultExt, SyncError, SyncResult};
use notemirror_protocol::ContentHash;
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// The two sub-areas of the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheArea {
    /// Note content, stored as text.
    Notes,
    /// Resource bodies, stored as raw bytes.
    Files,
}

impl CacheArea {
    /// Singular noun used in progress messages.
    pub fn noun(&self) -> &'static str {
        match self {
            CacheArea::Notes => "note",
            CacheArea::Files => "file",
        }
    }
}

/// What [`ContentCache::materialize`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Materialized {
    /// The cached file already matched; nothing was fetched.
    Unchanged,
    /// The file did not exist and was fetched.
    Created,
    /// The file existed with a different digest and was replaced.
    Updated,
}

impl Materialized {
    /// Returns true if a fetch happened.
    pub fn fetched(&self) -> bool {
        !matches!(self, Materialized::Unchanged)
    }
}

/// State of a single cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    /// File exists and matches its expected digest.
    Valid,
    /// File does not exist.
    Missing,
    /// File exists with a different digest.
    Stale,
}

/// Local files for note content and resource bodies.
#[derive(Debug, Clone)]
pub struct ContentCache {
    notes_dir: PathBuf,
    files_dir: PathBuf,
}

impl ContentCache {
    /// Creates a cache over the sub-areas of an archive.
    pub fn new(archive: &ArchiveDir) -> Self {
        Self {
            notes_dir: archive.notes_dir(),
            files_dir: archive.files_dir(),
        }
    }

    /// Returns the directory of an area.
    pub fn dir(&self, area: CacheArea) -> &Path {
        match area {
            CacheArea::Notes => &self.notes_dir,
            CacheArea::Files => &self.files_dir,
        }
    }

    /// Returns the file path of an entry.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidId`] if `id` is not a plain file name.
    pub fn path(&self, area: CacheArea, id: &str) -> SyncResult<PathBuf> {
        validate_id(id)?;
        Ok(self.dir(area).join(id))
    }

    /// Checks an entry against its expected digest.
    pub fn status(&self, area: CacheArea, id: &str, expected: &ContentHash) -> SyncResult<EntryStatus> {
        let path = self.path(area, id)?;
        match fs::read(&path) {
            Ok(data) if expected.matches(&data) => Ok(EntryStatus::Valid),
            Ok(_) => Ok(EntryStatus::Stale),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(EntryStatus::Missing),
            Err(e) => Err(SyncError::filesystem(path, e)),
        }
    }

    /// Returns true if a file exists for the entry, whatever its content.
    pub fn contains(&self, area: CacheArea, id: &str) -> SyncResult<bool> {
        let path = self.path(area, id)?;
        path.try_exists().at_path(&path)
    }

    /// Returns true if the entry exists and matches `expected`.
    pub fn is_valid(&self, area: CacheArea, id: &str, expected: &ContentHash) -> SyncResult<bool> {
        Ok(self.status(area, id, expected)? == EntryStatus::Valid)
    }

    /// Ensures the entry for `id` holds content matching `expected`.
    ///
    /// `fetch` is only called when the cached file is missing or stale.
    /// Fetch errors, rate limits included, are returned untouched and leave
    /// the cached file as it was.
    pub fn materialize<F>(
        &self,
        area: CacheArea,
        id: &str,
        expected: &ContentHash,
        fetch: F,
    ) -> SyncResult<Materialized>
    where
        F: FnOnce() -> SyncResult<Vec<u8>>,
    {
        let outcome = match self.status(area, id, expected)? {
            EntryStatus::Valid => return Ok(Materialized::Unchanged),
            EntryStatus::Missing => Materialized::Created,
            EntryStatus::Stale => Materialized::Updated,
        };

        let data = fetch()?;
        if !expected.is_empty() && !expected.matches(&data) {
            warn!(
                id,
                expected = %expected,
                actual = %ContentHash::compute(&data),
                "fetched {} does not match its recorded digest",
                area.noun()
            );
        }

        let path = self.path(area, id)?;
        write_atomic(&path, &data)?;

        match outcome {
            Materialized::Created => info!("Saving {}: {}", area.noun(), path.display()),
            _ => info!("Updating {}: {}", area.noun(), path.display()),
        }
        Ok(outcome)
    }

    /// Lists the entry ids present in an area.
    ///
    /// Anything that is not a regular file is ignored, as are names that
    /// are not valid UTF-8 since no entity id can map to them.
    pub fn list(&self, area: CacheArea) -> SyncResult<BTreeSet<String>> {
        let dir = self.dir(area);
        let mut ids = BTreeSet::new();
        for entry in fs::read_dir(dir).at_path(dir)? {
            let entry = entry.at_path(dir)?;
            if !entry.file_type().at_path(&entry.path())?.is_file() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => {
                    ids.insert(name);
                }
                Err(name) => warn!(
                    path = %dir.join(&name).display(),
                    "ignoring cache file whose name is not valid UTF-8"
                ),
            }
        }
        Ok(ids)
    }

    /// Removes an entry. Removing a missing entry is not an error.
    pub fn remove(&self, area: CacheArea, id: &str) -> SyncResult<bool> {
        let path = self.dir(area).join(id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(SyncError::filesystem(path, e)),
        }
    }
}

/// Entity ids become file names, so they must be a single plain component.
fn validate_id(id: &str) -> SyncResult<()> {
    let plain = !id.is_empty()
        && id != "."
        && id != ".."
        && !id.starts_with('.')
        && !id.contains(['/', '\\', '\0']);
    if plain {
        Ok(())
    } else {
        Err(SyncError::InvalidId(id.to_string()))
    }
}

/// Writes via a hidden temp file in the same directory, then renames.
///
/// A temp file left behind by a crash is not a valid id and gets purged.
fn write_atomic(path: &Path, data: &[u8]) -> SyncResult<()> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| SyncError::InvalidId(path.display().to_string()))?;
    let temp_path = path.with_file_name(format!(".{file_name}.tmp"));

    let mut file = File::create(&temp_path).at_path(&temp_path)?;
    file.write_all(data).at_path(&temp_path)?;
    file.sync_all().at_path(&temp_path)?;
    drop(file);
    fs::rename(&temp_path, path).at_path(path)?;
    Ok(())
}
