//! Local metadata store.
//!
//! The metadata store is the engine's view of the remote account: every
//! known notebook, tag and present note, plus the cursors that say how far
//! the last successful sync got. It is persisted as a single JSON document:
//!
//! ```text
//! {
//!   "notes":         { "<id>": { "id", "contentHash", "active", "resources", "in_sync", ... } },
//!   "notebooks":     { "<id>": "<name>" },
//!   "tags":          { "<id>": { "id", "name", "parentId"? } },
//!   "lastSyncCount": 50,
//!   "lastSyncTime":  1700000000000
//! }
//! ```

use crate::error::{IoResultExt, SyncError, SyncResult};
use notemirror_protocol::{NoteRecord, SyncChunk, TagRecord};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;
use tracing::warn;

/// How far the last successful sync got.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncCursor {
    /// Remote update count covered by the local metadata.
    #[serde(default)]
    pub last_sync_count: u64,
    /// Remote time of the last successful metadata sync.
    #[serde(default)]
    pub last_sync_time: i64,
}

/// A present note together with its local materialization state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteEntry {
    /// The note as last reported by the remote store.
    #[serde(flatten)]
    pub record: NoteRecord,
    /// True once the note content and all its resources are on disk.
    #[serde(default)]
    pub in_sync: bool,
}

impl NoteEntry {
    fn new(record: NoteRecord) -> Self {
        Self {
            record,
            in_sync: false,
        }
    }
}

/// Counts of changes made by [`MetadataStore::apply_chunk`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyStats {
    /// Notebooks inserted or renamed.
    pub notebooks: usize,
    /// Tags inserted or changed.
    pub tags: usize,
    /// Notes inserted or changed.
    pub notes_upserted: usize,
    /// Notes removed because of a tombstone.
    pub notes_removed: usize,
}

impl ApplyStats {
    /// Returns true if nothing changed.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl std::ops::AddAssign for ApplyStats {
    fn add_assign(&mut self, other: Self) {
        self.notebooks += other.notebooks;
        self.tags += other.tags;
        self.notes_upserted += other.notes_upserted;
        self.notes_removed += other.notes_removed;
    }
}

/// Known notebooks, tags and notes, plus the sync cursor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataStore {
    #[serde(default)]
    notes: BTreeMap<String, NoteEntry>,
    #[serde(default)]
    notebooks: BTreeMap<String, String>,
    #[serde(default)]
    tags: BTreeMap<String, TagRecord>,
    #[serde(flatten)]
    cursor: SyncCursor,
    #[serde(skip)]
    dirty: bool,
}

impl MetadataStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a persisted store.
    ///
    /// Returns `Ok(None)` if the file does not exist and a codec error if it
    /// cannot be parsed.
    pub fn read(path: &Path) -> SyncResult<Option<Self>> {
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SyncError::filesystem(path, e)),
        };
        Ok(Some(serde_json::from_slice(&data)?))
    }

    /// Loads a persisted store, falling back to an empty one.
    ///
    /// A missing file yields an empty store. A corrupted file is logged and
    /// also yields an empty store, which triggers a full resync.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Filesystem`] if the file exists but cannot
    /// be read.
    pub fn load(path: &Path) -> SyncResult<Self> {
        match Self::read(path) {
            Ok(store) => Ok(store.unwrap_or_default()),
            Err(SyncError::Codec(e)) => {
                warn!(path = %path.display(), error = %e, "corrupted metadata file, regenerating");
                Ok(Self::new())
            }
            Err(e) => Err(e),
        }
    }

    /// Persists the store if it changed since the last save.
    ///
    /// Uses write-then-rename so a crash never leaves a torn file behind.
    /// Returns true if the file was written.
    pub fn save(&mut self, path: &Path) -> SyncResult<bool> {
        if !self.dirty {
            return Ok(false);
        }

        let data = serde_json::to_vec(self)?;
        let temp_path = path.with_extension("json.tmp");
        let mut file = File::create(&temp_path).at_path(&temp_path)?;
        file.write_all(&data).at_path(&temp_path)?;
        file.sync_all().at_path(&temp_path)?;
        drop(file);
        fs::rename(&temp_path, path).at_path(path)?;

        self.dirty = false;
        Ok(true)
    }

    /// Discards all metadata and rewinds the cursor to zero.
    pub fn reset(&mut self) {
        *self = Self {
            dirty: true,
            ..Self::default()
        };
    }

    /// Applies one sync chunk.
    ///
    /// Notebooks and tags are upserted by id. Active notes are upserted;
    /// inactive notes are removed. Re-applying a chunk changes nothing.
    pub fn apply_chunk(&mut self, chunk: &SyncChunk) -> ApplyStats {
        let mut stats = ApplyStats::default();

        for notebook in &chunk.notebooks {
            if self.notebooks.get(&notebook.id) != Some(&notebook.name) {
                self.notebooks
                    .insert(notebook.id.clone(), notebook.name.clone());
                stats.notebooks += 1;
            }
        }

        for tag in &chunk.tags {
            if self.tags.get(&tag.id) != Some(tag) {
                self.tags.insert(tag.id.clone(), tag.clone());
                stats.tags += 1;
            }
        }

        for note in &chunk.notes {
            if note.active {
                let unchanged = self.notes.get(&note.id).is_some_and(|e| e.record == *note);
                if !unchanged {
                    self.notes.insert(note.id.clone(), NoteEntry::new(note.clone()));
                    stats.notes_upserted += 1;
                }
            } else if self.notes.remove(&note.id).is_some() {
                stats.notes_removed += 1;
            }
        }

        if !stats.is_empty() {
            self.dirty = true;
        }
        stats
    }

    /// Records a completed metadata sync.
    ///
    /// The update count never moves backwards; only [`MetadataStore::reset`]
    /// rewinds it.
    pub fn advance_cursor(&mut self, update_count: u64, current_time: i64) {
        let next = SyncCursor {
            last_sync_count: self.cursor.last_sync_count.max(update_count),
            last_sync_time: current_time,
        };
        if next != self.cursor {
            self.cursor = next;
            self.dirty = true;
        }
    }

    /// Marks a note as fully materialized.
    pub fn mark_in_sync(&mut self, id: &str) {
        if let Some(entry) = self.notes.get_mut(id) {
            if !entry.in_sync {
                entry.in_sync = true;
                self.dirty = true;
            }
        }
    }

    /// Returns the sync cursor.
    pub fn cursor(&self) -> SyncCursor {
        self.cursor
    }

    /// Returns true if the store changed since it was loaded or saved.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Returns a present note.
    pub fn note(&self, id: &str) -> Option<&NoteEntry> {
        self.notes.get(id)
    }

    /// Iterates over present notes in id order.
    pub fn notes(&self) -> impl Iterator<Item = &NoteEntry> {
        self.notes.values()
    }

    /// Returns the ids of present notes.
    pub fn note_ids(&self) -> BTreeSet<&str> {
        self.notes.keys().map(String::as_str).collect()
    }

    /// Returns the ids of resources referenced by present notes.
    pub fn referenced_resource_ids(&self) -> BTreeSet<&str> {
        self.notes
            .values()
            .flat_map(|entry| entry.record.resource_ids())
            .collect()
    }

    /// Returns the name of a notebook.
    pub fn notebook_name(&self, id: &str) -> Option<&str> {
        self.notebooks.get(id).map(String::as_str)
    }

    /// Iterates over `(id, name)` pairs of known notebooks.
    pub fn notebooks(&self) -> impl Iterator<Item = (&str, &str)> {
        self.notebooks.iter().map(|(id, name)| (id.as_str(), name.as_str()))
    }

    /// Returns a tag.
    pub fn tag(&self, id: &str) -> Option<&TagRecord> {
        self.tags.get(id)
    }

    /// Iterates over known tags.
    pub fn tags(&self) -> impl Iterator<Item = &TagRecord> {
        self.tags.values()
    }

    /// Number of present notes.
    pub fn note_count(&self) -> usize {
        self.notes.len()
    }

    /// Number of present notes marked in sync.
    pub fn in_sync_count(&self) -> usize {
        self.notes.values().filter(|e| e.in_sync).count()
    }

    /// Number of known notebooks.
    pub fn notebook_count(&self) -> usize {
        self.notebooks.len()
    }

    /// Number of known tags.
    pub fn tag_count(&self) -> usize {
        self.tags.len()
    }
}
