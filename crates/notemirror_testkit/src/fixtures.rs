//! Test fixtures and archive helpers.
//!
//! Provides temporary archive directories and a small builder for account
//! content whose digests match its bodies.

use notemirror_protocol::{ContentHash, NoteRecord, NotebookRecord, ResourceRef, SyncChunk};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A temporary archive directory with automatic cleanup.
pub struct TestArchive {
    temp_dir: TempDir,
}

impl TestArchive {
    /// Creates a new empty archive root.
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Returns the archive root.
    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Returns the path of a note file.
    pub fn note_path(&self, id: &str) -> PathBuf {
        self.root().join("notes").join(id)
    }

    /// Returns the path of a resource file.
    pub fn file_path(&self, id: &str) -> PathBuf {
        self.root().join("files").join(id)
    }

    /// Returns the path of the metadata document.
    pub fn metadata_path(&self) -> PathBuf {
        self.root().join("metadata.json")
    }

    /// Writes a note file directly, bypassing the engine.
    pub fn write_note(&self, id: &str, body: &str) {
        let path = self.note_path(id);
        fs::create_dir_all(path.parent().expect("note path has a parent"))
            .expect("Failed to create notes directory");
        fs::write(path, body).expect("Failed to write note");
    }

    /// Writes a resource file directly, bypassing the engine.
    pub fn write_file(&self, id: &str, body: &[u8]) {
        let path = self.file_path(id);
        fs::create_dir_all(path.parent().expect("file path has a parent"))
            .expect("Failed to create files directory");
        fs::write(path, body).expect("Failed to write file");
    }

    /// Reads a note file, if present.
    pub fn read_note(&self, id: &str) -> Option<String> {
        fs::read_to_string(self.note_path(id)).ok()
    }

    /// Reads a resource file, if present.
    pub fn read_file(&self, id: &str) -> Option<Vec<u8>> {
        fs::read(self.file_path(id)).ok()
    }

    /// Lists the note files on disk.
    pub fn note_files(&self) -> BTreeSet<String> {
        list(&self.root().join("notes"))
    }

    /// Lists the resource files on disk.
    pub fn resource_files(&self) -> BTreeSet<String> {
        list(&self.root().join("files"))
    }

    /// Parses the metadata document, if present.
    pub fn metadata_json(&self) -> Option<serde_json::Value> {
        let bytes = fs::read(self.metadata_path()).ok()?;
        Some(serde_json::from_slice(&bytes).expect("metadata.json is not valid JSON"))
    }

    /// Returns the modification time of the metadata document.
    pub fn metadata_modified(&self) -> Option<std::time::SystemTime> {
        fs::metadata(self.metadata_path()).ok()?.modified().ok()
    }
}

impl Default for TestArchive {
    fn default() -> Self {
        Self::new()
    }
}

fn list(dir: &Path) -> BTreeSet<String> {
    let Ok(entries) = fs::read_dir(dir) else {
        return BTreeSet::new();
    };
    entries
        .filter_map(Result::ok)
        .filter(|e| e.path().is_file())
        .filter_map(|e| e.file_name().to_str().map(str::to_string))
        .collect()
}

/// Remote account content with bodies that match their recorded digests.
#[derive(Debug, Clone, Default)]
pub struct SampleAccount {
    /// Known notebooks.
    pub notebooks: Vec<NotebookRecord>,
    /// Note records in insertion order.
    pub notes: Vec<NoteRecord>,
    /// Note bodies by id.
    pub note_bodies: BTreeMap<String, String>,
    /// Resource bodies by id.
    pub resource_bodies: BTreeMap<String, Vec<u8>>,
}

impl SampleAccount {
    /// Creates an empty account.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a notebook.
    pub fn notebook(mut self, id: &str, name: &str) -> Self {
        self.notebooks.push(NotebookRecord::new(id, name));
        self
    }

    /// Adds a note with the given body.
    pub fn note(mut self, id: &str, body: &str) -> Self {
        self.notes
            .push(NoteRecord::new(id, ContentHash::compute(body.as_bytes())));
        self.note_bodies.insert(id.to_string(), body.to_string());
        self
    }

    /// Attaches a resource to a note added earlier.
    pub fn resource(mut self, note_id: &str, id: &str, body: &[u8]) -> Self {
        let note = self
            .notes
            .iter_mut()
            .find(|n| n.id == note_id)
            .expect("resource added to an unknown note");
        note.resources
            .push(ResourceRef::new(id, ContentHash::compute(body)));
        self.resource_bodies.insert(id.to_string(), body.to_vec());
        self
    }

    /// Packs the whole account into a single chunk.
    pub fn chunk(&self, update_count: u64) -> SyncChunk {
        let mut chunk = SyncChunk::new(update_count, Some(update_count));
        chunk.notebooks = self.notebooks.clone();
        chunk.notes = self.notes.clone();
        chunk
    }

    /// Ids of every resource referenced by the account.
    pub fn resource_ids(&self) -> BTreeSet<String> {
        self.resource_bodies.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_helpers() {
        let archive = TestArchive::new();
        assert!(archive.metadata_json().is_none());
        assert!(archive.note_files().is_empty());

        archive.write_note("n1", "body");
        archive.write_file("r1", &[1, 2, 3]);
        assert_eq!(archive.read_note("n1").as_deref(), Some("body"));
        assert_eq!(archive.read_file("r1"), Some(vec![1, 2, 3]));
        assert_eq!(archive.note_files().len(), 1);
        assert_eq!(archive.resource_files().len(), 1);
    }

    #[test]
    fn sample_account_digests_match() {
        let account = SampleAccount::new()
            .notebook("nb1", "Work")
            .note("n1", "<en-note/>")
            .resource("n1", "r1", b"png");

        let chunk = account.chunk(5);
        assert_eq!(chunk.chunk_high_usn, Some(5));
        assert_eq!(chunk.notebooks.len(), 1);

        let note = &chunk.notes[0];
        assert!(note.content_hash.matches(account.note_bodies["n1"].as_bytes()));
        assert!(note.resources[0].body_hash().matches(&account.resource_bodies["r1"]));
    }
}
