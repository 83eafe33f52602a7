//! Protocol messages for USN-based delta sync.

use crate::error::ProtocolResult;
use crate::records::{NoteRecord, NotebookRecord, TagRecord};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

fn encode_json<T: Serialize>(value: &T) -> ProtocolResult<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

fn decode_json<T: DeserializeOwned>(bytes: &[u8]) -> ProtocolResult<T> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Account-wide sync state reported by the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    /// Highest USN assigned in the account.
    pub update_count: u64,
    /// Server time, in milliseconds since the epoch.
    pub current_time: i64,
    /// Clients that last synced before this time must discard their
    /// cached state and resync from scratch.
    #[serde(default)]
    pub full_sync_before: i64,
}

impl SyncState {
    /// Creates a sync state.
    pub fn new(update_count: u64, current_time: i64, full_sync_before: i64) -> Self {
        Self {
            update_count,
            current_time,
            full_sync_before,
        }
    }

    /// Returns true if a client whose last sync happened at `last_sync_time`
    /// must start over.
    pub fn requires_full_sync(&self, last_sync_time: i64) -> bool {
        self.full_sync_before > last_sync_time
    }

    /// Encodes to JSON.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        encode_json(self)
    }

    /// Decodes from JSON.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        decode_json(bytes)
    }
}

/// Selects which entity kinds a sync chunk carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncChunkFilter {
    /// Include note records.
    pub include_notes: bool,
    /// Include resource metadata embedded in notes.
    pub include_note_resources: bool,
    /// Include note attributes.
    pub include_note_attributes: bool,
    /// Include notebooks.
    pub include_notebooks: bool,
    /// Include tags.
    pub include_tags: bool,
    /// Include saved searches.
    pub include_searches: bool,
    /// Include standalone resources with their bodies.
    pub include_resources: bool,
    /// Include linked notebooks.
    pub include_linked_notebooks: bool,
    /// Include lists of expunged identifiers.
    pub include_expunged: bool,
}

impl SyncChunkFilter {
    /// Metadata-only filter: notes with resource metadata, notebooks and
    /// tags. Binary bodies are fetched separately.
    pub fn metadata_only() -> Self {
        Self {
            include_notes: true,
            include_note_resources: true,
            include_note_attributes: false,
            include_notebooks: true,
            include_tags: true,
            include_searches: false,
            include_resources: false,
            include_linked_notebooks: false,
            include_expunged: false,
        }
    }
}

impl Default for SyncChunkFilter {
    fn default() -> Self {
        Self::metadata_only()
    }
}

/// Request for one page of changes after a USN.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkRequest {
    /// Return changes with a USN strictly greater than this.
    pub after_usn: u64,
    /// Maximum number of entries in the chunk.
    pub max_entries: u32,
    /// Entity kinds to include.
    pub filter: SyncChunkFilter,
}

impl ChunkRequest {
    /// Creates a chunk request.
    pub fn new(after_usn: u64, max_entries: u32, filter: SyncChunkFilter) -> Self {
        Self {
            after_usn,
            max_entries,
            filter,
        }
    }

    /// Encodes to JSON.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        encode_json(self)
    }

    /// Decodes from JSON.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        decode_json(bytes)
    }
}

/// One page of changes returned by the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncChunk {
    /// Notebooks created or changed in this USN range.
    #[serde(default)]
    pub notebooks: Vec<NotebookRecord>,
    /// Tags created or changed in this USN range.
    #[serde(default)]
    pub tags: Vec<TagRecord>,
    /// Notes created, changed or deleted in this USN range.
    #[serde(default)]
    pub notes: Vec<NoteRecord>,
    /// Account update count at the time the chunk was produced.
    pub update_count: u64,
    /// Highest USN covered by this chunk. Absent when the chunk is empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_high_usn: Option<u64>,
    /// Server time at which the chunk was produced.
    #[serde(default)]
    pub current_time: i64,
}

impl SyncChunk {
    /// Creates an empty chunk.
    pub fn new(update_count: u64, chunk_high_usn: Option<u64>) -> Self {
        Self {
            update_count,
            chunk_high_usn,
            ..Self::default()
        }
    }

    /// Adds a notebook.
    pub fn with_notebook(mut self, notebook: NotebookRecord) -> Self {
        self.notebooks.push(notebook);
        self
    }

    /// Adds a tag.
    pub fn with_tag(mut self, tag: TagRecord) -> Self {
        self.tags.push(tag);
        self
    }

    /// Adds a note.
    pub fn with_note(mut self, note: NoteRecord) -> Self {
        self.notes.push(note);
        self
    }

    /// Returns true if more chunks follow this one.
    pub fn has_more(&self) -> bool {
        matches!(self.chunk_high_usn, Some(high) if high < self.update_count)
    }

    /// Number of records carried by the chunk.
    pub fn len(&self) -> usize {
        self.notebooks.len() + self.tags.len() + self.notes.len()
    }

    /// Returns true if the chunk carries no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Encodes to JSON.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        encode_json(self)
    }

    /// Decodes from JSON.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        decode_json(bytes)
    }
}

/// Body of a note content response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteContent {
    /// Note body markup.
    pub content: String,
}

impl NoteContent {
    /// Decodes from JSON.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        decode_json(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::ContentHash;
    use serde_json::json;

    #[test]
    fn full_sync_required_when_history_invalidated() {
        let state = SyncState::new(50, 2_000, 1_000);
        assert!(state.requires_full_sync(0));
        assert!(state.requires_full_sync(999));
        assert!(!state.requires_full_sync(1_000));
        assert!(!state.requires_full_sync(1_500));
    }

    #[test]
    fn default_filter_is_metadata_only() {
        let filter = SyncChunkFilter::default();
        assert!(filter.include_notes);
        assert!(filter.include_note_resources);
        assert!(filter.include_notebooks);
        assert!(filter.include_tags);
        assert!(!filter.include_note_attributes);
        assert!(!filter.include_searches);
        assert!(!filter.include_resources);
        assert!(!filter.include_linked_notebooks);
        assert!(!filter.include_expunged);
    }

    #[test]
    fn chunk_has_more() {
        assert!(SyncChunk::new(100, Some(40)).has_more());
        assert!(!SyncChunk::new(100, Some(100)).has_more());
        assert!(!SyncChunk::new(100, None).has_more());
    }

    #[test]
    fn chunk_decodes_sparse_payload() {
        let bytes = serde_json::to_vec(&json!({
            "updateCount": 50,
            "chunkHighUsn": 50,
            "notebooks": [{"id": "nb1", "name": "Work"}]
        }))
        .unwrap();
        let chunk = SyncChunk::decode(&bytes).unwrap();
        assert_eq!(chunk.chunk_high_usn, Some(50));
        assert_eq!(chunk.notebooks, vec![NotebookRecord::new("nb1", "Work")]);
        assert!(chunk.notes.is_empty());
        assert_eq!(chunk.len(), 1);
    }

    #[test]
    fn chunk_request_encoding() {
        let request = ChunkRequest::new(10, 100, SyncChunkFilter::metadata_only());
        let value: serde_json::Value = serde_json::from_slice(&request.encode().unwrap()).unwrap();
        assert_eq!(value["afterUsn"], 10);
        assert_eq!(value["maxEntries"], 100);
        assert_eq!(value["filter"]["includeResources"], false);

        let back = ChunkRequest::decode(&request.encode().unwrap()).unwrap();
        assert_eq!(back, request);
    }

    #[test]
    fn chunk_builder() {
        let chunk = SyncChunk::new(3, Some(3))
            .with_notebook(NotebookRecord::new("nb", "Inbox"))
            .with_tag(TagRecord::new("t", "todo"))
            .with_note(NoteRecord::new("n", ContentHash::compute(b"x")));
        assert_eq!(chunk.len(), 3);
        assert!(!chunk.is_empty());
    }
}
