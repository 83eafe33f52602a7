//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random remote content that
//! maintains required invariants: ids are safe file names and note ids never
//! collide with resource ids.

use notemirror_protocol::{ContentHash, NoteRecord, NotebookRecord, ResourceRef, SyncChunk};
use proptest::prelude::*;
use std::collections::BTreeSet;

/// Strategy for generating note ids.
pub fn note_id_strategy() -> impl Strategy<Value = String> {
    (0u8..16).prop_map(|n| format!("note-{n:02}"))
}

/// Strategy for generating resource ids.
pub fn resource_id_strategy() -> impl Strategy<Value = String> {
    (0u8..16).prop_map(|n| format!("res-{n:02}"))
}

/// Strategy for generating note bodies.
pub fn body_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("<en-note>[a-z ]{0,24}</en-note>").expect("Invalid regex")
}

/// Strategy for generating notebooks.
pub fn notebook_strategy() -> impl Strategy<Value = NotebookRecord> {
    (0u8..4, "[A-Z][a-z]{0,8}").prop_map(|(n, name)| NotebookRecord::new(format!("nb-{n}"), name))
}

/// Strategy for generating a present note whose hash matches `body`.
pub fn note_strategy() -> impl Strategy<Value = (NoteRecord, String)> {
    (
        note_id_strategy(),
        body_strategy(),
        prop::collection::btree_set(resource_id_strategy(), 0..3),
    )
        .prop_map(|(id, body, resources)| {
            let mut note = NoteRecord::new(id, ContentHash::compute(body.as_bytes()));
            for rid in resources {
                let hash = ContentHash::compute(rid.as_bytes());
                note = note.with_resource(ResourceRef::new(rid, hash));
            }
            (note, body)
        })
}

/// Strategy for generating a note change: an upsert or a tombstone.
pub fn note_change_strategy() -> impl Strategy<Value = NoteRecord> {
    prop_oneof![
        3 => note_strategy().prop_map(|(note, _)| note),
        1 => note_id_strategy().prop_map(NoteRecord::tombstone),
    ]
}

/// Strategy for generating a sync chunk.
///
/// Each notebook id and note id appears at most once per chunk, matching
/// what the remote store sends.
pub fn chunk_strategy() -> impl Strategy<Value = SyncChunk> {
    (
        prop::collection::vec(notebook_strategy(), 0..3),
        prop::collection::vec(note_change_strategy(), 0..8),
        1u64..1000,
    )
        .prop_map(|(notebooks, notes, update_count)| {
            let mut chunk = SyncChunk::new(update_count, Some(update_count));
            let mut seen = BTreeSet::new();
            chunk.notebooks = notebooks
                .into_iter()
                .filter(|nb| seen.insert(nb.id.clone()))
                .collect();
            seen.clear();
            chunk.notes = notes
                .into_iter()
                .filter(|note| seen.insert(note.id.clone()))
                .collect();
            chunk
        })
}

/// Strategy for generating a sequence of chunks.
pub fn chunk_sequence_strategy(max_len: usize) -> impl Strategy<Value = Vec<SyncChunk>> {
    prop::collection::vec(chunk_strategy(), 1..=max_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn generated_notes_hash_their_body((note, body) in note_strategy()) {
            prop_assert!(note.active);
            prop_assert!(note.content_hash.matches(body.as_bytes()));
            for resource in &note.resources {
                prop_assert!(resource.id.starts_with("res-"));
            }
        }

        #[test]
        fn generated_chunks_are_terminal(chunk in chunk_strategy()) {
            prop_assert!(!chunk.has_more());
            let ids: BTreeSet<_> = chunk.notes.iter().map(|n| &n.id).collect();
            prop_assert_eq!(ids.len(), chunk.notes.len());
        }
    }
}
