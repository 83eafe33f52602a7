//! Integration tests for the sync engine against a scripted remote.

use notemirror_protocol::{ContentHash, NoteRecord, SyncChunk, SyncState};
use notemirror_sync::{
    verify_archive, ArchiveDir, ContentCache, MetadataOutcome, MetadataStore, MockRemoteStore,
    Reconciler, SyncConfig, SyncEngine, SyncError,
};
use notemirror_testkit::prelude::*;
use proptest::prelude::*;
use serde_json::json;
use std::sync::Arc;

type Engine = SyncEngine<Arc<MockRemoteStore>>;

/// Publishes the bodies of an account on the mock.
fn serve(remote: &MockRemoteStore, account: &SampleAccount) {
    for (id, body) in &account.note_bodies {
        remote.set_note_content(id.clone(), body.clone());
    }
    for (id, body) in &account.resource_bodies {
        remote.set_resource(id.clone(), body.clone());
    }
}

fn engine(archive: &TestArchive, remote: &Arc<MockRemoteStore>) -> Engine {
    SyncEngine::open(archive.root(), SyncConfig::default(), Arc::clone(remote)).unwrap()
}

fn work_account() -> SampleAccount {
    SampleAccount::new()
        .notebook("nb1", "Work")
        .note("n1", "<en-note>quarterly plan</en-note>")
}

#[test]
fn first_sync_into_empty_archive() {
    let archive = TestArchive::new();
    let remote = Arc::new(MockRemoteStore::new());
    let account = work_account();
    remote.set_sync_state(SyncState::new(50, 1_700_000_000_000, 0));
    remote.set_chunk(0, account.chunk(50));
    serve(&remote, &account);

    let report = engine(&archive, &remote).sync().unwrap();

    assert!(matches!(
        report.metadata,
        MetadataOutcome::Fetched { chunks: 1, full_resync: false, .. }
    ));
    assert_eq!(report.content.notes_created, 1);

    let doc = archive.metadata_json().unwrap();
    assert_eq!(doc["notebooks"], json!({ "nb1": "Work" }));
    assert_eq!(doc["notes"].as_object().unwrap().len(), 1);
    assert_eq!(doc["notes"]["n1"]["in_sync"], json!(true));
    assert_eq!(doc["lastSyncCount"], json!(50));
    assert_eq!(doc["lastSyncTime"], json!(1_700_000_000_000i64));

    assert_eq!(
        archive.read_note("n1").as_deref(),
        Some("<en-note>quarterly plan</en-note>")
    );
}

#[test]
fn up_to_date_sync_fetches_nothing() {
    let archive = TestArchive::new();
    let remote = Arc::new(MockRemoteStore::new());
    let account = work_account();
    remote.set_sync_state(SyncState::new(50, 1000, 0));
    remote.set_chunk(0, account.chunk(50));
    serve(&remote, &account);
    engine(&archive, &remote).sync().unwrap();

    let before = archive.metadata_modified();
    let doc_before = archive.metadata_json();
    remote.reset_calls();

    let report = engine(&archive, &remote).sync().unwrap();

    assert!(report.no_new_data());
    assert_eq!(report.metadata, MetadataOutcome::UpToDate);
    let calls = remote.calls();
    assert_eq!(calls.sync_state, 1);
    assert!(calls.chunks.is_empty());
    assert!(calls.notes.is_empty());
    assert!(calls.resources.is_empty());
    assert_eq!(archive.metadata_modified(), before);
    assert_eq!(archive.metadata_json(), doc_before);
}

#[test]
fn rate_limit_on_resource_keeps_committed_metadata() {
    let archive = TestArchive::new();
    let remote = Arc::new(MockRemoteStore::new());
    let account = SampleAccount::new()
        .notebook("nb1", "Work")
        .note("n1", "<en-note/>")
        .resource("n1", "r1", b"\x89PNG");
    remote.set_sync_state(SyncState::new(12, 1000, 0));
    remote.set_chunk(0, account.chunk(12));
    serve(&remote, &account);
    remote.rate_limit("r1", 900);

    let mut first = engine(&archive, &remote);
    let err = first.sync().unwrap_err();
    assert!(matches!(err, SyncError::RateLimited { retry_after_secs: 900 }));
    assert_eq!(err.retry_after().map(|d| d.as_secs()), Some(900));

    let doc = archive.metadata_json().unwrap();
    assert_eq!(doc["lastSyncCount"], json!(12));
    assert_eq!(doc["notebooks"]["nb1"], json!("Work"));
    assert_eq!(doc["notes"]["n1"]["in_sync"], json!(false));
    assert!(archive.read_note("n1").is_some());
    assert!(archive.read_file("r1").is_none());

    // The next run resumes without refetching what is already on disk.
    remote.lift_rate_limit("r1");
    remote.reset_calls();
    let report = engine(&archive, &remote).sync().unwrap();

    assert_eq!(report.metadata, MetadataOutcome::UpToDate);
    assert_eq!(report.content.files_created, 1);
    let calls = remote.calls();
    assert!(calls.chunks.is_empty());
    assert!(calls.notes.is_empty());
    assert_eq!(calls.resources, vec!["r1"]);
    assert_eq!(archive.read_file("r1"), Some(b"\x89PNG".to_vec()));
    assert_eq!(archive.metadata_json().unwrap()["notes"]["n1"]["in_sync"], json!(true));
}

#[test]
fn chunk_loop_follows_high_usn() {
    let archive = TestArchive::new();
    let remote = Arc::new(MockRemoteStore::new());
    let account = SampleAccount::new().note("n1", "one").note("n2", "two");
    remote.set_sync_state(SyncState::new(7, 1000, 0));
    remote.set_chunk(
        0,
        SyncChunk::new(7, Some(3)).with_note(account.notes[0].clone()),
    );
    remote.set_chunk(
        3,
        SyncChunk::new(7, Some(7)).with_note(account.notes[1].clone()),
    );
    serve(&remote, &account);

    let mut engine = engine(&archive, &remote);
    let report = engine.sync().unwrap();

    assert!(matches!(report.metadata, MetadataOutcome::Fetched { chunks: 2, .. }));
    assert_eq!(remote.calls().chunks, vec![0, 3]);
    assert_eq!(engine.metadata().cursor().last_sync_count, 7);
    assert_eq!(archive.note_files().len(), 2);
}

#[test]
fn incremental_sync_applies_tombstones_and_purges() {
    let archive = TestArchive::new();
    let remote = Arc::new(MockRemoteStore::new());
    let account = SampleAccount::new()
        .note("n1", "one")
        .resource("n1", "r1", b"img")
        .note("n2", "two");
    remote.set_sync_state(SyncState::new(50, 1000, 0));
    remote.set_chunk(0, account.chunk(50));
    serve(&remote, &account);
    engine(&archive, &remote).sync().unwrap();
    assert_eq!(archive.resource_files().len(), 1);

    let later = SampleAccount::new().note("n3", "three");
    serve(&remote, &later);
    remote.set_sync_state(SyncState::new(52, 2000, 0));
    remote.set_chunk(
        50,
        SyncChunk::new(52, Some(52))
            .with_note(NoteRecord::tombstone("n1"))
            .with_note(later.notes[0].clone()),
    );
    remote.reset_calls();

    let mut engine = engine(&archive, &remote);
    let report = engine.sync().unwrap();

    assert_eq!(remote.calls().chunks, vec![50]);
    assert_eq!(remote.calls().notes, vec!["n3"]);
    assert!(engine.metadata().note("n1").is_none());
    assert_eq!(report.purge.notes_removed, vec!["n1"]);
    assert_eq!(report.purge.files_removed, vec!["r1"]);
    assert_eq!(
        archive.note_files().into_iter().collect::<Vec<_>>(),
        vec!["n2", "n3"]
    );
    assert!(archive.resource_files().is_empty());
    assert_eq!(archive.metadata_json().unwrap()["lastSyncCount"], json!(52));
}

#[test]
fn full_sync_before_resets_metadata() {
    let archive = TestArchive::new();
    let remote = Arc::new(MockRemoteStore::new());
    let old = SampleAccount::new().notebook("nb1", "Work").note("n1", "one");
    remote.set_sync_state(SyncState::new(50, 1000, 0));
    remote.set_chunk(0, old.chunk(50));
    serve(&remote, &old);
    engine(&archive, &remote).sync().unwrap();

    let fresh = SampleAccount::new().notebook("nb2", "Home").note("n2", "two");
    serve(&remote, &fresh);
    remote.set_sync_state(SyncState::new(10, 3000, 2000));
    remote.set_chunk(0, fresh.chunk(10));
    remote.reset_calls();

    let mut engine = engine(&archive, &remote);
    let report = engine.sync().unwrap();

    assert!(matches!(
        report.metadata,
        MetadataOutcome::Fetched { full_resync: true, .. }
    ));
    assert_eq!(remote.calls().chunks, vec![0]);
    assert_eq!(engine.metadata().cursor().last_sync_count, 10);
    assert_eq!(engine.metadata().cursor().last_sync_time, 3000);
    assert!(engine.metadata().notebook_name("nb1").is_none());
    assert_eq!(engine.metadata().notebook_name("nb2"), Some("Home"));
    assert_eq!(
        archive.note_files().into_iter().collect::<Vec<_>>(),
        vec!["n2"]
    );
}

#[test]
fn corrupted_metadata_triggers_full_refetch_without_refetching_content() {
    let archive = TestArchive::new();
    let remote = Arc::new(MockRemoteStore::new());
    let account = work_account();
    remote.set_sync_state(SyncState::new(50, 1000, 0));
    remote.set_chunk(0, account.chunk(50));
    serve(&remote, &account);
    engine(&archive, &remote).sync().unwrap();

    std::fs::write(archive.metadata_path(), "{ not json").unwrap();
    remote.reset_calls();

    let mut engine = engine(&archive, &remote);
    assert_eq!(engine.metadata().note_count(), 0);
    engine.sync().unwrap();

    let calls = remote.calls();
    assert_eq!(calls.chunks, vec![0]);
    assert!(calls.notes.is_empty());
    assert_eq!(engine.metadata().note_count(), 1);
    assert_eq!(archive.metadata_json().unwrap()["lastSyncCount"], json!(50));
}

#[test]
fn changed_note_is_updated_in_place() {
    let archive = TestArchive::new();
    let remote = Arc::new(MockRemoteStore::new());
    remote.set_sync_state(SyncState::new(1, 1000, 0));
    let v1 = SampleAccount::new().note("n1", "draft");
    remote.set_chunk(0, v1.chunk(1));
    serve(&remote, &v1);
    engine(&archive, &remote).sync().unwrap();

    let v2 = SampleAccount::new().note("n1", "final");
    remote.set_sync_state(SyncState::new(2, 2000, 0));
    remote.set_chunk(1, v2.chunk(2));
    serve(&remote, &v2);

    let report = engine(&archive, &remote).sync().unwrap();
    assert_eq!(report.content.notes_updated, 1);
    assert_eq!(report.content.notes_created, 0);
    assert_eq!(archive.read_note("n1").as_deref(), Some("final"));
}

#[test]
fn mismatched_remote_digest_is_still_saved() {
    let archive = TestArchive::new();
    let remote = Arc::new(MockRemoteStore::new());
    remote.set_sync_state(SyncState::new(50, 1000, 0));
    remote.set_chunk(
        0,
        SyncChunk::new(50, Some(50))
            .with_note(NoteRecord::new("n1", ContentHash::from_hex("abc123").unwrap())),
    );
    remote.set_note_content("n1", "<en-note/>");

    engine(&archive, &remote).sync().unwrap();
    assert_eq!(archive.read_note("n1").as_deref(), Some("<en-note/>"));
}

#[test]
fn missing_resource_of_synced_note_is_restored() {
    let archive = TestArchive::new();
    let remote = Arc::new(MockRemoteStore::new());
    let account = SampleAccount::new().note("n1", "one")
        .resource("n1", "r1", b"img");
    remote.set_sync_state(SyncState::new(5, 1000, 0));
    remote.set_chunk(0, account.chunk(5));
    serve(&remote, &account);
    engine(&archive, &remote).sync().unwrap();

    std::fs::remove_file(archive.file_path("r1")).unwrap();
    remote.reset_calls();
    let mut engine = engine(&archive, &remote);
    let report = engine.sync().unwrap();

    assert!(!report.no_new_data());
    assert_eq!(report.content.files_created, 1);
    assert_eq!(remote.calls().resources, vec!["r1"]);
    assert_eq!(archive.read_file("r1"), Some(b"img".to_vec()));
    assert!(verify_archive(engine.metadata(), engine.cache()).unwrap().is_clean());
}

#[test]
fn damaged_resources_are_only_rehashed_on_request() {
    let archive = TestArchive::new();
    let remote = Arc::new(MockRemoteStore::new());
    let account = SampleAccount::new().note("n1", "one")
        .resource("n1", "r1", b"img");
    remote.set_sync_state(SyncState::new(5, 1000, 0));
    remote.set_chunk(0, account.chunk(5));
    serve(&remote, &account);
    engine(&archive, &remote).sync().unwrap();

    archive.write_file("r1", b"damaged");
    remote.reset_calls();
    let report = engine(&archive, &remote).sync().unwrap();
    assert!(report.no_new_data());
    assert!(remote.calls().resources.is_empty());

    let config = SyncConfig::default().with_verify_resources(true);
    let mut engine = SyncEngine::open(archive.root(), config, Arc::clone(&remote)).unwrap();
    let report = engine.sync().unwrap();
    assert_eq!(report.content.files_updated, 1);
    assert_eq!(remote.calls().resources, vec!["r1"]);
    assert!(verify_archive(engine.metadata(), engine.cache()).unwrap().is_clean());
}

#[test]
fn tombstone_survives_later_chunks_in_the_same_sync() {
    let archive = TestArchive::new();
    let remote = Arc::new(MockRemoteStore::new());
    let first = SampleAccount::new().note("n1", "one").note("n2", "two");
    remote.set_sync_state(SyncState::new(2, 1000, 0));
    remote.set_chunk(0, first.chunk(2));
    serve(&remote, &first);
    engine(&archive, &remote).sync().unwrap();
    assert!(archive.read_note("n1").is_some());

    let later = SampleAccount::new().note("n3", "three");
    serve(&remote, &later);
    remote.set_sync_state(SyncState::new(8, 2000, 0));
    remote.set_chunk(2, SyncChunk::new(8, Some(5)).with_note(NoteRecord::tombstone("n1")));
    remote.set_chunk(5, later.chunk(8));
    remote.reset_calls();

    let mut engine = engine(&archive, &remote);
    let report = engine.sync().unwrap();

    assert_eq!(remote.calls().chunks, vec![2, 5]);
    assert!(matches!(report.metadata, MetadataOutcome::Fetched { chunks: 2, .. }));
    assert!(engine.metadata().note("n1").is_none());
    assert!(engine.metadata().note("n3").is_some());
    assert!(archive.read_note("n1").is_none());
    assert_eq!(
        archive.note_files().into_iter().collect::<Vec<_>>(),
        vec!["n2", "n3"]
    );
}

#[test]
fn purge_can_be_disabled() {
    let archive = TestArchive::new();
    let remote = Arc::new(MockRemoteStore::new());
    archive.write_note("stray", "left over");
    remote.set_sync_state(SyncState::new(0, 1000, 0));

    let config = SyncConfig::default().with_purge(false);
    let report = SyncEngine::open(archive.root(), config, Arc::clone(&remote))
        .unwrap()
        .sync()
        .unwrap();
    assert_eq!(report.purge.total(), 0);
    assert!(archive.read_note("stray").is_some());

    let report = engine(&archive, &remote).sync().unwrap();
    assert_eq!(report.purge.notes_removed, vec!["stray"]);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn applying_a_chunk_twice_is_a_no_op(chunks in chunk_sequence_strategy(4)) {
        let mut store = MetadataStore::new();
        for chunk in &chunks {
            store.apply_chunk(chunk);
            let snapshot = store.clone();
            let again = store.apply_chunk(chunk);
            prop_assert!(again.is_empty());
            prop_assert_eq!(&store, &snapshot);
        }
    }

    #[test]
    fn cursor_never_moves_backwards(counts in prop::collection::vec(0u64..100, 1..6)) {
        let archive = TestArchive::new();
        let remote = Arc::new(MockRemoteStore::new());
        let mut engine = engine(&archive, &remote);
        let mut previous = 0u64;

        for (i, count) in counts.into_iter().enumerate() {
            remote.set_sync_state(SyncState::new(count, 1000 + i as i64, 0));
            engine.sync().unwrap();
            let cursor = engine.metadata().cursor().last_sync_count;
            prop_assert!(cursor >= previous);
            prop_assert_eq!(cursor, previous.max(count));
            previous = cursor;
        }
    }

    #[test]
    fn purge_leaves_exactly_the_live_set(
        chunk in chunk_strategy(),
        strays in prop::collection::btree_set("stray-[a-z]{1,6}", 0..4),
    ) {
        let archive = TestArchive::new();
        let dir = ArchiveDir::open(archive.root()).unwrap();
        let cache = ContentCache::new(&dir);
        let mut metadata = MetadataStore::new();
        metadata.apply_chunk(&chunk);

        for note in &chunk.notes {
            archive.write_note(&note.id, "body");
            for resource in &note.resources {
                archive.write_file(&resource.id, b"data");
            }
        }
        for stray in &strays {
            archive.write_note(stray, "x");
            archive.write_file(stray, b"x");
        }

        Reconciler::purge(&metadata, &cache).unwrap();

        let live_notes: std::collections::BTreeSet<String> =
            metadata.note_ids().into_iter().map(str::to_string).collect();
        let live_files: std::collections::BTreeSet<String> =
            metadata.referenced_resource_ids().into_iter().map(str::to_string).collect();
        prop_assert_eq!(archive.note_files(), live_notes);
        prop_assert_eq!(archive.resource_files(), live_files);
    }
}
