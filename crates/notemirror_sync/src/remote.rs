//! Remote store abstraction.

use crate::error::{SyncError, SyncResult};
use notemirror_protocol::{SyncChunk, SyncChunkFilter, SyncState};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::warn;

/// Read access to a remote note store.
///
/// This trait abstracts the transport, allowing for different
/// implementations (HTTP gateway, scripted mock for testing, etc.).
/// Every call may fail with [`SyncError::RateLimited`].
pub trait RemoteStore: Send + Sync {
    /// Returns the account-wide sync state.
    fn get_sync_state(&self) -> SyncResult<SyncState>;

    /// Returns the changes with a USN greater than `after_usn`.
    fn get_filtered_sync_chunk(
        &self,
        after_usn: u64,
        max_entries: u32,
        filter: &SyncChunkFilter,
    ) -> SyncResult<SyncChunk>;

    /// Returns the content markup of a note, without resource bodies.
    fn get_note_content(&self, id: &str) -> SyncResult<String>;

    /// Returns the raw body of a resource.
    fn get_resource_content(&self, id: &str) -> SyncResult<Vec<u8>>;
}

impl<R: RemoteStore + ?Sized> RemoteStore for Arc<R> {
    fn get_sync_state(&self) -> SyncResult<SyncState> {
        (**self).get_sync_state()
    }

    fn get_filtered_sync_chunk(
        &self,
        after_usn: u64,
        max_entries: u32,
        filter: &SyncChunkFilter,
    ) -> SyncResult<SyncChunk> {
        (**self).get_filtered_sync_chunk(after_usn, max_entries, filter)
    }

    fn get_note_content(&self, id: &str) -> SyncResult<String> {
        (**self).get_note_content(id)
    }

    fn get_resource_content(&self, id: &str) -> SyncResult<Vec<u8>> {
        (**self).get_resource_content(id)
    }
}

/// Runs a remote fetch and reports rate limits to the operator.
///
/// The error is passed through unchanged; retrying is the caller's call.
pub(crate) fn fetch_reporting<T>(
    kind: &str,
    id: &str,
    fetch: impl FnOnce() -> SyncResult<T>,
) -> SyncResult<T> {
    fetch().inspect_err(|err| {
        if let SyncError::RateLimited { retry_after_secs } = err {
            warn!(
                kind,
                id,
                retry_after_secs,
                "rate limit reached, retry your request in {} seconds",
                retry_after_secs
            );
        }
    })
}

/// Calls observed by a [`MockRemoteStore`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockCalls {
    /// Number of sync state requests.
    pub sync_state: usize,
    /// `after_usn` of every chunk request, in order.
    pub chunks: Vec<u64>,
    /// Ids of every note content request, in order.
    pub notes: Vec<String>,
    /// Ids of every resource request, in order.
    pub resources: Vec<String>,
}

/// A scripted remote store for testing.
///
/// Chunks are keyed by the `after_usn` they answer. Unknown cursors get an
/// empty chunk. Individual ids can be made to fail with a rate limit.
#[derive(Debug, Default)]
pub struct MockRemoteStore {
    sync_state: Mutex<Option<SyncState>>,
    chunks: Mutex<BTreeMap<u64, SyncChunk>>,
    notes: Mutex<HashMap<String, String>>,
    resources: Mutex<HashMap<String, Vec<u8>>>,
    rate_limited: Mutex<HashMap<String, u64>>,
    calls: Mutex<MockCalls>,
}

impl MockRemoteStore {
    /// Creates a new mock remote store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the sync state response.
    pub fn set_sync_state(&self, state: SyncState) {
        *self.sync_state.lock() = Some(state);
    }

    /// Sets the chunk returned for `after_usn`.
    pub fn set_chunk(&self, after_usn: u64, chunk: SyncChunk) {
        self.chunks.lock().insert(after_usn, chunk);
    }

    /// Removes all scripted chunks.
    pub fn clear_chunks(&self) {
        self.chunks.lock().clear();
    }

    /// Sets the content of a note.
    pub fn set_note_content(&self, id: impl Into<String>, content: impl Into<String>) {
        self.notes.lock().insert(id.into(), content.into());
    }

    /// Sets the body of a resource.
    pub fn set_resource(&self, id: impl Into<String>, body: impl Into<Vec<u8>>) {
        self.resources.lock().insert(id.into(), body.into());
    }

    /// Makes every fetch of `id` fail with a rate limit.
    pub fn rate_limit(&self, id: impl Into<String>, retry_after_secs: u64) {
        self.rate_limited.lock().insert(id.into(), retry_after_secs);
    }

    /// Lifts a rate limit set with [`MockRemoteStore::rate_limit`].
    pub fn lift_rate_limit(&self, id: &str) {
        self.rate_limited.lock().remove(id);
    }

    /// Returns the calls observed so far.
    pub fn calls(&self) -> MockCalls {
        self.calls.lock().clone()
    }

    /// Forgets the calls observed so far.
    pub fn reset_calls(&self) {
        *self.calls.lock() = MockCalls::default();
    }

    fn check_rate_limit(&self, id: &str) -> SyncResult<()> {
        match self.rate_limited.lock().get(id) {
            Some(secs) => Err(SyncError::rate_limited(*secs)),
            None => Ok(()),
        }
    }
}

impl RemoteStore for MockRemoteStore {
    fn get_sync_state(&self) -> SyncResult<SyncState> {
        self.calls.lock().sync_state += 1;
        self.sync_state
            .lock()
            .ok_or_else(|| SyncError::Protocol("No mock sync state set".into()))
    }

    fn get_filtered_sync_chunk(
        &self,
        after_usn: u64,
        _max_entries: u32,
        _filter: &SyncChunkFilter,
    ) -> SyncResult<SyncChunk> {
        self.calls.lock().chunks.push(after_usn);
        if let Some(chunk) = self.chunks.lock().get(&after_usn) {
            return Ok(chunk.clone());
        }
        let update_count = self.sync_state.lock().map_or(after_usn, |s| s.update_count);
        Ok(SyncChunk::new(update_count, None))
    }

    fn get_note_content(&self, id: &str) -> SyncResult<String> {
        self.calls.lock().notes.push(id.to_string());
        self.check_rate_limit(id)?;
        self.notes
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| SyncError::ServerError(format!("note not found: {id}")))
    }

    fn get_resource_content(&self, id: &str) -> SyncResult<Vec<u8>> {
        self.calls.lock().resources.push(id.to_string());
        self.check_rate_limit(id)?;
        self.resources
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| SyncError::ServerError(format!("resource not found: {id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_requires_sync_state() {
        let remote = MockRemoteStore::new();
        assert!(matches!(remote.get_sync_state(), Err(SyncError::Protocol(_))));

        remote.set_sync_state(SyncState::new(5, 10, 0));
        assert_eq!(remote.get_sync_state().unwrap().update_count, 5);
        assert_eq!(remote.calls().sync_state, 2);
    }

    #[test]
    fn mock_unknown_cursor_returns_empty_chunk() {
        let remote = MockRemoteStore::new();
        remote.set_sync_state(SyncState::new(7, 0, 0));

        let chunk = remote
            .get_filtered_sync_chunk(7, 100, &SyncChunkFilter::default())
            .unwrap();
        assert!(chunk.is_empty());
        assert!(!chunk.has_more());
        assert_eq!(remote.calls().chunks, vec![7]);
    }

    #[test]
    fn mock_rate_limit() {
        let remote = MockRemoteStore::new();
        remote.set_resource("r1", b"body".to_vec());
        remote.rate_limit("r1", 30);

        let err = remote.get_resource_content("r1").unwrap_err();
        assert_eq!(err.retry_after().map(|d| d.as_secs()), Some(30));

        remote.lift_rate_limit("r1");
        assert_eq!(remote.get_resource_content("r1").unwrap(), b"body");
        assert_eq!(remote.calls().resources, vec!["r1", "r1"]);
    }

    #[test]
    fn fetch_reporting_passes_errors_through() {
        let result: SyncResult<()> = fetch_reporting("note", "n1", || Err(SyncError::rate_limited(5)));
        assert!(matches!(
            result,
            Err(SyncError::RateLimited {
                retry_after_secs: 5
            })
        ));

        let value = fetch_reporting("note", "n1", || Ok(3)).unwrap();
        assert_eq!(value, 3);
    }
}
