//! HTTP remote store.
//!
//! Talks to a JSON gateway in front of the note service. The actual HTTP
//! client is abstracted via a trait so the engine never depends on a
//! particular HTTP library.

use crate::error::{SyncError, SyncResult};
use crate::remote::RemoteStore;
use notemirror_protocol::{ChunkRequest, NoteContent, SyncChunk, SyncChunkFilter, SyncState};
use parking_lot::RwLock;
use serde::Deserialize;
use url::Url;

/// Delay used when a 429 response names none.
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// A raw HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Parsed `Retry-After` header, if present.
    pub retry_after: Option<u64>,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a 200 response.
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            retry_after: None,
            body: body.into(),
        }
    }

    /// Creates a response with the given status and body.
    pub fn with_status(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            retry_after: None,
            body: body.into(),
        }
    }
}

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual HTTP transport. Errors are
/// connection-level failures only; non-2xx statuses come back as responses.
pub trait HttpClient: Send + Sync {
    /// Sends a POST request with a bearer token.
    fn post(&self, url: &str, auth_token: &str, body: Vec<u8>) -> Result<HttpResponse, String>;

    /// Checks if the client is healthy.
    fn is_healthy(&self) -> bool;
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    #[serde(default)]
    rate_limit_duration: Option<u64>,
    #[serde(default)]
    message: Option<String>,
}

/// Remote store backed by an HTTP gateway.
pub struct HttpRemoteStore<C: HttpClient> {
    /// Base URL of the gateway (e.g., "https://sandbox.example.com").
    base_url: String,
    auth_token: String,
    client: C,
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpRemoteStore<C> {
    /// Creates a new HTTP remote store.
    pub fn new(base_url: impl Into<String>, auth_token: impl Into<String>, client: C) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token: auth_token.into(),
            client,
            last_error: RwLock::new(None),
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the last error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    /// Returns true if the underlying client is healthy.
    pub fn is_healthy(&self) -> bool {
        self.client.is_healthy()
    }

    /// Appends `segments` to the base URL, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> SyncResult<String> {
        let invalid = |reason: String| {
            SyncError::transport_fatal(format!("invalid base URL {:?}: {reason}", self.base_url))
        };
        let mut url = Url::parse(&self.base_url).map_err(|e| invalid(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| invalid("cannot carry a path".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url.into())
    }

    fn post(&self, segments: &[&str], body: Vec<u8>) -> SyncResult<Vec<u8>> {
        let result = self.endpoint(segments).and_then(|url| {
            self.client
                .post(&url, &self.auth_token, body)
                .map_err(SyncError::transport_retryable)
                .and_then(into_body)
        });

        match &result {
            Ok(_) => *self.last_error.write() = None,
            Err(e) => *self.last_error.write() = Some(e.to_string()),
        }
        result
    }
}

/// Maps a response status onto the engine's error kinds.
fn into_body(response: HttpResponse) -> SyncResult<Vec<u8>> {
    let status = response.status;
    if (200..300).contains(&status) {
        return Ok(response.body);
    }

    let parsed: Option<ErrorBody> = serde_json::from_slice(&response.body).ok();
    let message = parsed
        .as_ref()
        .and_then(|b| b.message.clone())
        .unwrap_or_else(|| format!("HTTP {status}"));

    match status {
        429 => {
            let secs = response
                .retry_after
                .or_else(|| parsed.and_then(|b| b.rate_limit_duration))
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            Err(SyncError::rate_limited(secs))
        }
        401 | 403 => Err(SyncError::AuthenticationFailed(message)),
        404 | 500..=599 => Err(SyncError::ServerError(message)),
        _ => Err(SyncError::Protocol(message)),
    }
}

fn protocol_error(what: &str) -> impl Fn(notemirror_protocol::ProtocolError) -> SyncError + '_ {
    move |e| SyncError::Protocol(format!("Failed to decode {what}: {e}"))
}

impl<C: HttpClient> RemoteStore for HttpRemoteStore<C> {
    fn get_sync_state(&self) -> SyncResult<SyncState> {
        let body = self.post(&["sync", "state"], b"{}".to_vec())?;
        SyncState::decode(&body).map_err(protocol_error("sync state"))
    }

    fn get_filtered_sync_chunk(
        &self,
        after_usn: u64,
        max_entries: u32,
        filter: &SyncChunkFilter,
    ) -> SyncResult<SyncChunk> {
        let request = ChunkRequest::new(after_usn, max_entries, filter.clone());
        let encoded = request
            .encode()
            .map_err(|e| SyncError::Protocol(format!("Failed to encode request: {e}")))?;
        let body = self.post(&["sync", "chunk"], encoded)?;
        SyncChunk::decode(&body).map_err(protocol_error("sync chunk"))
    }

    fn get_note_content(&self, id: &str) -> SyncResult<String> {
        let body = self.post(&["notes", id, "content"], b"{}".to_vec())?;
        NoteContent::decode(&body)
            .map(|n| n.content)
            .map_err(protocol_error("note content"))
    }

    fn get_resource_content(&self, id: &str) -> SyncResult<Vec<u8>> {
        self.post(&["res", id], Vec::new())
    }
}
