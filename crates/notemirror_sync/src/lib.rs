//! # NoteMirror Sync Engine
//!
//! Incremental, one-way mirror of a remote note store into a local archive.
//!
//! This crate provides:
//! - USN-based delta fetch of notebooks, tags and note metadata
//! - Persistent metadata store with sync cursors
//! - Hash-validated content cache for note bodies and resources
//! - Purge of cache entries no longer backed by metadata
//! - HTTP remote abstraction
//!
//! ## Architecture
//!
//! A sync runs five phases in order:
//! 1. Walk the remote change log from the local cursor (or from zero when
//!    the remote demands a full resync)
//! 2. Persist metadata
//! 3. Materialize every present note and its resources
//! 4. Purge orphaned cache files
//! 5. Persist metadata
//!
//! ## Key Invariants
//!
//! - The remote is authoritative; nothing is ever pushed
//! - Applying a chunk twice is a no-op
//! - Cursors never move backwards, except on a remote-requested reset
//! - A cached file is never fetched while its digest matches
//! - Rate limits abort the sync and are never retried here

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod archive;
mod cache;
mod config;
mod engine;
mod error;
mod http;
mod metadata;
mod purge;
mod remote;
mod verify;

pub use archive::{ArchiveDir, ArchiveLock};
pub use cache::{CacheArea, ContentCache, EntryStatus, Materialized};
pub use config::{SyncConfig, DEFAULT_BLOCK_SIZE};
pub use engine::{
    ContentStats, MetadataOutcome, PartialSync, SyncEngine, SyncPhase, SyncReport, SyncStats,
};
pub use error::{SyncError, SyncResult};
pub use http::{HttpClient, HttpRemoteStore, HttpResponse, DEFAULT_RETRY_AFTER_SECS};
pub use metadata::{ApplyStats, MetadataStore, NoteEntry, SyncCursor};
pub use purge::{PurgePlan, PurgeReport, Reconciler};
pub use remote::{MockCalls, MockRemoteStore, RemoteStore};
pub use verify::{verify_archive, EntryProblem, VerifyReport};
