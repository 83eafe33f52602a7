//! Sync engine.

use crate::archive::ArchiveDir;
use crate::cache::{CacheArea, ContentCache, Materialized};
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::metadata::{ApplyStats, MetadataStore};
use crate::purge::{PurgeReport, Reconciler};
use crate::remote::{fetch_reporting, RemoteStore};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// The current phase of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// Engine is idle, not syncing.
    Idle,
    /// Engine is walking the remote change log.
    Metadata,
    /// Engine is fetching note content and resource bodies.
    Content,
    /// Engine is deleting orphaned cache entries.
    Purge,
    /// Engine has completed a sync.
    Synced,
    /// The last sync failed.
    Error,
}

impl SyncPhase {
    /// Returns true if a sync is in progress.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SyncPhase::Metadata | SyncPhase::Content | SyncPhase::Purge
        )
    }

    /// Returns true if the engine can start a new sync.
    pub fn can_start_sync(&self) -> bool {
        matches!(self, SyncPhase::Idle | SyncPhase::Synced | SyncPhase::Error)
    }
}

/// Outcome of the metadata phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataOutcome {
    /// The remote update count matched the local cursor.
    UpToDate,
    /// Chunks were fetched and applied.
    Fetched {
        /// Number of chunk requests made.
        chunks: u64,
        /// True if cached metadata was discarded first.
        full_resync: bool,
        /// Changes applied to the metadata store.
        applied: ApplyStats,
    },
}

impl MetadataOutcome {
    /// Combines the outcome of an earlier sync with a later one.
    pub fn merge(self, later: Self) -> Self {
        match (self, later) {
            (MetadataOutcome::UpToDate, other) | (other, MetadataOutcome::UpToDate) => other,
            (
                MetadataOutcome::Fetched {
                    chunks,
                    full_resync,
                    mut applied,
                },
                MetadataOutcome::Fetched {
                    chunks: later_chunks,
                    full_resync: later_full_resync,
                    applied: later_applied,
                },
            ) => {
                applied += later_applied;
                MetadataOutcome::Fetched {
                    chunks: chunks + later_chunks,
                    full_resync: full_resync || later_full_resync,
                    applied,
                }
            }
        }
    }
}

/// Counts from the content phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContentStats {
    /// Present notes visited.
    pub notes_checked: u64,
    /// Note files fetched for the first time.
    pub notes_created: u64,
    /// Note files replaced.
    pub notes_updated: u64,
    /// Resource files fetched for the first time.
    pub files_created: u64,
    /// Resource files replaced.
    pub files_updated: u64,
}

impl ContentStats {
    fn record(&mut self, area: CacheArea, outcome: Materialized) {
        let slot = match (area, outcome) {
            (_, Materialized::Unchanged) => return,
            (CacheArea::Notes, Materialized::Created) => &mut self.notes_created,
            (CacheArea::Notes, Materialized::Updated) => &mut self.notes_updated,
            (CacheArea::Files, Materialized::Created) => &mut self.files_created,
            (CacheArea::Files, Materialized::Updated) => &mut self.files_updated,
        };
        *slot += 1;
    }

    /// Adds the counts of another run.
    pub fn absorb(&mut self, other: &ContentStats) {
        self.notes_checked += other.notes_checked;
        self.notes_created += other.notes_created;
        self.notes_updated += other.notes_updated;
        self.files_created += other.files_created;
        self.files_updated += other.files_updated;
    }

    /// Number of remote content fetches made.
    pub fn fetched(&self) -> u64 {
        self.notes_created + self.notes_updated + self.files_created + self.files_updated
    }
}

/// Result of one sync.
#[derive(Debug, Clone)]
pub struct SyncReport {
    /// What the metadata phase did.
    pub metadata: MetadataOutcome,
    /// What the content phase did.
    pub content: ContentStats,
    /// What the purge phase deleted.
    pub purge: PurgeReport,
    /// Duration of the sync.
    pub duration: Duration,
}

impl SyncReport {
    /// Returns true if the remote had nothing new and no local file changed.
    pub fn no_new_data(&self) -> bool {
        self.metadata == MetadataOutcome::UpToDate
            && self.content.fetched() == 0
            && self.purge.total() == 0
    }
}

/// Work a failed sync completed before it stopped.
///
/// Metadata applied here was committed by the first checkpoint and files
/// written stay on disk, so the next sync does not repeat any of it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartialSync {
    /// Outcome of the metadata phase, if it finished.
    pub metadata: Option<MetadataOutcome>,
    /// Content fetched before the failure.
    pub content: ContentStats,
}

impl PartialSync {
    /// Adds the progress of another interrupted sync.
    pub fn absorb(&mut self, other: &PartialSync) {
        self.metadata = match (self.metadata, other.metadata) {
            (Some(a), Some(b)) => Some(a.merge(b)),
            (a, b) => a.or(b),
        };
        self.content.absorb(&other.content);
    }

    /// Returns true if nothing was fetched or written.
    pub fn is_empty(&self) -> bool {
        matches!(self.metadata, None | Some(MetadataOutcome::UpToDate))
            && self.content.fetched() == 0
    }
}

/// Cumulative statistics over the engine's lifetime.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Total number of syncs completed.
    pub cycles_completed: u64,
    /// Total number of chunks fetched.
    pub chunks_fetched: u64,
    /// Total number of content fetches.
    pub content_fetched: u64,
    /// Total number of cache files purged.
    pub files_purged: u64,
    /// Last successful sync.
    pub last_sync_time: Option<Instant>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Mirrors a remote note store into a local archive.
///
/// A sync runs in strict order: metadata, checkpoint, content, purge,
/// checkpoint. Each checkpoint persists the metadata store, so a failure in
/// a later phase leaves everything committed before it intact.
pub struct SyncEngine<R: RemoteStore> {
    config: SyncConfig,
    remote: R,
    archive: ArchiveDir,
    cache: ContentCache,
    metadata: MetadataStore,
    phase: SyncPhase,
    stats: SyncStats,
    interrupted: Option<PartialSync>,
}

impl<R: RemoteStore> SyncEngine<R> {
    /// Opens the archive at `root` and loads its metadata.
    ///
    /// Directories are created if absent. Corrupted metadata is replaced by
    /// an empty store.
    pub fn open(root: &Path, config: SyncConfig, remote: R) -> SyncResult<Self> {
        let archive = ArchiveDir::open(root)?;
        let metadata = MetadataStore::load(&archive.metadata_path())?;
        Ok(Self {
            config,
            remote,
            cache: ContentCache::new(&archive),
            archive,
            metadata,
            phase: SyncPhase::Idle,
            stats: SyncStats::default(),
            interrupted: None,
        })
    }

    /// Gets the current phase.
    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    /// Gets the cumulative stats.
    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }

    /// Gets what the last sync completed before failing.
    ///
    /// `None` after a successful sync.
    pub fn interrupted(&self) -> Option<&PartialSync> {
        self.interrupted.as_ref()
    }

    /// Gets the in-memory metadata.
    pub fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    /// Gets the archive layout.
    pub fn archive(&self) -> &ArchiveDir {
        &self.archive
    }

    /// Gets the content cache.
    pub fn cache(&self) -> &ContentCache {
        &self.cache
    }

    /// Gets the remote store.
    pub fn remote(&self) -> &R {
        &self.remote
    }

    /// Performs a full sync.
    ///
    /// Rate limits abort the sync and are returned as
    /// [`SyncError::RateLimited`]; call `sync` again after the delay. Notes
    /// already materialized are not fetched again.
    pub fn sync(&mut self) -> SyncResult<SyncReport> {
        let start = Instant::now();

        if !self.phase.can_start_sync() {
            return Err(SyncError::InvalidStateTransition {
                from: format!("{:?}", self.phase),
                to: "sync".into(),
            });
        }

        let mut progress = PartialSync::default();
        match self.run(start, &mut progress) {
            Ok(report) => {
                self.phase = SyncPhase::Synced;
                self.interrupted = None;
                let stats = &mut self.stats;
                stats.cycles_completed += 1;
                if let MetadataOutcome::Fetched { chunks, .. } = report.metadata {
                    stats.chunks_fetched += chunks;
                }
                stats.content_fetched += report.content.fetched();
                stats.files_purged += report.purge.total() as u64;
                stats.last_sync_time = Some(Instant::now());
                stats.last_error = None;
                Ok(report)
            }
            Err(e) => {
                self.phase = SyncPhase::Error;
                self.stats.last_error = Some(e.to_string());
                self.interrupted = Some(progress);
                Err(e)
            }
        }
    }

    fn run(&mut self, start: Instant, progress: &mut PartialSync) -> SyncResult<SyncReport> {
        self.phase = SyncPhase::Metadata;
        let metadata = self.sync_metadata()?;
        progress.metadata = Some(metadata);
        self.checkpoint()?;

        self.phase = SyncPhase::Content;
        self.sync_notes(&mut progress.content)?;
        let content = progress.content;

        self.phase = SyncPhase::Purge;
        let purge = if self.config.purge {
            Reconciler::purge(&self.metadata, &self.cache)?
        } else {
            PurgeReport::default()
        };
        self.checkpoint()?;

        let report = SyncReport {
            metadata,
            content,
            purge,
            duration: start.elapsed(),
        };
        if report.no_new_data() {
            debug!("No new data");
        } else {
            info!(
                notes = self.metadata.note_count(),
                fetched = report.content.fetched(),
                purged = report.purge.total(),
                "sync complete"
            );
        }
        Ok(report)
    }

    /// Walks the remote change log from the local cursor.
    fn sync_metadata(&mut self) -> SyncResult<MetadataOutcome> {
        let remote = &self.remote;
        let state = fetch_reporting("sync state", "account", || remote.get_sync_state())?;

        let full_resync = state.requires_full_sync(self.metadata.cursor().last_sync_time);
        if full_resync {
            info!(
                full_sync_before = state.full_sync_before,
                "remote requires a full resync, discarding cached metadata"
            );
            self.metadata.reset();
        } else if state.update_count == self.metadata.cursor().last_sync_count {
            return Ok(MetadataOutcome::UpToDate);
        }

        let mut after_usn = self.metadata.cursor().last_sync_count;
        let mut update_count = state.update_count;
        let mut chunks = 0u64;
        let mut applied = ApplyStats::default();

        loop {
            debug!(after_usn, "Fetching data starting from afterUSN={}", after_usn);
            let chunk = fetch_reporting("sync chunk", &after_usn.to_string(), || {
                remote.get_filtered_sync_chunk(after_usn, self.config.block_size, &self.config.chunk_filter)
            })?;
            chunks += 1;
            applied += self.metadata.apply_chunk(&chunk);
            update_count = update_count.max(chunk.update_count);

            match chunk.chunk_high_usn {
                Some(high) if chunk.has_more() => {
                    if high <= after_usn {
                        return Err(SyncError::Protocol(format!(
                            "chunk high USN {high} does not advance past {after_usn}"
                        )));
                    }
                    after_usn = high;
                }
                _ => break,
            }
        }

        self.metadata.advance_cursor(update_count, state.current_time);
        Ok(MetadataOutcome::Fetched {
            chunks,
            full_resync,
            applied,
        })
    }

    /// Materializes every present note and its resources.
    fn sync_notes(&mut self, stats: &mut ContentStats) -> SyncResult<()> {
        let ids: Vec<String> = self.metadata.notes().map(|e| e.record.id.clone()).collect();

        for id in ids {
            let Some(entry) = self.metadata.note(&id).cloned() else {
                continue;
            };
            let remote = &self.remote;
            stats.notes_checked += 1;

            let outcome = self.cache.materialize(
                CacheArea::Notes,
                &id,
                &entry.record.content_hash,
                || fetch_reporting("note", &id, || remote.get_note_content(&id)).map(String::into_bytes),
            )?;
            stats.record(CacheArea::Notes, outcome);

            // Files of notes already in sync only get an existence check
            // unless a full re-hash was asked for.
            let trust_existing = entry.in_sync && !self.config.verify_resources;
            for resource in &entry.record.resources {
                if trust_existing && self.cache.contains(CacheArea::Files, &resource.id)? {
                    continue;
                }
                let outcome = self.cache.materialize(
                    CacheArea::Files,
                    &resource.id,
                    resource.body_hash(),
                    || fetch_reporting("resource", &resource.id, || remote.get_resource_content(&resource.id)),
                )?;
                stats.record(CacheArea::Files, outcome);
            }

            self.metadata.mark_in_sync(&id);
        }

        Ok(())
    }

    /// Persists the metadata store if it changed.
    fn checkpoint(&mut self) -> SyncResult<()> {
        let path = self.archive.metadata_path();
        if self.metadata.save(&path)? {
            debug!(path = %path.display(), "metadata saved");
        }
        Ok(())
    }
}
