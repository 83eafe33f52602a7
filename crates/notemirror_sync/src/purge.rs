//! Purge of cache entries no longer backed by metadata.
//!
//! Purging is a mark-and-sweep: the present notes in the metadata store are
//! the live set, and every cache file outside it is deleted. Note ids and
//! resource ids are disjoint, so the two passes are independent.

use crate::cache::{CacheArea, ContentCache};
use crate::error::SyncResult;
use crate::metadata::MetadataStore;
use std::collections::BTreeSet;
use tracing::info;

/// Cache entries that a purge would delete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurgePlan {
    /// Note files with no present note.
    pub notes: BTreeSet<String>,
    /// Resource files not referenced by any present note.
    pub files: BTreeSet<String>,
}

impl PurgePlan {
    /// Returns true if nothing needs deleting.
    pub fn is_empty(&self) -> bool {
        self.notes.is_empty() && self.files.is_empty()
    }
}

/// Cache entries a purge deleted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurgeReport {
    /// Deleted note files.
    pub notes_removed: Vec<String>,
    /// Deleted resource files.
    pub files_removed: Vec<String>,
}

impl PurgeReport {
    /// Total number of deleted files.
    pub fn total(&self) -> usize {
        self.notes_removed.len() + self.files_removed.len()
    }
}

/// Reconciles the content cache with the metadata store.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reconciler;

impl Reconciler {
    /// Computes the orphaned entries without touching the disk beyond
    /// listing the cache.
    pub fn plan(metadata: &MetadataStore, cache: &ContentCache) -> SyncResult<PurgePlan> {
        let live_notes = metadata.note_ids();
        let notes = cache
            .list(CacheArea::Notes)?
            .into_iter()
            .filter(|id| !live_notes.contains(id.as_str()))
            .collect();

        let live_files = metadata.referenced_resource_ids();
        let files = cache
            .list(CacheArea::Files)?
            .into_iter()
            .filter(|id| !live_files.contains(id.as_str()))
            .collect();

        Ok(PurgePlan { notes, files })
    }

    /// Deletes every orphaned note file and resource file.
    pub fn purge(metadata: &MetadataStore, cache: &ContentCache) -> SyncResult<PurgeReport> {
        let plan = Self::plan(metadata, cache)?;
        Self::apply(&plan, cache)
    }

    /// Deletes the entries named by a plan.
    pub fn apply(plan: &PurgePlan, cache: &ContentCache) -> SyncResult<PurgeReport> {
        let mut report = PurgeReport::default();

        for id in &plan.notes {
            info!("Deleting note: {}", id);
            if cache.remove(CacheArea::Notes, id)? {
                report.notes_removed.push(id.clone());
            }
        }

        for id in &plan.files {
            info!("Deleting file: {}", id);
            if cache.remove(CacheArea::Files, id)? {
                report.files_removed.push(id.clone());
            }
        }

        Ok(report)
    }
}
