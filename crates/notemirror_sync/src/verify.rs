//! Offline consistency check of an archive.

use crate::cache::{CacheArea, ContentCache, EntryStatus};
use crate::error::SyncResult;
use crate::metadata::MetadataStore;
use crate::purge::{PurgePlan, Reconciler};

/// A cache entry that does not hold its expected content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryProblem {
    /// Which area the entry lives in.
    pub area: CacheArea,
    /// Entity id.
    pub id: String,
    /// Missing or stale.
    pub status: EntryStatus,
}

/// Result of checking an archive against its metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyReport {
    /// Present notes checked.
    pub notes_checked: usize,
    /// Resources checked.
    pub files_checked: usize,
    /// Entries that are missing or stale.
    pub problems: Vec<EntryProblem>,
    /// Cache files with no metadata behind them.
    pub orphans: PurgePlan,
}

impl VerifyReport {
    /// Returns true if the archive is fully materialized and has no orphans.
    pub fn is_clean(&self) -> bool {
        self.problems.is_empty() && self.orphans.is_empty()
    }
}

/// Checks every present note and resource against its recorded digest.
///
/// Nothing is fetched or deleted.
pub fn verify_archive(metadata: &MetadataStore, cache: &ContentCache) -> SyncResult<VerifyReport> {
    let mut report = VerifyReport::default();

    for entry in metadata.notes() {
        report.notes_checked += 1;
        let record = &entry.record;
        check(&mut report, cache, CacheArea::Notes, &record.id, &record.content_hash)?;
        for resource in &record.resources {
            report.files_checked += 1;
            check(&mut report, cache, CacheArea::Files, &resource.id, resource.body_hash())?;
        }
    }

    report.orphans = Reconciler::plan(metadata, cache)?;
    Ok(report)
}

fn check(
    report: &mut VerifyReport,
    cache: &ContentCache,
    area: CacheArea,
    id: &str,
    expected: &notemirror_protocol::ContentHash,
) -> SyncResult<()> {
    let status = cache.status(area, id, expected)?;
    if status != EntryStatus::Valid {
        report.problems.push(EntryProblem {
            area,
            id: id.to_string(),
            status,
        });
    }
    Ok(())
}
