//! Purge command implementation.

use super::open_existing;
use notemirror_sync::{ContentCache, MetadataStore, PurgePlan, Reconciler};
use std::path::Path;

/// Runs the purge command.
pub fn run(path: &Path, dry_run: bool) -> Result<(), Box<dyn std::error::Error>> {
    println!("Purging archive at {:?}", path);
    if dry_run {
        println!("(dry run - no changes will be made)");
    }
    println!();

    let plan = purge(path, dry_run)?;

    println!("Purge Analysis:");
    println!("  Orphan notes:    {}", plan.notes.len());
    println!("  Orphan files:    {}", plan.files.len());
    for id in plan.notes.iter().chain(plan.files.iter()) {
        println!("    - {}", id);
    }

    println!();
    if dry_run {
        println!("Run without --dry-run to delete these files");
    } else {
        println!("✓ Purge complete");
    }
    Ok(())
}

/// Computes the orphans and deletes them unless `dry_run` is set.
///
/// The archive lock is held while deleting.
pub fn purge(path: &Path, dry_run: bool) -> Result<PurgePlan, Box<dyn std::error::Error>> {
    let archive = open_existing(path)?;
    let _lock = archive.lock()?;
    let metadata = MetadataStore::read(&archive.metadata_path())?
        .ok_or("Refusing to purge an archive without metadata")?;
    let cache = ContentCache::new(&archive);

    let plan = Reconciler::plan(&metadata, &cache)?;
    if !dry_run {
        Reconciler::apply(&plan, &cache)?;
    }
    Ok(plan)
}
