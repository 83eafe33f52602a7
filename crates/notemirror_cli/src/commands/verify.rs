//! Verify command implementation.

use super::open_existing;
use notemirror_sync::{verify_archive, ContentCache, EntryStatus, MetadataStore, VerifyReport};
use std::path::Path;

/// Runs the verify command.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying archive at {:?}", path);
    println!();

    let report = check(path)?;
    print_result(&report);

    println!();
    if report.is_clean() {
        println!("✓ Archive verification passed");
        Ok(())
    } else {
        println!("✗ Archive verification failed");
        Err("Verification failed".into())
    }
}

/// Checks an archive against its metadata without modifying it.
pub fn check(path: &Path) -> Result<VerifyReport, Box<dyn std::error::Error>> {
    let archive = open_existing(path)?;
    let metadata = MetadataStore::read(&archive.metadata_path())?
        .ok_or_else(|| format!("No metadata found at {:?}", archive.metadata_path()))?;
    Ok(verify_archive(&metadata, &ContentCache::new(&archive))?)
}

fn print_result(report: &VerifyReport) {
    println!("  Notes checked:   {}", report.notes_checked);
    println!("  Files checked:   {}", report.files_checked);
    println!("  Problems:        {}", report.problems.len());
    println!(
        "  Orphans:         {}",
        report.orphans.notes.len() + report.orphans.files.len()
    );

    for problem in &report.problems {
        let what = match problem.status {
            EntryStatus::Missing => "missing",
            EntryStatus::Stale => "stale",
            EntryStatus::Valid => continue,
        };
        println!("    - {} {} is {}", problem.area.noun(), problem.id, what);
    }
    for id in &report.orphans.notes {
        println!("    - orphan note {}", id);
    }
    for id in &report.orphans.files {
        println!("    - orphan file {}", id);
    }
}
