//! Status command implementation.

use super::open_existing;
use notemirror_sync::{CacheArea, ContentCache, MetadataStore};
use serde::Serialize;
use std::path::Path;

/// Archive status.
#[derive(Debug, Serialize)]
pub struct StatusResult {
    /// Archive root.
    pub path: String,
    /// True if a metadata file exists.
    pub initialized: bool,
    /// Remote update count covered locally.
    pub last_sync_count: u64,
    /// Remote time of the last metadata sync.
    pub last_sync_time: i64,
    /// Known notebooks.
    pub notebooks: usize,
    /// Known tags.
    pub tags: usize,
    /// Present notes.
    pub notes: usize,
    /// Present notes fully materialized.
    pub notes_in_sync: usize,
    /// Note files on disk.
    pub note_files: usize,
    /// Resource files on disk.
    pub resource_files: usize,
}

/// Runs the status command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = collect(path)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

/// Gathers the status of an archive without modifying it.
pub fn collect(path: &Path) -> Result<StatusResult, Box<dyn std::error::Error>> {
    let archive = open_existing(path)?;
    let cache = ContentCache::new(&archive);
    let stored = MetadataStore::read(&archive.metadata_path())?;
    let initialized = stored.is_some();
    let metadata = stored.unwrap_or_default();
    let cursor = metadata.cursor();

    Ok(StatusResult {
        path: path.display().to_string(),
        initialized,
        last_sync_count: cursor.last_sync_count,
        last_sync_time: cursor.last_sync_time,
        notebooks: metadata.notebook_count(),
        tags: metadata.tag_count(),
        notes: metadata.note_count(),
        notes_in_sync: metadata.in_sync_count(),
        note_files: cache.list(CacheArea::Notes)?.len(),
        resource_files: cache.list(CacheArea::Files)?.len(),
    })
}

fn print_text_output(result: &StatusResult) {
    println!("NoteMirror Archive: {}", result.path);
    println!();
    if !result.initialized {
        println!("Never synced");
        return;
    }
    println!("Sync Cursor:");
    println!("  Last sync count: {}", result.last_sync_count);
    println!("  Last sync time:  {}", result.last_sync_time);
    println!();
    println!("Metadata:");
    println!("  Notebooks:       {}", result.notebooks);
    println!("  Tags:            {}", result.tags);
    println!(
        "  Notes:           {} ({} in sync)",
        result.notes, result.notes_in_sync
    );
    println!();
    println!("Cache:");
    println!("  Note files:      {}", result.note_files);
    println!("  Resource files:  {}", result.resource_files);
}

#[cfg(test)]
mod tests {
    use super::*;
    use notemirror_testkit::TestArchive;
    use std::fs;

    #[test]
    fn status_of_fresh_and_synced_archive() {
        let archive = TestArchive::new();
        let fresh = collect(archive.root()).unwrap();
        assert!(!fresh.initialized);
        assert_eq!(fresh.notes, 0);

        fs::write(
            archive.metadata_path(),
            r#"{
                "notes": { "n1": { "id": "n1", "contentHash": "", "active": true, "in_sync": true } },
                "notebooks": { "nb1": "Work" },
                "tags": {},
                "lastSyncCount": 50,
                "lastSyncTime": 1700
            }"#,
        )
        .unwrap();
        archive.write_note("n1", "body");

        let status = collect(archive.root()).unwrap();
        assert!(status.initialized);
        assert_eq!(status.last_sync_count, 50);
        assert_eq!(status.notebooks, 1);
        assert_eq!(status.notes_in_sync, 1);
        assert_eq!(status.note_files, 1);
    }

    #[test]
    fn status_requires_an_archive() {
        let archive = TestArchive::new();
        assert!(collect(&archive.root().join("missing")).is_err());
    }
}
