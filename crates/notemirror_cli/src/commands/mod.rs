//! CLI command implementations.

pub mod purge;
pub mod status;
pub mod sync;
pub mod verify;

use notemirror_sync::ArchiveDir;
use std::path::Path;

/// Opens an archive that must already exist.
fn open_existing(root: &Path) -> Result<ArchiveDir, Box<dyn std::error::Error>> {
    if !root.is_dir() {
        return Err(format!("No archive found at {:?}", root).into());
    }
    Ok(ArchiveDir::open(root)?)
}
