//! Configuration for the sync engine.

use notemirror_protocol::SyncChunkFilter;

/// Default number of entries requested per sync chunk.
pub const DEFAULT_BLOCK_SIZE: u32 = 100;

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Maximum number of entries per chunk request.
    pub block_size: u32,
    /// Entity kinds requested in each chunk.
    pub chunk_filter: SyncChunkFilter,
    /// Re-hash resources of notes already marked in sync. Missing files are
    /// fetched either way.
    pub verify_resources: bool,
    /// Run the purge pass after materialization.
    pub purge: bool,
}

impl SyncConfig {
    /// Creates a configuration with default settings.
    pub fn new() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            chunk_filter: SyncChunkFilter::metadata_only(),
            verify_resources: false,
            purge: true,
        }
    }

    /// Sets the chunk block size. Zero is raised to one.
    pub fn with_block_size(mut self, size: u32) -> Self {
        self.block_size = size.max(1);
        self
    }

    /// Re-validates every referenced resource on each sync.
    pub fn with_verify_resources(mut self, verify: bool) -> Self {
        self.verify_resources = verify;
        self
    }

    /// Enables or disables the purge pass.
    pub fn with_purge(mut self, purge: bool) -> Self {
        self.purge = purge;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}
