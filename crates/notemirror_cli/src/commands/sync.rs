//! Sync command implementation.

use crate::client::ReqwestClient;
use crate::config::Settings;
use notemirror_sync::{
    ApplyStats, ArchiveLock, HttpRemoteStore, MetadataOutcome, PartialSync, RemoteStore, SyncConfig,
    SyncEngine, SyncError, SyncReport,
};
use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Summary of a sync run, rate-limited attempts included.
#[derive(Debug, Serialize)]
pub struct SyncSummary {
    /// Archive root.
    pub path: String,
    /// Attempts made, rate-limited ones included.
    pub attempts: u32,
    /// True if the remote had nothing new.
    pub no_new_data: bool,
    /// Chunks fetched.
    pub chunks: u64,
    /// True if a full resync was performed.
    pub full_resync: bool,
    /// Notes inserted or changed in metadata.
    pub notes_upserted: usize,
    /// Notes removed from metadata.
    pub notes_removed: usize,
    /// Note files written.
    pub notes_fetched: u64,
    /// Resource files written.
    pub files_fetched: u64,
    /// Cache files deleted.
    pub purged: usize,
    /// Wall time in milliseconds.
    pub duration_ms: u128,
}

impl SyncSummary {
    fn new(path: &Path, attempts: u32, earlier: &PartialSync, report: &SyncReport) -> Self {
        let metadata = earlier
            .metadata
            .map_or(report.metadata, |m| m.merge(report.metadata));
        let mut content = earlier.content;
        content.absorb(&report.content);

        let (chunks, full_resync, applied) = match metadata {
            MetadataOutcome::UpToDate => (0, false, ApplyStats::default()),
            MetadataOutcome::Fetched {
                chunks,
                full_resync,
                applied,
            } => (chunks, full_resync, applied),
        };
        Self {
            path: path.display().to_string(),
            attempts,
            no_new_data: earlier.is_empty() && report.no_new_data(),
            chunks,
            full_resync,
            notes_upserted: applied.notes_upserted,
            notes_removed: applied.notes_removed,
            notes_fetched: content.notes_created + content.notes_updated,
            files_fetched: content.files_created + content.files_updated,
            purged: report.purge.total(),
            duration_ms: report.duration.as_millis(),
        }
    }
}

/// Runs the sync command.
pub fn run(
    settings: &Settings,
    max_attempts: u32,
    verify_resources: bool,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = ReqwestClient::new(REQUEST_TIMEOUT)?;
    let remote = HttpRemoteStore::new(
        settings.require_service_url()?,
        settings.require_token()?,
        client,
    );
    let config = SyncConfig::new()
        .with_block_size(settings.block_size)
        .with_verify_resources(verify_resources);

    let summary = sync_archive(&settings.out, config, remote, max_attempts, std::thread::sleep)?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&summary)?),
        _ => print_text_output(&summary),
    }
    Ok(())
}

/// Syncs an archive, retrying rate-limited attempts up to `max_attempts`.
///
/// The archive lock is held for the whole run, waits included.
pub fn sync_archive<R, S>(
    root: &Path,
    config: SyncConfig,
    remote: R,
    max_attempts: u32,
    mut sleep: S,
) -> Result<SyncSummary, SyncError>
where
    R: RemoteStore,
    S: FnMut(Duration),
{
    std::fs::create_dir_all(root).map_err(|e| SyncError::filesystem(root, e))?;
    let _lock = ArchiveLock::acquire(root)?;
    let mut engine = SyncEngine::open(root, config, remote)?;
    let max_attempts = max_attempts.max(1);

    let mut attempt = 0;
    let mut earlier = PartialSync::default();
    loop {
        attempt += 1;
        match engine.sync() {
            Ok(report) => return Ok(SyncSummary::new(root, attempt, &earlier, &report)),
            Err(e) => match e.retry_after() {
                Some(delay) if attempt < max_attempts => {
                    if let Some(progress) = engine.interrupted() {
                        earlier.absorb(progress);
                    }
                    warn!(
                        attempt,
                        max_attempts,
                        "rate limited, waiting {}s before retrying",
                        delay.as_secs()
                    );
                    sleep(delay);
                }
                _ => return Err(e),
            },
        }
    }
}

fn print_text_output(summary: &SyncSummary) {
    if summary.no_new_data {
        println!("No new data");
        return;
    }

    println!("Synced {}", summary.path);
    println!();
    if summary.full_resync {
        println!("  Full resync performed");
    }
    println!("  Chunks fetched:  {}", summary.chunks);
    println!("  Notes changed:   {}", summary.notes_upserted);
    println!("  Notes removed:   {}", summary.notes_removed);
    println!("  Notes fetched:   {}", summary.notes_fetched);
    println!("  Files fetched:   {}", summary.files_fetched);
    println!("  Files purged:    {}", summary.purged);
    println!("  Attempts:        {}", summary.attempts);
    println!("  Duration:        {} ms", summary.duration_ms);
}
