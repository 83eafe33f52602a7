//! NoteMirror CLI
//!
//! Command-line tool that mirrors a remote note store into a local archive.
//!
//! # Commands
//!
//! - `sync` - Fetch new metadata and content, then purge orphans
//! - `status` - Display the sync cursor and archive statistics
//! - `verify` - Check every cached file against its recorded digest
//! - `purge` - Delete cached files no longer backed by metadata

mod client;
mod commands;
mod config;

use clap::{Parser, Subcommand};
use config::{MirrorConfig, Overrides, Settings};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// NoteMirror one-way note store mirror.
#[derive(Parser)]
#[command(name = "notemirror")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a JSON config file
    #[arg(global = true, short, long)]
    config: Option<PathBuf>,

    /// Archive directory (overrides outFolder)
    #[arg(global = true, short, long)]
    out: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(global = true, short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch new metadata and content, then purge orphans
    Sync {
        /// Developer token
        #[arg(long, env = "NOTEMIRROR_TOKEN", hide_env_values = true)]
        token: Option<String>,

        /// Gateway base URL
        #[arg(long)]
        service_url: Option<String>,

        /// Use the development environment
        #[arg(long)]
        sandbox: bool,

        /// Entries per metadata chunk
        #[arg(long)]
        block_size: Option<u32>,

        /// Attempts before giving up on rate limits
        #[arg(long, default_value = "1")]
        max_attempts: u32,

        /// Re-check resources of notes already in sync
        #[arg(long)]
        verify_resources: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Display the sync cursor and archive statistics
    Status {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Check every cached file against its recorded digest
    Verify,

    /// Delete cached files no longer backed by metadata
    Purge {
        /// Dry run - show what would be done
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let file = MirrorConfig::load_optional(cli.config.as_deref())?;

    // Initialize logging
    let level = if cli.verbose || file.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Sync {
            token,
            service_url,
            sandbox,
            block_size,
            max_attempts,
            verify_resources,
            format,
        } => {
            let settings = Settings::resolve(
                &file,
                Overrides {
                    out: cli.out,
                    token,
                    service_url,
                    sandbox,
                    block_size,
                },
            )?;
            commands::sync::run(&settings, max_attempts, verify_resources, &format)?;
        }
        Commands::Status { format } => {
            let path = archive_root(cli.out, &file)?;
            commands::status::run(&path, &format)?;
        }
        Commands::Verify => {
            let path = archive_root(cli.out, &file)?;
            commands::verify::run(&path)?;
        }
        Commands::Purge { dry_run } => {
            let path = archive_root(cli.out, &file)?;
            commands::purge::run(&path, dry_run)?;
        }
        Commands::Version => {
            println!("NoteMirror CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

fn archive_root(out: Option<PathBuf>, file: &MirrorConfig) -> Result<PathBuf, config::ConfigError> {
    Settings::resolve(
        file,
        Overrides {
            out,
            ..Overrides::default()
        },
    )
    .map(|s| s.out)
}
