//! Karobar CLI
//!
//! Operator tools for a Karobar store directory and its remote.
//!
//! # Commands
//!
//! - `inspect` - Display store statistics and sync state
//! - `dump-queue` - List queued sync tasks
//! - `drain` - Send every pending task once
//! - `watch` - Run the background sync loop until interrupted
//! - `bootstrap` - Seed the store from the remote snapshot
//! - `requeue` - Return dead-lettered tasks to the queue
//! - `compact` - Rewrite the WAL to reclaim space

mod commands;

use clap::{Parser, Subcommand};
use commands::session::Remote;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Karobar store and sync tools.
#[derive(Parser)]
#[command(name = "karobar")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Base URL of the remote API
    #[arg(global = true, short, long)]
    server: Option<String>,

    /// Session token sent as a bearer token
    #[arg(global = true, short, long)]
    token: Option<String>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display store statistics and sync state
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List queued sync tasks, oldest first
    DumpQueue {
        /// Maximum number of tasks to list
        #[arg(short, long)]
        limit: Option<usize>,

        /// Only list dead-lettered tasks
        #[arg(long)]
        failed: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Send every pending task once
    Drain,

    /// Run the sync loop until Ctrl-C
    Watch {
        /// Milliseconds between drains
        #[arg(short, long, default_value = "2000")]
        interval: u64,
    },

    /// Seed the store from the remote snapshot
    Bootstrap {
        /// Pull even if the store was already seeded
        #[arg(short, long)]
        force: bool,
    },

    /// Return dead-lettered tasks to the pending state
    Requeue,

    /// Rewrite the WAL to reclaim space
    Compact {
        /// Dry run - show what would be done
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let remote = || -> Result<Remote, Box<dyn std::error::Error>> {
        Ok(Remote {
            url: cli.server.clone().ok_or("Server URL required (--server)")?,
            token: cli.token.clone(),
        })
    };

    match &cli.command {
        Commands::Inspect { format } => {
            let path = cli.path.as_ref().ok_or("Store path required for inspect")?;
            commands::inspect::run(path, format)?;
        }
        Commands::DumpQueue {
            limit,
            failed,
            format,
        } => {
            let path = cli.path.as_ref().ok_or("Store path required for dump-queue")?;
            commands::dump_queue::run(path, *limit, *failed, format)?;
        }
        Commands::Drain => {
            let path = cli.path.as_ref().ok_or("Store path required for drain")?;
            commands::drain::run(path, &remote()?).await?;
        }
        Commands::Watch { interval } => {
            let path = cli.path.as_ref().ok_or("Store path required for watch")?;
            commands::watch::run(path, &remote()?, Duration::from_millis(*interval)).await?;
        }
        Commands::Bootstrap { force } => {
            let path = cli.path.as_ref().ok_or("Store path required for bootstrap")?;
            commands::bootstrap::run(path, &remote()?, *force).await?;
        }
        Commands::Requeue => {
            let path = cli.path.as_ref().ok_or("Store path required for requeue")?;
            commands::requeue::run(path)?;
        }
        Commands::Compact { dry_run } => {
            let path = cli.path.as_ref().ok_or("Store path required for compact")?;
            commands::compact::run(path, *dry_run)?;
        }
        Commands::Version => {
            println!("Karobar CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
