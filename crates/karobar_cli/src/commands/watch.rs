//! Watch command implementation.

use super::session::{engine, open_store, Remote};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Runs the sync loop until Ctrl-C.
///
/// Seeds an empty store first, as the app does on first launch.
pub async fn run(
    path: &Path,
    remote: &Remote,
    interval: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(path, true)?;
    let engine = Arc::new(engine(store, remote, Some(interval))?);

    match engine.bootstrap_if_needed().await {
        Ok(Some(report)) => {
            tracing::info!(entities = report.entity_count(), "store seeded");
        }
        Ok(None) => {}
        // The loop still drains local work without a snapshot.
        Err(e) => tracing::warn!(error = %e, "bootstrap failed"),
    }

    println!(
        "Syncing with {} every {:?}; Ctrl-C to stop",
        remote.url, interval
    );
    let handle = Arc::clone(&engine).spawn();
    tokio::signal::ctrl_c().await?;
    handle.shutdown().await?;

    let stats = engine.stats();
    let depth = engine.depth()?;
    println!();
    println!("Drains:        {}", stats.drains_completed);
    println!("Confirmed:     {}", stats.tasks_confirmed);
    println!("Transient:     {}", stats.transient_failures);
    println!("Rejections:    {}", stats.rejections);
    println!("Dead-lettered: {}", stats.dead_lettered);
    println!("Queue:         {} pending, {} failed", depth.pending, depth.failed);
    Ok(())
}
