//! Drain command implementation.

use super::session::{engine, open_store, Remote};
use std::path::Path;

/// Runs the drain command.
pub async fn run(path: &Path, remote: &Remote) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(path, false)?;
    let engine = engine(store, remote, None)?;

    let before = engine.depth()?;
    if before.pending == 0 {
        println!("Nothing to send ({} dead-lettered)", before.failed);
        return Ok(());
    }

    println!("Draining {} task(s) to {}", before.pending, remote.url);
    let report = engine.drain().await?;
    let after = engine.depth()?;

    println!();
    println!("  Attempted:     {}", report.attempted);
    println!("  Confirmed:     {}", report.confirmed);
    println!("  Transient:     {}", report.transient);
    println!("  Rejected:      {}", report.rejected);
    println!("  Dead-lettered: {}", report.dead_lettered);
    println!("  Deferred:      {}", report.deferred);
    println!("  Took:          {:?}", report.duration);
    println!();
    if report.is_clean() {
        println!("✓ Queue drained");
    } else {
        println!(
            "{} task(s) still pending, {} dead-lettered",
            after.pending, after.failed
        );
    }
    Ok(())
}
