//! Compact command implementation.

use super::session::open_store;
use karobar_core::PENDING_SYNC;
use std::path::Path;

/// Runs the compact command.
pub fn run(path: &Path, dry_run: bool) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(path, false)?;
    let before = store.wal_size()?;

    println!("Compacting WAL at {}", path.display());
    if dry_run {
        println!("(dry run - no changes will be made)");
    }
    println!();
    println!("  Size before:  {} bytes", before);
    println!("  Queued tasks: {} (kept)", store.count(PENDING_SYNC)?);

    if dry_run {
        return Ok(());
    }

    store.compact()?;
    let after = store.wal_size()?;
    println!("  Size after:   {} bytes", after);
    println!(
        "  Space saved:  {} bytes ({:.1}%)",
        before.saturating_sub(after),
        if before > 0 {
            (before.saturating_sub(after) as f64 / before as f64) * 100.0
        } else {
            0.0
        }
    );
    println!();
    println!("✓ Compaction complete");
    Ok(())
}
