//! Requeue command implementation.

use super::session::open_store;
use karobar_core::SyncQueue;
use std::path::Path;

/// Returns dead-lettered tasks to the pending state.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let queue = SyncQueue::new(open_store(path, false)?);
    let count = queue.requeue_failed()?;
    if count == 0 {
        println!("No dead-lettered tasks");
    } else {
        println!("✓ Requeued {count} task(s)");
    }
    Ok(())
}
