//! Bootstrap command implementation.

use super::session::{engine, open_store, Remote};
use std::path::Path;

/// Runs the bootstrap command.
pub async fn run(path: &Path, remote: &Remote, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(path, true)?;
    let engine = engine(store, remote, None)?;

    let report = if force {
        engine.bootstrap().await?
    } else {
        match engine.bootstrap_if_needed().await? {
            Some(report) => report,
            None => {
                println!("Store already seeded; use --force to pull again");
                return Ok(());
            }
        }
    };

    println!("Bootstrapped from {}", remote.url);
    println!(
        "  Business:  {}",
        if report.business { "stored" } else { "none" }
    );
    println!("  Products:  {}", report.products);
    println!("  Parties:   {}", report.parties);
    println!("  Units:     {}", report.units);
    println!("  Companies: {}", report.companies);
    if report.skipped > 0 {
        println!("  Kept local: {} (changes still queued)", report.skipped);
    }
    println!("  Last sync: {}", report.synced_at.to_rfc3339());
    Ok(())
}
