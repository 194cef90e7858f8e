//! Inspect command implementation.

use super::session::open_store;
use karobar_core::{meta, models, LocalStore, SyncQueue, BUSINESS};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// Store inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Store path.
    pub path: String,
    /// WAL file size in bytes.
    pub wal_size: u64,
    /// Trading name of the seeded business, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business: Option<String>,
    /// Last successful bootstrap (RFC 3339).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<String>,
    /// Tasks waiting to be sent.
    pub pending_tasks: usize,
    /// Dead-lettered tasks.
    pub failed_tasks: usize,
    /// Per-collection document counts.
    pub collections: Vec<CollectionStats>,
}

/// Statistics for a single collection.
#[derive(Debug, Serialize)]
pub struct CollectionStats {
    /// Collection name.
    pub name: String,
    /// Number of documents.
    pub count: usize,
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(path, false)?;
    let result = inspect(&store, path)?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => print_text_output(&result),
    }
    Ok(())
}

fn inspect(store: &Arc<LocalStore>, path: &Path) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let mut collections = Vec::new();
    for def in store.config().schema.iter() {
        collections.push(CollectionStats {
            name: def.name.clone(),
            count: store.count(&def.name)?,
        });
    }

    let business = match store.get(BUSINESS, models::CURRENT_BUSINESS)? {
        Some(doc) => models::from_document::<models::Business>(doc)?.business_name,
        None => None,
    };
    let depth = SyncQueue::new(Arc::clone(store)).depth()?;

    Ok(InspectResult {
        path: path.display().to_string(),
        wal_size: store.wal_size()?,
        business,
        last_sync: meta::last_sync(store)?.map(|t| t.to_rfc3339()),
        pending_tasks: depth.pending,
        failed_tasks: depth.failed,
        collections,
    })
}

fn print_text_output(result: &InspectResult) {
    println!("Karobar Store Inspection");
    println!("========================");
    println!();
    println!("Path:      {}", result.path);
    println!("WAL size:  {}", format_size(result.wal_size));
    println!(
        "Business:  {}",
        result.business.as_deref().unwrap_or("(not bootstrapped)")
    );
    println!(
        "Last sync: {}",
        result.last_sync.as_deref().unwrap_or("never")
    );
    println!();
    println!("Sync queue:");
    println!("  Pending: {}", result.pending_tasks);
    println!("  Failed:  {}", result.failed_tasks);
    println!();
    println!("Collections:");
    for col in &result.collections {
        println!("  {:<12} {}", col.name, col.count);
    }
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} bytes", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use karobar_core::{Parties, Repository, PARTIES};
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn counts_collections_and_queue() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path(), true).unwrap();
        let parties = Repository::<Parties>::open(Arc::clone(&store)).unwrap();
        let mut data = serde_json::Map::new();
        data.insert("name".into(), json!("Ali Store"));
        parties.create(data).unwrap();

        let result = inspect(&store, dir.path()).unwrap();
        let party_count = result
            .collections
            .iter()
            .find(|c| c.name == PARTIES)
            .map(|c| c.count);
        assert_eq!(party_count, Some(1));
        assert_eq!(result.pending_tasks, 1);
        assert!(result.business.is_none());
        assert!(result.last_sync.is_none());
    }

    #[test]
    fn format_size_units() {
        assert_eq!(format_size(512), "512 bytes");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MB");
    }
}
