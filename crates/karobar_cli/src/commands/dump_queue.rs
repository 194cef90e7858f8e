//! Dump-queue command implementation.

use super::session::open_store;
use karobar_core::SyncQueue;
use karobar_sync_protocol::{SyncTask, TaskStatus};
use std::path::Path;

/// Runs the dump-queue command.
pub fn run(
    path: &Path,
    limit: Option<usize>,
    failed_only: bool,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(path, false)?;
    let tasks = select(SyncQueue::new(store).list_all()?, limit, failed_only);

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&tasks)?),
        _ => {
            if tasks.is_empty() {
                println!("Queue is empty");
            }
            for task in &tasks {
                println!("{}", describe(task));
            }
        }
    }
    Ok(())
}

fn select(tasks: Vec<SyncTask>, limit: Option<usize>, failed_only: bool) -> Vec<SyncTask> {
    tasks
        .into_iter()
        .filter(|t| !failed_only || t.status == TaskStatus::Failed)
        .take(limit.unwrap_or(usize::MAX))
        .collect()
}

fn describe(task: &SyncTask) -> String {
    let seq = task
        .id
        .map(|id| id.to_string())
        .unwrap_or_else(|| "#?".to_string());
    let mut line = format!(
        "{seq:>6} {:<6} {:<40} {} entity={} attempts={}",
        task.method.method().as_str(),
        task.url,
        task.created_at.format("%Y-%m-%d %H:%M:%S"),
        task.entity_id,
        task.attempts,
    );
    if task.status == TaskStatus::Failed {
        line.push_str(" FAILED");
    }
    if let Some(err) = &task.last_error {
        line.push_str(&format!(" last_error={err:?}"));
    }
    line
}
