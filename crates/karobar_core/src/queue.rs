//! The durable sync queue.
//!
//! Tasks live in the `pendingSync` collection under auto-increment keys,
//! so key order is replication order. A task is only ever added inside
//! the same transaction as the entity mutation it replays.

use crate::error::{CoreError, CoreResult};
use crate::store::{LocalStore, Transaction};
use crate::types::{Key, PENDING_SYNC};
use karobar_sync_protocol::{SequenceId, SyncTask, TaskStatus};
use std::sync::Arc;

/// How many tasks are waiting and how many are dead-lettered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueDepth {
    /// Tasks the drain will attempt.
    pub pending: usize,
    /// Tasks parked after repeated rejections.
    pub failed: usize,
}

impl QueueDepth {
    /// All queued tasks.
    #[must_use]
    pub fn total(&self) -> usize {
        self.pending + self.failed
    }
}

/// Handle to the queue inside a [`LocalStore`].
#[derive(Debug, Clone)]
pub struct SyncQueue {
    store: Arc<LocalStore>,
}

impl SyncQueue {
    /// Wraps a store.
    #[must_use]
    pub fn new(store: Arc<LocalStore>) -> Self {
        Self { store }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    /// Appends `task` within `txn` and returns its sequence id.
    ///
    /// `txn` must include `pendingSync` in its scope.
    pub fn enqueue(txn: &mut Transaction<'_>, mut task: SyncTask) -> CoreResult<SequenceId> {
        task.id = None;
        let key = txn.add(PENDING_SYNC, task.to_document()?)?;
        match key {
            Key::Int(n) => Ok(SequenceId(n)),
            Key::Text(_) => Err(CoreError::invalid_operation(
                "pendingSync handed out a non-integer key",
            )),
        }
    }

    /// Every task, oldest first.
    pub fn list_all(&self) -> CoreResult<Vec<SyncTask>> {
        self.store
            .get_all(PENDING_SYNC)?
            .into_iter()
            .map(|doc| SyncTask::from_document(doc).map_err(CoreError::from))
            .collect()
    }

    /// Tasks the drain should attempt, oldest first.
    pub fn list_pending(&self) -> CoreResult<Vec<SyncTask>> {
        Ok(self
            .list_all()?
            .into_iter()
            .filter(SyncTask::is_pending)
            .collect())
    }

    /// Looks up one task.
    pub fn get(&self, id: SequenceId) -> CoreResult<Option<SyncTask>> {
        self.store
            .get(PENDING_SYNC, id)?
            .map(|doc| SyncTask::from_document(doc).map_err(CoreError::from))
            .transpose()
    }

    /// Drops a task after the remote confirmed it.
    pub fn remove(&self, id: SequenceId) -> CoreResult<()> {
        self.store.delete(PENDING_SYNC, id)
    }

    /// Counts a remote rejection against a task.
    ///
    /// Once `attempts` reaches `max_rejections` the task is marked
    /// [`TaskStatus::Failed`]. `None` never dead-letters. Returns the
    /// updated task, or `None` if it is no longer queued.
    pub fn record_rejection(
        &self,
        id: SequenceId,
        reason: &str,
        max_rejections: Option<u32>,
    ) -> CoreResult<Option<SyncTask>> {
        self.store.transact(&[PENDING_SYNC], |txn| {
            let Some(doc) = txn.get(PENDING_SYNC, id)? else {
                return Ok(None);
            };
            let mut task = SyncTask::from_document(doc)?;
            task.attempts = task.attempts.saturating_add(1);
            task.last_error = Some(reason.to_string());
            if max_rejections.is_some_and(|max| task.attempts >= max) {
                task.status = TaskStatus::Failed;
            }
            txn.put(PENDING_SYNC, task.to_document()?)?;
            Ok(Some(task))
        })
    }

    /// Moves every failed task back to pending with a fresh attempt count.
    pub fn requeue_failed(&self) -> CoreResult<usize> {
        self.store.transact(&[PENDING_SYNC], |txn| {
            let mut moved = 0;
            for doc in txn.get_all(PENDING_SYNC)? {
                let mut task = SyncTask::from_document(doc)?;
                if task.status != TaskStatus::Failed {
                    continue;
                }
                task.status = TaskStatus::Pending;
                task.attempts = 0;
                txn.put(PENDING_SYNC, task.to_document()?)?;
                moved += 1;
            }
            Ok(moved)
        })
    }

    /// Pending and failed counts.
    pub fn depth(&self) -> CoreResult<QueueDepth> {
        let mut depth = QueueDepth::default();
        for task in self.list_all()? {
            match task.status {
                TaskStatus::Pending => depth.pending += 1,
                TaskStatus::Failed => depth.failed += 1,
            }
        }
        Ok(depth)
    }
}
