//! Sync engine state machine.

use crate::bootstrap::{BootstrapReport, BootstrapSync};
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::remote::RemoteApi;
use chrono::{DateTime, Utc};
use karobar_core::{LocalStore, QueueDepth, SyncQueue};
use karobar_sync_protocol::{classify, endpoints, Delivery, SyncTask};
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// The current state of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No drain in flight.
    Idle,
    /// A drain is sending tasks.
    Draining,
}

impl SyncState {
    /// Returns true while a drain is in flight.
    pub fn is_active(&self) -> bool {
        matches!(self, SyncState::Draining)
    }
}

/// Why a tick did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another drain was still in flight.
    AlreadyDraining,
    /// The remote reported the device offline.
    Offline,
}

/// Per-task outcomes of one drain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Tasks sent to the remote.
    pub attempted: usize,
    /// Tasks the remote confirmed (applied, already applied, already gone).
    pub confirmed: usize,
    /// Tasks kept after a transport failure, timeout or retryable status.
    pub transient: usize,
    /// Tasks kept after a permanent rejection.
    pub rejected: usize,
    /// Rejected tasks that reached the dead-letter threshold this drain.
    pub dead_lettered: usize,
    /// Tasks held back behind an earlier task for the same entity.
    pub deferred: usize,
    /// The remote refused the session; the drain stopped there.
    pub unauthorized: bool,
    /// Wall time of the drain.
    pub duration: Duration,
}

impl DrainReport {
    /// Whether every pending task was confirmed.
    pub fn is_clean(&self) -> bool {
        self.confirmed == self.attempted && self.deferred == 0 && !self.unauthorized
    }
}

/// Result of one timer tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// The tick did not drain.
    Skipped(SkipReason),
    /// The tick ran a drain.
    Drained(DrainReport),
}

/// Statistics about sync operations.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Drains run to completion.
    pub drains_completed: u64,
    /// Ticks skipped while offline or draining.
    pub ticks_skipped: u64,
    /// Tasks removed after confirmation.
    pub tasks_confirmed: u64,
    /// Transient delivery failures.
    pub transient_failures: u64,
    /// Permanent rejections.
    pub rejections: u64,
    /// Tasks moved to the dead-letter state.
    pub dead_lettered: u64,
    /// End of the last completed drain.
    pub last_drain_at: Option<DateTime<Utc>>,
    /// Last drain-level error.
    pub last_error: Option<String>,
}

/// Resets the engine to [`SyncState::Idle`] however the drain ends.
struct DrainGuard<'a> {
    state: &'a Mutex<SyncState>,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        *self.state.lock() = SyncState::Idle;
    }
}

/// Drains the durable sync queue to the Remote API.
///
/// One engine instance owns the `Idle`/`Draining` flag; run a single
/// engine per store.
pub struct SyncEngine<R: RemoteApi> {
    config: SyncConfig,
    queue: SyncQueue,
    remote: Arc<R>,
    state: Mutex<SyncState>,
    stats: RwLock<SyncStats>,
}

impl<R: RemoteApi> SyncEngine<R> {
    /// Creates a new sync engine.
    pub fn new(config: SyncConfig, store: Arc<LocalStore>, remote: Arc<R>) -> Self {
        Self {
            config,
            queue: SyncQueue::new(store),
            remote,
            state: Mutex::new(SyncState::Idle),
            stats: RwLock::new(SyncStats::default()),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the remote.
    pub fn remote(&self) -> &Arc<R> {
        &self.remote
    }

    /// Returns the queue being drained.
    pub fn queue(&self) -> &SyncQueue {
        &self.queue
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        *self.state.lock()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Pending and dead-lettered task counts.
    pub fn depth(&self) -> SyncResult<QueueDepth> {
        Ok(self.queue.depth()?)
    }

    /// Number of tasks a drain would attempt.
    pub fn pending_count(&self) -> SyncResult<usize> {
        Ok(self.depth()?.pending)
    }

    /// Moves dead-lettered tasks back to pending.
    pub fn requeue_failed(&self) -> SyncResult<usize> {
        let moved = self.queue.requeue_failed()?;
        if moved > 0 {
            tracing::info!(moved, "requeued failed tasks");
        }
        Ok(moved)
    }

    /// A bootstrapper for this engine's store and snapshot path.
    pub fn bootstrapper(&self) -> BootstrapSync {
        BootstrapSync::new(Arc::clone(self.queue.store()), self.config.snapshot_path.clone())
    }

    /// Seeds the store from the remote snapshot.
    pub async fn bootstrap(&self) -> SyncResult<BootstrapReport> {
        self.bootstrapper().run(self.remote.as_ref()).await
    }

    /// Seeds the store unless it has been seeded before.
    pub async fn bootstrap_if_needed(&self) -> SyncResult<Option<BootstrapReport>> {
        self.bootstrapper().run_if_needed(self.remote.as_ref()).await
    }

    /// Runs one timer tick.
    ///
    /// Skips when offline or when a drain is already in flight; otherwise
    /// drains. Per-task failures are reflected in the report and the
    /// queue, not in the result; `Err` means the local store failed.
    pub async fn tick(&self) -> SyncResult<TickOutcome> {
        if !self.remote.is_online() {
            self.stats.write().ticks_skipped += 1;
            tracing::debug!("offline, skipping tick");
            return Ok(TickOutcome::Skipped(SkipReason::Offline));
        }
        let Some(_guard) = self.begin_drain() else {
            self.stats.write().ticks_skipped += 1;
            tracing::debug!("drain in flight, skipping tick");
            return Ok(TickOutcome::Skipped(SkipReason::AlreadyDraining));
        };
        let report = self.finish(self.run_drain().await)?;
        Ok(TickOutcome::Drained(report))
    }

    /// Drains now, failing instead of skipping.
    pub async fn drain(&self) -> SyncResult<DrainReport> {
        if !self.remote.is_online() {
            return Err(SyncError::NotConnected);
        }
        let Some(_guard) = self.begin_drain() else {
            return Err(SyncError::InvalidStateTransition {
                from: "Draining".into(),
                to: "Draining".into(),
            });
        };
        self.finish(self.run_drain().await)
    }

    fn begin_drain(&self) -> Option<DrainGuard<'_>> {
        let mut state = self.state.lock();
        if state.is_active() {
            return None;
        }
        *state = SyncState::Draining;
        Some(DrainGuard { state: &self.state })
    }

    fn finish(&self, result: SyncResult<DrainReport>) -> SyncResult<DrainReport> {
        let mut stats = self.stats.write();
        match &result {
            Ok(report) => {
                stats.drains_completed += 1;
                stats.tasks_confirmed += report.confirmed as u64;
                stats.transient_failures += report.transient as u64;
                stats.rejections += report.rejected as u64;
                stats.dead_lettered += report.dead_lettered as u64;
                stats.last_drain_at = Some(Utc::now());
                stats.last_error = None;
            }
            Err(e) => {
                tracing::error!(error = %e, "drain aborted");
                stats.last_error = Some(e.to_string());
            }
        }
        result
    }

    /// Sends every pending task, oldest first.
    async fn run_drain(&self) -> SyncResult<DrainReport> {
        let started = Instant::now();
        let tasks = self.queue.list_all()?;
        let mut report = DrainReport::default();
        // Entities with a task still queued; their later tasks must wait.
        let mut held: HashSet<(String, String)> = HashSet::new();

        for task in tasks {
            let entity = entity_key(&task);
            if !task.is_pending() {
                held.insert(entity);
                continue;
            }
            let seq = task.sequence_id()?;
            if held.contains(&entity) {
                report.deferred += 1;
                tracing::debug!(sequence_id = %seq, entity_id = %task.entity_id, "deferred behind earlier task");
                continue;
            }

            report.attempted += 1;
            let request = task.to_request();
            let response = match self.remote.send(&request).await {
                Ok(response) => response,
                Err(e) => {
                    report.transient += 1;
                    held.insert(entity);
                    tracing::warn!(sequence_id = %seq, method = %request.method, url = %task.url, error = %e, "delivery failed, keeping task");
                    continue;
                }
            };

            let delivery = classify(task.method, response.status);
            if delivery.is_success() {
                self.queue.remove(seq)?;
                report.confirmed += 1;
                tracing::debug!(sequence_id = %seq, method = %request.method, url = %task.url, status = response.status, ?delivery, "task confirmed");
                continue;
            }
            if delivery == Delivery::Unauthorized {
                // Every later task would be refused the same way.
                report.transient += 1;
                report.unauthorized = true;
                tracing::warn!(sequence_id = %seq, method = %request.method, url = %task.url, status = response.status, "session refused, stopping drain");
                break;
            }

            held.insert(entity);
            if !delivery.counts_as_rejection() {
                report.transient += 1;
                tracing::warn!(sequence_id = %seq, method = %request.method, url = %task.url, status = response.status, "remote unavailable, keeping task");
                continue;
            }

            report.rejected += 1;
            let reason = format!(
                "{} {}",
                response.status,
                response.message().unwrap_or("rejected")
            );
            let updated = self
                .queue
                .record_rejection(seq, &reason, self.config.max_rejections)?;
            match updated {
                Some(t) if !t.is_pending() => {
                    report.dead_lettered += 1;
                    tracing::warn!(sequence_id = %seq, method = %request.method, url = %task.url, status = response.status, attempts = t.attempts, reason, "task dead-lettered");
                }
                _ => {
                    tracing::warn!(sequence_id = %seq, method = %request.method, url = %task.url, status = response.status, reason, "remote rejected task");
                }
            }
        }

        report.duration = started.elapsed();
        if report.attempted > 0 {
            tracing::info!(
                attempted = report.attempted,
                confirmed = report.confirmed,
                transient = report.transient,
                rejected = report.rejected,
                deferred = report.deferred,
                "drain finished"
            );
        }
        Ok(report)
    }
}

impl<R: RemoteApi + 'static> SyncEngine<R> {
    /// Starts the drain timer on the current tokio runtime.
    ///
    /// Ticks every `poll_interval`; ticks missed while a drain runs are
    /// skipped rather than bunched up. The loop stops when the handle is
    /// shut down or dropped, after any drain in flight completes.
    pub fn spawn(self: Arc<Self>) -> SyncHandle {
        let (shutdown, mut stop) = watch::channel(false);
        let period = self.config.poll_interval.max(Duration::from_millis(1));
        let engine = self;

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            tracing::debug!(?period, "sync loop started");
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = engine.tick().await {
                            tracing::warn!(error = %e, "tick failed");
                        }
                    }
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!("sync loop stopped");
        });

        SyncHandle { shutdown, task }
    }
}

/// Handle to a running drain timer.
pub struct SyncHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SyncHandle {
    /// Stops the timer and waits for the loop to exit.
    pub async fn shutdown(self) -> SyncResult<()> {
        // Fails only if the loop already exited.
        let _ = self.shutdown.send(true);
        self.task.await.map_err(|_| SyncError::Cancelled)
    }

    /// Whether the loop has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Endpoint and entity id; tasks for the same entity share a key.
fn entity_key(task: &SyncTask) -> (String, String) {
    let (path, _) = endpoints::split_target(&task.url);
    (path.to_string(), task.entity_id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{MockRemote, MockReply};
    use karobar_core::{Document, Parties, Products, Repository, Units};
    use karobar_sync_protocol::{Method, TaskStatus};
    use serde_json::{json, Value};

    fn doc(v: Value) -> Document {
        match v {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    fn engine(max_rejections: Option<u32>) -> (Arc<LocalStore>, SyncEngine<MockRemote>) {
        let store = Arc::new(LocalStore::open_in_memory().unwrap());
        let config = SyncConfig::new("http://test").with_max_rejections(max_rejections);
        let engine = SyncEngine::new(config, Arc::clone(&store), Arc::new(MockRemote::new()));
        (store, engine)
    }

    fn drained(outcome: TickOutcome) -> DrainReport {
        match outcome {
            TickOutcome::Drained(report) => report,
            other => panic!("expected a drain, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn drains_oldest_first_and_empties_queue() {
        let (store, engine) = engine(Some(10));
        let parties = Repository::<Parties>::open(Arc::clone(&store)).unwrap();
        let p = parties.create(doc(json!({"name": "Ali Store"}))).unwrap();
        let id = p["_id"].as_str().unwrap();
        parties.update(id, doc(json!({"balance": 50}))).unwrap();
        parties.delete(id).unwrap();

        let report = drained(engine.tick().await.unwrap());
        assert_eq!(report.attempted, 3);
        assert!(report.is_clean());
        assert_eq!(engine.pending_count().unwrap(), 0);

        let methods: Vec<_> = engine.remote().calls().iter().map(|c| c.method).collect();
        assert_eq!(methods, vec![Method::Post, Method::Put, Method::Delete]);
        assert_eq!(engine.state(), SyncState::Idle);
        assert_eq!(engine.stats().tasks_confirmed, 3);
    }

    #[tokio::test]
    async fn idempotent_outcomes_remove_tasks() {
        let (store, engine) = engine(Some(10));
        let units = Repository::<Units>::open(Arc::clone(&store)).unwrap();
        units.create(doc(json!({"name": "Kg"}))).unwrap();
        units.delete("never-synced").unwrap();
        engine.remote().push_statuses([409, 404]);

        let report = drained(engine.tick().await.unwrap());
        assert_eq!(report.confirmed, 2);
        assert_eq!(engine.depth().unwrap().total(), 0);
    }

    #[tokio::test]
    async fn transient_failures_keep_task_without_counting() {
        let (store, engine) = engine(Some(1));
        let parties = Repository::<Parties>::open(Arc::clone(&store)).unwrap();
        parties.create(doc(json!({"name": "Ali"}))).unwrap();
        engine.remote().push_statuses([503]);
        engine.remote().push_reply(MockReply::Fail("connection reset".into()));

        for _ in 0..2 {
            let report = drained(engine.tick().await.unwrap());
            assert_eq!(report.transient, 1);
        }
        let task = &engine.queue().list_all().unwrap()[0];
        assert_eq!(task.attempts, 0);
        assert!(task.is_pending());

        drained(engine.tick().await.unwrap());
        assert_eq!(engine.pending_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn rejections_dead_letter_at_limit() {
        let (store, engine) = engine(Some(2));
        let products = Repository::<Products>::open(Arc::clone(&store)).unwrap();
        products.create(doc(json!({"name": "Rice"}))).unwrap();
        engine.remote().push_statuses([400, 400]);

        let first = drained(engine.tick().await.unwrap());
        assert_eq!((first.rejected, first.dead_lettered), (1, 0));
        let second = drained(engine.tick().await.unwrap());
        assert_eq!((second.rejected, second.dead_lettered), (1, 1));

        let task = &engine.queue().list_all().unwrap()[0];
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.last_error.as_deref(), Some("400 mock status 400"));

        // Dead-lettered tasks are skipped.
        let third = drained(engine.tick().await.unwrap());
        assert_eq!(third.attempted, 0);
        assert_eq!(engine.remote().call_count(), 2);

        assert_eq!(engine.requeue_failed().unwrap(), 1);
        drained(engine.tick().await.unwrap());
        assert_eq!(engine.depth().unwrap().total(), 0);
    }

    #[tokio::test]
    async fn refused_session_stops_drain_without_counting() {
        let (store, engine) = engine(Some(1));
        let parties = Repository::<Parties>::open(Arc::clone(&store)).unwrap();
        for name in ["Ali", "Bilal", "Chaudhry"] {
            parties.create(doc(json!({"name": name}))).unwrap();
        }
        engine.remote().push_statuses([401, 403]);

        for _ in 0..2 {
            let report = drained(engine.tick().await.unwrap());
            assert!(report.unauthorized);
            assert_eq!((report.attempted, report.transient), (1, 1));
            assert_eq!((report.rejected, report.dead_lettered), (0, 0));
            assert!(!report.is_clean());
        }
        assert_eq!(engine.remote().call_count(), 2);
        let depth = engine.depth().unwrap();
        assert_eq!((depth.pending, depth.failed), (3, 0));
        assert!(engine.queue().list_all().unwrap().iter().all(|t| t.attempts == 0));

        let report = drained(engine.tick().await.unwrap());
        assert!(report.is_clean());
        assert_eq!(report.confirmed, 3);
    }

    #[tokio::test]
    async fn later_tasks_for_a_held_entity_wait() {
        let (store, engine) = engine(Some(10));
        let parties = Repository::<Parties>::open(Arc::clone(&store)).unwrap();
        let a = parties.create(doc(json!({"name": "A"}))).unwrap();
        let a_id = a["_id"].as_str().unwrap().to_string();
        parties.create(doc(json!({"name": "B"}))).unwrap();
        parties.update(&a_id, doc(json!({"name": "A2"}))).unwrap();

        // A's create fails; B's create goes; A's update waits.
        engine.remote().push_reply(MockReply::Fail("timeout".into()));
        let report = drained(engine.tick().await.unwrap());
        assert_eq!(report.attempted, 2);
        assert_eq!(report.confirmed, 1);
        assert_eq!(report.deferred, 1);
        assert_eq!(engine.remote().call_count(), 2);

        let report = drained(engine.tick().await.unwrap());
        assert!(report.is_clean());
        let calls = engine.remote().calls();
        assert_eq!(calls[2].method, Method::Post);
        assert_eq!(calls[3].method, Method::Put);
        assert_eq!(calls[3].body.as_ref().unwrap()["name"], "A2");
    }

    #[tokio::test]
    async fn dead_lettered_task_holds_its_entity() {
        let (store, engine) = engine(Some(1));
        let parties = Repository::<Parties>::open(Arc::clone(&store)).unwrap();
        let a = parties.create(doc(json!({"name": "A"}))).unwrap();
        let a_id = a["_id"].as_str().unwrap().to_string();
        engine.remote().push_statuses([422]);
        drained(engine.tick().await.unwrap());

        parties.update(&a_id, doc(json!({"name": "A2"}))).unwrap();
        let report = drained(engine.tick().await.unwrap());
        assert_eq!(report.attempted, 0);
        assert_eq!(report.deferred, 1);
        assert_eq!(engine.depth().unwrap(), QueueDepth { pending: 1, failed: 1 });
    }

    #[tokio::test]
    async fn offline_tick_is_skipped() {
        let (store, engine) = engine(Some(10));
        Repository::<Parties>::open(Arc::clone(&store))
            .unwrap()
            .create(doc(json!({"name": "Ali"})))
            .unwrap();
        engine.remote().set_online(false);

        let outcome = engine.tick().await.unwrap();
        assert_eq!(outcome, TickOutcome::Skipped(SkipReason::Offline));
        assert!(matches!(engine.drain().await, Err(SyncError::NotConnected)));
        assert_eq!(engine.pending_count().unwrap(), 1);
        assert_eq!(engine.stats().ticks_skipped, 1);
    }

    #[tokio::test]
    async fn overlapping_ticks_do_not_double_send() {
        let (store, engine) = engine(Some(10));
        let parties = Repository::<Parties>::open(Arc::clone(&store)).unwrap();
        for i in 0..3 {
            parties.create(doc(json!({"name": format!("p{i}")}))).unwrap();
        }
        engine.remote().set_latency(Duration::from_millis(20));

        let (first, second) = tokio::join!(engine.tick(), engine.tick());
        let outcomes = [first.unwrap(), second.unwrap()];
        let skipped = outcomes
            .iter()
            .filter(|o| **o == TickOutcome::Skipped(SkipReason::AlreadyDraining))
            .count();
        assert_eq!(skipped, 1);
        assert_eq!(engine.remote().call_count(), 3);
        assert_eq!(engine.remote().max_in_flight(), 1);
        assert!(matches!(engine.drain().await, Ok(r) if r.attempted == 0));
    }

    #[tokio::test]
    async fn spawned_loop_drains_and_stops() {
        let store = Arc::new(LocalStore::open_in_memory().unwrap());
        let config = SyncConfig::new("http://test").with_poll_interval(Duration::from_millis(10));
        let engine = Arc::new(SyncEngine::new(
            config,
            Arc::clone(&store),
            Arc::new(MockRemote::new()),
        ));
        let handle = Arc::clone(&engine).spawn();

        Repository::<Parties>::open(Arc::clone(&store))
            .unwrap()
            .create(doc(json!({"name": "Ali"})))
            .unwrap();

        for _ in 0..200 {
            if engine.pending_count().unwrap() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(engine.pending_count().unwrap(), 0);

        handle.shutdown().await.unwrap();
        assert!(engine.stats().drains_completed >= 1);
    }
}
