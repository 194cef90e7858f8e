//! First-run seeding from the consolidated snapshot.

use crate::error::{SyncError, SyncResult};
use crate::remote::RemoteApi;
use chrono::{DateTime, SubsecRound, Utc};
use karobar_core::models::CURRENT_BUSINESS;
use karobar_core::{
    meta, Document, LocalStore, BUSINESS, COMPANIES, ID_FIELD, META, PARTIES, PENDING_SYNC,
    PRODUCTS, UNITS,
};
use karobar_sync_protocol::{endpoints, BootstrapSnapshot, ProtocolError, RemoteRequest, SyncTask};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

/// What a bootstrap wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapReport {
    /// Whether a business profile was stored.
    pub business: bool,
    /// Products stored.
    pub products: usize,
    /// Parties stored.
    pub parties: usize,
    /// Units stored.
    pub units: usize,
    /// Companies stored.
    pub companies: usize,
    /// Snapshot entities left alone because a local change is still queued.
    pub skipped: usize,
    /// Value of the `last_sync` marker.
    pub synced_at: DateTime<Utc>,
}

impl BootstrapReport {
    /// Entities written, business profile included.
    pub fn entity_count(&self) -> usize {
        usize::from(self.business) + self.products + self.parties + self.units + self.companies
    }
}

/// Seeds the local store from the remote snapshot.
///
/// The snapshot is written in a single transaction together with the
/// `last_sync` marker, so a failure leaves the store exactly as it was.
/// Entities are put, never deleted: local rows the snapshot does not
/// mention are kept, and so is any entity with a task still in the queue
/// (pending or failed), since its local state is newer than the remote's.
/// Open repositories must be reloaded afterwards.
pub struct BootstrapSync {
    store: Arc<LocalStore>,
    snapshot_path: String,
}

impl BootstrapSync {
    /// Creates a bootstrapper reading `snapshot_path`.
    pub fn new(store: Arc<LocalStore>, snapshot_path: impl Into<String>) -> Self {
        Self {
            store,
            snapshot_path: snapshot_path.into(),
        }
    }

    /// Whether the store has never been seeded.
    pub fn needs_bootstrap(&self) -> SyncResult<bool> {
        Ok(meta::last_sync(&self.store)?.is_none())
    }

    /// Fetches the snapshot and stores it.
    pub async fn run<R: RemoteApi + ?Sized>(&self, remote: &R) -> SyncResult<BootstrapReport> {
        tracing::debug!(url = %self.snapshot_path, "fetching bootstrap snapshot");
        let response = remote
            .send(&RemoteRequest::get(self.snapshot_path.clone()))
            .await?;

        if !response.is_success() {
            let message = response
                .message()
                .unwrap_or("snapshot request failed")
                .to_string();
            tracing::warn!(status = response.status, message, "bootstrap refused");
            return Err(match response.status {
                401 | 403 => SyncError::AuthenticationFailed(message),
                status => SyncError::ServerError { status, message },
            });
        }

        let snapshot: BootstrapSnapshot = response.json(&self.snapshot_path)?;
        let report = self.apply(snapshot)?;
        tracing::info!(
            entities = report.entity_count(),
            products = report.products,
            parties = report.parties,
            "bootstrap complete"
        );
        Ok(report)
    }

    /// Runs only when the store has never been seeded.
    pub async fn run_if_needed<R: RemoteApi + ?Sized>(
        &self,
        remote: &R,
    ) -> SyncResult<Option<BootstrapReport>> {
        if !self.needs_bootstrap()? {
            return Ok(None);
        }
        self.run(remote).await.map(Some)
    }

    fn apply(&self, snapshot: BootstrapSnapshot) -> SyncResult<BootstrapReport> {
        let business = snapshot.business.map(into_document).transpose()?;
        let sections = [
            (PRODUCTS, endpoints::PRODUCTS, into_documents(snapshot.products)?),
            (PARTIES, endpoints::PARTIES, into_documents(snapshot.parties)?),
            (UNITS, endpoints::UNITS, into_documents(snapshot.units)?),
            (COMPANIES, endpoints::COMPANIES, into_documents(snapshot.companies)?),
        ];

        // The marker is stored with millisecond precision.
        let synced_at = Utc::now().trunc_subsecs(3);
        let mut report = BootstrapReport {
            business: business.is_some(),
            products: 0,
            parties: 0,
            units: 0,
            companies: 0,
            skipped: 0,
            synced_at,
        };

        self.store.transact(
            &[BUSINESS, PRODUCTS, PARTIES, UNITS, COMPANIES, META, PENDING_SYNC],
            |txn| {
                let mut queued = HashSet::new();
                for doc in txn.get_all(PENDING_SYNC)? {
                    let task = SyncTask::from_document(doc)?;
                    let (endpoint, _) = endpoints::split_target(&task.url);
                    queued.insert((endpoint.to_string(), task.entity_id));
                }

                if let Some(mut profile) = business {
                    profile.insert("id".into(), Value::from(CURRENT_BUSINESS));
                    txn.put(BUSINESS, profile)?;
                }
                for (collection, endpoint, documents) in sections {
                    let mut written = 0;
                    for document in documents {
                        let id = document.get(ID_FIELD).and_then(Value::as_str);
                        if let Some(id) = id {
                            if queued.contains(&(endpoint.to_string(), id.to_string())) {
                                tracing::debug!(collection, id, "local change queued, keeping local copy");
                                report.skipped += 1;
                                continue;
                            }
                        }
                        txn.put(collection, document)?;
                        written += 1;
                    }
                    match collection {
                        PRODUCTS => report.products = written,
                        PARTIES => report.parties = written,
                        UNITS => report.units = written,
                        _ => report.companies = written,
                    }
                }
                meta::record_last_sync(txn, synced_at)
            },
        )?;
        Ok(report)
    }
}

fn into_document(value: Value) -> SyncResult<Document> {
    Ok(serde_json::from_value(value).map_err(ProtocolError::from)?)
}

fn into_documents(values: Vec<Value>) -> SyncResult<Vec<Document>> {
    values.into_iter().map(into_document).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{MockRemote, MockReply};
    use karobar_core::{Parties, Repository, SyncQueue};
    use karobar_sync_protocol::RemoteResponse;
    use serde_json::json;

    fn doc(v: Value) -> Document {
        match v {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    fn setup() -> (Arc<LocalStore>, BootstrapSync, MockRemote) {
        let store = Arc::new(LocalStore::open_in_memory().unwrap());
        let boot = BootstrapSync::new(Arc::clone(&store), "/api/sync");
        (store, boot, MockRemote::new())
    }

    fn snapshot(body: Value) -> MockReply {
        MockReply::Respond(RemoteResponse::new(200, body))
    }

    #[tokio::test]
    async fn stores_everything_with_marker() {
        let (store, boot, remote) = setup();
        remote.push_reply(snapshot(json!({
            "business": {"_id": "665f", "businessName": "Ali Traders"},
            "products": [{"_id": "rice", "name": "Rice", "baseUnitId": "kg"}],
            "parties": [{"_id": "p1", "name": "Ali Store"}, {"_id": "p2", "name": "Bilal"}]
        })));

        assert!(boot.needs_bootstrap().unwrap());
        let report = boot.run(&remote).await.unwrap();
        assert_eq!(report.entity_count(), 4);
        assert_eq!((report.units, report.companies), (0, 0));

        let business = store.get(BUSINESS, CURRENT_BUSINESS).unwrap().unwrap();
        assert_eq!(business["businessName"], "Ali Traders");
        assert_eq!(store.count(PARTIES).unwrap(), 2);
        assert_eq!(meta::last_sync(&store).unwrap(), Some(report.synced_at));
        assert!(!boot.needs_bootstrap().unwrap());
        assert_eq!(remote.calls()[0].path, "/api/sync");
    }

    #[tokio::test]
    async fn queued_local_changes_win_over_snapshot() {
        let (store, boot, remote) = setup();
        let parties = Repository::<Parties>::open(Arc::clone(&store)).unwrap();
        let created = parties.create(doc(json!({"name": "Ali Store"}))).unwrap();
        let id = created["_id"].as_str().unwrap().to_string();
        let queue = SyncQueue::new(Arc::clone(&store));
        queue.remove(queue.list_all().unwrap()[0].sequence_id().unwrap()).unwrap();
        parties.update(&id, doc(json!({"balance": 500}))).unwrap();

        remote.push_reply(snapshot(json!({
            "parties": [
                {"_id": id, "name": "Ali Store", "balance": 0},
                {"_id": "p2", "name": "Bilal"}
            ]
        })));
        let report = boot.run(&remote).await.unwrap();
        assert_eq!((report.parties, report.skipped), (1, 1));

        let local = store.get(PARTIES, id.as_str()).unwrap().unwrap();
        assert_eq!(local["balance"], 500);
        let queued = queue.list_pending().unwrap();
        assert_eq!(queued[0].body.as_ref().unwrap()["balance"], local["balance"]);
        assert!(store.get(PARTIES, "p2").unwrap().is_some());
    }

    #[tokio::test]
    async fn bad_entity_commits_nothing() {
        let (store, boot, remote) = setup();
        remote.push_reply(snapshot(json!({
            "business": {"businessName": "Ali Traders"},
            "products": [{"_id": "rice", "name": "Rice"}],
            "parties": [{"name": "no id"}]
        })));

        let err = boot.run(&remote).await.unwrap_err();
        assert!(matches!(err, SyncError::Database(_)));
        assert_eq!(store.count(PRODUCTS).unwrap(), 0);
        assert_eq!(store.count(BUSINESS).unwrap(), 0);
        assert!(boot.needs_bootstrap().unwrap());
    }

    #[tokio::test]
    async fn non_object_entity_is_a_protocol_error() {
        let (store, boot, remote) = setup();
        remote.push_reply(snapshot(json!({"units": ["kg"]})));
        let err = boot.run(&remote).await.unwrap_err();
        assert!(matches!(err, SyncError::Protocol(_)));
        assert_eq!(store.count(UNITS).unwrap(), 0);
    }

    #[tokio::test]
    async fn failures_are_surfaced() {
        let (_store, boot, remote) = setup();
        remote.push_statuses([401, 503]);
        remote.push_reply(MockReply::Fail("dns".into()));

        let err = boot.run(&remote).await.unwrap_err();
        assert!(matches!(err, SyncError::AuthenticationFailed(_)));

        let err = boot.run(&remote).await.unwrap_err();
        assert!(err.is_retryable());

        let err = boot.run(&remote).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(boot.needs_bootstrap().unwrap());
    }

    #[tokio::test]
    async fn run_if_needed_only_once() {
        let (_store, boot, remote) = setup();
        remote.push_reply(snapshot(json!({"business": null})));
        assert!(boot.run_if_needed(&remote).await.unwrap().is_some());
        assert!(boot.run_if_needed(&remote).await.unwrap().is_none());
        assert_eq!(remote.call_count(), 1);
    }
}
