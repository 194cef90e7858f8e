//! Per-kind repositories.
//!
//! A repository pairs every entity mutation with a sync task in one store
//! transaction, and keeps a read-through cache for listing. The cache is
//! updated optimistically before the commit and rolled back if the commit
//! fails; [`Repository::reload`] rebuilds it from the store.

use crate::error::{CoreError, CoreResult};
use crate::models;
use crate::queue::SyncQueue;
use crate::store::LocalStore;
use crate::types::{Document, COMPANIES, PARTIES, PENDING_SYNC, PRODUCTS, UNITS};
use chrono::{SecondsFormat, Utc};
use karobar_sync_protocol::{endpoints, SequenceId, SyncTask};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use uuid::Uuid;

/// Identifier field shared by every entity kind.
pub const ID_FIELD: &str = "_id";

/// Static description of one entity kind.
pub trait EntityKind: Send + Sync + 'static {
    /// Store collection.
    const COLLECTION: &'static str;
    /// Remote API endpoint.
    const ENDPOINT: &'static str;

    /// Fills kind-specific defaults on a new entity. Existing fields win.
    fn apply_defaults(_doc: &mut Document) {}
}

fn default_field(doc: &mut Document, field: &str, value: Value) {
    doc.entry(field.to_string()).or_insert(value);
}

/// Customers and suppliers.
#[derive(Debug)]
pub struct Parties;

impl EntityKind for Parties {
    const COLLECTION: &'static str = PARTIES;
    const ENDPOINT: &'static str = endpoints::PARTIES;

    fn apply_defaults(doc: &mut Document) {
        default_field(doc, "type", Value::from("customer"));
        default_field(doc, "balance", Value::from(0));
        default_field(doc, "isActive", Value::Bool(true));
    }
}

/// Stocked items.
#[derive(Debug)]
pub struct Products;

impl EntityKind for Products {
    const COLLECTION: &'static str = PRODUCTS;
    const ENDPOINT: &'static str = endpoints::PRODUCTS;

    fn apply_defaults(doc: &mut Document) {
        default_field(doc, "conversionRate", Value::from(1));
        for counter in [
            "openingStock",
            "purchasedStock",
            "soldStock",
            "damagedStock",
            "totalQuantity",
        ] {
            default_field(doc, counter, Value::from(0));
        }
        default_field(doc, "batches", Value::Array(Vec::new()));
        default_field(doc, "isActive", Value::Bool(true));
    }
}

/// Units of measure.
#[derive(Debug)]
pub struct Units;

impl EntityKind for Units {
    const COLLECTION: &'static str = UNITS;
    const ENDPOINT: &'static str = endpoints::UNITS;

    fn apply_defaults(doc: &mut Document) {
        default_field(doc, "isActive", Value::Bool(true));
    }
}

/// Manufacturers and brands.
#[derive(Debug)]
pub struct Companies;

impl EntityKind for Companies {
    const COLLECTION: &'static str = COMPANIES;
    const ENDPOINT: &'static str = endpoints::COMPANIES;

    fn apply_defaults(doc: &mut Document) {
        default_field(doc, "isActive", Value::Bool(true));
    }
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn id_of(doc: &Document) -> Option<&str> {
    doc.get(ID_FIELD).and_then(Value::as_str)
}

/// Repository for one entity kind.
///
/// ```rust
/// use karobar_core::{LocalStore, Parties, Repository, SyncQueue};
/// use serde_json::json;
/// use std::sync::Arc;
///
/// let store = Arc::new(LocalStore::open_in_memory().unwrap());
/// let parties = Repository::<Parties>::open(Arc::clone(&store)).unwrap();
/// let party = parties
///     .create(json!({"name": "Ali Store"}).as_object().unwrap().clone())
///     .unwrap();
/// assert_eq!(party["balance"], 0);
/// assert_eq!(SyncQueue::new(store).depth().unwrap().pending, 1);
/// ```
pub struct Repository<K: EntityKind> {
    store: Arc<LocalStore>,
    cache: RwLock<HashMap<String, Document>>,
    _kind: PhantomData<K>,
}

impl<K: EntityKind> Repository<K> {
    /// Opens the repository and fills its cache from the store.
    pub fn open(store: Arc<LocalStore>) -> CoreResult<Self> {
        let repo = Self {
            store,
            cache: RwLock::new(HashMap::new()),
            _kind: PhantomData,
        };
        repo.reload()?;
        Ok(repo)
    }

    /// Discards the cache and rebuilds it from the store.
    ///
    /// Documents without a string `_id` cannot be addressed through the
    /// repository; they are logged and left out of the cache.
    pub fn reload(&self) -> CoreResult<()> {
        let mut fresh: HashMap<String, Document> = HashMap::new();
        let mut unaddressable = 0usize;
        for doc in self.store.get_all(K::COLLECTION)? {
            match id_of(&doc) {
                Some(id) => {
                    let key = id.to_string();
                    fresh.insert(key, doc);
                }
                None => {
                    unaddressable += 1;
                    tracing::warn!(
                        collection = K::COLLECTION,
                        id = ?doc.get(ID_FIELD),
                        "document has no string id, not cached"
                    );
                }
            }
        }
        tracing::debug!(collection = K::COLLECTION, cached = fresh.len(), unaddressable, "cache reloaded");
        *self.cache.write() = fresh;
        Ok(())
    }

    /// Cached entities, newest `createdAt` first.
    #[must_use]
    pub fn list(&self) -> Vec<Document> {
        let mut all: Vec<Document> = self.cache.read().values().cloned().collect();
        all.sort_by(|a, b| {
            let ca = a.get("createdAt").and_then(Value::as_str).unwrap_or("");
            let cb = b.get("createdAt").and_then(Value::as_str).unwrap_or("");
            match cb.cmp(ca) {
                Ordering::Equal => id_of(a).cmp(&id_of(b)),
                other => other,
            }
        });
        all
    }

    /// Cached entities as typed models, newest first.
    pub fn list_as<T: DeserializeOwned>(&self) -> CoreResult<Vec<T>> {
        self.list().into_iter().map(models::from_document).collect()
    }

    /// One cached entity.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Document> {
        self.cache.read().get(id).cloned()
    }

    /// One cached entity as a typed model.
    pub fn get_as<T: DeserializeOwned>(&self, id: &str) -> CoreResult<Option<T>> {
        self.get(id).map(models::from_document).transpose()
    }

    /// Number of cached entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.read().len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.read().is_empty()
    }

    /// Creates an entity and queues its CREATE.
    ///
    /// A fresh identifier and both timestamps are always assigned; any
    /// `_id` in `data` is ignored. Returns as soon as the local commit is
    /// durable.
    pub fn create(&self, data: Document) -> CoreResult<Document> {
        let mut doc = data;
        let id = Uuid::new_v4().to_string();
        let stamp = now();
        doc.insert(ID_FIELD.into(), Value::from(id.as_str()));
        doc.insert("createdAt".into(), Value::from(stamp.as_str()));
        doc.insert("updatedAt".into(), Value::from(stamp));
        K::apply_defaults(&mut doc);

        self.cache.write().insert(id.clone(), doc.clone());

        let snapshot = Value::Object(doc.clone());
        let result = self.store.transact(&[K::COLLECTION, PENDING_SYNC], |txn| {
            txn.put(K::COLLECTION, doc.clone())?;
            SyncQueue::enqueue(
                txn,
                SyncTask::create(K::COLLECTION, K::ENDPOINT, &id, snapshot),
            )
        });

        match result {
            Ok(seq) => {
                tracing::debug!(collection = K::COLLECTION, id = %id, sequence_id = %seq, "entity created");
                Ok(doc)
            }
            Err(e) => {
                self.cache.write().remove(&id);
                Err(e)
            }
        }
    }

    /// Merges `fields` onto the stored entity and queues an UPDATE
    /// carrying the full merged snapshot.
    ///
    /// The identifier and `createdAt` cannot be changed; `updatedAt` is
    /// restamped.
    ///
    /// # Errors
    ///
    /// [`CoreError::EntityNotFound`] if the entity is not in the store.
    /// Nothing is queued in that case.
    pub fn update(&self, id: &str, fields: Document) -> CoreResult<Document> {
        let mut fields = fields;
        fields.remove(ID_FIELD);
        fields.remove("createdAt");
        fields.insert("updatedAt".into(), Value::from(now()));

        let previous = self.cache.read().get(id).cloned();
        if let Some(cached) = &previous {
            let mut optimistic = cached.clone();
            optimistic.extend(fields.clone());
            self.cache.write().insert(id.to_string(), optimistic);
        }

        let result = self.store.transact(&[K::COLLECTION, PENDING_SYNC], |txn| {
            let mut merged = txn
                .get(K::COLLECTION, id)?
                .ok_or_else(|| CoreError::entity_not_found(K::COLLECTION, id))?;
            merged.extend(fields.clone());
            txn.put(K::COLLECTION, merged.clone())?;
            let seq = SyncQueue::enqueue(
                txn,
                SyncTask::update(
                    K::COLLECTION,
                    K::ENDPOINT,
                    id,
                    Value::Object(merged.clone()),
                ),
            )?;
            Ok((merged, seq))
        });

        match result {
            Ok((merged, seq)) => {
                self.cache.write().insert(id.to_string(), merged.clone());
                tracing::debug!(collection = K::COLLECTION, id, sequence_id = %seq, "entity updated");
                Ok(merged)
            }
            Err(e) => {
                let mut cache = self.cache.write();
                match previous {
                    Some(doc) => cache.insert(id.to_string(), doc),
                    None => cache.remove(id),
                };
                Err(e)
            }
        }
    }

    /// Removes an entity and queues a DELETE referencing only its id.
    ///
    /// Succeeds whether or not the entity exists locally or was ever sent
    /// to the remote.
    pub fn delete(&self, id: &str) -> CoreResult<SequenceId> {
        let previous = self.cache.write().remove(id);

        let result = self.store.transact(&[K::COLLECTION, PENDING_SYNC], |txn| {
            txn.delete(K::COLLECTION, id)?;
            SyncQueue::enqueue(txn, SyncTask::delete(K::COLLECTION, K::ENDPOINT, id))
        });

        match result {
            Ok(seq) => {
                tracing::debug!(collection = K::COLLECTION, id, sequence_id = %seq, "entity deleted");
                Ok(seq)
            }
            Err(e) => {
                if let Some(doc) = previous {
                    self.cache.write().insert(id.to_string(), doc);
                }
                Err(e)
            }
        }
    }
}

impl<K: EntityKind> std::fmt::Debug for Repository<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("collection", &K::COLLECTION)
            .field("cached", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Party;
    use karobar_sync_protocol::Verb;
    use serde_json::json;

    fn doc(v: Value) -> Document {
        match v {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    fn setup() -> (Arc<LocalStore>, SyncQueue) {
        let store = Arc::new(LocalStore::open_in_memory().unwrap());
        let queue = SyncQueue::new(Arc::clone(&store));
        (store, queue)
    }

    #[test]
    fn create_assigns_identity_and_defaults() {
        let (store, queue) = setup();
        let parties = Repository::<Parties>::open(Arc::clone(&store)).unwrap();
        let party = parties
            .create(doc(json!({"_id": "caller-chosen", "name": "Ali Store"})))
            .unwrap();

        let id = party["_id"].as_str().unwrap();
        assert_ne!(id, "caller-chosen");
        assert!(Uuid::parse_str(id).is_ok());
        assert_eq!(party["balance"], 0);
        assert_eq!(party["isActive"], true);
        assert_eq!(party["createdAt"], party["updatedAt"]);

        let tasks = queue.list_all().unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].method, Verb::Create);
        assert_eq!(tasks[0].tag, "parties_create");
        assert_eq!(tasks[0].body.as_ref().unwrap(), &Value::Object(party.clone()));
        assert_eq!(store.get(PARTIES, id).unwrap().unwrap(), party);
    }

    #[test]
    fn product_stock_defaults() {
        let (store, _) = setup();
        let products = Repository::<Products>::open(store).unwrap();
        let p = products
            .create(doc(json!({"name": "Sugar", "openingStock": 40})))
            .unwrap();
        assert_eq!(p["openingStock"], 40);
        assert_eq!(p["soldStock"], 0);
        assert_eq!(p["conversionRate"], 1);
        assert_eq!(p["batches"], json!([]));
    }

    #[test]
    fn update_ships_full_snapshot() {
        let (store, queue) = setup();
        let parties = Repository::<Parties>::open(store).unwrap();
        let party = parties
            .create(doc(json!({"name": "Ali", "phone": "0300"})))
            .unwrap();
        let id = party["_id"].as_str().unwrap();

        let updated = parties
            .update(id, doc(json!({"balance": 500, "_id": "hijack"})))
            .unwrap();
        assert_eq!(updated["_id"], id);
        assert_eq!(updated["phone"], "0300");
        assert_eq!(updated["balance"], 500);
        assert_eq!(updated["createdAt"], party["createdAt"]);

        let tasks = queue.list_all().unwrap();
        assert_eq!(tasks[1].method, Verb::Update);
        let body = tasks[1].body.as_ref().unwrap();
        assert_eq!(body["name"], "Ali");
        assert_eq!(body["balance"], 500);
        assert_eq!(parties.get(id).unwrap(), updated);
    }

    #[test]
    fn update_of_unknown_entity_queues_nothing() {
        let (store, queue) = setup();
        let units = Repository::<Units>::open(store).unwrap();
        let err = units.update("ghost", doc(json!({"name": "x"}))).unwrap_err();
        assert!(matches!(err, CoreError::EntityNotFound { .. }));
        assert!(units.get("ghost").is_none());
        assert_eq!(queue.depth().unwrap().total(), 0);
    }

    #[test]
    fn delete_never_existing_still_queues() {
        let (store, queue) = setup();
        let companies = Repository::<Companies>::open(store).unwrap();
        let seq = companies.delete("never-there").unwrap();
        let task = queue.get(seq).unwrap().unwrap();
        assert_eq!(task.url, "/api/companies?id=never-there");
        assert!(task.body.is_none());
        companies.delete("never-there").unwrap();
        assert_eq!(queue.depth().unwrap().pending, 2);
    }

    #[test]
    fn failed_commit_rolls_back_cache() {
        let (store, _) = setup();
        let parties = Repository::<Parties>::open(Arc::clone(&store)).unwrap();
        let party = parties.create(doc(json!({"name": "Ali"}))).unwrap();
        let id = party["_id"].as_str().unwrap();

        store.close().unwrap();
        assert!(parties.create(doc(json!({"name": "Bilal"}))).is_err());
        assert!(parties.update(id, doc(json!({"name": "Changed"}))).is_err());
        assert!(parties.delete(id).is_err());

        assert_eq!(parties.len(), 1);
        assert_eq!(parties.get(id).unwrap()["name"], "Ali");
    }

    #[test]
    fn list_newest_first_and_typed() {
        let (store, _) = setup();
        let parties = Repository::<Parties>::open(Arc::clone(&store)).unwrap();
        for (name, at) in [
            ("old", "2024-01-01T00:00:00.000Z"),
            ("new", "2024-06-01T00:00:00.000Z"),
            ("mid", "2024-03-01T00:00:00.000Z"),
        ] {
            store
                .put(PARTIES, doc(json!({"_id": name, "name": name, "createdAt": at})))
                .unwrap();
        }
        parties.reload().unwrap();

        let names: Vec<_> = parties
            .list_as::<Party>()
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["new", "mid", "old"]);
        assert_eq!(parties.get_as::<Party>("mid").unwrap().unwrap().balance, 0.0);
    }

    #[test]
    fn reload_drops_stale_cache_entries() {
        let (store, _) = setup();
        let parties = Repository::<Parties>::open(Arc::clone(&store)).unwrap();
        let party = parties.create(doc(json!({"name": "Ali"}))).unwrap();
        store.delete(PARTIES, party["_id"].as_str().unwrap()).unwrap();
        assert_eq!(parties.len(), 1);
        parties.reload().unwrap();
        assert!(parties.is_empty());
    }

    #[test]
    fn reload_skips_numeric_ids() {
        let (store, _) = setup();
        store.put(PARTIES, doc(json!({"_id": 7, "name": "Imported"}))).unwrap();
        store.put(PARTIES, doc(json!({"_id": "p1", "name": "Ali"}))).unwrap();

        let parties = Repository::<Parties>::open(Arc::clone(&store)).unwrap();
        assert_eq!(parties.len(), 1);
        assert!(parties.get("p1").is_some());
        // Still in the store, just not reachable through the repository.
        assert_eq!(store.count(PARTIES).unwrap(), 2);
    }
}
