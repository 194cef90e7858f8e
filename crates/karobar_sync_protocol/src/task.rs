//! Sync tasks.

use crate::endpoints;
use crate::error::{ProtocolError, ProtocolResult};
use crate::message::{Method, RemoteRequest};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Position of a task in the replication order.
///
/// Assigned by the store when the task is inserted. Strictly increasing
/// and never reused, even after the task is removed or the log compacted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SequenceId(pub u64);

impl SequenceId {
    /// Returns the raw value.
    #[must_use]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SequenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The kind of mutation a task replays.
///
/// Serialized as the HTTP method it is sent with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verb {
    /// Entity created locally, sent as `POST`.
    #[serde(rename = "POST")]
    Create,
    /// Entity updated locally, sent as `PUT` with the full snapshot.
    #[serde(rename = "PUT")]
    Update,
    /// Entity deleted locally, sent as `DELETE` with the id in the query.
    #[serde(rename = "DELETE")]
    Delete,
}

impl Verb {
    /// HTTP method used on the wire.
    #[must_use]
    pub fn method(self) -> Method {
        match self {
            Verb::Create => Method::Post,
            Verb::Update => Method::Put,
            Verb::Delete => Method::Delete,
        }
    }

    /// Operation suffix of the task type tag.
    #[must_use]
    pub fn operation(self) -> &'static str {
        match self {
            Verb::Create => "create",
            Verb::Update => "update",
            Verb::Delete => "delete",
        }
    }
}

/// Queue status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Waiting to be sent.
    #[default]
    Pending,
    /// Rejected by the remote too many times; skipped until requeued.
    Failed,
}

/// One queued remote operation.
///
/// Stored as a document in the `pendingSync` collection with the field
/// names below. `id` is absent until the store assigns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncTask {
    /// Sequence id, assigned on insertion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<SequenceId>,
    /// Request target, relative to the remote base URL.
    pub url: String,
    /// Mutation kind.
    pub method: Verb,
    /// Full entity snapshot; `None` for deletes.
    pub body: Option<Value>,
    /// `<collection>_<operation>` tag.
    #[serde(rename = "type")]
    pub tag: String,
    /// Queue status.
    #[serde(default)]
    pub status: TaskStatus,
    /// When the mutation happened.
    pub created_at: DateTime<Utc>,
    /// Identifier of the entity the task targets.
    pub entity_id: String,
    /// Number of permanent rejections so far.
    #[serde(default)]
    pub attempts: u32,
    /// Last rejection reason, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl SyncTask {
    /// A CREATE task posting `snapshot` to `endpoint`.
    #[must_use]
    pub fn create(collection: &str, endpoint: &str, entity_id: &str, snapshot: Value) -> Self {
        Self::new(Verb::Create, collection, endpoint.to_string(), entity_id, Some(snapshot))
    }

    /// An UPDATE task putting the full `snapshot` to `endpoint`.
    #[must_use]
    pub fn update(collection: &str, endpoint: &str, entity_id: &str, snapshot: Value) -> Self {
        Self::new(Verb::Update, collection, endpoint.to_string(), entity_id, Some(snapshot))
    }

    /// A DELETE task referencing only the identifier.
    #[must_use]
    pub fn delete(collection: &str, endpoint: &str, entity_id: &str) -> Self {
        Self::new(
            Verb::Delete,
            collection,
            endpoints::delete_target(endpoint, entity_id),
            entity_id,
            None,
        )
    }

    fn new(
        verb: Verb,
        collection: &str,
        url: String,
        entity_id: &str,
        body: Option<Value>,
    ) -> Self {
        Self {
            id: None,
            url,
            method: verb,
            body,
            tag: format!("{collection}_{}", verb.operation()),
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            entity_id: entity_id.to_string(),
            attempts: 0,
            last_error: None,
        }
    }

    /// Returns the sequence id, failing for a task never stored.
    pub fn sequence_id(&self) -> ProtocolResult<SequenceId> {
        self.id
            .ok_or_else(|| ProtocolError::invalid_task(format!("{} has no sequence id", self.tag)))
    }

    /// Whether the drain should attempt this task.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status == TaskStatus::Pending
    }

    /// Builds the request replaying this task.
    #[must_use]
    pub fn to_request(&self) -> RemoteRequest {
        RemoteRequest {
            method: self.method.method(),
            path: self.url.clone(),
            body: self.body.clone(),
        }
    }

    /// Converts the task into a store document.
    pub fn to_document(&self) -> ProtocolResult<Map<String, Value>> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            _ => Err(ProtocolError::invalid_task("task did not serialize to an object")),
        }
    }

    /// Reads a task back from a store document.
    pub fn from_document(document: Map<String, Value>) -> ProtocolResult<Self> {
        let task: Self = serde_json::from_value(Value::Object(document))?;
        if task.method == Verb::Delete && task.body.is_some() {
            return Err(ProtocolError::invalid_task("delete task carries a body"));
        }
        Ok(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_task_carries_full_payload() {
        let task = SyncTask::create(
            "parties",
            endpoints::PARTIES,
            "p-1",
            json!({"_id": "p-1", "name": "Ali Store"}),
        );
        assert_eq!(task.tag, "parties_create");
        assert_eq!(task.url, "/api/parties");
        assert_eq!(task.method.method(), Method::Post);
        assert_eq!(task.body.as_ref().unwrap()["name"], "Ali Store");
        assert!(task.is_pending());
        assert!(task.sequence_id().is_err());
    }

    #[test]
    fn delete_task_has_no_body() {
        let task = SyncTask::delete("products", endpoints::PRODUCTS, "x");
        assert_eq!(task.tag, "products_delete");
        assert_eq!(task.url, "/api/products?id=x");
        assert!(task.body.is_none());

        let request = task.to_request();
        assert_eq!(request.method, Method::Delete);
        assert!(request.body.is_none());
    }

    #[test]
    fn document_uses_queue_field_names() {
        let mut task = SyncTask::update("units", endpoints::UNITS, "u", json!({"_id": "u"}));
        task.id = Some(SequenceId(7));
        let doc = task.to_document().unwrap();

        assert_eq!(doc["id"], 7);
        assert_eq!(doc["method"], "PUT");
        assert_eq!(doc["type"], "units_update");
        assert_eq!(doc["status"], "pending");
        assert_eq!(doc["entityId"], "u");
        assert!(doc.contains_key("createdAt"));
        assert!(!doc.contains_key("lastError"));

        let back = SyncTask::from_document(doc).unwrap();
        assert_eq!(back, task);
    }

    #[test]
    fn legacy_document_without_counters_decodes() {
        let doc = json!({
            "id": 3,
            "url": "/api/parties",
            "method": "POST",
            "body": {"_id": "a"},
            "type": "parties_create",
            "status": "pending",
            "createdAt": "2024-05-01T10:00:00Z",
            "entityId": "a"
        });
        let Value::Object(map) = doc else { unreachable!() };
        let task = SyncTask::from_document(map).unwrap();
        assert_eq!(task.attempts, 0);
        assert_eq!(task.sequence_id().unwrap(), SequenceId(3));
    }

    #[test]
    fn delete_with_body_is_rejected() {
        let mut task = SyncTask::delete("parties", endpoints::PARTIES, "a");
        task.body = Some(json!({}));
        let doc = task.to_document().unwrap();
        assert!(matches!(
            SyncTask::from_document(doc),
            Err(ProtocolError::InvalidTask(_))
        ));
    }

    #[test]
    fn sequence_ids_order_numerically() {
        assert!(SequenceId(2) < SequenceId(10));
        assert_eq!(SequenceId(10).to_string(), "#10");
    }
}
