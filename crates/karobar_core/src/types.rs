//! Core types: keys, documents and the collection schema.

use crate::error::{CoreError, CoreResult};
use karobar_sync_protocol::SequenceId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A stored document. Entities are opaque JSON objects.
pub type Document = serde_json::Map<String, Value>;

/// Party collection.
pub const PARTIES: &str = "parties";
/// Product collection.
pub const PRODUCTS: &str = "products";
/// Unit collection.
pub const UNITS: &str = "units";
/// Company collection.
pub const COMPANIES: &str = "companies";
/// Business profile collection.
pub const BUSINESS: &str = "business";
/// Sync queue collection.
pub const PENDING_SYNC: &str = "pendingSync";
/// Store metadata collection.
pub const META: &str = "meta";

/// Primary key of a document.
///
/// Integer keys sort numerically, which keeps the sync queue in
/// sequence order. Integers sort before strings.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Key {
    /// Auto-increment key.
    Int(u64),
    /// Client-assigned identifier.
    Text(String),
}

impl Key {
    /// Reads the key stored at `key_path` in `doc`.
    pub fn from_document(collection: &str, key_path: &str, doc: &Document) -> CoreResult<Self> {
        match doc.get(key_path) {
            None | Some(Value::Null) => Err(CoreError::MissingKey {
                collection: collection.to_string(),
                key_path: key_path.to_string(),
            }),
            Some(Value::String(s)) if !s.is_empty() => Ok(Key::Text(s.clone())),
            Some(Value::Number(n)) => n.as_u64().map(Key::Int).ok_or_else(|| CoreError::InvalidKey {
                collection: collection.to_string(),
                key_path: key_path.to_string(),
            }),
            Some(_) => Err(CoreError::InvalidKey {
                collection: collection.to_string(),
                key_path: key_path.to_string(),
            }),
        }
    }

    /// The key as a JSON value, for writing back into a document.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Key::Int(n) => Value::from(*n),
            Key::Text(s) => Value::from(s.as_str()),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Int(n) => write!(f, "{n}"),
            Key::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Text(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Text(s)
    }
}

impl From<&String> for Key {
    fn from(s: &String) -> Self {
        Key::Text(s.clone())
    }
}

impl From<u64> for Key {
    fn from(n: u64) -> Self {
        Key::Int(n)
    }
}

impl From<SequenceId> for Key {
    fn from(id: SequenceId) -> Self {
        Key::Int(id.as_u64())
    }
}

/// Definition of one named collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionDef {
    /// Collection name.
    pub name: String,
    /// Document field holding the primary key.
    pub key_path: String,
    /// Whether the store assigns integer keys on insertion.
    pub auto_increment: bool,
}

impl CollectionDef {
    /// A collection keyed by a caller-provided field.
    pub fn new(name: impl Into<String>, key_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_path: key_path.into(),
            auto_increment: false,
        }
    }

    /// A collection whose integer keys are assigned by the store.
    pub fn auto_increment(name: impl Into<String>, key_path: impl Into<String>) -> Self {
        Self {
            auto_increment: true,
            ..Self::new(name, key_path)
        }
    }
}

/// The set of collections a store exposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    collections: Vec<CollectionDef>,
}

impl Schema {
    /// An empty schema.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            collections: Vec::new(),
        }
    }

    /// Adds a collection, replacing any with the same name.
    #[must_use]
    pub fn with(mut self, def: CollectionDef) -> Self {
        self.collections.retain(|c| c.name != def.name);
        self.collections.push(def);
        self
    }

    /// Looks up a collection.
    pub fn get(&self, name: &str) -> CoreResult<&CollectionDef> {
        self.collections
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| CoreError::CollectionNotFound {
                name: name.to_string(),
            })
    }

    /// Iterates over every collection.
    pub fn iter(&self) -> impl Iterator<Item = &CollectionDef> {
        self.collections.iter()
    }
}

impl Default for Schema {
    /// The point-of-sale schema.
    fn default() -> Self {
        Self::empty()
            .with(CollectionDef::new(PARTIES, "_id"))
            .with(CollectionDef::new(PRODUCTS, "_id"))
            .with(CollectionDef::new(UNITS, "_id"))
            .with(CollectionDef::new(COMPANIES, "_id"))
            .with(CollectionDef::new(BUSINESS, "id"))
            .with(CollectionDef::auto_increment(PENDING_SYNC, "id"))
            .with(CollectionDef::new(META, "key"))
    }
}
