//! Server-side entity tables, one set per business.

use crate::error::{ServerError, ServerResult};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

/// Entities owned by one business.
#[derive(Debug, Clone, Default)]
pub struct BusinessTables {
    /// Business profile, served by the bootstrap snapshot.
    pub profile: Option<Value>,
    collections: HashMap<String, BTreeMap<String, Value>>,
}

impl BusinessTables {
    /// Entities of `collection`, ordered by id.
    pub fn list(&self, collection: &str) -> Vec<Value> {
        self.collections
            .get(collection)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    /// One entity.
    pub fn get(&self, collection: &str, id: &str) -> Option<&Value> {
        self.collections.get(collection)?.get(id)
    }

    /// Inserts a new entity, failing if the id is taken.
    pub fn insert(&mut self, collection: &str, id: &str, entity: Value) -> ServerResult<()> {
        let rows = self.collections.entry(collection.to_string()).or_default();
        if rows.contains_key(id) {
            return Err(ServerError::Conflict {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }
        rows.insert(id.to_string(), entity);
        Ok(())
    }

    /// Replaces an existing entity, failing if it is unknown.
    pub fn replace(&mut self, collection: &str, id: &str, entity: Value) -> ServerResult<()> {
        match self
            .collections
            .get_mut(collection)
            .and_then(|rows| rows.get_mut(id))
        {
            Some(slot) => {
                *slot = entity;
                Ok(())
            }
            None => Err(ServerError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            }),
        }
    }

    /// Removes an entity; returns whether it existed.
    pub fn remove(&mut self, collection: &str, id: &str) -> bool {
        self.collections
            .get_mut(collection)
            .is_some_and(|rows| rows.remove(id).is_some())
    }

    /// Number of entities in `collection`.
    pub fn count(&self, collection: &str) -> usize {
        self.collections.get(collection).map_or(0, BTreeMap::len)
    }
}

/// All businesses known to the server.
#[derive(Debug, Default)]
pub struct ServerTables {
    businesses: RwLock<HashMap<String, BusinessTables>>,
}

impl ServerTables {
    /// Creates empty tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the profile of `business_id`, creating the business if needed.
    pub fn set_profile(&self, business_id: &str, profile: Map<String, Value>) {
        self.businesses
            .write()
            .entry(business_id.to_string())
            .or_default()
            .profile = Some(Value::Object(profile));
    }

    /// Runs `f` with read access to one business.
    pub fn read<T>(&self, business_id: &str, f: impl FnOnce(&BusinessTables) -> T) -> T {
        let businesses = self.businesses.read();
        match businesses.get(business_id) {
            Some(tables) => f(tables),
            None => f(&BusinessTables::default()),
        }
    }

    /// Runs `f` with write access to one business.
    pub fn write<T>(&self, business_id: &str, f: impl FnOnce(&mut BusinessTables) -> T) -> T {
        let mut businesses = self.businesses.write();
        f(businesses.entry(business_id.to_string()).or_default())
    }
}
