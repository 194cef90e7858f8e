//! Write transactions.

use crate::error::{CoreError, CoreResult};
use crate::store::LocalStore;
use crate::types::{CollectionDef, Document, Key};
use std::collections::BTreeMap;

/// A buffered write to one document.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PendingWrite {
    Put(Document),
    Delete,
}

/// An open transaction over a declared set of collections.
///
/// Obtained through [`LocalStore::transact`]. Writes are buffered and hit
/// the log in one append when the closure returns `Ok`; returning `Err`
/// discards them. Reads see the transaction's own buffered writes.
///
/// Every operation names its collection, and touching a collection that
/// was not declared up front fails with
/// [`CoreError::CollectionNotInScope`].
pub struct Transaction<'a> {
    store: &'a LocalStore,
    scope: Vec<String>,
    pub(crate) writes: BTreeMap<(String, Key), PendingWrite>,
    pub(crate) counters: BTreeMap<String, u64>,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(store: &'a LocalStore, scope: &[&str]) -> Self {
        Self {
            store,
            scope: scope.iter().map(|s| (*s).to_string()).collect(),
            writes: BTreeMap::new(),
            counters: BTreeMap::new(),
        }
    }

    fn def(&self, collection: &str) -> CoreResult<&'a CollectionDef> {
        let def = self.store.config().schema.get(collection)?;
        if !self.scope.iter().any(|s| s == collection) {
            return Err(CoreError::CollectionNotInScope {
                name: collection.to_string(),
            });
        }
        Ok(def)
    }

    /// Inserts or overwrites a document, keyed by its key field.
    ///
    /// On an auto-increment collection a document without a key is
    /// handed to [`Transaction::add`].
    pub fn put(&mut self, collection: &str, document: Document) -> CoreResult<Key> {
        let def = self.def(collection)?;
        let has_key = document
            .get(&def.key_path)
            .is_some_and(|v| !v.is_null());
        if def.auto_increment && !has_key {
            return self.add(collection, document);
        }
        let key = Key::from_document(collection, &def.key_path, &document)?;
        self.writes.insert(
            (collection.to_string(), key.clone()),
            PendingWrite::Put(document),
        );
        Ok(key)
    }

    /// Inserts a document under the next auto-increment key.
    ///
    /// The key is written into the document's key field and returned.
    pub fn add(&mut self, collection: &str, mut document: Document) -> CoreResult<Key> {
        let def = self.def(collection)?;
        if !def.auto_increment {
            return Err(CoreError::invalid_operation(format!(
                "{collection} does not assign keys"
            )));
        }
        let next = match self.counters.get(collection) {
            Some(n) => *n,
            None => self.store.state.read().next_key(collection),
        };
        self.counters.insert(collection.to_string(), next + 1);

        let key = Key::Int(next);
        document.insert(def.key_path.clone(), key.to_value());
        self.writes.insert(
            (collection.to_string(), key.clone()),
            PendingWrite::Put(document),
        );
        Ok(key)
    }

    /// Removes a document. Removing an absent key is not an error.
    pub fn delete(&mut self, collection: &str, key: impl Into<Key>) -> CoreResult<()> {
        self.def(collection)?;
        self.writes
            .insert((collection.to_string(), key.into()), PendingWrite::Delete);
        Ok(())
    }

    /// Reads a document, including this transaction's writes.
    pub fn get(&self, collection: &str, key: impl Into<Key>) -> CoreResult<Option<Document>> {
        self.def(collection)?;
        let key = key.into();
        match self.writes.get(&(collection.to_string(), key.clone())) {
            Some(PendingWrite::Put(doc)) => Ok(Some(doc.clone())),
            Some(PendingWrite::Delete) => Ok(None),
            None => Ok(self.store.state.read().get(collection, &key).cloned()),
        }
    }

    /// Reads every document of a collection in key order, including this
    /// transaction's writes.
    pub fn get_all(&self, collection: &str) -> CoreResult<Vec<Document>> {
        self.def(collection)?;
        let mut merged: BTreeMap<Key, Document> = self
            .store
            .state
            .read()
            .entries(collection)
            .map(|(k, d)| (k.clone(), d.clone()))
            .collect();
        for ((c, key), write) in &self.writes {
            if c != collection {
                continue;
            }
            match write {
                PendingWrite::Put(doc) => {
                    merged.insert(key.clone(), doc.clone());
                }
                PendingWrite::Delete => {
                    merged.remove(key);
                }
            }
        }
        Ok(merged.into_values().collect())
    }

    /// Whether the transaction has anything to write.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty() && self.counters.is_empty()
    }
}
