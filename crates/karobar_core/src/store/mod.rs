//! The local durable store.

mod state;
mod transaction;

pub use transaction::Transaction;

use crate::config::Config;
#[cfg(feature = "std")]
use crate::dir::StoreDir;
use crate::error::{CoreError, CoreResult};
use crate::types::{Document, Key};
use crate::wal::{WalRecord, WalWriter};
use karobar_storage::{InMemoryBackend, StorageBackend};
use parking_lot::{Mutex, RwLock};
use state::StoreState;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use transaction::PendingWrite;

/// Transactional document store with named collections.
///
/// State lives in a write-ahead log that is replayed on open; committed
/// documents are served from memory. One writer at a time: every write
/// goes through [`LocalStore::transact`], which holds the store's write
/// lock for the whole closure.
///
/// # Example
///
/// ```rust
/// use karobar_core::{LocalStore, PARTIES, PENDING_SYNC};
/// use serde_json::json;
///
/// let store = LocalStore::open_in_memory().unwrap();
/// store
///     .transact(&[PARTIES, PENDING_SYNC], |txn| {
///         let party = json!({"_id": "p-1", "name": "Ali Store"});
///         txn.put(PARTIES, party.as_object().unwrap().clone())?;
///         txn.add(PENDING_SYNC, json!({"url": "/api/parties"}).as_object().unwrap().clone())?;
///         Ok(())
///     })
///     .unwrap();
/// assert_eq!(store.count(PENDING_SYNC).unwrap(), 1);
/// ```
pub struct LocalStore {
    config: Config,
    wal: WalWriter,
    state: RwLock<StoreState>,
    write_lock: Mutex<()>,
    next_txid: AtomicU64,
    is_open: AtomicBool,
    #[cfg(feature = "std")]
    dir: Option<StoreDir>,
}

impl LocalStore {
    /// Opens the store in directory `path` with the default configuration.
    #[cfg(feature = "std")]
    pub fn open(path: &std::path::Path) -> CoreResult<Self> {
        Self::open_with_config(path, Config::default())
    }

    /// Opens the store in directory `path`.
    ///
    /// # Errors
    ///
    /// Fails if the directory is locked by another process, is missing
    /// while `create_if_missing` is off, or holds a corrupt log.
    #[cfg(feature = "std")]
    pub fn open_with_config(path: &std::path::Path, config: Config) -> CoreResult<Self> {
        let dir = StoreDir::open(path, config.create_if_missing)?;
        dir.remove_stale_staging()?;
        let backend = karobar_storage::FileBackend::open(&dir.wal_path())?;
        let mut store = Self::open_with_backend(Box::new(backend), config)?;
        store.dir = Some(dir);
        Ok(store)
    }

    /// Opens an empty store that lives only in memory.
    pub fn open_in_memory() -> CoreResult<Self> {
        Self::open_with_backend(Box::new(InMemoryBackend::new()), Config::default())
    }

    /// Opens a store over an arbitrary backend, replaying its log.
    pub fn open_with_backend(backend: Box<dyn StorageBackend>, config: Config) -> CoreResult<Self> {
        let wal = WalWriter::new(backend, config.sync_on_commit);
        let recovered = wal.scan(state::recover)?;

        let size = wal.size()?;
        if recovered.valid_end < size {
            tracing::warn!(
                valid_end = recovered.valid_end,
                size,
                "discarding torn WAL tail"
            );
            wal.truncate(recovered.valid_end)?;
        }
        tracing::info!(
            committed = recovered.committed,
            discarded = recovered.discarded,
            "local store recovered"
        );

        Ok(Self {
            config,
            wal,
            state: RwLock::new(recovered.state),
            write_lock: Mutex::new(()),
            next_txid: AtomicU64::new(recovered.max_txid + 1),
            is_open: AtomicBool::new(true),
            #[cfg(feature = "std")]
            dir: None,
        })
    }

    /// Returns the configuration the store was opened with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Directory the store lives in, if it is file backed.
    #[cfg(feature = "std")]
    #[must_use]
    pub fn path(&self) -> Option<&std::path::Path> {
        self.dir.as_ref().map(StoreDir::path)
    }

    fn ensure_open(&self) -> CoreResult<()> {
        if self.is_open.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CoreError::StoreClosed)
        }
    }

    /// Runs `body` as one atomic transaction over `scope`.
    ///
    /// All writes made through the transaction commit together when
    /// `body` returns `Ok`, and none do when it returns `Err` or the log
    /// append fails. Writers are serialized; readers never see a
    /// half-applied transaction.
    ///
    /// `body` must not call back into this store's write methods; the
    /// write lock is not reentrant.
    pub fn transact<T, F>(&self, scope: &[&str], body: F) -> CoreResult<T>
    where
        F: FnOnce(&mut Transaction<'_>) -> CoreResult<T>,
    {
        self.ensure_open()?;
        for name in scope {
            self.config.schema.get(name)?;
        }
        let _guard = self.write_lock.lock();
        let mut txn = Transaction::new(self, scope);
        let value = body(&mut txn)?;
        self.commit(txn)?;
        Ok(value)
    }

    fn commit(&self, txn: Transaction<'_>) -> CoreResult<()> {
        if txn.is_empty() {
            return Ok(());
        }
        let txid = self.next_txid.fetch_add(1, Ordering::SeqCst);

        let mut records = Vec::with_capacity(txn.writes.len() + txn.counters.len() + 2);
        records.push(WalRecord::Begin { txid });
        for ((collection, key), write) in txn.writes {
            records.push(match write {
                PendingWrite::Put(document) => WalRecord::Put {
                    txid,
                    collection,
                    key,
                    document,
                },
                PendingWrite::Delete => WalRecord::Delete {
                    txid,
                    collection,
                    key,
                },
            });
        }
        for (collection, next) in txn.counters {
            records.push(WalRecord::Counter {
                txid,
                collection,
                next,
            });
        }
        records.push(WalRecord::Commit { txid });

        let mut batch = Vec::new();
        for record in &records {
            record.encode_into(&mut batch)?;
        }
        self.wal.append_batch(&batch)?;

        {
            let mut state = self.state.write();
            for record in &records {
                state.apply(record);
            }
        }
        tracing::debug!(txid, ops = records.len() - 2, "transaction committed");

        if self.config.max_wal_size > 0 && self.wal.size()? >= self.config.max_wal_size {
            // The commit itself is durable; a failed compaction only
            // leaves the log longer than it needs to be.
            if let Err(e) = self.compact_locked() {
                tracing::warn!(error = %e, "WAL compaction failed");
            }
        }
        Ok(())
    }

    /// Rewrites the log as a single snapshot transaction.
    ///
    /// Auto-increment counters are carried over, so sequence ids stay
    /// unique across compactions.
    pub fn compact(&self) -> CoreResult<()> {
        self.ensure_open()?;
        let _guard = self.write_lock.lock();
        self.compact_locked()
    }

    fn compact_locked(&self) -> CoreResult<()> {
        let before = self.wal.size()?;
        let txid = self.next_txid.fetch_add(1, Ordering::SeqCst);
        let mut batch = Vec::new();
        for record in self.state.read().snapshot(txid) {
            record.encode_into(&mut batch)?;
        }
        self.wal.replace(&batch)?;
        tracing::info!(before, after = batch.len(), "WAL compacted");
        Ok(())
    }

    /// Inserts or overwrites one document.
    pub fn put(&self, collection: &str, document: Document) -> CoreResult<Key> {
        self.transact(&[collection], |txn| txn.put(collection, document))
    }

    /// Removes one document. Removing an absent key succeeds.
    pub fn delete(&self, collection: &str, key: impl Into<Key>) -> CoreResult<()> {
        let key = key.into();
        self.transact(&[collection], |txn| txn.delete(collection, key))
    }

    /// Reads one committed document.
    pub fn get(&self, collection: &str, key: impl Into<Key>) -> CoreResult<Option<Document>> {
        self.ensure_open()?;
        self.config.schema.get(collection)?;
        Ok(self.state.read().get(collection, &key.into()).cloned())
    }

    /// Reads every committed document of a collection in key order.
    pub fn get_all(&self, collection: &str) -> CoreResult<Vec<Document>> {
        self.ensure_open()?;
        self.config.schema.get(collection)?;
        Ok(self
            .state
            .read()
            .entries(collection)
            .map(|(_, d)| d.clone())
            .collect())
    }

    /// Number of committed documents in a collection.
    pub fn count(&self, collection: &str) -> CoreResult<usize> {
        self.ensure_open()?;
        self.config.schema.get(collection)?;
        Ok(self.state.read().count(collection))
    }

    /// Current WAL size in bytes.
    pub fn wal_size(&self) -> CoreResult<u64> {
        self.wal.size()
    }

    /// Syncs the log and rejects further operations.
    pub fn close(&self) -> CoreResult<()> {
        if !self.is_open.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        let _guard = self.write_lock.lock();
        self.wal.sync()
    }

    /// Whether [`LocalStore::close`] has not been called yet.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.is_open.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore")
            .field("is_open", &self.is_open())
            .field("next_txid", &self.next_txid.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}
