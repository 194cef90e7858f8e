//! In-memory image of the committed log.

use crate::error::CoreResult;
use crate::types::{Document, Key};
use crate::wal::{WalRecord, WalRecordIterator};
use std::collections::{BTreeMap, HashMap};

/// Committed documents and auto-increment counters.
#[derive(Debug, Default)]
pub(crate) struct StoreState {
    collections: BTreeMap<String, BTreeMap<Key, Document>>,
    counters: BTreeMap<String, u64>,
}

impl StoreState {
    pub(crate) fn get(&self, collection: &str, key: &Key) -> Option<&Document> {
        self.collections.get(collection)?.get(key)
    }

    pub(crate) fn entries(&self, collection: &str) -> impl Iterator<Item = (&Key, &Document)> {
        self.collections
            .get(collection)
            .into_iter()
            .flat_map(|docs| docs.iter())
    }

    pub(crate) fn count(&self, collection: &str) -> usize {
        self.collections.get(collection).map_or(0, BTreeMap::len)
    }

    /// Next key an auto-increment collection will hand out. Keys start at 1.
    pub(crate) fn next_key(&self, collection: &str) -> u64 {
        self.counters.get(collection).copied().unwrap_or(1)
    }

    /// Applies one data record. Begin and Commit are no-ops.
    pub(crate) fn apply(&mut self, record: &WalRecord) {
        match record {
            WalRecord::Put {
                collection,
                key,
                document,
                ..
            } => {
                self.collections
                    .entry(collection.clone())
                    .or_default()
                    .insert(key.clone(), document.clone());
            }
            WalRecord::Delete {
                collection, key, ..
            } => {
                if let Some(docs) = self.collections.get_mut(collection) {
                    docs.remove(key);
                }
            }
            WalRecord::Counter {
                collection, next, ..
            } => {
                let slot = self.counters.entry(collection.clone()).or_insert(1);
                *slot = (*slot).max(*next);
            }
            WalRecord::Begin { .. } | WalRecord::Commit { .. } => {}
        }
    }

    /// The whole state as one transaction, for compaction.
    pub(crate) fn snapshot(&self, txid: u64) -> Vec<WalRecord> {
        let mut records = vec![WalRecord::Begin { txid }];
        for (collection, docs) in &self.collections {
            for (key, document) in docs {
                records.push(WalRecord::Put {
                    txid,
                    collection: collection.clone(),
                    key: key.clone(),
                    document: document.clone(),
                });
            }
        }
        for (collection, next) in &self.counters {
            records.push(WalRecord::Counter {
                txid,
                collection: collection.clone(),
                next: *next,
            });
        }
        records.push(WalRecord::Commit { txid });
        records
    }
}

/// Result of replaying a log.
#[derive(Debug, Default)]
pub(crate) struct Recovered {
    pub(crate) state: StoreState,
    pub(crate) max_txid: u64,
    pub(crate) committed: usize,
    pub(crate) discarded: usize,
    pub(crate) valid_end: u64,
}

/// Replays committed transactions in commit order.
///
/// Records of a transaction are buffered until its Commit is seen; a
/// transaction whose Commit never made it to disk is dropped whole.
pub(crate) fn recover(iter: &mut WalRecordIterator<'_>) -> CoreResult<Recovered> {
    let mut out = Recovered::default();
    let mut open: HashMap<u64, Vec<WalRecord>> = HashMap::new();

    for item in iter.by_ref() {
        let (_, record) = item?;
        let txid = record.txid();
        out.max_txid = out.max_txid.max(txid);
        match record {
            WalRecord::Begin { .. } => {
                open.insert(txid, Vec::new());
            }
            WalRecord::Commit { .. } => {
                if let Some(ops) = open.remove(&txid) {
                    for op in &ops {
                        out.state.apply(op);
                    }
                    out.committed += 1;
                }
            }
            op => {
                if let Some(ops) = open.get_mut(&txid) {
                    ops.push(op);
                }
            }
        }
    }

    out.discarded = open.len();
    out.valid_end = iter.valid_end();
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use karobar_storage::InMemoryBackend;
    use serde_json::json;

    fn doc(name: &str) -> Document {
        let serde_json::Value::Object(m) = json!({"_id": name, "name": name}) else {
            unreachable!()
        };
        m
    }

    fn put(txid: u64, key: &str) -> WalRecord {
        WalRecord::Put {
            txid,
            collection: "parties".into(),
            key: Key::from(key),
            document: doc(key),
        }
    }

    fn encode(records: &[WalRecord]) -> InMemoryBackend {
        let mut buf = Vec::new();
        for r in records {
            r.encode_into(&mut buf).unwrap();
        }
        InMemoryBackend::with_data(buf)
    }

    #[test]
    fn uncommitted_transaction_is_dropped() {
        let backend = encode(&[
            WalRecord::Begin { txid: 1 },
            put(1, "a"),
            WalRecord::Commit { txid: 1 },
            WalRecord::Begin { txid: 2 },
            put(2, "b"),
        ]);
        let mut iter = WalRecordIterator::new(&backend, 0).unwrap();
        let rec = recover(&mut iter).unwrap();

        assert_eq!(rec.committed, 1);
        assert_eq!(rec.discarded, 1);
        assert_eq!(rec.max_txid, 2);
        assert!(rec.state.get("parties", &Key::from("a")).is_some());
        assert!(rec.state.get("parties", &Key::from("b")).is_none());
    }

    #[test]
    fn interleaved_commits_apply_in_commit_order() {
        let backend = encode(&[
            WalRecord::Begin { txid: 1 },
            put(1, "x"),
            WalRecord::Begin { txid: 2 },
            WalRecord::Delete {
                txid: 2,
                collection: "parties".into(),
                key: Key::from("x"),
            },
            WalRecord::Commit { txid: 2 },
            WalRecord::Commit { txid: 1 },
        ]);
        let mut iter = WalRecordIterator::new(&backend, 0).unwrap();
        let rec = recover(&mut iter).unwrap();
        // txn 1 committed last, so its put wins.
        assert_eq!(rec.state.count("parties"), 1);
    }

    #[test]
    fn counters_never_move_backwards() {
        let mut state = StoreState::default();
        assert_eq!(state.next_key("pendingSync"), 1);
        for next in [5, 3] {
            state.apply(&WalRecord::Counter {
                txid: 1,
                collection: "pendingSync".into(),
                next,
            });
        }
        assert_eq!(state.next_key("pendingSync"), 5);
    }

    #[test]
    fn snapshot_replays_to_same_state() {
        let mut state = StoreState::default();
        state.apply(&put(1, "a"));
        state.apply(&put(1, "b"));
        state.apply(&WalRecord::Counter {
            txid: 1,
            collection: "pendingSync".into(),
            next: 42,
        });

        let backend = encode(&state.snapshot(7));
        let mut iter = WalRecordIterator::new(&backend, 0).unwrap();
        let rec = recover(&mut iter).unwrap();
        assert_eq!(rec.committed, 1);
        assert_eq!(rec.state.count("parties"), 2);
        assert_eq!(rec.state.next_key("pendingSync"), 42);
        assert_eq!(rec.max_txid, 7);
    }
}
