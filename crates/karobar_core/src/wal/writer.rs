//! WAL writer.

use crate::error::CoreResult;
use crate::wal::iterator::WalRecordIterator;
use karobar_storage::StorageBackend;
use parking_lot::Mutex;

/// Owns the WAL backend and serializes access to it.
pub struct WalWriter {
    backend: Mutex<Box<dyn StorageBackend>>,
    sync_on_commit: bool,
}

impl WalWriter {
    /// Wraps a backend.
    pub fn new(backend: Box<dyn StorageBackend>, sync_on_commit: bool) -> Self {
        Self {
            backend: Mutex::new(backend),
            sync_on_commit,
        }
    }

    /// Appends one encoded transaction and makes it durable.
    ///
    /// Either the whole batch lands or the log is truncated back to where
    /// it was, so a failed commit never leaves a partial transaction that
    /// later appends would sit behind.
    pub fn append_batch(&self, batch: &[u8]) -> CoreResult<u64> {
        let mut backend = self.backend.lock();
        let mark = backend.size()?;
        let result = backend.append(batch).and_then(|offset| {
            backend.flush()?;
            if self.sync_on_commit {
                backend.sync()?;
            }
            Ok(offset)
        });
        match result {
            Ok(offset) => Ok(offset),
            Err(e) => {
                if let Err(undo) = backend.truncate(mark) {
                    tracing::error!(error = %undo, mark, "failed to roll back torn WAL append");
                }
                Err(e.into())
            }
        }
    }

    /// Runs `f` over a record iterator while holding the backend.
    pub fn scan<T>(
        &self,
        f: impl FnOnce(&mut WalRecordIterator<'_>) -> CoreResult<T>,
    ) -> CoreResult<T> {
        let backend = self.backend.lock();
        let mut iter = WalRecordIterator::new(backend.as_ref(), 0)?;
        f(&mut iter)
    }

    /// Discards everything after `offset`.
    pub fn truncate(&self, offset: u64) -> CoreResult<()> {
        self.backend.lock().truncate(offset)?;
        Ok(())
    }

    /// Swaps the whole log for `data`.
    pub fn replace(&self, data: &[u8]) -> CoreResult<()> {
        self.backend.lock().replace(data)?;
        Ok(())
    }

    /// Flushes and fsyncs the log.
    pub fn sync(&self) -> CoreResult<()> {
        let mut backend = self.backend.lock();
        backend.flush()?;
        backend.sync()?;
        Ok(())
    }

    /// Current log size in bytes.
    pub fn size(&self) -> CoreResult<u64> {
        Ok(self.backend.lock().size()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wal::WalRecord;
    use karobar_storage::{InMemoryBackend, StorageError, StorageResult};

    /// Accepts appends until `budget` bytes have been written, then fails.
    struct FailingBackend {
        inner: InMemoryBackend,
        budget: usize,
    }

    impl StorageBackend for FailingBackend {
        fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
            self.inner.read_at(offset, len)
        }
        fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
            if data.len() > self.budget {
                // Simulate a short write before the error.
                self.inner.append(&data[..self.budget])?;
                return Err(StorageError::Io(std::io::Error::other("disk full")));
            }
            self.budget -= data.len();
            self.inner.append(data)
        }
        fn flush(&mut self) -> StorageResult<()> {
            Ok(())
        }
        fn sync(&mut self) -> StorageResult<()> {
            Ok(())
        }
        fn size(&self) -> StorageResult<u64> {
            self.inner.size()
        }
        fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
            self.inner.truncate(new_size)
        }
        fn replace(&mut self, data: &[u8]) -> StorageResult<()> {
            self.inner.replace(data)
        }
    }

    fn batch(txid: u64) -> Vec<u8> {
        let mut buf = Vec::new();
        WalRecord::Begin { txid }.encode_into(&mut buf).unwrap();
        WalRecord::Commit { txid }.encode_into(&mut buf).unwrap();
        buf
    }

    #[test]
    fn batches_append_in_order() {
        let wal = WalWriter::new(Box::new(InMemoryBackend::new()), true);
        let first = wal.append_batch(&batch(1)).unwrap();
        let second = wal.append_batch(&batch(2)).unwrap();
        assert_eq!(first, 0);
        assert_eq!(second, batch(1).len() as u64);

        let txids = wal
            .scan(|iter| iter.map(|r| r.map(|(_, rec)| rec.txid())).collect::<CoreResult<Vec<_>>>())
            .unwrap();
        assert_eq!(txids, vec![1, 1, 2, 2]);
    }

    #[test]
    fn failed_append_is_rolled_back() {
        let inner = InMemoryBackend::new();
        let observer = inner.clone();
        let first = batch(1);
        let wal = WalWriter::new(
            Box::new(FailingBackend {
                inner,
                budget: first.len() + 3,
            }),
            false,
        );

        wal.append_batch(&first).unwrap();
        assert!(wal.append_batch(&batch(2)).is_err());
        assert_eq!(observer.data(), first);
    }
}
