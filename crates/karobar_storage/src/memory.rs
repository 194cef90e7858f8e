//! In-memory backend.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::sync::Arc;

/// A log held in memory.
///
/// Clones share the same buffer, which lets tests keep a handle on the
/// bytes of a store they have dropped and reopen it, the in-memory
/// equivalent of a process restart.
///
/// ```rust
/// use karobar_storage::{InMemoryBackend, StorageBackend};
///
/// let mut backend = InMemoryBackend::new();
/// let survivor = backend.clone();
/// backend.append(b"abc").unwrap();
/// drop(backend);
/// assert_eq!(survivor.size().unwrap(), 3);
/// ```
#[derive(Debug, Default, Clone)]
pub struct InMemoryBackend {
    data: Arc<RwLock<Vec<u8>>>,
}

impl InMemoryBackend {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a log preloaded with `data`.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(RwLock::new(data)),
        }
    }

    /// Returns a copy of the raw log bytes.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.data.read().clone()
    }
}

impl StorageBackend for InMemoryBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let data = self.data.read();
        let size = data.len() as u64;
        let end = offset.saturating_add(len as u64);
        if end > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }
        Ok(data[offset as usize..end as usize].to_vec())
    }

    fn append(&mut self, bytes: &[u8]) -> StorageResult<u64> {
        let mut data = self.data.write();
        let offset = data.len() as u64;
        data.extend_from_slice(bytes);
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.data.read().len() as u64)
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let mut data = self.data.write();
        let size = data.len() as u64;
        if new_size > size {
            return Err(StorageError::InvalidTruncate {
                requested: new_size,
                size,
            });
        }
        data.truncate(new_size as usize);
        Ok(())
    }

    fn replace(&mut self, bytes: &[u8]) -> StorageResult<()> {
        let mut data = self.data.write();
        data.clear();
        data.extend_from_slice(bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_returns_running_offsets() {
        let mut backend = InMemoryBackend::new();
        assert_eq!(backend.append(b"party").unwrap(), 0);
        assert_eq!(backend.append(b"task").unwrap(), 5);
        assert_eq!(backend.size().unwrap(), 9);
        assert_eq!(backend.read_at(5, 4).unwrap(), b"task");
    }

    #[test]
    fn read_past_end_is_rejected() {
        let mut backend = InMemoryBackend::new();
        backend.append(b"abc").unwrap();
        assert!(matches!(
            backend.read_at(2, 5),
            Err(StorageError::ReadPastEnd { .. })
        ));
        assert!(backend.read_at(3, 0).unwrap().is_empty());
    }

    #[test]
    fn truncate_rolls_back_tail() {
        let mut backend = InMemoryBackend::new();
        backend.append(b"committed").unwrap();
        let mark = backend.size().unwrap();
        backend.append(b"half-written").unwrap();
        backend.truncate(mark).unwrap();
        assert_eq!(backend.data(), b"committed");
        assert!(matches!(
            backend.truncate(100),
            Err(StorageError::InvalidTruncate { .. })
        ));
    }

    #[test]
    fn clones_share_the_buffer() {
        let mut writer = InMemoryBackend::new();
        let reader = writer.clone();
        writer.append(b"shared").unwrap();
        assert_eq!(reader.data(), b"shared");
    }

    #[test]
    fn replace_swaps_content() {
        let mut backend = InMemoryBackend::with_data(b"old log".to_vec());
        backend.replace(b"snapshot").unwrap();
        assert_eq!(backend.data(), b"snapshot");
        assert_eq!(backend.size().unwrap(), 8);
    }
}
