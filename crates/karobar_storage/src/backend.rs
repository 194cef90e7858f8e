//! The storage backend trait.

use crate::error::StorageResult;

/// An append-only byte log.
///
/// The local store writes every transaction as a run of framed records
/// through this trait and replays the whole log when it opens. Backends
/// never interpret the bytes.
///
/// # Invariants
///
/// - `append` returns the offset at which the data starts
/// - `read_at` returns exactly the bytes previously appended there
/// - after `sync` returns, every appended byte survives a process crash
/// - `truncate` only shrinks; it is how a failed commit is rolled back
/// - `replace` swaps the whole content atomically: a crash leaves either
///   the old content or the new one, never a mix
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::ReadPastEnd`] if the range is not
    /// fully inside the log.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends `data` and returns the offset it was written at.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Pushes buffered writes to the operating system.
    fn flush(&mut self) -> StorageResult<()>;

    /// Makes all appended data and metadata durable.
    fn sync(&mut self) -> StorageResult<()>;

    /// Returns the current log size, which is also the next append offset.
    fn size(&self) -> StorageResult<u64>;

    /// Shrinks the log to `new_size` bytes.
    ///
    /// # Errors
    ///
    /// Fails with [`crate::StorageError::InvalidTruncate`] if `new_size`
    /// is larger than the current size.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;

    /// Atomically replaces the whole log with `data`.
    ///
    /// Used by log compaction.
    fn replace(&mut self, data: &[u8]) -> StorageResult<()>;
}
