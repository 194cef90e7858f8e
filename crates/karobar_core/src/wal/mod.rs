//! Write-ahead log.
//!
//! Every transaction is appended as `Begin`, its `Put` / `Delete` /
//! `Counter` records, then `Commit`, in a single write. On open the log is
//! replayed and only transactions with a `Commit` are applied.

mod iterator;
mod record;
mod writer;

pub use iterator::WalRecordIterator;
pub use record::{compute_crc32, WalRecord, WalRecordType, WAL_MAGIC, WAL_VERSION};
pub use writer::WalWriter;
