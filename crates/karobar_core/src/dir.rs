//! Store directory management.
//!
//! ```text
//! <store_path>/
//! ├─ LOCK               # Advisory lock for single-writer
//! ├─ store.wal          # Write-ahead log
//! └─ store.wal.compact  # Present only while a compaction is in flight
//! ```
//!
//! The LOCK file ensures only one process writes to the store at a time.

use crate::error::{CoreError, CoreResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const WAL_FILE: &str = "store.wal";
const STAGING_FILE: &str = "store.wal.compact";

/// An opened store directory holding the exclusive lock.
///
/// The lock is released when this value is dropped.
#[derive(Debug)]
pub struct StoreDir {
    path: PathBuf,
    _lock_file: File,
}

impl StoreDir {
    /// Opens (or creates) a store directory and takes its lock.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidFormat`] if the directory is missing and
    ///   `create_if_missing` is false, or the path is not a directory
    /// - [`CoreError::StoreLocked`] if another process holds the lock
    pub fn open(path: &Path, create_if_missing: bool) -> CoreResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(CoreError::invalid_format(format!(
                    "store directory does not exist: {}",
                    path.display()
                )));
            }
        }
        if !path.is_dir() {
            return Err(CoreError::invalid_format(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::StoreLocked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the WAL file.
    #[must_use]
    pub fn wal_path(&self) -> PathBuf {
        self.path.join(WAL_FILE)
    }

    /// Deletes a compaction output left behind by a crash.
    ///
    /// The rename had not happened yet, so the WAL itself is intact.
    pub fn remove_stale_staging(&self) -> CoreResult<()> {
        let staging = self.path.join(STAGING_FILE);
        if staging.exists() {
            tracing::warn!(path = %staging.display(), "removing interrupted compaction output");
            fs::remove_file(staging)?;
        }
        Ok(())
    }
}
