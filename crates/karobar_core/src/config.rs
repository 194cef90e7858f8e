//! Store configuration.

use crate::types::Schema;

/// Configuration for opening a local store.
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether to create the store directory if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether to fsync the WAL on every commit.
    pub sync_on_commit: bool,

    /// WAL size that triggers compaction after a commit (0 = never).
    pub max_wal_size: u64,

    /// Collections exposed by the store.
    pub schema: Schema,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            sync_on_commit: true,
            max_wal_size: 8 * 1024 * 1024, // 8 MB
            schema: Schema::default(),
        }
    }
}

impl Config {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the store if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to fsync on every commit.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }

    /// Sets the compaction threshold.
    #[must_use]
    pub const fn max_wal_size(mut self, size: u64) -> Self {
        self.max_wal_size = size;
        self
    }

    /// Replaces the collection schema.
    #[must_use]
    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }
}
