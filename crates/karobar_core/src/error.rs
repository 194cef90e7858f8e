//! Error types for the Karobar local store.

use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised by the local store, the sync queue and repositories.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] karobar_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Sync task could not be encoded or decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] karobar_sync_protocol::ProtocolError),

    /// Entity JSON could not be converted.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A WAL payload could not be encoded or decoded.
    #[error("encoding error: {message}")]
    Encoding {
        /// Description of the failure.
        message: String,
    },

    /// WAL is corrupted or invalid.
    #[error("WAL corruption: {message}")]
    WalCorruption {
        /// Description of the corruption.
        message: String,
    },

    /// Checksum mismatch detected.
    #[error("checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Stored checksum.
        expected: u32,
        /// Computed checksum.
        actual: u32,
    },

    /// The collection is not part of the schema.
    #[error("collection not found: {name}")]
    CollectionNotFound {
        /// Collection name.
        name: String,
    },

    /// A transaction touched a collection it did not declare.
    #[error("collection {name} is not in the transaction scope")]
    CollectionNotInScope {
        /// Collection name.
        name: String,
    },

    /// A document lacks its key field.
    #[error("document for {collection} has no `{key_path}` field")]
    MissingKey {
        /// Collection name.
        collection: String,
        /// Key field name.
        key_path: String,
    },

    /// A key field holds something other than a string or unsigned integer.
    #[error("document for {collection} has an invalid `{key_path}` field")]
    InvalidKey {
        /// Collection name.
        collection: String,
        /// Key field name.
        key_path: String,
    },

    /// No entity with this identifier exists.
    #[error("entity not found: {id} in {collection}")]
    EntityNotFound {
        /// Collection name.
        collection: String,
        /// Entity identifier.
        id: String,
    },

    /// Another process holds the store directory.
    #[error("store locked: another process has exclusive access")]
    StoreLocked,

    /// The store directory is missing or malformed.
    #[error("invalid store format: {message}")]
    InvalidFormat {
        /// Description of the problem.
        message: String,
    },

    /// Operation not permitted in the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },

    /// The store has been closed.
    #[error("store is closed")]
    StoreClosed,
}

impl CoreError {
    /// Creates an encoding error.
    pub fn encoding(message: impl Into<String>) -> Self {
        Self::Encoding {
            message: message.into(),
        }
    }

    /// Creates a WAL corruption error.
    pub fn wal_corruption(message: impl Into<String>) -> Self {
        Self::WalCorruption {
            message: message.into(),
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates an entity not found error.
    pub fn entity_not_found(collection: &str, id: impl Into<String>) -> Self {
        Self::EntityNotFound {
            collection: collection.to_string(),
            id: id.into(),
        }
    }

    /// Whether retrying the same operation later may succeed.
    ///
    /// I/O trouble and a lock held by another process are transient;
    /// schema and data errors are not.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Io(_) | Self::StoreLocked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_entity() {
        let err = CoreError::entity_not_found("parties", "p-1");
        assert_eq!(err.to_string(), "entity not found: p-1 in parties");
    }

    #[test]
    fn retryable_classification() {
        assert!(CoreError::StoreLocked.is_retryable());
        assert!(CoreError::from(io::Error::other("disk")).is_retryable());
        assert!(!CoreError::CollectionNotInScope {
            name: "units".into()
        }
        .is_retryable());
        assert!(!CoreError::StoreClosed.is_retryable());
    }
}
