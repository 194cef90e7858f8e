//! Error types for the sync engine.

use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// Malformed task or response body.
    #[error("protocol error: {0}")]
    Protocol(#[from] karobar_sync_protocol::ProtocolError),

    /// The remote refused the session credential.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The remote answered with a non-success status.
    #[error("server returned {status}: {message}")]
    ServerError {
        /// HTTP status.
        status: u16,
        /// Message from the body, if any.
        message: String,
    },

    /// Local store error.
    #[error("database error: {0}")]
    Database(#[from] karobar_core::CoreError),

    /// Base URL or request target did not parse.
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// A drain was requested while one is in flight.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },

    /// The background loop stopped abnormally.
    #[error("sync cancelled")]
    Cancelled,

    /// Timeout.
    #[error("operation timed out")]
    Timeout,

    /// The device is offline.
    #[error("not connected to server")]
    NotConnected,
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if trying again unchanged may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Timeout | SyncError::NotConnected => true,
            SyncError::ServerError { status, .. } => {
                matches!(status, 408 | 429 | 500..=599)
            }
            SyncError::Database(e) => e.is_retryable(),
            SyncError::InvalidStateTransition { .. } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::transport_retryable("connection reset").is_retryable());
        assert!(!SyncError::transport_fatal("invalid certificate").is_retryable());
        assert!(SyncError::Timeout.is_retryable());
        assert!(SyncError::NotConnected.is_retryable());
        assert!(SyncError::ServerError {
            status: 503,
            message: "down".into()
        }
        .is_retryable());
        assert!(!SyncError::ServerError {
            status: 404,
            message: "Business not found".into()
        }
        .is_retryable());
        assert!(!SyncError::AuthenticationFailed("expired".into()).is_retryable());
        assert!(!SyncError::Cancelled.is_retryable());
    }

    #[test]
    fn error_display() {
        assert_eq!(SyncError::NotConnected.to_string(), "not connected to server");
        let err = SyncError::ServerError {
            status: 500,
            message: "Sync failed".into(),
        };
        assert_eq!(err.to_string(), "server returned 500: Sync failed");
    }
}
