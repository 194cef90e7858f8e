//! Protocol errors.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while decoding protocol values.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// JSON encoding or decoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A stored task is structurally invalid.
    #[error("invalid sync task: {0}")]
    InvalidTask(String),

    /// A response that should carry a body had none.
    #[error("response to {path} has no body")]
    MissingBody {
        /// Request path.
        path: String,
    },
}

impl ProtocolError {
    /// Creates an invalid task error.
    pub fn invalid_task(message: impl Into<String>) -> Self {
        Self::InvalidTask(message.into())
    }
}
