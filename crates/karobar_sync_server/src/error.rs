//! Error types for the reference server.

use karobar_sync_protocol::RemoteResponse;
use serde_json::json;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors raised while handling a request.
///
/// Every variant except [`ServerError::ConnectionLost`] maps onto an HTTP
/// status via [`ServerError::status`].
#[derive(Error, Debug)]
pub enum ServerError {
    /// Malformed body or missing required field.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Missing, forged or expired session token.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// No such route.
    #[error("no route for {method} {path}")]
    UnknownRoute {
        /// Request method.
        method: String,
        /// Request path.
        path: String,
    },

    /// Target entity does not exist in this business.
    #[error("{collection} {id} not found")]
    NotFound {
        /// Collection name.
        collection: String,
        /// Entity identifier.
        id: String,
    },

    /// Identifier already taken in this business.
    #[error("{collection} {id} already exists")]
    Conflict {
        /// Collection name.
        collection: String,
        /// Entity identifier.
        id: String,
    },

    /// Fault injected to simulate a server crash.
    #[error("internal error: {0}")]
    Internal(String),

    /// The request was applied but the response never reached the client.
    #[error("connection lost before the response was sent")]
    ConnectionLost,
}

impl ServerError {
    /// HTTP status for this error.
    pub fn status(&self) -> u16 {
        match self {
            ServerError::InvalidRequest(_) => 400,
            ServerError::Unauthorized(_) => 401,
            ServerError::UnknownRoute { .. } | ServerError::NotFound { .. } => 404,
            ServerError::Conflict { .. } => 409,
            ServerError::Internal(_) | ServerError::ConnectionLost => 500,
        }
    }

    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status())
    }

    /// Renders the error as a `{ "message": ... }` response.
    pub fn to_response(&self) -> RemoteResponse {
        RemoteResponse::new(self.status(), json!({ "message": self.to_string() }))
    }
}
