//! Remote API request and response shapes.

use crate::error::{ProtocolError, ProtocolResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    /// Bulk read.
    Get,
    /// Create.
    Post,
    /// Full replace.
    Put,
    /// Delete by id.
    Delete,
}

impl Method {
    /// Upper-case method name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request to the Remote API.
///
/// `path` is relative to the remote base URL and may carry a query.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRequest {
    /// HTTP method.
    pub method: Method,
    /// Path and query.
    pub path: String,
    /// JSON body.
    pub body: Option<Value>,
}

impl RemoteRequest {
    /// A body-less GET.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            body: None,
        }
    }
}

/// A response from the Remote API.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteResponse {
    /// HTTP status code.
    pub status: u16,
    /// Parsed JSON body, if there was one.
    pub body: Option<Value>,
}

impl RemoteResponse {
    /// A response with a body.
    #[must_use]
    pub fn new(status: u16, body: Value) -> Self {
        Self {
            status,
            body: Some(body),
        }
    }

    /// A response without a body.
    #[must_use]
    pub fn empty(status: u16) -> Self {
        Self { status, body: None }
    }

    /// Whether the status is 2xx.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The `message` or `error` field of the body, used in logs.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        let body = self.body.as_ref()?;
        body.get("message")
            .or_else(|| body.get("error"))
            .and_then(Value::as_str)
    }

    /// Decodes the body as `T`.
    pub fn json<T: DeserializeOwned>(&self, path: &str) -> ProtocolResult<T> {
        let body = self.body.clone().ok_or_else(|| ProtocolError::MissingBody {
            path: path.to_string(),
        })?;
        Ok(serde_json::from_value(body)?)
    }
}
