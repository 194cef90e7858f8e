//! HTTP transport.
//!
//! [`HttpRemote`] turns a [`RemoteRequest`] into a URL under the remote
//! base URL and hands it to an [`HttpClient`]. The production client is
//! [`ReqwestClient`]; tests plug in their own.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::remote::RemoteApi;
use async_trait::async_trait;
use karobar_sync_protocol::{Method, RemoteRequest, RemoteResponse};
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use url::Url;

/// HTTP client abstraction.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Performs one request and returns whatever the server answered.
    async fn execute(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> SyncResult<RemoteResponse>;

    /// Checks if the client is usable.
    fn is_healthy(&self) -> bool {
        true
    }
}

/// [`RemoteApi`] over HTTP.
pub struct HttpRemote<C: HttpClient> {
    base_url: Url,
    client: C,
    online: AtomicBool,
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpRemote<C> {
    /// Creates a remote rooted at `base_url`.
    pub fn new(base_url: &str, client: C) -> SyncResult<Self> {
        let base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(url::ParseError::RelativeUrlWithCannotBeABaseBase.into());
        }
        Ok(Self {
            base_url,
            client,
            online: AtomicBool::new(true),
            last_error: RwLock::new(None),
        })
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Records the device's connectivity, as reported by the platform.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Returns the last transport error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    /// Resolves a request target against the base URL.
    ///
    /// The target is appended to the base path, so a base of
    /// `https://host/pos` sends `/api/parties` to `https://host/pos/api/parties`.
    pub fn target_url(&self, target: &str) -> SyncResult<Url> {
        let mut joined = self.base_url.as_str().trim_end_matches('/').to_string();
        if !target.starts_with('/') {
            joined.push('/');
        }
        joined.push_str(target);
        Ok(Url::parse(&joined)?)
    }
}

#[async_trait]
impl<C: HttpClient> RemoteApi for HttpRemote<C> {
    async fn send(&self, request: &RemoteRequest) -> SyncResult<RemoteResponse> {
        if !self.is_online() {
            return Err(SyncError::NotConnected);
        }
        let url = self.target_url(&request.path)?;

        match self
            .client
            .execute(request.method, url, request.body.as_ref())
            .await
        {
            Ok(response) => {
                *self.last_error.write() = None;
                tracing::debug!(method = %request.method, url = %request.path, status = response.status, "remote responded");
                Ok(response)
            }
            Err(e) => {
                *self.last_error.write() = Some(e.to_string());
                tracing::debug!(method = %request.method, url = %request.path, error = %e, "remote unreachable");
                Err(e)
            }
        }
    }

    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst) && self.client.is_healthy()
    }
}

/// [`HttpClient`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
    bearer_token: Option<String>,
}

impl ReqwestClient {
    /// Creates a client with a per-request timeout.
    pub fn new(timeout: Duration) -> SyncResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::transport_fatal(e.to_string()))?;
        Ok(Self {
            client,
            bearer_token: None,
        })
    }

    /// Creates a client from the engine configuration.
    pub fn from_config(config: &SyncConfig) -> SyncResult<Self> {
        let client = Self::new(config.request_timeout)?;
        Ok(match &config.session_token {
            Some(token) => client.with_bearer_token(token.clone()),
            None => client,
        })
    }

    /// Sends `token` as `Authorization: Bearer` on every request.
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn execute(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> SyncResult<RemoteResponse> {
        let method = match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        };
        let mut builder = self.client.request(method, url);
        if let Some(token) = &self.bearer_token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status().as_u16();
        let bytes = response.bytes().await.map_err(transport_error)?;
        Ok(RemoteResponse {
            status,
            body: parse_body(&bytes),
        })
    }
}

fn transport_error(e: reqwest::Error) -> SyncError {
    if e.is_timeout() {
        SyncError::Timeout
    } else if e.is_builder() {
        SyncError::transport_fatal(e.to_string())
    } else {
        SyncError::transport_retryable(e.to_string())
    }
}

/// JSON bodies are parsed; anything else is kept as a string for logs.
fn parse_body(bytes: &[u8]) -> Option<Value> {
    if bytes.is_empty() {
        return None;
    }
    Some(
        serde_json::from_slice(bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned())),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use karobar_sync_protocol::endpoints;
    use parking_lot::Mutex;
    use serde_json::json;

    struct TestClient {
        seen: Mutex<Vec<(Method, String)>>,
        fail: AtomicBool,
        healthy: AtomicBool,
    }

    impl TestClient {
        fn new() -> Self {
            Self {
                seen: Mutex::new(Vec::new()),
                fail: AtomicBool::new(false),
                healthy: AtomicBool::new(true),
            }
        }
    }

    #[async_trait]
    impl HttpClient for TestClient {
        async fn execute(
            &self,
            method: Method,
            url: Url,
            _body: Option<&Value>,
        ) -> SyncResult<RemoteResponse> {
            self.seen.lock().push((method, url.to_string()));
            if self.fail.load(Ordering::SeqCst) {
                return Err(SyncError::transport_retryable("connection refused"));
            }
            Ok(RemoteResponse::new(201, json!({"message": "Synced"})))
        }

        fn is_healthy(&self) -> bool {
            self.healthy.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn rejects_unusable_base() {
        assert!(HttpRemote::new("not a url", TestClient::new()).is_err());
        assert!(HttpRemote::new("mailto:ops@example.com", TestClient::new()).is_err());
    }

    #[test]
    fn targets_append_to_base_path() {
        let remote = HttpRemote::new("https://pos.example.com/shop/", TestClient::new()).unwrap();
        let url = remote
            .target_url(&endpoints::delete_target(endpoints::PARTIES, "p 1"))
            .unwrap();
        assert_eq!(url.path(), "/shop/api/parties");
        assert_eq!(url.query(), Some("id=p+1"));
    }

    #[tokio::test]
    async fn send_and_record_errors() {
        let remote = HttpRemote::new("https://pos.example.com", TestClient::new()).unwrap();
        let res = remote.send(&RemoteRequest::get(endpoints::UNITS)).await.unwrap();
        assert_eq!(res.status, 201);
        assert!(remote.last_error().is_none());

        remote.client.fail.store(true, Ordering::SeqCst);
        let err = remote.send(&RemoteRequest::get(endpoints::UNITS)).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(remote.last_error().unwrap().contains("connection refused"));

        let seen = remote.client.seen.lock().clone();
        assert_eq!(seen[0], (Method::Get, "https://pos.example.com/api/units".to_string()));
    }

    #[tokio::test]
    async fn offline_or_unhealthy_short_circuits() {
        let remote = HttpRemote::new("https://pos.example.com", TestClient::new()).unwrap();
        remote.set_online(false);
        assert!(!remote.is_online());
        let err = remote.send(&RemoteRequest::get(endpoints::SYNC)).await.unwrap_err();
        assert!(matches!(err, SyncError::NotConnected));

        remote.set_online(true);
        remote.client.healthy.store(false, Ordering::SeqCst);
        assert!(!remote.is_online());
        assert!(remote.client.seen.lock().is_empty());
    }

    #[test]
    fn body_parsing() {
        assert_eq!(parse_body(b""), None);
        assert_eq!(parse_body(br#"{"a":1}"#), Some(json!({"a": 1})));
        assert_eq!(parse_body(b"Bad Gateway"), Some(json!("Bad Gateway")));
    }
}
