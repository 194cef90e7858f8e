//! The Remote API seam.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use karobar_sync_protocol::{RemoteRequest, RemoteResponse};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Sends requests to the Remote API.
///
/// A response with any status is `Ok`; `Err` means the request may or
/// may not have reached the remote (connection refused, timeout, reset).
/// Every call is a suspension point.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Sends one request.
    async fn send(&self, request: &RemoteRequest) -> SyncResult<RemoteResponse>;

    /// Whether the device currently believes it is online.
    fn is_online(&self) -> bool;
}

/// A scripted reply for [`MockRemote`].
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Answer with this response.
    Respond(RemoteResponse),
    /// Answer with this status and a small message body.
    Status(u16),
    /// Fail at the transport level.
    Fail(String),
}

/// A remote for testing.
///
/// Replies are consumed in order; once the script runs out every request
/// gets a 200.
#[derive(Debug)]
pub struct MockRemote {
    online: AtomicBool,
    replies: Mutex<VecDeque<MockReply>>,
    calls: Mutex<Vec<RemoteRequest>>,
    latency: Mutex<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockRemote {
    /// Creates an online mock with an empty script.
    pub fn new() -> Self {
        Self {
            online: AtomicBool::new(true),
            replies: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            latency: Mutex::new(Duration::ZERO),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Sets the connectivity flag.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Appends a reply to the script.
    pub fn push_reply(&self, reply: MockReply) {
        self.replies.lock().push_back(reply);
    }

    /// Appends several status replies.
    pub fn push_statuses(&self, statuses: impl IntoIterator<Item = u16>) {
        self.replies
            .lock()
            .extend(statuses.into_iter().map(MockReply::Status));
    }

    /// Delays every reply by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// Every request received so far.
    pub fn calls(&self) -> Vec<RemoteRequest> {
        self.calls.lock().clone()
    }

    /// Number of requests received so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Highest number of requests that were in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Default for MockRemote {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteApi for MockRemote {
    async fn send(&self, request: &RemoteRequest) -> SyncResult<RemoteResponse> {
        if !self.is_online() {
            return Err(SyncError::NotConnected);
        }
        self.calls.lock().push(request.clone());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let reply = self.replies.lock().pop_front();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match reply {
            None => Ok(RemoteResponse::new(200, json!({ "message": "ok" }))),
            Some(MockReply::Respond(response)) => Ok(response),
            Some(MockReply::Status(status)) => Ok(RemoteResponse::new(
                status,
                json!({ "message": format!("mock status {status}") }),
            )),
            Some(MockReply::Fail(message)) => Err(SyncError::transport_retryable(message)),
        }
    }

    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use karobar_sync_protocol::endpoints;

    #[tokio::test]
    async fn offline_mock_refuses() {
        let remote = MockRemote::new();
        remote.set_online(false);
        let err = remote
            .send(&RemoteRequest::get(endpoints::PARTIES))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::NotConnected));
        assert_eq!(remote.call_count(), 0);
    }

    #[tokio::test]
    async fn script_then_default() {
        let remote = MockRemote::new();
        remote.push_statuses([409]);
        remote.push_reply(MockReply::Fail("reset".into()));

        let req = RemoteRequest::get(endpoints::UNITS);
        assert_eq!(remote.send(&req).await.unwrap().status, 409);
        assert!(remote.send(&req).await.unwrap_err().is_retryable());
        assert_eq!(remote.send(&req).await.unwrap().status, 200);
        assert_eq!(remote.call_count(), 3);
        assert_eq!(remote.max_in_flight(), 1);
    }
}
