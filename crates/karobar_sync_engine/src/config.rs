//! Configuration for the sync engine.

use karobar_sync_protocol::endpoints;
use std::time::Duration;

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Base URL of the Remote API, e.g. `https://pos.example.com`.
    pub server_url: String,
    /// Opaque session credential sent as a bearer token.
    pub session_token: Option<String>,
    /// Period of the drain timer.
    pub poll_interval: Duration,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Rejections after which a task is dead-lettered; `None` never does.
    pub max_rejections: Option<u32>,
    /// Path of the consolidated bootstrap snapshot.
    pub snapshot_path: String,
}

impl SyncConfig {
    /// Creates a configuration for `server_url` with default timings.
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            session_token: None,
            poll_interval: Duration::from_secs(2),
            request_timeout: Duration::from_secs(30),
            max_rejections: Some(10),
            snapshot_path: endpoints::SYNC.to_string(),
        }
    }

    /// Sets the session credential.
    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    /// Sets the drain period.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the dead-letter threshold.
    pub fn with_max_rejections(mut self, max: Option<u32>) -> Self {
        self.max_rejections = max;
        self
    }

    /// Sets the bootstrap snapshot path.
    pub fn with_snapshot_path(mut self, path: impl Into<String>) -> Self {
        self.snapshot_path = path.into();
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new("")
    }
}
