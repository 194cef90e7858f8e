//! Store and engine setup shared by the commands.

use karobar_core::{Config, LocalStore};
use karobar_sync_engine::{HttpRemote, ReqwestClient, SyncConfig, SyncEngine};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Engine over the production HTTP transport.
pub type Engine = SyncEngine<HttpRemote<ReqwestClient>>;

/// Where and how to reach the remote API.
#[derive(Debug, Clone)]
pub struct Remote {
    /// Base URL.
    pub url: String,
    /// Bearer session token.
    pub token: Option<String>,
}

/// Opens the store at `path`.
///
/// Only `bootstrap` may create a missing store; every other command
/// expects one to exist already.
pub fn open_store(path: &Path, create: bool) -> Result<Arc<LocalStore>, Box<dyn std::error::Error>> {
    if !create && !path.exists() {
        return Err(format!("No store found at {}", path.display()).into());
    }
    let config = Config::default().create_if_missing(create);
    Ok(Arc::new(LocalStore::open_with_config(path, config)?))
}

/// Builds an engine for `store` talking to `remote`.
pub fn engine(
    store: Arc<LocalStore>,
    remote: &Remote,
    poll_interval: Option<Duration>,
) -> Result<Engine, Box<dyn std::error::Error>> {
    let mut config = SyncConfig::new(remote.url.as_str());
    if let Some(token) = &remote.token {
        config = config.with_session_token(token.as_str());
    }
    if let Some(interval) = poll_interval {
        config = config.with_poll_interval(interval);
    }

    let client = ReqwestClient::from_config(&config)?;
    let http = HttpRemote::new(&config.server_url, client)?;
    Ok(SyncEngine::new(config, store, Arc::new(http)))
}
