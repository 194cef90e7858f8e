//! Server configuration.

use std::time::Duration;

/// Configuration for the reference server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Whether requests must carry a signed session token.
    pub require_auth: bool,
    /// Secret used to sign session tokens.
    pub auth_secret: Option<Vec<u8>>,
    /// How long an issued token stays valid.
    pub token_expiry: Duration,
    /// Business scope used when authentication is off.
    pub default_business: String,
}

impl ServerConfig {
    /// Creates a configuration without authentication.
    pub fn new() -> Self {
        Self {
            require_auth: false,
            auth_secret: None,
            token_expiry: Duration::from_secs(30 * 24 * 60 * 60),
            default_business: "default".to_string(),
        }
    }

    /// Requires tokens signed with `secret`.
    pub fn with_auth(mut self, secret: Vec<u8>) -> Self {
        self.require_auth = true;
        self.auth_secret = Some(secret);
        self
    }

    /// Sets the token lifetime.
    pub fn with_token_expiry(mut self, expiry: Duration) -> Self {
        self.token_expiry = expiry;
        self
    }

    /// Sets the business scope used without authentication.
    pub fn with_default_business(mut self, business_id: impl Into<String>) -> Self {
        self.default_business = business_id.into();
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}
