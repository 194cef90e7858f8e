//! Session tokens.
//!
//! A token binds a business id to the time it was issued:
//!
//! ```text
//! <business_id>.<issued_at_ms>.<hex HMAC-SHA256 of "<business_id>.<issued_at_ms>">
//! ```
//!
//! Clients treat it as opaque and send it as `Authorization: Bearer`.

use crate::error::{ServerError, ServerResult};
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

/// Authentication configuration.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Secret key for HMAC.
    pub secret: Vec<u8>,
    /// Token expiration duration.
    pub token_expiry: Duration,
}

impl AuthConfig {
    /// Creates a new auth configuration with a 30 day expiry.
    pub fn new(secret: Vec<u8>) -> Self {
        Self {
            secret,
            token_expiry: Duration::from_secs(30 * 24 * 60 * 60),
        }
    }

    /// Sets the token expiration duration.
    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.token_expiry = expiry;
        self
    }
}

/// Issues and checks session tokens.
#[derive(Clone)]
pub struct TokenValidator {
    config: AuthConfig,
}

impl TokenValidator {
    /// Creates a new token validator.
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    /// Issues a token scoped to `business_id`.
    pub fn create_token(&self, business_id: &str) -> ServerResult<String> {
        let claims = format!("{business_id}.{}", Utc::now().timestamp_millis());
        let signature = self.mac()?.chain_update(claims.as_bytes()).finalize();
        Ok(format!("{claims}.{}", hex::encode(signature.into_bytes())))
    }

    /// Checks `token` and returns the business it is scoped to.
    pub fn validate_token(&self, token: &str) -> ServerResult<String> {
        let (claims, signature) = token
            .rsplit_once('.')
            .ok_or_else(|| ServerError::Unauthorized("malformed token".into()))?;
        let (business_id, issued_at) = claims
            .rsplit_once('.')
            .ok_or_else(|| ServerError::Unauthorized("malformed token".into()))?;

        let signature = hex::decode(signature)
            .map_err(|_| ServerError::Unauthorized("malformed signature".into()))?;
        self.mac()?
            .chain_update(claims.as_bytes())
            .verify_slice(&signature)
            .map_err(|_| ServerError::Unauthorized("invalid signature".into()))?;

        let issued_at: i64 = issued_at
            .parse()
            .map_err(|_| ServerError::Unauthorized("malformed timestamp".into()))?;
        let expiry = i64::try_from(self.config.token_expiry.as_millis()).unwrap_or(i64::MAX);
        if Utc::now().timestamp_millis() > issued_at.saturating_add(expiry) {
            return Err(ServerError::Unauthorized("token expired".into()));
        }

        if business_id.is_empty() {
            return Err(ServerError::Unauthorized("token has no business".into()));
        }
        Ok(business_id.to_string())
    }

    fn mac(&self) -> ServerResult<HmacSha256> {
        HmacSha256::new_from_slice(&self.config.secret)
            .map_err(|e| ServerError::Internal(format!("bad auth secret: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> TokenValidator {
        TokenValidator::new(AuthConfig::new(b"test-secret-key-32-bytes-long!!".to_vec()))
    }

    #[test]
    fn create_and_validate_token() {
        let v = validator();
        let token = v.create_token("biz-1").unwrap();
        assert_eq!(v.validate_token(&token).unwrap(), "biz-1");
    }

    #[test]
    fn business_ids_may_contain_dots() {
        let v = validator();
        let token = v.create_token("ali.traders").unwrap();
        assert_eq!(v.validate_token(&token).unwrap(), "ali.traders");
    }

    #[test]
    fn reject_tampered_business() {
        let v = validator();
        let token = v.create_token("biz-1").unwrap();
        let forged = token.replacen("biz-1", "biz-2", 1);
        assert!(matches!(
            v.validate_token(&forged),
            Err(ServerError::Unauthorized(_))
        ));
    }

    #[test]
    fn reject_other_secret() {
        let token = validator().create_token("biz-1").unwrap();
        let other = TokenValidator::new(AuthConfig::new(b"another-secret".to_vec()));
        assert!(other.validate_token(&token).is_err());
    }

    #[test]
    fn reject_garbage() {
        let v = validator();
        assert!(v.validate_token("").is_err());
        assert!(v.validate_token("no-dots").is_err());
        assert!(v.validate_token("a.b.zz").is_err());
    }

    #[test]
    fn reject_expired_token() {
        let v = TokenValidator::new(
            AuthConfig::new(b"test-secret-key-32-bytes-long!!".to_vec())
                .with_expiry(Duration::from_secs(0)),
        );
        let token = v.create_token("biz-1").unwrap();
        std::thread::sleep(Duration::from_millis(10));
        assert!(v.validate_token(&token).is_err());
    }
}
