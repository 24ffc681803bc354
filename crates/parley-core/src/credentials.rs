//! Bearer credentials and the lookup capability that produces them.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;

use crate::error::CredentialError;

/// An opaque bearer token.
///
/// `Debug` never prints the token value.
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    value: String,
    expires_at: Option<SystemTime>,
}

impl Token {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            expires_at: None,
        }
    }

    /// Marks the token as expiring `ttl` from now.
    pub fn expires_in(mut self, ttl: Duration) -> Self {
        self.expires_at = SystemTime::now().checked_add(ttl);
        self
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn expires_at(&self) -> Option<SystemTime> {
        self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|at| at <= SystemTime::now())
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Looks up bearer credentials.
///
/// How tokens are acquired or refreshed is up to the implementation.
#[async_trait]
pub trait CredentialProvider: Send + Sync + 'static {
    /// The token a user holds for an OAuth connection.
    async fn user_token(
        &self,
        channel_id: &str,
        user_id: &str,
        connection_name: &str,
    ) -> Result<Token, CredentialError>;

    /// The bot's own token, optionally scoped to a tenant.
    async fn app_token(&self, tenant_id: Option<&str>) -> Result<Token, CredentialError>;
}

pub type BoxedCredentialProvider = Arc<dyn CredentialProvider>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_value() {
        let token = Token::new("secret-value");
        let printed = format!("{token:?}");
        assert!(!printed.contains("secret-value"));
        assert_eq!(token.value(), "secret-value");
    }

    #[test]
    fn expiry() {
        assert!(!Token::new("a").is_expired());
        assert!(Token::new("a").expires_in(Duration::ZERO).is_expired());
        assert!(!Token::new("a").expires_in(Duration::from_secs(60)).is_expired());
    }
}
