//! Per-tenant cache of app tokens.
//!
//! Every dispatch needs the app's own token for the activity's tenant;
//! fetching it once per activity would put the credential provider on the
//! hot path. Entries live until the token's own expiry or the configured
//! TTL, whichever comes first, and concurrent misses for the same tenant
//! share a single provider call.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use moka::Expiry;
use moka::future::Cache;
use tracing::{debug, trace};

use parley_core::{CredentialProvider, Token};

use crate::config::CredentialsConfig;

/// Cache key for activities without a tenant.
const NO_TENANT: &str = "";

struct TokenExpiry;

impl Expiry<String, Token> for TokenExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        token: &Token,
        _created_at: Instant,
    ) -> Option<Duration> {
        token
            .expires_at()
            .map(|at| at.duration_since(SystemTime::now()).unwrap_or(Duration::ZERO))
    }
}

#[derive(Clone)]
pub struct CredentialCache {
    tokens: Cache<String, Token>,
}

impl CredentialCache {
    pub fn new(config: &CredentialsConfig) -> Self {
        Self {
            tokens: Cache::builder()
                .max_capacity(config.cache_capacity)
                .time_to_live(Duration::from_secs(config.ttl_secs))
                .expire_after(TokenExpiry)
                .build(),
        }
    }

    /// The app token for `tenant_id`, fetched through `provider` on a miss.
    ///
    /// Provider failures are not cached and resolve to `None`.
    pub async fn app_token(
        &self,
        provider: &Arc<dyn CredentialProvider>,
        tenant_id: Option<&str>,
    ) -> Option<Token> {
        let key = tenant_id.unwrap_or(NO_TENANT).to_owned();

        if let Some(token) = self.tokens.get(&key).await {
            if !token.is_expired() {
                trace!(tenant = ?tenant_id, "app token cache hit");
                return Some(token);
            }
            self.tokens.invalidate(&key).await;
        }

        let provider = provider.clone();
        let tenant = tenant_id.map(str::to_owned);
        self.tokens
            .try_get_with(key, async move { provider.app_token(tenant.as_deref()).await })
            .await
            .inspect_err(|err| debug!(tenant = ?tenant_id, %err, "app token unavailable"))
            .ok()
    }

    pub async fn invalidate(&self, tenant_id: Option<&str>) {
        self.tokens.invalidate(tenant_id.unwrap_or(NO_TENANT)).await;
    }

    /// Approximate number of cached tokens.
    pub async fn len(&self) -> u64 {
        self.tokens.run_pending_tasks().await;
        self.tokens.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use parley_core::CredentialError;

    use super::*;

    #[derive(Default)]
    struct CountingProvider {
        calls: AtomicUsize,
        fail: bool,
        ttl: Option<Duration>,
    }

    #[async_trait]
    impl CredentialProvider for CountingProvider {
        async fn user_token(&self, _: &str, _: &str, _: &str) -> Result<Token, CredentialError> {
            Err(CredentialError::NotSignedIn)
        }

        async fn app_token(&self, tenant_id: Option<&str>) -> Result<Token, CredentialError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(CredentialError::Unavailable("offline".into()));
            }
            let token = Token::new(format!("{}-{n}", tenant_id.unwrap_or("none")));
            Ok(match self.ttl {
                Some(ttl) => token.expires_in(ttl),
                None => token,
            })
        }
    }

    fn cache() -> CredentialCache {
        CredentialCache::new(&CredentialsConfig::default())
    }

    #[tokio::test]
    async fn test_hit_after_first_fetch() {
        let provider = Arc::new(CountingProvider::default());
        let dyn_provider: Arc<dyn CredentialProvider> = provider.clone();
        let cache = cache();

        let first = cache.app_token(&dyn_provider, Some("t1")).await.unwrap();
        let second = cache.app_token(&dyn_provider, Some("t1")).await.unwrap();
        assert_eq!(first.value(), "t1-0");
        assert_eq!(first, second);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

        let other = cache.app_token(&dyn_provider, None).await.unwrap();
        assert_eq!(other.value(), "none-1");
        assert_eq!(cache.len().await, 2);
    }

    #[tokio::test]
    async fn test_failure_is_none_and_not_cached() {
        let provider = Arc::new(CountingProvider {
            fail: true,
            ..Default::default()
        });
        let dyn_provider: Arc<dyn CredentialProvider> = provider.clone();
        let cache = cache();

        assert!(cache.app_token(&dyn_provider, Some("t1")).await.is_none());
        assert!(cache.app_token(&dyn_provider, Some("t1")).await.is_none());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_expired_token_is_refetched() {
        let provider = Arc::new(CountingProvider {
            ttl: Some(Duration::ZERO),
            ..Default::default()
        });
        let dyn_provider: Arc<dyn CredentialProvider> = provider.clone();
        let cache = cache();

        cache.app_token(&dyn_provider, Some("t1")).await;
        let again = cache.app_token(&dyn_provider, Some("t1")).await.unwrap();
        assert_eq!(again.value(), "t1-1");
    }

    #[tokio::test]
    async fn test_invalidate() {
        let provider = Arc::new(CountingProvider::default());
        let dyn_provider: Arc<dyn CredentialProvider> = provider.clone();
        let cache = cache();

        cache.app_token(&dyn_provider, Some("t1")).await;
        cache.invalidate(Some("t1")).await;
        let again = cache.app_token(&dyn_provider, Some("t1")).await.unwrap();
        assert_eq!(again.value(), "t1-1");
    }
}
