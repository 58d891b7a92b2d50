use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

use crate::services::auth::principal::Principal;
use crate::services::cache::CacheClient;

const KEY_PREFIX: &str = "auth:token:";

/// `hex(sha256(token))`. The raw token is never used as a key.
pub fn fingerprint(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Fixed-TTL store of valid verdicts keyed by token fingerprint.
///
/// A disabled cache always misses and ignores writes.
#[derive(Clone)]
pub struct TokenCache {
    backend: Option<Arc<dyn CacheClient>>,
    ttl: Duration,
}

impl std::fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCache")
            .field("backend", &self.backend.as_ref().map(|b| b.backend_name()))
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl TokenCache {
    pub fn new(backend: Arc<dyn CacheClient>, ttl: Duration) -> Self {
        Self {
            backend: Some(backend),
            ttl,
        }
    }

    pub fn disabled() -> Self {
        Self {
            backend: None,
            ttl: Duration::ZERO,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn get(&self, fingerprint: &str) -> Option<Principal> {
        let backend = self.backend.as_ref()?;
        let key = format!("{KEY_PREFIX}{fingerprint}");

        let raw = match backend.get_string(&key).await {
            Ok(raw) => raw?,
            Err(err) => {
                tracing::warn!(error = %err, backend = backend.backend_name(), "token cache read failed");
                return None;
            }
        };

        match serde_json::from_str::<Principal>(&raw) {
            Ok(principal) if principal.valid => Some(principal),
            Ok(_) => None,
            Err(err) => {
                tracing::warn!(error = %err, "discarding undecodable token cache entry");
                let _ = backend.del(&key).await;
                None
            }
        }
    }

    /// Store `principal` if it is valid. Invalid verdicts are never cached.
    pub async fn set(&self, fingerprint: &str, principal: &Principal) {
        let Some(backend) = self.backend.as_ref() else {
            return;
        };
        if !principal.valid {
            return;
        }

        let raw = match serde_json::to_string(principal) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(error = %err, "failed to encode principal for token cache");
                return;
            }
        };

        let key = format!("{KEY_PREFIX}{fingerprint}");
        if let Err(err) = backend.set_with_ttl(&key, &raw, self.ttl).await {
            tracing::warn!(error = %err, backend = backend.backend_name(), "token cache write failed");
        }
    }

    pub async fn clear(&self) {
        let Some(backend) = self.backend.as_ref() else {
            return;
        };
        match backend.clear_prefix(KEY_PREFIX).await {
            Ok(n) => tracing::debug!(removed = n, "token cache cleared"),
            Err(err) => tracing::warn!(error = %err, "token cache clear failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::auth::principal::FailureKind;
    use crate::services::cache::MemoryCache;
    use chrono::Utc;

    fn valid() -> Principal {
        Principal {
            valid: true,
            user_id: "user-123".into(),
            email: "t@x".into(),
            role: "teacher".into(),
            expires_at: Some(Utc::now() + chrono::Duration::minutes(15)),
            ..Principal::default()
        }
    }

    #[test]
    fn fingerprint_is_hex_sha256() {
        let fp = fingerprint("abc");
        assert_eq!(
            fp,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_ne!(fingerprint("abc"), fingerprint("abd"));
    }

    #[tokio::test]
    async fn stores_and_returns_valid_principals() {
        let cache = TokenCache::new(Arc::new(MemoryCache::new()), Duration::from_secs(60));
        let fp = fingerprint("token");
        let p = valid();

        cache.set(&fp, &p).await;
        assert_eq!(cache.get(&fp).await, Some(p));
    }

    #[tokio::test]
    async fn never_stores_invalid_principals() {
        let backend = Arc::new(MemoryCache::new());
        let cache = TokenCache::new(backend.clone(), Duration::from_secs(60));
        let fp = fingerprint("token");

        cache
            .set(&fp, &Principal::invalid(FailureKind::Expired, "token expired"))
            .await;

        assert!(backend.is_empty());
        assert_eq!(cache.get(&fp).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = TokenCache::new(Arc::new(MemoryCache::new()), Duration::from_secs(60));
        let fp = fingerprint("token");
        cache.set(&fp, &valid()).await;

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(cache.get(&fp).await, None);
    }

    #[tokio::test]
    async fn disabled_cache_is_a_no_op() {
        let cache = TokenCache::disabled();
        let fp = fingerprint("token");

        cache.set(&fp, &valid()).await;
        assert!(!cache.is_enabled());
        assert_eq!(cache.get(&fp).await, None);
    }

    #[tokio::test]
    async fn clear_drops_all_verdicts() {
        let cache = TokenCache::new(Arc::new(MemoryCache::new()), Duration::from_secs(60));
        let fp = fingerprint("token");
        cache.set(&fp, &valid()).await;

        cache.clear().await;
        assert_eq!(cache.get(&fp).await, None);
    }
}
