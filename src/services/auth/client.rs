//! `AuthClient`: cache -> local -> (fallback) remote behind the circuit breaker.
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::services::auth::breaker::{
    BreakerError, BreakerSettings, CircuitBreaker, CircuitState, log_state_change,
};
use crate::services::auth::cache::{TokenCache, fingerprint};
use crate::services::auth::local::{DEFAULT_ISSUER, LocalValidator};
use crate::services::auth::principal::{FailureKind, Principal};
use crate::services::auth::remote::{RemoteError, RemoteValidator};
use crate::services::auth::stats::AuthStats;
use crate::services::cache::{CacheClient, MemoryCache};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct AuthClientConfig {
    /// Shared HS256 secret. Empty disables local validation.
    pub jwt_secret: String,
    pub jwt_issuer: String,
    /// Identity service root. Empty disables remote validation.
    pub base_url: String,
    pub remote_enabled: bool,
    /// Consult the remote validator when local validation says `valid=false`.
    pub fallback_enabled: bool,
    pub timeout: Duration,
    pub cache_enabled: bool,
    pub cache_ttl: Duration,
    pub circuit_breaker: BreakerSettings,
}

impl Default for AuthClientConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            jwt_issuer: DEFAULT_ISSUER.to_string(),
            base_url: String::new(),
            remote_enabled: false,
            fallback_enabled: false,
            timeout: DEFAULT_TIMEOUT,
            cache_enabled: false,
            cache_ttl: DEFAULT_CACHE_TTL,
            circuit_breaker: BreakerSettings::default(),
        }
    }
}

/// A validator could not produce a verdict at all.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("token validator unavailable: {0}")]
    Unavailable(String),
}

/// Seam between the HTTP middleware and token validation.
#[async_trait]
pub trait TokenValidator: Send + Sync + 'static {
    async fn validate(&self, token: &str) -> Result<Principal, ValidationError>;
}

pub struct AuthClient {
    local: Option<LocalValidator>,
    remote: Option<RemoteValidator>,
    fallback_enabled: bool,
    cache: TokenCache,
    breaker: CircuitBreaker,
    stats: AuthStats,
}

impl std::fmt::Debug for AuthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthClient")
            .field("local", &self.local)
            .field("remote", &self.remote)
            .field("fallback_enabled", &self.fallback_enabled)
            .field("cache", &self.cache)
            .field("breaker", &self.breaker)
            .finish()
    }
}

impl AuthClient {
    /// Build a client whose cache (if enabled) lives in this process.
    pub fn new(config: AuthClientConfig) -> Result<Self, RemoteError> {
        Self::with_cache_backend(config, Arc::new(MemoryCache::new()))
    }

    pub fn with_cache_backend(
        config: AuthClientConfig,
        backend: Arc<dyn CacheClient>,
    ) -> Result<Self, RemoteError> {
        let timeout = if config.timeout.is_zero() {
            DEFAULT_TIMEOUT
        } else {
            config.timeout
        };
        let cache_ttl = if config.cache_ttl.is_zero() {
            DEFAULT_CACHE_TTL
        } else {
            config.cache_ttl
        };

        let local = LocalValidator::new(&config.jwt_secret, &config.jwt_issuer);
        let remote = if config.remote_enabled {
            RemoteValidator::new(&config.base_url, timeout)?
        } else {
            None
        };
        let cache = if config.cache_enabled {
            TokenCache::new(backend, cache_ttl)
        } else {
            TokenCache::disabled()
        };
        let breaker =
            CircuitBreaker::new(config.circuit_breaker).with_state_change(log_state_change());

        Ok(Self {
            local,
            remote,
            fallback_enabled: config.fallback_enabled,
            cache,
            breaker,
            stats: AuthStats::default(),
        })
    }

    pub fn has_local(&self) -> bool {
        self.local.is_some()
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    pub fn stats(&self) -> &AuthStats {
        &self.stats
    }

    pub fn cache(&self) -> &TokenCache {
        &self.cache
    }

    pub async fn clear_cache(&self) {
        self.cache.clear().await;
    }

    /// Validate `token`. Never fails: every failure is a `valid=false` principal.
    pub async fn validate(&self, token: &str) -> Principal {
        let fp = fingerprint(token);

        if self.cache.is_enabled() {
            if let Some(principal) = self.cache.get(&fp).await {
                self.stats.cache_hit();
                return principal;
            }
            self.stats.cache_miss();
        }

        if let Some(local) = &self.local {
            self.stats.local_validation();
            let principal = local.validate(token);
            if principal.valid {
                self.cache.set(&fp, &principal).await;
                return principal;
            }
            if !self.fallback_enabled || self.remote.is_none() {
                return principal;
            }
            tracing::debug!(
                reason = ?principal.kind,
                "local validation failed, falling back to remote"
            );
        }

        let Some(remote) = &self.remote else {
            return Principal::invalid(FailureKind::NoValidator, "no validation method available");
        };

        let outcome = self
            .breaker
            .execute(|| {
                self.stats.remote_call();
                remote.validate(token)
            })
            .await;

        match outcome {
            Ok(principal) => {
                if principal.valid {
                    self.cache.set(&fp, &principal).await;
                }
                principal
            }
            Err(BreakerError::Open) => self.rejected(FailureKind::CircuitOpen, "circuit-open"),
            Err(BreakerError::TooManyRequests) => {
                self.rejected(FailureKind::TooManyRequests, "too-many-requests")
            }
            Err(BreakerError::Call(err)) => {
                self.stats.remote_failure();
                tracing::warn!(error = %err, "remote token validation failed");
                Principal::invalid(FailureKind::RemoteTransport, err.to_string())
            }
        }
    }

    fn rejected(&self, kind: FailureKind, reason: &str) -> Principal {
        self.stats.breaker_rejection();
        Principal::invalid(kind, format!("remote validation failed: {reason}"))
    }
}

#[async_trait]
impl TokenValidator for AuthClient {
    async fn validate(&self, token: &str) -> Result<Principal, ValidationError> {
        Ok(AuthClient::validate(self, token).await)
    }
}
