//! Cache client interface used by higher-level services (token verdict cache).
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache-layer errors (transport/command/serialization).
///
/// Note:
/// - Kept independent from `AppError` so callers decide how to fail.
///   The token cache treats every error as a miss (fail-open to re-validation).
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache connection error: {0}")]
    BackendConnection(String),
    #[error("cache command error: {0}")]
    BackendCommand(String),
    #[error("cache value error: {0}")]
    InvalidValue(String),
}

/// A minimal string-based cache interface.
///
/// The token cache only needs TTL writes, reads, and prefix clearing.
/// Implementations must be safe to share between request handlers.
#[async_trait]
pub trait CacheClient: Send + Sync + 'static {
    // Returns the cache backend name (for logging).
    fn backend_name(&self) -> &'static str;

    // Get UTF-8 string value. Expired entries are reported as absent.
    async fn get_string(&self, key: &str) -> CacheResult<Option<String>>;

    // Insert or overwrite `key`, expiring after `ttl`.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()>;

    // Delete a key. Returns number of deleted keys.
    async fn del(&self, key: &str) -> CacheResult<u64>;

    // Delete every key starting with `prefix`. Returns number of deleted keys.
    async fn clear_prefix(&self, prefix: &str) -> CacheResult<u64>;
}
