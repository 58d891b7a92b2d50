/// Factory: build `AuthClient` from application `Config`.
use std::sync::Arc;

use crate::config::{CacheBackend, Config};
use crate::error::AppError;
use crate::services::auth::AuthClient;
use crate::services::cache::{CacheClient, MemoryCache, ValkeyClient};

/// Built auth services. `memory_cache` is set when verdicts live in-process
/// so the caller can schedule sweeping.
pub struct AuthServices {
    pub client: Arc<AuthClient>,
    pub memory_cache: Option<Arc<MemoryCache>>,
}

pub async fn build_auth_client(config: &Config) -> Result<AuthServices, AppError> {
    let (backend, memory_cache): (Arc<dyn CacheClient>, Option<Arc<MemoryCache>>) =
        match &config.cache_backend {
            CacheBackend::Memory => {
                let memory = Arc::new(MemoryCache::new());
                let backend: Arc<dyn CacheClient> = memory.clone();
                (backend, Some(memory))
            }
            CacheBackend::Valkey { url } => {
                let valkey = ValkeyClient::new(url).await.map_err(|e| {
                    tracing::error!(error = %e, "failed to connect token cache backend");
                    AppError::Internal
                })?;
                let backend: Arc<dyn CacheClient> = Arc::new(valkey);
                (backend, None)
            }
        };

    let client = AuthClient::with_cache_backend(config.auth.clone(), backend).map_err(|e| {
        tracing::error!(error = %e, "failed to build auth service HTTP client");
        AppError::Internal
    })?;

    tracing::info!(
        local = client.has_local(),
        remote = client.has_remote(),
        cache = client.cache().is_enabled(),
        "auth client ready"
    );

    Ok(AuthServices {
        client: Arc::new(client),
        memory_cache,
    })
}
