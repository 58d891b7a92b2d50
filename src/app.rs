/*
 * Responsibility
 * - Load Config -> build services -> assemble the Router
 * - Middleware order (outermost first): http (request id, trace, limits,
 *   timeout) -> cors -> metrics -> access (token validation)
 * - axum::serve() with graceful shutdown
 */
use std::sync::Arc;
use std::time::Duration;
use std::{panic, process};

use anyhow::{Context, Result};
use axum::{Router, routing::get};
use tokio::time::MissedTickBehavior;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api::{
    self,
    v1::handlers::{health::health, metrics::metrics},
};
use crate::config::Config;
use crate::metrics::Metrics;
use crate::middleware::{self, auth::access::Access};
use crate::services::auth::{TokenValidator, build_auth_client};
use crate::services::cache::MemoryCache;
use crate::state::AppState;

const CACHE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

fn init_tracing() {
    // RUST_LOG=info,edugo_mobile_api=debug,tower_http=debug cargo run
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn init_panic_hook(abort_on_panic: bool) {
    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        tracing::error!(?info, "panic");

        if abort_on_panic {
            process::abort();
        } else {
            default_hook(info);
        }
    }))
}

pub async fn run() -> Result<()> {
    init_tracing();
    let config = Config::from_env().context("loading configuration")?;

    init_panic_hook(!config.app_env.is_production());

    tracing::info!(
        "starting mobile API in {:?} mode on {}",
        config.app_env,
        config.addr
    );

    let services = build_auth_client(&config)
        .await
        .context("building auth client")?;

    if let Some(memory) = services.memory_cache.filter(|_| services.client.cache().is_enabled()) {
        spawn_cache_sweeper(memory);
    }

    let metrics = Metrics::new(services.client.clone()).context("registering metrics")?;
    let state = AppState::new(services.client, metrics);
    let app = build_router(state, &config);

    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("binding {}", config.addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;

    tracing::info!("server stopped");
    Ok(())
}

pub fn build_router(state: AppState, config: &Config) -> Router {
    let validator: Arc<dyn TokenValidator> = state.auth.clone();
    let access = Access::new(validator).skip_paths(config.skip_paths.iter().cloned());

    let router = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .nest("/v1", api::v1::routes());

    let router = middleware::auth::access::apply(router, access);
    let router = middleware::metrics::apply(router, state.metrics.http());
    let router = middleware::cors::apply(router, config);
    let router = middleware::http::apply(router, config.request_timeout);

    router.with_state(state)
}

/// Periodically drop expired verdicts from the in-process cache; reads
/// already ignore them, this only bounds memory.
fn spawn_cache_sweeper(cache: Arc<MemoryCache>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(CACHE_SWEEP_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let removed = cache.purge_expired();
            if removed > 0 {
                tracing::debug!(removed, remaining = cache.len(), "token cache swept");
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
