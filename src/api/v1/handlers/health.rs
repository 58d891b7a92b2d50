/*
 * Responsibility
 * - GET /health (liveness, no token required)
 * - Reports which validators are configured, the breaker state and auth counters
 */
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde_json::json;

use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let auth = &state.auth;
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "auth": {
                "local": auth.has_local(),
                "remote": auth.has_remote(),
                "cache": auth.cache().is_enabled(),
                "circuit_breaker": auth.circuit_state().as_str(),
                "stats": auth.stats().snapshot(),
            },
        })),
    )
}
