/*
 * Responsibility
 * - GET /metrics (Prometheus text format, no token required)
 */
use axum::{
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
};

use crate::error::AppError;
use crate::state::AppState;

pub async fn metrics(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let body = state.metrics.render().map_err(|e| {
        tracing::error!(error = %e, "failed to encode metrics");
        AppError::Internal
    })?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, state.metrics.content_type())],
        body,
    ))
}
