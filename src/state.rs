/*
 * Responsibility
 * - Shared context bound to the Router (AppState)
 * - Clone is cheap (everything behind Arc)
 */
use std::sync::Arc;

use crate::metrics::Metrics;
use crate::services::auth::AuthClient;

#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthClient>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(auth: Arc<AuthClient>, metrics: Metrics) -> Self {
        Self { auth, metrics }
    }
}
