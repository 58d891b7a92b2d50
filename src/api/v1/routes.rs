/*
 * Responsibility
 * - URL layout of v1 (mounted under /v1 by app.rs)
 * - Every route here sits behind the access middleware
 */
use axum::{Router, routing::get};

use crate::api::v1::handlers::me::me;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/me", get(me))
}
