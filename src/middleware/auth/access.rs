//! Bearer token validation -> AuthCtx in request extensions.
//!
//! Flow per request:
//! - path in the skip list: pass through untouched
//! - `Authorization: Bearer <token>` (scheme case-insensitive, exactly one space)
//! - `TokenValidator::validate`; a valid principal becomes `AuthCtx`
//!
//! Every rejection is a 401 and aborts the request. A custom body can be
//! produced with `Access::on_unauthorized`; the status stays 401.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::{OriginalUri, State},
    http::{Request, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
};

use crate::api::v1::extractors::AuthCtx;
use crate::error::AppError;
use crate::services::auth::TokenValidator;

pub type UnauthorizedFn = Arc<dyn Fn(&str) -> Response + Send + Sync>;

/// Middleware state: who validates, which paths bypass, how 401 looks.
#[derive(Clone)]
pub struct Access {
    validator: Arc<dyn TokenValidator>,
    skip_paths: Arc<HashSet<String>>,
    on_unauthorized: Option<UnauthorizedFn>,
}

impl fmt::Debug for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Access")
            .field("skip_paths", &self.skip_paths)
            .field("custom_unauthorized", &self.on_unauthorized.is_some())
            .finish()
    }
}

impl Access {
    pub fn new(validator: Arc<dyn TokenValidator>) -> Self {
        Self {
            validator,
            skip_paths: Arc::new(HashSet::new()),
            on_unauthorized: None,
        }
    }

    /// Exact request paths (as the client sent them) that bypass validation.
    pub fn skip_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skip_paths = Arc::new(paths.into_iter().map(Into::into).collect());
        self
    }

    /// Replace the default JSON body of 401 responses.
    pub fn on_unauthorized<F>(mut self, handler: F) -> Self
    where
        F: Fn(&str) -> Response + Send + Sync + 'static,
    {
        self.on_unauthorized = Some(Arc::new(handler));
        self
    }

    fn is_skipped(&self, path: &str) -> bool {
        self.skip_paths.contains(path)
    }

    fn reject(&self, message: &str) -> Response {
        match &self.on_unauthorized {
            Some(handler) => {
                let mut res = handler(message);
                *res.status_mut() = StatusCode::UNAUTHORIZED;
                res
            }
            None => AppError::unauthorized(message).into_response(),
        }
    }
}

/// Put the access middleware in front of every route of `router`.
///
/// ```ignore
/// let access = Access::new(state.auth.clone()).skip_paths(["/health"]);
/// let app = middleware::auth::access::apply(app, access);
/// ```
pub fn apply<S>(router: Router<S>, access: Access) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(middleware::from_fn_with_state(access, access_middleware))
}

async fn access_middleware(
    State(access): State<Access>,
    OriginalUri(original_uri): OriginalUri,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    if access.is_skipped(original_uri.path()) {
        return next.run(req).await;
    }

    let Some(value) = req.headers().get(header::AUTHORIZATION) else {
        tracing::warn!(path = %original_uri.path(), "missing authorization header");
        return access.reject("authorization required");
    };

    // Owned: no borrow of `req` may live across the await below.
    let Some(token) = value.to_str().ok().and_then(bearer_token).map(str::to_owned) else {
        tracing::warn!(path = %original_uri.path(), "malformed authorization header");
        return access.reject("invalid authorization header");
    };

    let principal = match access.validator.validate(&token).await {
        Ok(principal) => principal,
        Err(err) => {
            tracing::warn!(error = %err, "token validation failed");
            return access.reject("token validation failed");
        }
    };

    if !principal.valid {
        let message = principal
            .error_message()
            .unwrap_or("invalid or expired token")
            .to_string();
        tracing::warn!(
            kind = principal.kind.map(|k| k.as_str()).unwrap_or("unknown"),
            error = %message,
            "token rejected"
        );
        return access.reject(&message);
    }

    let auth_ctx = AuthCtx::from_principal(principal);
    tracing::debug!(user_id = %auth_ctx.user_id, role = %auth_ctx.role, "request authenticated");

    req.extensions_mut().insert(auth_ctx);

    next.run(req).await
}

/// `<scheme> <token>` split on a single space; anything else is malformed.
fn bearer_token(value: &str) -> Option<&str> {
    let mut parts = value.split(' ');
    let scheme = parts.next()?;
    let token = parts.next()?;

    if parts.next().is_some() || token.is_empty() || !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    Some(token)
}
