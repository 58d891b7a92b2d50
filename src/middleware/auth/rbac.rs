//! Permission / role checks on top of the access middleware.
//!
//! Each helper wraps a router with a `route_layer`, so only matched routes
//! are checked. A request without `AuthCtx` is a 401; an authenticated one
//! that fails the check is a 403. Role checks on a context with no role at
//! all are a 401 as well.

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::State,
    http::Request,
    middleware::{self, Next},
    response::{IntoResponse, Response},
};

use crate::api::v1::extractors::AuthCtx;
pub use crate::api::v1::extractors::auth_ctx::ADMIN_ROLES;
use crate::error::AppError;

pub const SUPER_ADMIN_ROLES: &[&str] = &["super_admin"];
pub const TEACHER_ROLES: &[&str] = &["teacher", "admin", "super_admin"];
pub const STUDENT_OR_ABOVE_ROLES: &[&str] = &["student", "teacher", "admin", "super_admin"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    Permission(String),
    AnyPermission(Vec<String>),
    /// Legacy role check against `AuthCtx::role`.
    Role(Vec<String>),
}

impl Requirement {
    pub fn check(&self, ctx: &AuthCtx) -> Result<(), AppError> {
        match self {
            Requirement::Permission(permission) => {
                let active = ctx
                    .active_context
                    .as_ref()
                    .ok_or_else(|| AppError::forbidden("RBAC context required"))?;
                if active.has_permission(permission) {
                    Ok(())
                } else {
                    Err(AppError::forbidden(format!(
                        "missing required permission: {permission}"
                    )))
                }
            }
            Requirement::AnyPermission(permissions) => {
                let active = ctx
                    .active_context
                    .as_ref()
                    .ok_or_else(|| AppError::forbidden("RBAC context required"))?;
                if active.has_any_permission(permissions) {
                    Ok(())
                } else {
                    Err(AppError::forbidden(format!(
                        "missing required permission: one of {}",
                        permissions.join(", ")
                    )))
                }
            }
            Requirement::Role(roles) => {
                if ctx.role.is_empty() {
                    return Err(AppError::unauthorized("user role not found"));
                }
                if roles.iter().any(|r| ctx.has_role(r)) {
                    Ok(())
                } else {
                    Err(AppError::forbidden("insufficient role"))
                }
            }
        }
    }
}

pub fn apply<S>(router: Router<S>, requirement: Requirement) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.route_layer(middleware::from_fn_with_state(
        Arc::new(requirement),
        enforce,
    ))
}

pub fn require_permission<S>(router: Router<S>, permission: &str) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    apply(router, Requirement::Permission(permission.to_string()))
}

pub fn require_any_permission<S>(router: Router<S>, permissions: &[&str]) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    apply(
        router,
        Requirement::AnyPermission(permissions.iter().map(|p| p.to_string()).collect()),
    )
}

#[deprecated(note = "use require_permission / require_any_permission")]
pub fn require_role<S>(router: Router<S>, roles: &[&str]) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    role_layer(router, roles)
}

pub fn require_admin<S>(router: Router<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    role_layer(router, ADMIN_ROLES)
}

pub fn require_super_admin<S>(router: Router<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    role_layer(router, SUPER_ADMIN_ROLES)
}

pub fn require_teacher<S>(router: Router<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    role_layer(router, TEACHER_ROLES)
}

pub fn require_student_or_above<S>(router: Router<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    role_layer(router, STUDENT_OR_ABOVE_ROLES)
}

fn role_layer<S>(router: Router<S>, roles: &[&str]) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    apply(
        router,
        Requirement::Role(roles.iter().map(|r| r.to_string()).collect()),
    )
}

async fn enforce(
    State(requirement): State<Arc<Requirement>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let Some(ctx) = req.extensions().get::<AuthCtx>() else {
        return AppError::unauthorized("authorization required").into_response();
    };

    if let Err(err) = requirement.check(ctx) {
        tracing::warn!(user_id = %ctx.user_id, role = %ctx.role, error = %err, "access denied");
        return err.into_response();
    }

    next.run(req).await
}
