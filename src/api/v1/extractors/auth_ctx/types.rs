/*
 * Responsibility
 * - The authenticated context handlers see
 * - The access middleware builds it from a valid Principal and stores it in
 *   request extensions; handlers and RBAC layers only read this type
 */
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::services::auth::{ActiveContext, Principal};

pub const ADMIN_ROLES: &[&str] = &["admin", "super_admin"];

/// Attached to every request that passed the access middleware.
///
/// - `role` is already the effective role: `active_context.role_name` when a
///   context is present, the legacy claim otherwise.
/// - `user_id` / `school_id` are kept as the issuer sent them; use
///   `user_uuid()` / `school_uuid()` when a UUID is needed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthCtx {
    pub user_id: String,
    pub email: String,
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub school_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_expires_at: Option<DateTime<Utc>>,
    pub active_context: Option<ActiveContext>,
}

impl AuthCtx {
    pub fn from_principal(principal: Principal) -> Self {
        let role = principal.effective_role().to_string();
        let school_id = principal.school_id.filter(|s| !s.is_empty()).or_else(|| {
            principal
                .active_context
                .as_ref()
                .and_then(|ctx| ctx.school_id.clone())
                .filter(|s| !s.is_empty())
        });

        Self {
            user_id: principal.user_id,
            email: principal.email,
            role,
            school_id,
            token_expires_at: principal.expires_at,
            active_context: principal.active_context,
        }
    }

    pub fn user_uuid(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.user_id).ok()
    }

    pub fn school_uuid(&self) -> Option<Uuid> {
        self.school_id
            .as_deref()
            .and_then(|s| Uuid::parse_str(s).ok())
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.role == role
    }

    pub fn is_admin(&self) -> bool {
        ADMIN_ROLES.contains(&self.role.as_str())
    }

    /// `false` for legacy tokens without an RBAC context.
    pub fn has_permission(&self, permission: &str) -> bool {
        self.active_context
            .as_ref()
            .is_some_and(|ctx| ctx.has_permission(permission))
    }

    pub fn has_any_permission<S: AsRef<str>>(&self, permissions: &[S]) -> bool {
        self.active_context
            .as_ref()
            .is_some_and(|ctx| ctx.has_any_permission(permissions))
    }
}
