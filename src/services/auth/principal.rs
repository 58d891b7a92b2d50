//! Validation verdicts shared by every validator, the cache and the middleware.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// RBAC record carried inside a token (`active_context` claim).
///
/// Legacy single-role tokens omit it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ActiveContext {
    #[serde(default)]
    pub role_id: String,
    #[serde(default)]
    pub role_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub school_id: Option<String>,
    /// Dotted-pair permissions, e.g. `materials:read`.
    #[serde(default)]
    pub permissions: BTreeSet<String>,
}

impl ActiveContext {
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }

    pub fn has_any_permission<S: AsRef<str>>(&self, permissions: &[S]) -> bool {
        permissions.iter().any(|p| self.has_permission(p.as_ref()))
    }
}

/// Logical reason a principal is invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    MalformedToken,
    BadSignature,
    BadIssuer,
    Expired,
    RemoteTransport,
    RemoteVerdict,
    CircuitOpen,
    TooManyRequests,
    NoValidator,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MalformedToken => "malformed_token",
            Self::BadSignature => "bad_signature",
            Self::BadIssuer => "bad_issuer",
            Self::Expired => "expired",
            Self::RemoteTransport => "remote_transport",
            Self::RemoteVerdict => "remote_verdict",
            Self::CircuitOpen => "circuit_open",
            Self::TooManyRequests => "too_many_requests",
            Self::NoValidator => "no_validator",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of validating a token.
///
/// Invariants:
/// - `valid == true`  => `user_id` is non-empty and `expires_at` was in the future
///   when the verdict was produced.
/// - `valid == false` => `user_id`, `email`, `role` are empty and `error` is set.
///
/// The JSON shape is the identity service's `/v1/auth/verify` response.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Principal {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub email: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub school_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_context: Option<ActiveContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Not part of the wire format; only set on verdicts produced locally.
    #[serde(skip)]
    pub kind: Option<FailureKind>,
}

impl Principal {
    pub fn invalid(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            valid: false,
            error: Some(message.into()),
            kind: Some(kind),
            ..Self::default()
        }
    }

    /// Role after RBAC override: `active_context.role_name` wins when present.
    pub fn effective_role(&self) -> &str {
        match &self.active_context {
            Some(ctx) if !ctx.role_name.is_empty() => &ctx.role_name,
            _ => &self.role,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref().filter(|e| !e.is_empty())
    }

    /// Enforce the verdict invariants on a principal received from outside.
    ///
    /// A `valid` verdict lacking `user_id`, lacking `expires_at`, or already
    /// past it is downgraded; an invalid verdict loses its identity fields.
    pub fn normalized(mut self, now: DateTime<Utc>) -> Self {
        if self.valid {
            if self.user_id.trim().is_empty() {
                return Self::invalid(FailureKind::RemoteVerdict, "verdict missing user_id");
            }
            match self.expires_at {
                None => {
                    return Self::invalid(FailureKind::RemoteVerdict, "verdict missing expires_at");
                }
                Some(exp) if exp <= now => {
                    return Self::invalid(FailureKind::RemoteVerdict, "token expired");
                }
                Some(_) => {}
            }
            if self.school_id.as_deref().is_some_and(str::is_empty) {
                self.school_id = None;
            }
            if let Some(ctx) = &self.active_context {
                if !ctx.role_name.is_empty() {
                    self.role = ctx.role_name.clone();
                }
            }
            self.error = None;
            self.kind = None;
            self
        } else {
            let message = self
                .error
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| "invalid token".to_string());
            Self::invalid(self.kind.unwrap_or(FailureKind::RemoteVerdict), message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn valid_principal() -> Principal {
        Principal {
            valid: true,
            user_id: "user-123".into(),
            email: "t@x".into(),
            role: "teacher".into(),
            expires_at: Some(Utc::now() + Duration::minutes(15)),
            ..Principal::default()
        }
    }

    #[test]
    fn decodes_identity_service_response() {
        let body = r#"{
            "valid": true,
            "user_id": "u-1",
            "email": "a@b",
            "role": "student",
            "expires_at": "2030-01-01T00:00:00Z",
            "active_context": {
                "role_id": "r-1",
                "role_name": "teacher",
                "school_id": "s-1",
                "permissions": ["materials:read", "materials:write"]
            }
        }"#;

        let p: Principal = serde_json::from_str(body).unwrap();
        assert!(p.valid);
        assert_eq!(p.effective_role(), "teacher");
        let ctx = p.active_context.as_ref().unwrap();
        assert!(ctx.has_permission("materials:write"));
        assert!(!ctx.has_permission("materials:update"));
    }

    #[test]
    fn normalized_downgrades_valid_verdict_without_user() {
        let mut p = valid_principal();
        p.user_id.clear();

        let n = p.normalized(Utc::now());
        assert!(!n.valid);
        assert!(n.email.is_empty());
        assert_eq!(n.kind, Some(FailureKind::RemoteVerdict));
    }

    #[test]
    fn normalized_downgrades_expired_verdict() {
        let mut p = valid_principal();
        p.expires_at = Some(Utc::now() - Duration::hours(1));

        let n = p.normalized(Utc::now());
        assert!(!n.valid);
        assert!(n.error_message().unwrap().contains("expired"));
    }

    #[test]
    fn normalized_downgrades_valid_verdict_without_expiry() {
        let mut p = valid_principal();
        p.expires_at = None;

        let n = p.normalized(Utc::now());
        assert!(!n.valid);
        assert!(n.user_id.is_empty());
        assert_eq!(n.kind, Some(FailureKind::RemoteVerdict));
        assert_eq!(n.error_message(), Some("verdict missing expires_at"));
    }

    #[test]
    fn normalized_clears_identity_on_invalid_verdict() {
        let p = Principal {
            valid: false,
            user_id: "leaked".into(),
            role: "admin".into(),
            ..Principal::default()
        };

        let n = p.normalized(Utc::now());
        assert!(n.user_id.is_empty());
        assert!(n.role.is_empty());
        assert_eq!(n.error_message(), Some("invalid token"));
    }

    #[test]
    fn normalized_applies_role_override() {
        let mut p = valid_principal();
        p.active_context = Some(ActiveContext {
            role_name: "school_admin".into(),
            ..ActiveContext::default()
        });

        assert_eq!(p.normalized(Utc::now()).role, "school_admin");
    }

    #[test]
    fn empty_permission_set_grants_nothing() {
        let ctx = ActiveContext::default();
        assert!(!ctx.has_permission("materials:read"));
        assert!(!ctx.has_any_permission(&["materials:read", "materials:update"]));
    }
}
