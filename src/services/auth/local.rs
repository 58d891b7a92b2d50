//! Local validation of HS256 tokens minted by the identity authority.
use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use crate::services::auth::principal::{ActiveContext, FailureKind, Principal};

pub const DEFAULT_ISSUER: &str = "edugo-central";

/// Claims carried by tokens from the identity authority.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub role: String,
    pub iss: String,
    pub exp: i64,
    #[serde(default)]
    pub school_id: Option<String>,
    #[serde(default)]
    pub active_context: Option<ActiveContext>,
}

/// Validates tokens against the pre-shared symmetric secret.
///
/// Key material is intentionally not printable via Debug.
#[derive(Clone)]
pub struct LocalValidator {
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
}

impl std::fmt::Debug for LocalValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalValidator")
            .field("issuer", &self.issuer)
            .finish_non_exhaustive()
    }
}

impl LocalValidator {
    /// Returns `None` when `secret` is empty: local validation is then unavailable.
    pub fn new(secret: &str, issuer: &str) -> Option<Self> {
        if secret.is_empty() {
            return None;
        }

        let mut validation = Validation::new(Algorithm::HS256);
        // `iss` and `exp` are checked by hand below so each failure gets its own kind,
        // and so a token is already expired at exactly `exp`.
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["sub", "iss", "exp"]);

        let issuer = if issuer.is_empty() {
            DEFAULT_ISSUER
        } else {
            issuer
        };

        Some(Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            issuer: issuer.to_string(),
        })
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn validate(&self, token: &str) -> Principal {
        self.validate_at(token, Utc::now())
    }

    /// Parse -> signature -> issuer -> expiry -> extract, in that order.
    pub fn validate_at(&self, token: &str, now: DateTime<Utc>) -> Principal {
        let claims = match jsonwebtoken::decode::<TokenClaims>(
            token,
            &self.decoding_key,
            &self.validation,
        ) {
            Ok(data) => data.claims,
            Err(err) => {
                let kind = classify(err.kind());
                return Principal::invalid(kind, format!("{}: {}", describe(kind), err));
            }
        };

        if claims.iss != self.issuer {
            return Principal::invalid(
                FailureKind::BadIssuer,
                format!("invalid issuer: expected {}", self.issuer),
            );
        }

        let Some(expires_at) = DateTime::<Utc>::from_timestamp(claims.exp, 0) else {
            return Principal::invalid(FailureKind::MalformedToken, "malformed token: invalid exp");
        };
        if expires_at <= now {
            return Principal::invalid(FailureKind::Expired, "token expired");
        }

        if claims.sub.trim().is_empty() {
            return Principal::invalid(FailureKind::MalformedToken, "malformed token: empty sub");
        }

        let role = match &claims.active_context {
            Some(ctx) if !ctx.role_name.is_empty() => ctx.role_name.clone(),
            _ => claims.role,
        };

        Principal {
            valid: true,
            user_id: claims.sub,
            email: claims.email,
            role,
            school_id: claims.school_id.filter(|s| !s.is_empty()),
            expires_at: Some(expires_at),
            active_context: claims.active_context,
            error: None,
            kind: None,
        }
    }
}

fn classify(kind: &ErrorKind) -> FailureKind {
    match kind {
        ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => FailureKind::BadSignature,
        ErrorKind::InvalidIssuer => FailureKind::BadIssuer,
        ErrorKind::ExpiredSignature => FailureKind::Expired,
        _ => FailureKind::MalformedToken,
    }
}

fn describe(kind: FailureKind) -> &'static str {
    match kind {
        FailureKind::BadSignature => "invalid signature",
        FailureKind::BadIssuer => "invalid issuer",
        FailureKind::Expired => "token expired",
        _ => "malformed token",
    }
}
