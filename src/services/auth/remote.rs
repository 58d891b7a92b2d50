//! Remote validation against the identity service (`POST /v1/auth/verify`).
use chrono::Utc;
use reqwest::StatusCode;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use crate::services::auth::principal::{FailureKind, Principal};

const VERIFY_PATH: &str = "/v1/auth/verify";

/// Transient failures. Each one counts against the circuit breaker.
///
/// Network errors, timeouts and 5xx are deliberately one kind (`remote_transport`).
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("auth service unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("auth service error: status {0}")]
    Status(u16),
    #[error("auth service returned an unreadable verdict: {0}")]
    Decode(String),
}

#[derive(Serialize)]
struct VerifyRequest<'a> {
    token: &'a str,
}

#[derive(Debug, Clone)]
pub struct RemoteValidator {
    http: reqwest::Client,
    verify_url: String,
}

impl RemoteValidator {
    /// Returns `None` when `base_url` is empty.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Option<Self>, RemoteError> {
        let base_url = base_url.trim().trim_end_matches('/');
        if base_url.is_empty() {
            return Ok(None);
        }

        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Some(Self {
            http,
            verify_url: format!("{base_url}{VERIFY_PATH}"),
        }))
    }

    pub fn verify_url(&self) -> &str {
        &self.verify_url
    }

    /// `Ok` carries a verdict (valid or not); `Err` is a transient failure.
    ///
    /// Dropping the returned future aborts the in-flight request.
    pub async fn validate(&self, token: &str) -> Result<Principal, RemoteError> {
        let resp = self
            .http
            .post(&self.verify_url)
            .json(&VerifyRequest { token })
            .send()
            .await?;

        let status = resp.status();
        if status.is_server_error() {
            return Err(RemoteError::Status(status.as_u16()));
        }

        let body = resp.bytes().await?;

        if status.is_success() {
            let principal: Principal = serde_json::from_slice(&body)
                .map_err(|e| RemoteError::Decode(e.to_string()))?;
            return Ok(principal.normalized(Utc::now()));
        }

        // 4xx (and anything else non-transient) is a rejection, not an outage.
        Ok(rejection(status, &body))
    }
}

fn rejection(status: StatusCode, body: &[u8]) -> Principal {
    match serde_json::from_slice::<Principal>(body) {
        Ok(mut principal) => {
            principal.valid = false;
            principal.normalized(Utc::now())
        }
        Err(_) => Principal::invalid(
            FailureKind::RemoteVerdict,
            format!("token rejected by auth service: status {}", status.as_u16()),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn future_rfc3339() -> String {
        (Utc::now() + chrono::Duration::minutes(15)).to_rfc3339()
    }

    async fn validator(server: &MockServer) -> RemoteValidator {
        RemoteValidator::new(&server.uri(), Duration::from_secs(5))
            .unwrap()
            .unwrap()
    }

    #[test]
    fn empty_base_url_disables_remote() {
        assert!(
            RemoteValidator::new("", Duration::from_secs(1))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let v = RemoteValidator::new("http://admin:8081/", Duration::from_secs(1))
            .unwrap()
            .unwrap();
        assert_eq!(v.verify_url(), "http://admin:8081/v1/auth/verify");
    }

    #[tokio::test]
    async fn posts_token_and_returns_verdict() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/auth/verify"))
            .and(header("content-type", "application/json"))
            .and(body_json(json!({ "token": "tok" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "valid": true,
                "user_id": "user-123",
                "email": "t@x",
                "role": "teacher",
                "expires_at": future_rfc3339(),
            })))
            .expect(1)
            .mount(&server)
            .await;

        let p = validator(&server).await.validate("tok").await.unwrap();
        assert!(p.valid);
        assert_eq!(p.user_id, "user-123");
        assert_eq!(p.role, "teacher");
    }

    #[tokio::test]
    async fn server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = validator(&server).await.validate("tok").await.unwrap_err();
        assert!(matches!(err, RemoteError::Status(503)));
    }

    #[tokio::test]
    async fn client_error_is_a_verdict() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(json!({ "valid": false, "error": "token revoked" })),
            )
            .mount(&server)
            .await;

        let p = validator(&server).await.validate("tok").await.unwrap();
        assert!(!p.valid);
        assert_eq!(p.error_message(), Some("token revoked"));
    }

    #[tokio::test]
    async fn client_error_without_body_is_a_verdict() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let p = validator(&server).await.validate("tok").await.unwrap();
        assert!(!p.valid);
        assert_eq!(p.kind, Some(FailureKind::RemoteVerdict));
    }

    #[tokio::test]
    async fn unreadable_success_body_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = validator(&server).await.validate("tok").await.unwrap_err();
        assert!(matches!(err, RemoteError::Decode(_)));
    }

    #[tokio::test]
    async fn slow_service_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let v = RemoteValidator::new(&server.uri(), Duration::from_millis(50))
            .unwrap()
            .unwrap();
        let err = v.validate("tok").await.unwrap_err();
        assert!(matches!(err, RemoteError::Transport(_)));
    }
}
