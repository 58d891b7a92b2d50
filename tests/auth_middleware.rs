use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Json, Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::{Value, json};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use edugo_mobile_api::api::v1::extractors::{AuthCtx, AuthCtxExtractor};
use edugo_mobile_api::middleware::auth::access::{self, Access};
use edugo_mobile_api::middleware::auth::rbac;
use edugo_mobile_api::services::auth::{
    AuthClient, AuthClientConfig, Principal, TokenValidator, ValidationError,
};

const SECRET: &str = "integration-secret";

fn sign(claims: &Value) -> String {
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

fn teacher_token(permissions: &[&str]) -> String {
    sign(&json!({
        "sub": "user-123",
        "email": "teacher@edugo.test",
        "role": "student",
        "iss": "edugo-central",
        "exp": Utc::now().timestamp() + 900,
        "active_context": {
            "role_id": "r-7",
            "role_name": "teacher",
            "school_id": "school-1",
            "permissions": permissions,
        }
    }))
}

fn legacy_token(role: &str) -> String {
    sign(&json!({
        "sub": "user-9",
        "email": "legacy@edugo.test",
        "role": role,
        "iss": "edugo-central",
        "exp": Utc::now().timestamp() + 900,
    }))
}

fn local_client() -> Arc<dyn TokenValidator> {
    Arc::new(
        AuthClient::new(AuthClientConfig {
            jwt_secret: SECRET.into(),
            cache_enabled: true,
            ..AuthClientConfig::default()
        })
        .unwrap(),
    )
}

async fn ok() -> &'static str {
    "ok"
}

async fn whoami(AuthCtxExtractor(ctx): AuthCtxExtractor) -> Json<AuthCtx> {
    Json(ctx)
}

fn protected_routes() -> Router {
    let read = rbac::require_permission(
        Router::new().route("/v1/materials", get(ok)),
        "materials:read",
    );
    let update = rbac::require_permission(
        Router::new().route("/v1/materials/update", post(ok)),
        "materials:update",
    );
    let any = rbac::require_any_permission(
        Router::new().route("/v1/materials/any", get(ok)),
        &["materials:read", "materials:update"],
    );
    let admin = rbac::require_admin(Router::new().route("/v1/admin", get(ok)));
    let teacher = rbac::require_teacher(Router::new().route("/v1/classes", get(ok)));

    Router::new()
        .route("/health", get(ok))
        .route("/v1/auth/login", post(ok))
        .route("/v1/whoami", get(whoami))
        .merge(read)
        .merge(update)
        .merge(any)
        .merge(admin)
        .merge(teacher)
}

fn app(validator: Arc<dyn TokenValidator>) -> Router {
    access::apply(
        protected_routes(),
        Access::new(validator).skip_paths(["/health", "/v1/auth/login"]),
    )
}

async fn call(router: Router, method: &str, uri: &str, auth: Option<&str>) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(value) = auth {
        req = req.header(header::AUTHORIZATION, value);
    }
    let res = router.oneshot(req.body(Body::empty()).unwrap()).await.unwrap();
    let status = res.status();
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn missing_header_is_401_with_flat_body() {
    let (status, body) = call(app(local_client()), "GET", "/v1/whoami", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(
        body,
        json!({
            "error": "unauthorized",
            "message": "authorization required",
            "code": "UNAUTHORIZED",
        })
    );
}

#[tokio::test]
async fn bearer_scheme_is_case_insensitive_with_remote_validator() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/auth/verify"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "valid": true,
            "user_id": "user-remote",
            "email": "remote@edugo.test",
            "role": "teacher",
            "expires_at": (Utc::now() + chrono::Duration::minutes(15)).to_rfc3339(),
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client: Arc<dyn TokenValidator> = Arc::new(
        AuthClient::new(AuthClientConfig {
            base_url: server.uri(),
            remote_enabled: true,
            ..AuthClientConfig::default()
        })
        .unwrap(),
    );

    let (status, body) = call(
        app(client.clone()),
        "GET",
        "/v1/whoami",
        Some("bearer opaque-token"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"], "user-remote");

    let (status, body) = call(app(client), "GET", "/v1/whoami", Some("Token xyz")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "invalid authorization header");
}

#[tokio::test]
async fn extra_whitespace_is_401_not_500() {
    let token = teacher_token(&[]);
    let (status, _) = call(
        app(local_client()),
        "GET",
        "/v1/whoami",
        Some(&format!("Bearer  {token}")),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn invalid_token_message_comes_from_verdict() {
    let expired = sign(&json!({
        "sub": "user-123",
        "role": "teacher",
        "iss": "edugo-central",
        "exp": Utc::now().timestamp() - 60,
    }));
    let (status, body) = call(
        app(local_client()),
        "GET",
        "/v1/whoami",
        Some(&format!("Bearer {expired}")),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["message"].as_str().unwrap().contains("expired"));
}

#[tokio::test]
async fn active_context_role_is_injected() {
    let token = teacher_token(&["materials:read"]);
    let (status, body) = call(
        app(local_client()),
        "GET",
        "/v1/whoami",
        Some(&format!("Bearer {token}")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"], "user-123");
    assert_eq!(body["email"], "teacher@edugo.test");
    assert_eq!(body["role"], "teacher");
    assert_eq!(body["school_id"], "school-1");
    assert_eq!(body["active_context"]["role_name"], "teacher");
    assert!(body["token_expires_at"].is_string());
}

#[tokio::test]
async fn rbac_allows_and_denies() {
    let token = format!(
        "Bearer {}",
        teacher_token(&["materials:read", "materials:write"])
    );

    let (status, _) = call(app(local_client()), "GET", "/v1/materials", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(
        app(local_client()),
        "POST",
        "/v1/materials/update",
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");
    assert_eq!(body["code"], "FORBIDDEN");
    assert_eq!(body["message"], "missing required permission: materials:update");

    let (status, _) = call(app(local_client()), "GET", "/v1/materials/any", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn legacy_token_needs_rbac_context_for_permissions() {
    let token = format!("Bearer {}", legacy_token("admin"));

    let (status, body) = call(app(local_client()), "GET", "/v1/materials", Some(&token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "RBAC context required");

    let (status, _) = call(app(local_client()), "GET", "/v1/admin", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn role_wrappers_use_effective_role() {
    let token = format!("Bearer {}", teacher_token(&[]));

    let (status, _) = call(app(local_client()), "GET", "/v1/classes", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = call(app(local_client()), "GET", "/v1/admin", Some(&token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
#[allow(deprecated)]
async fn legacy_require_role_matches_exactly() {
    let router = access::apply(
        rbac::require_role(Router::new().route("/v1/reports", get(ok)), &["guardian"]),
        Access::new(local_client()),
    );

    let (status, _) = call(
        router.clone(),
        "GET",
        "/v1/reports",
        Some(&format!("Bearer {}", legacy_token("guardian"))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = call(
        router,
        "GET",
        "/v1/reports",
        Some(&format!("Bearer {}", legacy_token("student"))),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn enforcer_without_extractor_is_401() {
    let router = rbac::require_permission(
        Router::new().route("/v1/materials", get(ok)),
        "materials:read",
    );
    let (status, body) = call(router, "GET", "/v1/materials", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn skip_paths_bypass_validation() {
    let (status, _) = call(app(local_client()), "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = call(app(local_client()), "POST", "/v1/auth/login", None).await;
    assert_eq!(status, StatusCode::OK);
}

struct UnavailableValidator;

#[async_trait]
impl TokenValidator for UnavailableValidator {
    async fn validate(&self, _token: &str) -> Result<Principal, ValidationError> {
        Err(ValidationError::Unavailable("backend down".into()))
    }
}

#[tokio::test]
async fn validator_error_is_generic_401() {
    let (status, body) = call(
        app(Arc::new(UnavailableValidator)),
        "GET",
        "/v1/whoami",
        Some("Bearer anything"),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "token validation failed");
}

#[tokio::test]
async fn custom_unauthorized_handler_keeps_401() {
    let access = Access::new(local_client()).on_unauthorized(|message: &str| -> Response {
        (
            StatusCode::IM_A_TEAPOT,
            Json(json!({ "status": "denied", "reason": message })),
        )
            .into_response()
    });
    let router = access::apply(protected_routes(), access);

    let (status, body) = call(router, "GET", "/v1/whoami", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(
        body,
        json!({ "status": "denied", "reason": "authorization required" })
    );
}
