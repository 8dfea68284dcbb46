use axum::{
    Json, Router,
    body::Body,
    http::{HeaderMap, Request, StatusCode, header},
    middleware,
    routing::get,
};
use chrono::Utc;
use provision_admin::{
    AccessGuard, GuardConfig, InMemoryRepository,
    auth::{AuthUser, SessionToken},
    guard::access_guard,
    models::{Role, User},
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::util::ServiceExt;

const HOUR_MS: i64 = 3_600_000;

// --- Helpers ---

fn user(id: &str, role: Role) -> User {
    User {
        id: id.to_string(),
        email: format!("{id}@example.com"),
        role,
        ..User::default()
    }
}

/// Echoes the identity headers a handler behind the guard receives.
async fn echo_identity(headers: HeaderMap) -> Json<Value> {
    let read = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    Json(json!({
        "user_id": read("x-user-id"),
        "role": read("x-user-role"),
    }))
}

/// Reads the identity through the extractor guarded handlers use.
async fn whoami(user: AuthUser) -> Json<Value> {
    Json(json!({"user_id": user.id, "role": user.role.as_str()}))
}

fn app_with(config: GuardConfig, repo: InMemoryRepository) -> Router {
    let guard = AccessGuard::new(config, Arc::new(repo));
    Router::new()
        .route("/api/flows", get(echo_identity))
        .route("/api/health/echo", get(echo_identity))
        .route("/api/whoami", get(whoami))
        .route("/admin/settings", get(|| async { "settings page" }))
        .layer(middleware::from_fn_with_state(guard, access_guard))
}

fn app() -> Router {
    app_with(
        GuardConfig::default(),
        InMemoryRepository::new().with_users([
            user("u1", Role::Admin),
            user("josé", Role::Admin),
            user("viewer", Role::User),
        ]),
    )
}

fn token_aged(id: &str, age_ms: i64) -> String {
    SessionToken {
        user_id: id.to_string(),
        issued_at_ms: Utc::now().timestamp_millis() - age_ms,
    }
    .encode()
}

fn get_with_cookie(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::COOKIE, format!("session={token}"))
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// --- Tests ---

#[tokio::test]
async fn test_admin_token_on_api_path_is_enriched() {
    let token = token_aged("u1", 1000);

    let response = app()
        .oneshot(get_with_cookie("/api/flows", &token))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    // Identity headers go to the handler only, never back to the client.
    assert!(response.headers().get("x-user-id").is_none());
    assert!(response.headers().get("x-user-role").is_none());

    let body = body_json(response).await;
    assert_eq!(body["user_id"], "u1");
    assert_eq!(body["role"], "ADMIN");
}

#[tokio::test]
async fn test_non_ascii_admin_id_is_enriched() {
    let token = token_aged("josé", 1000);

    let response = app()
        .oneshot(get_with_cookie("/api/whoami", &token))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["user_id"], "josé");
    assert_eq!(body["role"], "ADMIN");
}

#[tokio::test]
async fn test_expired_token_redirects_to_login() {
    let token = token_aged("u1", 25 * HOUR_MS);

    let response = app()
        .oneshot(get_with_cookie("/api/flows", &token))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers()[header::LOCATION], "/");
}

#[tokio::test]
async fn test_missing_token_redirects_to_login() {
    for uri in ["/api/flows", "/admin/settings"] {
        let response = app()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FOUND, "{uri}");
        assert_eq!(response.headers()[header::LOCATION], "/");
    }
}

#[tokio::test]
async fn test_bearer_header_is_accepted_without_cookie() {
    let token = token_aged("u1", 1000);

    let response = app()
        .oneshot(
            Request::builder()
                .uri("/api/flows")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["user_id"], "u1");
}

#[tokio::test]
async fn test_ordinary_user_is_redirected() {
    let token = token_aged("viewer", 1000);

    let response = app()
        .oneshot(get_with_cookie("/admin/settings", &token))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
}

#[tokio::test]
async fn test_admin_page_passes_without_enrichment() {
    let token = token_aged("u1", 1000);

    let response = app()
        .oneshot(get_with_cookie("/admin/settings", &token))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"settings page");
}

#[tokio::test]
async fn test_spoofed_identity_headers_are_stripped() {
    // Public path: no decision is made, but client-supplied identity must not survive.
    let response = app()
        .oneshot(
            Request::builder()
                .uri("/api/health/echo")
                .header("x-user-id", "u1")
                .header("x-user-role", "SUPER_ADMIN")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["user_id"], Value::Null);
    assert_eq!(body["role"], Value::Null);
}

#[tokio::test]
async fn test_guard_overrides_spoofed_headers_with_looked_up_identity() {
    let token = token_aged("u1", 1000);

    let response = app()
        .oneshot(
            Request::builder()
                .uri("/api/flows")
                .header(header::COOKIE, format!("session={token}"))
                .header("x-user-id", "someone-else")
                .header("x-user-role", "SUPER_ADMIN")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let body = body_json(response).await;
    assert_eq!(body["user_id"], "u1");
    assert_eq!(body["role"], "ADMIN");
}

#[tokio::test]
async fn test_unavailable_store_redirects_every_protected_request() {
    let app = app_with(
        GuardConfig::default(),
        InMemoryRepository::new()
            .with_users([user("u1", Role::Admin)])
            .failing(),
    );
    let token = token_aged("u1", 1000);

    let response = app
        .oneshot(get_with_cookie("/api/flows", &token))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
}

#[tokio::test]
async fn test_configured_login_redirect_is_used() {
    let config = GuardConfig {
        login_redirect: "/login".to_string(),
        ..GuardConfig::default()
    };
    let app = app_with(config, InMemoryRepository::new());

    let response = app
        .oneshot(get_with_cookie("/admin/settings", "bm90LWEtdG9rZW4="))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers()[header::LOCATION], "/login");
}
