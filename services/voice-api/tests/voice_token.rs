use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use common_auth::{AuthError, TokenProvider};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use voice_api::{build_router, AppState};

#[derive(Default)]
struct StaticTokens {
    calls: AtomicUsize,
}

#[async_trait]
impl TokenProvider for StaticTokens {
    async fn obtain_valid_token(&self) -> Result<String, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok("id-token-123".to_string())
    }
}

struct FailingTokens;

#[async_trait]
impl TokenProvider for FailingTokens {
    async fn obtain_valid_token(&self) -> Result<String, AuthError> {
        Err(AuthError::Rejected {
            status: 400,
            message: "INVALID_REFRESH_TOKEN".to_string(),
        })
    }
}

async fn get(state: AppState, uri: &str) -> Response {
    build_router(Arc::new(state))
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .expect("response")
}

async fn json_body(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}

#[tokio::test]
async fn token_is_returned_for_non_empty_query() {
    let tokens = Arc::new(StaticTokens::default());
    let state = AppState::new(Some(tokens.clone()));

    let response = get(state, "/api/voice/token?query=hello").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    assert_eq!(
        response.headers()["access-control-allow-methods"],
        "GET, OPTIONS"
    );
    assert_eq!(json_body(response).await, json!({ "id_token": "id-token-123" }));
    assert_eq!(tokens.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn missing_query_is_rejected_without_fetching_token() {
    let tokens = Arc::new(StaticTokens::default());

    for uri in ["/api/voice/token", "/api/voice/token?query="] {
        let response = get(AppState::new(Some(tokens.clone())), uri).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await, json!({ "error": "Query is empty." }));
    }
    assert_eq!(tokens.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn malformed_query_string_is_server_error() {
    let tokens = Arc::new(StaticTokens::default());
    let state = AppState::new(Some(tokens.clone()));

    let response = get(state, "/api/voice/token?query=a&query=b").await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    let body = json_body(response).await;
    let message = body["error"].as_str().expect("error message");
    assert!(message.contains("query"), "unexpected description: {message}");
    assert_eq!(tokens.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn uninitialized_client_is_service_unavailable() {
    let response = get(AppState::new(None), "/api/voice/token?query=hello").await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    assert_eq!(
        json_body(response).await,
        json!({ "error": "SesameAI client not initialized." })
    );
}

#[tokio::test]
async fn uninitialized_client_wins_over_empty_query() {
    let response = get(AppState::new(None), "/api/voice/token").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn identity_failure_is_bad_gateway() {
    let state = AppState::new(Some(Arc::new(FailingTokens)));
    let response = get(state, "/api/voice/token?query=hello").await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = json_body(response).await;
    assert!(body["error"]
        .as_str()
        .expect("error message")
        .contains("INVALID_REFRESH_TOKEN"));
}

#[tokio::test]
async fn token_preflight_uses_get_methods() {
    let response = build_router(Arc::new(AppState::new(None)))
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/api/voice/token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["access-control-allow-methods"],
        "GET, OPTIONS"
    );
    assert_eq!(
        response.headers()["access-control-allow-headers"],
        "Content-Type"
    );
}

#[test]
fn connect_without_credentials_leaves_client_uninitialized() {
    let state = AppState::connect(&common_auth::SesameSettings::default());
    assert!(state.tokens.is_none());
}
