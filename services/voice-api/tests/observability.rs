use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;
use voice_api::{build_router, AppState};

#[tokio::test]
async fn metrics_count_handled_requests() {
    let router = build_router(Arc::new(AppState::new(None)));

    let reply = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/voice")
                .body(Body::from(r#"{"query":"count me"}"#))
                .unwrap(),
        )
        .await
        .expect("reply response");
    assert_eq!(reply.status(), StatusCode::OK);

    let response = router
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .expect("metrics response");

    let (parts, body) = response.into_parts();
    assert_eq!(parts.status, StatusCode::OK);
    assert_eq!(
        parts.headers.get(header::CONTENT_TYPE).expect("content-type"),
        "text/plain; version=0.0.4"
    );

    let text = String::from_utf8(body.collect().await.unwrap().to_bytes().to_vec()).unwrap();
    assert!(text.contains("# TYPE http_requests_total counter"));
    assert!(text.contains(
        "http_requests_total{service=\"voice-api\",route=\"/api/voice\",code=\"200\"}"
    ));
}

#[tokio::test]
async fn health_reports_service_name() {
    let response = build_router(Arc::new(AppState::new(None)))
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .expect("health response");

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "voice-api");
}
