pub mod config;
pub mod cors;
pub mod error;
pub mod voice;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{connect_info::ConnectInfo, DefaultBodyLimit, MatchedPath, Request};
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::{from_fn, from_fn_with_state, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use common_auth::{SesameSettings, SesameTokenClient, TokenProvider};
use common_obs::{
    encode_prometheus_metrics, health_router, http_requests_total, PROMETHEUS_CONTENT_TYPE,
};
use cors::CorsHeaders;
use tracing::{info_span, Instrument};
use uuid::Uuid;

pub const SERVICE_NAME: &str = "voice-api";
pub const REPLY_PATH: &str = "/api/voice";
pub const TOKEN_PATH: &str = "/api/voice/token";
/// Largest reply body buffered before answering with a JSON error.
pub const REPLY_BODY_LIMIT: usize = 8 * 1024 * 1024;
const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone)]
pub struct AppState {
    /// `None` when the identity client could not be built at startup.
    pub tokens: Option<Arc<dyn TokenProvider>>,
}

impl AppState {
    pub fn new(tokens: Option<Arc<dyn TokenProvider>>) -> Self {
        Self { tokens }
    }

    /// Build the Sesame identity client once for the whole process. A failure
    /// is logged here and later reported per request as 503.
    pub fn connect(settings: &SesameSettings) -> Self {
        match SesameTokenClient::new(settings) {
            Ok(client) => {
                tracing::info!(endpoint = %settings.token_endpoint, "Sesame client initialized");
                Self::new(Some(Arc::new(client)))
            }
            Err(error) => {
                tracing::error!(%error, "Sesame client initialization failed");
                Self::new(None)
            }
        }
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let reply = post(voice::reply)
        .options(cors::preflight)
        .layer(DefaultBodyLimit::max(REPLY_BODY_LIMIT))
        .layer(from_fn_with_state(
            CorsHeaders::new("POST, OPTIONS"),
            cors::with_cors,
        ));
    let token = get(voice::token)
        .options(cors::preflight)
        .layer(from_fn_with_state(
            CorsHeaders::new("GET, OPTIONS"),
            cors::with_cors,
        ));

    let voice_routes: Router = Router::new()
        .route(REPLY_PATH, reply)
        .route(TOKEN_PATH, token)
        .with_state(state);

    Router::new()
        .route("/metrics", get(metrics))
        .merge(voice_routes)
        .merge(health_router(SERVICE_NAME))
        .layer(from_fn(request_context))
}

async fn request_context(mut req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let remote_addr = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let request_id = match req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
    {
        Some(id) => id.to_string(),
        None => {
            let id = Uuid::new_v4().to_string();
            if let Ok(value) = HeaderValue::from_str(&id) {
                req.headers_mut().insert(REQUEST_ID_HEADER, value);
            }
            id
        }
    };

    let span = info_span!(
        "http.request",
        method = %method,
        path = %path,
        request_id = request_id.as_str()
    );

    let start = Instant::now();
    span.in_scope(|| {
        tracing::info!(
            event = "request_start",
            method = %method,
            path = %path,
            remote_addr = remote_addr.as_str()
        )
    });
    let mut response = next.run(req).instrument(span.clone()).await;

    let status = response.status();
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    span.in_scope(|| {
        tracing::info!(
            event = "request_end",
            method = %method,
            path = %path,
            status = status.as_u16(),
            latency_ms
        )
    });
    http_requests_total().inc(&[SERVICE_NAME, route.as_str(), status.as_str()], 1);

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    response
}

async fn metrics() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static(PROMETHEUS_CONTENT_TYPE),
        )],
        encode_prometheus_metrics(),
    )
}
