//! Permissive cross-origin headers for browser callers.
//!
//! Every response of a route group, including router-generated 405s and the
//! empty preflight reply, carries the same three headers.

use axum::extract::{Request, State};
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::Response;

#[derive(Clone)]
pub struct CorsHeaders {
    allow_methods: HeaderValue,
}

impl CorsHeaders {
    /// `methods` is the literal `Access-Control-Allow-Methods` value, e.g. `"POST, OPTIONS"`.
    pub fn new(methods: &'static str) -> Self {
        Self {
            allow_methods: HeaderValue::from_static(methods),
        }
    }

    fn apply(&self, response: &mut Response) {
        let headers = response.headers_mut();
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
        headers.insert(ACCESS_CONTROL_ALLOW_METHODS, self.allow_methods.clone());
        headers.insert(
            ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type"),
        );
    }
}

pub async fn with_cors(State(cors): State<CorsHeaders>, req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    cors.apply(&mut response);
    response
}

/// Reply to an `OPTIONS` preflight: 200 with no body.
pub async fn preflight() -> StatusCode {
    StatusCode::OK
}
