use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use common_auth::AuthError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Query is empty.")]
    EmptyQuery,
    #[error("{0}")]
    Internal(String),
    #[error("{0}")]
    Upstream(String),
    #[error("SesameAI client not initialized.")]
    NotInitialized,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::EmptyQuery => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::NotInitialized => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::Config(_) => ApiError::Internal(error.to_string()),
            AuthError::Upstream(_) | AuthError::Rejected { .. } | AuthError::Malformed(_) => {
                ApiError::Upstream(error.to_string())
            }
        }
    }
}
