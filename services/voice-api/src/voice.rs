use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::{BytesRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;
use crate::AppState;

/// JSON body of the reply route. `query` may be any JSON value; see
/// [`query_text`] for which values count as a query.
#[derive(Debug, Default, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub query: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TokenParams {
    #[serde(default)]
    pub query: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReplyBody {
    pub reply: String,
}

#[derive(Debug, Serialize)]
pub struct TokenBody {
    pub id_token: String,
}

/// POST handler: echo the query back as a placeholder assistant reply.
pub async fn reply(
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<ReplyBody>, ApiError> {
    let body = body.map_err(|rejection| ApiError::Internal(rejection.body_text()))?;
    let request = parse_body(&body)?;
    let query = require_query(request.query.and_then(query_text))?;
    Ok(Json(ReplyBody {
        reply: reply_text(&query),
    }))
}

/// GET handler: hand out a valid Sesame id token for a non-empty query.
pub async fn token(
    State(state): State<Arc<AppState>>,
    params: Result<Query<TokenParams>, QueryRejection>,
) -> Result<Json<TokenBody>, ApiError> {
    let tokens = state.tokens.as_ref().ok_or(ApiError::NotInitialized)?;
    let Query(request) = params.map_err(|rejection| ApiError::Internal(rejection.body_text()))?;
    require_query(request.query)?;

    let id_token = tokens.obtain_valid_token().await.inspect_err(|error| {
        tracing::warn!(%error, "failed to obtain Sesame id token");
    })?;
    Ok(Json(TokenBody { id_token }))
}

pub fn reply_text(query: &str) -> String {
    format!("You said: {query}. This is a response from the Sesame AI voice assistant.")
}

/// Render a JSON query value as text. Values that are "falsy" (null, `false`,
/// zero, empty string, array or object) yield `None`.
pub fn query_text(value: Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::Bool(true) => Some("True".to_string()),
        Value::String(text) => Some(text).filter(|text| !text.is_empty()),
        Value::Number(number) => {
            let zero = number.as_f64() == Some(0.0);
            (!zero).then(|| number.to_string())
        }
        Value::Array(ref items) if items.is_empty() => None,
        Value::Object(ref fields) if fields.is_empty() => None,
        other => Some(other.to_string()),
    }
}

/// An empty body is an empty request; anything else must be a JSON object.
fn parse_body(body: &[u8]) -> Result<QueryRequest, ApiError> {
    if body.is_empty() {
        return Ok(QueryRequest::default());
    }
    serde_json::from_slice(body).map_err(|err| ApiError::Internal(err.to_string()))
}

fn require_query(query: Option<String>) -> Result<String, ApiError> {
    match query {
        Some(query) if !query.is_empty() => Ok(query),
        _ => Err(ApiError::EmptyQuery),
    }
}
