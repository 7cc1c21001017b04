use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::cache::{self, CachedToken};
use crate::{AuthError, TokenProvider};

const DEFAULT_TOKEN_ENDPOINT: &str = "https://securetoken.googleapis.com/v1/token";
const DEFAULT_EXPIRES_IN_SECS: u64 = 3600;

/// Settings for [`SesameTokenClient`].
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct SesameSettings {
    pub token_endpoint: String,
    pub api_key: String,
    pub refresh_token: Option<String>,
    /// Where refreshed tokens are persisted. Unset keeps tokens in memory only.
    pub token_cache_path: Option<PathBuf>,
    /// Tokens closer than this to expiry are refreshed before use.
    pub refresh_skew_secs: u64,
    pub request_timeout_ms: u64,
}

impl Default for SesameSettings {
    fn default() -> Self {
        Self {
            token_endpoint: DEFAULT_TOKEN_ENDPOINT.to_string(),
            api_key: String::new(),
            refresh_token: None,
            token_cache_path: None,
            refresh_skew_secs: 60,
            request_timeout_ms: 10_000,
        }
    }
}

impl fmt::Debug for SesameSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SesameSettings")
            .field("token_endpoint", &self.token_endpoint)
            .field("api_key", &redacted(!self.api_key.is_empty()))
            .field("refresh_token", &redacted(self.refresh_token.is_some()))
            .field("token_cache_path", &self.token_cache_path)
            .field("refresh_skew_secs", &self.refresh_skew_secs)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .finish()
    }
}

fn redacted(present: bool) -> &'static str {
    if present {
        "<redacted>"
    } else {
        "<unset>"
    }
}

/// Identity client for the Sesame AI service.
///
/// Exchanges a long-lived refresh token for short-lived id tokens and hands
/// out the current id token until it is about to expire. Concurrent callers
/// share a single refresh.
pub struct SesameTokenClient {
    endpoint: Url,
    api_key: String,
    skew: Duration,
    cache_path: Option<PathBuf>,
    http: reqwest::Client,
    state: Mutex<TokenState>,
}

#[derive(Debug)]
struct TokenState {
    refresh_token: String,
    id_token: Option<String>,
    expires_at: u64,
}

impl TokenState {
    fn usable_id_token(&self, now: u64, skew: Duration) -> Option<&str> {
        match &self.id_token {
            Some(token) if self.expires_at > now.saturating_add(skew.as_secs()) => {
                Some(token.as_str())
            }
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<ExpiresIn>,
}

/// The identity service encodes `expires_in` as a decimal string; accept a
/// bare number as well.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ExpiresIn {
    Seconds(u64),
    Text(String),
}

impl ExpiresIn {
    fn as_secs(&self) -> Result<u64, AuthError> {
        match self {
            ExpiresIn::Seconds(secs) => Ok(*secs),
            ExpiresIn::Text(text) => text
                .trim()
                .parse()
                .map_err(|_| AuthError::Malformed(format!("invalid expires_in value {text:?}"))),
        }
    }
}

impl SesameTokenClient {
    pub fn new(settings: &SesameSettings) -> Result<Self, AuthError> {
        if settings.api_key.trim().is_empty() {
            return Err(AuthError::Config("missing Sesame API key".to_string()));
        }
        let endpoint = Url::parse(&settings.token_endpoint).map_err(|err| {
            AuthError::Config(format!(
                "invalid token endpoint {}: {err}",
                settings.token_endpoint
            ))
        })?;

        let cached = settings.token_cache_path.as_deref().and_then(cache::load);
        let state = match cached {
            Some(cached) => {
                tracing::debug!("restored Sesame token from cache");
                TokenState {
                    refresh_token: cached.refresh_token,
                    id_token: Some(cached.id_token),
                    expires_at: cached.expires_at,
                }
            }
            None => {
                let refresh_token = settings
                    .refresh_token
                    .clone()
                    .filter(|token| !token.trim().is_empty())
                    .ok_or_else(|| AuthError::Config("no refresh token available".to_string()))?;
                TokenState {
                    refresh_token,
                    id_token: None,
                    expires_at: 0,
                }
            }
        };

        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(settings.request_timeout_ms.max(1)))
            .build()
            .map_err(|err| AuthError::Config(format!("failed to build HTTP client: {err}")))?;

        Ok(Self {
            endpoint,
            api_key: settings.api_key.clone(),
            skew: Duration::from_secs(settings.refresh_skew_secs),
            cache_path: settings.token_cache_path.clone(),
            http,
            state: Mutex::new(state),
        })
    }

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse, AuthError> {
        tracing::debug!(endpoint = %self.endpoint, "refreshing Sesame id token");
        let response = self
            .http
            .post(self.endpoint.clone())
            .query(&[("key", self.api_key.as_str())])
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await
            .map_err(|err| AuthError::Upstream(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                message: error_message(&body)
                    .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string()),
            });
        }

        response
            .json::<RefreshResponse>()
            .await
            .map_err(|err| AuthError::Malformed(err.to_string()))
    }

    async fn persist(&self, state: &TokenState) {
        let (Some(path), Some(id_token)) = (&self.cache_path, &state.id_token) else {
            return;
        };
        let entry = CachedToken {
            id_token: id_token.clone(),
            refresh_token: state.refresh_token.clone(),
            expires_at: state.expires_at,
        };
        if let Err(error) = cache::save(path, &entry).await {
            tracing::warn!(path = %path.display(), %error, "failed to write token cache");
        }
    }
}

#[async_trait]
impl TokenProvider for SesameTokenClient {
    async fn obtain_valid_token(&self) -> Result<String, AuthError> {
        let mut state = self.state.lock().await;
        if let Some(token) = state.usable_id_token(unix_now(), self.skew) {
            return Ok(token.to_string());
        }

        let refreshed = self.refresh(&state.refresh_token).await?;
        let expires_in = match &refreshed.expires_in {
            Some(value) => value.as_secs()?,
            None => DEFAULT_EXPIRES_IN_SECS,
        };

        state.expires_at = unix_now().saturating_add(expires_in);
        if let Some(rotated) = refreshed.refresh_token.filter(|token| !token.is_empty()) {
            state.refresh_token = rotated;
        }
        state.id_token = Some(refreshed.id_token.clone());
        tracing::info!(expires_in, "obtained Sesame id token");

        self.persist(&state).await;
        Ok(refreshed.id_token)
    }
}

/// Pull a human-readable message out of an identity service error body.
fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let error = value.get("error")?;
    error
        .get("message")
        .and_then(|message| message.as_str())
        .or_else(|| error.as_str())
        .map(str::to_string)
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}
