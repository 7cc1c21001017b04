//! Authentication primitives for talking to the Sesame AI identity service.
//!
//! Request handlers only ever see [`TokenProvider`]; the token lifecycle
//! (refresh, expiry, optional on-disk cache) stays inside
//! [`SesameTokenClient`].

mod cache;
mod sesame;

use async_trait::async_trait;
use thiserror::Error;

pub use sesame::{SesameSettings, SesameTokenClient};

/// Failure while obtaining an identity token.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The client cannot be built from the supplied settings.
    #[error("invalid auth configuration: {0}")]
    Config(String),
    /// The identity service could not be reached.
    #[error("identity service unreachable: {0}")]
    Upstream(String),
    /// The identity service answered with a non-success status.
    #[error("identity service rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
    /// The identity service answered with a body we cannot use.
    #[error("malformed identity service response: {0}")]
    Malformed(String),
}

/// Source of valid identity tokens.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Return an id token that is valid right now, refreshing it if needed.
    async fn obtain_valid_token(&self) -> Result<String, AuthError>;
}
