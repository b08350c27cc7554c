//! Error types for the authorization flows
//!
//! Every failure is returned to the caller of the operation that triggered
//! it (and to all coalesced waiters for a refresh). Nothing is retried
//! automatically; retry policy belongs to the embedding application.

use serde::Deserialize;

/// The documented error body returned by the token endpoint, e.g. for an
/// expired authorization code or an invalid code verifier.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthenticationError {
    /// Machine-readable error code ("invalid_grant", "invalid_client", ...)
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl std::fmt::Display for AuthenticationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.error_description {
            Some(description) => write!(f, "{}: {description}", self.error),
            None => write!(f, "{}", self.error),
        }
    }
}

/// Errors from authorization operations.
///
/// `Clone` so a single refresh outcome can be delivered to every coalesced
/// waiter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The provider redirected back with an `error` query parameter (the
    /// user declined, or the app is misconfigured).
    #[error("authorization request denied: {reason}")]
    AuthorizationDenied { reason: String },

    /// The state parameter supplied to the token request does not match the
    /// one recorded when the authorization URL was made. Possible CSRF or a
    /// stale browser session; no network call was made.
    #[error("state parameter mismatch: supplied {supplied:?}, received {received:?}")]
    InvalidState {
        supplied: Option<String>,
        received: Option<String>,
    },

    /// The redirect URI could not be used: unparseable, or missing the
    /// `code` query parameter.
    #[error("malformed redirect: {0}")]
    MalformedRedirect(String),

    /// Network-layer failure reaching the token endpoint. The caller may
    /// retry the triggering operation.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The token endpoint returned a documented error body.
    #[error("token endpoint error: {0}")]
    ProviderAuthentication(AuthenticationError),

    /// The response was missing required fields or was not valid JSON. The
    /// stored token state is untouched.
    #[error("decode error: {0}")]
    Decode(String),

    /// The operation needs authorization the manager does not hold: no
    /// refresh token stored, or the current grant does not cover the
    /// required scopes.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Missing or invalid client configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result alias for authorization operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<url::ParseError> for Error {
    fn from(error: url::ParseError) -> Self {
        Error::MalformedRedirect(error.to_string())
    }
}
