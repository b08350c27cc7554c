//! Token state and token endpoint response handling
//!
//! `TokenResponse` is the wire shape returned by both the code exchange and
//! the refresh. `expires_in` is a delta in seconds from the response time;
//! it is converted to an absolute unix millisecond timestamp the moment the
//! response is decoded, and only the absolute form is ever stored.
//!
//! `TokenState` is the record the authorization manager owns: replaced
//! wholesale by a code exchange, merged field-wise by a refresh (a refresh
//! response may omit the refresh token and scopes; omitted fields never
//! overwrite stored ones), cleared by deauthorization.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::scope::{self, Scope};

/// Current unix time in milliseconds.
pub(crate) fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Response from the token endpoint for both exchange and refresh.
///
/// `refresh_token` is always present on the initial exchange; on a refresh
/// the provider may rotate it or omit it entirely.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    /// Seconds until the access token expires (delta, not absolute)
    pub expires_in: u64,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Space-separated scope identifiers
    #[serde(default)]
    pub scope: Option<String>,
}

/// The token record owned by an authorization manager.
///
/// Invariant: an access token whose expiration date is unknown is treated
/// as already expired.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    /// Absolute expiration as unix milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scopes: Option<HashSet<Scope>>,
}

impl TokenState {
    /// Build a fresh state from a token endpoint response, anchoring
    /// `expires_in` to `received_at` (unix milliseconds).
    pub fn from_response(response: &TokenResponse, received_at: u64) -> Self {
        Self {
            access_token: Some(response.access_token.clone()),
            token_type: Some(
                response
                    .token_type
                    .clone()
                    .unwrap_or_else(|| "Bearer".to_owned()),
            ),
            expiration_date: Some(received_at + response.expires_in * 1000),
            refresh_token: response.refresh_token.clone(),
            scopes: response.scope.as_deref().map(scope::parse_scope_string),
        }
    }

    /// Build the state for a completed code exchange, which must include a
    /// refresh token. Its absence is a fatal decode error, not a partial
    /// update.
    pub(crate) fn from_exchange_response(
        response: &TokenResponse,
        received_at: u64,
    ) -> Result<Self> {
        if response.refresh_token.is_none() {
            return Err(Error::Decode(
                "token response is missing \"refresh_token\"".into(),
            ));
        }
        Ok(Self::from_response(response, received_at))
    }

    /// Merge a refresh response into this state. The access token and
    /// expiration always update; refresh token, token type, and scopes only
    /// when the response carries them.
    pub(crate) fn apply_refresh(&mut self, response: &TokenResponse, received_at: u64) {
        self.access_token = Some(response.access_token.clone());
        self.expiration_date = Some(received_at + response.expires_in * 1000);
        if let Some(token_type) = &response.token_type {
            self.token_type = Some(token_type.clone());
        }
        if let Some(refresh_token) = &response.refresh_token {
            self.refresh_token = Some(refresh_token.clone());
        }
        if let Some(scope) = &response.scope {
            self.scopes = Some(scope::parse_scope_string(scope));
        }
    }

    /// Whether the access token is missing or expires within `tolerance`.
    pub fn is_expired(&self, tolerance: Duration) -> bool {
        if self.access_token.is_none() {
            return true;
        }
        match self.expiration_date {
            Some(expiration) => now_millis() + tolerance.as_millis() as u64 >= expiration,
            None => true,
        }
    }

    /// Whether an access token is present and its scopes cover `required`.
    /// An empty `required` set only checks token presence.
    pub fn authorized_for(&self, required: &HashSet<Scope>) -> bool {
        if self.access_token.is_none() {
            return false;
        }
        if required.is_empty() {
            return true;
        }
        match &self.scopes {
            Some(granted) => required.is_subset(granted),
            None => false,
        }
    }
}
