//! The authorization manager
//!
//! Owns one token state and one backend, and orchestrates the grant:
//!
//! 1. `make_authorization_url` builds the consent URL and records the CSRF
//!    state value.
//! 2. The embedding application runs the redirect dance and hands the
//!    resulting URL to `request_tokens`, which validates it and performs
//!    the code exchange.
//! 3. `valid_access_token` / `refresh` keep the access token fresh for the
//!    API client; concurrent refreshes coalesce into one network call.
//! 4. `deauthorize` clears everything.
//!
//! Mutations of the token state and the state slot are serialized behind a
//! single lock that is never held across an await; the network runs on a
//! spawned task so an abandoned waiter cannot cancel a refresh other
//! callers are attached to.

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use common::Secret;
use futures::FutureExt;
use futures::future;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, broadcast, oneshot};
use tracing::{debug, info, warn};
use url::Url;

use crate::backend::{Backend, DirectBackend};
use crate::constants;
use crate::error::{Error, Result};
use crate::scope::{self, Scope};
use crate::token::{self, TokenState};

/// Notification fired after a logical transition of the token state has
/// been applied. Exactly one event per transition; a single call never
/// produces both variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationEvent {
    /// The token state was replaced or updated (code exchange, refresh).
    Changed,
    /// The token state was cleared by `deauthorize`.
    Deauthorized,
}

/// Outcome handle shared by every caller attached to an in-flight refresh.
type PendingRefresh = future::Shared<future::BoxFuture<'static, Result<TokenState>>>;

#[derive(Debug, Default)]
struct ManagerState {
    token: TokenState,
    /// Most recently issued CSRF state value. A single slot, not a history:
    /// issuing a second authorization URL before completing the first
    /// leaves only the second value retrievable.
    current_state: Option<String>,
}

struct Inner {
    state: RwLock<ManagerState>,
    events: broadcast::Sender<AuthorizationEvent>,
    refresh_slot: Mutex<Option<PendingRefresh>>,
}

impl Inner {
    fn read_state(&self) -> RwLockReadGuard<'_, ManagerState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, ManagerState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Manages the Authorization Code Flow (with or without PKCE) for one
/// client application.
///
/// Cheap to clone; clones share the same token state, event stream, and
/// refresh coalescing, so one manager can serve any number of concurrent
/// request-issuing tasks.
#[derive(Clone)]
pub struct AuthorizationManager {
    client_id: String,
    client_secret: Option<Secret<String>>,
    backend: Arc<dyn Backend>,
    inner: Arc<Inner>,
}

/// Serialized form: one flat JSON object holding the client credentials
/// and the token state, for storage between process runs.
#[derive(Serialize, Deserialize)]
struct PersistedAuthorization {
    client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    client_secret: Option<Secret<String>>,
    #[serde(flatten)]
    token: TokenState,
}

impl AuthorizationManager {
    /// Create a manager over an arbitrary backend. `client_secret` is
    /// absent for public-client and proxy variants.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: Option<Secret<String>>,
        backend: impl Backend + 'static,
    ) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            client_id: client_id.into(),
            client_secret,
            backend: Arc::new(backend),
            inner: Arc::new(Inner {
                state: RwLock::new(ManagerState::default()),
                events,
                refresh_slot: Mutex::new(None),
            }),
        }
    }

    /// Standard Authorization Code Flow for a confidential client, talking
    /// directly to the provider.
    pub fn authorization_code_flow(
        client_id: impl Into<String>,
        client_secret: Secret<String>,
    ) -> Self {
        let client_id = client_id.into();
        let backend = DirectBackend::confidential(client_id.clone(), client_secret.clone());
        Self::new(client_id, Some(client_secret), backend)
    }

    /// Authorization Code Flow with PKCE for a public client (no secret).
    pub fn pkce(client_id: impl Into<String>) -> Self {
        let client_id = client_id.into();
        let backend = DirectBackend::public(client_id.clone());
        Self::new(client_id, None, backend)
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Subscribe to change/deauthorization notifications. Events are sent
    /// after the corresponding transition has been applied.
    pub fn subscribe(&self) -> broadcast::Receiver<AuthorizationEvent> {
        self.inner.events.subscribe()
    }

    /// Build the URL the user must open to grant access.
    ///
    /// `state` (when given) is recorded as the manager's current state
    /// value for validation in [`request_tokens`](Self::request_tokens);
    /// that is the only side effect. `code_challenge` is for the PKCE flow
    /// and adds the fixed `code_challenge_method=S256`. Fails only on a
    /// malformed redirect URI; no network is involved.
    pub fn make_authorization_url(
        &self,
        redirect_uri: &str,
        scopes: &HashSet<Scope>,
        state: Option<&str>,
        code_challenge: Option<&str>,
        show_dialog: Option<bool>,
    ) -> Result<Url> {
        let redirect = Url::parse(redirect_uri).map_err(|e| {
            Error::MalformedRedirect(format!("invalid redirect URI {redirect_uri:?}: {e}"))
        })?;

        let mut url = constants::authorize_endpoint();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("client_id", &self.client_id);
            query.append_pair("response_type", "code");
            query.append_pair("redirect_uri", redirect.as_str());
            if !scopes.is_empty() {
                query.append_pair("scope", &scope::scope_string(scopes));
            }
            if let Some(state) = state {
                query.append_pair("state", state);
            }
            if let Some(challenge) = code_challenge {
                query.append_pair("code_challenge_method", "S256");
                query.append_pair("code_challenge", challenge);
            }
            if let Some(show_dialog) = show_dialog {
                query.append_pair("show_dialog", if show_dialog { "true" } else { "false" });
            }
        }

        if let Some(state) = state {
            self.inner.write_state().current_state = Some(state.to_owned());
        }
        Ok(url)
    }

    /// Complete the grant: validate the redirect the provider produced and
    /// exchange its authorization code for tokens.
    ///
    /// `state` must reproduce the value recorded by
    /// [`make_authorization_url`](Self::make_authorization_url) (both may
    /// be absent). `code_verifier` is required for the PKCE flow.
    ///
    /// On success the token state is replaced wholesale, one
    /// [`AuthorizationEvent::Changed`] fires, and the state slot is
    /// cleared. On any failure the token state and the slot are untouched.
    pub async fn request_tokens(
        &self,
        redirect_uri_with_query: &Url,
        state: Option<&str>,
        code_verifier: Option<&str>,
    ) -> Result<()> {
        let mut error_reason = None;
        let mut code = None;
        for (key, value) in redirect_uri_with_query.query_pairs() {
            match key.as_ref() {
                "error" => error_reason = Some(value.into_owned()),
                "code" => code = Some(value.into_owned()),
                _ => {}
            }
        }

        if let Some(reason) = error_reason {
            debug!(reason, "provider redirected back with an error");
            return Err(Error::AuthorizationDenied { reason });
        }

        {
            let guard = self.inner.read_state();
            let received = guard.current_state.as_deref();
            if state != received {
                warn!("state parameter does not match the issued value");
                return Err(Error::InvalidState {
                    supplied: state.map(ToOwned::to_owned),
                    received: received.map(ToOwned::to_owned),
                });
            }
        }

        let code = code.ok_or_else(|| {
            Error::MalformedRedirect("redirect URI query is missing the \"code\" parameter".into())
        })?;

        let base_redirect = base_redirect_uri(redirect_uri_with_query);
        let response = self
            .backend
            .exchange_code(&code, &base_redirect, code_verifier)
            .await?;
        let token = TokenState::from_exchange_response(&response, token::now_millis())?;

        {
            let mut guard = self.inner.write_state();
            guard.token = token;
            guard.current_state = None;
        }
        let _ = self.inner.events.send(AuthorizationEvent::Changed);
        info!("access and refresh tokens received");
        Ok(())
    }

    /// Refresh the access token, coalescing concurrent attempts.
    ///
    /// With `only_if_expired`, returns the current state immediately (zero
    /// network calls) while the token is valid beyond `tolerance`. At most
    /// one refresh network call is in flight per manager: callers arriving
    /// while one is running attach to it and receive the identical outcome,
    /// whatever tolerance they passed. One
    /// [`AuthorizationEvent::Changed`] fires per coalesced batch.
    ///
    /// A caller that stops awaiting only abandons its own attachment; the
    /// refresh itself runs to completion on a spawned task.
    pub async fn refresh(&self, only_if_expired: bool, tolerance: Duration) -> Result<TokenState> {
        let mut slot = self.inner.refresh_slot.lock().await;
        if let Some(pending) = slot.as_ref() {
            let pending = pending.clone();
            drop(slot);
            debug!("refresh already in flight, awaiting its outcome");
            return pending.await;
        }

        let (snapshot, refresh_token) = {
            let guard = self.inner.read_state();
            (guard.token.clone(), guard.token.refresh_token.clone())
        };
        if only_if_expired && !snapshot.is_expired(tolerance) {
            return Ok(snapshot);
        }
        let Some(refresh_token) = refresh_token else {
            return Err(Error::Unauthorized(
                "cannot refresh: no refresh token is stored".into(),
            ));
        };

        let (tx, rx) = oneshot::channel::<Result<TokenState>>();
        let pending: PendingRefresh = async move {
            rx.await.unwrap_or_else(|_| {
                Err(Error::Transport(
                    "refresh task dropped before completing".into(),
                ))
            })
        }
        .boxed()
        .shared();
        *slot = Some(pending.clone());
        drop(slot);

        let backend = Arc::clone(&self.backend);
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let result = match backend.refresh(&refresh_token).await {
                Ok(response) => {
                    let updated = {
                        let mut guard = inner.write_state();
                        guard.token.apply_refresh(&response, token::now_millis());
                        guard.token.clone()
                    };
                    let _ = inner.events.send(AuthorizationEvent::Changed);
                    info!("access token refreshed");
                    Ok(updated)
                }
                Err(error) => {
                    warn!(error = %error, "token refresh failed");
                    Err(error)
                }
            };
            // Tear down the in-flight slot before delivering the outcome,
            // so a new refresh may start as soon as this one is observable.
            *inner.refresh_slot.lock().await = None;
            let _ = tx.send(result);
        });

        pending.await
    }

    /// A valid access token for a request needing `required_scopes`,
    /// refreshing first when the stored token is expired or about to be.
    pub async fn valid_access_token(&self, required_scopes: &HashSet<Scope>) -> Result<String> {
        if !self.is_authorized(required_scopes) {
            return Err(Error::Unauthorized(format!(
                "current grant does not cover the required scopes: {}",
                scope::scope_string(required_scopes)
            )));
        }
        let state = self
            .refresh(true, constants::DEFAULT_EXPIRATION_TOLERANCE)
            .await?;
        state
            .access_token
            .ok_or_else(|| Error::Unauthorized("no access token is stored".into()))
    }

    /// Whether an access token is present and covers `required_scopes`.
    /// A pure snapshot read; never refreshes.
    pub fn is_authorized(&self, required_scopes: &HashSet<Scope>) -> bool {
        self.inner.read_state().token.authorized_for(required_scopes)
    }

    /// Whether the access token is missing or expires within `tolerance`.
    /// A pure snapshot read; never refreshes.
    pub fn access_token_is_expired(&self, tolerance: Duration) -> bool {
        self.inner.read_state().token.is_expired(tolerance)
    }

    /// Snapshot of the current token state.
    pub fn token_state(&self) -> TokenState {
        self.inner.read_state().token.clone()
    }

    /// Clear the token state and the recorded state value.
    ///
    /// Emits exactly one [`AuthorizationEvent::Deauthorized`] per call
    /// (never `Changed`). No network is involved.
    pub fn deauthorize(&self) {
        {
            let mut guard = self.inner.write_state();
            guard.token = TokenState::default();
            guard.current_state = None;
        }
        let _ = self.inner.events.send(AuthorizationEvent::Deauthorized);
        info!("authorization cleared");
    }

    /// Serialize the manager to a single JSON object for storage between
    /// process runs.
    pub fn to_json(&self) -> Result<String> {
        let persisted = PersistedAuthorization {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            token: self.inner.read_state().token.clone(),
        };
        serde_json::to_string(&persisted)
            .map_err(|e| Error::Decode(format!("serializing authorization state: {e}")))
    }

    /// Restore a manager persisted by [`to_json`](Self::to_json). The
    /// backend is supplied by the caller. Rejects objects missing
    /// `client_id`. Fires no events.
    pub fn from_json(json: &str, backend: impl Backend + 'static) -> Result<Self> {
        let persisted: PersistedAuthorization = serde_json::from_str(json)
            .map_err(|e| Error::Decode(format!("parsing authorization state: {e}")))?;
        let manager = Self::new(persisted.client_id, persisted.client_secret, backend);
        manager.inner.write_state().token = persisted.token;
        Ok(manager)
    }
}

impl std::fmt::Debug for AuthorizationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationManager")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret)
            .field("token", &self.inner.read_state().token)
            .finish_non_exhaustive()
    }
}

/// The redirect URI as it was registered: query and fragment stripped, and
/// a trailing slash removed from the path, matching what the provider
/// compares against during the exchange.
fn base_redirect_uri(redirect_uri_with_query: &Url) -> Url {
    let mut base = redirect_uri_with_query.clone();
    base.set_query(None);
    base.set_fragment(None);
    let path = base.path();
    if path.len() > 1 && path.ends_with('/') {
        let trimmed = path.trim_end_matches('/').to_owned();
        base.set_path(&trimmed);
    }
    base
}
