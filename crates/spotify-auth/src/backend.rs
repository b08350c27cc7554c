//! Backend strategies for the token endpoint exchanges
//!
//! The authorization manager is written once against the [`Backend`] trait
//! and is blind to which strategy is in use. Two strategies exist:
//!
//! - [`DirectBackend`] talks to the provider's token endpoint itself. A
//!   confidential client sends its credentials via Basic-Auth; a public
//!   (PKCE) client has no secret and sends its client id in the body.
//! - [`ProxyBackend`] talks to a caller-operated intermediary that holds
//!   the client secret server-side. It can translate intermediary-specific
//!   error bodies into this crate's error taxonomy via a pluggable hook.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use common::Secret;
use tracing::debug;
use url::Url;

use crate::constants;
use crate::error::{AuthenticationError, Error, Result};
use crate::http::{HttpRequest, HttpResponse, HttpTransport, Transport};
use crate::token::TokenResponse;

/// Hook for translating an intermediary's error body into a local error
/// before the response reaches the manager. Called once per HTTP response;
/// a `Some` return is surfaced verbatim. Must be side-effect-free.
pub type DecodeServerErrorHook = Arc<dyn Fn(u16, &[u8]) -> Option<Error> + Send + Sync>;

/// The capability set the manager needs: the two token endpoint exchanges.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn Backend>`). Implementations are stateless and safe to call
/// concurrently.
pub trait Backend: Send + Sync {
    /// Exchange an authorization code for the access and refresh tokens.
    ///
    /// `redirect_uri` is the base redirect URI (query and fragment already
    /// stripped); it must match the one the authorization URL was built
    /// with. `code_verifier` is present for the PKCE flow only.
    fn exchange_code<'a>(
        &'a self,
        code: &'a str,
        redirect_uri: &'a Url,
        code_verifier: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Result<TokenResponse>> + Send + 'a>>;

    /// Exchange a refresh token for a new access token.
    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<TokenResponse>> + Send + 'a>>;
}

impl<B: Backend + ?Sized> Backend for Arc<B> {
    fn exchange_code<'a>(
        &'a self,
        code: &'a str,
        redirect_uri: &'a Url,
        code_verifier: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Result<TokenResponse>> + Send + 'a>> {
        (**self).exchange_code(code, redirect_uri, code_verifier)
    }

    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<TokenResponse>> + Send + 'a>> {
        (**self).refresh(refresh_token)
    }
}

/// Decode a token endpoint response shared by both strategies.
///
/// Order: intermediary hook first (proxy only), then the success body, then
/// the documented `{"error", "error_description"}` shape.
fn decode_token_response(
    response: &HttpResponse,
    decode_server_error: Option<&DecodeServerErrorHook>,
) -> Result<TokenResponse> {
    if let Some(hook) = decode_server_error {
        if let Some(error) = hook(response.status, &response.body) {
            return Err(error);
        }
    }
    if response.is_success() {
        return serde_json::from_slice(&response.body)
            .map_err(|e| Error::Decode(format!("invalid token response: {e}")));
    }
    if let Ok(authentication_error) =
        serde_json::from_slice::<AuthenticationError>(&response.body)
    {
        return Err(Error::ProviderAuthentication(authentication_error));
    }
    Err(Error::Decode(format!(
        "token endpoint returned {} with an undecodable body",
        response.status
    )))
}

/// Talks directly to the provider's token endpoint.
pub struct DirectBackend {
    client_id: String,
    client_secret: Option<Secret<String>>,
    transport: Arc<dyn Transport>,
}

impl DirectBackend {
    /// Backend for a confidential client (standard Authorization Code
    /// Flow). Credentials travel in a Basic-Auth header.
    pub fn confidential(client_id: impl Into<String>, client_secret: Secret<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: Some(client_secret),
            transport: Arc::new(HttpTransport::new()),
        }
    }

    /// Backend for a public client (PKCE flow). No secret; the client id
    /// travels in the request body.
    pub fn public(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            transport: Arc::new(HttpTransport::new()),
        }
    }

    /// Replace the transport (testing, custom clients).
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    /// Build a backend from `SPOTIFY_CLIENT_ID` and, when set,
    /// `SPOTIFY_CLIENT_SECRET`. Without a secret the backend behaves as a
    /// public PKCE client.
    pub fn from_env() -> Result<Self> {
        let client_id = std::env::var(constants::CLIENT_ID_ENV)
            .map_err(|_| Error::Config(format!("{} is not set", constants::CLIENT_ID_ENV)))?;
        let client_secret = std::env::var(constants::CLIENT_SECRET_ENV)
            .ok()
            .map(Secret::new);
        Ok(Self {
            client_id,
            client_secret,
            transport: Arc::new(HttpTransport::new()),
        })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    fn token_request<'a>(&'a self, mut params: Vec<(&'a str, &'a str)>) -> HttpRequest {
        if self.client_secret.is_none() {
            params.push(("client_id", self.client_id.as_str()));
        }
        let mut request = HttpRequest::post_form(constants::token_endpoint(), &params);
        if let Some(secret) = &self.client_secret {
            request = request.with_basic_auth(&self.client_id, secret.expose());
        }
        request
    }
}

impl fmt::Debug for DirectBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectBackend")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret)
            .finish_non_exhaustive()
    }
}

impl Backend for DirectBackend {
    fn exchange_code<'a>(
        &'a self,
        code: &'a str,
        redirect_uri: &'a Url,
        code_verifier: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Result<TokenResponse>> + Send + 'a>> {
        Box::pin(async move {
            let mut params = vec![
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", redirect_uri.as_str()),
            ];
            if let Some(verifier) = code_verifier {
                params.push(("code_verifier", verifier));
            }
            let request = self.token_request(params);
            debug!(url = %request.url, "requesting access and refresh tokens");
            let response = self.transport.send(request).await?;
            decode_token_response(&response, None)
        })
    }

    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<TokenResponse>> + Send + 'a>> {
        Box::pin(async move {
            let request = self.token_request(vec![
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ]);
            debug!(url = %request.url, "refreshing access token");
            let response = self.transport.send(request).await?;
            decode_token_response(&response, None)
        })
    }
}

/// Talks to a caller-operated proxy that holds the client secret.
pub struct ProxyBackend {
    client_id: String,
    tokens_url: Url,
    token_refresh_url: Url,
    decode_server_error: Option<DecodeServerErrorHook>,
    transport: Arc<dyn Transport>,
}

impl ProxyBackend {
    /// `tokens_url` receives the code exchange, `token_refresh_url` the
    /// refresh. Both accept the same form-urlencoded bodies the provider's
    /// token endpoint does, minus client credentials.
    pub fn new(client_id: impl Into<String>, tokens_url: Url, token_refresh_url: Url) -> Self {
        Self {
            client_id: client_id.into(),
            tokens_url,
            token_refresh_url,
            decode_server_error: None,
            transport: Arc::new(HttpTransport::new()),
        }
    }

    /// Install a hook that translates intermediary-specific error bodies
    /// into the local error taxonomy before standard decoding runs.
    pub fn with_decode_server_error(
        mut self,
        hook: impl Fn(u16, &[u8]) -> Option<Error> + Send + Sync + 'static,
    ) -> Self {
        self.decode_server_error = Some(Arc::new(hook));
        self
    }

    /// Replace the transport (testing, custom clients).
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }
}

impl fmt::Debug for ProxyBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyBackend")
            .field("client_id", &self.client_id)
            .field("tokens_url", &self.tokens_url.as_str())
            .field("token_refresh_url", &self.token_refresh_url.as_str())
            .finish_non_exhaustive()
    }
}

impl Backend for ProxyBackend {
    fn exchange_code<'a>(
        &'a self,
        code: &'a str,
        redirect_uri: &'a Url,
        code_verifier: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Result<TokenResponse>> + Send + 'a>> {
        Box::pin(async move {
            let mut params = vec![("grant_type", "authorization_code"), ("code", code)];
            if let Some(verifier) = code_verifier {
                params.push(("code_verifier", verifier));
            }
            params.push(("redirect_uri", redirect_uri.as_str()));
            let request = HttpRequest::post_form(self.tokens_url.clone(), &params);
            debug!(url = %request.url, "requesting access and refresh tokens via proxy");
            let response = self.transport.send(request).await?;
            decode_token_response(&response, self.decode_server_error.as_ref())
        })
    }

    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<TokenResponse>> + Send + 'a>> {
        Box::pin(async move {
            let request = HttpRequest::post_form(
                self.token_refresh_url.clone(),
                &[
                    ("grant_type", "refresh_token"),
                    ("refresh_token", refresh_token),
                ],
            );
            debug!(url = %request.url, "refreshing access token via proxy");
            let response = self.transport.send(request).await?;
            decode_token_response(&response, self.decode_server_error.as_ref())
        })
    }
}
