//! Spotify OAuth2 authorization manager
//!
//! Owns the token pair for an Authorization Code Flow grant (with or
//! without PKCE) and keeps it valid for an API client. This crate is a
//! standalone library: the embedding application handles the browser
//! redirect and per-endpoint requests; the manager handles everything
//! between.
//!
//! Grant lifecycle:
//! 1. Caller generates `pkce::generate_state()` (and, for PKCE, a
//!    verifier/challenge pair)
//! 2. User authorizes via `AuthorizationManager::make_authorization_url()`
//! 3. Caller hands the redirect back to
//!    `AuthorizationManager::request_tokens()`
//! 4. Before each API request, `AuthorizationManager::valid_access_token()`
//!    refreshes the pair if needed, coalescing concurrent refreshes into
//!    one network call
//! 5. State is persisted between runs via `AuthorizationManager::to_json()`
//!    / `from_json()`

pub mod backend;
pub mod constants;
pub mod error;
pub mod http;
pub mod manager;
pub mod pkce;
pub mod scope;
pub mod token;

pub use backend::{Backend, DecodeServerErrorHook, DirectBackend, ProxyBackend};
pub use constants::*;
pub use error::{AuthenticationError, Error, Result};
pub use http::{HttpRequest, HttpResponse, HttpTransport, Transport};
pub use manager::{AuthorizationEvent, AuthorizationManager};
pub use pkce::{code_challenge, generate_code_verifier, generate_state};
pub use scope::{Scope, parse_scope_string, scope_string};
pub use token::{TokenResponse, TokenState};
