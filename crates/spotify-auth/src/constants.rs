//! Spotify OAuth constants
//!
//! Endpoint URLs for the accounts service. These are fixed properties of the
//! provider; the actual secrets (client secret, access/refresh tokens) are
//! held by the backend and the authorization manager.

use std::time::Duration;

use url::Url;

/// Authorization endpoint the user is redirected to for the consent dialog
pub const AUTHORIZE_ENDPOINT: &str = "https://accounts.spotify.com/authorize";

/// Token endpoint for code exchange and token refresh
pub const TOKEN_ENDPOINT: &str = "https://accounts.spotify.com/api/token";

/// Environment variable holding the application's client id
pub const CLIENT_ID_ENV: &str = "SPOTIFY_CLIENT_ID";

/// Environment variable holding the application's client secret
pub const CLIENT_SECRET_ENV: &str = "SPOTIFY_CLIENT_SECRET";

/// How close to expiration an access token is still treated as expired.
/// Access tokens live for an hour; refreshing two minutes early keeps a
/// request from racing the deadline.
pub const DEFAULT_EXPIRATION_TOLERANCE: Duration = Duration::from_secs(120);

pub(crate) fn authorize_endpoint() -> Url {
    Url::parse(AUTHORIZE_ENDPOINT).expect("authorize endpoint constant is a valid URL")
}

pub(crate) fn token_endpoint() -> Url {
    Url::parse(TOKEN_ENDPOINT).expect("token endpoint constant is a valid URL")
}
