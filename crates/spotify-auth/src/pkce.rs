//! PKCE (Proof Key for Code Exchange) helpers per RFC 7636
//!
//! Generates the code verifier and S256 challenge used by public clients
//! during the authorization flow, plus the opaque state value round-tripped
//! through the redirect for CSRF protection. The caller keeps the verifier
//! across the redirect round trip and supplies it during token exchange;
//! the manager never stores it.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngExt;
use sha2::{Digest, Sha256};

/// Generate a cryptographically random PKCE code verifier.
///
/// Produces 96 random bytes encoded as URL-safe base64 (no padding), giving
/// a 128-character verifier, the maximum length RFC 7636 allows.
pub fn generate_code_verifier() -> String {
    let mut bytes = [0u8; 96];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Compute the S256 code challenge from a verifier.
///
/// `challenge = BASE64URL(SHA256(verifier))`
///
/// The authorization server compares this against the challenge sent in the
/// authorization URL to verify the token exchange request came from the
/// party that initiated the flow.
pub fn code_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Generate an opaque value for the `state` query parameter.
///
/// 32 random bytes as URL-safe base64; the provider returns it unchanged in
/// the redirect, where the manager compares it against the stored value.
pub fn generate_state() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
