//! Common types for the Spotify authorization crates

mod secret;

pub use secret::Secret;
