//! Spotify access scopes
//!
//! The closed set of permissions a token can carry. Scopes are compared as
//! sets; order is never significant. On the wire they travel as a single
//! space-separated string of kebab-case identifiers.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Error;

/// A single access scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scope {
    UgcImageUpload,
    UserReadPlaybackState,
    UserModifyPlaybackState,
    UserReadCurrentlyPlaying,
    AppRemoteControl,
    Streaming,
    PlaylistReadPrivate,
    PlaylistReadCollaborative,
    PlaylistModifyPrivate,
    PlaylistModifyPublic,
    UserFollowModify,
    UserFollowRead,
    UserReadPlaybackPosition,
    UserTopRead,
    UserReadRecentlyPlayed,
    UserLibraryModify,
    UserLibraryRead,
    UserReadEmail,
    UserReadPrivate,
}

impl Scope {
    /// The wire identifier for this scope.
    pub fn identifier(self) -> &'static str {
        match self {
            Scope::UgcImageUpload => "ugc-image-upload",
            Scope::UserReadPlaybackState => "user-read-playback-state",
            Scope::UserModifyPlaybackState => "user-modify-playback-state",
            Scope::UserReadCurrentlyPlaying => "user-read-currently-playing",
            Scope::AppRemoteControl => "app-remote-control",
            Scope::Streaming => "streaming",
            Scope::PlaylistReadPrivate => "playlist-read-private",
            Scope::PlaylistReadCollaborative => "playlist-read-collaborative",
            Scope::PlaylistModifyPrivate => "playlist-modify-private",
            Scope::PlaylistModifyPublic => "playlist-modify-public",
            Scope::UserFollowModify => "user-follow-modify",
            Scope::UserFollowRead => "user-follow-read",
            Scope::UserReadPlaybackPosition => "user-read-playback-position",
            Scope::UserTopRead => "user-top-read",
            Scope::UserReadRecentlyPlayed => "user-read-recently-played",
            Scope::UserLibraryModify => "user-library-modify",
            Scope::UserLibraryRead => "user-library-read",
            Scope::UserReadEmail => "user-read-email",
            Scope::UserReadPrivate => "user-read-private",
        }
    }

    /// Every scope the provider defines.
    pub fn all() -> HashSet<Scope> {
        [
            Scope::UgcImageUpload,
            Scope::UserReadPlaybackState,
            Scope::UserModifyPlaybackState,
            Scope::UserReadCurrentlyPlaying,
            Scope::AppRemoteControl,
            Scope::Streaming,
            Scope::PlaylistReadPrivate,
            Scope::PlaylistReadCollaborative,
            Scope::PlaylistModifyPrivate,
            Scope::PlaylistModifyPublic,
            Scope::UserFollowModify,
            Scope::UserFollowRead,
            Scope::UserReadPlaybackPosition,
            Scope::UserTopRead,
            Scope::UserReadRecentlyPlayed,
            Scope::UserLibraryModify,
            Scope::UserLibraryRead,
            Scope::UserReadEmail,
            Scope::UserReadPrivate,
        ]
        .into_iter()
        .collect()
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.identifier())
    }
}

impl FromStr for Scope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ugc-image-upload" => Ok(Scope::UgcImageUpload),
            "user-read-playback-state" => Ok(Scope::UserReadPlaybackState),
            "user-modify-playback-state" => Ok(Scope::UserModifyPlaybackState),
            "user-read-currently-playing" => Ok(Scope::UserReadCurrentlyPlaying),
            "app-remote-control" => Ok(Scope::AppRemoteControl),
            "streaming" => Ok(Scope::Streaming),
            "playlist-read-private" => Ok(Scope::PlaylistReadPrivate),
            "playlist-read-collaborative" => Ok(Scope::PlaylistReadCollaborative),
            "playlist-modify-private" => Ok(Scope::PlaylistModifyPrivate),
            "playlist-modify-public" => Ok(Scope::PlaylistModifyPublic),
            "user-follow-modify" => Ok(Scope::UserFollowModify),
            "user-follow-read" => Ok(Scope::UserFollowRead),
            "user-read-playback-position" => Ok(Scope::UserReadPlaybackPosition),
            "user-top-read" => Ok(Scope::UserTopRead),
            "user-read-recently-played" => Ok(Scope::UserReadRecentlyPlayed),
            "user-library-modify" => Ok(Scope::UserLibraryModify),
            "user-library-read" => Ok(Scope::UserLibraryRead),
            "user-read-email" => Ok(Scope::UserReadEmail),
            "user-read-private" => Ok(Scope::UserReadPrivate),
            other => Err(Error::Decode(format!("unknown scope {other:?}"))),
        }
    }
}

/// Join a scope set into the space-separated wire form.
///
/// Sorted so the output is deterministic; the provider does not care about
/// order.
pub fn scope_string(scopes: &HashSet<Scope>) -> String {
    let mut identifiers: Vec<&str> = scopes.iter().map(|s| s.identifier()).collect();
    identifiers.sort_unstable();
    identifiers.join(" ")
}

/// Parse a space-separated scope string into a set.
///
/// Identifiers this crate does not know are skipped with a warning rather
/// than failing the whole response; the provider may add scopes at any time.
pub fn parse_scope_string(scope: &str) -> HashSet<Scope> {
    scope
        .split_ascii_whitespace()
        .filter_map(|identifier| match identifier.parse() {
            Ok(scope) => Some(scope),
            Err(_) => {
                warn!(identifier, "skipping unknown scope identifier");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_roundtrips_through_from_str() {
        for scope in Scope::all() {
            let parsed: Scope = scope.identifier().parse().unwrap();
            assert_eq!(parsed, scope);
        }
    }

    #[test]
    fn unknown_identifier_is_an_error() {
        assert!("not-a-scope".parse::<Scope>().is_err());
    }

    #[test]
    fn serde_uses_kebab_case_identifiers() {
        let json = serde_json::to_string(&Scope::PlaylistReadPrivate).unwrap();
        assert_eq!(json, "\"playlist-read-private\"");
        let back: Scope = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Scope::PlaylistReadPrivate);
    }

    #[test]
    fn scope_string_is_sorted_and_space_separated() {
        let scopes = [Scope::UserFollowModify, Scope::PlaylistReadPrivate]
            .into_iter()
            .collect();
        assert_eq!(
            scope_string(&scopes),
            "playlist-read-private user-follow-modify"
        );
    }

    #[test]
    fn scope_string_of_empty_set_is_empty() {
        assert_eq!(scope_string(&HashSet::new()), "");
    }

    #[test]
    fn parse_scope_string_skips_unknown_identifiers() {
        let scopes = parse_scope_string("user-read-private brand-new-scope streaming");
        assert_eq!(
            scopes,
            [Scope::UserReadPrivate, Scope::Streaming].into_iter().collect()
        );
    }

    #[test]
    fn all_scopes_are_distinct() {
        assert_eq!(Scope::all().len(), 19);
    }
}
