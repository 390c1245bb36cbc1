//! Requests and responses of the backend REST API.
//!
//! Protected routes check the `token` cookie and answer a rejected request
//! with status 200 and `{"message": "End point not authorized"}`, so every
//! response is decoded as a [`Reply`] first.

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    party::{Party, PartyId},
    playlist::{NewPlaylist, Playlist, PlaylistId, Visibility},
    track::Track,
};

/// Message of a request that the backend did not authorize.
pub const NOT_AUTHORIZED: &str = "End point not authorized";

/// A response, or a refusal.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Reply<T> {
    Data(T),
    Refused { message: String },
}

impl<T> Reply<T> {
    /// # Errors
    ///
    /// Returns `PermissionDenied` when the backend refused the request,
    /// `Unknown` for any other message.
    pub fn into_result(self) -> Result<T> {
        match self {
            Self::Data(data) => Ok(data),
            Self::Refused { message } if message == NOT_AUTHORIZED => {
                Err(Error::permission_denied(message))
            }
            Self::Refused { message } => Err(Error::unknown(message)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct Success {
    pub success: bool,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Tracks {
    pub tracks: Vec<Track>,
}

/// `GET /:username/get-all-playlists`: `data` is null for users without
/// playlists.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct AllPlaylists {
    #[serde(deserialize_with = "Option::deserialize")]
    pub data: Option<UserPlaylists>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct UserPlaylists {
    #[serde(default)]
    pub playlists: Vec<Playlist>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct PartyStarted {
    #[serde(rename = "_id")]
    pub id: Option<PartyId>,
    pub success: bool,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Parties {
    pub parties: Vec<Party>,
}

/// `GET /:party/get-party`: `party` is null once the party ended.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct PartyDocument {
    #[serde(deserialize_with = "Option::deserialize")]
    pub party: Option<Party>,
}

/// `POST /user/:name` matches usernames by pattern.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Users {
    pub users: Vec<User>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct User {
    pub username: String,
    #[serde(default)]
    pub friends: Vec<Friend>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Friend {
    pub username: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ProviderToken {
    pub success: bool,
    pub token: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Username<'a> {
    pub username: &'a str,
}

#[derive(Clone, Debug, Serialize)]
pub struct CreatePlaylist<'a> {
    pub username: &'a str,
    pub name: &'a str,
    pub description: &'a str,
    pub public: bool,
}

impl<'a> CreatePlaylist<'a> {
    #[must_use]
    pub fn new(username: &'a str, playlist: &'a NewPlaylist) -> Self {
        Self {
            username,
            name: &playlist.name,
            description: &playlist.description,
            public: playlist.visibility == Visibility::Public,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistSong<'a> {
    pub username: &'a str,
    pub playlist_id: &'a PlaylistId,
    pub song: &'a Track,
}

#[derive(Clone, Debug, Serialize)]
pub struct UserTrack<'a> {
    pub username: &'a str,
    pub track: &'a Track,
}

#[derive(Clone, Debug, Serialize)]
pub struct TrackBody<'a> {
    pub track: &'a Track,
}

#[derive(Clone, Debug, Serialize)]
pub struct SongBody<'a> {
    pub song: &'a Track,
}

#[derive(Clone, Debug, Serialize)]
pub struct PartyName<'a> {
    pub name: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn refusals_are_permission_denied() {
        let reply: Reply<Parties> =
            serde_json::from_str(r#"{"message": "End point not authorized"}"#).unwrap();
        assert!(reply.into_result().unwrap_err().is(ErrorKind::PermissionDenied));

        // A refusal must not pass for a user without playlists.
        let reply: Reply<AllPlaylists> =
            serde_json::from_str(r#"{"message": "End point not authorized"}"#).unwrap();
        assert!(reply.into_result().unwrap_err().is(ErrorKind::PermissionDenied));
    }

    #[test]
    fn search_messages_are_data() {
        let json = r#"{"message": "No song found", "tracks": []}"#;
        let reply: Reply<Tracks> = serde_json::from_str(json).unwrap();
        assert!(reply.into_result().unwrap().tracks.is_empty());
    }

    #[test]
    fn decodes_missing_documents() {
        let reply: Reply<PartyDocument> = serde_json::from_str(r#"{"party": null}"#).unwrap();
        assert_eq!(reply.into_result().unwrap().party, None);

        let reply: Reply<AllPlaylists> = serde_json::from_str(r#"{"data": null}"#).unwrap();
        assert_eq!(reply.into_result().unwrap().data, None);
    }

    #[test]
    fn playlist_song_uses_camel_case() {
        let id = PlaylistId::from("6601");
        let track = Track::default();
        let body = serde_json::to_value(PlaylistSong {
            username: "alice",
            playlist_id: &id,
            song: &track,
        })
        .unwrap();
        assert_eq!(body["playlistId"], "6601");
        assert_eq!(body["username"], "alice");
    }
}
