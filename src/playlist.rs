//! Playlists and the sources that playback walks through.
//!
//! A [`Playlist`] is what a user curates and the backend stores. Playback
//! does not care where its tracks come from, so the player walks a
//! [`PlaylistSource`] instead: a stored playlist, a party, an ad-hoc queue
//! assembled by the listener, or a batch of recommendations that was fetched
//! when everything else ran dry.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    party::Party,
    track::Track,
};

/// Reserved playlist holding the user's liked songs.
pub const LIKED_SONGS: &str = "liked_songs";

/// Reserved playlist holding the user's disliked songs.
pub const DISLIKED_SONGS: &str = "disliked_songs";

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlaylistId(pub String);

impl fmt::Display for PlaylistId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PlaylistId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    #[default]
    Private,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Playlist {
    #[serde(rename = "_id")]
    pub id: PlaylistId,

    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub visibility: Visibility,

    #[serde(rename = "coverImgUrl", default)]
    pub cover_img_url: Option<String>,

    #[serde(default)]
    pub songs: Vec<Track>,
}

impl Playlist {
    /// Whether this is one of the playlists maintained by liking and
    /// disliking.
    #[must_use]
    pub fn is_reserved(&self) -> bool {
        is_reserved(&self.name)
    }

    #[must_use]
    pub fn contains(&self, track: &Track) -> bool {
        self.songs.iter().any(|song| song.is_same(track))
    }
}

#[must_use]
pub fn is_reserved(name: &str) -> bool {
    name == LIKED_SONGS || name == DISLIKED_SONGS
}

/// Fields of a playlist that is about to be created.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct NewPlaylist {
    pub name: String,
    pub description: String,
    pub visibility: Visibility,
}

impl NewPlaylist {
    /// The reserved playlist for `name`, created on the first like or
    /// dislike.
    #[must_use]
    pub fn reserved(name: &str) -> Self {
        let description = if name == LIKED_SONGS {
            "Liked songs by the user"
        } else {
            "Disliked songs"
        };

        Self {
            name: name.to_owned(),
            description: description.to_owned(),
            visibility: Visibility::Private,
        }
    }
}

/// Switches DJ mode for all `songs` at once.
///
/// In DJ mode every song plays its preview, so enabling fails when any song
/// has none. The songs are left untouched on failure.
///
/// # Errors
///
/// Returns `FailedPrecondition` naming the first song without a preview.
pub fn apply_dj_mode(songs: &mut [Track], enabled: bool) -> Result<()> {
    if enabled {
        if let Some(song) = songs.iter().find(|song| !song.has_preview()) {
            return Err(Error::failed_precondition(format!(
                "{song} has no preview for dj mode"
            )));
        }
    }

    for song in songs {
        song.dj = enabled;
    }

    Ok(())
}

/// What to play after the current track.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Next {
    /// Play the track at this index of the source.
    Index(usize),
    /// Nothing queued: ask for recommendations.
    Recommend,
    /// End of the source without looping.
    Stop,
}

/// The list that playback is currently walking through.
#[derive(Clone, Debug, PartialEq)]
pub enum PlaylistSource {
    Stored(Playlist),
    Party(Party),
    AdHocQueue(Vec<Track>),
    Recommendation(Vec<Track>),
}

impl PlaylistSource {
    /// Display name of the synthetic recommendation source.
    pub const RECOMMENDATION: &'static str = "Recommendation";

    /// Display name of the ad-hoc queue.
    pub const QUEUE: &'static str = "queue";

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Stored(playlist) => &playlist.name,
            Self::Party(party) => &party.name,
            Self::AdHocQueue(_) => Self::QUEUE,
            Self::Recommendation(_) => Self::RECOMMENDATION,
        }
    }

    #[must_use]
    pub fn tracks(&self) -> &[Track] {
        match self {
            Self::Stored(playlist) => &playlist.songs,
            Self::Party(party) => &party.songs,
            Self::AdHocQueue(tracks) | Self::Recommendation(tracks) => tracks,
        }
    }

    #[must_use]
    pub fn track(&self, index: usize) -> Option<&Track> {
        self.tracks().get(index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tracks().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracks().is_empty()
    }

    #[must_use]
    pub fn is_queue(&self) -> bool {
        matches!(self, Self::AdHocQueue(_))
    }

    /// Index of `track` in this source.
    #[must_use]
    pub fn position(&self, track: &Track) -> Option<usize> {
        self.tracks().iter().position(|song| song.is_same(track))
    }

    /// Decides what follows `current`.
    ///
    /// A queue that reaches its end falls back to recommendations, looping
    /// or not. Any other source wraps when looping and stops otherwise. A
    /// `current` track that is not part of the source continues at the first
    /// track.
    #[must_use]
    pub fn next(&self, current: &Track, can_loop: bool) -> Next {
        let len = self.len();
        if len == 0 {
            return if self.is_queue() {
                Next::Recommend
            } else {
                Next::Stop
            };
        }

        let index = self.position(current).map_or(0, |i| i + 1);
        if index < len {
            Next::Index(index)
        } else if self.is_queue() {
            Next::Recommend
        } else if can_loop {
            Next::Index(0)
        } else {
            Next::Stop
        }
    }

    /// Index of the track before `current`, if there is one.
    #[must_use]
    pub fn previous(&self, current: &Track) -> Option<usize> {
        self.position(current)
            .and_then(|index| index.checked_sub(1))
    }

    /// Appends `track`, turning this source into an ad-hoc queue.
    #[must_use]
    pub fn enqueue(self, track: Track) -> Self {
        let mut tracks = match self {
            Self::Stored(playlist) => playlist.songs,
            Self::Party(party) => party.songs,
            Self::AdHocQueue(tracks) | Self::Recommendation(tracks) => tracks,
        };
        tracks.push(track);
        Self::AdHocQueue(tracks)
    }
}

impl fmt::Display for PlaylistSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} tracks)", self.name(), self.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::ErrorKind,
        track::tests::{local, streamed},
    };

    fn stored(tracks: Vec<Track>) -> PlaylistSource {
        PlaylistSource::Stored(Playlist {
            id: PlaylistId::from("p1"),
            name: "Road trip".to_owned(),
            songs: tracks,
            ..Playlist::default()
        })
    }

    fn three() -> Vec<Track> {
        vec![
            streamed("spotify:track:a", 1000),
            streamed("spotify:track:b", 1000),
            streamed("spotify:track:c", 1000),
        ]
    }

    #[test]
    fn stored_playlist_advances_then_stops() {
        let tracks = three();
        let source = stored(tracks.clone());

        assert_eq!(source.next(&tracks[0], false), Next::Index(1));
        assert_eq!(source.next(&tracks[2], false), Next::Stop);
        assert_eq!(source.next(&tracks[2], true), Next::Index(0));
    }

    #[test]
    fn exhausted_queue_recommends_even_when_looping() {
        let tracks = three();
        let queue = PlaylistSource::AdHocQueue(tracks.clone());

        assert_eq!(queue.next(&tracks[1], false), Next::Index(2));
        assert_eq!(queue.next(&tracks[2], false), Next::Recommend);
        assert_eq!(queue.next(&tracks[2], true), Next::Recommend);
        assert_eq!(stored(tracks.clone()).next(&tracks[2], true), Next::Index(0));
        assert_eq!(
            PlaylistSource::AdHocQueue(Vec::new()).next(&tracks[0], false),
            Next::Recommend
        );
    }

    #[test]
    fn unknown_current_track_starts_from_the_top() {
        let source = stored(three());
        let stranger = streamed("spotify:track:z", 1000);

        assert_eq!(source.next(&stranger, false), Next::Index(0));
        assert_eq!(source.previous(&stranger), None);
    }

    #[test]
    fn previous_stops_at_the_first_track() {
        let tracks = three();
        let source = stored(tracks.clone());

        assert_eq!(source.previous(&tracks[2]), Some(1));
        assert_eq!(source.previous(&tracks[0]), None);
    }

    #[test]
    fn enqueue_turns_any_source_into_a_queue() {
        let tracks = three();
        let extra = streamed("spotify:track:d", 1000);

        let queue = stored(tracks.clone()).enqueue(extra.clone());
        assert!(queue.is_queue());
        assert_eq!(queue.len(), 4);
        assert_eq!(queue.position(&extra), Some(3));
        assert_eq!(queue.name(), PlaylistSource::QUEUE);
    }

    #[test]
    fn dj_mode_requires_previews_and_does_not_mutate_on_failure() {
        let mut songs = vec![streamed("spotify:track:a", 1000), local("uploads/x.mp3", 1000)];

        let err = apply_dj_mode(&mut songs, true).unwrap_err();
        assert!(err.is(ErrorKind::FailedPrecondition));
        assert!(songs.iter().all(|song| !song.dj));

        songs.pop();
        apply_dj_mode(&mut songs, true).unwrap();
        assert!(songs.iter().all(|song| song.dj));

        apply_dj_mode(&mut songs, false).unwrap();
        assert!(songs.iter().all(|song| !song.dj));
    }

    #[test]
    fn reserved_playlists() {
        assert!(is_reserved(LIKED_SONGS));
        assert!(is_reserved(DISLIKED_SONGS));
        assert!(!is_reserved("liked songs"));

        let liked = NewPlaylist::reserved(LIKED_SONGS);
        assert_eq!(liked.description, "Liked songs by the user");
        assert_eq!(liked.visibility, Visibility::Private);
        assert_eq!(NewPlaylist::reserved(DISLIKED_SONGS).description, "Disliked songs");
    }

    #[test]
    fn decodes_stored_playlist() {
        let json = r#"{
            "_id": "6601",
            "name": "liked_songs",
            "description": null,
            "visibility": "private",
            "coverImgUrl": null,
            "songs": [{"uri": "spotify:track:a", "name": "A", "duration_ms": 1000}]
        }"#;

        let playlist: Playlist = serde_json::from_str(json).unwrap();
        assert!(playlist.is_reserved());
        assert_eq!(playlist.id.to_string(), "6601");
        assert!(playlist.contains(&streamed("spotify:track:a", 1)));
    }
}
