//! A user's playlists, likes and dislikes.
//!
//! Liking and disliking maintain two reserved playlists, `liked_songs` and
//! `disliked_songs`, each created the first time a track goes into it. A track is in at most
//! one of them: liking a disliked track moves it over, and liking a liked
//! track removes the like again. The reserved playlists cannot be edited
//! through [`Library::add_to_playlist`] and
//! [`Library::remove_from_playlist`].

use std::{fmt, sync::Arc};

use crate::{
    error::{Error, Result},
    playlist::{self, NewPlaylist, Playlist, PlaylistId, DISLIKED_SONGS, LIKED_SONGS},
    store::TrackStore,
    track::Track,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Reaction {
    Like,
    Dislike,
}

impl Reaction {
    /// Reserved playlist that holds tracks with this reaction.
    #[must_use]
    pub fn playlist(self) -> &'static str {
        match self {
            Self::Like => LIKED_SONGS,
            Self::Dislike => DISLIKED_SONGS,
        }
    }

    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::Like => Self::Dislike,
            Self::Dislike => Self::Like,
        }
    }
}

impl fmt::Display for Reaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Like => write!(f, "like"),
            Self::Dislike => write!(f, "dislike"),
        }
    }
}

/// How a user currently feels about a track.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Opinion {
    Liked,
    Disliked,
    #[default]
    Neutral,
}

/// Applies a like or dislike toggle to a user's playlists.
///
/// The reserved playlist for `reaction` is created with an id from `new_id`
/// when missing. The opposite one is only touched when it exists. Returns
/// the resulting opinion.
pub fn toggle<F>(playlists: &mut Vec<Playlist>, track: &Track, reaction: Reaction, mut new_id: F) -> Opinion
where
    F: FnMut() -> PlaylistId,
{
    let target = reserved_mut(playlists, reaction.playlist(), &mut new_id);
    if target.contains(track) {
        target.songs.retain(|song| !song.is_same(track));
        return Opinion::Neutral;
    }
    target.songs.push(track.clone());

    let opposite = reaction.opposite().playlist();
    if let Some(other) = playlists.iter_mut().find(|playlist| playlist.name == opposite) {
        other.songs.retain(|song| !song.is_same(track));
    }

    match reaction {
        Reaction::Like => Opinion::Liked,
        Reaction::Dislike => Opinion::Disliked,
    }
}

fn reserved_mut<'a, F>(playlists: &'a mut Vec<Playlist>, name: &str, new_id: &mut F) -> &'a mut Playlist
where
    F: FnMut() -> PlaylistId,
{
    let index = match playlists.iter().position(|playlist| playlist.name == name) {
        Some(index) => index,
        None => {
            let draft = NewPlaylist::reserved(name);
            playlists.push(Playlist {
                id: new_id(),
                name: draft.name,
                description: Some(draft.description),
                visibility: draft.visibility,
                cover_img_url: None,
                songs: Vec::new(),
            });
            playlists.len() - 1
        }
    };
    &mut playlists[index]
}

/// Playlist operations on behalf of one user.
pub struct Library {
    store: Arc<dyn TrackStore>,
    username: String,
}

impl Library {
    #[must_use]
    pub fn new(store: Arc<dyn TrackStore>, username: impl Into<String>) -> Self {
        Self {
            store,
            username: username.into(),
        }
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Toggles a like on `track` and returns the resulting opinion.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached.
    pub async fn like(&self, track: &Track) -> Result<Opinion> {
        self.react(track, Reaction::Like).await
    }

    /// Toggles a dislike on `track` and returns the resulting opinion.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached.
    pub async fn dislike(&self, track: &Track) -> Result<Opinion> {
        self.react(track, Reaction::Dislike).await
    }

    async fn react(&self, track: &Track, reaction: Reaction) -> Result<Opinion> {
        self.store.react(&self.username, track, reaction).await?;
        let opinion = self.opinion(track).await?;
        debug!("{} toggled {reaction} on {track}: {opinion:?}", self.username);
        Ok(opinion)
    }

    /// # Errors
    ///
    /// Returns an error if the store cannot be reached.
    pub async fn opinion(&self, track: &Track) -> Result<Opinion> {
        let liked = self.store.reacted(&self.username, Reaction::Like).await?;
        if liked.iter().any(|song| song.is_same(track)) {
            return Ok(Opinion::Liked);
        }

        let disliked = self.store.reacted(&self.username, Reaction::Dislike).await?;
        if disliked.iter().any(|song| song.is_same(track)) {
            return Ok(Opinion::Disliked);
        }

        Ok(Opinion::Neutral)
    }

    /// # Errors
    ///
    /// Returns an error if the store cannot be reached.
    pub async fn playlists(&self) -> Result<Vec<Playlist>> {
        self.store.playlists(&self.username).await
    }

    /// # Errors
    ///
    /// Returns `NotFound` if the user has no such playlist.
    pub async fn playlist(&self, id: &PlaylistId) -> Result<Playlist> {
        self.playlists()
            .await?
            .into_iter()
            .find(|playlist| &playlist.id == id)
            .ok_or_else(|| Error::not_found(format!("playlist {id} not found")))
    }

    /// # Errors
    ///
    /// Returns `InvalidArgument` for an empty or reserved name.
    pub async fn create_playlist(&self, playlist: &NewPlaylist) -> Result<()> {
        if playlist.name.trim().is_empty() {
            return Err(Error::invalid_argument("playlist name cannot be empty"));
        }
        if playlist::is_reserved(&playlist.name) {
            return Err(Error::invalid_argument(format!(
                "{} is a reserved playlist name",
                playlist.name
            )));
        }

        self.store.create_playlist(&self.username, playlist).await
    }

    /// Returns `false` if the track was already in the playlist.
    ///
    /// # Errors
    ///
    /// Returns `PermissionDenied` for a reserved playlist.
    pub async fn add_to_playlist(&self, playlist: &Playlist, track: &Track) -> Result<bool> {
        Self::ensure_editable(playlist)?;
        self.store
            .add_song(&self.username, &playlist.id, track)
            .await
    }

    /// # Errors
    ///
    /// Returns `PermissionDenied` for a reserved playlist.
    pub async fn remove_from_playlist(&self, playlist: &Playlist, track: &Track) -> Result<()> {
        Self::ensure_editable(playlist)?;
        self.store
            .remove_song(&self.username, &playlist.id, track)
            .await
    }

    /// Uploaded songs matching `query`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached.
    pub async fn search(&self, query: &str) -> Result<Vec<Track>> {
        self.store.search(query).await
    }

    fn ensure_editable(playlist: &Playlist) -> Result<()> {
        if playlist.is_reserved() {
            return Err(Error::permission_denied(format!(
                "{} is maintained by liking and disliking",
                playlist.name
            )));
        }
        Ok(())
    }
}
