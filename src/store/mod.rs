//! Persistence behind the playback core.
//!
//! The backend keeps playlists, parties, friendships and what everybody is
//! listening to. The core only sees these traits; [`Gateway`] implements
//! them over the backend's REST API and [`MemoryStore`] in process.
//!
//! Writes are last-write-wins: nothing here coordinates concurrent
//! modifications of the same playlist or party.
//!
//! [`Gateway`]: crate::gateway::Gateway

pub mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;

use crate::{
    error::Result,
    library::Reaction,
    party::{Party, PartyId},
    playlist::{NewPlaylist, Playlist, PlaylistId},
    track::Track,
};

/// Uploaded songs and user playlists.
#[async_trait]
pub trait TrackStore: Send + Sync {
    /// Uploaded songs whose name contains `query`, case-insensitively.
    async fn search(&self, query: &str) -> Result<Vec<Track>>;

    /// All playlists of `username`, reserved ones included.
    async fn playlists(&self, username: &str) -> Result<Vec<Playlist>>;

    async fn create_playlist(&self, username: &str, playlist: &NewPlaylist) -> Result<()>;

    /// Appends `track` to a playlist.
    ///
    /// Returns `false` without changing anything if a track with the same
    /// URI is already in the playlist.
    async fn add_song(&self, username: &str, playlist: &PlaylistId, track: &Track) -> Result<bool>;

    /// Removes `track` from a playlist. Removing an absent track succeeds.
    async fn remove_song(&self, username: &str, playlist: &PlaylistId, track: &Track)
        -> Result<()>;

    /// Toggles a like or dislike, keeping the reserved playlists exclusive.
    async fn react(&self, username: &str, track: &Track, reaction: Reaction) -> Result<()>;

    /// Tracks in the reserved playlist for `reaction`.
    async fn reacted(&self, username: &str, reaction: Reaction) -> Result<Vec<Track>>;
}

/// Live parties.
#[async_trait]
pub trait PartyStore: Send + Sync {
    /// Creates a party with `people` as its members, host included.
    ///
    /// Fails with `AlreadyExists` if the store refuses the membership, in
    /// which case no party is created.
    async fn create_party(&self, host: &str, people: &[String], name: &str) -> Result<PartyId>;

    /// Deletes a party. Deleting a missing party succeeds.
    async fn delete_party(&self, party: &PartyId) -> Result<()>;

    /// Fails with `NotFound` once the party has ended.
    async fn party(&self, party: &PartyId) -> Result<Party>;

    /// Parties that `username` is a member of.
    async fn parties_for(&self, username: &str) -> Result<Vec<Party>>;

    async fn add_party_song(&self, party: &PartyId, track: &Track) -> Result<()>;

    async fn remove_party_song(&self, party: &PartyId, track: &Track) -> Result<()>;

    async fn remove_member(&self, party: &PartyId, username: &str) -> Result<()>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn friends_of(&self, username: &str) -> Result<Vec<String>>;
}

/// Tells friends what a user is listening to.
#[async_trait]
pub trait NowPlaying: Send + Sync {
    /// Publishes `track`, or that nothing is playing.
    async fn set_listening_to(&self, username: &str, track: Option<&Track>) -> Result<()>;
}

#[async_trait]
pub trait ListeningStats: Send + Sync {
    /// Counts one play of `track` towards the user's statistics.
    async fn record_play(&self, username: &str, track: &Track) -> Result<()>;
}
