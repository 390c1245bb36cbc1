//! In-process store.
//!
//! Keeps everything the backend would keep in one mutex-protected state.
//! Unlike the backend it enforces that a user is a member of at most one
//! live party at a time.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::Mutex,
};

use async_trait::async_trait;
use uuid::Uuid;

use super::{ListeningStats, NowPlaying, PartyStore, TrackStore, UserDirectory};
use crate::{
    error::{Error, Result},
    library::{self, Reaction},
    party::{Member, Party, PartyId},
    playlist::{NewPlaylist, Playlist, PlaylistId},
    track::Track,
};

#[derive(Debug, Default)]
struct State {
    uploads: Vec<Track>,
    playlists: HashMap<String, Vec<Playlist>>,
    parties: BTreeMap<PartyId, Party>,
    friends: HashMap<String, BTreeSet<String>>,
    listening_to: HashMap<String, Track>,
    plays: HashMap<String, Vec<Track>>,
}

impl State {
    fn playlist_mut(&mut self, username: &str, id: &PlaylistId) -> Result<&mut Playlist> {
        self.playlists
            .get_mut(username)
            .and_then(|playlists| playlists.iter_mut().find(|playlist| &playlist.id == id))
            .ok_or_else(|| Error::not_found(format!("{username} has no playlist {id}")))
    }

    fn party_mut(&mut self, id: &PartyId) -> Result<&mut Party> {
        self.parties
            .get_mut(id)
            .ok_or_else(|| Error::not_found(format!("party {id} not found")))
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

impl MemoryStore {
    /// Maximum number of search results.
    pub const SEARCH_LIMIT: usize = 10;

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an uploaded song to the searchable collection.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the state lock is poisoned.
    pub fn add_upload(&self, track: Track) -> Result<()> {
        self.state.lock()?.uploads.push(track);
        Ok(())
    }

    /// Makes `a` and `b` friends of each other.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the state lock is poisoned.
    pub fn befriend(&self, a: &str, b: &str) -> Result<()> {
        let mut state = self.state.lock()?;
        state
            .friends
            .entry(a.to_owned())
            .or_default()
            .insert(b.to_owned());
        state
            .friends
            .entry(b.to_owned())
            .or_default()
            .insert(a.to_owned());
        Ok(())
    }

    /// What `username` is listening to, as last published.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the state lock is poisoned.
    pub fn listening_to(&self, username: &str) -> Result<Option<Track>> {
        Ok(self.state.lock()?.listening_to.get(username).cloned())
    }

    /// Plays recorded for `username`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the state lock is poisoned.
    pub fn plays(&self, username: &str) -> Result<Vec<Track>> {
        Ok(self
            .state
            .lock()?
            .plays
            .get(username)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl TrackStore for MemoryStore {
    async fn search(&self, query: &str) -> Result<Vec<Track>> {
        let query = query.to_lowercase();
        let state = self.state.lock()?;
        Ok(state
            .uploads
            .iter()
            .filter(|track| track.name.to_lowercase().contains(&query))
            .take(Self::SEARCH_LIMIT)
            .cloned()
            .collect())
    }

    async fn playlists(&self, username: &str) -> Result<Vec<Playlist>> {
        Ok(self
            .state
            .lock()?
            .playlists
            .get(username)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_playlist(&self, username: &str, playlist: &NewPlaylist) -> Result<()> {
        let mut state = self.state.lock()?;
        state
            .playlists
            .entry(username.to_owned())
            .or_default()
            .push(Playlist {
                id: PlaylistId(new_id()),
                name: playlist.name.clone(),
                description: Some(playlist.description.clone()),
                visibility: playlist.visibility,
                cover_img_url: None,
                songs: Vec::new(),
            });
        Ok(())
    }

    async fn add_song(&self, username: &str, playlist: &PlaylistId, track: &Track) -> Result<bool> {
        let mut state = self.state.lock()?;
        let playlist = state.playlist_mut(username, playlist)?;
        if playlist.contains(track) {
            return Ok(false);
        }
        playlist.songs.push(track.clone());
        Ok(true)
    }

    async fn remove_song(
        &self,
        username: &str,
        playlist: &PlaylistId,
        track: &Track,
    ) -> Result<()> {
        let mut state = self.state.lock()?;
        state
            .playlist_mut(username, playlist)?
            .songs
            .retain(|song| !song.is_same(track));
        Ok(())
    }

    async fn react(&self, username: &str, track: &Track, reaction: Reaction) -> Result<()> {
        let mut state = self.state.lock()?;
        let playlists = state.playlists.entry(username.to_owned()).or_default();
        library::toggle(playlists, track, reaction, || PlaylistId(new_id()));
        Ok(())
    }

    async fn reacted(&self, username: &str, reaction: Reaction) -> Result<Vec<Track>> {
        let state = self.state.lock()?;
        Ok(state
            .playlists
            .get(username)
            .and_then(|playlists| {
                playlists
                    .iter()
                    .find(|playlist| playlist.name == reaction.playlist())
            })
            .map(|playlist| playlist.songs.clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl PartyStore for MemoryStore {
    async fn create_party(&self, host: &str, people: &[String], name: &str) -> Result<PartyId> {
        let mut state = self.state.lock()?;

        let busy = state.parties.values().find_map(|party| {
            people
                .iter()
                .find(|person| party.is_member(person))
                .map(|person| (person, party))
        });
        if let Some((person, party)) = busy {
            return Err(Error::already_exists(format!(
                "{person} is already in {party}"
            )));
        }

        let id = PartyId(new_id());
        state.parties.insert(
            id.clone(),
            Party {
                id: id.clone(),
                host: Member {
                    username: host.to_owned(),
                },
                people: people.to_vec(),
                name: name.to_owned(),
                songs: Vec::new(),
            },
        );
        Ok(id)
    }

    async fn delete_party(&self, party: &PartyId) -> Result<()> {
        self.state.lock()?.parties.remove(party);
        Ok(())
    }

    async fn party(&self, party: &PartyId) -> Result<Party> {
        self.state
            .lock()?
            .parties
            .get(party)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("party {party} not found")))
    }

    async fn parties_for(&self, username: &str) -> Result<Vec<Party>> {
        Ok(self
            .state
            .lock()?
            .parties
            .values()
            .filter(|party| party.is_member(username))
            .cloned()
            .collect())
    }

    async fn add_party_song(&self, party: &PartyId, track: &Track) -> Result<()> {
        let mut state = self.state.lock()?;
        state.party_mut(party)?.songs.push(track.clone());
        Ok(())
    }

    async fn remove_party_song(&self, party: &PartyId, track: &Track) -> Result<()> {
        let mut state = self.state.lock()?;
        state
            .party_mut(party)?
            .songs
            .retain(|song| !song.is_same(track));
        Ok(())
    }

    async fn remove_member(&self, party: &PartyId, username: &str) -> Result<()> {
        let mut state = self.state.lock()?;
        state
            .party_mut(party)?
            .people
            .retain(|person| person != username);
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn friends_of(&self, username: &str) -> Result<Vec<String>> {
        Ok(self
            .state
            .lock()?
            .friends
            .get(username)
            .map(|friends| friends.iter().cloned().collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl NowPlaying for MemoryStore {
    async fn set_listening_to(&self, username: &str, track: Option<&Track>) -> Result<()> {
        let mut state = self.state.lock()?;
        match track {
            Some(track) => {
                state
                    .listening_to
                    .insert(username.to_owned(), track.clone());
            }
            None => {
                state.listening_to.remove(username);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ListeningStats for MemoryStore {
    async fn record_play(&self, username: &str, track: &Track) -> Result<()> {
        self.state
            .lock()?
            .plays
            .entry(username.to_owned())
            .or_default()
            .push(track.clone());
        Ok(())
    }
}
