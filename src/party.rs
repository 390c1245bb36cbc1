//! Listening parties.
//!
//! A host starts a party for themselves and everybody on their friends list
//! at that moment. Any member can add and remove songs; only the host plays
//! them, switches DJ mode and ends the party. Members keep up by polling:
//! [`PartyView::refresh`] re-fetches the party document and there is no push
//! channel.
//!
//! # Example
//!
//! ```rust
//! let manager = PartyManager::new(store.clone(), store);
//! let id = manager.start("alice", "Friday night").await?;
//!
//! let mut view = manager.open(&id, "bob").await?;
//! manager.add_song(&id, &track).await?;
//! view.refresh().await?;
//! ```

use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, ErrorKind, Result},
    playlist::{self, PlaylistSource},
    session::Session,
    store::{PartyStore, UserDirectory},
    track::Track,
};

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartyId(pub String);

impl fmt::Display for PartyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PartyId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

/// The host as embedded in a party document.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Member {
    pub username: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Party {
    #[serde(rename = "_id")]
    pub id: PartyId,

    pub host: Member,

    /// Usernames of all members, host included.
    #[serde(default)]
    pub people: Vec<String>,

    pub name: String,

    #[serde(default)]
    pub songs: Vec<Track>,
}

impl Party {
    #[must_use]
    pub fn is_host(&self, username: &str) -> bool {
        self.host.username == username
    }

    #[must_use]
    pub fn is_member(&self, username: &str) -> bool {
        self.people.iter().any(|person| person == username)
    }

    #[must_use]
    pub fn contains(&self, track: &Track) -> bool {
        self.songs.iter().any(|song| song.is_same(track))
    }
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) hosted by {}", self.name, self.id, self.host.username)
    }
}

/// Party lifecycle on top of a [`PartyStore`].
#[derive(Clone)]
pub struct PartyManager {
    parties: Arc<dyn PartyStore>,
    users: Arc<dyn UserDirectory>,
}

impl PartyManager {
    #[must_use]
    pub fn new(parties: Arc<dyn PartyStore>, users: Arc<dyn UserDirectory>) -> Self {
        Self { parties, users }
    }

    /// Starts a party with `host` and the host's current friends.
    ///
    /// # Errors
    ///
    /// * `InvalidArgument` for an empty name
    /// * `AlreadyExists` if the store refuses one of the members, in which
    ///   case no party was created
    pub async fn start(&self, host: &str, name: &str) -> Result<PartyId> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::invalid_argument("party name cannot be empty"));
        }

        let mut people = vec![host.to_owned()];
        for friend in self.users.friends_of(host).await? {
            if !people.contains(&friend) {
                people.push(friend);
            }
        }

        match self.parties.create_party(host, &people, name).await {
            Ok(id) => {
                info!("{host} started party {name} ({id}) with {} members", people.len());
                Ok(id)
            }
            Err(e) => {
                if e.is(ErrorKind::AlreadyExists) {
                    warn!("{host} cannot start party {name}: {e}");
                }
                Err(e)
            }
        }
    }

    /// Ends a party on behalf of `requester`.
    ///
    /// # Errors
    ///
    /// Returns `PermissionDenied` if `requester` is not the host. Ending a
    /// party that is already gone succeeds.
    pub async fn end(&self, party: &PartyId, requester: &str) -> Result<()> {
        let found = match self.parties.party(party).await {
            Ok(found) => found,
            Err(e) if e.is(ErrorKind::NotFound) => {
                debug!("party {party} already ended");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        if !found.is_host(requester) {
            return Err(Error::permission_denied(format!(
                "only {} can end {}",
                found.host.username, found.name
            )));
        }

        self.parties.delete_party(party).await?;
        info!("{requester} ended party {found}");
        Ok(())
    }

    /// Removes `username` from a party. The party lives on, even when
    /// nobody is left.
    ///
    /// # Errors
    ///
    /// Returns `FailedPrecondition` for the host, who has to end the party
    /// instead, and `NotFound` if the party is gone.
    pub async fn leave(&self, username: &str, party: &PartyId) -> Result<()> {
        let found = self.parties.party(party).await?;
        if found.is_host(username) {
            return Err(Error::failed_precondition(
                "the host cannot leave, end the party instead",
            ));
        }

        if !found.is_member(username) {
            debug!("{username} already left {found}");
            return Ok(());
        }

        self.parties.remove_member(party, username).await?;
        info!("{username} left {found}");
        Ok(())
    }

    /// Adds `track` to a party. Returns `false` if it was already there.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the party is gone.
    pub async fn add_song(&self, party: &PartyId, track: &Track) -> Result<bool> {
        let found = self.parties.party(party).await?;
        if found.contains(track) {
            debug!("{track} already in {found}");
            return Ok(false);
        }

        self.parties.add_party_song(party, track).await?;
        debug!("added {track} to {found}");
        Ok(true)
    }

    /// # Errors
    ///
    /// Returns `NotFound` if the party is gone.
    pub async fn remove_song(&self, party: &PartyId, track: &Track) -> Result<()> {
        self.parties.remove_party_song(party, track).await?;
        debug!("removed {track} from party {party}");
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the store cannot be reached.
    pub async fn parties_for(&self, username: &str) -> Result<Vec<Party>> {
        self.parties.parties_for(username).await
    }

    /// # Errors
    ///
    /// Returns `NotFound` if the party is gone.
    pub async fn party(&self, party: &PartyId) -> Result<Party> {
        self.parties.party(party).await
    }

    /// Starts viewing a party as `username`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the party is gone and `PermissionDenied` if
    /// `username` is not a member.
    pub async fn open(&self, party: &PartyId, username: &str) -> Result<PartyView> {
        let found = self.parties.party(party).await?;
        if !found.is_member(username) {
            return Err(Error::permission_denied(format!(
                "{username} is not a member of {found}"
            )));
        }

        debug!("{username} is viewing {found}");
        Ok(PartyView {
            party: found,
            username: username.to_owned(),
            dj_mode: false,
            parties: Arc::clone(&self.parties),
        })
    }
}

/// A member's local copy of a party, kept current by polling.
pub struct PartyView {
    party: Party,
    username: String,
    dj_mode: bool,
    parties: Arc<dyn PartyStore>,
}

impl PartyView {
    #[must_use]
    pub fn party(&self) -> &Party {
        &self.party
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    #[must_use]
    pub fn is_host(&self) -> bool {
        self.party.is_host(&self.username)
    }

    #[must_use]
    pub fn dj_mode(&self) -> bool {
        self.dj_mode
    }

    /// Re-fetches the party. Returns whether its songs changed.
    ///
    /// DJ mode stays on for the fetched songs unless one of the new songs
    /// has no preview, which switches it off.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` once the party has ended.
    pub async fn refresh(&mut self) -> Result<bool> {
        let mut party = self.parties.party(&self.party.id).await?;

        if self.dj_mode {
            if let Err(e) = playlist::apply_dj_mode(&mut party.songs, true) {
                warn!("switching off dj mode for {party}: {e}");
                self.dj_mode = false;
            }
        }

        let changed = party.songs.len() != self.party.songs.len()
            || party
                .songs
                .iter()
                .zip(&self.party.songs)
                .any(|(new, old)| !new.is_same(old));
        if changed {
            debug!("{} now has {} songs", party.name, party.songs.len());
        }

        self.party = party;
        Ok(changed)
    }

    /// Switches DJ mode and returns whether it is now on.
    ///
    /// # Errors
    ///
    /// * `PermissionDenied` if this member is not the host
    /// * `FailedPrecondition` if a song has no preview; nothing changes
    pub fn toggle_dj_mode(&mut self) -> Result<bool> {
        if !self.is_host() {
            return Err(Error::permission_denied(
                "only the host can switch dj mode",
            ));
        }

        let enabled = !self.dj_mode;
        playlist::apply_dj_mode(&mut self.party.songs, enabled)?;
        self.dj_mode = enabled;

        debug!(
            "dj mode {} for {}",
            if enabled { "on" } else { "off" },
            self.party
        );
        Ok(enabled)
    }

    /// The party as a source to play from.
    #[must_use]
    pub fn source(&self) -> PlaylistSource {
        PlaylistSource::Party(self.party.clone())
    }

    /// Plays the party's first song in `session`.
    ///
    /// # Errors
    ///
    /// * `PermissionDenied` if this member is not the host
    /// * `FailedPrecondition` if the party has no songs
    /// * any error of [`Session::play`]
    pub async fn play(&self, session: &mut Session) -> Result<()> {
        if !self.is_host() {
            return Err(Error::permission_denied(
                "Only the host can play songs in a party",
            ));
        }

        let first = self
            .party
            .songs
            .first()
            .cloned()
            .ok_or_else(|| Error::failed_precondition(format!("{} has no songs", self.party)))?;

        session.play(first, Some(self.source())).await
    }

    /// Stops viewing the party.
    pub fn close(self) {
        debug!("{} stopped viewing {}", self.username, self.party);
    }
}

impl fmt::Debug for PartyView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartyView")
            .field("party", &self.party.id)
            .field("username", &self.username)
            .field("dj_mode", &self.dj_mode)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        store::MemoryStore,
        track::tests::{local, streamed},
    };

    fn setup() -> (Arc<MemoryStore>, PartyManager) {
        let store = Arc::new(MemoryStore::new());
        store.befriend("alice", "bob").unwrap();
        store.befriend("alice", "carol").unwrap();
        store.befriend("dave", "carol").unwrap();

        let manager = PartyManager::new(store.clone(), store.clone());
        (store, manager)
    }

    #[tokio::test]
    async fn start_snapshots_friends() {
        let (_store, manager) = setup();
        let id = manager.start("alice", "Friday night").await.unwrap();

        let party = manager.party(&id).await.unwrap();
        assert!(party.is_host("alice"));
        assert_eq!(party.people, ["alice", "bob", "carol"]);
        assert!(party.songs.is_empty());
    }

    #[tokio::test]
    async fn conflicting_membership_creates_no_party() {
        let (_store, manager) = setup();
        manager.start("alice", "Friday night").await.unwrap();

        // carol is already partying with alice.
        let err = manager.start("dave", "Saturday").await.unwrap_err();
        assert!(err.is(ErrorKind::AlreadyExists));
        assert!(manager.parties_for("dave").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn only_the_host_ends_a_party() {
        let (_store, manager) = setup();
        let id = manager.start("alice", "Friday night").await.unwrap();

        let err = manager.end(&id, "bob").await.unwrap_err();
        assert!(err.is(ErrorKind::PermissionDenied));

        manager.end(&id, "alice").await.unwrap();
        assert!(manager.party(&id).await.unwrap_err().is(ErrorKind::NotFound));
        manager.end(&id, "alice").await.unwrap();
    }

    #[tokio::test]
    async fn leaving_keeps_the_party() {
        let (_store, manager) = setup();
        let id = manager.start("alice", "Friday night").await.unwrap();

        manager.leave("bob", &id).await.unwrap();
        manager.leave("carol", &id).await.unwrap();
        manager.leave("carol", &id).await.unwrap();

        let party = manager.party(&id).await.unwrap();
        assert_eq!(party.people, ["alice"]);

        let err = manager.leave("alice", &id).await.unwrap_err();
        assert!(err.is(ErrorKind::FailedPrecondition));
    }

    #[tokio::test]
    async fn members_see_songs_after_refresh() {
        let (_store, manager) = setup();
        let id = manager.start("alice", "Friday night").await.unwrap();
        let mut view = manager.open(&id, "bob").await.unwrap();

        let track = streamed("spotify:track:a", 1000);
        assert!(manager.add_song(&id, &track).await.unwrap());
        assert!(!manager.add_song(&id, &track).await.unwrap());

        assert!(view.party().songs.is_empty());
        assert!(view.refresh().await.unwrap());
        assert_eq!(view.party().songs.len(), 1);
        assert!(!view.refresh().await.unwrap());

        manager.remove_song(&id, &track).await.unwrap();
        assert!(view.refresh().await.unwrap());
        assert!(view.party().songs.is_empty());

        manager.end(&id, "alice").await.unwrap();
        assert!(view.refresh().await.unwrap_err().is(ErrorKind::NotFound));
    }

    #[tokio::test]
    async fn outsiders_cannot_open() {
        let (_store, manager) = setup();
        let id = manager.start("alice", "Friday night").await.unwrap();

        let err = manager.open(&id, "dave").await.unwrap_err();
        assert!(err.is(ErrorKind::PermissionDenied));
    }

    #[tokio::test]
    async fn dj_mode_is_host_only_and_needs_previews() {
        let (_store, manager) = setup();
        let id = manager.start("alice", "Friday night").await.unwrap();
        manager
            .add_song(&id, &streamed("spotify:track:a", 1000))
            .await
            .unwrap();

        let mut host = manager.open(&id, "alice").await.unwrap();
        let mut guest = manager.open(&id, "bob").await.unwrap();

        let err = guest.toggle_dj_mode().unwrap_err();
        assert!(err.is(ErrorKind::PermissionDenied));

        assert!(host.toggle_dj_mode().unwrap());
        assert!(host.party().songs.iter().all(|song| song.dj));

        // A new song without preview cannot be played as a preview.
        manager
            .add_song(&id, &local("uploads/demo.mp3", 1000))
            .await
            .unwrap();
        host.refresh().await.unwrap();
        assert!(!host.dj_mode());
        assert!(host.party().songs.iter().all(|song| !song.dj));

        let err = host.toggle_dj_mode().unwrap_err();
        assert!(err.is(ErrorKind::FailedPrecondition));
        assert!(!host.dj_mode());
    }

    #[tokio::test]
    async fn host_plays_the_party() {
        let (store, manager) = setup();
        let id = manager.start("alice", "Friday night").await.unwrap();
        let mut session = crate::session::tests::session_with(&store, Vec::new());

        let host = manager.open(&id, "alice").await.unwrap();
        let err = host.play(&mut session).await.unwrap_err();
        assert!(err.is(ErrorKind::FailedPrecondition));

        manager
            .add_song(&id, &streamed("spotify:track:a", 1000))
            .await
            .unwrap();
        manager
            .add_song(&id, &streamed("spotify:track:b", 1000))
            .await
            .unwrap();

        let guest = manager.open(&id, "bob").await.unwrap();
        let err = guest.play(&mut session).await.unwrap_err();
        assert!(err.is(ErrorKind::PermissionDenied));

        let mut host = host;
        host.refresh().await.unwrap();
        host.play(&mut session).await.unwrap();

        let player = session.player();
        assert_eq!(player.track().map(|track| track.uri.as_str()), Some("spotify:track:a"));
        assert_eq!(player.source().map(PlaylistSource::name), Some("Friday night"));
        assert_eq!(
            store.listening_to("alice").unwrap().map(|track| track.uri),
            Some("spotify:track:a".to_owned())
        );

        // The party ends after its last song.
        session.next().await.unwrap();
        session.next().await.unwrap();
        assert!(session.player().track().is_none());
    }

    #[tokio::test]
    async fn songs_added_after_the_end_restart_the_host() {
        let (store, manager) = setup();
        let id = manager.start("alice", "Friday night").await.unwrap();
        let mut session = crate::session::tests::session_with(&store, Vec::new());
        manager
            .add_song(&id, &streamed("spotify:track:a", 1000))
            .await
            .unwrap();

        let mut host = manager.open(&id, "alice").await.unwrap();
        host.play(&mut session).await.unwrap();
        session.next().await.unwrap();
        assert!(session.player().track().is_none());

        manager
            .add_song(&id, &streamed("spotify:track:b", 1000))
            .await
            .unwrap();
        assert!(host.refresh().await.unwrap());
        session.set_source(host.source()).await.unwrap();

        let player = session.player();
        assert_eq!(player.track().map(|track| track.uri.as_str()), Some("spotify:track:b"));
        assert_eq!(player.source().map(PlaylistSource::name), Some("Friday night"));
    }

    #[test]
    fn decodes_party_document() {
        let json = r#"{
            "_id": "66a1",
            "host": {"username": "alice", "friends": [], "email": "alice@example.com"},
            "people": ["alice", "bob"],
            "name": "Friday night",
            "songs": [{"uri": "spotify:track:a", "name": "A", "duration_ms": 1000}],
            "__v": 0
        }"#;

        let party: Party = serde_json::from_str(json).unwrap();
        assert_eq!(party.id, PartyId::from("66a1"));
        assert!(party.is_host("alice"));
        assert!(party.is_member("bob"));
        assert!(party.contains(&streamed("spotify:track:a", 1)));
    }
}
