//! REST client of the backend.
//!
//! Implements every store trait over the backend's routes. Requests carry
//! the session token as the `token` cookie, which protected routes check
//! against the username in the path.
//!
//! The backend has a few quirks that are handled here:
//!
//! * refusals arrive with status 200, see [`Reply`]
//! * ending and leaving a party are never answered; the read timeout is
//!   taken as success
//! * starting a party ignores the requested members and invites the host's
//!   friends itself, and it does not refuse members that are in another
//!   party

use std::fmt::Debug;

use async_trait::async_trait;
use reqwest::header::HeaderValue;
use serde::{de::DeserializeOwned, Serialize};
use url::Url;

use crate::{
    config::Config,
    error::{Error, ErrorKind, Result},
    http::{self, Client as HttpClient},
    library::Reaction,
    party::{Party, PartyId},
    playlist::{NewPlaylist, Playlist, PlaylistId},
    protocol::{
        self,
        backend::{self, Reply},
    },
    store::{ListeningStats, NowPlaying, PartyStore, TrackStore, UserDirectory},
    tokens::TokenSource,
    track::Track,
};

pub struct Gateway {
    http_client: HttpClient,
    api_url: Url,
}

impl Gateway {
    /// Name of the cookie that carries the session token.
    const SESSION_COOKIE: &'static str = "token";

    fn cookie_jar(config: &Config) -> reqwest::cookie::Jar {
        let cookie_jar = reqwest::cookie::Jar::default();

        if let Some(ref token) = config.session_token {
            let cookie = format!("{}={}; Path=/; HttpOnly", Self::SESSION_COOKIE, token.as_str());
            cookie_jar.add_cookie_str(&cookie, &config.api_url);
        }

        cookie_jar
    }

    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: &Config) -> Result<Self> {
        if config.session_token.is_none() {
            warn!("no session token configured: protected routes will be refused");
        }

        let http_client = HttpClient::with_cookies(config, Self::cookie_jar(config))?;
        Ok(Self {
            http_client,
            api_url: config.api_url.clone(),
        })
    }

    /// Cookies that are sent to the backend.
    #[must_use]
    pub fn cookies(&self) -> Option<HeaderValue> {
        self.http_client
            .cookie_jar
            .as_ref()
            .and_then(|jar| jar.cookies(&self.api_url))
    }

    fn url<'a, I>(&self, segments: I) -> Result<Url>
    where
        I: IntoIterator<Item = &'a str>,
    {
        http::join(&self.api_url, segments)
    }

    async fn send<T>(&self, request: reqwest::Request, origin: &str) -> Result<T>
    where
        T: DeserializeOwned + Debug,
    {
        let response = self.http_client.execute(request).await?;
        let body = response.error_for_status()?.text().await?;
        protocol::json::<Reply<T>>(&body, origin)?.into_result()
    }

    async fn get<T>(&self, url: Url, origin: &str) -> Result<T>
    where
        T: DeserializeOwned + Debug,
    {
        let request = self.http_client.get(url, "");
        self.send(request, origin).await
    }

    async fn post<T, B>(&self, url: Url, body: &B, origin: &str) -> Result<T>
    where
        T: DeserializeOwned + Debug,
        B: Serialize + ?Sized,
    {
        let request = self.http_client.post_json(url, body)?;
        self.send(request, origin).await
    }

    /// Posts `body` to a route that answers `{"success": bool}`.
    async fn command<B>(&self, url: Url, body: &B, origin: &str) -> Result<()>
    where
        B: Serialize + ?Sized,
    {
        let reply: backend::Success = self.post(url, body, origin).await?;
        if !reply.success {
            return Err(Error::unknown(format!("{origin} was not successful")));
        }
        Ok(())
    }

    /// Calls a route that does its work but never answers.
    async fn unanswered(&self, url: Url, origin: &str) -> Result<()> {
        let request = self.http_client.get(url, "");
        match self.http_client.execute(request).await {
            Ok(response) => {
                response.error_for_status()?;
                Ok(())
            }
            Err(e) if e.is(ErrorKind::DeadlineExceeded) => {
                debug!("{origin}: no response, assuming success");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl TrackStore for Gateway {
    async fn search(&self, query: &str) -> Result<Vec<Track>> {
        let url = self.url(["songs", query])?;
        let reply: backend::Tracks = self.get(url, "songs").await?;
        Ok(reply.tracks)
    }

    async fn playlists(&self, username: &str) -> Result<Vec<Playlist>> {
        let url = self.url([username, "get-all-playlists"])?;
        let reply: backend::AllPlaylists = self.get(url, "get-all-playlists").await?;
        Ok(reply.data.map(|data| data.playlists).unwrap_or_default())
    }

    async fn create_playlist(&self, username: &str, playlist: &NewPlaylist) -> Result<()> {
        let url = self.url(["create-playlist"])?;
        let body = backend::CreatePlaylist::new(username, playlist);
        self.command(url, &body, "create-playlist").await
    }

    async fn add_song(&self, username: &str, playlist: &PlaylistId, track: &Track) -> Result<bool> {
        let url = self.url(["playlist", "add-song"])?;
        let body = backend::PlaylistSong {
            username,
            playlist_id: playlist,
            song: track,
        };
        let reply: backend::Success = self.post(url, &body, "playlist/add-song").await?;
        Ok(reply.success)
    }

    async fn remove_song(
        &self,
        username: &str,
        playlist: &PlaylistId,
        track: &Track,
    ) -> Result<()> {
        let url = self.url(["playlist", "remove-song"])?;
        let body = backend::PlaylistSong {
            username,
            playlist_id: playlist,
            song: track,
        };
        self.command(url, &body, "playlist/remove-song").await
    }

    async fn react(&self, username: &str, track: &Track, reaction: Reaction) -> Result<()> {
        let route = match reaction {
            Reaction::Like => "like",
            Reaction::Dislike => "dislike",
        };
        let url = self.url([route])?;
        self.command(url, &backend::UserTrack { username, track }, route)
            .await
    }

    async fn reacted(&self, username: &str, reaction: Reaction) -> Result<Vec<Track>> {
        let route = match reaction {
            Reaction::Like => "get-liked-songs",
            Reaction::Dislike => "get-disliked-songs",
        };
        let url = self.url([route])?;
        let reply: backend::Tracks = self.post(url, &backend::Username { username }, route).await?;
        Ok(reply.tracks)
    }
}

#[async_trait]
impl PartyStore for Gateway {
    async fn create_party(&self, host: &str, people: &[String], name: &str) -> Result<PartyId> {
        trace!("backend invites the friends of {host} itself, not {people:?}");

        let url = self.url([host, "start-party"])?;
        let reply: backend::PartyStarted = self
            .post(url, &backend::PartyName { name }, "start-party")
            .await?;

        match reply.id {
            Some(id) if reply.success => Ok(id),
            _ => Err(Error::unknown(format!("backend could not start {name}"))),
        }
    }

    async fn delete_party(&self, party: &PartyId) -> Result<()> {
        let url = self.url([party.0.as_str(), "end-party"])?;
        self.unanswered(url, "end-party").await
    }

    async fn party(&self, party: &PartyId) -> Result<Party> {
        let url = self.url([party.0.as_str(), "get-party"])?;
        let reply: backend::PartyDocument = self.get(url, "get-party").await?;
        reply
            .party
            .ok_or_else(|| Error::not_found(format!("party {party} not found")))
    }

    async fn parties_for(&self, username: &str) -> Result<Vec<Party>> {
        let url = self.url([username, "get-parties"])?;
        let reply: backend::Parties = self.get(url, "get-parties").await?;
        Ok(reply.parties)
    }

    async fn add_party_song(&self, party: &PartyId, track: &Track) -> Result<()> {
        let url = self.url([party.0.as_str(), "add-song"])?;
        self.command(url, &backend::TrackBody { track }, "party/add-song")
            .await
    }

    async fn remove_party_song(&self, party: &PartyId, track: &Track) -> Result<()> {
        let url = self.url([party.0.as_str(), "remove-song"])?;
        self.command(url, &backend::SongBody { song: track }, "party/remove-song")
            .await
    }

    async fn remove_member(&self, party: &PartyId, username: &str) -> Result<()> {
        let url = self.url([username, party.0.as_str(), "leave-party"])?;
        self.unanswered(url, "leave-party").await
    }
}

#[async_trait]
impl UserDirectory for Gateway {
    async fn friends_of(&self, username: &str) -> Result<Vec<String>> {
        let url = self.url(["user", username])?;
        let reply: backend::Users = self.post(url, &backend::Username { username }, "user").await?;

        // The lookup is a pattern match, so pick the exact user.
        reply
            .users
            .into_iter()
            .find(|user| user.username == username)
            .map(|user| user.friends.into_iter().map(|friend| friend.username).collect())
            .ok_or_else(|| Error::not_found(format!("user {username} not found")))
    }
}

#[async_trait]
impl NowPlaying for Gateway {
    async fn set_listening_to(&self, username: &str, track: Option<&Track>) -> Result<()> {
        let url = self.url([username, "listening-to"])?;
        match track {
            Some(track) => self.command(url, track, "listening-to").await,
            None => {
                self.command(url, &serde_json::json!({}), "listening-to")
                    .await
            }
        }
    }
}

#[async_trait]
impl ListeningStats for Gateway {
    async fn record_play(&self, username: &str, track: &Track) -> Result<()> {
        let url = self.url([username, "update-stats"])?;
        self.command(url, &backend::TrackBody { track }, "update-stats")
            .await
    }
}

#[async_trait]
impl TokenSource for Gateway {
    async fn fetch_token(&self) -> Result<String> {
        let url = self.url(["get-spotify-token"])?;
        let reply: backend::ProviderToken = self.get(url, "get-spotify-token").await?;
        match reply.token {
            Some(token) if reply.success && !token.is_empty() => Ok(token),
            _ => Err(Error::unavailable("backend has no provider token")),
        }
    }
}
