//! Song lyrics.

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::{
    config::Config,
    error::{Error, Result},
    http::{self, Client as HttpClient},
    track::Track,
};

/// Shown when no lyrics could be found.
pub const PLACEHOLDER: &str = "Sorry, no lyrics available";

#[async_trait]
pub trait LyricsProvider: Send + Sync {
    /// # Errors
    ///
    /// Returns `NotFound` when the song has no lyrics, `Unavailable` when
    /// the service cannot be reached.
    async fn lyrics(&self, artist: &str, title: &str) -> Result<String>;
}

/// Lyrics for `track`, or [`PLACEHOLDER`].
pub async fn lyrics_or_placeholder(provider: &dyn LyricsProvider, track: &Track) -> String {
    match provider.lyrics(track.artist_name(), &track.name).await {
        Ok(lyrics) if !lyrics.trim().is_empty() => lyrics,
        Ok(_) => PLACEHOLDER.to_owned(),
        Err(e) => {
            debug!("no lyrics for {track}: {e}");
            PLACEHOLDER.to_owned()
        }
    }
}

/// Client of the lyrics.ovh API: `GET {base}/{artist}/{title}`.
pub struct LyricsOvh {
    http_client: HttpClient,
    base_url: Url,
}

#[derive(Deserialize)]
struct LyricsResponse {
    #[serde(default)]
    lyrics: Option<String>,
}

impl LyricsOvh {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            http_client: HttpClient::without_cookies(config)?,
            base_url: config.lyrics_url.clone(),
        })
    }
}

#[async_trait]
impl LyricsProvider for LyricsOvh {
    async fn lyrics(&self, artist: &str, title: &str) -> Result<String> {
        if artist.is_empty() || title.is_empty() {
            return Err(Error::invalid_argument("artist and title are required"));
        }

        let request = self.http_client.get(http::join(&self.base_url, [artist, title])?, "");
        let response = self.http_client.execute(request).await?;
        let body: LyricsResponse = response.error_for_status()?.json().await?;

        body.lyrics
            .filter(|lyrics| !lyrics.trim().is_empty())
            .ok_or_else(|| Error::not_found(format!("no lyrics for {artist} - {title}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::tests::streamed;

    struct Fixed(Result<&'static str>);

    #[async_trait]
    impl LyricsProvider for Fixed {
        async fn lyrics(&self, _artist: &str, _title: &str) -> Result<String> {
            match &self.0 {
                Ok(lyrics) => Ok((*lyrics).to_owned()),
                Err(e) => Err(Error::new(e.kind, e.to_string())),
            }
        }
    }

    #[tokio::test]
    async fn falls_back_to_placeholder() {
        let track = streamed("spotify:track:a", 1000);

        let found = Fixed(Ok("We're no strangers to love"));
        assert_eq!(
            lyrics_or_placeholder(&found, &track).await,
            "We're no strangers to love"
        );

        let blank = Fixed(Ok("  \n"));
        assert_eq!(lyrics_or_placeholder(&blank, &track).await, PLACEHOLDER);

        let down = Fixed(Err(Error::unavailable("timeout")));
        assert_eq!(lyrics_or_placeholder(&down, &track).await, PLACEHOLDER);
    }
}
