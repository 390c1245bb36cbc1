//! Track metadata that is looked up when a track starts playing.

use async_trait::async_trait;

use crate::{
    error::Result,
    track::{Image, Track, FALLBACK_GENRE, LOCAL_GENRE},
};

#[async_trait]
pub trait Metadata: Send + Sync {
    /// Main genre of a recording, if known.
    async fn genre(&self, artist: &str, title: &str) -> Result<Option<String>>;

    /// Pictures of an artist, by provider id.
    async fn artist_images(&self, artist_id: &str) -> Result<Vec<Image>>;
}

/// Fills in genre and primary artist images.
///
/// Never fails: uploads get the `local` genre, lookups that fail or find
/// nothing fall back to the `others` genre and no images.
pub async fn enrich(metadata: &dyn Metadata, track: &mut Track) {
    if track.is_local {
        track.genre = vec![LOCAL_GENRE.to_owned()];
        return;
    }

    let genre = match metadata.genre(track.artist_name(), &track.name).await {
        Ok(Some(genre)) if !genre.is_empty() => genre,
        Ok(_) => FALLBACK_GENRE.to_owned(),
        Err(e) => {
            debug!("genre lookup for {track} failed: {e}");
            FALLBACK_GENRE.to_owned()
        }
    };
    track.genre = vec![genre];

    let Some(artist) = track.artists.first_mut() else {
        return;
    };
    artist.images = match artist.id.as_deref() {
        Some(id) => metadata.artist_images(id).await.unwrap_or_else(|e| {
            debug!("fetching images of {artist} failed: {e}");
            Vec::new()
        }),
        None => Vec::new(),
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::Error,
        track::tests::{local, streamed},
    };

    struct Known;

    #[async_trait]
    impl Metadata for Known {
        async fn genre(&self, _artist: &str, _title: &str) -> Result<Option<String>> {
            Ok(Some("Synthpop".to_owned()))
        }

        async fn artist_images(&self, _artist_id: &str) -> Result<Vec<Image>> {
            Ok(vec![Image {
                url: "https://i.scdn.co/image/artist".to_owned(),
                ..Image::default()
            }])
        }
    }

    struct Down;

    #[async_trait]
    impl Metadata for Down {
        async fn genre(&self, _artist: &str, _title: &str) -> Result<Option<String>> {
            Err(Error::unavailable("itunes is down"))
        }

        async fn artist_images(&self, _artist_id: &str) -> Result<Vec<Image>> {
            Err(Error::unavailable("provider is down"))
        }
    }

    #[tokio::test]
    async fn fills_in_metadata() {
        let mut track = streamed("spotify:track:a", 1000);
        enrich(&Known, &mut track).await;

        assert_eq!(track.genre, ["Synthpop"]);
        assert_eq!(track.artists[0].images.len(), 1);
    }

    #[tokio::test]
    async fn failures_become_placeholders() {
        let mut track = streamed("spotify:track:a", 1000);
        track.artists[0].images.push(Image::default());
        enrich(&Down, &mut track).await;

        assert_eq!(track.genre, [FALLBACK_GENRE]);
        assert!(track.artists[0].images.is_empty());
    }

    #[tokio::test]
    async fn uploads_are_local() {
        let mut track = local("uploads/a.mp3", 1000);
        enrich(&Known, &mut track).await;

        assert_eq!(track.genre, [LOCAL_GENRE]);
        assert!(track.artists[0].images.is_empty());
    }
}
