//! Recommendations for when nothing is queued.

use async_trait::async_trait;

use crate::{
    error::{Error, Result},
    track::Track,
};

/// What recommendations are based on: the track that just ended.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Seed {
    pub track_id: String,
    pub genre: Option<String>,
    pub artist_id: Option<String>,
}

impl Seed {
    #[must_use]
    pub fn from_track(track: &Track) -> Self {
        Self {
            track_id: track.id.clone(),
            genre: track.primary_genre().map(ToOwned::to_owned),
            artist_id: track.primary_artist().and_then(|artist| artist.id.clone()),
        }
    }
}

#[async_trait]
pub trait Recommender: Send + Sync {
    /// Up to `limit` tracks similar to `seed`.
    async fn recommendations(&self, seed: &Seed, limit: u8) -> Result<Vec<Track>>;
}

/// Fetches recommendations, once.
///
/// # Errors
///
/// Returns `Unavailable` when the recommender fails or has nothing to offer.
pub async fn fetch(recommender: &dyn Recommender, seed: &Seed, limit: u8) -> Result<Vec<Track>> {
    debug!("fetching {limit} recommendations for {}", seed.track_id);

    match recommender.recommendations(seed, limit).await {
        Ok(tracks) if tracks.is_empty() => {
            Err(Error::unavailable("recommendation unavailable: no tracks"))
        }
        Ok(mut tracks) => {
            tracks.truncate(limit.into());
            Ok(tracks)
        }
        Err(e) => Err(Error::unavailable(format!("recommendation unavailable: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::{error::ErrorKind, track::tests::streamed};

    struct Canned {
        tracks: Result<Vec<Track>>,
        seeds: Mutex<Vec<Seed>>,
    }

    #[async_trait]
    impl Recommender for Canned {
        async fn recommendations(&self, seed: &Seed, _limit: u8) -> Result<Vec<Track>> {
            self.seeds.lock().unwrap().push(seed.clone());
            match &self.tracks {
                Ok(tracks) => Ok(tracks.clone()),
                Err(e) => Err(Error::new(e.kind, e.to_string())),
            }
        }
    }

    #[test]
    fn seed_uses_track_genre_and_primary_artist() {
        let track = streamed("spotify:track:abc", 1000);
        let seed = Seed::from_track(&track);

        assert_eq!(seed.track_id, "abc");
        assert_eq!(seed.genre.as_deref(), Some("pop"));
        assert_eq!(seed.artist_id.as_deref(), Some("artist-spotify:track:abc"));
    }

    #[tokio::test]
    async fn truncates_to_the_limit() {
        let recommender = Canned {
            tracks: Ok((0..12)
                .map(|i| streamed(&format!("spotify:track:{i}"), 1000))
                .collect()),
            seeds: Mutex::new(Vec::new()),
        };

        let tracks = fetch(&recommender, &Seed::default(), 10).await.unwrap();
        assert_eq!(tracks.len(), 10);
        assert_eq!(recommender.seeds.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_and_failed_are_unavailable() {
        let empty = Canned {
            tracks: Ok(Vec::new()),
            seeds: Mutex::new(Vec::new()),
        };
        let err = fetch(&empty, &Seed::default(), 10).await.unwrap_err();
        assert!(err.is(ErrorKind::Unavailable));

        let failing = Canned {
            tracks: Err(Error::unauthenticated("token expired")),
            seeds: Mutex::new(Vec::new()),
        };
        let err = fetch(&failing, &Seed::default(), 10).await.unwrap_err();
        assert!(err.is(ErrorKind::Unavailable));
        assert_eq!(failing.seeds.lock().unwrap().len(), 1);
    }
}
