//! Tracks as they travel between the backend, the streaming provider and the
//! player.
//!
//! The same JSON shape is used everywhere: search results from the streaming
//! provider, uploads from the backend's song collection, and songs stored in
//! playlists and parties. Uploaded songs name their artists as plain strings,
//! provider tracks as objects; both decode into [`Artist`].

use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};
use serde_with::{formats::Flexible, serde_as, DurationMilliSeconds};

/// Genre assigned to uploaded tracks.
pub const LOCAL_GENRE: &str = "local";

/// Genre assigned when the lookup found nothing.
pub const FALLBACK_GENRE: &str = "others";

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Image {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Album {
    #[serde(default)]
    pub images: Vec<Image>,
}

/// A performing artist.
///
/// Only provider artists carry an `id`; uploads know artists by name only.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "ArtistRepr")]
pub struct Artist {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<Image>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ArtistRepr {
    Name(String),
    Full {
        #[serde(default)]
        id: Option<String>,
        name: String,
        #[serde(default)]
        images: Vec<Image>,
    },
}

impl From<ArtistRepr> for Artist {
    fn from(repr: ArtistRepr) -> Self {
        match repr {
            ArtistRepr::Name(name) => Self {
                id: None,
                name,
                images: Vec::new(),
            },
            ArtistRepr::Full { id, name, images } => Self { id, name, images },
        }
    }
}

impl fmt::Display for Artist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A playable track.
///
/// Two tracks are the same track when their `uri` matches; see
/// [`Track::is_same`]. The remaining fields are metadata, except for three
/// runtime flags:
///
/// * `dj`: play the 30-second preview instead of the full track
/// * `genre`: filled in when the track starts playing
/// * `stats_updated`: whether this play was already counted; never serialized
#[serde_as]
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Provider id. Empty for uploads.
    #[serde(default)]
    pub id: String,

    pub uri: String,

    pub name: String,

    #[serde(default)]
    pub artists: Vec<Artist>,

    #[serde(rename = "duration_ms", default)]
    #[serde_as(as = "DurationMilliSeconds<u64, Flexible>")]
    pub duration: Duration,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<Album>,

    /// Cover of an uploaded track, relative to the backend.
    #[serde(
        rename = "coverImgUrl",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub cover_img_url: Option<String>,

    #[serde(default)]
    pub is_local: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub genre: Vec<String>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub dj: bool,

    #[serde(skip)]
    stats_updated: bool,
}

impl Track {
    /// Length that DJ tracks are played for.
    pub const PREVIEW_LENGTH: Duration = Duration::from_secs(30);

    /// Whether `other` refers to the same recording.
    #[must_use]
    pub fn is_same(&self, other: &Track) -> bool {
        self.uri == other.uri
    }

    /// How long this track plays for: the preview length in DJ mode, the full
    /// duration otherwise.
    #[must_use]
    pub fn effective_duration(&self) -> Duration {
        self.duration_with_preview(Self::PREVIEW_LENGTH)
    }

    /// Like [`effective_duration`](Self::effective_duration) with a
    /// configured preview length.
    #[must_use]
    pub fn duration_with_preview(&self, preview_length: Duration) -> Duration {
        if self.dj {
            preview_length
        } else {
            self.duration
        }
    }

    /// Whether the track has a playable preview.
    #[must_use]
    pub fn has_preview(&self) -> bool {
        self.preview_url
            .as_deref()
            .is_some_and(|url| !url.trim().is_empty())
    }

    /// Whether playback progress for this track is kept by the local tick
    /// rather than by the streaming provider's controller.
    #[must_use]
    pub fn is_locally_timed(&self) -> bool {
        self.is_local || self.dj
    }

    #[must_use]
    pub fn primary_artist(&self) -> Option<&Artist> {
        self.artists.first()
    }

    #[must_use]
    pub fn artist_name(&self) -> &str {
        self.primary_artist().map_or("", |artist| artist.name.as_str())
    }

    #[must_use]
    pub fn primary_genre(&self) -> Option<&str> {
        self.genre.first().map(String::as_str)
    }

    /// Cover art: the first album image, or the upload's cover.
    #[must_use]
    pub fn cover_url(&self) -> Option<&str> {
        self.album
            .as_ref()
            .and_then(|album| album.images.first())
            .map(|image| image.url.as_str())
            .or(self.cover_img_url.as_deref())
    }

    #[must_use]
    pub fn stats_updated(&self) -> bool {
        self.stats_updated
    }

    pub fn set_stats_updated(&mut self, updated: bool) {
        self.stats_updated = updated;
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: \"{} - {}\"", self.uri, self.artist_name(), self.name)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Streamed track fixture with a preview.
    pub(crate) fn streamed(uri: &str, duration_ms: u64) -> Track {
        Track {
            id: uri.rsplit(':').next().unwrap_or(uri).to_owned(),
            uri: uri.to_owned(),
            name: format!("Song {uri}"),
            artists: vec![Artist {
                id: Some(format!("artist-{uri}")),
                name: "Artist".to_owned(),
                images: Vec::new(),
            }],
            duration: Duration::from_millis(duration_ms),
            preview_url: Some(format!("https://p.scdn.co/mp3-preview/{uri}")),
            genre: vec!["pop".to_owned()],
            ..Track::default()
        }
    }

    /// Uploaded track fixture.
    pub(crate) fn local(uri: &str, duration_ms: u64) -> Track {
        Track {
            uri: uri.to_owned(),
            name: format!("Upload {uri}"),
            artists: vec![Artist {
                name: "Garage Band".to_owned(),
                ..Artist::default()
            }],
            duration: Duration::from_millis(duration_ms),
            is_local: true,
            ..Track::default()
        }
    }

    #[test]
    fn effective_duration_follows_dj_flag() {
        let mut track = streamed("spotify:track:1", 215_000);
        assert_eq!(track.effective_duration(), Duration::from_millis(215_000));

        track.dj = true;
        assert_eq!(track.effective_duration(), Duration::from_millis(30_000));
        assert_eq!(
            track.duration_with_preview(Duration::from_secs(10)),
            Duration::from_secs(10)
        );
    }

    #[test]
    fn decodes_provider_track() {
        let json = r#"{
            "id": "4uLU6hMCjMI75M1A2tKUQC",
            "uri": "spotify:track:4uLU6hMCjMI75M1A2tKUQC",
            "name": "Never Gonna Give You Up",
            "artists": [{"id": "0gxyHStUsqpMadRV0Di1Qt", "name": "Rick Astley"}],
            "duration_ms": 213573,
            "album": {"images": [{"url": "https://i.scdn.co/image/abc", "width": 640, "height": 640}]},
            "is_local": false,
            "preview_url": null,
            "popularity": 80
        }"#;

        let track: Track = serde_json::from_str(json).unwrap();
        assert_eq!(track.artist_name(), "Rick Astley");
        assert_eq!(
            track.primary_artist().and_then(|a| a.id.as_deref()),
            Some("0gxyHStUsqpMadRV0Di1Qt")
        );
        assert_eq!(track.duration, Duration::from_millis(213_573));
        assert_eq!(track.cover_url(), Some("https://i.scdn.co/image/abc"));
        assert!(!track.has_preview());
        assert!(!track.dj);
        assert!(!track.stats_updated());
    }

    #[test]
    fn decodes_uploaded_track() {
        let json = r#"{
            "_id": "65f0c0ffee",
            "name": "Basement Demo",
            "artists": ["Garage Band"],
            "uri": "uploads/basement-demo.mp3",
            "coverImgUrl": "basement.png",
            "is_local": true
        }"#;

        let track: Track = serde_json::from_str(json).unwrap();
        assert!(track.is_local);
        assert!(track.is_locally_timed());
        assert_eq!(track.artist_name(), "Garage Band");
        assert_eq!(track.primary_artist().and_then(|a| a.id.as_ref()), None);
        assert_eq!(track.cover_url(), Some("basement.png"));
        assert_eq!(track.duration, Duration::ZERO);
    }

    #[test]
    fn stats_flag_is_never_serialized() {
        let mut track = streamed("spotify:track:2", 1000);
        track.set_stats_updated(true);

        let json = serde_json::to_value(&track).unwrap();
        assert!(json.get("stats_updated").is_none());
        assert_eq!(json["duration_ms"], 1000);

        let decoded: Track = serde_json::from_value(json).unwrap();
        assert!(!decoded.stats_updated());
        assert!(decoded.is_same(&track));
    }
}
