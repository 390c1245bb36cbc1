//! Responses of the streaming provider's Web API and of the genre lookup.

use serde::Deserialize;

use crate::track::{Image, Track};

/// A page of results.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Paging<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

/// `GET search?type=track`
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Search {
    pub tracks: Paging<Track>,
}

/// `GET artists/{id}`
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Artist {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub images: Vec<Image>,
}

/// `GET recommendations`
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Recommendations {
    #[serde(default)]
    pub tracks: Vec<Track>,
}

/// Genre lookup: `GET search?term=..&media=music`
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct GenreSearch {
    #[serde(default)]
    pub results: Vec<GenreResult>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenreResult {
    pub primary_genre_name: Option<String>,
}

impl GenreSearch {
    /// Genre of the best match.
    #[must_use]
    pub fn genre(self) -> Option<String> {
        self.results
            .into_iter()
            .next()
            .and_then(|result| result.primary_genre_name)
            .filter(|genre| !genre.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_search_results() {
        let json = r#"{
            "tracks": {
                "href": "https://api.spotify.com/v1/search?query=track%3Ahello",
                "items": [{
                    "id": "4sPmO7WMQUAf45kwMOtONw",
                    "uri": "spotify:track:4sPmO7WMQUAf45kwMOtONw",
                    "name": "Hello",
                    "artists": [{"id": "4dpARuHxo51G3z768sgnrY", "name": "Adele"}],
                    "duration_ms": 295493,
                    "preview_url": "https://p.scdn.co/mp3-preview/abc"
                }],
                "limit": 50,
                "total": 1
            }
        }"#;

        let search: Search = serde_json::from_str(json).unwrap();
        assert_eq!(search.tracks.items.len(), 1);
        assert!(search.tracks.items[0].has_preview());
    }

    #[test]
    fn first_genre_wins() {
        let json = r#"{
            "resultCount": 2,
            "results": [
                {"trackName": "Hello", "primaryGenreName": "Pop"},
                {"trackName": "Hello", "primaryGenreName": "Soul"}
            ]
        }"#;
        let search: GenreSearch = serde_json::from_str(json).unwrap();
        assert_eq!(search.genre().as_deref(), Some("Pop"));

        let empty: GenreSearch = serde_json::from_str(r#"{"resultCount": 0, "results": []}"#).unwrap();
        assert_eq!(empty.genre(), None);
    }
}
