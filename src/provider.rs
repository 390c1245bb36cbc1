//! Streaming provider Web API.
//!
//! Track search, artist pictures and recommendations come from a
//! Spotify-compatible Web API, authorized with a bearer token from a
//! [`TokenCache`]. A token the provider rejects is dropped and fetched anew
//! for one retry. Genres come from the iTunes search API, which needs no
//! token.

use std::{fmt::Debug, sync::Arc};

use async_trait::async_trait;
use reqwest::{
    header::{HeaderValue, AUTHORIZATION},
    StatusCode,
};
use serde::de::DeserializeOwned;
use url::Url;

use crate::{
    config::Config,
    error::{Error, Result},
    http::{self, Client as HttpClient},
    metadata::Metadata,
    protocol::{self, provider},
    recommend::{Recommender, Seed},
    tokens::{TokenCache, TokenSource},
    track::{Image, Track},
};

pub struct Provider {
    http_client: HttpClient,
    base_url: Url,
    genre_url: Url,
    tokens: TokenCache,
}

impl Provider {
    /// Results per search request.
    const SEARCH_LIMIT: u8 = 50;

    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: &Config, tokens: Arc<dyn TokenSource>) -> Result<Self> {
        Ok(Self {
            http_client: HttpClient::without_cookies(config)?,
            base_url: config.provider_url.clone(),
            genre_url: config.genre_url.clone(),
            tokens: TokenCache::new(tokens, config.token_lifetime),
        })
    }

    fn url<'a, I>(&self, segments: I) -> Result<Url>
    where
        I: IntoIterator<Item = &'a str>,
    {
        http::join(&self.base_url, segments)
    }

    async fn authorized<T>(&self, url: Url, origin: &str) -> Result<T>
    where
        T: DeserializeOwned + Debug,
    {
        let mut retried = false;
        loop {
            let token = self.tokens.token().await?;
            let mut authorization = HeaderValue::from_str(&format!("Bearer {}", token.as_str()))?;
            authorization.set_sensitive(true);

            let mut request = self.http_client.get(url.clone(), "");
            request.headers_mut().insert(AUTHORIZATION, authorization);

            let response = self.http_client.execute(request).await?;
            if response.status() == StatusCode::UNAUTHORIZED && !retried {
                debug!("{origin}: provider token rejected, refreshing");
                self.tokens.flush().await;
                retried = true;
                continue;
            }

            let body = response.error_for_status()?.text().await?;
            return protocol::json(&body, origin);
        }
    }

    /// Tracks whose title matches `query`.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider cannot be reached or rejects the
    /// request.
    pub async fn search(&self, query: &str) -> Result<Vec<Track>> {
        let mut url = self.url(["search"])?;
        url.query_pairs_mut()
            .append_pair("q", &format!("track:{query}"))
            .append_pair("type", "track")
            .append_pair("limit", &Self::SEARCH_LIMIT.to_string());

        let search: provider::Search = self.authorized(url, "search").await?;
        Ok(search.tracks.items)
    }

    /// # Errors
    ///
    /// Returns `NotFound` for an unknown artist.
    pub async fn artist(&self, artist_id: &str) -> Result<provider::Artist> {
        let url = self.url(["artists", artist_id])?;
        self.authorized(url, "artist").await
    }

    /// Recommendations request for `seed`. Seeds that are absent are left
    /// out of the query.
    fn recommendations_url(&self, seed: &Seed, limit: u8) -> Result<Url> {
        if seed.track_id.is_empty() && seed.artist_id.is_none() {
            return Err(Error::invalid_argument("uploads cannot seed recommendations"));
        }

        let mut url = self.url(["recommendations"])?;
        {
            let mut query = url.query_pairs_mut();
            if !seed.track_id.is_empty() {
                query.append_pair("seed_tracks", &seed.track_id);
            }
            if let Some(genre) = &seed.genre {
                query.append_pair("seed_genres", genre);
            }
            if let Some(artist) = &seed.artist_id {
                query.append_pair("seed_artists", artist);
            }
            query.append_pair("limit", &limit.to_string());
        }

        Ok(url)
    }
}

#[async_trait]
impl Recommender for Provider {
    async fn recommendations(&self, seed: &Seed, limit: u8) -> Result<Vec<Track>> {
        let url = self.recommendations_url(seed, limit)?;
        let recommendations: provider::Recommendations =
            self.authorized(url, "recommendations").await?;
        Ok(recommendations.tracks)
    }
}

#[async_trait]
impl Metadata for Provider {
    async fn genre(&self, artist: &str, title: &str) -> Result<Option<String>> {
        let mut url = self.genre_url.clone();
        url.query_pairs_mut()
            .append_pair("term", &format!("{artist} {title}"))
            .append_pair("media", "music")
            .append_pair("limit", "1");

        let request = self.http_client.get(url, "");
        let body = self
            .http_client
            .execute(request)
            .await?
            .error_for_status()?
            .text()
            .await?;

        let search: provider::GenreSearch = protocol::json(&body, "genre")?;
        Ok(search.genre())
    }

    async fn artist_images(&self, artist_id: &str) -> Result<Vec<Image>> {
        Ok(self.artist(artist_id).await?.images)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use wiremock::{
        matchers::{header, method, path, query_param},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;
    use crate::error::ErrorKind;

    /// Hands out `token-0`, `token-1`, ... and counts the fetches.
    #[derive(Default)]
    struct Counting(AtomicUsize);

    impl Counting {
        fn fetches(&self) -> usize {
            self.0.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TokenSource for Counting {
        async fn fetch_token(&self) -> Result<String> {
            let n = self.0.fetch_add(1, Ordering::SeqCst);
            Ok(format!("token-{n}"))
        }
    }

    fn provider(base_url: &str) -> (Provider, Arc<Counting>) {
        let config = Config {
            provider_url: Url::parse(base_url).unwrap(),
            ..Config::default()
        };
        let tokens = Arc::new(Counting::default());
        (Provider::new(&config, tokens.clone()).unwrap(), tokens)
    }

    fn seed() -> Seed {
        Seed {
            track_id: "4uLU6hMCjMI75M1A2tKUQC".to_owned(),
            genre: Some("pop".to_owned()),
            artist_id: Some("0gxyHStUsqpMadRV0Di1Qt".to_owned()),
        }
    }

    fn query(url: &Url) -> Vec<(String, String)> {
        url.query_pairs()
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect()
    }

    #[test]
    fn recommendations_carry_every_seed() {
        let (provider, _) = provider(Config::DEFAULT_PROVIDER_URL);
        let url = provider.recommendations_url(&seed(), 10).unwrap();

        assert_eq!(url.path(), "/v1/recommendations");
        assert_eq!(
            query(&url),
            [
                ("seed_tracks".to_owned(), "4uLU6hMCjMI75M1A2tKUQC".to_owned()),
                ("seed_genres".to_owned(), "pop".to_owned()),
                ("seed_artists".to_owned(), "0gxyHStUsqpMadRV0Di1Qt".to_owned()),
                ("limit".to_owned(), "10".to_owned()),
            ]
        );
    }

    #[test]
    fn absent_seeds_are_left_out() {
        let (provider, _) = provider(Config::DEFAULT_PROVIDER_URL);

        let artist_only = Seed {
            track_id: String::new(),
            genre: None,
            ..seed()
        };
        let url = provider.recommendations_url(&artist_only, 5).unwrap();
        assert_eq!(
            query(&url),
            [
                ("seed_artists".to_owned(), "0gxyHStUsqpMadRV0Di1Qt".to_owned()),
                ("limit".to_owned(), "5".to_owned()),
            ]
        );

        let upload = Seed {
            track_id: String::new(),
            genre: Some("local".to_owned()),
            artist_id: None,
        };
        let error = provider.recommendations_url(&upload, 5).unwrap_err();
        assert!(error.is(ErrorKind::InvalidArgument));
    }

    #[tokio::test]
    async fn rejected_token_is_replaced_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/recommendations"))
            .and(header("authorization", "Bearer token-0"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/recommendations"))
            .and(query_param("seed_tracks", "4uLU6hMCjMI75M1A2tKUQC"))
            .and(header("authorization", "Bearer token-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "tracks": [{
                    "id": "3n3Ppam7vgaVa1iaRUc9Lp",
                    "uri": "spotify:track:3n3Ppam7vgaVa1iaRUc9Lp",
                    "name": "Mr. Brightside",
                    "duration_ms": 222_973
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (provider, tokens) = provider(&format!("{}/v1/", server.uri()));
        let tracks = provider.recommendations(&seed(), 10).await.unwrap();

        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].name, "Mr. Brightside");
        assert_eq!(tokens.fetches(), 2);
    }

    #[tokio::test]
    async fn second_rejection_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/artists/0gxyHStUsqpMadRV0Di1Qt"))
            .respond_with(ResponseTemplate::new(401))
            .expect(2)
            .mount(&server)
            .await;

        let (provider, tokens) = provider(&format!("{}/v1/", server.uri()));
        let error = provider.artist("0gxyHStUsqpMadRV0Di1Qt").await.unwrap_err();

        assert!(error.is(ErrorKind::Unauthenticated));
        assert_eq!(tokens.fetches(), 2);
    }
}
