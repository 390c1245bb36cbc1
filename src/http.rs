//! Rate-limited HTTP client shared by all remote services.
//!
//! Wraps `reqwest::Client` with:
//! * a rate limiter, so a misbehaving loop cannot hammer the backend or the
//!   streaming provider (50 calls per 5 seconds, with bursts)
//! * an optional cookie jar carrying the backend session cookie
//! * JSON `Accept` header, user agent and timeouts from the configuration
//!
//! # Example
//!
//! ```rust
//! use tunehouse::http::Client;
//!
//! let client = Client::without_cookies(&config)?;
//! let request = client.get(url, "");
//! let response = client.execute(request).await?;
//! ```

use std::{future::Future, num::NonZeroU32, sync::Arc, time::Duration};

use futures_util::{FutureExt, TryFutureExt};
use governor::{DefaultDirectRateLimiter, Quota};
use reqwest::{
    self,
    cookie::CookieStore,
    header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE},
    Body, Method, Url,
};
use serde::Serialize;

use crate::{
    config::Config,
    error::{Error, Result},
};

/// Appends percent-encoded path `segments` to `base`.
///
/// A trailing slash on `base` does not produce an empty segment.
///
/// # Errors
///
/// Returns `InvalidArgument` if `base` cannot carry a path, like `data:`
/// URLs.
pub fn join<'a, I>(base: &Url, segments: I) -> Result<Url>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| Error::invalid_argument(format!("{base} cannot be a base")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

pub struct Client {
    /// Client without rate limiting, for building requests.
    pub unlimited: reqwest::Client,

    rate_limiter: DefaultDirectRateLimiter,

    pub cookie_jar: Option<Arc<dyn CookieStore>>,
}

impl Client {
    /// Window over which calls are counted.
    const RATE_LIMIT_INTERVAL: Duration = Duration::from_secs(5);

    /// Calls allowed per window.
    const RATE_LIMIT_CALLS_PER_INTERVAL: u8 = 50;

    const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Per-read timeout. Slow recommendation or lyrics lookups delay
    /// playback transitions, so give up early.
    const READ_TIMEOUT: Duration = Duration::from_secs(2);

    const JSON_CONTENT: HeaderValue = HeaderValue::from_static("application/json");

    /// Creates a new client with optional cookie storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying client cannot be built, for
    /// example when the user agent is not a valid header value.
    ///
    /// # Panics
    ///
    /// Panics if the rate limit parameters are zero.
    pub fn new<C>(config: &Config, cookie_jar: Option<C>) -> Result<Self>
    where
        C: CookieStore + 'static,
    {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, Self::JSON_CONTENT);

        let cookie_jar = cookie_jar.map(|jar| Arc::new(jar));

        let mut http_client = reqwest::Client::builder()
            .tcp_keepalive(Self::KEEPALIVE_TIMEOUT)
            .read_timeout(Self::READ_TIMEOUT)
            .default_headers(headers)
            .user_agent(&config.user_agent);

        if let Some(ref jar) = cookie_jar {
            http_client = http_client.cookie_provider(Arc::clone(jar));
        }

        let replenish_interval =
            Self::RATE_LIMIT_INTERVAL / u32::from(Self::RATE_LIMIT_CALLS_PER_INTERVAL);
        let quota = Quota::with_period(replenish_interval)
            .expect("quota time interval is zero")
            .allow_burst(
                NonZeroU32::new(Self::RATE_LIMIT_CALLS_PER_INTERVAL.into())
                    .expect("calls per interval is zero"),
            );

        Ok(Self {
            unlimited: http_client.build()?,
            rate_limiter: governor::RateLimiter::direct(quota),
            cookie_jar: cookie_jar.map(|jar| jar as _),
        })
    }

    /// Creates a client that sends the cookies in `cookie_jar`.
    ///
    /// # Errors
    ///
    /// Returns an error if client creation fails.
    pub fn with_cookies<C>(config: &Config, cookie_jar: C) -> Result<Self>
    where
        C: CookieStore + 'static,
    {
        Self::new(config, Some(cookie_jar))
    }

    /// Creates a client for public endpoints.
    ///
    /// # Errors
    ///
    /// Returns an error if client creation fails.
    pub fn without_cookies(config: &Config) -> Result<Self> {
        Self::new(config, None::<reqwest::cookie::Jar>)
    }

    /// Builds a request with specified method, URL and body.
    pub fn request<U, T>(&self, method: Method, url: U, body: T) -> reqwest::Request
    where
        U: Into<Url>,
        T: Into<Body>,
    {
        let mut request = reqwest::Request::new(method, url.into());
        *request.body_mut() = Some(body.into());
        request
    }

    pub fn get<U, T>(&self, url: U, body: T) -> reqwest::Request
    where
        U: Into<Url>,
        T: Into<Body>,
    {
        self.request(Method::GET, url, body)
    }

    pub fn post<U, T>(&self, url: U, body: T) -> reqwest::Request
    where
        U: Into<Url>,
        T: Into<Body>,
    {
        self.request(Method::POST, url, body)
    }

    /// Builds a POST request with `body` encoded as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if `body` cannot be serialized.
    pub fn post_json<U, T>(&self, url: U, body: &T) -> Result<reqwest::Request>
    where
        U: Into<Url>,
        T: Serialize + ?Sized,
    {
        let mut request = self.post(url, serde_json::to_vec(body)?);
        request
            .headers_mut()
            .insert(CONTENT_TYPE, Self::JSON_CONTENT);
        Ok(request)
    }

    /// Executes a request once the rate limiter allows it.
    ///
    /// # Errors
    ///
    /// Returns an error if the request could not be sent or no response
    /// arrived. HTTP error statuses are not errors at this level.
    pub fn execute(
        &self,
        request: reqwest::Request,
    ) -> impl Future<Output = Result<reqwest::Response>> + '_ {
        trace!("{} {}", request.method(), request.url());
        let throttle = self.rate_limiter.until_ready();
        throttle.then(|()| self.unlimited.execute(request).map_err(Into::into))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_escapes_segments() {
        let base = Url::parse("https://api.lyrics.ovh/v1/").unwrap();
        let url = join(&base, ["AC/DC", "T.N.T. & more"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.lyrics.ovh/v1/AC%2FDC/T.N.T.%20&%20more"
        );

        let base = Url::parse("http://localhost:5757").unwrap();
        let url = join(&base, ["alice", "get-parties"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:5757/alice/get-parties");
    }

    #[test]
    fn join_rejects_cannot_be_a_base() {
        let base = Url::parse("data:text/plain,hello").unwrap();
        assert!(join(&base, ["x"]).is_err());
    }
}
