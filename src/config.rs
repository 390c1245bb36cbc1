//! Runtime configuration.
//!
//! Configuration is read from a small TOML file. Every key is optional and
//! falls back to the defaults below, so an empty file is a valid
//! configuration:
//!
//! ```toml
//! api_url = "http://localhost:5757/"
//! username = "alice"
//! session_token = "eyJhbGciOi..."
//! tick_period = 500          # milliseconds
//! preview_length = 30000     # milliseconds
//! ```

use std::{fs, path::Path, time::Duration};

use serde::Deserialize;
use serde_with::{serde_as, DurationMilliSeconds};
use url::Url;
use veil::Redact;

use crate::error::{Error, Result};

/// Cookie value that authenticates the user against the backend.
#[derive(Clone, PartialEq, Eq, Hash, Deserialize, Redact)]
#[redact(all)]
pub struct SessionToken(pub String);

impl SessionToken {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[serde_as]
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Base URL of the backend REST API.
    pub api_url: Url,

    /// Base URL of the streaming provider's Web API.
    pub provider_url: Url,

    /// Base URL of the lyrics service.
    pub lyrics_url: Url,

    /// Search endpoint used to look up a track's genre.
    pub genre_url: Url,

    /// User the session acts for. Without a username the session plays
    /// anonymously: nothing is reported to friends or statistics.
    pub username: Option<String>,

    /// Value of the backend's `token` cookie.
    pub session_token: Option<SessionToken>,

    #[serde(skip, default = "user_agent")]
    pub user_agent: String,

    /// Interval at which playback progress advances.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub tick_period: Duration,

    /// Length that tracks in DJ mode are played for.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub preview_length: Duration,

    /// Below this position "previous" goes to the previous track instead of
    /// restarting the current one.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub rewind_threshold: Duration,

    /// Number of tracks requested when the queue runs dry.
    pub recommendation_limit: u8,

    /// Lifetime of a streaming provider access token.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub token_lifetime: Duration,

    /// Fraction of a track that must have been played before it counts
    /// towards the listening statistics.
    pub stats_threshold: f64,

    /// Interval at which party members re-fetch the party.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub poll_interval: Duration,
}

impl Config {
    /// Largest configuration file that will be parsed.
    const MAX_FILE_SIZE: u64 = 8 * 1024;

    pub const DEFAULT_API_URL: &'static str = "http://localhost:5757/";
    pub const DEFAULT_PROVIDER_URL: &'static str = "https://api.spotify.com/v1/";
    pub const DEFAULT_LYRICS_URL: &'static str = "https://api.lyrics.ovh/v1/";
    pub const DEFAULT_GENRE_URL: &'static str = "https://itunes.apple.com/search";

    /// Loads the configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is larger than 8 KiB or
    /// does not parse.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let file_size = fs::metadata(path)?.len();
        if file_size > Self::MAX_FILE_SIZE {
            return Err(Error::out_of_range(format!(
                "{} is too large ({file_size} bytes)",
                path.display()
            )));
        }

        let contents = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;

        trace!("user agent: {}", config.user_agent);
        Ok(config)
    }

    /// Rejects values that would stall or break the playback loop.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for a zero period, interval, length or
    /// recommendation limit, and for a statistics threshold outside
    /// `0.0..=1.0`.
    pub fn validate(&self) -> Result<()> {
        if self.tick_period.is_zero() {
            return Err(Error::invalid_argument("tick period cannot be zero"));
        }
        if self.poll_interval.is_zero() {
            return Err(Error::invalid_argument("poll interval cannot be zero"));
        }
        if self.preview_length.is_zero() {
            return Err(Error::invalid_argument("preview length cannot be zero"));
        }
        if self.recommendation_limit == 0 {
            return Err(Error::invalid_argument(
                "recommendation limit cannot be zero",
            ));
        }
        if !(0.0..=1.0).contains(&self.stats_threshold) {
            return Err(Error::invalid_argument(format!(
                "statistics threshold {} is not a fraction",
                self.stats_threshold
            )));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        let parse = |url: &str| Url::parse(url).expect("invalid default url");

        Self {
            api_url: parse(Self::DEFAULT_API_URL),
            provider_url: parse(Self::DEFAULT_PROVIDER_URL),
            lyrics_url: parse(Self::DEFAULT_LYRICS_URL),
            genre_url: parse(Self::DEFAULT_GENRE_URL),
            username: None,
            session_token: None,
            user_agent: user_agent(),
            tick_period: Duration::from_millis(500),
            preview_length: Duration::from_secs(30),
            rewind_threshold: Duration::from_secs(2),
            recommendation_limit: 10,
            token_lifetime: Duration::from_secs(3600),
            stats_threshold: 0.1,
            poll_interval: Duration::from_secs(5),
        }
    }
}

/// Builds the `User-Agent` from the package and the operating system.
///
/// `/` and `;` separate the fields, so they are replaced where the OS
/// reports them.
fn user_agent() -> String {
    let app_name = env!("CARGO_PKG_NAME");
    let app_version = env!("CARGO_PKG_VERSION");

    let illegal_chars = |chr: char| chr == '/' || chr == ';';
    let os_name = match std::env::consts::OS {
        "macos" => "osx",
        other => other,
    };
    let os_version = sysinfo::System::os_version()
        .filter(|version| !version.is_empty())
        .unwrap_or_else(|| String::from("0"))
        .replace(illegal_chars, "_");

    format!("{app_name}/{app_version} (Rust; {os_name}/{os_version})")
}
