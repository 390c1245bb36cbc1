//! Access tokens for the streaming provider.
//!
//! The backend hands out client-credential tokens for the provider's Web API
//! on `/get-spotify-token`. They are valid for a fixed lifetime, so the
//! [`TokenCache`] keeps the current one and fetches a new one when it
//! expired or the provider rejected it.

use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use async_trait::async_trait;
use tokio::sync::Mutex;
use veil::Redact;

use crate::error::Result;

#[derive(Clone, PartialEq, Eq, Hash, Redact)]
pub struct AccessToken {
    #[redact]
    token: String,
    pub expires_at: SystemTime,
}

impl AccessToken {
    #[must_use]
    pub fn new(token: String, lifetime: Duration) -> Self {
        Self {
            token,
            expires_at: SystemTime::now() + lifetime,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.token
    }

    #[must_use]
    pub fn time_to_live(&self) -> Duration {
        self.expires_at
            .duration_since(SystemTime::now())
            .unwrap_or(Duration::ZERO)
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        SystemTime::now() >= self.expires_at
    }
}

#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Fetches a fresh provider access token.
    async fn fetch_token(&self) -> Result<String>;
}

pub struct TokenCache {
    source: Arc<dyn TokenSource>,
    lifetime: Duration,
    current: Mutex<Option<AccessToken>>,
}

impl TokenCache {
    #[must_use]
    pub fn new(source: Arc<dyn TokenSource>, lifetime: Duration) -> Self {
        Self {
            source,
            lifetime,
            current: Mutex::new(None),
        }
    }

    /// The current token, fetching a new one if there is none or it
    /// expired.
    ///
    /// # Errors
    ///
    /// Returns an error if a new token cannot be fetched.
    pub async fn token(&self) -> Result<AccessToken> {
        let mut current = self.current.lock().await;
        if let Some(token) = current.as_ref().filter(|token| !token.is_expired()) {
            return Ok(token.clone());
        }

        let token = AccessToken::new(self.source.fetch_token().await?, self.lifetime);
        debug!(
            "provider token refreshed, valid for {}s",
            token.time_to_live().as_secs()
        );
        *current = Some(token.clone());
        Ok(token)
    }

    /// Forgets the current token, so the next call fetches a new one.
    pub async fn flush(&self) {
        *self.current.lock().await = None;
    }
}
