//! Wire types of the remote services.
//!
//! * [`backend`]: the REST API that stores songs, playlists, users and
//!   parties
//! * [`provider`]: the streaming provider's Web API and the genre lookup
//!
//! Both speak JSON. Responses are decoded with [`json`], which logs what
//! arrived so that protocol drift shows up in the trace log.

pub mod backend;
pub mod provider;

use std::fmt::Debug;

use serde::de::DeserializeOwned;

use crate::error::Result;

/// Parses a JSON response body, logging it as `origin`.
///
/// A body that is valid JSON but does not match `T` is traced as a generic
/// value; a body that is not JSON at all is logged as an error.
///
/// # Errors
///
/// Returns an error if `body` does not decode into `T`.
pub fn json<T>(body: &str, origin: &str) -> Result<T>
where
    T: DeserializeOwned + Debug,
{
    match serde_json::from_str(body) {
        Ok(result) => {
            trace!("{origin}: {result:#?}");
            Ok(result)
        }
        Err(e) => {
            if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
                trace!("{origin}: unexpected {json:#?}");
            } else {
                error!("{origin}: failed parsing response ({e})");
                trace!("{body}");
            }
            Err(e.into())
        }
    }
}
