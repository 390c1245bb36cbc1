//! Party listening engine of a social music streaming service.
//!
//! A [`Session`](session::Session) plays tracks for one listener: uploads
//! from the service's own collection and tracks streamed from a
//! Spotify-compatible provider. It walks stored playlists, parties, ad-hoc
//! queues and, when those run dry, recommendations. Friends can start a
//! [`Party`](party::Party) together, in which the host controls playback
//! and everyone may add songs.
//!
//! Persistence lives behind the traits in [`store`]: the
//! [`Gateway`](gateway::Gateway) implements them over the backend's REST
//! API, [`MemoryStore`](store::MemoryStore) in process.
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

#[macro_use]
extern crate log;

pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod gateway;
pub mod http;
pub mod library;
pub mod lyrics;
pub mod metadata;
pub mod party;
pub mod player;
pub mod playlist;
pub mod protocol;
pub mod provider;
pub mod recommend;
pub mod session;
pub mod signal;
pub mod store;
pub mod tokens;
pub mod track;
