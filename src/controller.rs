//! Audio controllers.
//!
//! The [`Player`](crate::player::Player) does not produce sound itself. It
//! drives a [`Controller`]: the streaming provider's embedded player for
//! streamed tracks, or a plain audio element for uploads and previews.
//! Controllers report state changes to registered listeners as
//! [`PlaybackUpdate`]s.
//!
//! Listeners are not replaced implicitly. Whoever registers one owns its
//! [`ListenerId`] and must remove it again, or updates will be delivered
//! twice.

use std::{collections::BTreeMap, fmt, time::Duration};

use tokio::time::Instant;

use crate::{
    error::{Error, Result},
    track::Track,
};

/// What a controller is asked to load.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Medium {
    /// Full track streamed by the provider, by URI.
    Stream(String),
    /// Uploaded audio file served by the backend.
    File(String),
    /// 30-second preview clip.
    Preview(String),
}

impl Medium {
    /// Picks the medium to play `track` from.
    ///
    /// # Errors
    ///
    /// Returns `FailedPrecondition` for a DJ track without a preview.
    pub fn for_track(track: &Track) -> Result<Self> {
        if track.is_local {
            return Ok(Self::File(track.uri.clone()));
        }

        if track.dj {
            return match track.preview_url.as_deref() {
                Some(url) if track.has_preview() => Ok(Self::Preview(url.to_owned())),
                _ => Err(Error::failed_precondition(format!(
                    "{track} has no preview"
                ))),
            };
        }

        Ok(Self::Stream(track.uri.clone()))
    }

    #[must_use]
    pub fn location(&self) -> &str {
        match self {
            Self::Stream(location) | Self::File(location) | Self::Preview(location) => location,
        }
    }
}

impl fmt::Display for Medium {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stream(uri) => write!(f, "stream {uri}"),
            Self::File(path) => write!(f, "file {path}"),
            Self::Preview(url) => write!(f, "preview {url}"),
        }
    }
}

/// State reported by a controller.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct PlaybackUpdate {
    pub is_paused: bool,
    pub position: Duration,
}

pub type Listener = Box<dyn Fn(PlaybackUpdate) + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

/// Contract of an audio controller.
pub trait Controller: Send {
    /// Loads a medium without starting it.
    ///
    /// # Errors
    ///
    /// Returns an error if the medium cannot be loaded.
    fn load(&mut self, medium: &Medium) -> Result<()>;

    /// Starts the loaded medium.
    ///
    /// # Errors
    ///
    /// Returns `FailedPrecondition` if nothing is loaded.
    fn play(&mut self) -> Result<()>;

    /// # Errors
    ///
    /// Returns `FailedPrecondition` if nothing is loaded.
    fn pause(&mut self) -> Result<()>;

    /// # Errors
    ///
    /// Returns `FailedPrecondition` if nothing is loaded.
    fn resume(&mut self) -> Result<()>;

    /// # Errors
    ///
    /// Returns `FailedPrecondition` if nothing is loaded.
    fn seek(&mut self, position: Duration) -> Result<()>;

    /// Seeks to the start and plays.
    ///
    /// # Errors
    ///
    /// Returns `FailedPrecondition` if nothing is loaded.
    fn play_from_start(&mut self) -> Result<()>;

    /// Stops and unloads the current medium.
    fn release(&mut self);

    fn add_listener(&mut self, listener: Listener) -> ListenerId;

    /// Returns whether the listener was registered.
    fn remove_listener(&mut self, id: ListenerId) -> bool;

    fn listener_count(&self) -> usize;
}

/// Registered listeners, for controllers to build on.
#[derive(Default)]
pub struct Listeners {
    next_id: u64,
    listeners: BTreeMap<ListenerId, Listener>,
}

impl Listeners {
    pub fn add(&mut self, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.listeners.insert(id, listener);
        id
    }

    pub fn remove(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(&id).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn notify(&self, update: PlaybackUpdate) {
        for listener in self.listeners.values() {
            listener(update);
        }
    }
}

impl fmt::Debug for Listeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("count", &self.listeners.len())
            .finish()
    }
}

/// Controller without audio output.
///
/// Keeps track of what would be playing, and for how long, and reports every
/// state change to its listeners like the provider's embedded player does.
/// Used by the headless binary and as a stand-in wherever no audio device is
/// present.
#[derive(Debug, Default)]
pub struct Headless {
    medium: Option<Medium>,
    /// Position when playback last started, paused or seeked.
    offset: Duration,
    playing_since: Option<Instant>,
    listeners: Listeners,
}

impl Headless {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn medium(&self) -> Option<&Medium> {
        self.medium.as_ref()
    }

    fn loaded(&self) -> Result<()> {
        if self.medium.is_none() {
            return Err(Error::failed_precondition("no medium loaded"));
        }
        Ok(())
    }

    #[must_use]
    pub fn position(&self) -> Duration {
        self.playing_since
            .map_or(self.offset, |since| self.offset + since.elapsed())
    }

    fn report(&self) {
        self.listeners.notify(PlaybackUpdate {
            is_paused: self.playing_since.is_none(),
            position: self.position(),
        });
    }
}

impl Controller for Headless {
    fn load(&mut self, medium: &Medium) -> Result<()> {
        debug!("loading {medium}");
        self.medium = Some(medium.clone());
        self.offset = Duration::ZERO;
        self.playing_since = None;
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        self.loaded()?;
        if self.playing_since.is_none() {
            self.playing_since = Some(Instant::now());
        }
        self.report();
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.loaded()?;
        self.offset = self.position();
        self.playing_since = None;
        self.report();
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        self.play()
    }

    fn seek(&mut self, position: Duration) -> Result<()> {
        self.loaded()?;
        self.offset = position;
        if self.playing_since.is_some() {
            self.playing_since = Some(Instant::now());
        }
        self.report();
        Ok(())
    }

    fn play_from_start(&mut self) -> Result<()> {
        self.loaded()?;
        self.offset = Duration::ZERO;
        self.playing_since = Some(Instant::now());
        self.report();
        Ok(())
    }

    fn release(&mut self) {
        if let Some(medium) = self.medium.take() {
            trace!("released {medium}");
        }
        self.offset = Duration::ZERO;
        self.playing_since = None;
    }

    fn add_listener(&mut self, listener: Listener) -> ListenerId {
        self.listeners.add(listener)
    }

    fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}
