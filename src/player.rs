//! Playback state machine.
//!
//! ```text
//! Idle ──play──▶ Loading ──▶ Playing ⇄ Paused
//!                               │
//!                             tick
//!                               ▼
//!                             Ended ──▶ Loading (next track)
//!                                   └─▶ Idle    (nothing left)
//! ```
//!
//! The [`Player`] owns the audio [`Controller`] and is the only one to talk
//! to it. It is synchronous: deciding *what* plays next needs the network
//! and lives in [`Session`](crate::session::Session).
//!
//! # Ticks
//!
//! Progress advances by one tick period per [`Player::tick`]. Every tick is
//! tagged with the [`Generation`] it was scheduled for, and every call to
//! [`Player::play`] starts a new generation. Ticks and controller reports
//! from an earlier generation are recognized and dropped, so a track switch
//! can never be advanced by its predecessor's timer.

use std::{fmt, time::Duration};

use tokio::sync::mpsc;

use crate::{
    config::Config,
    controller::{Controller, ListenerId, Medium, PlaybackUpdate},
    error::{Error, Result},
    events::Event,
    playlist::PlaylistSource,
    track::Track,
};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum State {
    #[default]
    Idle,
    Loading,
    Playing,
    Paused,
    Ended,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Playing => "playing",
            Self::Paused => "paused",
            Self::Ended => "ended",
        };
        write!(f, "{state}")
    }
}

/// Identifies one run of [`Player::play`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Controller report, stamped with the generation it belongs to.
pub type StampedUpdate = (Generation, PlaybackUpdate);

/// Outcome of [`Player::tick`] and [`Player::sync`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Tick {
    /// Position moved to the contained value.
    Advanced(Duration),
    /// The track reached its end; resolve what comes next.
    Ended,
    /// Scheduled for a previous track; ignored.
    Stale,
    /// Not playing; do not reschedule.
    Inactive,
}

pub struct Player {
    controller: Box<dyn Controller>,
    updates: mpsc::UnboundedSender<StampedUpdate>,
    events: Option<mpsc::UnboundedSender<Event>>,

    state: State,
    track: Option<Track>,
    source: Option<PlaylistSource>,
    position: Duration,
    duration: Duration,
    can_loop: bool,

    generation: Generation,
    listener: Option<ListenerId>,

    tick_period: Duration,
    preview_length: Duration,
}

impl Player {
    /// Creates an idle player.
    ///
    /// Controller reports are forwarded to `updates`, stamped with the
    /// generation that was current when the listener was registered.
    #[must_use]
    pub fn new(
        config: &Config,
        controller: Box<dyn Controller>,
        updates: mpsc::UnboundedSender<StampedUpdate>,
    ) -> Self {
        Self {
            controller,
            updates,
            events: None,
            state: State::Idle,
            track: None,
            source: None,
            position: Duration::ZERO,
            duration: Duration::ZERO,
            can_loop: false,
            generation: Generation::default(),
            listener: None,
            tick_period: config.tick_period,
            preview_length: config.preview_length,
        }
    }

    pub fn register_event_handler(&mut self, events: mpsc::UnboundedSender<Event>) {
        self.events = Some(events);
    }

    fn notify(&self, event: Event) {
        if let Some(events) = &self.events {
            // A closed receiver only means nobody is listening anymore.
            let _ = events.send(event);
        }
    }

    /// Silences the current track and invalidates its ticks and listener.
    fn stop_audio(&mut self) {
        self.generation = Generation(self.generation.0.wrapping_add(1));

        if self.track.is_some() {
            if let Err(e) = self.controller.pause() {
                trace!("pausing before switching tracks: {e}");
            }
        }

        if let Some(id) = self.listener.take() {
            if !self.controller.remove_listener(id) {
                warn!("playback listener {id:?} was already gone");
            }
        }

        self.controller.release();
    }

    /// Makes `track` current and starts playing it from the start.
    ///
    /// Replaces the source unless `source` is `None`, in which case the
    /// current source is kept. Returns the generation that ticks for this
    /// track must be tagged with.
    ///
    /// # Errors
    ///
    /// Returns an error if the controller cannot load or start the track.
    /// The player is idle afterwards.
    pub fn play(&mut self, track: Track, source: Option<PlaylistSource>) -> Result<Generation> {
        self.stop_audio();

        self.state = State::Loading;
        self.position = Duration::ZERO;
        self.duration = track.duration_with_preview(self.preview_length);
        if let Some(source) = source {
            self.source = Some(source);
        }

        if let Err(e) = self.start(&track) {
            self.stop();
            return Err(e);
        }

        debug!(
            "playing {track} for {:.1}s from {}",
            self.duration.as_secs_f32(),
            self.source
                .as_ref()
                .map_or_else(|| "no source".to_owned(), ToString::to_string),
        );

        self.track = Some(track);
        self.state = State::Playing;
        self.notify(Event::TrackChanged);
        self.notify(Event::Play);

        Ok(self.generation)
    }

    fn start(&mut self, track: &Track) -> Result<()> {
        let medium = Medium::for_track(track)?;
        self.controller.load(&medium)?;

        let updates = self.updates.clone();
        let generation = self.generation;
        let id = self.controller.add_listener(Box::new(move |update| {
            let _ = updates.send((generation, update));
        }));
        self.listener = Some(id);

        self.controller.play()
    }

    /// Stops playback and forgets the current track and source.
    pub fn stop(&mut self) {
        self.stop_audio();

        let was_idle = self.state == State::Idle;
        self.state = State::Idle;
        self.track = None;
        self.source = None;
        self.position = Duration::ZERO;
        self.duration = Duration::ZERO;

        if !was_idle {
            debug!("player is idle");
            self.notify(Event::Idle);
        }
    }

    fn require_track(&self) -> Result<&Track> {
        self.track
            .as_ref()
            .ok_or_else(|| Error::failed_precondition("no active track"))
    }

    /// # Errors
    ///
    /// Returns `FailedPrecondition` without an active track.
    pub fn pause(&mut self) -> Result<()> {
        self.require_track()?;

        if self.state == State::Playing {
            self.controller.pause()?;
            self.state = State::Paused;
            self.notify(Event::Pause);
        }

        Ok(())
    }

    /// Resumes a paused track and returns the generation to tick with.
    ///
    /// # Errors
    ///
    /// Returns `FailedPrecondition` without an active track.
    pub fn resume(&mut self) -> Result<Generation> {
        self.require_track()?;

        if self.state == State::Paused {
            self.controller.resume()?;
            self.state = State::Playing;
            self.notify(Event::Play);
        }

        Ok(self.generation)
    }

    /// Moves to `position`, clamped to the track's effective duration.
    ///
    /// # Errors
    ///
    /// Returns `FailedPrecondition` without an active track.
    pub fn seek(&mut self, position: Duration) -> Result<()> {
        self.require_track()?;

        let position = position.min(self.duration);
        self.controller.seek(position)?;
        self.position = position;
        self.notify(Event::Progress);

        Ok(())
    }

    /// Starts the current track over without changing which track it is.
    ///
    /// A paused track stays paused at the start.
    ///
    /// # Errors
    ///
    /// Returns `FailedPrecondition` without an active track.
    pub fn restart(&mut self) -> Result<()> {
        self.require_track()?;

        match self.state {
            State::Paused => self.controller.seek(Duration::ZERO)?,
            _ => {
                self.controller.play_from_start()?;
                self.state = State::Playing;
            }
        }
        self.position = Duration::ZERO;
        self.notify(Event::Progress);

        Ok(())
    }

    /// Advances playback by one tick period.
    ///
    /// Reaching the effective duration is reported by the *following* tick,
    /// so the last partial period still gets played.
    pub fn tick(&mut self, generation: Generation) -> Tick {
        if generation != self.generation {
            trace!("dropping tick {generation}, current is {}", self.generation);
            return Tick::Stale;
        }

        if self.state != State::Playing {
            return Tick::Inactive;
        }

        if self.position >= self.duration {
            return self.end();
        }

        self.position = (self.position + self.tick_period).min(self.duration);
        self.notify(Event::Progress);
        Tick::Advanced(self.position)
    }

    /// Applies a report from the controller.
    pub fn sync(&mut self, (generation, update): StampedUpdate) -> Tick {
        if generation != self.generation || self.track.is_none() {
            return Tick::Stale;
        }

        match (self.state, update.is_paused) {
            (State::Playing, true) => {
                self.state = State::Paused;
                self.notify(Event::Pause);
            }
            (State::Paused, false) => {
                self.state = State::Playing;
                self.notify(Event::Play);
            }
            _ => {}
        }

        if !matches!(self.state, State::Playing | State::Paused) {
            return Tick::Inactive;
        }

        self.position = update.position.min(self.duration);
        self.notify(Event::Progress);

        if self.position >= self.duration && !update.is_paused {
            return self.end();
        }

        Tick::Advanced(self.position)
    }

    fn end(&mut self) -> Tick {
        debug!(
            "{} ended",
            self.track
                .as_ref()
                .map_or_else(|| "track".to_owned(), ToString::to_string)
        );
        self.state = State::Ended;
        Tick::Ended
    }

    /// Appends `track` to the upcoming tracks, turning the source into an
    /// ad-hoc queue.
    pub fn enqueue(&mut self, track: Track) {
        debug!("queueing {track}");
        self.source = Some(match self.source.take() {
            Some(source) => source.enqueue(track),
            None => PlaylistSource::AdHocQueue(vec![track]),
        });
        self.notify(Event::QueueChanged);
    }

    /// Replaces the upcoming tracks without interrupting the current one.
    pub fn set_source(&mut self, source: PlaylistSource) {
        debug!("source is now {source}");
        self.source = Some(source);
        self.notify(Event::QueueChanged);
    }

    pub fn set_loop(&mut self, can_loop: bool) {
        self.can_loop = can_loop;
    }

    #[must_use]
    pub fn can_loop(&self) -> bool {
        self.can_loop
    }

    #[must_use]
    pub fn state(&self) -> State {
        self.state
    }

    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.state == State::Playing
    }

    #[must_use]
    pub fn track(&self) -> Option<&Track> {
        self.track.as_ref()
    }

    /// The current track, for updating its runtime flags and metadata.
    pub fn track_mut(&mut self) -> Option<&mut Track> {
        self.track.as_mut()
    }

    #[must_use]
    pub fn source(&self) -> Option<&PlaylistSource> {
        self.source.as_ref()
    }

    #[must_use]
    pub fn position(&self) -> Duration {
        self.position
    }

    /// Effective duration of the current track.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.duration
    }

    #[must_use]
    pub fn generation(&self) -> Generation {
        self.generation
    }

    #[must_use]
    pub fn tick_period(&self) -> Duration {
        self.tick_period
    }

    /// Number of listeners registered with the controller.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.controller.listener_count()
    }
}

impl fmt::Debug for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Player")
            .field("state", &self.state)
            .field("track", &self.track.as_ref().map(|track| &track.uri))
            .field("position", &self.position)
            .field("duration", &self.duration)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        controller::Headless,
        error::ErrorKind,
        track::tests::{local, streamed},
    };

    fn player() -> (Player, mpsc::UnboundedReceiver<StampedUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let player = Player::new(&Config::default(), Box::new(Headless::new()), tx);
        (player, rx)
    }

    #[test]
    fn ticks_never_overshoot_the_duration() {
        let (mut player, _updates) = player();
        // 1200 ms is not a multiple of the 500 ms period.
        let generation = player.play(local("uploads/a.mp3", 1200), None).unwrap();

        let ticks = 1200_u64.div_ceil(500);
        for _ in 0..ticks {
            match player.tick(generation) {
                Tick::Advanced(position) => {
                    assert!(position <= Duration::from_millis(1200));
                }
                other => panic!("unexpected {other:?}"),
            }
        }

        assert_eq!(player.position(), Duration::from_millis(1200));
        assert_eq!(player.tick(generation), Tick::Ended);
        assert_eq!(player.state(), State::Ended);
    }

    #[test]
    fn dj_tracks_end_after_the_preview() {
        let (mut player, _updates) = player();
        let mut track = streamed("spotify:track:a", 215_000);
        track.dj = true;

        let generation = player.play(track, None).unwrap();
        assert_eq!(player.duration(), Duration::from_secs(30));

        let mut ticks = 0;
        while player.tick(generation) != Tick::Ended {
            ticks += 1;
        }
        assert_eq!(ticks, 60);
    }

    #[test]
    fn ticks_of_a_previous_track_are_stale() {
        let (mut player, _updates) = player();
        let first = player.play(local("uploads/a.mp3", 5000), None).unwrap();
        let second = player.play(local("uploads/b.mp3", 5000), None).unwrap();

        assert_ne!(first, second);
        assert_eq!(player.tick(first), Tick::Stale);
        assert_eq!(player.position(), Duration::ZERO);
        assert_eq!(
            player.tick(second),
            Tick::Advanced(Duration::from_millis(500))
        );
    }

    #[test]
    fn exactly_one_listener_after_many_plays() {
        let (mut player, _updates) = player();
        for i in 0..5 {
            player
                .play(streamed(&format!("spotify:track:{i}"), 1000), None)
                .unwrap();
            assert_eq!(player.listener_count(), 1);
        }

        player.stop();
        assert_eq!(player.listener_count(), 0);
    }

    #[test]
    fn pause_and_resume_without_track_fail() {
        let (mut player, _updates) = player();

        assert!(player.pause().unwrap_err().is(ErrorKind::FailedPrecondition));
        assert!(player.resume().unwrap_err().is(ErrorKind::FailedPrecondition));
        assert!(player.seek(Duration::ZERO).is_err());
    }

    #[test]
    fn paused_player_does_not_tick() {
        let (mut player, _updates) = player();
        let generation = player.play(local("uploads/a.mp3", 5000), None).unwrap();

        player.pause().unwrap();
        assert_eq!(player.state(), State::Paused);
        assert_eq!(player.tick(generation), Tick::Inactive);

        assert_eq!(player.resume().unwrap(), generation);
        assert!(matches!(player.tick(generation), Tick::Advanced(_)));
    }

    #[test]
    fn seek_is_clamped() {
        let (mut player, _updates) = player();
        player.play(local("uploads/a.mp3", 5000), None).unwrap();

        player.seek(Duration::from_secs(60)).unwrap();
        assert_eq!(player.position(), Duration::from_secs(5));
    }

    #[test]
    fn failed_load_leaves_player_idle() {
        let (mut player, _updates) = player();
        let mut track = streamed("spotify:track:a", 1000);
        track.dj = true;
        track.preview_url = None;

        assert!(player.play(track, None).is_err());
        assert_eq!(player.state(), State::Idle);
        assert!(player.track().is_none());
        assert_eq!(player.listener_count(), 0);
    }

    #[test]
    fn controller_reports_are_stamped() {
        let (mut player, mut updates) = player();
        let old = player.play(streamed("spotify:track:a", 4000), None).unwrap();
        let current = player.play(streamed("spotify:track:b", 4000), None).unwrap();

        // Drain the reports of both plays: only the current one applies.
        let mut applied = 0;
        while let Ok(stamped) = updates.try_recv() {
            if player.sync(stamped) != Tick::Stale {
                applied += 1;
            }
        }
        assert_eq!(applied, 1);

        let paused = PlaybackUpdate {
            is_paused: true,
            position: Duration::from_secs(2),
        };
        assert_eq!(player.sync((old, paused)), Tick::Stale);
        assert_eq!(
            player.sync((current, paused)),
            Tick::Advanced(Duration::from_secs(2))
        );
        assert_eq!(player.state(), State::Paused);

        let done = PlaybackUpdate {
            is_paused: false,
            position: Duration::from_secs(5),
        };
        assert_eq!(player.sync((current, done)), Tick::Ended);
    }

    #[test]
    fn enqueue_builds_an_adhoc_queue() {
        let (mut player, _updates) = player();
        player.enqueue(streamed("spotify:track:a", 1000));
        player.enqueue(streamed("spotify:track:b", 1000));

        let source = player.source().unwrap();
        assert!(source.is_queue());
        assert_eq!(source.len(), 2);
        assert_eq!(player.state(), State::Idle);
    }

    #[test]
    fn restart_keeps_the_track() {
        let (mut player, _updates) = player();
        let generation = player.play(local("uploads/a.mp3", 5000), None).unwrap();
        player.tick(generation);
        player.tick(generation);

        player.restart().unwrap();
        assert_eq!(player.position(), Duration::ZERO);
        assert_eq!(player.generation(), generation);
        assert_eq!(player.track().unwrap().uri, "uploads/a.mp3");
    }
}
