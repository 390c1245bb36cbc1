//! A listener's playback session.
//!
//! The [`Session`] owns the [`Player`] and decides what plays next: the next
//! track of the current source, the first track again when looping, or a
//! batch of recommendations once an ad-hoc queue has run dry. Around that
//! it keeps friends informed about what is playing, counts plays towards
//! the listening statistics and enriches tracks with genre and artist
//! pictures when they start.
//!
//! [`Session::run`] drives a session from a single task, selecting over
//! commands, controller reports, the tick timer and the sleep timer. Every
//! suspension point is a network round-trip or a timer; nothing else runs
//! concurrently with a command.
//!
//! # Example
//!
//! ```rust
//! let (commands, rx) = mpsc::channel(16);
//! let mut session = Session::new(&config, Box::new(Headless::new()), services);
//!
//! commands.send(Command::Play { track, source: Some(source) }).await?;
//! session.run(rx).await;
//! ```

use std::{sync::Arc, time::Duration};

use tokio::{
    sync::mpsc,
    time::{self, Instant},
};

use crate::{
    config::Config,
    controller::Controller,
    error::{Error, Result},
    events::Event,
    lyrics::{self, LyricsProvider},
    metadata::{self, Metadata},
    player::{Generation, Player, StampedUpdate, Tick},
    playlist::{Next, PlaylistSource},
    recommend::{self, Recommender, Seed},
    store::{ListeningStats, NowPlaying},
    track::Track,
};

/// Remote collaborators of a session.
#[derive(Clone)]
pub struct Services {
    pub recommender: Arc<dyn Recommender>,
    pub metadata: Arc<dyn Metadata>,
    pub lyrics: Arc<dyn LyricsProvider>,
    pub now_playing: Arc<dyn NowPlaying>,
    pub stats: Arc<dyn ListeningStats>,
}

/// Requests handled by [`Session::run`].
#[derive(Clone, Debug)]
pub enum Command {
    /// Play `track`, replacing the source unless `source` is `None`.
    Play {
        track: Track,
        source: Option<PlaylistSource>,
    },
    PlayIndex(usize),
    Next,
    Previous,
    Pause,
    Resume,
    Seek(Duration),
    SetLoop(bool),
    Enqueue(Track),
    /// Replace the upcoming tracks, as when a party changed.
    SetSource(PlaylistSource),
    /// Pause after the duration; `None` cancels the timer.
    SleepTimer(Option<Duration>),
    Stop,
}

enum Wakeup {
    Command(Option<Command>),
    Update(StampedUpdate),
    Tick(Generation),
    Sleep,
}

pub struct Session {
    player: Player,
    updates: mpsc::UnboundedReceiver<StampedUpdate>,
    username: Option<String>,
    services: Services,

    rewind_threshold: Duration,
    recommendation_limit: u8,
    stats_threshold: f64,

    next_tick: Option<(Generation, Instant)>,
    sleep_deadline: Option<Instant>,

    /// Last track played before the source ran out.
    finished: Option<Track>,
}

impl Session {
    #[must_use]
    pub fn new(config: &Config, controller: Box<dyn Controller>, services: Services) -> Self {
        let (updates_tx, updates) = mpsc::unbounded_channel();

        Self {
            player: Player::new(config, controller, updates_tx),
            updates,
            username: config.username.clone(),
            services,
            rewind_threshold: config.rewind_threshold,
            recommendation_limit: config.recommendation_limit,
            stats_threshold: config.stats_threshold,
            next_tick: None,
            sleep_deadline: None,
            finished: None,
        }
    }

    pub fn register_event_handler(&mut self, events: mpsc::UnboundedSender<Event>) {
        self.player.register_event_handler(events);
    }

    #[must_use]
    pub fn player(&self) -> &Player {
        &self.player
    }

    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    fn require_track(&self) -> Result<&Track> {
        self.player
            .track()
            .ok_or_else(|| Error::failed_precondition("no active track"))
    }

    fn schedule(&mut self, generation: Generation) {
        self.next_tick = Some((generation, Instant::now() + self.player.tick_period()));
    }

    /// Tells friends what is playing now, or that nothing is.
    async fn publish_now_playing(&mut self) {
        let Some(username) = self.username.clone() else {
            return;
        };

        let track = self.player.track().cloned();
        if let Err(e) = self
            .services
            .now_playing
            .set_listening_to(&username, track.as_ref())
            .await
        {
            warn!("failed to update what {username} is listening to: {e}");
        }
    }

    /// Stops playback and cancels both timers.
    async fn halt(&mut self) {
        self.next_tick = None;
        self.sleep_deadline = None;
        self.player.stop();
        self.publish_now_playing().await;
    }

    /// Plays `track`, replacing the source unless `source` is `None`.
    ///
    /// The previous track is stopped before genre and artist pictures are
    /// looked up, so a slow lookup never keeps it sounding.
    ///
    /// # Errors
    ///
    /// Returns an error if the track cannot be loaded. The session is idle
    /// afterwards.
    pub async fn play(&mut self, mut track: Track, source: Option<PlaylistSource>) -> Result<()> {
        self.finished = None;
        track.set_stats_updated(false);
        let mut enriched = track.clone();

        let generation = match self.player.play(track, source) {
            Ok(generation) => generation,
            Err(e) => {
                self.halt().await;
                return Err(e);
            }
        };
        self.schedule(generation);

        metadata::enrich(self.services.metadata.as_ref(), &mut enriched).await;
        if self.player.generation() == generation {
            if let Some(track) = self.player.track_mut() {
                track.genre = enriched.genre;
                track.artists = enriched.artists;
            }
        }

        self.publish_now_playing().await;
        Ok(())
    }

    /// Plays the track at `index` of the current source.
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` without a track at `index`.
    pub async fn play_index(&mut self, index: usize) -> Result<()> {
        let track = self
            .player
            .source()
            .and_then(|source| source.track(index))
            .cloned()
            .ok_or_else(|| Error::out_of_range(format!("no track at index {index}")))?;

        self.play(track, None).await
    }

    /// Moves on to whatever follows the current track.
    ///
    /// # Errors
    ///
    /// * `FailedPrecondition` without an active track
    /// * `Unavailable` if recommendations were needed but none came; the
    ///   session is idle afterwards
    pub async fn next(&mut self) -> Result<()> {
        let current = self.require_track()?.clone();
        let next = self.player.source().map_or(Next::Recommend, |source| {
            source.next(&current, self.player.can_loop())
        });

        match next {
            Next::Index(index) => self.play_index(index).await,
            Next::Recommend => self.recommend(&current).await,
            Next::Stop => {
                debug!("reached the end of the source");
                self.halt().await;
                self.finished = Some(current);
                Ok(())
            }
        }
    }

    async fn recommend(&mut self, current: &Track) -> Result<()> {
        let username = self.username.clone();
        if let Some(username) = username {
            if let Err(e) = self.services.now_playing.set_listening_to(&username, None).await {
                warn!("failed to clear what {username} is listening to: {e}");
            }
        }
        if let Some(track) = self.player.track_mut() {
            track.set_stats_updated(false);
        }

        let seed = Seed::from_track(current);
        let recommender = Arc::clone(&self.services.recommender);
        match recommend::fetch(recommender.as_ref(), &seed, self.recommendation_limit).await {
            Ok(tracks) => {
                let Some(first) = tracks.first().cloned() else {
                    self.halt().await;
                    return Err(Error::unavailable("recommendation unavailable"));
                };
                info!("playing {} recommendations after {current}", tracks.len());
                self.play(first, Some(PlaylistSource::Recommendation(tracks)))
                    .await
            }
            Err(e) => {
                self.halt().await;
                Err(e)
            }
        }
    }

    /// Goes back to the previous track, or to the start of this one.
    ///
    /// Uploads and previews always restart. Streamed tracks move to the
    /// previous track of the source when they have barely started.
    ///
    /// # Errors
    ///
    /// Returns `FailedPrecondition` without an active track.
    pub async fn previous(&mut self) -> Result<()> {
        let current = self.require_track()?.clone();

        if !current.is_locally_timed() && self.player.position() < self.rewind_threshold {
            if let Some(index) = self
                .player
                .source()
                .and_then(|source| source.previous(&current))
            {
                return self.play_index(index).await;
            }
        }

        self.restart()
    }

    fn restart(&mut self) -> Result<()> {
        self.player.restart()?;
        if self.player.is_playing() {
            self.schedule(self.player.generation());
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `FailedPrecondition` without an active track.
    pub fn pause(&mut self) -> Result<()> {
        self.player.pause()?;
        self.sleep_deadline = None;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `FailedPrecondition` without an active track.
    pub fn resume(&mut self) -> Result<()> {
        let generation = self.player.resume()?;
        self.schedule(generation);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `FailedPrecondition` without an active track.
    pub fn seek(&mut self, position: Duration) -> Result<()> {
        self.player.seek(position)
    }

    pub fn set_loop(&mut self, can_loop: bool) {
        self.player.set_loop(can_loop);
    }

    /// Queues `track` after the current source.
    pub fn enqueue(&mut self, track: Track) {
        self.player.enqueue(track);
    }

    /// Replaces the upcoming tracks without interrupting the current one.
    ///
    /// A session that went idle at the end of its source picks up again
    /// with the track that now follows the last one played.
    ///
    /// # Errors
    ///
    /// Returns an error if that track cannot be loaded.
    pub async fn set_source(&mut self, source: PlaylistSource) -> Result<()> {
        let follower = match (self.player.track(), &self.finished) {
            (None, Some(last)) => match source.next(last, false) {
                Next::Index(index) => source.track(index).cloned(),
                Next::Recommend | Next::Stop => None,
            },
            _ => None,
        };

        if let Some(track) = follower {
            info!("{source} has more tracks, continuing with {track}");
            return self.play(track, Some(source)).await;
        }

        self.player.set_source(source);
        Ok(())
    }

    /// Stops playback.
    pub async fn stop(&mut self) {
        self.finished = None;
        self.halt().await;
    }

    /// Pauses playback after `duration`, or cancels the timer.
    ///
    /// # Errors
    ///
    /// Returns `FailedPrecondition` when setting a timer while nothing is
    /// playing.
    pub fn set_sleep_timer(&mut self, duration: Option<Duration>) -> Result<()> {
        match duration {
            Some(duration) => {
                if !self.player.is_playing() {
                    return Err(Error::failed_precondition(
                        "sleep timer needs something playing",
                    ));
                }
                debug!("pausing in {}s", duration.as_secs());
                self.sleep_deadline = Some(Instant::now() + duration);
            }
            None => self.sleep_deadline = None,
        }
        Ok(())
    }

    /// Lyrics of the current track, or a placeholder.
    ///
    /// # Errors
    ///
    /// Returns `FailedPrecondition` without an active track.
    pub async fn lyrics(&mut self) -> Result<String> {
        let track = self.require_track()?.clone();
        Ok(lyrics::lyrics_or_placeholder(self.services.lyrics.as_ref(), &track).await)
    }

    /// Counts the current streamed track once it played long enough.
    async fn update_stats(&mut self) {
        let Some(username) = self.username.clone() else {
            return;
        };

        let duration = self.player.duration();
        let Some(track) = self.player.track() else {
            return;
        };
        if track.is_locally_timed() || track.stats_updated() || duration.is_zero() {
            return;
        }

        let progress = self.player.position().as_secs_f64() / duration.as_secs_f64();
        if progress <= self.stats_threshold {
            return;
        }

        // Mark first: a failure is not retried for this play.
        let Some(track) = self.player.track_mut() else {
            return;
        };
        track.set_stats_updated(true);
        let track = track.clone();

        if let Err(e) = self.services.stats.record_play(&username, &track).await {
            warn!("failed to record play of {track}: {e}");
        }
    }

    async fn on_tick(&mut self, generation: Generation) {
        match self.player.tick(generation) {
            Tick::Advanced(_) => {
                self.schedule(generation);
                self.update_stats().await;
            }
            Tick::Ended => {
                self.next_tick = None;
                self.advance().await;
            }
            Tick::Stale => trace!("ignoring stale tick {generation}"),
            Tick::Inactive => self.next_tick = None,
        }
    }

    async fn on_update(&mut self, stamped: StampedUpdate) {
        if self.player.track().is_some_and(Track::is_locally_timed) {
            return;
        }

        match self.player.sync(stamped) {
            Tick::Advanced(_) => {
                if self.player.is_playing() && self.next_tick.is_none() {
                    self.schedule(self.player.generation());
                }
                self.update_stats().await;
            }
            Tick::Ended => {
                self.next_tick = None;
                self.advance().await;
            }
            Tick::Stale | Tick::Inactive => {}
        }
    }

    async fn on_sleep(&mut self) {
        self.sleep_deadline = None;
        match self.player.pause() {
            Ok(()) => info!("sleep timer paused playback"),
            Err(e) => debug!("sleep timer: {e}"),
        }
    }

    /// Plays whatever follows a finished track, going idle on failure.
    async fn advance(&mut self) {
        if let Err(e) = self.next().await {
            warn!("playback stopped: {e}");
        }
    }

    async fn execute(&mut self, command: Command) -> Result<()> {
        trace!("command: {command:?}");
        match command {
            Command::Play { track, source } => self.play(track, source).await,
            Command::PlayIndex(index) => self.play_index(index).await,
            Command::Next => self.next().await,
            Command::Previous => self.previous().await,
            Command::Pause => self.pause(),
            Command::Resume => self.resume(),
            Command::Seek(position) => self.seek(position),
            Command::SetLoop(can_loop) => {
                self.set_loop(can_loop);
                Ok(())
            }
            Command::Enqueue(track) => {
                self.enqueue(track);
                Ok(())
            }
            Command::SetSource(source) => self.set_source(source).await,
            Command::SleepTimer(duration) => self.set_sleep_timer(duration),
            Command::Stop => {
                self.stop().await;
                Ok(())
            }
        }
    }

    async fn wait(&mut self, commands: &mut mpsc::Receiver<Command>) -> Wakeup {
        let now = Instant::now();
        let ticking = self.next_tick.is_some();
        let (generation, tick_at) = self.next_tick.unwrap_or((self.player.generation(), now));
        let sleeping = self.sleep_deadline.is_some();
        let sleep_at = self.sleep_deadline.unwrap_or(now);

        tokio::select! {
            biased;

            command = commands.recv() => Wakeup::Command(command),
            Some(update) = self.updates.recv() => Wakeup::Update(update),
            () = time::sleep_until(tick_at), if ticking => Wakeup::Tick(generation),
            () = time::sleep_until(sleep_at), if sleeping => Wakeup::Sleep,
        }
    }

    /// Runs the session until `commands` is closed, then stops playback.
    ///
    /// Failing commands are logged and do not end the loop.
    pub async fn run(&mut self, mut commands: mpsc::Receiver<Command>) {
        loop {
            match self.wait(&mut commands).await {
                Wakeup::Command(Some(command)) => {
                    if let Err(e) = self.execute(command).await {
                        warn!("{e}");
                    }
                }
                Wakeup::Command(None) => break,
                Wakeup::Update(update) => self.on_update(update).await,
                Wakeup::Tick(generation) => self.on_tick(generation).await,
                Wakeup::Sleep => self.on_sleep().await,
            }
        }

        debug!("session closed");
        self.halt().await;
    }
}
