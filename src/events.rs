//! Events emitted by a playback session.
//!
//! A user interface subscribes to these to redraw controls without polling
//! the session. They carry no payload: on receipt, query the session for
//! its current state.
//!
//! # Example
//!
//! ```rust
//! use tunehouse::events::Event;
//!
//! fn label(event: Event) -> &'static str {
//!     match event {
//!         Event::Play => "playing",
//!         Event::Pause => "paused",
//!         Event::Idle => "nothing playing",
//!         _ => "",
//!     }
//! }
//! ```

/// Significant state changes of a playback session.
///
/// Playback events:
/// * [`Play`](Self::Play) and [`Pause`](Self::Pause)
/// * [`TrackChanged`](Self::TrackChanged)
/// * [`Progress`](Self::Progress)
/// * [`Idle`](Self::Idle)
///
/// Source events:
/// * [`QueueChanged`](Self::QueueChanged)
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Event {
    /// Playback has started or resumed.
    Play,

    /// Playback has paused and can be resumed from the current position.
    Pause,

    /// A different track became current, whether picked by the listener,
    /// advanced to at the end of the previous one, or recommended.
    TrackChanged,

    /// The playback position moved, by a tick, a seek or a report from the
    /// streaming provider.
    Progress,

    /// Nothing is playing anymore: the source ran out or playback failed.
    Idle,

    /// The list of upcoming tracks changed.
    QueueChanged,
}
