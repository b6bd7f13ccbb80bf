//! Events the player core pushes to whatever surface is rendering it.
//!
//! Carried on a crossbeam channel so async tasks can send without blocking;
//! the UI side drains at its own pace.

/// Notifications from the progress listener, orchestrator and transport.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    /// Overall generation completion changed (0–100).
    OverallProgress { percent: f64 },
    /// One segment's generation completion changed.
    SegmentProgress { segment_id: i64, percent: f64 },
    /// The incrementally-revealed narration title changed.
    TitleChanged { title: String },
    /// The artifact reached `done`; final data is ready to fetch.
    ///
    /// Fired exactly once per artifact lifecycle, after the settle delay.
    GenerationDone,
    /// The artifact reached a terminal failure; no audio will arrive.
    GenerationFailed { message: String },
    /// The push stream dropped; a one-shot status poll takes over.
    StreamInterrupted { message: String },
    /// Playhead crossed into a different segment.
    SegmentChanged { index: usize },
    /// Media failed to start or seek; play state is unchanged.
    PlaybackError { message: String },
}
