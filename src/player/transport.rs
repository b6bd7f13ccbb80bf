//! Playback state machine.
//!
//! Owns the single media backend exclusively: every play/pause/seek in the
//! program goes through here, so the reported snapshot can only diverge from
//! the actual media state inside the optimistic-seek window that keeps a
//! drag gesture responsive.
//!
//! Two time fields, deliberately: `displayed_time` follows user input
//! immediately (every drag move), `committed_time` tracks what was last
//! applied to the backend. Media callbacks update both; a drag updates only
//! the displayed value until release.

use crate::api::types::ArtifactStatus;
use crate::error::{LisnError, Result};
use crate::player::backend::MediaBackend;
use crate::player::events::PlayerEvent;
use crate::player::timeline::{self, SegmentTiming};
use crate::player::Segment;
use crossbeam_channel::Sender;

/// Lifecycle of the loaded resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// No resource attached.
    Empty,
    /// Resource attached, metadata not yet available.
    Loading,
    /// Playable and paused.
    Ready,
    Playing,
    /// Terminal position reached; next interaction resumes from zero.
    Ended,
}

/// Snapshot of the transport for rendering. Derived, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackState {
    pub state: TransportState,
    pub displayed_time: f64,
    pub committed_time: f64,
    pub total_duration: f64,
    pub is_playing: bool,
    pub current_segment: Option<usize>,
    pub is_dragging: bool,
}

pub struct Transport {
    backend: Box<dyn MediaBackend>,
    state: TransportState,
    artifact_status: ArtifactStatus,
    segments: Vec<Segment>,
    timings: Vec<SegmentTiming>,
    displayed_time: f64,
    committed_time: f64,
    total_duration: f64,
    current_segment: Option<usize>,
    dragging: bool,
    saved_position: Option<f64>,
    autoplay: bool,
    event_tx: Option<Sender<PlayerEvent>>,
}

impl Transport {
    pub fn new(backend: Box<dyn MediaBackend>) -> Self {
        Self {
            backend,
            state: TransportState::Empty,
            artifact_status: ArtifactStatus::Queued,
            segments: Vec::new(),
            timings: Vec::new(),
            displayed_time: 0.0,
            committed_time: 0.0,
            total_duration: 0.0,
            current_segment: None,
            dragging: false,
            saved_position: None,
            autoplay: false,
            event_tx: None,
        }
    }

    /// Start playback automatically once metadata arrives.
    pub fn with_autoplay(mut self, autoplay: bool) -> Self {
        self.autoplay = autoplay;
        self
    }

    /// Attach an event sender for segment-change and playback-error
    /// notifications.
    pub fn with_event_sender(mut self, event_tx: Sender<PlayerEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == TransportState::Playing
    }

    pub fn timings(&self) -> &[SegmentTiming] {
        &self.timings
    }

    pub fn snapshot(&self) -> PlaybackState {
        PlaybackState {
            state: self.state,
            displayed_time: self.displayed_time,
            committed_time: self.committed_time,
            total_duration: self.total_duration,
            is_playing: self.is_playing(),
            current_segment: self.current_segment,
            is_dragging: self.dragging,
        }
    }

    /// Replace the segment list and artifact status.
    ///
    /// Timings are recomputed from scratch, never carried over from a
    /// previous list. While the artifact is still in flight the durations
    /// are absent, so every window is zero-length and no segment lookup can
    /// succeed.
    pub fn set_segments(&mut self, segments: Vec<Segment>, status: ArtifactStatus) {
        self.segments = segments;
        self.artifact_status = status;
        self.timings = timeline::segment_timings(&self.segments);
        self.refresh_current_segment();
    }

    /// Attach a playable resource. Valid only with nothing loaded.
    ///
    /// Moves to `Loading`; the transition to `Ready` happens when metadata
    /// arrives via [`Self::on_metadata`] or [`Self::poll`].
    pub fn load(&mut self, source: &str) -> Result<()> {
        if self.state != TransportState::Empty {
            return Err(LisnError::Playback {
                message: "a resource is already loaded".to_string(),
            });
        }
        self.backend.load(source)?;
        self.state = TransportState::Loading;
        if let Some(duration) = self.backend.duration() {
            self.on_metadata(duration);
        }
        Ok(())
    }

    /// Media metadata became available.
    ///
    /// Captures the total duration, restores a saved playhead position if
    /// one exists, and starts playback when autoplay is on.
    pub fn on_metadata(&mut self, duration: f64) {
        if self.state != TransportState::Loading {
            return;
        }
        self.total_duration = if duration.is_finite() { duration.max(0.0) } else { 0.0 };
        self.state = TransportState::Ready;

        if let Some(position) = self.saved_position.take() {
            let target = position.clamp(0.0, self.total_duration);
            self.displayed_time = target;
            self.commit_seek(target);
        }
        self.refresh_current_segment();

        if self.autoplay {
            self.try_play();
        }
    }

    /// Flip between playing and paused. No-op with nothing loaded.
    ///
    /// A backend play failure is reported as a [`PlayerEvent::PlaybackError`]
    /// and the transport stays paused; the snapshot never claims "playing"
    /// when the media didn't start.
    pub fn toggle_play_pause(&mut self) {
        match self.state {
            TransportState::Empty | TransportState::Loading => {}
            TransportState::Ready => {
                self.try_play();
            }
            TransportState::Playing => {
                if let Err(e) = self.backend.pause() {
                    self.emit_playback_error(&e);
                }
                self.state = TransportState::Ready;
            }
            TransportState::Ended => {
                // Interaction after the end restarts from zero.
                self.state = TransportState::Ready;
                self.commit_seek(self.displayed_time);
                self.try_play();
            }
        }
    }

    /// Absolute seek, clamped into `[0, total_duration]`.
    ///
    /// The displayed time updates immediately; the backend position follows.
    pub fn seek(&mut self, seconds: f64) -> Result<()> {
        match self.state {
            TransportState::Empty | TransportState::Loading => {
                return Err(LisnError::Playback {
                    message: "no resource loaded".to_string(),
                });
            }
            TransportState::Ended => {
                self.state = TransportState::Ready;
            }
            _ => {}
        }

        let target = self.clamp_time(seconds);
        self.displayed_time = target;
        self.commit_seek(target);
        self.refresh_current_segment();
        Ok(())
    }

    /// Relative seek for the fixed-size skip controls.
    pub fn skip_by(&mut self, delta: f64) -> Result<()> {
        self.seek(self.displayed_time + delta)
    }

    /// Jump to the start of a segment and make sure audio is running.
    ///
    /// Rejected while the artifact is still processing: durations are not
    /// meaningful yet, so the computed start offsets are garbage.
    pub fn select_segment(&mut self, index: usize) -> Result<()> {
        if self.artifact_status != ArtifactStatus::Done {
            return Err(LisnError::Playback {
                message: "segments are not selectable until generation completes".to_string(),
            });
        }
        let start = timeline::timing_for(&self.timings, index)
            .ok_or_else(|| LisnError::Playback {
                message: format!("no segment at index {index}"),
            })?
            .start;

        self.seek(start)?;
        if self.state != TransportState::Playing {
            self.try_play();
        }
        Ok(())
    }

    /// Continuous position callback from the media layer.
    ///
    /// Arrives at timer frequency, with jitter, and not necessarily
    /// monotonically around seeks; each value is simply adopted. Ignored
    /// while a drag gesture owns the displayed time.
    pub fn on_time_update(&mut self, seconds: f64) {
        if self.state != TransportState::Playing && self.state != TransportState::Ready {
            return;
        }
        if self.dragging {
            return;
        }
        let seconds = self.clamp_time(seconds);
        self.displayed_time = seconds;
        self.committed_time = seconds;
        self.refresh_current_segment();
    }

    /// The resource played to its end.
    pub fn on_ended(&mut self) {
        if self.state == TransportState::Empty {
            return;
        }
        self.state = TransportState::Ended;
        self.dragging = false;
        self.displayed_time = 0.0;
        self.committed_time = 0.0;
        self.saved_position = None;
        self.refresh_current_segment();
    }

    /// Drive the state machine from the backend: metadata arrival, position
    /// updates and end-of-resource detection.
    pub fn poll(&mut self) {
        match self.state {
            TransportState::Loading => {
                if let Some(duration) = self.backend.duration() {
                    self.on_metadata(duration);
                }
            }
            TransportState::Playing => {
                if self.backend.is_ended() {
                    self.on_ended();
                } else {
                    self.on_time_update(self.backend.position());
                }
            }
            _ => {}
        }
    }

    // ── Drag-seek gesture ─────────────────────────────────────────────────

    /// Pointer pressed on the progress control.
    pub fn begin_drag(&mut self) {
        if self.state == TransportState::Empty || self.state == TransportState::Loading {
            return;
        }
        self.dragging = true;
    }

    /// Pointer moved during a drag. Updates only the displayed time; the
    /// backend is not touched until release.
    pub fn drag_to(&mut self, seconds: f64) {
        if !self.dragging {
            return;
        }
        self.displayed_time = self.clamp_time(seconds);
    }

    /// Pointer released: commit the final position.
    pub fn end_drag(&mut self) {
        if !self.dragging {
            return;
        }
        self.dragging = false;
        if self.state == TransportState::Ended {
            self.state = TransportState::Ready;
        }
        self.commit_seek(self.displayed_time);
        self.refresh_current_segment();
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────

    /// Hide the player but remember where it was.
    ///
    /// The playhead is saved so a later `load` resumes there; any drag
    /// gesture is cancelled.
    pub fn suspend(&mut self) {
        if self.state == TransportState::Empty {
            return;
        }
        self.saved_position = Some(self.displayed_time);
        let _ = self.backend.pause();
        self.backend.unload();
        self.state = TransportState::Empty;
        self.dragging = false;
        self.displayed_time = 0.0;
        self.committed_time = 0.0;
        self.total_duration = 0.0;
    }

    /// Close the player: drop the resource, the descriptor data and any
    /// saved position.
    pub fn reset(&mut self) {
        self.backend.unload();
        self.state = TransportState::Empty;
        self.artifact_status = ArtifactStatus::Queued;
        self.segments.clear();
        self.timings.clear();
        self.displayed_time = 0.0;
        self.committed_time = 0.0;
        self.total_duration = 0.0;
        self.current_segment = None;
        self.dragging = false;
        self.saved_position = None;
    }

    // ── Internals ─────────────────────────────────────────────────────────

    fn clamp_time(&self, seconds: f64) -> f64 {
        if !seconds.is_finite() {
            return 0.0;
        }
        seconds.clamp(0.0, self.total_duration)
    }

    fn try_play(&mut self) {
        match self.backend.play() {
            Ok(()) => self.state = TransportState::Playing,
            Err(e) => {
                // Playback did not start; stay paused rather than lie.
                self.state = TransportState::Ready;
                self.emit_playback_error(&e);
            }
        }
    }

    fn commit_seek(&mut self, target: f64) {
        match self.backend.seek(target) {
            Ok(()) => self.committed_time = target,
            Err(e) => self.emit_playback_error(&e),
        }
    }

    fn emit_playback_error(&self, error: &LisnError) {
        match &self.event_tx {
            Some(tx) => {
                let _ = tx.send(PlayerEvent::PlaybackError {
                    message: error.to_string(),
                });
            }
            None => eprintln!("lisn: {error}"),
        }
    }

    fn refresh_current_segment(&mut self) {
        let index = timeline::segment_at(&self.timings, self.displayed_time);
        if index != self.current_segment {
            self.current_segment = index;
            if let (Some(tx), Some(index)) = (&self.event_tx, index) {
                let _ = tx.send(PlayerEvent::SegmentChanged { index });
            }
        }
    }
}
