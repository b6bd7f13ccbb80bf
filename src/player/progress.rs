//! Generation-progress tracking: the reducer over push-stream events and
//! the listener task that feeds it.
//!
//! Every inbound event flows through [`ArtifactProgress::apply_payload`]
//! (one reducer, not scattered handlers), so the exactly-once guarantees on
//! the terminal transitions are explicit guards rather than side-effect
//! ordering.

use crate::api::sse::SseParser;
use crate::api::types::{ArtifactStatus, ProgressPayload};
use crate::api::StoryApi;
use crate::defaults;
use crate::error::LisnError;
use crate::player::events::PlayerEvent;
use crossbeam_channel::Sender;
use futures_util::StreamExt;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// What one applied event changed.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressAction {
    UpdatedOverall { percent: f64 },
    UpdatedSegment { segment_id: i64, percent: f64 },
    UpdatedTitle { title: String },
    /// Terminal success transition. Emitted at most once per artifact
    /// lifecycle, no matter how many `done` events arrive.
    BecameDone,
    /// Terminal failure transition. Also emitted at most once.
    Failed { message: String },
}

/// Reducer state for one artifact's generation progress.
#[derive(Debug, Clone)]
pub struct ArtifactProgress {
    pub overall_percent: f64,
    /// Per-segment completion keyed by segment id.
    pub segment_percent: BTreeMap<i64, f64>,
    pub title: Option<String>,
    pub status: ArtifactStatus,
    done_signaled: bool,
    failure_signaled: bool,
}

impl Default for ArtifactProgress {
    fn default() -> Self {
        Self {
            overall_percent: 0.0,
            segment_percent: BTreeMap::new(),
            title: None,
            status: ArtifactStatus::Queued,
            done_signaled: false,
            failure_signaled: false,
        }
    }
}

impl ArtifactProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one push-stream payload, in arrival order.
    ///
    /// Field updates still apply after the terminal transition (a late
    /// `done` event may carry the final title), but the transition actions
    /// themselves fire only once.
    pub fn apply_payload(&mut self, payload: &ProgressPayload) -> Vec<ProgressAction> {
        let mut actions = Vec::new();

        if let Some(per_segment) = &payload.topic_progress {
            for (&segment_id, &raw) in per_segment {
                let percent = clamp_percent(raw);
                let previous = self.segment_percent.insert(segment_id, percent);
                if previous != Some(percent) {
                    actions.push(ProgressAction::UpdatedSegment {
                        segment_id,
                        percent,
                    });
                }
            }
        }

        if let Some(raw) = payload.audio_byte_progress {
            let percent = clamp_percent(raw);
            if percent != self.overall_percent {
                self.overall_percent = percent;
                actions.push(ProgressAction::UpdatedOverall { percent });
            }
        }

        if let Some(title) = &payload.audio_byte_title
            && self.title.as_deref() != Some(title)
        {
            self.title = Some(title.clone());
            actions.push(ProgressAction::UpdatedTitle {
                title: title.clone(),
            });
        }

        if let Some(status) = payload.audio_byte_status {
            actions.extend(self.apply_status(status));
        }

        actions
    }

    /// Apply a status observed outside the stream (the fallback poll).
    pub fn apply_status(&mut self, status: ArtifactStatus) -> Vec<ProgressAction> {
        self.status = status;
        match status {
            ArtifactStatus::Done if !self.done_signaled => {
                self.done_signaled = true;
                vec![ProgressAction::BecameDone]
            }
            ArtifactStatus::Error if !self.failure_signaled => {
                self.failure_signaled = true;
                vec![ProgressAction::Failed {
                    message: "the backend reported a generation failure".to_string(),
                }]
            }
            _ => Vec::new(),
        }
    }
}

fn clamp_percent(raw: f64) -> f64 {
    if raw.is_finite() { raw.clamp(0.0, 100.0) } else { 0.0 }
}

/// How one pass over the push stream ended.
enum StreamOutcome {
    /// The artifact became done; the connection is already closed.
    Done,
    /// The artifact failed terminally; nothing further will arrive.
    Failed,
    /// The connection dropped or ended while the job was still in flight.
    Interrupted,
}

/// Listens to the generation-progress push stream for one artifact.
///
/// At most one connection per artifact: starting again (same or different
/// id) tears down the previous task first. Re-arming for the same id while
/// still processing is safe: the reducer state survives, so the terminal
/// transition cannot fire twice.
pub struct ProgressListener {
    api: Arc<dyn StoryApi>,
    event_tx: Sender<PlayerEvent>,
    settle_delay: Duration,
    progress: Arc<Mutex<ArtifactProgress>>,
    artifact_id: Option<i64>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl ProgressListener {
    pub fn new(api: Arc<dyn StoryApi>, event_tx: Sender<PlayerEvent>) -> Self {
        Self {
            api,
            event_tx,
            settle_delay: Duration::from_millis(defaults::SETTLE_DELAY_MS),
            progress: Arc::new(Mutex::new(ArtifactProgress::new())),
            artifact_id: None,
            task: None,
        }
    }

    /// Override the settle delay (tests use zero).
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Snapshot of the current reducer state.
    pub fn progress(&self) -> ArtifactProgress {
        lock_progress(&self.progress).clone()
    }

    /// Open the push stream for an artifact.
    ///
    /// A previous connection, for this or any other artifact, is closed
    /// first; the reducer state resets only when the artifact id changes.
    pub fn start(&mut self, artifact_id: i64) {
        self.stop();

        if self.artifact_id != Some(artifact_id) {
            *lock_progress(&self.progress) = ArtifactProgress::new();
            self.artifact_id = Some(artifact_id);
        }

        let api = self.api.clone();
        let progress = self.progress.clone();
        let event_tx = self.event_tx.clone();
        let settle_delay = self.settle_delay;
        self.task = Some(tokio::spawn(async move {
            run_listener(api, artifact_id, progress, event_tx, settle_delay).await;
        }));
    }

    /// Close the connection and cancel any pending settle timer.
    ///
    /// No events are delivered after this returns, even if the server had
    /// more queued.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    /// True while the listener task is live.
    pub fn is_listening(&self) -> bool {
        self.task
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }

    /// Wait for the current listener pass to finish (stream closed and any
    /// terminal signal delivered).
    pub async fn join(&mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ProgressListener {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Recover the reducer state even if a panicking thread poisoned the lock;
/// the state itself is always internally consistent.
fn lock_progress(progress: &Mutex<ArtifactProgress>) -> MutexGuard<'_, ArtifactProgress> {
    progress
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn run_listener(
    api: Arc<dyn StoryApi>,
    artifact_id: i64,
    progress: Arc<Mutex<ArtifactProgress>>,
    event_tx: Sender<PlayerEvent>,
    settle_delay: Duration,
) {
    let outcome = consume_stream(&*api, artifact_id, &progress, &event_tx).await;

    match outcome {
        StreamOutcome::Done => {
            // Connection is closed; give the backend a moment to finish
            // writing final durations before anyone fetches them.
            tokio::time::sleep(settle_delay).await;
            let _ = event_tx.send(PlayerEvent::GenerationDone);
        }
        StreamOutcome::Failed => {}
        StreamOutcome::Interrupted => {
            // The push stream is not guaranteed durable. If the job was
            // still in flight, poll the status once as a fallback.
            let in_flight = lock_progress(&progress).status.is_in_flight();
            if !in_flight {
                return;
            }
            match api.artifact(artifact_id).await {
                Ok(data) => {
                    let actions = lock_progress(&progress).apply_status(data.status);
                    let became_done = forward_actions(&actions, &event_tx);
                    if became_done {
                        tokio::time::sleep(settle_delay).await;
                        let _ = event_tx.send(PlayerEvent::GenerationDone);
                    }
                }
                Err(e) => {
                    eprintln!("lisn: fallback status poll failed: {e}");
                }
            }
        }
    }
}

async fn consume_stream(
    api: &dyn StoryApi,
    artifact_id: i64,
    progress: &Mutex<ArtifactProgress>,
    event_tx: &Sender<PlayerEvent>,
) -> StreamOutcome {
    let mut stream = match api.progress_stream(artifact_id).await {
        Ok(stream) => stream,
        Err(e) => {
            let _ = event_tx.send(PlayerEvent::StreamInterrupted {
                message: e.to_string(),
            });
            return StreamOutcome::Interrupted;
        }
    };

    let mut parser = SseParser::new();
    while let Some(chunk) = stream.next().await {
        let bytes = match chunk {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = event_tx.send(PlayerEvent::StreamInterrupted {
                    message: e.to_string(),
                });
                return StreamOutcome::Interrupted;
            }
        };

        for message in parser.push(&bytes) {
            if message.event != "progress" && message.event != "message" {
                continue;
            }
            let payload: ProgressPayload = match serde_json::from_str(&message.data) {
                Ok(payload) => payload,
                Err(e) => {
                    // Malformed payloads degrade the display, never the
                    // session.
                    let err = LisnError::MalformedEvent {
                        message: e.to_string(),
                    };
                    eprintln!("lisn: dropping event: {err}");
                    continue;
                }
            };

            let actions = lock_progress(progress).apply_payload(&payload);
            let became_done = forward_actions(&actions, event_tx);
            if became_done {
                // Dropping the stream closes the connection before the
                // settle delay starts.
                return StreamOutcome::Done;
            }
            if actions
                .iter()
                .any(|action| matches!(action, ProgressAction::Failed { .. }))
            {
                return StreamOutcome::Failed;
            }
        }
    }

    StreamOutcome::Interrupted
}

/// Send field-update actions as events; returns whether the batch contained
/// the done transition (signaled separately, after the settle delay).
fn forward_actions(actions: &[ProgressAction], event_tx: &Sender<PlayerEvent>) -> bool {
    let mut became_done = false;
    for action in actions {
        match action {
            ProgressAction::UpdatedOverall { percent } => {
                let _ = event_tx.send(PlayerEvent::OverallProgress { percent: *percent });
            }
            ProgressAction::UpdatedSegment {
                segment_id,
                percent,
            } => {
                let _ = event_tx.send(PlayerEvent::SegmentProgress {
                    segment_id: *segment_id,
                    percent: *percent,
                });
            }
            ProgressAction::UpdatedTitle { title } => {
                let _ = event_tx.send(PlayerEvent::TitleChanged {
                    title: title.clone(),
                });
            }
            ProgressAction::BecameDone => became_done = true,
            ProgressAction::Failed { message } => {
                let _ = event_tx.send(PlayerEvent::GenerationFailed {
                    message: message.clone(),
                });
            }
        }
    }
    became_done
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::ArtifactData;
    use crate::api::MockStoryApi;
    use crossbeam_channel::{unbounded, Receiver};

    fn payload_json(status: &str, percent: f64) -> String {
        format!(
            "{{\"audio_byte_status\":\"{status}\",\"audio_byte_progress\":{percent}}}"
        )
    }

    fn sse_event(data: &str) -> Vec<u8> {
        format!("event: progress\ndata: {data}\n\n").into_bytes()
    }

    fn artifact(id: i64, status: ArtifactStatus) -> ArtifactData {
        ArtifactData {
            id,
            user_id: String::new(),
            status,
            title: None,
            approximate_duration: None,
            style: None,
            topic_discovery_id: None,
            selected_topics: Vec::new(),
            audio_file: None,
        }
    }

    /// Drain everything currently queued on the receiver.
    fn drain(rx: &Receiver<PlayerEvent>) -> Vec<PlayerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn count_done(events: &[PlayerEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, PlayerEvent::GenerationDone))
            .count()
    }

    // ── Reducer tests ─────────────────────────────────────────────────────

    #[test]
    fn test_reducer_clamps_overall_percent() {
        let mut progress = ArtifactProgress::new();
        progress.apply_payload(&ProgressPayload {
            audio_byte_progress: Some(150.0),
            ..Default::default()
        });
        assert_eq!(progress.overall_percent, 100.0);

        progress.apply_payload(&ProgressPayload {
            audio_byte_progress: Some(-3.0),
            ..Default::default()
        });
        assert_eq!(progress.overall_percent, 0.0);
    }

    #[test]
    fn test_reducer_tracks_per_segment_percent() {
        let mut progress = ArtifactProgress::new();
        let actions = progress.apply_payload(&ProgressPayload {
            topic_progress: Some([(1, 40.0), (2, 10.0)].into_iter().collect()),
            ..Default::default()
        });

        assert_eq!(progress.segment_percent.get(&1), Some(&40.0));
        assert_eq!(progress.segment_percent.get(&2), Some(&10.0));
        assert_eq!(actions.len(), 2);

        // Re-sending the same values is not a change
        let actions = progress.apply_payload(&ProgressPayload {
            topic_progress: Some([(1, 40.0)].into_iter().collect()),
            ..Default::default()
        });
        assert!(actions.is_empty());
    }

    #[test]
    fn test_reducer_done_transition_fires_once() {
        let mut progress = ArtifactProgress::new();

        let first = progress.apply_status(ArtifactStatus::Done);
        assert_eq!(first, vec![ProgressAction::BecameDone]);

        let second = progress.apply_status(ArtifactStatus::Done);
        assert!(second.is_empty());
        assert_eq!(progress.status, ArtifactStatus::Done);
    }

    #[test]
    fn test_reducer_error_transition_fires_once() {
        let mut progress = ArtifactProgress::new();

        let first = progress.apply_status(ArtifactStatus::Error);
        assert!(matches!(first[0], ProgressAction::Failed { .. }));

        let second = progress.apply_status(ArtifactStatus::Error);
        assert!(second.is_empty());
    }

    #[test]
    fn test_reducer_fields_still_update_after_done() {
        let mut progress = ArtifactProgress::new();
        progress.apply_status(ArtifactStatus::Done);

        let actions = progress.apply_payload(&ProgressPayload {
            audio_byte_title: Some("Final Title".to_string()),
            audio_byte_status: Some(ArtifactStatus::Done),
            ..Default::default()
        });

        assert_eq!(progress.title.as_deref(), Some("Final Title"));
        // Title change surfaced, but no second BecameDone
        assert_eq!(
            actions,
            vec![ProgressAction::UpdatedTitle {
                title: "Final Title".to_string()
            }]
        );
    }

    #[test]
    fn test_reducer_title_action_only_on_change() {
        let mut progress = ArtifactProgress::new();
        let payload = ProgressPayload {
            audio_byte_title: Some("Sachin".to_string()),
            ..Default::default()
        };

        assert_eq!(progress.apply_payload(&payload).len(), 1);
        assert!(progress.apply_payload(&payload).is_empty());
    }

    #[test]
    fn test_clamp_percent_rejects_non_finite() {
        assert_eq!(clamp_percent(f64::NAN), 0.0);
        assert_eq!(clamp_percent(f64::INFINITY), 0.0);
        assert_eq!(clamp_percent(55.5), 55.5);
    }

    // ── Listener tests ────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_listener_processing_then_done_signals_once() {
        let api = Arc::new(
            MockStoryApi::new().with_stream_chunks(vec![
                &sse_event(&payload_json("processing", 40.0)),
                &sse_event(&payload_json("done", 100.0)),
                // A third identical done event must be a no-op; the
                // connection is closed before it anyway.
                &sse_event(&payload_json("done", 100.0)),
            ]),
        );
        let (tx, rx) = unbounded();
        let mut listener =
            ProgressListener::new(api.clone(), tx).with_settle_delay(Duration::ZERO);

        listener.start(7);
        listener.join().await;

        let events = drain(&rx);
        assert_eq!(count_done(&events), 1);
        assert!(events.contains(&PlayerEvent::OverallProgress { percent: 40.0 }));
        assert_eq!(listener.progress().status, ArtifactStatus::Done);
    }

    #[tokio::test]
    async fn test_listener_repeated_done_events_in_separate_passes() {
        // Even when the stream is re-read from scratch (re-arm), the
        // transition fires only once per artifact lifecycle.
        let api = Arc::new(MockStoryApi::new().with_stream_chunks(vec![&sse_event(
            &payload_json("done", 100.0),
        )]));
        let (tx, rx) = unbounded();
        let mut listener =
            ProgressListener::new(api.clone(), tx).with_settle_delay(Duration::ZERO);

        listener.start(7);
        listener.join().await;
        listener.start(7);
        listener.join().await;

        assert_eq!(api.stream_call_count(), 2);
        assert_eq!(count_done(&drain(&rx)), 1);
    }

    #[tokio::test]
    async fn test_listener_new_artifact_resets_lifecycle() {
        let api = Arc::new(MockStoryApi::new().with_stream_chunks(vec![&sse_event(
            &payload_json("done", 100.0),
        )]));
        let (tx, rx) = unbounded();
        let mut listener =
            ProgressListener::new(api.clone(), tx).with_settle_delay(Duration::ZERO);

        listener.start(7);
        listener.join().await;
        listener.start(8);
        listener.join().await;

        // Different artifact instance → its own done transition
        assert_eq!(count_done(&drain(&rx)), 2);
    }

    #[tokio::test]
    async fn test_listener_drops_malformed_events_and_continues() {
        let api = Arc::new(MockStoryApi::new().with_stream_chunks(vec![
            b"event: progress\ndata: not json at all\n\n",
            &sse_event(&payload_json("processing", 30.0)),
        ]));
        let (tx, rx) = unbounded();
        let mut listener =
            ProgressListener::new(api.clone(), tx).with_settle_delay(Duration::ZERO);

        listener.start(7);
        listener.join().await;

        let events = drain(&rx);
        assert!(events.contains(&PlayerEvent::OverallProgress { percent: 30.0 }));
    }

    #[tokio::test]
    async fn test_listener_error_status_fails_without_done() {
        let api = Arc::new(MockStoryApi::new().with_stream_chunks(vec![&sse_event(
            "{\"audio_byte_status\":\"error\"}",
        )]));
        let (tx, rx) = unbounded();
        let mut listener =
            ProgressListener::new(api.clone(), tx).with_settle_delay(Duration::ZERO);

        listener.start(7);
        listener.join().await;

        let events = drain(&rx);
        assert_eq!(count_done(&events), 0);
        assert!(events
            .iter()
            .any(|e| matches!(e, PlayerEvent::GenerationFailed { .. })));
    }

    #[tokio::test]
    async fn test_listener_stream_error_falls_back_to_one_poll() {
        let api = Arc::new(
            MockStoryApi::new()
                .with_stream_chunks(vec![&sse_event(&payload_json("processing", 40.0))])
                .with_stream_error()
                .with_artifact(artifact(7, ArtifactStatus::Done)),
        );
        let (tx, rx) = unbounded();
        let mut listener =
            ProgressListener::new(api.clone(), tx).with_settle_delay(Duration::ZERO);

        listener.start(7);
        listener.join().await;

        let events = drain(&rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, PlayerEvent::StreamInterrupted { .. })));
        assert_eq!(count_done(&events), 1);
        assert_eq!(api.artifact_call_count(), 1);
    }

    #[tokio::test]
    async fn test_listener_stream_end_while_processing_polls_once() {
        // A cleanly ended stream with the job still in flight is treated
        // like a dropped connection.
        let api = Arc::new(
            MockStoryApi::new()
                .with_stream_chunks(vec![&sse_event(&payload_json("processing", 10.0))])
                .with_artifact(artifact(7, ArtifactStatus::Processing)),
        );
        let (tx, rx) = unbounded();
        let mut listener =
            ProgressListener::new(api.clone(), tx).with_settle_delay(Duration::ZERO);

        listener.start(7);
        listener.join().await;

        assert_eq!(api.artifact_call_count(), 1);
        assert_eq!(count_done(&drain(&rx)), 0);
        assert_eq!(listener.progress().status, ArtifactStatus::Processing);
    }

    #[tokio::test]
    async fn test_listener_restart_closes_previous_connection() {
        let api = Arc::new(MockStoryApi::new().with_hanging_stream());
        let (tx, _rx) = unbounded();
        let mut listener =
            ProgressListener::new(api.clone(), tx).with_settle_delay(Duration::ZERO);

        listener.start(7);
        tokio::task::yield_now().await;
        assert!(listener.is_listening());

        // Re-arm: the first task is torn down before the second connects
        listener.start(7);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(api.stream_call_count(), 2);
    }

    #[tokio::test]
    async fn test_listener_teardown_stops_event_delivery() {
        let api = Arc::new(
            MockStoryApi::new()
                .with_stream_chunks(vec![&sse_event(&payload_json("processing", 5.0))])
                .with_hanging_stream(),
        );
        let (tx, rx) = unbounded();
        let mut listener =
            ProgressListener::new(api.clone(), tx).with_settle_delay(Duration::ZERO);

        listener.start(7);
        tokio::time::sleep(Duration::from_millis(20)).await;
        drain(&rx);

        listener.stop();
        assert!(!listener.is_listening());

        // The connection is gone; nothing more can arrive.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(drain(&rx).is_empty());
    }

    #[tokio::test]
    async fn test_listener_settle_delay_precedes_done_signal() {
        let api = Arc::new(MockStoryApi::new().with_stream_chunks(vec![&sse_event(
            &payload_json("done", 100.0),
        )]));
        let (tx, rx) = unbounded();
        let mut listener = ProgressListener::new(api.clone(), tx)
            .with_settle_delay(Duration::from_millis(50));

        listener.start(7);
        tokio::time::sleep(Duration::from_millis(10)).await;
        // Status already applied, but the orchestrator signal is held back
        assert_eq!(listener.progress().status, ArtifactStatus::Done);
        assert_eq!(count_done(&drain(&rx)), 0);

        listener.join().await;
        assert_eq!(count_done(&drain(&rx)), 1);
    }
}
