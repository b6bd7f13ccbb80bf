//! Artifact fetch orchestration.
//!
//! One entry point, [`Orchestrator::on_artifact_changed`], branches on the
//! artifact's status: still in flight → (re)arm the progress listener; done
//! → fetch the final resource location for the transport; failed → surface
//! it. The credential supplier is an injected dependency; a missing token
//! aborts the fetch before anything else happens.

use crate::api::types::ArtifactStatus;
use crate::api::StoryApi;
use crate::auth::TokenProvider;
use crate::error::{LisnError, Result};
use crate::player::events::PlayerEvent;
use crate::player::progress::{ArtifactProgress, ProgressListener};
use crate::player::Artifact;
use crossbeam_channel::Sender;
use std::sync::Arc;
use std::time::Duration;

pub struct Orchestrator {
    api: Arc<dyn StoryApi>,
    tokens: Arc<dyn TokenProvider>,
    listener: ProgressListener,
    event_tx: Sender<PlayerEvent>,
}

impl Orchestrator {
    pub fn new(
        api: Arc<dyn StoryApi>,
        tokens: Arc<dyn TokenProvider>,
        event_tx: Sender<PlayerEvent>,
    ) -> Self {
        let listener = ProgressListener::new(api.clone(), event_tx.clone());
        Self {
            api,
            tokens,
            listener,
            event_tx,
        }
    }

    /// Override the listener's settle delay (tests use zero).
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.listener = self.listener.with_settle_delay(delay);
        self
    }

    /// React to a new or updated artifact descriptor.
    ///
    /// Returns the final resource location once the artifact is done; the
    /// caller hands it to the transport's `load`. While the artifact is in
    /// flight this arms the progress listener instead; re-invoking for the
    /// same artifact (the player became visible again) is safe and cannot
    /// duplicate terminal side effects.
    ///
    /// A failed fetch is returned as-is and not retried here; retrying is an
    /// interaction concern.
    pub async fn on_artifact_changed(&mut self, artifact: &Artifact) -> Result<Option<String>> {
        match artifact.status {
            ArtifactStatus::Done => {
                // No token → abort before any side effect; the surface
                // decides whether to prompt for credentials.
                if self.tokens.token().is_none() {
                    return Err(LisnError::AuthRequired);
                }
                self.listener.stop();
                let file = self.api.artifact_file(artifact.id).await?;
                Ok(Some(file.url))
            }
            ArtifactStatus::Error => {
                let _ = self.event_tx.send(PlayerEvent::GenerationFailed {
                    message: "the backend reported a generation failure".to_string(),
                });
                Ok(None)
            }
            // Queued, processing, and anything unrecognized: keep listening.
            _ => {
                self.listener.start(artifact.id);
                Ok(None)
            }
        }
    }

    /// Re-fetch the artifact descriptor, e.g. after the listener signals
    /// the done transition.
    pub async fn refresh(&self, artifact_id: i64) -> Result<Artifact> {
        self.api.artifact(artifact_id).await.map(Artifact::from)
    }

    /// Snapshot of the generation progress reducer.
    pub fn progress(&self) -> ArtifactProgress {
        self.listener.progress()
    }

    /// True while a progress connection is live.
    pub fn is_listening(&self) -> bool {
        self.listener.is_listening()
    }

    /// Tear down: close any open push connection and pending timers.
    pub fn shutdown(&mut self) {
        self.listener.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::ArtifactData;
    use crate::api::MockStoryApi;
    use crate::auth::StaticTokenProvider;
    use crate::player::Segment;
    use crossbeam_channel::unbounded;

    fn artifact(id: i64, status: ArtifactStatus) -> Artifact {
        Artifact {
            id,
            status,
            title: None,
            segments: vec![Segment {
                id: 1,
                title: "A".to_string(),
                duration: Some(30.0),
            }],
        }
    }

    fn artifact_data(id: i64, status: ArtifactStatus) -> ArtifactData {
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

    #[tokio::test]
    async fn test_done_artifact_fetches_resource_location() {
        let api = Arc::new(MockStoryApi::new().with_file_url("https://cdn/story.mp3"));
        let (tx, _rx) = unbounded();
        let mut orchestrator = Orchestrator::new(
            api.clone(),
            Arc::new(StaticTokenProvider::new("tok")),
            tx,
        );

        let url = orchestrator
            .on_artifact_changed(&artifact(7, ArtifactStatus::Done))
            .await
            .unwrap();

        assert_eq!(url.as_deref(), Some("https://cdn/story.mp3"));
        assert_eq!(api.file_call_count(), 1);
    }

    #[tokio::test]
    async fn test_done_without_token_aborts_without_side_effects() {
        let api = Arc::new(MockStoryApi::new().with_file_url("https://cdn/story.mp3"));
        let (tx, _rx) = unbounded();
        let mut orchestrator = Orchestrator::new(
            api.clone(),
            Arc::new(StaticTokenProvider::absent()),
            tx,
        );

        let err = orchestrator
            .on_artifact_changed(&artifact(7, ArtifactStatus::Done))
            .await
            .unwrap_err();

        assert!(matches!(err, LisnError::AuthRequired));
        assert_eq!(api.file_call_count(), 0);
    }

    #[tokio::test]
    async fn test_processing_artifact_arms_the_listener() {
        let api = Arc::new(MockStoryApi::new().with_hanging_stream());
        let (tx, _rx) = unbounded();
        let mut orchestrator = Orchestrator::new(
            api.clone(),
            Arc::new(StaticTokenProvider::new("tok")),
            tx,
        );

        let url = orchestrator
            .on_artifact_changed(&artifact(7, ArtifactStatus::Processing))
            .await
            .unwrap();

        assert_eq!(url, None);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(api.stream_call_count(), 1);
        assert!(orchestrator.is_listening());

        orchestrator.shutdown();
        assert!(!orchestrator.is_listening());
    }

    #[tokio::test]
    async fn test_error_artifact_surfaces_failure_and_does_not_fetch() {
        let api = Arc::new(MockStoryApi::new());
        let (tx, rx) = unbounded();
        let mut orchestrator = Orchestrator::new(
            api.clone(),
            Arc::new(StaticTokenProvider::new("tok")),
            tx,
        );

        let url = orchestrator
            .on_artifact_changed(&artifact(7, ArtifactStatus::Error))
            .await
            .unwrap();

        assert_eq!(url, None);
        assert_eq!(api.file_call_count(), 0);
        let events: Vec<PlayerEvent> = rx.try_iter().collect();
        assert!(events
            .iter()
            .any(|e| matches!(e, PlayerEvent::GenerationFailed { .. })));
    }

    #[tokio::test]
    async fn test_failed_fetch_is_not_retried() {
        let api = Arc::new(MockStoryApi::new().with_failing_file_fetch());
        let (tx, _rx) = unbounded();
        let mut orchestrator = Orchestrator::new(
            api.clone(),
            Arc::new(StaticTokenProvider::new("tok")),
            tx,
        );

        let err = orchestrator
            .on_artifact_changed(&artifact(7, ArtifactStatus::Done))
            .await
            .unwrap_err();

        assert!(matches!(err, LisnError::Server { .. }));
        assert_eq!(api.file_call_count(), 1);
    }

    #[tokio::test]
    async fn test_refresh_maps_wire_data_to_descriptor() {
        let api = Arc::new(
            MockStoryApi::new().with_artifact(artifact_data(7, ArtifactStatus::Done)),
        );
        let (tx, _rx) = unbounded();
        let orchestrator = Orchestrator::new(
            api,
            Arc::new(StaticTokenProvider::new("tok")),
            tx,
        );

        let refreshed = orchestrator.refresh(7).await.unwrap();
        assert_eq!(refreshed.id, 7);
        assert_eq!(refreshed.status, ArtifactStatus::Done);
    }
}
