//! Wire types for the topic/artifact backend API.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One discovered sub-topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub id: i64,
    pub title: String,
    pub topic_discovery_id: i64,
    /// Narrated length in seconds. Present only once the owning artifact
    /// reaches `done`.
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub audio_byte_id: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

/// Result of one topic discovery request.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TopicDiscovery {
    pub id: i64,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub user_query: String,
    pub topics: Vec<Topic>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TopicDiscoveryResponse {
    #[serde(default)]
    pub success: bool,
    pub data: TopicDiscovery,
}

/// Server-side state of a generation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactStatus {
    Queued,
    Processing,
    Done,
    Error,
    /// Statuses this client doesn't know about are treated as still in
    /// flight rather than failing deserialization.
    #[serde(other)]
    Unknown,
}

impl ArtifactStatus {
    /// True once the backend will send no further progress for this job.
    pub fn is_terminal(self) -> bool {
        matches!(self, ArtifactStatus::Done | ArtifactStatus::Error)
    }

    /// True while segment durations are not yet meaningful.
    pub fn is_in_flight(self) -> bool {
        !self.is_terminal()
    }
}

/// Generation job state as returned by `GET /audio-bytes/{id}` and the
/// generate endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ArtifactData {
    pub id: i64,
    #[serde(default)]
    pub user_id: String,
    pub status: ArtifactStatus,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub approximate_duration: Option<f64>,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub topic_discovery_id: Option<i64>,
    #[serde(default)]
    pub selected_topics: Vec<Topic>,
    #[serde(default)]
    pub audio_file: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ArtifactResponse {
    #[serde(default)]
    pub success: bool,
    pub data: ArtifactData,
}

/// Final playable resource location for a finished artifact.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FileUrlResponse {
    #[serde(default)]
    pub success: bool,
    pub url: String,
}

/// Body of `POST /audio-bytes/generate`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerateRequest {
    pub duration: u32,
    pub selected_topic_ids: Vec<i64>,
    pub style: String,
    pub topic_discovery_id: i64,
}

/// Payload of one `progress` event on the push stream.
///
/// Events may carry any subset of these fields; absent fields leave the
/// corresponding client state untouched.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProgressPayload {
    /// Per-segment completion, keyed by segment id.
    pub topic_progress: Option<BTreeMap<i64, f64>>,
    /// Overall completion percent.
    pub audio_byte_progress: Option<f64>,
    /// Incrementally-revealed narration title.
    pub audio_byte_title: Option<String>,
    pub audio_byte_status: Option<ArtifactStatus>,
}
