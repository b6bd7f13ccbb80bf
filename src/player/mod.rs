//! The player core: progress tracking, segment timing, transport control,
//! and the fetch orchestration that ties them to the backend.
//!
//! Data flow: an [`Artifact`] descriptor arrives from the API →
//! [`orchestrator::Orchestrator`] branches on its status → while
//! `processing`, [`progress::ProgressListener`] consumes the push stream →
//! once `done`, the final resource location is fetched and handed to
//! [`transport::Transport`], which owns the media backend exclusively.

pub mod backend;
pub mod events;
pub mod orchestrator;
pub mod progress;
pub mod timeline;
pub mod transport;

use crate::api::types::{ArtifactData, ArtifactStatus, Topic};

/// One narrated sub-topic within an artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    /// Stable id; ascending id order is playback order.
    pub id: i64,
    pub title: String,
    /// Seconds. Absent until the artifact reaches `done`.
    pub duration: Option<f64>,
}

impl From<Topic> for Segment {
    fn from(topic: Topic) -> Self {
        Self {
            id: topic.id,
            title: topic.title,
            duration: topic.duration,
        }
    }
}

/// Client-side descriptor of one generation job.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub id: i64,
    pub status: ArtifactStatus,
    pub title: Option<String>,
    /// Sorted by id ascending on ingest; never re-ordered by arrival.
    pub segments: Vec<Segment>,
}

impl From<ArtifactData> for Artifact {
    fn from(data: ArtifactData) -> Self {
        let mut segments: Vec<Segment> = data
            .selected_topics
            .into_iter()
            .map(Segment::from)
            .collect();
        segments.sort_by_key(|segment| segment.id);
        Self {
            id: data.id,
            status: data.status,
            title: data.title,
            segments,
        }
    }
}
