//! Backend API: wire types, HTTP client, and event-stream framing.

pub mod client;
pub mod sse;
pub mod types;

pub use client::{ApiClient, ByteStream, MockStoryApi, StoryApi};
pub use types::{ArtifactData, ArtifactStatus, FileUrlResponse, ProgressPayload, Topic};
