//! lisn - Terminal player for generated audio stories
//!
//! Search a topic, pick sub-topics, follow generation progress live, then
//! play the synthesized narration with transport controls.

// Enforce error handling discipline
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod api;
#[cfg(feature = "cli")]
pub mod app;
pub mod auth;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod error;
pub mod output;
pub mod player;

// Core seams (backend ↔ player, source → state machine → output)
pub use api::{ApiClient, MockStoryApi, StoryApi};
pub use auth::{SharedTokenProvider, StaticTokenProvider, TokenProvider};
pub use player::backend::{MediaBackend, MockMediaBackend};

// Player core
pub use player::orchestrator::Orchestrator;
pub use player::progress::{ArtifactProgress, ProgressListener};
pub use player::transport::{PlaybackState, Transport, TransportState};
pub use player::{Artifact, Segment};

// Error handling
pub use error::{LisnError, Result};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
