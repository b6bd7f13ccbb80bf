//! Default configuration constants for lisn.
//!
//! This module provides shared constants used across different configuration
//! types to ensure consistency and eliminate duplication.

/// Minimum search query length in characters, after normalization.
///
/// Shorter queries produce low-quality topic discovery results, so they are
/// rejected client-side before any request goes out.
pub const MIN_QUERY_LEN: usize = 10;

/// Maximum number of topics that can be selected for one narration.
///
/// Product rule: a narration is built from at most 8 sub-topics. Selections
/// beyond this are truncated, matching the backend's own cap.
pub const MAX_SELECTED_TOPICS: usize = 8;

/// Default narration length in seconds requested from the generator.
pub const DEFAULT_DURATION_SECS: u32 = 180;

/// Default narration style.
///
/// The backend accepts "raw", "narrative" and "deep dive".
pub const DEFAULT_STYLE: &str = "narrative";

/// Fixed skip size for the forward/back transport controls, in seconds.
pub const SKIP_SECONDS: f64 = 15.0;

/// Settle delay after the "done" transition, in milliseconds.
///
/// The status flips to done slightly before the backend finishes writing
/// final segment durations and the audio file record. Waiting briefly before
/// fetching final data avoids reading a half-written artifact.
pub const SETTLE_DELAY_MS: u64 = 500;

/// Interval between artifact status polls when the push stream is
/// unavailable, in seconds.
pub const POLL_INTERVAL_SECS: u64 = 5;

/// How often the interactive player refreshes position and status, in
/// milliseconds.
pub const TICK_INTERVAL_MS: u64 = 200;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_cap_matches_product_rule() {
        assert_eq!(MAX_SELECTED_TOPICS, 8);
    }

    #[test]
    fn test_skip_is_fifteen_seconds() {
        assert_eq!(SKIP_SECONDS, 15.0);
    }

    #[test]
    fn test_settle_delay_is_subsecond() {
        assert!(SETTLE_DELAY_MS < 1000);
    }
}
