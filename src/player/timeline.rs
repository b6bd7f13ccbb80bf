//! Segment timing math.
//!
//! Cumulative start/end offsets for an ordered segment list. Pure and
//! recomputed on every call: segment lists are capped at 8, so there is
//! nothing to gain from incremental maintenance, and recomputing sidesteps
//! staleness when the list changes.

use crate::player::Segment;

/// Playback-time window of one segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentTiming {
    pub index: usize,
    /// Seconds from the start of the narration.
    pub start: f64,
    pub end: f64,
}

/// Prefix-sum the segment durations into `[start, end)` windows.
///
/// A missing or non-finite duration counts as zero, which is exactly what
/// happens while an artifact is still processing: every window collapses and
/// no lookup can land inside one.
pub fn segment_timings(segments: &[Segment]) -> Vec<SegmentTiming> {
    let mut timings = Vec::with_capacity(segments.len());
    let mut cursor = 0.0;
    for (index, segment) in segments.iter().enumerate() {
        let duration = segment.duration.filter(|d| d.is_finite() && *d > 0.0).unwrap_or(0.0);
        timings.push(SegmentTiming {
            index,
            start: cursor,
            end: cursor + duration,
        });
        cursor += duration;
    }
    timings
}

/// Look up the window for a segment index. Out-of-range is `None`, never a
/// panic.
pub fn timing_for(timings: &[SegmentTiming], index: usize) -> Option<&SegmentTiming> {
    timings.get(index)
}

/// The greatest index whose `[start, end)` window contains `seconds`.
///
/// Times at or past the end of the last window clamp to the last non-empty
/// segment; an empty or all-zero-length list yields `None`.
pub fn segment_at(timings: &[SegmentTiming], seconds: f64) -> Option<usize> {
    let seconds = seconds.max(0.0);
    let mut found = None;
    for timing in timings {
        if seconds >= timing.start && seconds < timing.end {
            found = Some(timing.index);
        }
    }
    if found.is_some() {
        return found;
    }
    // Past the end: clamp to the last segment that has any width.
    timings
        .iter()
        .rev()
        .find(|timing| timing.end > timing.start)
        .filter(|timing| seconds >= timing.end)
        .map(|timing| timing.index)
}

/// Total narration length implied by the timings.
pub fn total_duration(timings: &[SegmentTiming]) -> f64 {
    timings.last().map(|timing| timing.end).unwrap_or(0.0)
}
