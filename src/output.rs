//! Shared event rendering for terminal output.
//! Used by the interactive player and the one-shot status command.

use crate::player::events::PlayerEvent;
use crate::player::progress::ArtifactProgress;
use crate::player::transport::PlaybackState;
use std::io::{self, Write};

const DIM: &str = "\x1b[2m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

/// Clear the current terminal line (replaces the status line etc.)
pub fn clear_line() {
    eprint!("\r\x1b[2K");
}

/// Format seconds as `MM:SS` for the elapsed/remaining labels.
///
/// Negative and non-finite inputs render as zero; hours spill into the
/// minutes field (a narration capped at a few minutes never needs more).
pub fn format_clock(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.round() as u64
    } else {
        0
    };
    format!("{:02}:{:02}", total / 60, total % 60)
}

/// One-line transport status: elapsed, remaining, play state, segment.
pub fn format_status_line(snapshot: &PlaybackState, segment_title: Option<&str>) -> String {
    let marker = if snapshot.is_playing { "▶" } else { "⏸" };
    let remaining = (snapshot.total_duration - snapshot.displayed_time).max(0.0);
    let segment = segment_title
        .map(|title| format!("  {DIM}{title}{RESET}"))
        .unwrap_or_default();
    format!(
        "{marker} {} {DIM}-{}{RESET}{segment}",
        format_clock(snapshot.displayed_time),
        format_clock(remaining),
    )
}

/// Generation progress summary while an artifact is processing.
pub fn format_progress_line(progress: &ArtifactProgress) -> String {
    let title = progress
        .title
        .as_deref()
        .map(|t| format!("  {DIM}{t}{RESET}"))
        .unwrap_or_default();
    format!("Generating… {:>3.0}%{title}", progress.overall_percent)
}

/// Render a player event to stderr.
pub fn render_event(event: &PlayerEvent, verbosity: u8) {
    match event {
        PlayerEvent::OverallProgress { percent } => {
            eprint!("\r\x1b[2KGenerating… {percent:>3.0}%");
            io::stderr().flush().ok();
        }
        PlayerEvent::SegmentProgress {
            segment_id,
            percent,
        } => {
            if verbosity >= 2 {
                clear_line();
                eprintln!("{DIM}segment {segment_id}: {percent:.0}%{RESET}");
            }
        }
        PlayerEvent::TitleChanged { title } => {
            clear_line();
            eprintln!("Listening to: {title}");
        }
        PlayerEvent::GenerationDone => {
            clear_line();
            eprintln!("Generation complete.");
        }
        PlayerEvent::GenerationFailed { message } => {
            clear_line();
            eprintln!("{RED}Generation failed:{RESET} {message}");
        }
        PlayerEvent::StreamInterrupted { message } => {
            if verbosity >= 1 {
                clear_line();
                eprintln!("{DIM}progress stream lost ({message}), checking status…{RESET}");
            }
        }
        PlayerEvent::SegmentChanged { index } => {
            if verbosity >= 1 {
                clear_line();
                eprintln!("{DIM}now playing segment {}{RESET}", index + 1);
            }
        }
        PlayerEvent::PlaybackError { message } => {
            clear_line();
            eprintln!("{RED}Playback error:{RESET} {message}");
        }
    }
}
