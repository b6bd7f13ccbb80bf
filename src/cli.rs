//! Command-line interface for lisn
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Terminal player for generated audio stories
#[derive(Parser, Debug)]
#[command(name = "lisn", version, about = "Terminal player for generated audio stories")]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Backend base URL override
    #[arg(long, global = true, value_name = "URL")]
    pub api_url: Option<String>,

    /// Bearer token override (otherwise config / LISN_TOKEN)
    #[arg(long, global = true, value_name = "TOKEN")]
    pub token: Option<String>,

    /// Suppress output (quiet mode)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: stream/segment notices, -vv: per-segment progress)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Parse a narration duration string into seconds.
///
/// Supports any duration format accepted by `humantime`: bare numbers
/// (seconds), single-unit (`30s`, `5m`), and compound (`2m30s`).
pub fn parse_duration_secs(s: &str) -> Result<u32, String> {
    let s = s.trim();
    // Bare number → seconds
    if let Ok(secs) = s.parse::<u32>() {
        return Ok(secs);
    }
    humantime::parse_duration(s)
        .map(|d| d.as_secs() as u32)
        .map_err(|e| e.to_string())
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Discover sub-topics for a query
    Topics {
        /// What to listen to (e.g. "sachin tendulkar life story")
        query: String,
    },

    /// Discover, generate and play a narration
    Play {
        /// What to listen to
        query: String,

        /// Topic ids to include (comma-separated, default: all, capped at 8)
        #[arg(long, value_name = "IDS", value_delimiter = ',')]
        topics: Option<Vec<i64>>,

        /// Narration length (default from config). Examples: 180, 3m, 2m30s
        #[arg(long, value_name = "DURATION", value_parser = parse_duration_secs)]
        duration: Option<u32>,

        /// Narration style: raw, narrative, deep dive (default from config)
        #[arg(long, value_name = "STYLE")]
        style: Option<String>,

        /// Do not start playback automatically once the audio is ready
        #[arg(long)]
        no_autoplay: bool,
    },

    /// Show the current state of a generation job
    Status {
        /// Artifact id returned by generate
        id: i64,
    },

    /// View and modify configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Configuration management actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the active configuration as TOML
    Show,
    /// Write a default configuration file if none exists
    Init,
}
