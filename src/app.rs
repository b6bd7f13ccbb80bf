//! Application entry points: discover → generate → listen → play.
//!
//! Wires the API client, the fetch orchestrator and the transport together
//! the way the CLI commands need them.

use crate::api::client::ApiClient;
use crate::api::types::Topic;
use crate::api::StoryApi;
use crate::auth::{SharedTokenProvider, TokenProvider};
use crate::config::Config;
use crate::defaults;
use crate::error::{LisnError, Result};
use crate::output;
use crate::player::events::PlayerEvent;
use crate::player::orchestrator::Orchestrator;
use crate::player::Artifact;
use crossbeam_channel::Receiver;
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "playback")]
use crate::api::types::ArtifactStatus;
#[cfg(feature = "playback")]
use crate::player::backend::RodioBackend;
#[cfg(feature = "playback")]
use crate::player::transport::Transport;

/// Build the API client and token provider from config + CLI override.
pub fn build_client(config: &Config, token_override: Option<String>) -> (ApiClient, Arc<dyn TokenProvider>) {
    let initial = token_override.or_else(|| config.api.token.clone());
    let tokens: Arc<dyn TokenProvider> = Arc::new(SharedTokenProvider::new(initial));
    let client = ApiClient::new(&config.api.base_url, tokens.clone());
    (client, tokens)
}

/// Pick the topic ids to generate from.
///
/// With an explicit request every id must exist in the discovery; without
/// one, all discovered topics are taken. Either way the product cap of 8
/// applies.
pub fn choose_topic_ids(topics: &[Topic], requested: Option<&[i64]>) -> Result<Vec<i64>> {
    let mut ids: Vec<i64> = match requested {
        Some(requested) => {
            for id in requested {
                if !topics.iter().any(|topic| topic.id == *id) {
                    return Err(LisnError::Validation {
                        message: format!("topic id {id} is not part of this discovery"),
                    });
                }
            }
            requested.to_vec()
        }
        None => topics.iter().map(|topic| topic.id).collect(),
    };
    ids.truncate(defaults::MAX_SELECTED_TOPICS);
    Ok(ids)
}

/// Run the topics command: discover and list sub-topics.
pub async fn run_topics_command(config: Config, query: &str, token: Option<String>) -> Result<()> {
    let (client, _) = build_client(&config, token);
    let discovery = client.discover_topics(query).await?;

    println!("discovery {}: {}", discovery.id, discovery.user_query);
    for topic in &discovery.topics {
        println!("  {:>4}  {}", topic.id, topic.title);
    }
    Ok(())
}

/// Run the status command: one-shot artifact state.
pub async fn run_status_command(config: Config, id: i64, token: Option<String>) -> Result<()> {
    let (client, _) = build_client(&config, token);
    let artifact = Artifact::from(client.artifact(id).await?);

    println!(
        "artifact {}: {:?}{}",
        artifact.id,
        artifact.status,
        artifact
            .title
            .as_deref()
            .map(|t| format!(" ({t})"))
            .unwrap_or_default()
    );
    for segment in &artifact.segments {
        match segment.duration {
            Some(duration) => {
                println!("  {:>4}  {}  {}", segment.id, output::format_clock(duration), segment.title)
            }
            None => println!("  {:>4}  --:--  {}", segment.id, segment.title),
        }
    }
    Ok(())
}

/// Options for the play command, resolved from config + CLI.
#[derive(Debug, Clone)]
pub struct PlayOptions {
    pub topics: Option<Vec<i64>>,
    pub duration_secs: u32,
    pub style: String,
    pub autoplay: bool,
    pub quiet: bool,
    pub verbosity: u8,
}

impl PlayOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            topics: None,
            duration_secs: config.generation.duration_secs,
            style: config.generation.style.clone(),
            autoplay: config.playback.autoplay,
            quiet: false,
            verbosity: 0,
        }
    }
}

/// Run the play command: the full discover → generate → listen → play flow.
pub async fn run_play_command(
    config: Config,
    query: &str,
    token: Option<String>,
    options: PlayOptions,
) -> Result<()> {
    let (client, tokens) = build_client(&config, token);

    // Discover and select
    let discovery = client.discover_topics(query).await?;
    if discovery.topics.is_empty() {
        return Err(LisnError::Other(format!(
            "no topics discovered for '{query}'"
        )));
    }
    let ids = choose_topic_ids(&discovery.topics, options.topics.as_deref())?;
    if !options.quiet {
        eprintln!(
            "Generating from {} topic(s): {}",
            ids.len(),
            ids.iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    // Kick off generation
    let data = client
        .generate(discovery.id, &ids, options.duration_secs, &options.style)
        .await?;
    let artifact = Artifact::from(data);
    if !options.quiet {
        eprintln!("artifact {} accepted ({:?})", artifact.id, artifact.status);
    }

    // Follow progress until the final resource location is known
    let (event_tx, event_rx) = crossbeam_channel::unbounded();
    let api: Arc<dyn StoryApi> = Arc::new(client.clone());
    let mut orchestrator = Orchestrator::new(api, tokens, event_tx.clone());

    let url = wait_for_resource(
        &mut orchestrator,
        artifact.clone(),
        &event_rx,
        options.quiet,
        options.verbosity,
    )
    .await?;

    let outcome = deliver_resource(
        &url,
        artifact,
        &mut orchestrator,
        event_tx,
        &event_rx,
        &config,
        &options,
    )
    .await;
    orchestrator.shutdown();
    outcome
}

/// Hand the fetched resource to the transport and run the session.
#[cfg(feature = "playback")]
async fn deliver_resource(
    url: &str,
    artifact: Artifact,
    orchestrator: &mut Orchestrator,
    event_tx: crossbeam_channel::Sender<PlayerEvent>,
    event_rx: &Receiver<PlayerEvent>,
    config: &Config,
    options: &PlayOptions,
) -> Result<()> {
    // Re-fetch for final segment durations; fall back to what we have.
    let artifact = orchestrator.refresh(artifact.id).await.unwrap_or(artifact);
    play_resource(url, &artifact, event_tx, event_rx, config, options).await
}

/// Without audio output, the resource location is the deliverable.
#[cfg(not(feature = "playback"))]
async fn deliver_resource(
    url: &str,
    _artifact: Artifact,
    _orchestrator: &mut Orchestrator,
    _event_tx: crossbeam_channel::Sender<PlayerEvent>,
    _event_rx: &Receiver<PlayerEvent>,
    _config: &Config,
    _options: &PlayOptions,
) -> Result<()> {
    println!("{url}");
    Ok(())
}

/// Drive the orchestrator until it produces the resource location.
async fn wait_for_resource(
    orchestrator: &mut Orchestrator,
    artifact: Artifact,
    event_rx: &Receiver<PlayerEvent>,
    quiet: bool,
    verbosity: u8,
) -> Result<String> {
    let artifact_id = artifact.id;
    if let Some(url) = orchestrator.on_artifact_changed(&artifact).await? {
        return Ok(url);
    }
    if artifact.status.is_terminal() {
        // Error status: the failure event is already on the channel.
        drain_events(event_rx, quiet, verbosity);
        return Err(LisnError::Other("generation failed".to_string()));
    }

    loop {
        while let Ok(event) = event_rx.try_recv() {
            if !quiet {
                output::render_event(&event, verbosity);
            }
            match event {
                PlayerEvent::GenerationDone => {
                    let refreshed = orchestrator.refresh(artifact_id).await?;
                    if let Some(url) = orchestrator.on_artifact_changed(&refreshed).await? {
                        return Ok(url);
                    }
                    if refreshed.status.is_terminal() {
                        return Err(LisnError::Other("generation failed".to_string()));
                    }
                }
                PlayerEvent::GenerationFailed { message } => {
                    return Err(LisnError::Other(message));
                }
                _ => {}
            }
        }
        tokio::time::sleep(Duration::from_millis(defaults::TICK_INTERVAL_MS)).await;
    }
}

fn drain_events(event_rx: &Receiver<PlayerEvent>, quiet: bool, verbosity: u8) {
    while let Ok(event) = event_rx.try_recv() {
        if !quiet {
            output::render_event(&event, verbosity);
        }
    }
}

/// Interactive commands for the transport loop.
///
/// Returns false when the session should end.
#[cfg(feature = "playback")]
pub fn handle_command(line: &str, transport: &mut Transport, skip_seconds: f64) -> bool {
    let line = line.trim();
    match line {
        "q" | "quit" => return false,
        "" | "p" => transport.toggle_play_pause(),
        "." => {
            if let Err(e) = transport.skip_by(skip_seconds) {
                eprintln!("lisn: {e}");
            }
        }
        "," => {
            if let Err(e) = transport.skip_by(-skip_seconds) {
                eprintln!("lisn: {e}");
            }
        }
        _ => {
            if let Ok(index) = line.parse::<usize>() {
                if index == 0 {
                    eprintln!("lisn: segments are numbered from 1");
                } else if let Err(e) = transport.select_segment(index - 1) {
                    eprintln!("lisn: {e}");
                }
            } else if let Some(rest) = line.strip_prefix("s ") {
                match rest.trim().parse::<f64>() {
                    Ok(seconds) => {
                        if let Err(e) = transport.seek(seconds) {
                            eprintln!("lisn: {e}");
                        }
                    }
                    Err(_) => eprintln!("lisn: usage: s <seconds>"),
                }
            } else {
                eprintln!("lisn: p=play/pause  ,/.=skip ±15s  1-8=segment  s <secs>=seek  q=quit");
            }
        }
    }
    true
}

/// Download the resource and run the interactive transport loop.
#[cfg(feature = "playback")]
async fn play_resource(
    url: &str,
    artifact: &Artifact,
    event_tx: crossbeam_channel::Sender<PlayerEvent>,
    event_rx: &Receiver<PlayerEvent>,
    config: &Config,
    options: &PlayOptions,
) -> Result<()> {
    let audio_path = download_resource(url, options.quiet).await?;

    let backend = RodioBackend::new()?;
    let mut transport = Transport::new(Box::new(backend))
        .with_autoplay(options.autoplay)
        .with_event_sender(event_tx);
    transport.set_segments(artifact.segments.clone(), ArtifactStatus::Done);
    transport.load(&audio_path.to_string_lossy())?;

    if !options.quiet {
        if let Some(title) = artifact.title.as_deref() {
            eprintln!("Listening to: {title}");
        }
        for (index, segment) in artifact.segments.iter().enumerate() {
            eprintln!("  {}  {}", index + 1, segment.title);
        }
        eprintln!("p=play/pause  ,/.=skip ±15s  1-8=segment  s <secs>=seek  q=quit");
    }

    let keys = spawn_stdin_reader();
    loop {
        let mut keep_going = true;
        while let Ok(line) = keys.try_recv() {
            if !handle_command(&line, &mut transport, config.playback.skip_seconds) {
                keep_going = false;
            }
        }
        if !keep_going {
            break;
        }

        while let Ok(event) = event_rx.try_recv() {
            if !options.quiet {
                output::render_event(&event, options.verbosity);
            }
        }

        transport.poll();

        if !options.quiet {
            let snapshot = transport.snapshot();
            let segment_title = snapshot
                .current_segment
                .and_then(|index| artifact.segments.get(index))
                .map(|segment| segment.title.as_str());
            eprint!("\r\x1b[2K{}", output::format_status_line(&snapshot, segment_title));
            use std::io::Write;
            std::io::stderr().flush().ok();
        }

        tokio::time::sleep(Duration::from_millis(defaults::TICK_INTERVAL_MS)).await;
    }

    output::clear_line();
    transport.reset();
    Ok(())
}

/// Stream the final audio to a temp file so the decoder can seek in it.
#[cfg(feature = "playback")]
async fn download_resource(url: &str, quiet: bool) -> Result<tempfile::TempPath> {
    use futures_util::StreamExt;
    use indicatif::{ProgressBar, ProgressStyle};
    use std::io::Write;

    let response = reqwest::get(url).await.map_err(LisnError::from_request)?;
    if !response.status().is_success() {
        return Err(LisnError::from_status(
            response.status().as_u16(),
            "audio download failed".to_string(),
        ));
    }

    let total_size = response.content_length().unwrap_or(0);
    let pb = if !quiet && total_size > 0 {
        let pb = ProgressBar::new(total_size);
        pb.set_style(
            // SAFETY: hardcoded template string — always valid
            #[allow(clippy::expect_used)]
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
                .expect("hardcoded progress bar template")
                .progress_chars("#>-"),
        );
        Some(pb)
    } else {
        None
    };

    let mut file = tempfile::Builder::new()
        .prefix("lisn-")
        .suffix(".mp3")
        .tempfile()?;

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(LisnError::from_request)?;
        file.write_all(&chunk)?;
        if let Some(ref pb) = pb {
            pb.inc(chunk.len() as u64);
        }
    }
    file.flush()?;

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    Ok(file.into_temp_path())
}

/// Forward stdin lines to a channel the tick loop can poll.
#[cfg(feature = "playback")]
fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = crossbeam_channel::unbounded();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in std::io::BufRead::lines(stdin.lock()) {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topic(id: i64) -> Topic {
        Topic {
            id,
            title: format!("topic {id}"),
            topic_discovery_id: 1,
            duration: None,
            audio_byte_id: None,
            content: None,
        }
    }

    #[test]
    fn test_choose_topic_ids_defaults_to_all() {
        let topics: Vec<Topic> = (1..=3).map(topic).collect();
        assert_eq!(choose_topic_ids(&topics, None).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_choose_topic_ids_caps_at_eight() {
        let topics: Vec<Topic> = (1..=12).map(topic).collect();
        let ids = choose_topic_ids(&topics, None).unwrap();
        assert_eq!(ids.len(), 8);
        assert_eq!(ids, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_choose_topic_ids_honors_explicit_selection() {
        let topics: Vec<Topic> = (1..=5).map(topic).collect();
        assert_eq!(
            choose_topic_ids(&topics, Some(&[4, 2])).unwrap(),
            vec![4, 2]
        );
    }

    #[test]
    fn test_choose_topic_ids_rejects_unknown_id() {
        let topics: Vec<Topic> = (1..=3).map(topic).collect();
        let err = choose_topic_ids(&topics, Some(&[9])).unwrap_err();
        assert!(matches!(err, LisnError::Validation { .. }));
    }

    #[test]
    fn test_build_client_prefers_cli_token() {
        let config = Config {
            api: crate::config::ApiConfig {
                base_url: "https://api.example.com".to_string(),
                token: Some("config-token".to_string()),
            },
            ..Default::default()
        };

        let (_, tokens) = build_client(&config, Some("cli-token".to_string()));
        assert_eq!(tokens.token().as_deref(), Some("cli-token"));

        let (_, tokens) = build_client(&config, None);
        assert_eq!(tokens.token().as_deref(), Some("config-token"));
    }

    #[cfg(feature = "playback")]
    mod playback {
        use super::super::*;
        use crate::player::backend::MockMediaBackend;
        use crate::player::Segment;

        fn ready_transport() -> (Transport, MockMediaBackend) {
            let backend = MockMediaBackend::new().with_duration(95.0);
            let mut transport = Transport::new(Box::new(backend.clone()));
            transport.set_segments(
                vec![
                    Segment {
                        id: 1,
                        title: "A".to_string(),
                        duration: Some(30.0),
                    },
                    Segment {
                        id: 2,
                        title: "B".to_string(),
                        duration: Some(65.0),
                    },
                ],
                ArtifactStatus::Done,
            );
            transport.load("story.mp3").unwrap();
            (transport, backend)
        }

        #[test]
        fn test_handle_command_quit() {
            let (mut transport, _) = ready_transport();
            assert!(!handle_command("q", &mut transport, 15.0));
            assert!(!handle_command("quit", &mut transport, 15.0));
        }

        #[test]
        fn test_handle_command_toggle_and_skip() {
            let (mut transport, _) = ready_transport();

            assert!(handle_command("p", &mut transport, 15.0));
            assert!(transport.is_playing());

            assert!(handle_command(".", &mut transport, 15.0));
            assert_eq!(transport.snapshot().displayed_time, 15.0);

            assert!(handle_command(",", &mut transport, 15.0));
            assert_eq!(transport.snapshot().displayed_time, 0.0);
        }

        #[test]
        fn test_handle_command_segment_selection_is_one_based() {
            let (mut transport, _) = ready_transport();
            assert!(handle_command("2", &mut transport, 15.0));
            assert_eq!(transport.snapshot().displayed_time, 30.0);
        }

        #[test]
        fn test_handle_command_seek() {
            let (mut transport, _) = ready_transport();
            assert!(handle_command("s 42.5", &mut transport, 15.0));
            assert_eq!(transport.snapshot().displayed_time, 42.5);
        }

        #[test]
        fn test_handle_command_unknown_input_keeps_running() {
            let (mut transport, _) = ready_transport();
            assert!(handle_command("wat", &mut transport, 15.0));
        }
    }
}
