use anyhow::Result;
use clap::{CommandFactory, Parser};
use lisn::app::{run_play_command, run_status_command, run_topics_command, PlayOptions};
use lisn::cli::{Cli, Commands, ConfigAction};
use lisn::config::Config;
use lisn::error::LisnError;
use std::path::Path;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(url) = cli.api_url.clone() {
        config.api.base_url = url;
    }

    let outcome = match cli.command {
        Commands::Topics { query } => run_topics_command(config, &query, cli.token).await,
        Commands::Play {
            query,
            topics,
            duration,
            style,
            no_autoplay,
        } => {
            let mut options = PlayOptions::from_config(&config);
            options.topics = topics;
            if let Some(duration) = duration {
                options.duration_secs = duration;
            }
            if let Some(style) = style {
                options.style = style;
            }
            if no_autoplay {
                options.autoplay = false;
            }
            options.quiet = cli.quiet;
            options.verbosity = cli.verbose;
            run_play_command(config, &query, cli.token, options).await
        }
        Commands::Status { id } => run_status_command(config, id, cli.token).await,
        Commands::Config { action } => {
            handle_config_command(action, cli.config.as_deref())?;
            Ok(())
        }
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "lisn", &mut std::io::stdout());
            Ok(())
        }
    };

    if let Err(e) = outcome {
        if matches!(e, LisnError::AuthRequired) {
            eprintln!("lisn: authentication required");
            eprintln!("  Pass --token, set LISN_TOKEN, or add api.token to your config.");
            eprintln!("  Config file: {}", Config::default_path().display());
            std::process::exit(1);
        }
        return Err(e.into());
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default(&Config::default_path())?,
    };
    Ok(config.with_env_overrides())
}

fn handle_config_command(action: ConfigAction, path: Option<&Path>) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(path)?;
            print!("{}", config.to_toml()?);
        }
        ConfigAction::Init => {
            let target = path
                .map(Path::to_path_buf)
                .unwrap_or_else(Config::default_path);
            if target.exists() {
                eprintln!("Config already exists at {}", target.display());
                return Ok(());
            }
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&target, Config::default().to_toml()?)?;
            eprintln!("Wrote {}", target.display());
        }
    }
    Ok(())
}
