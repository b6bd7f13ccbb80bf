use crate::defaults;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub generation: GenerationConfig,
    pub playback: PlaybackConfig,
}

/// Backend API configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub token: Option<String>,
}

/// Narration generation configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationConfig {
    pub duration_secs: u32,
    pub style: String,
}

/// Player behavior configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlaybackConfig {
    pub skip_seconds: f64,
    pub autoplay: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            token: None,
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            duration_secs: defaults::DEFAULT_DURATION_SECS,
            style: defaults::DEFAULT_STYLE.to_string(),
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            skip_seconds: defaults::SKIP_SECONDS,
            autoplay: true,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e) => {
                if e.downcast_ref::<std::io::Error>()
                    .map(|io_err| io_err.kind() == std::io::ErrorKind::NotFound)
                    .unwrap_or(false)
                {
                    Ok(Self::default())
                } else {
                    Err(e)
                }
            }
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - LISN_API_URL → api.base_url
    /// - LISN_TOKEN → api.token
    /// - LISN_STYLE → generation.style
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("LISN_API_URL")
            && !url.is_empty()
        {
            self.api.base_url = url;
        }

        if let Ok(token) = std::env::var("LISN_TOKEN")
            && !token.is_empty()
        {
            self.api.token = Some(token);
        }

        if let Ok(style) = std::env::var("LISN_STYLE")
            && !style.is_empty()
        {
            self.generation.style = style;
        }

        self
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/lisn/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join("lisn")
            .join("config.toml")
    }

    /// Serialize the configuration to TOML.
    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
