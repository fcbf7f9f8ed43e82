//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/tidechat/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/tidechat/` (~/.config/tidechat/)
//! - State/Logs: `$XDG_STATE_HOME/tidechat/` (~/.local/state/tidechat/)
//!
//! `TIDECHAT_API_URL` and `TIDECHAT_API_TOKEN` override the `[server]` table.

use crate::error::{Error, Result};
use crate::playback::RevealMode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding `server.base_url`
pub const ENV_API_URL: &str = "TIDECHAT_API_URL";
/// Environment variable overriding `server.api_token`
pub const ENV_API_TOKEN: &str = "TIDECHAT_API_TOKEN";

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Backend connection settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Paced reveal of streamed text
    #[serde(default)]
    pub playback: PlaybackConfig,

    /// Attachment staging policy
    #[serde(default)]
    pub attachments: AttachmentConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Backend connection settings
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Base URL of the chat backend
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer token sent with every request (optional)
    pub api_token: Option<String>,

    /// TCP connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Timeout for plain request/response calls in seconds.
    /// The response stream itself is never subject to a timeout.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_token: None,
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    30
}

/// Playback scheduler configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlaybackConfig {
    /// Reveal unit: characters or words
    #[serde(default)]
    pub mode: RevealMode,

    /// Characters per second in `chars` mode
    #[serde(default = "default_char_rate")]
    pub char_rate: f64,

    /// Words per second in `words` mode
    #[serde(default = "default_word_rate")]
    pub word_rate: f64,

    /// Playback clock interval in milliseconds
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            mode: RevealMode::default(),
            char_rate: default_char_rate(),
            word_rate: default_word_rate(),
            tick_ms: default_tick_ms(),
        }
    }
}

impl PlaybackConfig {
    /// Reveal rate for the configured mode, in units per second
    pub fn rate(&self) -> f64 {
        match self.mode {
            RevealMode::Chars => self.char_rate,
            RevealMode::Words => self.word_rate,
        }
    }

    /// Playback clock interval
    pub fn tick_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.tick_ms)
    }
}

fn default_char_rate() -> f64 {
    60.0
}

fn default_word_rate() -> f64 {
    20.0
}

fn default_tick_ms() -> u64 {
    33
}

/// Attachment staging limits
#[derive(Debug, Clone, Deserialize)]
pub struct AttachmentConfig {
    /// Maximum number of staged files per prompt
    #[serde(default = "default_max_files")]
    pub max_files: usize,

    /// Maximum size of a single file in MiB
    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: u64,
}

impl Default for AttachmentConfig {
    fn default() -> Self {
        Self {
            max_files: default_max_files(),
            max_file_size_mb: default_max_file_size_mb(),
        }
    }
}

fn default_max_files() -> usize {
    5
}

fn default_max_file_size_mb() -> u64 {
    20
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path, then apply env overrides
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        let mut config = if config_path.exists() {
            Self::load_from(&config_path)?
        } else {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            Config::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(ENV_API_URL) {
            if !url.trim().is_empty() {
                self.server.base_url = url;
            }
        }
        if let Ok(token) = std::env::var(ENV_API_TOKEN) {
            if !token.trim().is_empty() {
                self.server.api_token = Some(token);
            }
        }
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        let url = self.server.base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "server.base_url must be an http(s) URL, got {:?}",
                self.server.base_url
            )));
        }
        if !(self.playback.char_rate > 0.0 && self.playback.word_rate > 0.0) {
            return Err(Error::Config(
                "playback.char_rate and playback.word_rate must be positive".to_string(),
            ));
        }
        if self.playback.tick_ms == 0 {
            return Err(Error::Config(
                "playback.tick_ms must be greater than zero".to_string(),
            ));
        }
        if self.attachments.max_files == 0 {
            return Err(Error::Config(
                "attachments.max_files must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/tidechat/config.toml` (~/.config/tidechat/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("tidechat").join("config.toml")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/tidechat/` (~/.local/state/tidechat/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("tidechat")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/tidechat/tidechat.log` (~/.local/state/tidechat/tidechat.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("tidechat.log")
    }
}
