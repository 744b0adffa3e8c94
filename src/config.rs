//! Application configuration with persistence.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mpv::{PlayerOptions, PollConfig, ReconnectPolicy};

const CONFIG_DIR: &str = "mpv-handler";
const CONFIG_FILE: &str = "config.json";

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("Failed to access config file: {0}")]
  Io(#[from] std::io::Error),
  #[error("Invalid config file: {0}")]
  Json(#[from] serde_json::Error),
  #[error("Invalid configuration: {0}")]
  Invalid(String),
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
  /// Custom MPV executable path (None = auto-detect).
  #[serde(default)]
  pub mpv_path: Option<String>,

  /// Additional MPV command-line arguments.
  #[serde(default)]
  pub mpv_args: Vec<String>,

  /// Server address on the local network.
  #[serde(default)]
  pub local_url: Option<String>,

  /// Public fallback server address.
  #[serde(default)]
  pub public_url: Option<String>,

  /// Reachability probe timeout in milliseconds.
  #[serde(default = "default_probe_timeout_ms")]
  pub probe_timeout_ms: u64,

  /// Delay between spawning MPV and connecting to its IPC endpoint.
  #[serde(default = "default_connect_delay_ms")]
  pub connect_delay_ms: u64,

  /// Playback position polling period in milliseconds.
  #[serde(default = "default_poll_interval_ms")]
  pub poll_interval_ms: u64,

  /// Behaviour when the IPC channel fails.
  #[serde(default)]
  pub reconnect: ReconnectPolicy,
}

fn default_probe_timeout_ms() -> u64 {
  1000
}

fn default_connect_delay_ms() -> u64 {
  500
}

fn default_poll_interval_ms() -> u64 {
  3000
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      mpv_path: None,
      mpv_args: Vec::new(),
      local_url: None,
      public_url: None,
      probe_timeout_ms: default_probe_timeout_ms(),
      connect_delay_ms: default_connect_delay_ms(),
      poll_interval_ms: default_poll_interval_ms(),
      reconnect: ReconnectPolicy::default(),
    }
  }
}

impl AppConfig {
  /// Default location: `<config dir>/mpv-handler/config.json`.
  pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
  }

  /// Load from `path`; a missing file yields the defaults.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let text = match std::fs::read_to_string(path) {
      Ok(text) => text,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        log::info!("No config at {}, using defaults", path.display());
        return Ok(Self::default());
      }
      Err(e) => return Err(e.into()),
    };

    let config: Self = serde_json::from_str(&text)?;
    config.validate().map_err(ConfigError::Invalid)?;
    log::info!("Loaded config from {}", path.display());
    Ok(config)
  }

  /// Write to `path`, creating parent directories as needed.
  pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
    self.validate().map_err(ConfigError::Invalid)?;
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(self)?)?;
    Ok(())
  }

  /// Validate configuration values.
  pub fn validate(&self) -> Result<(), String> {
    if self.probe_timeout_ms == 0 || self.probe_timeout_ms > 30_000 {
      return Err("Probe timeout must be between 1 and 30000 ms".to_string());
    }
    if self.connect_delay_ms > 10_000 {
      return Err("Connect delay must be at most 10000 ms".to_string());
    }
    if self.poll_interval_ms < 100 || self.poll_interval_ms > 60_000 {
      return Err("Poll interval must be between 100 and 60000 ms".to_string());
    }
    match self.reconnect {
      ReconnectPolicy::Fixed { max_attempts: 0, .. }
      | ReconnectPolicy::Backoff { max_attempts: 0, .. } => {
        return Err("Reconnect policy needs at least one attempt".to_string());
      }
      ReconnectPolicy::Backoff {
        initial_ms,
        max_delay_ms,
        ..
      } if initial_ms == 0 || max_delay_ms < initial_ms => {
        return Err("Backoff delays must be positive and ordered".to_string());
      }
      _ => {}
    }
    Ok(())
  }

  pub fn probe_timeout(&self) -> Duration {
    Duration::from_millis(self.probe_timeout_ms)
  }

  pub fn poll_config(&self) -> PollConfig {
    PollConfig {
      connect_delay: Duration::from_millis(self.connect_delay_ms),
      poll_interval: Duration::from_millis(self.poll_interval_ms),
      reconnect: self.reconnect,
    }
  }

  /// Configured MPV path, ignoring blank values.
  pub fn mpv_path(&self) -> Option<PathBuf> {
    self
      .mpv_path
      .as_ref()
      .filter(|s| !s.trim().is_empty())
      .map(PathBuf::from)
  }

  /// Player options for a resolved executable.
  pub fn player_options(&self, executable: PathBuf) -> PlayerOptions {
    PlayerOptions {
      executable,
      extra_args: self.mpv_args.clone(),
      poll: self.poll_config(),
    }
  }
}
