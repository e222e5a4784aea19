//! Configuration persistence
//!
//! TOML-based settings for the signaling client. The default file lives in
//! the platform configuration directory:
//! - Linux: ~/.config/callsignal/config.toml
//! - Windows: %APPDATA%\callsignal\config.toml
//! - macOS: ~/Library/Application Support/callsignal/config.toml

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::network::{
    NetworkQualityMonitor, ReconnectPolicy, TransportConfig, DEFAULT_HUB_PATH,
    DEFAULT_RECONNECT_DELAYS_MS,
};

/// Application name used for configuration directory
const APP_NAME: &str = "callsignal";

const DEFAULT_SERVER_URL: &str = "ws://127.0.0.1:8080";
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 15_000;
const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 30_000;
const DEFAULT_QUALITY_SAMPLE_INTERVAL_MS: u64 = 2_000;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write config file {path:?}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Signaling client configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignalingConfig {
    /// Relay base URL. Must start with ws:// or wss://
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Hub path appended to the server URL
    #[serde(default = "default_hub_path")]
    pub hub_path: String,

    /// Wait before each reconnect attempt; the last entry repeats
    #[serde(default = "default_reconnect_delays")]
    pub reconnect_delays_ms: Vec<u64>,

    /// Give up after this many failed attempts (None = retry forever)
    #[serde(default)]
    pub max_reconnect_attempts: Option<u32>,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_ms: u64,

    #[serde(default = "default_quality_sample_interval")]
    pub quality_sample_interval_ms: u64,
}

fn default_server_url() -> String {
    DEFAULT_SERVER_URL.to_string()
}

fn default_hub_path() -> String {
    DEFAULT_HUB_PATH.to_string()
}

fn default_reconnect_delays() -> Vec<u64> {
    DEFAULT_RECONNECT_DELAYS_MS.to_vec()
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

fn default_heartbeat_interval() -> u64 {
    DEFAULT_HEARTBEAT_INTERVAL_MS
}

fn default_quality_sample_interval() -> u64 {
    DEFAULT_QUALITY_SAMPLE_INTERVAL_MS
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            hub_path: default_hub_path(),
            reconnect_delays_ms: default_reconnect_delays(),
            max_reconnect_attempts: None,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
            quality_sample_interval_ms: DEFAULT_QUALITY_SAMPLE_INTERVAL_MS,
        }
    }
}

impl SignalingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.server_url.starts_with("ws://") && !self.server_url.starts_with("wss://") {
            return Err(ConfigError::Invalid(format!(
                "server_url {} must start with ws:// or wss://",
                self.server_url
            )));
        }

        if self.reconnect_delays_ms.is_empty() {
            return Err(ConfigError::Invalid(
                "reconnect_delays_ms must not be empty".to_string(),
            ));
        }

        for (name, value) in [
            ("request_timeout_ms", self.request_timeout_ms),
            ("heartbeat_interval_ms", self.heartbeat_interval_ms),
            ("quality_sample_interval_ms", self.quality_sample_interval_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{} must be positive", name)));
            }
        }

        Ok(())
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            server_url: self.server_url.clone(),
            hub_path: self.hub_path.clone(),
            reconnect: ReconnectPolicy::from_millis(
                &self.reconnect_delays_ms,
                self.max_reconnect_attempts,
            ),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
        }
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn quality_sample_interval(&self) -> Duration {
        Duration::from_millis(self.quality_sample_interval_ms)
    }

    /// Quality monitor sampling at the configured interval, stopped when
    /// `owner` is cancelled
    pub fn quality_monitor(&self, owner: CancellationToken) -> NetworkQualityMonitor {
        NetworkQualityMonitor::with_owner(self.quality_sample_interval(), owner)
    }
}

/// Default configuration file path
///
/// Returns None if the configuration directory cannot be determined.
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Load and validate a configuration file
pub fn load_config(path: &Path) -> Result<SignalingConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let config: SignalingConfig = toml::from_str(&content)?;
    config.validate()?;

    Ok(config)
}

/// Load the default configuration file, falling back to defaults when it
/// does not exist
pub fn load_default_config() -> Result<SignalingConfig, ConfigError> {
    let path = default_config_path().ok_or(ConfigError::NoConfigDir)?;
    if !path.exists() {
        return Ok(SignalingConfig::default());
    }
    load_config(&path)
}

/// Save configuration, creating the parent directory if needed
pub fn save_config(config: &SignalingConfig, path: &Path) -> Result<(), ConfigError> {
    config.validate()?;

    if let Some(dir) = path.parent() {
        if !dir.exists() {
            fs::create_dir_all(dir).map_err(|source| ConfigError::Write {
                path: dir.to_path_buf(),
                source,
            })?;
        }
    }

    let content = toml::to_string_pretty(config)?;
    fs::write(path, content).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::MonitorState;

    #[test]
    fn test_default_config() {
        let config = SignalingConfig::default();
        assert_eq!(config.hub_path, "/hubs/videocall");
        assert_eq!(config.reconnect_delays_ms, vec![0, 2_000, 5_000, 10_000, 30_000]);
        assert_eq!(config.max_reconnect_attempts, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_invalid_url() {
        let config = SignalingConfig {
            server_url: "http://example.com".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_config_validation_empty_delays() {
        let config = SignalingConfig {
            reconnect_delays_ms: vec![],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_zero_interval() {
        let config = SignalingConfig {
            heartbeat_interval_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_deserialization_with_defaults() {
        let toml_str = r#"
            server_url = "wss://relay.example.com"
            max_reconnect_attempts = 4
        "#;

        let config: SignalingConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server_url, "wss://relay.example.com");
        assert_eq!(config.max_reconnect_attempts, Some(4));
        assert_eq!(config.request_timeout_ms, 15_000);
        assert_eq!(config.quality_sample_interval(), Duration::from_secs(2));
    }

    #[test]
    fn test_quality_monitor_uses_interval() {
        let config = SignalingConfig {
            quality_sample_interval_ms: 500,
            ..Default::default()
        };
        let monitor = config.quality_monitor(CancellationToken::new());
        assert_eq!(monitor.period(), Duration::from_millis(500));
        assert_eq!(monitor.state(), MonitorState::Idle);
    }

    #[test]
    fn test_transport_config_carries_policy() {
        let config = SignalingConfig {
            reconnect_delays_ms: vec![100, 200],
            max_reconnect_attempts: Some(2),
            ..Default::default()
        };
        let transport = config.transport_config();
        assert_eq!(transport.reconnect.delay_for(7), Duration::from_millis(200));
        assert_eq!(transport.reconnect.next_delay(2), None);
    }

    #[test]
    fn test_save_and_load() {
        let dir = std::env::temp_dir().join(format!("callsignal-test-{}", uuid::Uuid::new_v4()));
        let path = dir.join("config.toml");
        let config = SignalingConfig {
            server_url: "wss://relay.example.com".to_string(),
            heartbeat_interval_ms: 5_000,
            ..Default::default()
        };

        save_config(&config, &path).unwrap();
        let loaded = load_config(&path).unwrap();
        let _ = fs::remove_dir_all(&dir);

        assert_eq!(loaded, config);
    }
}
