//! Application settings read from `config.toml`.
//!
//! Everything here has a sensible default, so the file is optional. The
//! session file (broker address, setpoints, log path) is separate and owned by
//! [`crate::persistence`].

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::mqtt::ProtocolVersion;
use crate::persistence::session_store::SESSION_FILE;

const CONFIG_DIR: &str = "mcuring";
const CONFIG_FILE: &str = "config.toml";

pub const SETPOINT_TOPIC: &str = "mcuring/setPoint";
pub const STATUS_TOPIC: &str = "mcuring/status";

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub client_id: String,
    pub setpoint_topic: String,
    pub status_topic: String,
    pub session_file: PathBuf,
    pub keep_alive_secs: u64,
    pub clean_session: bool,
    pub protocol_version: ProtocolVersion,
    /// Capacity of rumqttc's outgoing request queue
    pub request_capacity: usize,
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            client_id: "MeatCuringPanel".to_string(),
            setpoint_topic: SETPOINT_TOPIC.to_string(),
            status_topic: STATUS_TOPIC.to_string(),
            session_file: config_dir().join(SESSION_FILE),
            keep_alive_secs: 60,
            clean_session: true,
            protocol_version: ProtocolVersion::V3_1_1,
            request_capacity: 10,
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    pub fn default_path() -> PathBuf {
        config_dir().join(CONFIG_FILE)
    }

    /// Loads settings from `path`. A missing file yields the defaults; a file
    /// that exists but cannot be read or parsed is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;
        let config: AppConfig = toml::from_str(&content)
            .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

        debug!("Loaded config from {}: {:?}", path.display(), config);
        Ok(config)
    }

    pub fn tracing_level(&self) -> tracing::Level {
        match self.log_level.parse() {
            Ok(level) => level,
            Err(_) => {
                warn!("Unknown log level {:?}, falling back to info", self.log_level);
                tracing::Level::INFO
            }
        }
    }
}

fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| {
            warn!("Could not determine config directory, using current directory");
            PathBuf::from(".")
        })
        .join(CONFIG_DIR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(&dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.status_topic, "mcuring/status");
        assert_eq!(config.setpoint_topic, "mcuring/setPoint");
    }

    #[test]
    fn partial_file_overrides_only_given_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(
            &path,
            "client_id = \"chamber-2\"\nkeep_alive_secs = 30\nprotocol_version = \"V3_1\"\n",
        )
        .unwrap();

        let config = AppConfig::load(&path).unwrap();

        assert_eq!(config.client_id, "chamber-2");
        assert_eq!(config.keep_alive_secs, 30);
        assert_eq!(config.protocol_version, ProtocolVersion::V3_1);
        assert_eq!(config.status_topic, STATUS_TOPIC);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "keep_alive_secs = \"soon\"").unwrap();

        assert!(AppConfig::load(&path).is_err());
    }

    #[test]
    fn unknown_log_level_falls_back_to_info() {
        let config = AppConfig {
            log_level: "chatty".to_string(),
            ..AppConfig::default()
        };
        assert_eq!(config.tracing_level(), tracing::Level::INFO);

        let config = AppConfig {
            log_level: "debug".to_string(),
            ..AppConfig::default()
        };
        assert_eq!(config.tracing_level(), tracing::Level::DEBUG);
    }
}
