//! # Persistence Module
//!
//! Keeps the operator's session between runs: broker address, the last
//! setpoints that were applied and where the data log goes. The document is a
//! small JSON file read once at startup and written back on shutdown.
//!
//! ## Error Handling Strategy
//! Loading is fail-safe. A missing or unreadable file degrades to
//! [`SessionState::default`] so the panel always starts; see
//! [`session_store::SessionStore::load_or_default`]. Write failures are
//! reported to the caller, who is usually already terminating.

pub mod session_store;

use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::mqtt::config::DEFAULT_PORT;

pub use session_store::SessionStore;

/// Everything remembered from one session to the next.
///
/// Keys on disk keep the names the chamber tooling has always used. Missing
/// keys fall back to their defaults instead of failing the whole load.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct SessionState {
    #[serde(rename = "broker_ip")]
    pub broker_host: String,
    #[serde(rename = "broker_port")]
    pub broker_port: u16,
    #[serde(rename = "lastTmpSetPoint")]
    pub last_temp_setpoint: f64,
    #[serde(rename = "lastHumSetPoint")]
    pub last_humidity_setpoint: f64,
    #[serde(rename = "lastOpnHtnMde")]
    pub last_heating_mode: bool,
    /// `None` disables the CSV data log
    #[serde(
        rename = "log_path",
        skip_serializing_if = "Option::is_none",
        deserialize_with = "empty_path_as_none"
    )]
    pub log_file_path: Option<PathBuf>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            broker_host: String::new(),
            broker_port: DEFAULT_PORT,
            last_temp_setpoint: 0.0,
            last_humidity_setpoint: 0.0,
            last_heating_mode: false,
            log_file_path: None,
        }
    }
}

fn empty_path_as_none<'de, D>(deserializer: D) -> Result<Option<PathBuf>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw
        .map(|path| path.trim().to_string())
        .filter(|path| !path.is_empty())
        .map(PathBuf::from))
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Session file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Failed to read session file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse session file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize session: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to write session file {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
