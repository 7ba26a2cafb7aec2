use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_PORT: u16 = 1883;

/// MQTT protocol level requested for the broker connection.
///
/// rumqttc speaks 3.1.1 on the wire; `V3_1` is accepted so older session
/// settings keep loading, and is negotiated as 3.1.1.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ProtocolVersion {
    V3_1,
    #[default]
    V3_1_1,
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ProtocolVersion::V3_1 => write!(f, "3.1"),
            ProtocolVersion::V3_1_1 => write!(f, "3.1.1"),
        }
    }
}

/// Connection parameters for one broker session.
///
/// The network task takes its own copy when a connection attempt starts, so
/// edits made afterwards only apply to the next attempt.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub keep_alive_secs: u64,
    pub clean_session: bool,
    pub protocol_version: ProtocolVersion,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
            keep_alive_secs: 60,
            clean_session: true,
            protocol_version: ProtocolVersion::default(),
        }
    }
}

impl BrokerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host.trim(), self.port)
    }

    pub fn has_host(&self) -> bool {
        !self.host.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_targets_standard_port_without_host() {
        let config = BrokerConfig::default();
        assert_eq!(config.port, 1883);
        assert!(!config.has_host());
        assert_eq!(config.protocol_version, ProtocolVersion::V3_1_1);
    }

    #[test]
    fn whitespace_host_counts_as_missing() {
        let config = BrokerConfig {
            host: "   ".to_string(),
            ..BrokerConfig::default()
        };
        assert!(!config.has_host());
    }

    #[test]
    fn address_joins_host_and_port() {
        let config = BrokerConfig {
            host: "192.168.1.102".to_string(),
            ..BrokerConfig::default()
        };
        assert_eq!(config.address(), "192.168.1.102:1883");
    }
}
