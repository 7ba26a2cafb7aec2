//! Setpoint commands sent to the chamber controller on `mcuring/setPoint`.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::mqtt::Publisher;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("Setpoints must be finite numbers")]
    NonFinite,
}

/// Target climate requested by the operator.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct SetpointCommand {
    #[serde(rename = "tmpSetPoint")]
    pub temperature: f64,
    #[serde(rename = "humSetPoint")]
    pub humidity: f64,
    #[serde(rename = "opnHtnMde")]
    pub heating_mode: bool,
}

impl SetpointCommand {
    pub fn new(temperature: f64, humidity: f64, heating_mode: bool) -> Result<Self, CommandError> {
        if !temperature.is_finite() || !humidity.is_finite() {
            return Err(CommandError::NonFinite);
        }
        Ok(Self {
            temperature,
            humidity,
            heating_mode,
        })
    }
}

/// Serializes a command into the wire format.
///
/// Keys are emitted in declaration order, so equal commands always produce
/// identical payloads.
pub fn build_payload(command: &SetpointCommand) -> String {
    // A struct of two f64 and a bool cannot fail to serialize; non-finite
    // values are kept out by `SetpointCommand::new` and render as null otherwise.
    serde_json::to_string(command).unwrap_or_default()
}

/// Publishes `command` on `topic`. Nothing is retried and failures stay silent.
pub fn publish_command<P: Publisher + ?Sized>(
    publisher: &P,
    topic: &str,
    command: &SetpointCommand,
) {
    let payload = build_payload(command);
    info!("Sending setpoint {} to {}", payload, topic);
    publisher.publish(topic, payload.into_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingPublisher {
        sent: RefCell<Vec<(String, Vec<u8>)>>,
    }

    impl Publisher for RecordingPublisher {
        fn publish(&self, topic: &str, payload: Vec<u8>) {
            self.sent.borrow_mut().push((topic.to_string(), payload));
        }
    }

    #[test]
    fn payload_uses_wire_keys() {
        let command = SetpointCommand::new(12.5, 80.0, true).unwrap();
        assert_eq!(
            build_payload(&command),
            r#"{"tmpSetPoint":12.5,"humSetPoint":80.0,"opnHtnMde":true}"#
        );
    }

    #[test]
    fn payload_parses_back_to_same_command() {
        let cases = [(12.5, 80.0, true), (-3.25, 0.0, false), (45.32, 68.02, true)];
        for (temp, hum, heating) in cases {
            let command = SetpointCommand::new(temp, hum, heating).unwrap();
            let parsed: serde_json::Value =
                serde_json::from_str(&build_payload(&command)).unwrap();

            assert_eq!(parsed["tmpSetPoint"].as_f64(), Some(temp));
            assert_eq!(parsed["humSetPoint"].as_f64(), Some(hum));
            assert_eq!(parsed["opnHtnMde"].as_bool(), Some(heating));
        }
    }

    #[test]
    fn payload_is_deterministic() {
        let a = SetpointCommand::new(10.0, 75.5, false).unwrap();
        let b = SetpointCommand::new(10.0, 75.5, false).unwrap();
        assert_eq!(build_payload(&a), build_payload(&b));
    }

    #[test]
    fn non_finite_setpoints_are_rejected() {
        assert_eq!(
            SetpointCommand::new(f64::NAN, 50.0, false),
            Err(CommandError::NonFinite)
        );
        assert_eq!(
            SetpointCommand::new(10.0, f64::INFINITY, false),
            Err(CommandError::NonFinite)
        );
    }

    #[test]
    fn publish_command_sends_payload_on_topic() {
        let publisher = RecordingPublisher::default();
        let command = SetpointCommand::new(14.0, 78.0, false).unwrap();

        publish_command(&publisher, "mcuring/setPoint", &command);

        let sent = publisher.sent.borrow();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "mcuring/setPoint");
        assert_eq!(sent[0].1, build_payload(&command).into_bytes());
    }
}
