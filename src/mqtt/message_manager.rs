use chrono::{DateTime, Local};
use std::fmt;
use tokio::sync::mpsc;

use super::broker_session::{ConnectFailure, DisconnectReason};

/// A publish received from the broker on one of the subscribed topics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub received_at: DateTime<Local>,
}

impl fmt::Display for InboundMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let text = String::from_utf8_lossy(&self.payload);
        let preview: String = text.chars().take(40).collect();
        write!(
            f,
            "{} - {}: {}",
            self.received_at.format("%H:%M:%S"),
            self.topic,
            preview
        )
    }
}

impl InboundMessage {
    pub fn from_topic(topic: String, payload: Vec<u8>) -> Self {
        InboundMessage {
            topic,
            payload,
            received_at: Local::now(),
        }
    }
}

/// Everything the network task reports back to the owner of the session.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    Connected,
    ConnectFailed(ConnectFailure),
    Disconnected(DisconnectReason),
    Message(InboundMessage),
}

pub type EventSender = mpsc::UnboundedSender<SessionEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<SessionEvent>;

pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
