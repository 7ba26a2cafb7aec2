//! # MQTT Broker Session
//!
//! Owns the single connection between the panel and the curing chamber's MQTT
//! broker. Everything network-facing lives here; the rest of the crate only sees
//! typed [`SessionEvent`]s and the [`BrokerLink`]/[`Publisher`] traits.
//!
//! ## Module Layout
//!
//! ```text
//! mqtt/
//! ├── config.rs           - BrokerConfig and ProtocolVersion
//! ├── message_manager.rs  - Inbound messages and the session event channel
//! └── broker_session.rs   - Connection state machine on top of rumqttc
//! ```
//!
//! ## Threading
//!
//! rumqttc's event loop runs in its own tokio task for the lifetime of one
//! connection attempt. Lifecycle changes and received publishes cross back to
//! the controller through an unbounded mpsc channel, so the network task never
//! waits on the consumer. Connection state is published through a `watch`
//! channel and is only ever written by the session or its network task.
//!
//! All publishes and subscriptions use QoS 0 (at most once).

pub mod broker_session;
pub mod config;
pub mod message_manager;

pub use broker_session::{
    BrokerError, BrokerLink, BrokerSession, ConnectFailure, ConnectionState, DisconnectReason,
    Publisher,
};
pub use config::{BrokerConfig, ProtocolVersion};
pub use message_manager::{EventReceiver, InboundMessage, SessionEvent};
