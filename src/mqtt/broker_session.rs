use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions, Outgoing,
    Packet, QoS,
};
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::config::{BrokerConfig, ProtocolVersion};
use super::message_manager::{
    event_channel, EventReceiver, EventSender, InboundMessage, SessionEvent,
};

const DEFAULT_REQUEST_CAPACITY: usize = 10;
const FALLBACK_CLIENT_ID: &str = "mcuring";

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}

/// Why a connection attempt never reached `Connected`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectFailure {
    /// The transport gave up waiting for the broker.
    Timeout,
    /// The broker answered CONNACK with a non-success return code.
    Refused(String),
    Io(String),
    Protocol(String),
}

impl fmt::Display for ConnectFailure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConnectFailure::Timeout => write!(f, "timed out"),
            ConnectFailure::Refused(code) => write!(f, "refused by broker ({})", code),
            ConnectFailure::Io(e) => write!(f, "network error: {}", e),
            ConnectFailure::Protocol(e) => write!(f, "protocol error: {}", e),
        }
    }
}

impl From<&ConnectionError> for ConnectFailure {
    fn from(err: &ConnectionError) -> Self {
        match err {
            ConnectionError::NetworkTimeout => ConnectFailure::Timeout,
            ConnectionError::ConnectionRefused(code) => {
                ConnectFailure::Refused(format!("{:?}", code))
            }
            ConnectionError::Io(e) => ConnectFailure::Io(e.to_string()),
            other => ConnectFailure::Protocol(other.to_string()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DisconnectReason {
    Requested,
    ConnectionLost(String),
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DisconnectReason::Requested => write!(f, "closed on request"),
            DisconnectReason::ConnectionLost(e) => write!(f, "connection lost: {}", e),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BrokerError {
    #[error("Invalid broker configuration: {0}")]
    InvalidConfig(String),

    #[error("Connection failed: {0}")]
    ConnectFailed(ConnectFailure),
}

/// Outbound half of a broker connection.
pub trait Publisher {
    /// Fire-and-forget publish at QoS 0. Delivery failures are never surfaced.
    fn publish(&self, topic: &str, payload: Vec<u8>);
}

/// The connection operations the session controller drives.
pub trait BrokerLink: Publisher {
    fn configure(
        &mut self,
        host: &str,
        port: u16,
        keep_alive_secs: u64,
        clean_session: bool,
        protocol_version: ProtocolVersion,
    ) -> bool;
    fn connect(&mut self) -> Result<(), BrokerError>;
    fn disconnect(&mut self);
    fn subscribe(&mut self, topic: &str) -> bool;
    fn state(&self) -> ConnectionState;
    fn config(&self) -> &BrokerConfig;
}

/// Client half of a live connection attempt.
struct Link {
    client: AsyncClient,
    cancel: CancellationToken,
}

/// One MQTT client connection and its lifecycle.
///
/// # State Machine
///
/// ```text
/// Disconnected ──connect()──► Connecting ──CONNACK──► Connected
///      ▲                          │                      │
///      └──────── failure ─────────┘                      │
///      └──────────────── disconnect() / failure ─────────┘
/// ```
///
/// Network I/O runs in a tokio task spawned by [`BrokerSession::connect`]; it
/// reports back through the [`SessionEvent`] channel handed out by
/// [`BrokerSession::new`]. None of the public operations block.
pub struct BrokerSession {
    config: BrokerConfig,
    client_id: String,
    request_capacity: usize,
    state: Arc<watch::Sender<ConnectionState>>,
    events: EventSender,
    link: Option<Link>,
}

impl BrokerSession {
    pub fn new(config: BrokerConfig, client_id: impl Into<String>) -> (Self, EventReceiver) {
        let (events, receiver) = event_channel();
        let (state, _) = watch::channel(ConnectionState::Disconnected);

        // rumqttc panics on empty client ids or ones starting with a space
        let mut client_id = client_id.into().trim().to_string();
        if client_id.is_empty() {
            warn!("Empty MQTT client id, using {}", FALLBACK_CLIENT_ID);
            client_id = FALLBACK_CLIENT_ID.to_string();
        }

        let session = Self {
            config,
            client_id,
            request_capacity: DEFAULT_REQUEST_CAPACITY,
            state: Arc::new(state),
            events,
            link: None,
        };
        (session, receiver)
    }

    pub fn with_request_capacity(mut self, capacity: usize) -> Self {
        self.request_capacity = capacity.max(1);
        self
    }

    fn mqtt_options(&self) -> MqttOptions {
        if self.config.protocol_version == ProtocolVersion::V3_1 {
            warn!("MQTT 3.1 requested, negotiating 3.1.1 instead");
        }
        let mut options =
            MqttOptions::new(self.client_id.clone(), self.config.host.trim(), self.config.port);
        // rumqttc rejects keep-alive intervals below five seconds
        options
            .set_keep_alive(Duration::from_secs(self.config.keep_alive_secs.max(5)))
            .set_clean_session(self.config.clean_session);
        options
    }
}

impl Publisher for BrokerSession {
    fn publish(&self, topic: &str, payload: Vec<u8>) {
        let link = match (&self.link, self.state()) {
            (Some(link), ConnectionState::Connected) => link,
            (_, state) => {
                debug!("Dropping publish to {} while {}", topic, state);
                return;
            }
        };

        match link.client.try_publish(topic, QoS::AtMostOnce, false, payload) {
            Ok(_) => debug!("Published to {}", topic),
            Err(e) => warn!("Publish to {} not queued: {}", topic, e),
        }
    }
}

impl BrokerLink for BrokerSession {
    fn configure(
        &mut self,
        host: &str,
        port: u16,
        keep_alive_secs: u64,
        clean_session: bool,
        protocol_version: ProtocolVersion,
    ) -> bool {
        let next = BrokerConfig {
            host: host.trim().to_string(),
            port,
            keep_alive_secs,
            clean_session,
            protocol_version,
        };
        if next == self.config {
            debug!("Broker configuration unchanged");
            return false;
        }

        info!("Broker configured for {}", next.address());
        self.config = next;
        true
    }

    fn connect(&mut self) -> Result<(), BrokerError> {
        let current = self.state();
        if current != ConnectionState::Disconnected {
            debug!("Connect ignored, session is {}", current);
            return Ok(());
        }
        if !self.config.has_host() {
            return Err(BrokerError::InvalidConfig("broker host is empty".to_string()));
        }
        if self.config.port == 0 {
            return Err(BrokerError::InvalidConfig("broker port is 0".to_string()));
        }

        if let Some(stale) = self.link.take() {
            stale.cancel.cancel();
        }

        let (client, eventloop) = AsyncClient::new(self.mqtt_options(), self.request_capacity);
        let cancel = CancellationToken::new();

        self.state.send_replace(ConnectionState::Connecting);
        info!("Connecting to {}", self.config.address());

        tokio::spawn(run_event_loop(
            eventloop,
            self.state.clone(),
            self.events.clone(),
            cancel.clone(),
        ));

        self.link = Some(Link { client, cancel });
        Ok(())
    }

    fn disconnect(&mut self) {
        let current = self.state();
        if current != ConnectionState::Connected {
            debug!("Disconnect ignored, session is {}", current);
            return;
        }

        if let Some(link) = &self.link {
            info!("Disconnecting from {}", self.config.address());
            if let Err(e) = link.client.try_disconnect() {
                warn!("Graceful disconnect not queued, closing link: {}", e);
                link.cancel.cancel();
                self.state.send_replace(ConnectionState::Disconnected);
                let _ = self
                    .events
                    .send(SessionEvent::Disconnected(DisconnectReason::Requested));
            }
        }
    }

    fn subscribe(&mut self, topic: &str) -> bool {
        let link = match (&self.link, self.state()) {
            (Some(link), ConnectionState::Connected) => link,
            (_, state) => {
                debug!("Subscribe to {} skipped while {}", topic, state);
                return false;
            }
        };

        match link.client.try_subscribe(topic, QoS::AtMostOnce) {
            Ok(_) => {
                info!("Subscribed to {}", topic);
                true
            }
            Err(e) => {
                warn!("Subscribe to {} not queued: {}", topic, e);
                false
            }
        }
    }

    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn config(&self) -> &BrokerConfig {
        &self.config
    }
}

impl Drop for BrokerSession {
    fn drop(&mut self) {
        if let Some(link) = self.link.take() {
            link.cancel.cancel();
        }
    }
}

/// Drives one rumqttc event loop until the connection ends.
///
/// The loop is never polled after an error, which would make rumqttc
/// reconnect on its own; a new attempt always goes through `connect()`.
async fn run_event_loop(
    mut eventloop: EventLoop,
    state: Arc<watch::Sender<ConnectionState>>,
    events: EventSender,
    cancel: CancellationToken,
) {
    loop {
        // A cancelled link never writes state, a newer attempt may own it
        let polled = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Event loop cancelled");
                return;
            }
            polled = eventloop.poll() => polled,
        };
        if cancel.is_cancelled() {
            debug!("Event loop cancelled");
            return;
        }

        match polled {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    state.send_replace(ConnectionState::Connected);
                    info!("Broker acknowledged connection");
                    emit(&events, SessionEvent::Connected);
                } else {
                    let failure = ConnectFailure::Refused(format!("{:?}", ack.code));
                    error!("Connection {}", failure);
                    state.send_replace(ConnectionState::Disconnected);
                    emit(&events, SessionEvent::ConnectFailed(failure));
                    return;
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let message = InboundMessage::from_topic(publish.topic, publish.payload.to_vec());
                emit(&events, SessionEvent::Message(message));
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                warn!("Broker closed the session");
                state.send_replace(ConnectionState::Disconnected);
                emit(
                    &events,
                    SessionEvent::Disconnected(DisconnectReason::ConnectionLost(
                        "broker sent DISCONNECT".to_string(),
                    )),
                );
                return;
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                info!("Disconnected from broker");
                state.send_replace(ConnectionState::Disconnected);
                emit(&events, SessionEvent::Disconnected(DisconnectReason::Requested));
                return;
            }
            Ok(_) => {}
            Err(e) => {
                let previous = state.send_replace(ConnectionState::Disconnected);
                if previous == ConnectionState::Connecting {
                    let failure = ConnectFailure::from(&e);
                    error!("Connection {}", failure);
                    emit(&events, SessionEvent::ConnectFailed(failure));
                } else {
                    error!("MQTT connection error: {}", e);
                    emit(
                        &events,
                        SessionEvent::Disconnected(DisconnectReason::ConnectionLost(e.to_string())),
                    );
                }
                return;
            }
        }
    }
}

fn emit(events: &EventSender, event: SessionEvent) {
    if events.send(event).is_err() {
        debug!("Session event dropped, receiver is gone");
    }
}
