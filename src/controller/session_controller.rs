//! Session Controller - orchestration between broker, telemetry and store
//!
//! Owns every piece of mutable session state and is only ever driven from one
//! task. Network activity reaches it as [`SessionEvent`]s drained from the
//! broker session's channel; the presentation layer hears back through
//! [`Notification`]s.
//!
//! ```text
//! Presentation ──requests──► SessionController ──► BrokerLink ──► broker
//!      ▲                        │     ▲
//!      └──── Notification ──────┘     └──── SessionEvent (mpsc) ◄── network task
//! ```

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::command::{publish_command, SetpointCommand};
use crate::config::AppConfig;
use crate::mqtt::{
    BrokerError, BrokerLink, ConnectFailure, ConnectionState, DisconnectReason, EventReceiver,
    ProtocolVersion, SessionEvent,
};
use crate::persistence::{SessionState, SessionStore, StoreError};
use crate::telemetry::{self, TelemetryRecord};

/// How long shutdown waits for the broker to confirm a graceful disconnect
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Controller-level settings taken from the application config.
#[derive(Clone, Debug, PartialEq)]
pub struct ControllerSettings {
    pub setpoint_topic: String,
    pub status_topic: String,
    pub keep_alive_secs: u64,
    pub clean_session: bool,
    pub protocol_version: ProtocolVersion,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        ControllerSettings::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for ControllerSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            setpoint_topic: config.setpoint_topic.clone(),
            status_topic: config.status_topic.clone(),
            keep_alive_secs: config.keep_alive_secs,
            clean_session: config.clean_session,
            protocol_version: config.protocol_version,
        }
    }
}

/// Output of the controller towards the presentation layer.
#[derive(Clone, Debug, PartialEq)]
pub enum Notification {
    SessionRestored(SessionState),
    ConnectionChanged(ConnectionState),
    /// A connection attempt ended without reaching `Connected`; inputs that were
    /// locked for the attempt can be re-enabled.
    ConnectFailed(ConnectFailure),
    TelemetryUpdated(TelemetryRecord),
    SetpointApplied(SetpointCommand),
    LoggingChanged(Option<PathBuf>),
    /// Recoverable problem worth showing to the operator
    Error(String),
}

pub type NotificationReceiver = mpsc::UnboundedReceiver<Notification>;

pub struct SessionController<B: BrokerLink> {
    broker: B,
    events: EventReceiver,
    store: SessionStore,
    settings: ControllerSettings,
    session: SessionState,
    latest: Option<TelemetryRecord>,
    subscribed: bool,
    notifications: mpsc::UnboundedSender<Notification>,
}

impl<B: BrokerLink> SessionController<B> {
    pub fn new(
        broker: B,
        events: EventReceiver,
        store: SessionStore,
        settings: ControllerSettings,
    ) -> (Self, NotificationReceiver) {
        let (notifications, receiver) = mpsc::unbounded_channel();
        let controller = Self {
            broker,
            events,
            store,
            settings,
            session: SessionState::default(),
            latest: None,
            subscribed: false,
            notifications,
        };
        (controller, receiver)
    }

    pub fn broker(&self) -> &B {
        &self.broker
    }

    pub fn session_state(&self) -> &SessionState {
        &self.session
    }

    pub fn latest_telemetry(&self) -> Option<&TelemetryRecord> {
        self.latest.as_ref()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.broker.state()
    }

    /// Restores the last session and prepares the broker configuration from it.
    pub async fn startup(&mut self) {
        self.session = self.store.load_or_default().await;
        let host = self.session.broker_host.clone();
        let port = self.session.broker_port;
        self.configure_broker(&host, port);
        info!(
            "Session ready: broker {}:{}, setpoint {} degC / {} %",
            self.session.broker_host,
            self.session.broker_port,
            self.session.last_temp_setpoint,
            self.session.last_humidity_setpoint
        );
        self.notify(Notification::SessionRestored(self.session.clone()));
    }

    /// Connect/disconnect toggle driven by the presentation layer.
    pub fn on_connect_requested(&mut self, host: &str, port: u16) {
        match self.broker.state() {
            ConnectionState::Disconnected => {
                self.session.broker_host = host.trim().to_string();
                self.session.broker_port = port;
                self.configure_broker(host, port);

                match self.broker.connect() {
                    Ok(()) => self.notify(Notification::ConnectionChanged(self.broker.state())),
                    Err(BrokerError::InvalidConfig(_)) if host.trim().is_empty() => {
                        debug!("No broker host set, not connecting");
                    }
                    Err(e) => {
                        warn!("Connect rejected: {}", e);
                        self.notify(Notification::Error(e.to_string()));
                    }
                }
            }
            ConnectionState::Connected => self.broker.disconnect(),
            ConnectionState::Connecting => {
                warn!("Connection attempt already in flight, ignoring request");
            }
        }
    }

    /// Drains every queued session event without waiting. Returns how many
    /// were handled.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// Waits for the next session event. Cancel safe, for use in `select!`.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    pub fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Connected => self.on_connected(),
            SessionEvent::ConnectFailed(reason) => {
                self.subscribed = false;
                match &reason {
                    ConnectFailure::Timeout => error!("Connection to broker timed out"),
                    other => error!("{}", BrokerError::ConnectFailed(other.clone())),
                }
                self.notify(Notification::ConnectFailed(reason));
                self.notify(Notification::ConnectionChanged(ConnectionState::Disconnected));
            }
            SessionEvent::Disconnected(reason) => {
                self.subscribed = false;
                match &reason {
                    DisconnectReason::Requested => info!("Disconnected from broker"),
                    DisconnectReason::ConnectionLost(e) => {
                        warn!("Lost broker connection: {}", e);
                        self.notify(Notification::Error(reason.to_string()));
                    }
                }
                self.notify(Notification::ConnectionChanged(ConnectionState::Disconnected));
            }
            SessionEvent::Message(message) => {
                if message.topic == self.settings.status_topic {
                    self.on_telemetry_message(&message.payload);
                } else {
                    debug!("Ignoring message on {}", message.topic);
                }
            }
        }
    }

    fn on_connected(&mut self) {
        info!("Connected to {}", self.broker.config().address());
        if !self.subscribed {
            let topic = self.settings.status_topic.clone();
            self.subscribed = self.broker.subscribe(&topic);
        }
        self.notify(Notification::ConnectionChanged(ConnectionState::Connected));
    }

    /// Decodes one status payload, publishes it for display and logs it.
    /// Malformed payloads are dropped; the connection is unaffected.
    pub fn on_telemetry_message(&mut self, payload: &[u8]) {
        let record = match telemetry::decode(payload) {
            Ok(record) => record,
            Err(e) => {
                warn!("Dropping status message: {}", e);
                self.notify(Notification::Error(e.to_string()));
                return;
            }
        };

        debug!("Telemetry: {}", record);

        if let Some(path) = &self.session.log_file_path {
            if let Err(e) = telemetry::log_record(&record, path) {
                error!("{}", e);
                self.notify(Notification::Error(e.to_string()));
            }
        }

        self.latest = Some(record.clone());
        self.notify(Notification::TelemetryUpdated(record));
    }

    /// Publishes new setpoints and remembers them for the next session.
    pub fn on_apply_setpoint(&mut self, temperature: f64, humidity: f64, heating_mode: bool) {
        let command = match SetpointCommand::new(temperature, humidity, heating_mode) {
            Ok(command) => command,
            Err(e) => {
                warn!("Setpoint rejected: {}", e);
                self.notify(Notification::Error(e.to_string()));
                return;
            }
        };

        publish_command(&self.broker, &self.settings.setpoint_topic, &command);

        self.session.last_temp_setpoint = command.temperature;
        self.session.last_humidity_setpoint = command.humidity;
        self.session.last_heating_mode = command.heating_mode;
        self.notify(Notification::SetpointApplied(command));
    }

    /// Enables logging to `path`, or disables it with `None`. A path that
    /// cannot be opened for append is rejected and the previous one kept.
    pub fn set_log_path(&mut self, path: Option<PathBuf>) {
        match &path {
            Some(p) => {
                if let Err(e) = telemetry::check_writable(p) {
                    warn!("Data log not changed: {}", e);
                    self.notify(Notification::Error(e.to_string()));
                    return;
                }
                info!("Data log enabled: {}", p.display());
            }
            None => info!("Data log disabled"),
        }
        self.session.log_file_path = path.clone();
        self.notify(Notification::LoggingChanged(path));
    }

    /// Persists the session from the live broker inputs and the last applied
    /// setpoints. The caller terminates afterwards whatever the outcome.
    pub async fn shutdown(mut self, host: &str, port: u16) -> Result<SessionState, StoreError> {
        self.session.broker_host = host.trim().to_string();
        self.session.broker_port = port;

        if self.broker.state() == ConnectionState::Connected {
            self.broker.disconnect();
            if tokio::time::timeout(SHUTDOWN_GRACE, self.wait_for_disconnect())
                .await
                .is_err()
            {
                debug!("Broker did not confirm disconnect before shutdown");
            }
        }

        match self.store.save(&self.session).await {
            Ok(()) => Ok(self.session),
            Err(e) => {
                error!("Session could not be saved: {}", e);
                self.notify(Notification::Error(e.to_string()));
                Err(e)
            }
        }
    }

    async fn wait_for_disconnect(&mut self) {
        while let Some(event) = self.events.recv().await {
            let done = matches!(event, SessionEvent::Disconnected(_));
            self.handle_event(event);
            if done {
                break;
            }
        }
    }

    fn configure_broker(&mut self, host: &str, port: u16) {
        self.broker.configure(
            host,
            port,
            self.settings.keep_alive_secs,
            self.settings.clean_session,
            self.settings.protocol_version,
        );
    }

    fn notify(&self, notification: Notification) {
        if self.notifications.send(notification).is_err() {
            debug!("Notification dropped, presentation layer is gone");
        }
    }
}
