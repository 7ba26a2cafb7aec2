//! Line-oriented operator console.
//!
//! Stands in for the chamber panel's window: it holds the broker address
//! fields, turns typed commands into controller requests and prints every
//! [`Notification`] the controller emits.

use std::path::PathBuf;

use color_eyre::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::controller::{Notification, NotificationReceiver, SessionController};
use crate::mqtt::config::DEFAULT_PORT;
use crate::mqtt::{BrokerLink, ConnectionState};
use crate::persistence::SessionState;

const HELP: &str = "\
commands:
  broker <host> [port]        set the broker address
  connect                     connect, or disconnect when connected
  set <temp> <hum> [heat]     apply setpoints (add `heat` for heating mode)
  log <path> | log off        enable or disable the CSV data log
  status                      show connection and latest telemetry
  help                        this text
  quit                        save the session and exit";

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Broker { host: String, port: u16 },
    Connect,
    Apply {
        temperature: f64,
        humidity: f64,
        heating_mode: bool,
    },
    Log(Option<PathBuf>),
    Status,
    Help,
    Quit,
}

pub fn parse_command(line: &str) -> Result<ConsoleCommand, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Err("empty command".to_string());
    };
    let args: Vec<&str> = words.collect();

    match (verb.to_ascii_lowercase().as_str(), args.as_slice()) {
        ("broker", [host]) => Ok(ConsoleCommand::Broker {
            host: host.to_string(),
            port: DEFAULT_PORT,
        }),
        ("broker", [host, port]) => {
            let port = port
                .parse()
                .map_err(|_| format!("invalid port {:?}", port))?;
            Ok(ConsoleCommand::Broker {
                host: host.to_string(),
                port,
            })
        }
        ("connect" | "disconnect", []) => Ok(ConsoleCommand::Connect),
        ("set", [temp, hum, rest @ ..]) if rest.len() <= 1 => {
            let temperature = temp
                .parse()
                .map_err(|_| format!("invalid temperature {:?}", temp))?;
            let humidity = hum
                .parse()
                .map_err(|_| format!("invalid humidity {:?}", hum))?;
            let heating_mode = match rest {
                [] | ["noheat"] | ["off"] => false,
                ["heat"] | ["on"] => true,
                other => return Err(format!("unknown heating mode {:?}", other.join(" "))),
            };
            Ok(ConsoleCommand::Apply {
                temperature,
                humidity,
                heating_mode,
            })
        }
        ("log", ["off"]) => Ok(ConsoleCommand::Log(None)),
        ("log", [path]) => Ok(ConsoleCommand::Log(Some(PathBuf::from(path)))),
        ("status", []) => Ok(ConsoleCommand::Status),
        ("help" | "?", []) => Ok(ConsoleCommand::Help),
        ("quit" | "exit", []) => Ok(ConsoleCommand::Quit),
        (verb, _) => Err(format!("unrecognised command {:?}, try `help`", verb)),
    }
}

/// Broker address as currently typed by the operator.
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerInputs {
    pub host: String,
    pub port: u16,
}

impl Default for BrokerInputs {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
        }
    }
}

impl From<&SessionState> for BrokerInputs {
    fn from(state: &SessionState) -> Self {
        Self {
            host: state.broker_host.clone(),
            port: state.broker_port,
        }
    }
}

pub fn render(notification: &Notification) -> String {
    match notification {
        Notification::SessionRestored(state) => {
            format!(
                "broker {}:{}  setpoint {} degC / {} %  heating {}  log {}",
                state.broker_host,
                state.broker_port,
                state.last_temp_setpoint,
                state.last_humidity_setpoint,
                if state.last_heating_mode { "on" } else { "off" },
                state
                    .log_file_path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "disabled".to_string())
            )
        }
        Notification::ConnectionChanged(state) => format!("connection: {}", state),
        Notification::ConnectFailed(reason) => {
            format!("connection failed: {} (inputs unlocked)", reason)
        }
        Notification::TelemetryUpdated(record) => format!(
            "[{}] {}",
            record.timestamp.format("%H:%M:%S"),
            record
        ),
        Notification::SetpointApplied(command) => format!(
            "setpoint {} degC / {} %  heating {}",
            command.temperature,
            command.humidity,
            if command.heating_mode { "on" } else { "off" }
        ),
        Notification::LoggingChanged(Some(path)) => format!("data log: {}", path.display()),
        Notification::LoggingChanged(None) => "data log: disabled".to_string(),
        Notification::Error(message) => format!("error: {}", message),
    }
}

/// Runs the console on stdin until `quit` or end of input, then persists the
/// session.
pub async fn run<B: BrokerLink>(
    controller: SessionController<B>,
    notifications: NotificationReceiver,
) -> Result<()> {
    run_with(controller, notifications, BufReader::new(tokio::io::stdin())).await
}

pub async fn run_with<B, R>(
    mut controller: SessionController<B>,
    mut notifications: NotificationReceiver,
    input: R,
) -> Result<()>
where
    B: BrokerLink,
    R: AsyncBufRead + Unpin,
{
    controller.startup().await;

    // Broker fields start from the restored session, never from rendering
    let mut inputs = BrokerInputs::from(controller.session_state());
    let mut lines = input.lines();
    println!("{}", HELP);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Console input failed: {}", e);
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }

                match parse_command(&line) {
                    Ok(ConsoleCommand::Quit) => break,
                    Ok(command) => execute(command, &mut controller, &mut inputs),
                    Err(e) => println!("{}", e),
                }
            }
            Some(event) = controller.next_event() => controller.handle_event(event),
            Some(notification) = notifications.recv() => {
                println!("{}", render(&notification));
            }
        }
    }

    info!("Shutting down");
    if let Err(e) = controller.shutdown(&inputs.host, inputs.port).await {
        println!("session not saved: {}", e);
    }
    while let Ok(notification) = notifications.try_recv() {
        println!("{}", render(&notification));
    }
    Ok(())
}

fn execute<B: BrokerLink>(
    command: ConsoleCommand,
    controller: &mut SessionController<B>,
    inputs: &mut BrokerInputs,
) {
    match command {
        ConsoleCommand::Broker { host, port } => {
            if controller.connection_state() != ConnectionState::Disconnected {
                println!("disconnect before changing the broker");
                return;
            }
            inputs.host = host;
            inputs.port = port;
            println!("broker set to {}:{}", inputs.host, inputs.port);
        }
        ConsoleCommand::Connect => controller.on_connect_requested(&inputs.host, inputs.port),
        ConsoleCommand::Apply {
            temperature,
            humidity,
            heating_mode,
        } => controller.on_apply_setpoint(temperature, humidity, heating_mode),
        ConsoleCommand::Log(path) => controller.set_log_path(path),
        ConsoleCommand::Status => {
            println!("connection: {}", controller.connection_state());
            match controller.latest_telemetry() {
                Some(record) => println!("latest: {}", record),
                None => println!("no telemetry yet"),
            }
        }
        ConsoleCommand::Help => println!("{}", HELP),
        ConsoleCommand::Quit => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::ControllerSettings;
    use crate::mqtt::{BrokerConfig, BrokerSession};
    use crate::persistence::SessionStore;

    #[test]
    fn parses_broker_with_and_without_port() {
        assert_eq!(
            parse_command("broker 192.168.1.102"),
            Ok(ConsoleCommand::Broker {
                host: "192.168.1.102".to_string(),
                port: 1883
            })
        );
        assert_eq!(
            parse_command("broker localhost 1884"),
            Ok(ConsoleCommand::Broker {
                host: "localhost".to_string(),
                port: 1884
            })
        );
        assert!(parse_command("broker localhost port").is_err());
    }

    #[test]
    fn parses_setpoints() {
        assert_eq!(
            parse_command("set 12.5 80 heat"),
            Ok(ConsoleCommand::Apply {
                temperature: 12.5,
                humidity: 80.0,
                heating_mode: true
            })
        );
        assert_eq!(
            parse_command("SET 10 70"),
            Ok(ConsoleCommand::Apply {
                temperature: 10.0,
                humidity: 70.0,
                heating_mode: false
            })
        );
        assert!(parse_command("set warm 70").is_err());
        assert!(parse_command("set 10 70 maybe").is_err());
        assert!(parse_command("set 10 70 heat now").is_err());
        assert!(matches!(
            parse_command("set 10 70 off"),
            Ok(ConsoleCommand::Apply {
                heating_mode: false,
                ..
            })
        ));
        assert!(parse_command("set 10").is_err());
    }

    #[test]
    fn parses_log_toggle() {
        assert_eq!(parse_command("log off"), Ok(ConsoleCommand::Log(None)));
        assert_eq!(
            parse_command("log /tmp/chamber.csv"),
            Ok(ConsoleCommand::Log(Some(PathBuf::from("/tmp/chamber.csv"))))
        );
    }

    #[test]
    fn rejects_unknown_input() {
        assert!(parse_command("").is_err());
        assert!(parse_command("launch").is_err());
        assert!(parse_command("connect now").is_err());
    }

    #[test]
    fn restored_session_fills_broker_inputs() {
        let state = SessionState {
            broker_host: "192.168.1.102".to_string(),
            broker_port: 1884,
            ..SessionState::default()
        };

        let inputs = BrokerInputs::from(&state);
        let line = render(&Notification::SessionRestored(state));

        assert_eq!(inputs.host, "192.168.1.102");
        assert_eq!(inputs.port, 1884);
        assert!(line.contains("log disabled"));
    }

    #[tokio::test]
    async fn immediate_quit_keeps_saved_broker() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("session.json"));
        let saved = SessionState {
            broker_host: "192.168.1.102".to_string(),
            broker_port: 1884,
            last_temp_setpoint: 13.0,
            ..SessionState::default()
        };
        store.save(&saved).await.unwrap();

        let (broker, events) = BrokerSession::new(BrokerConfig::default(), "mcuring-test");
        let (controller, notifications) = SessionController::new(
            broker,
            events,
            SessionStore::new(store.path().to_path_buf()),
            ControllerSettings::default(),
        );

        run_with(controller, notifications, &b"quit\n"[..])
            .await
            .unwrap();

        let reloaded = store.load().await.unwrap();
        assert_eq!(reloaded, saved);
    }

    #[tokio::test]
    async fn end_of_input_keeps_saved_broker() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("session.json"));
        let saved = SessionState {
            broker_host: "10.0.0.7".to_string(),
            broker_port: 1885,
            ..SessionState::default()
        };
        store.save(&saved).await.unwrap();

        let (broker, events) = BrokerSession::new(BrokerConfig::default(), "mcuring-test");
        let (controller, notifications) = SessionController::new(
            broker,
            events,
            SessionStore::new(store.path().to_path_buf()),
            ControllerSettings::default(),
        );

        run_with(controller, notifications, &b""[..]).await.unwrap();

        let reloaded = store.load().await.unwrap();
        assert_eq!(reloaded.broker_host, "10.0.0.7");
        assert_eq!(reloaded.broker_port, 1885);
    }
}
