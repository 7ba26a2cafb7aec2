pub mod command;
pub mod config;
pub mod controller;
pub mod mqtt;
pub mod persistence;
pub mod telemetry;
pub mod ui;

use crate::config::AppConfig;
use crate::controller::{ControllerSettings, SessionController};
use crate::mqtt::{BrokerConfig, BrokerSession};
use crate::persistence::SessionStore;
use color_eyre::Result;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    setup_error_reporting()?;

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(AppConfig::default_path);
    let config = AppConfig::load(&config_path)?;
    setup_logging(config.tracing_level());

    info!("Starting meat curing chamber panel");

    let broker_config = BrokerConfig {
        keep_alive_secs: config.keep_alive_secs,
        clean_session: config.clean_session,
        protocol_version: config.protocol_version,
        ..BrokerConfig::default()
    };
    let (session, events) = BrokerSession::new(broker_config, config.client_id.clone());
    let session = session.with_request_capacity(config.request_capacity);

    let store = SessionStore::new(config.session_file.clone());
    let (controller, notifications) =
        SessionController::new(session, events, store, ControllerSettings::from(&config));

    ui::console::run(controller, notifications).await?;

    info!("Bye");
    Ok(())
}

fn setup_error_reporting() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    Ok(())
}

fn setup_logging(level: Level) {
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .init();
}
