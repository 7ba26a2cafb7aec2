//! Telemetry pipeline for the chamber's status messages.
//!
//! [`decoder`] turns a raw `mcuring/status` payload into a [`TelemetryRecord`],
//! [`logger`] appends records to the CSV data log. Both fail with
//! [`TelemetryError`], which callers treat as recoverable.

pub mod decoder;
pub mod logger;

use std::path::PathBuf;
use thiserror::Error;

pub use decoder::{decode, Device, DeviceStates, TelemetryRecord};
pub use logger::{check_writable, log_record, CSV_HEADER};

#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Payload is not a status document or lacks a required key
    #[error("Malformed status payload: {0}")]
    Decode(String),

    /// The CSV log could not be opened or appended to
    #[error("Failed to write data log {}: {source}", .path.display())]
    LogWrite {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}
