use chrono::{DateTime, Local};
use std::fs::OpenOptions;
use std::path::Path;
use tracing::debug;

use super::{TelemetryError, TelemetryRecord};

pub const CSV_HEADER: [&str; 12] = [
    "Time Stamp",
    "Temperature(degC)",
    "Humidity(%)",
    "Operation Mode",
    "Freezer",
    "Humidifier",
    "Dehumidifier",
    "Heater",
    "Internal Fan",
    "Freshair Fan",
    "Device 7",
    "Device 8",
];

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Appends `record` as one row to the CSV log at `destination`.
///
/// The header is written when the file is new or empty. The time stamp is the
/// moment of logging, not the moment the telemetry arrived. The operation
/// mode column is left empty.
pub fn log_record(record: &TelemetryRecord, destination: &Path) -> Result<(), TelemetryError> {
    log_record_at(record, destination, Local::now())
}

/// Opens `destination` for append once, creating it if needed, so an unusable
/// location is rejected before any record is routed there.
pub fn check_writable(destination: &Path) -> Result<(), TelemetryError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(destination)
        .map(|_| ())
        .map_err(|e| TelemetryError::LogWrite {
            path: destination.to_path_buf(),
            source: e.into(),
        })
}

fn log_record_at(
    record: &TelemetryRecord,
    destination: &Path,
    logged_at: DateTime<Local>,
) -> Result<(), TelemetryError> {
    let write_error = |source: csv::Error| TelemetryError::LogWrite {
        path: destination.to_path_buf(),
        source,
    };

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(destination)
        .map_err(|e| write_error(e.into()))?;
    let needs_header = file.metadata().map_err(|e| write_error(e.into()))?.len() == 0;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);

    if needs_header {
        debug!("Starting data log at {}", destination.display());
        writer.write_record(CSV_HEADER).map_err(write_error)?;
    }

    let mut row = vec![
        logged_at.format(TIMESTAMP_FORMAT).to_string(),
        record.current_temp.to_string(),
        record.current_humidity.to_string(),
        String::new(),
    ];
    row.extend(
        record
            .devices
            .entries()
            .map(|(_, on)| if on { "ON" } else { "OFF" }.to_string()),
    );

    writer.write_record(&row).map_err(write_error)?;
    writer.flush().map_err(|e| write_error(e.into()))?;
    Ok(())
}
