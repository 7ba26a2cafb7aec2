use chrono::{DateTime, Local};
use serde::Deserialize;
use std::fmt;

use super::TelemetryError;

/// The eight actuators reported in every status message, in log column order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Device {
    Freezer,
    Humidifier,
    Dehumidifier,
    Heater,
    InternalFan,
    FreshAirFan,
    Device7,
    Device8,
}

impl Device {
    pub const ALL: [Device; 8] = [
        Device::Freezer,
        Device::Humidifier,
        Device::Dehumidifier,
        Device::Heater,
        Device::InternalFan,
        Device::FreshAirFan,
        Device::Device7,
        Device::Device8,
    ];

    /// Column label used in the CSV data log.
    pub fn label(&self) -> &'static str {
        match self {
            Device::Freezer => "Freezer",
            Device::Humidifier => "Humidifier",
            Device::Dehumidifier => "Dehumidifier",
            Device::Heater => "Heater",
            Device::InternalFan => "Internal Fan",
            Device::FreshAirFan => "Freshair Fan",
            Device::Device7 => "Device 7",
            Device::Device8 => "Device 8",
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// On/off state of every chamber actuator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeviceStates {
    pub freezer: bool,
    pub humidifier: bool,
    pub dehumidifier: bool,
    pub heater: bool,
    pub internal_fan: bool,
    pub fresh_air_fan: bool,
    pub device7: bool,
    pub device8: bool,
}

impl DeviceStates {
    pub fn get(&self, device: Device) -> bool {
        match device {
            Device::Freezer => self.freezer,
            Device::Humidifier => self.humidifier,
            Device::Dehumidifier => self.dehumidifier,
            Device::Heater => self.heater,
            Device::InternalFan => self.internal_fan,
            Device::FreshAirFan => self.fresh_air_fan,
            Device::Device7 => self.device7,
            Device::Device8 => self.device8,
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = (Device, bool)> + '_ {
        Device::ALL.iter().map(move |device| (*device, self.get(*device)))
    }

    pub fn all_off(&self) -> bool {
        self.entries().all(|(_, on)| !on)
    }
}

/// One decoded status message. The timestamp is taken when it was decoded.
#[derive(Clone, Debug, PartialEq)]
pub struct TelemetryRecord {
    pub timestamp: DateTime<Local>,
    pub current_temp: f64,
    pub current_humidity: f64,
    pub devices: DeviceStates,
}

impl fmt::Display for TelemetryRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{:.2} degC, {:.2} %",
            self.current_temp, self.current_humidity
        )?;
        for (device, on) in self.devices.entries() {
            write!(f, ", {}={}", device, if on { "on" } else { "off" })?;
        }
        Ok(())
    }
}

// Short keys are what the controller firmware sends; the long ones come from
// the desktop device emulator.
#[derive(Deserialize)]
struct StatusPayload {
    #[serde(rename = "curTemp")]
    cur_temp: f64,
    #[serde(rename = "curHum")]
    cur_hum: f64,
    #[serde(rename = "Frez", alias = "freezer")]
    freezer: bool,
    #[serde(rename = "Hum", alias = "humidifier", alias = "hunidifier")]
    humidifier: bool,
    #[serde(rename = "Dhum", alias = "dehumidifier")]
    dehumidifier: bool,
    #[serde(rename = "Htr", alias = "heater")]
    heater: bool,
    #[serde(rename = "IFan", alias = "internalfan")]
    internal_fan: bool,
    #[serde(rename = "FFan", alias = "freshairfan")]
    fresh_air_fan: bool,
    #[serde(rename = "Dev7", alias = "device7")]
    device7: bool,
    #[serde(rename = "Dev8", alias = "device8")]
    device8: bool,
}

/// Parses a status payload.
///
/// All ten keys are required. Anything else in the document is ignored.
pub fn decode(payload: &[u8]) -> Result<TelemetryRecord, TelemetryError> {
    let status: StatusPayload =
        serde_json::from_slice(payload).map_err(|e| TelemetryError::Decode(e.to_string()))?;

    Ok(TelemetryRecord {
        timestamp: Local::now(),
        current_temp: status.cur_temp,
        current_humidity: status.cur_hum,
        devices: DeviceStates {
            freezer: status.freezer,
            humidifier: status.humidifier,
            dehumidifier: status.dehumidifier,
            heater: status.heater,
            internal_fan: status.internal_fan,
            fresh_air_fan: status.fresh_air_fan,
            device7: status.device7,
            device8: status.device8,
        },
    })
}
