//! Registry of known Tilt hydrometers.
//!
//! Tilt sells eight hydrometer models, one per color, each broadcasting a
//! fixed proximity UUID. The registry maps those UUIDs to their color labels
//! and carries the optional per-device calibration offsets. It is built once
//! at startup and read-only afterwards.

use crate::beacon_uuid::BeaconUuid;
use std::collections::HashMap;
use std::env;

/// Additive correction applied to raw readings of one device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    /// Offset added to the raw temperature, in Fahrenheit
    pub temperature: f64,
    /// Offset added to the raw specific gravity
    pub gravity: f64,
}

/// A registered Tilt device: its color label and calibration state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceEntry {
    label: &'static str,
    calibration: Option<Calibration>,
}

impl DeviceEntry {
    /// The color label, e.g. `"Red"`. Used in the MQTT topic.
    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn calibration(&self) -> Option<Calibration> {
        self.calibration
    }
}

const fn tilt_uuid(slot: u8) -> BeaconUuid {
    // All Tilt UUIDs share the a495bbX0-c5b1-4b44-b512-1370f02d74de pattern,
    // differing only in the fourth byte.
    BeaconUuid([
        0xA4, 0x95, 0xBB, slot, 0xC5, 0xB1, 0x4B, 0x44, 0xB5, 0x12, 0x13, 0x70, 0xF0, 0x2D, 0x74,
        0xDE,
    ])
}

/// The eight Tilt hydrometer identities.
pub const KNOWN_DEVICES: [(BeaconUuid, &str); 8] = [
    (tilt_uuid(0x10), "Red"),
    (tilt_uuid(0x20), "Green"),
    (tilt_uuid(0x30), "Black"),
    (tilt_uuid(0x40), "Purple"),
    (tilt_uuid(0x50), "Orange"),
    (tilt_uuid(0x60), "Blue"),
    (tilt_uuid(0x70), "Yellow"),
    (tilt_uuid(0x80), "Pink"),
];

/// Immutable device registry keyed by proximity UUID.
#[derive(Debug, Clone)]
pub struct Registry {
    devices: HashMap<BeaconUuid, DeviceEntry>,
}

impl Registry {
    /// Build a registry of all known Tilt colors with no calibration.
    pub fn uncalibrated() -> Self {
        let devices = KNOWN_DEVICES
            .into_iter()
            .map(|(uuid, label)| {
                (
                    uuid,
                    DeviceEntry {
                        label,
                        calibration: None,
                    },
                )
            })
            .collect();
        Registry { devices }
    }

    /// Build a registry with calibration offsets taken from `TILT_CAL_<COLOR>`
    /// environment variables (e.g. `TILT_CAL_RED=-2.0,0.002`).
    ///
    /// A variable that is absent or malformed leaves that device uncalibrated;
    /// malformed values are logged at warn level but never abort startup.
    pub fn from_env() -> Self {
        let mut registry = Self::uncalibrated();
        for (_, label) in KNOWN_DEVICES {
            let var = format!("TILT_CAL_{}", label.to_uppercase());
            if let Some(calibration) =
                calibration_from_env(&var, env::var(&var).ok().as_deref())
            {
                registry.set_calibration(label, calibration);
            }
        }
        registry
    }

    /// Override the calibration for the device with the given color label.
    ///
    /// Returns `false` if no such color exists.
    pub fn set_calibration(&mut self, label: &str, calibration: Calibration) -> bool {
        for entry in self.devices.values_mut() {
            if entry.label.eq_ignore_ascii_case(label) {
                entry.calibration = Some(calibration);
                return true;
            }
        }
        false
    }

    /// Exact-match lookup of a beacon identity.
    pub fn lookup(&self, uuid: &BeaconUuid) -> Option<&DeviceEntry> {
        self.devices.get(uuid)
    }
}

/// Parse a calibration pair from a string in the format "TEMP,SG".
///
/// # Example
/// ```
/// use tilt2mqtt::registry::parse_calibration;
///
/// let calibration = parse_calibration("-2.0,0.002").unwrap();
/// assert_eq!(calibration.temperature, -2.0);
/// assert_eq!(calibration.gravity, 0.002);
/// ```
pub fn parse_calibration(src: &str) -> Result<Calibration, String> {
    let (temperature, gravity) = src
        .split_once(',')
        .ok_or_else(|| "invalid calibration: expected format TEMP,SG".to_string())?;
    let temperature: f64 = temperature
        .trim()
        .parse()
        .map_err(|_| format!("invalid temperature offset: {}", temperature.trim()))?;
    let gravity: f64 = gravity
        .trim()
        .parse()
        .map_err(|_| format!("invalid gravity offset: {}", gravity.trim()))?;
    Ok(Calibration {
        temperature,
        gravity,
    })
}

/// Interpret one `TILT_CAL_<COLOR>` environment value leniently.
///
/// Absent and malformed values both mean "not calibrated"; only the malformed
/// case is logged.
fn calibration_from_env(var: &str, value: Option<&str>) -> Option<Calibration> {
    let value = value?;
    match parse_calibration(value) {
        Ok(calibration) => Some(calibration),
        Err(why) => {
            log::warn!("ignoring {var}={value}: {why}");
            None
        }
    }
}

/// A `--calibrate` command-line argument: color label plus offsets.
#[derive(Debug, Clone)]
pub struct CalibrationArg {
    pub label: String,
    pub calibration: Calibration,
}

/// Parse a calibration argument in the format "COLOR=TEMP,SG".
///
/// # Example
/// ```
/// use tilt2mqtt::registry::parse_calibration_arg;
///
/// let arg = parse_calibration_arg("Red=-2.0,0.002").unwrap();
/// assert_eq!(arg.label, "Red");
/// assert_eq!(arg.calibration.temperature, -2.0);
/// ```
pub fn parse_calibration_arg(src: &str) -> Result<CalibrationArg, String> {
    let (label, pair) = src
        .split_once('=')
        .ok_or_else(|| "invalid calibration: expected format COLOR=TEMP,SG".to_string())?;
    Ok(CalibrationArg {
        label: label.trim().to_string(),
        calibration: parse_calibration(pair)?,
    })
}
