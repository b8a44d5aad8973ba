//! Decoding raw advertisement fields into physical units.

use crate::advertisement::Advertisement;
use crate::registry::DeviceEntry;

/// A decoded hydrometer reading.
///
/// `major` maps to temperature in integer Fahrenheit and `minor` to specific
/// gravity scaled by 1000. When the device entry carries calibration offsets
/// they are added here and `calibrated` is set, which selects the field-name
/// suffix used downstream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    /// Temperature in Fahrenheit
    pub temperature_fahrenheit: f64,
    /// Specific gravity (dimensionless, ~0.98-1.12 during fermentation)
    pub specific_gravity: f64,
    /// Whether calibration offsets were applied
    pub calibrated: bool,
}

impl Reading {
    /// Decode an advertisement, applying the device's calibration if present.
    pub fn decode(advertisement: &Advertisement, device: &DeviceEntry) -> Self {
        let mut temperature_fahrenheit = f64::from(advertisement.major);
        let mut specific_gravity = f64::from(advertisement.minor) / 1000.0;

        let calibrated = match device.calibration() {
            Some(calibration) => {
                temperature_fahrenheit += calibration.temperature;
                specific_gravity += calibration.gravity;
                true
            }
            None => false,
        };

        Reading {
            temperature_fahrenheit,
            specific_gravity,
            calibrated,
        }
    }
}
