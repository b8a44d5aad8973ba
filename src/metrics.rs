//! Derived brewing metrics.
//!
//! Pure transforms from a decoded reading; no rounding happens here, only at
//! formatting time.

use crate::reading::Reading;

/// Metrics derived from a decoded reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Metrics {
    /// Temperature in Celsius
    pub temperature_celsius: f64,
    /// Gravity on the Plato scale
    pub plato: f64,
}

impl Metrics {
    pub fn derive(reading: &Reading) -> Self {
        Metrics {
            temperature_celsius: fahrenheit_to_celsius(reading.temperature_fahrenheit),
            plato: gravity_to_plato(reading.specific_gravity),
        }
    }
}

/// Convert Fahrenheit to Celsius.
#[inline]
pub fn fahrenheit_to_celsius(fahrenheit: f64) -> f64 {
    (fahrenheit - 32.0) * 5.0 / 9.0
}

/// Convert specific gravity to degrees Plato.
///
/// Empirical cubic fit; the coefficients are part of the fit and not tunable.
#[inline]
pub fn gravity_to_plato(sg: f64) -> f64 {
    135.997 * sg.powi(3) - 630.272 * sg.powi(2) + 1111.14 * sg - 616.868
}
