//! Compact proximity-UUID type for iBeacon advertisements.
//!
//! This module provides a 16-byte UUID representation that is decoupled from
//! any specific Bluetooth library. Tilt hydrometers identify themselves by
//! proximity UUID, so this type is the registry key for the whole pipeline.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// An iBeacon proximity UUID stored as a compact 16-byte array.
///
/// Displays in the canonical lowercase hyphenated form
/// (`a495bb10-c5b1-4b44-b512-1370f02d74de`) and provides efficient storage
/// and hashing for use as HashMap keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BeaconUuid(pub [u8; 16]);

/// Byte offsets of the hyphens in the canonical 8-4-4-4-12 text form.
const HYPHENS: [usize; 4] = [4, 6, 8, 10];

impl fmt::Display for BeaconUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if HYPHENS.contains(&i) {
                write!(f, "-")?;
            }
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Errors returned when parsing a proximity UUID string.
#[derive(Error, Debug, PartialEq)]
pub enum ParseUuidError {
    #[error("invalid UUID: expected 5 groups, got {0}")]
    InvalidGroupCount(usize),
    #[error("invalid UUID: expected 32 hex digits, got {0}")]
    InvalidLength(usize),
    #[error("invalid UUID: '{0}' is not valid hex")]
    InvalidHex(String),
}

impl FromStr for BeaconUuid {
    type Err = ParseUuidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let groups = s.split('-').count();
        if groups != 5 {
            return Err(ParseUuidError::InvalidGroupCount(groups));
        }

        let hex: Vec<char> = s.chars().filter(|c| *c != '-').collect();
        if hex.len() != 32 {
            return Err(ParseUuidError::InvalidLength(hex.len()));
        }

        let mut bytes = [0u8; 16];
        for (i, slot) in bytes.iter_mut().enumerate() {
            let part: String = hex[i * 2..i * 2 + 2].iter().collect();
            *slot = u8::from_str_radix(&part, 16).map_err(|_| ParseUuidError::InvalidHex(part))?;
        }

        Ok(BeaconUuid(bytes))
    }
}

impl From<[u8; 16]> for BeaconUuid {
    fn from(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }
}
