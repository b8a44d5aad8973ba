//! BLE scanner abstraction for Tilt hydrometer beacons.
//!
//! The Tilt broadcasts as an Apple iBeacon. This module holds the shared
//! frame-decoding logic and error taxonomy; the BlueZ backend lives in
//! [`bluer`].

pub mod bluer;

use crate::advertisement::{Advertisement, MacAddress};
use crate::beacon_uuid::BeaconUuid;
use thiserror::Error;
use tokio::sync::mpsc;

/// Error types for decoding iBeacon advertisement frames.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// Frame shorter than a complete iBeacon payload
    #[error("advertisement too short: {0} bytes, expected {len}", len = IBEACON_FRAME_LEN)]
    Truncated(usize),
    /// Apple manufacturer data that is not an iBeacon proximity frame
    #[error("not an iBeacon frame: type bytes {0:02x} {1:02x}")]
    NotIBeacon(u8, u8),
}

/// Convenience alias for decoded advertisements or decode errors.
pub type AdvertisementResult = Result<Advertisement, DecodeError>;

/// Error type for scanner operations.
#[derive(Error, Debug)]
pub enum ScanError {
    /// Bluetooth/adapter related error
    #[error("Bluetooth error: {0}")]
    Bluetooth(String),
    /// Frame decoding error
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),
}

/// Apple's Bluetooth company ID, under which iBeacon frames are broadcast.
pub const APPLE_COMPANY_ID: u16 = 0x004C;

/// Little-endian company ID bytes followed by the iBeacon subtype and length
/// bytes, as they appear at the start of the manufacturer-data AD structure.
/// Used to filter advertisements at the BlueZ level.
pub const IBEACON_PATTERN: [u8; 4] = [0x4C, 0x00, 0x02, 0x15];

/// iBeacon subtype and frame-length bytes that open the manufacturer data.
pub const IBEACON_PREFIX: [u8; 2] = [0x02, 0x15];

/// Manufacturer data frame length: prefix, 16-byte UUID, major, minor, tx power.
pub const IBEACON_FRAME_LEN: usize = 23;

/// Bluetooth manufacturer-specific data type (AD type 0xFF)
pub const MANUFACTURER_DATA_TYPE: u8 = 0xff;

/// Channel buffer size for advertisement results.
pub const ADVERTISEMENT_CHANNEL_BUFFER_SIZE: usize = 100;

/// Decode Apple manufacturer data into a Tilt advertisement.
///
/// The manufacturer data (without the company ID) must be a proximity
/// frame: `0x02 0x15`, a 16-byte proximity UUID, big-endian u16 major and
/// minor, and a tx-power byte. The Tilt repurposes major as integer
/// Fahrenheit and minor as specific gravity scaled by 1000; interpreting
/// those is left to the decode pipeline.
///
/// # Arguments
/// * `mac` - Bluetooth address the frame was received from
/// * `rssi` - Received signal strength in dBm
/// * `data` - The manufacturer-specific data bytes (without the company ID prefix)
pub fn decode_ibeacon_frame(
    mac: MacAddress,
    rssi: i16,
    data: &[u8],
) -> Result<Advertisement, DecodeError> {
    if data.len() < IBEACON_FRAME_LEN {
        return Err(DecodeError::Truncated(data.len()));
    }
    if data[0..2] != IBEACON_PREFIX {
        return Err(DecodeError::NotIBeacon(data[0], data[1]));
    }

    let mut uuid = [0u8; 16];
    uuid.copy_from_slice(&data[2..18]);
    let major = u16::from_be_bytes([data[18], data[19]]);
    let minor = u16::from_be_bytes([data[20], data[21]]);

    Ok(Advertisement {
        uuid: BeaconUuid(uuid),
        mac,
        rssi,
        major,
        minor,
    })
}

/// Start scanning for iBeacon advertisements.
///
/// Advertisements (and frame decode errors) are delivered through the
/// returned channel until the receiver is dropped, which stops the scan.
pub async fn start_scan() -> Result<mpsc::Receiver<AdvertisementResult>, ScanError> {
    bluer::start_scan().await
}
