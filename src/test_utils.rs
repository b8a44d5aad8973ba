use crate::advertisement::{Advertisement, MacAddress};
use crate::beacon_uuid::BeaconUuid;
use crate::scanner::{IBEACON_FRAME_LEN, IBEACON_PREFIX};

/// A stable Bluetooth address for unit tests.
pub const TEST_MAC: MacAddress = MacAddress([0xEA, 0xCA, 0xEB, 0xF0, 0x0F, 0xB5]);

/// The Blue Tilt's proximity UUID.
pub const BLUE_UUID: BeaconUuid = BeaconUuid([
    0xA4, 0x95, 0xBB, 0x60, 0xC5, 0xB1, 0x4B, 0x44, 0xB5, 0x12, 0x13, 0x70, 0xF0, 0x2D, 0x74,
    0xDE,
]);

/// Build an advertisement from the Blue Tilt with the given raw fields.
pub fn advertisement(major: u16, minor: u16) -> Advertisement {
    Advertisement {
        uuid: BLUE_UUID,
        mac: TEST_MAC,
        rssi: -95,
        major,
        minor,
    }
}

/// Build a raw iBeacon manufacturer-data frame (without the company ID).
pub fn ibeacon_frame(uuid: &BeaconUuid, major: u16, minor: u16) -> Vec<u8> {
    let mut frame = Vec::with_capacity(IBEACON_FRAME_LEN);
    frame.extend_from_slice(&IBEACON_PREFIX);
    frame.extend_from_slice(&uuid.0);
    frame.extend_from_slice(&major.to_be_bytes());
    frame.extend_from_slice(&minor.to_be_bytes());
    frame.push(0xC5); // measured tx power
    frame
}
