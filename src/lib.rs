//! `tilt2mqtt` library.
//!
//! The binary (`src/main.rs`) is responsible for CLI parsing, logging setup
//! and process exit codes. The core poll-decode-publish loop lives in
//! [`crate::app`] where it can be tested deterministically with an injected
//! scanner and publisher.

pub mod advertisement;
pub mod app;
pub mod beacon_uuid;
pub mod duration;
pub mod logging;
pub mod metrics;
pub mod mqtt;
pub mod payload;
pub mod reading;
pub mod registry;
pub mod scanner;

#[cfg(test)]
pub mod test_utils;

// Re-export commonly used types at the crate root
pub use advertisement::{Advertisement, MacAddress};
pub use app::{Options, Publisher, RealScanner, Scanner, process_advertisement};
pub use beacon_uuid::BeaconUuid;
pub use duration::parse_duration;
pub use metrics::{Metrics, fahrenheit_to_celsius, gravity_to_plato};
pub use mqtt::{MqttPublisher, MqttSettings, PublishError};
pub use payload::{Payload, PayloadFormatter};
pub use reading::Reading;
pub use registry::{Calibration, DeviceEntry, KNOWN_DEVICES, Registry, parse_calibration};
pub use scanner::{AdvertisementResult, DecodeError, ScanError, decode_ibeacon_frame};
