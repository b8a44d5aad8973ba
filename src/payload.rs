//! MQTT payload assembly.
//!
//! Builds the flat key/value message published for each reading. Field names
//! carry a `_cali`/`_uncali` suffix so consumers can tell whether calibration
//! offsets were applied, and values are formatted strings rather than JSON
//! numbers — that is the historical wire contract and downstream dashboards
//! depend on it.

use crate::metrics::Metrics;
use crate::reading::Reading;
use serde_json::{Map, Value};

/// QoS level for published readings (exactly once).
pub const PAYLOAD_QOS: u8 = 2;

/// A message ready to hand to the publish collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    pub topic: String,
    pub body: String,
    pub qos: u8,
    pub retain: bool,
}

/// Formatter assembling payloads for decoded readings.
pub struct PayloadFormatter {
    /// Topic prefix; the full topic is `{prefix}/{color}`
    topic_prefix: String,
}

impl PayloadFormatter {
    pub fn new(topic_prefix: String) -> Self {
        Self { topic_prefix }
    }

    /// Build the retained QoS-2 payload for one reading.
    pub fn payload(&self, label: &str, reading: &Reading, metrics: &Metrics, rssi: i16) -> Payload {
        let suffix = if reading.calibrated { "cali" } else { "uncali" };

        let mut fields = Map::new();
        let mut field = |name: &str, value: String| {
            fields.insert(name.to_string(), Value::String(value));
        };
        field(
            &format!("specific_gravity_{suffix}"),
            format!("{:.3}", reading.specific_gravity),
        );
        field(&format!("plato_{suffix}"), format!("{:.2}", metrics.plato));
        field(
            &format!("temperature_celsius_{suffix}"),
            format!("{:.2}", metrics.temperature_celsius),
        );
        field(
            &format!("temperature_fahrenheit_{suffix}"),
            format!("{:.1}", reading.temperature_fahrenheit),
        );
        field("rssi", format!("{rssi}"));

        Payload {
            topic: format!("{}/{}", self.topic_prefix, label),
            body: Value::Object(fields).to_string(),
            qos: PAYLOAD_QOS,
            retain: true,
        }
    }
}
