//! Core poll-decode-publish loop for `tilt2mqtt`.
//!
//! This module is intentionally decoupled from CLI parsing and process exit
//! codes, and reaches Bluetooth and the broker only through the [`Scanner`]
//! and [`Publisher`] seams so it can be tested deterministically.

use crate::advertisement::Advertisement;
use crate::duration::parse_duration;
use crate::metrics::Metrics;
use crate::mqtt::PublishError;
use crate::payload::{Payload, PayloadFormatter};
use crate::reading::Reading;
use crate::registry::{CalibrationArg, Registry, parse_calibration_arg};
use crate::scanner::{AdvertisementResult, ScanError};
use clap::Parser;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// Configuration for the core run loop.
#[derive(Parser, Debug, Clone)]
#[command(author, about, version)]
pub struct Options {
    /// MQTT broker hostname or IP address.
    #[arg(long, env = "MQTT_HOST", default_value = "127.0.0.1")]
    pub mqtt_host: String,

    /// MQTT broker port.
    #[arg(long, env = "MQTT_PORT", default_value_t = 1883)]
    pub mqtt_port: u16,

    /// MQTT username; requires --mqtt-password.
    #[arg(long, env = "MQTT_USERNAME")]
    pub mqtt_username: Option<String>,

    /// MQTT password; requires --mqtt-username.
    #[arg(long, env = "MQTT_PASSWORD")]
    pub mqtt_password: Option<String>,

    /// Calibration offsets for one Tilt color, overriding TILT_CAL_<COLOR>.
    /// Format: --calibrate Red=-2.0,0.002
    #[arg(long = "calibrate", value_parser = parse_calibration_arg, value_name = "COLOR=TEMP,SG")]
    pub calibrations: Vec<CalibrationArg>,

    /// How long each scan window stays open.
    /// Accepts duration with suffix: 25s, 1m, 500ms.
    #[arg(long, default_value = "25s", value_parser = parse_duration)]
    pub scan_window: Duration,

    /// Pause between scan windows.
    #[arg(long, default_value = "10m", value_parser = parse_duration)]
    pub idle_interval: Duration,

    /// Topic prefix; readings are published to <prefix>/<color>.
    #[arg(long, default_value = "tilt")]
    pub topic_prefix: String,

    /// File that log lines are appended to, next to the console output.
    #[arg(long, value_name = "PATH", default_value = "/tmp/tilt.log")]
    pub log_file: PathBuf,

    /// Verbose output, log per-advertisement diagnostics
    #[arg(short = 'v', long = "verbose", env = "MQTT_DEBUG")]
    pub verbose: bool,
}

/// Errors returned by the core run loop.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Scan(#[from] ScanError),
}

/// Scanner abstraction to enable deterministic unit tests without Bluetooth hardware.
pub trait Scanner: Send + Sync {
    fn start_scan(
        &self,
    ) -> Pin<
        Box<
            dyn Future<Output = Result<mpsc::Receiver<AdvertisementResult>, ScanError>>
                + Send
                + '_,
        >,
    >;
}

/// Real scanner implementation that delegates to the BlueZ backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealScanner;

impl Scanner for RealScanner {
    fn start_scan(
        &self,
    ) -> Pin<
        Box<
            dyn Future<Output = Result<mpsc::Receiver<AdvertisementResult>, ScanError>>
                + Send
                + '_,
        >,
    > {
        Box::pin(async move { crate::scanner::start_scan().await })
    }
}

/// Publish abstraction over the MQTT collaborator.
pub trait Publisher: Send + Sync {
    fn publish<'a>(
        &'a self,
        payload: &'a Payload,
    ) -> Pin<Box<dyn Future<Output = Result<(), PublishError>> + Send + 'a>>;
}

/// Run one advertisement through lookup, decode, transform and formatting.
///
/// Returns `None` (after logging) for devices not present in the registry;
/// that event produces no payload.
pub fn process_advertisement(
    advertisement: &Advertisement,
    registry: &Registry,
    formatter: &PayloadFormatter,
) -> Option<Payload> {
    log::debug!(
        "<{}, {}> major={} minor={}",
        advertisement.mac,
        advertisement.rssi,
        advertisement.major,
        advertisement.minor
    );

    let Some(device) = registry.lookup(&advertisement.uuid) else {
        log::error!(
            "unable to resolve Tilt color: unknown uuid {} from {}",
            advertisement.uuid,
            advertisement.mac
        );
        return None;
    };

    let reading = Reading::decode(advertisement, device);
    let metrics = Metrics::derive(&reading);
    Some(formatter.payload(device.label(), &reading, &metrics, advertisement.rssi))
}

/// Run a single scan window and return how many readings were published.
///
/// Advertisements are processed as they arrive until the window expires or
/// the scanner closes its channel. Malformed frames and publish failures are
/// logged and skipped; neither ends the cycle.
pub async fn run_cycle(
    scanner: &dyn Scanner,
    publisher: &dyn Publisher,
    registry: &Registry,
    formatter: &PayloadFormatter,
    window: Duration,
) -> Result<u64, RunError> {
    let mut advertisements = scanner.start_scan().await?;
    let mut published = 0;

    let window_end = tokio::time::sleep(window);
    tokio::pin!(window_end);

    loop {
        tokio::select! {
            _ = &mut window_end => break,
            event = advertisements.recv() => match event {
                Some(Ok(advertisement)) => {
                    let Some(payload) = process_advertisement(&advertisement, registry, formatter)
                    else {
                        continue;
                    };
                    match publisher.publish(&payload).await {
                        Ok(()) => published += 1,
                        Err(error) => {
                            log::error!("publish to {} failed: {error}", payload.topic);
                        }
                    }
                }
                Some(Err(decode_error)) => {
                    log::error!("device does not look like a Tilt hydrometer: {decode_error}");
                }
                None => break,
            },
        }
    }

    Ok(published)
}

/// Build the device registry from the environment plus CLI overrides.
fn build_registry(options: &Options) -> Registry {
    let mut registry = Registry::from_env();
    for arg in &options.calibrations {
        if !registry.set_calibration(&arg.label, arg.calibration) {
            log::warn!("--calibrate {}: not a known Tilt color", arg.label);
        }
    }
    registry
}

/// Run the poll loop: scan windows alternating with idle pauses, forever.
///
/// Returns only if a scan window cannot be opened at all (e.g. no Bluetooth
/// adapter); everything below that is logged and survived.
pub async fn run(
    options: Options,
    scanner: &dyn Scanner,
    publisher: &dyn Publisher,
) -> Result<(), RunError> {
    let registry = build_registry(&options);
    let formatter = PayloadFormatter::new(options.topic_prefix.clone());

    loop {
        log::info!("Started scanning");
        let published = run_cycle(
            scanner,
            publisher,
            &registry,
            &formatter,
            options.scan_window,
        )
        .await?;
        log::info!("Stopped scanning, published {published} readings");

        tokio::time::sleep(options.idle_interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beacon_uuid::BeaconUuid;
    use crate::registry::Calibration;
    use crate::scanner::DecodeError;
    use crate::test_utils::{BLUE_UUID, TEST_MAC, advertisement};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct FakeScanner {
        cycles: Mutex<VecDeque<Vec<AdvertisementResult>>>,
    }

    impl FakeScanner {
        fn new(cycles: Vec<Vec<AdvertisementResult>>) -> Self {
            Self {
                cycles: Mutex::new(cycles.into()),
            }
        }

        /// A scanner whose every window sees no advertisements.
        fn silent() -> Self {
            Self::default()
        }
    }

    impl Scanner for FakeScanner {
        fn start_scan(
            &self,
        ) -> Pin<
            Box<
                dyn Future<Output = Result<mpsc::Receiver<AdvertisementResult>, ScanError>>
                    + Send
                    + '_,
            >,
        > {
            let results = self.cycles.lock().unwrap().pop_front().unwrap_or_default();
            Box::pin(async move {
                let (tx, rx) = mpsc::channel::<AdvertisementResult>(results.len().max(1));
                tokio::spawn(async move {
                    for r in results {
                        let _ = tx.send(r).await;
                    }
                    // drop tx to close channel
                });
                Ok(rx)
            })
        }
    }

    #[derive(Debug, Default)]
    struct FakePublisher {
        published: Mutex<Vec<Payload>>,
        fail: bool,
    }

    impl FakePublisher {
        fn new() -> Self {
            Self::default()
        }

        fn failing() -> Self {
            Self {
                published: Mutex::new(vec![]),
                fail: true,
            }
        }

        fn payloads(&self) -> Vec<Payload> {
            self.published.lock().unwrap().clone()
        }
    }

    impl Publisher for FakePublisher {
        fn publish<'a>(
            &'a self,
            payload: &'a Payload,
        ) -> Pin<Box<dyn Future<Output = Result<(), PublishError>> + Send + 'a>> {
            Box::pin(async move {
                if self.fail {
                    return Err(PublishError::Client("broker unreachable".to_string()));
                }
                self.published.lock().unwrap().push(payload.clone());
                Ok(())
            })
        }
    }

    fn formatter() -> PayloadFormatter {
        PayloadFormatter::new("tilt".to_string())
    }

    fn test_options() -> Options {
        Options {
            mqtt_host: "127.0.0.1".to_string(),
            mqtt_port: 1883,
            mqtt_username: None,
            mqtt_password: None,
            calibrations: vec![],
            scan_window: Duration::from_secs(25),
            idle_interval: Duration::from_secs(600),
            topic_prefix: "tilt".to_string(),
            log_file: PathBuf::from("/tmp/tilt.log"),
            verbose: false,
        }
    }

    #[tokio::test]
    async fn run_cycle_publishes_known_device() {
        let scanner = FakeScanner::new(vec![vec![Ok(advertisement(73, 989))]]);
        let publisher = FakePublisher::new();
        let registry = Registry::uncalibrated();

        let published = run_cycle(
            &scanner,
            &publisher,
            &registry,
            &formatter(),
            Duration::from_secs(25),
        )
        .await
        .unwrap();

        assert_eq!(published, 1);
        let payloads = publisher.payloads();
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0].topic, "tilt/Blue");
        assert_eq!(payloads[0].qos, 2);
        assert!(payloads[0].retain);
        assert!(payloads[0].body.contains("\"specific_gravity_uncali\":\"0.989\""));
        assert!(payloads[0].body.contains("\"temperature_fahrenheit_uncali\":\"73.0\""));
        assert!(payloads[0].body.contains("\"rssi\":\"-95\""));
    }

    #[tokio::test]
    async fn run_cycle_applies_calibration() {
        let scanner = FakeScanner::new(vec![vec![Ok(advertisement(73, 989))]]);
        let publisher = FakePublisher::new();
        let mut registry = Registry::uncalibrated();
        registry.set_calibration(
            "Blue",
            Calibration {
                temperature: -2.0,
                gravity: 0.002,
            },
        );

        run_cycle(
            &scanner,
            &publisher,
            &registry,
            &formatter(),
            Duration::from_secs(25),
        )
        .await
        .unwrap();

        let payloads = publisher.payloads();
        assert_eq!(payloads.len(), 1);
        assert!(payloads[0].body.contains("\"specific_gravity_cali\":\"0.991\""));
        assert!(payloads[0].body.contains("\"temperature_fahrenheit_cali\":\"71.0\""));
        assert!(!payloads[0].body.contains("uncali"));
    }

    #[tokio::test]
    async fn run_cycle_drops_unknown_device() {
        let stranger = Advertisement {
            uuid: BeaconUuid([0xFF; 16]),
            ..advertisement(73, 989)
        };
        let scanner = FakeScanner::new(vec![vec![Ok(stranger)]]);
        let publisher = FakePublisher::new();
        let registry = Registry::uncalibrated();

        let published = run_cycle(
            &scanner,
            &publisher,
            &registry,
            &formatter(),
            Duration::from_secs(25),
        )
        .await
        .unwrap();

        assert_eq!(published, 0);
        assert!(publisher.payloads().is_empty());
    }

    #[tokio::test]
    async fn run_cycle_drops_malformed_frames() {
        let scanner = FakeScanner::new(vec![vec![
            Err(DecodeError::Truncated(3)),
            Ok(advertisement(73, 989)),
        ]]);
        let publisher = FakePublisher::new();
        let registry = Registry::uncalibrated();

        let published = run_cycle(
            &scanner,
            &publisher,
            &registry,
            &formatter(),
            Duration::from_secs(25),
        )
        .await
        .unwrap();

        // The malformed frame is dropped, the good one still goes through
        assert_eq!(published, 1);
        assert_eq!(publisher.payloads().len(), 1);
    }

    #[tokio::test]
    async fn run_cycle_survives_publish_failure() {
        let scanner = FakeScanner::new(vec![vec![Ok(advertisement(73, 989))]]);
        let publisher = FakePublisher::failing();
        let registry = Registry::uncalibrated();

        let published = run_cycle(
            &scanner,
            &publisher,
            &registry,
            &formatter(),
            Duration::from_secs(25),
        )
        .await
        .unwrap();

        assert_eq!(published, 0);
    }

    #[tokio::test]
    async fn empty_cycles_publish_nothing() {
        let scanner = FakeScanner::silent();
        let publisher = FakePublisher::new();
        let registry = Registry::uncalibrated();

        for _ in 0..5 {
            let published = run_cycle(
                &scanner,
                &publisher,
                &registry,
                &formatter(),
                Duration::from_secs(25),
            )
            .await
            .unwrap();
            assert_eq!(published, 0);
        }
        assert!(publisher.payloads().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn run_keeps_looping_when_nothing_is_found() {
        let scanner = FakeScanner::silent();
        let publisher = FakePublisher::new();

        // The loop has no terminal state; after an hour of simulated
        // scan/idle cycles it must still be running
        let outcome = tokio::time::timeout(
            Duration::from_secs(3600),
            run(test_options(), &scanner, &publisher),
        )
        .await;

        assert!(outcome.is_err());
        assert!(publisher.payloads().is_empty());
    }

    #[test]
    fn process_advertisement_is_idempotent() {
        let registry = Registry::uncalibrated();
        let formatter = formatter();
        let adv = advertisement(73, 989);

        let first = process_advertisement(&adv, &registry, &formatter);
        let second = process_advertisement(&adv, &registry, &formatter);
        assert_eq!(first, second);
        assert!(first.is_some());
    }

    #[test]
    fn build_registry_applies_cli_overrides() {
        let mut options = test_options();
        options.calibrations = vec![CalibrationArg {
            label: "Blue".to_string(),
            calibration: Calibration {
                temperature: 1.0,
                gravity: -0.001,
            },
        }];

        let registry = build_registry(&options);
        let entry = registry.lookup(&BLUE_UUID).unwrap();
        assert_eq!(
            entry.calibration(),
            Some(Calibration {
                temperature: 1.0,
                gravity: -0.001,
            })
        );
    }

    #[test]
    fn advertisement_helper_uses_test_address() {
        assert_eq!(advertisement(73, 989).mac, TEST_MAC);
    }
}
