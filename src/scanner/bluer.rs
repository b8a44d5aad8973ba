//! BlueZ D-Bus backend for iBeacon scanning.
//!
//! This backend uses the `bluer` crate to communicate with the BlueZ daemon
//! via D-Bus. It requires the `bluetoothd` daemon to be running.

use super::{
    ADVERTISEMENT_CHANNEL_BUFFER_SIZE, APPLE_COMPANY_ID, AdvertisementResult, IBEACON_PATTERN,
    MANUFACTURER_DATA_TYPE, ScanError, decode_ibeacon_frame,
};
use crate::advertisement::MacAddress;
use bluer::monitor::{Monitor, MonitorEvent, Pattern};
use bluer::{Adapter, Address, Session};
use futures::StreamExt;
use tokio::sync::mpsc;

impl From<bluer::Error> for ScanError {
    fn from(err: bluer::Error) -> Self {
        ScanError::Bluetooth(err.to_string())
    }
}

/// Start scanning for iBeacon advertisements using the BlueZ D-Bus backend.
///
/// Initializes the Bluetooth adapter and registers a monitor matching Apple
/// iBeacon manufacturer data. Decoded advertisements (and frame decode
/// errors) are sent through the returned channel; the scan stops when the
/// receiver is dropped.
pub async fn start_scan() -> Result<mpsc::Receiver<AdvertisementResult>, ScanError> {
    let session = Session::new().await?;
    let adapter = session.default_adapter().await?;
    adapter.set_powered(true).await?;

    let (tx, rx) = mpsc::channel(ADVERTISEMENT_CHANNEL_BUFFER_SIZE);

    // Match only Apple manufacturer data opening an iBeacon proximity frame
    let pattern = Pattern {
        data_type: MANUFACTURER_DATA_TYPE,
        start_position: 0,
        content: IBEACON_PATTERN.to_vec(),
    };

    let monitor_manager = adapter.monitor().await?;
    let mut monitor_handle = monitor_manager
        .register(Monitor {
            patterns: Some(vec![pattern]),
            ..Default::default()
        })
        .await?;

    // Spawn a task that owns all Bluetooth state and runs the event loop.
    // Dropping the receiver closes the channel, which ends the task and with
    // it the monitor registration.
    tokio::spawn(async move {
        let _session = session;
        let _monitor_manager = monitor_manager;

        loop {
            tokio::select! {
                _ = tx.closed() => break,
                event = monitor_handle.next() => match event {
                    Some(MonitorEvent::DeviceFound(device_id)) => {
                        if let Err(e) = process_device(&adapter, device_id.device, &tx).await {
                            log::debug!("skipping device event: {e}");
                        }
                    }
                    Some(_) => {}
                    None => break,
                },
            }
        }
    });

    Ok(rx)
}

/// Process a discovered Bluetooth device and forward its iBeacon frame.
///
/// Reads the device's manufacturer data and, if it carries Apple company
/// data, decodes it as an iBeacon advertisement. Results are sent through
/// the provided channel.
async fn process_device(
    adapter: &Adapter,
    address: Address,
    tx: &mpsc::Sender<AdvertisementResult>,
) -> Result<(), ScanError> {
    let device = adapter.device(address)?;
    let mac: MacAddress = address.into();

    let manufacturer_data = match device.manufacturer_data().await? {
        Some(data) => data,
        None => return Ok(()), // No manufacturer data available
    };

    let frame = match manufacturer_data.get(&APPLE_COMPANY_ID) {
        Some(data) => data,
        None => return Ok(()), // Not an iBeacon
    };

    // BlueZ reports RSSI per device; it can be briefly absent right after
    // discovery, in which case 0 is published
    let rssi = device.rssi().await?.unwrap_or(0);

    let _ = tx.send(decode_ibeacon_frame(mac, rssi, frame)).await;

    Ok(())
}
