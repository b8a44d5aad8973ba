//! MQTT publish collaborator backed by `rumqttc`.
//!
//! The client enqueues publishes while a background task drives the
//! connection, reconnecting on its own. A down broker therefore costs
//! delivery, never pipeline state.

use crate::app::Publisher;
use crate::payload::Payload;
use rumqttc::{AsyncClient, Event, MqttOptions, QoS};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

/// How long the connection task waits before re-polling a failed connection.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Client capacity for publishes not yet handed to the broker.
const REQUEST_CHANNEL_CAPACITY: usize = 10;

/// Errors returned when a publish cannot be handed to the client.
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("MQTT publish failed: {0}")]
    Client(String),
}

/// Broker connection settings, built once at startup.
#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    /// Username/password pair; both or neither
    pub credentials: Option<(String, String)>,
    pub client_id: String,
}

/// MQTT publisher handing payloads to a broker over MQTT 3.1.1.
pub struct MqttPublisher {
    client: AsyncClient,
}

impl MqttPublisher {
    /// Create the client and spawn the connection-driving task.
    ///
    /// Connection errors are logged and retried in the background; this call
    /// itself cannot fail.
    pub fn connect(settings: &MqttSettings) -> Self {
        let mut options = MqttOptions::new(
            settings.client_id.clone(),
            settings.host.clone(),
            settings.port,
        );
        options.set_keep_alive(Duration::from_secs(25));
        if let Some((username, password)) = &settings.credentials {
            options.set_credentials(username.clone(), password.clone());
        }

        let (client, mut event_loop) = AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);

        tokio::spawn(async move {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(packet)) => log::debug!("MQTT received: {packet:?}"),
                    Ok(Event::Outgoing(_)) => {}
                    Err(error) => {
                        log::error!("MQTT connection error: {error}");
                        sleep(RECONNECT_DELAY).await;
                    }
                }
            }
        });

        MqttPublisher { client }
    }
}

fn qos_level(qos: u8) -> QoS {
    match qos {
        0 => QoS::AtMostOnce,
        1 => QoS::AtLeastOnce,
        _ => QoS::ExactlyOnce,
    }
}

impl Publisher for MqttPublisher {
    fn publish<'a>(
        &'a self,
        payload: &'a Payload,
    ) -> Pin<Box<dyn Future<Output = Result<(), PublishError>> + Send + 'a>> {
        Box::pin(async move {
            self.client
                .publish(
                    payload.topic.clone(),
                    qos_level(payload.qos),
                    payload.retain,
                    payload.body.clone(),
                )
                .await
                .map_err(|e| PublishError::Client(e.to_string()))
        })
    }
}
