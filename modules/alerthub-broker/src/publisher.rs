//! Confirmed publisher over a lazily-connected channel.

use std::time::Duration;

use async_trait::async_trait;
use lapin::{
    options::{BasicPublishOptions, ConfirmSelectOptions, ExchangeDeclareOptions},
    publisher_confirm::Confirmation,
    types::FieldTable,
    BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind,
};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use alerthub_common::NormalizedAlert;

use crate::codec::encode_alert;

/// Reconnect policy: five attempts, fixed one-second backoff.
const CONNECT_ATTEMPTS: u32 = 5;
const CONNECT_DELAY: Duration = Duration::from_secs(1);

#[derive(Error, Debug)]
pub enum PublishError {
    /// No queue is bound for the routing key. The message is lost, not
    /// retried: the cause is a misconfigured topology, not a transient fault.
    #[error("message for routing key '{routing_key}' was unroutable and is lost")]
    Unroutable { routing_key: String },

    #[error("broker rejected the publish")]
    Nacked,

    #[error("broker error: {0}")]
    Broker(#[from] lapin::Error),

    #[error("alert failed to encode: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Seam for handing an alert to the broker. Lets services be tested with a
/// recording stand-in.
#[async_trait]
pub trait AlertPublisher: Send + Sync {
    async fn publish(&self, alert: &NormalizedAlert, routing_key: &str)
        -> Result<(), PublishError>;
}

/// Reliable producer owning one reusable connection/channel pair. `Ok` from
/// `publish` means the broker confirmed durable receipt.
pub struct Publisher {
    url: String,
    exchange: String,
    link: Mutex<Option<(Connection, Channel)>>,
}

impl Publisher {
    pub fn new(url: impl Into<String>, exchange: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            exchange: exchange.into(),
            link: Mutex::new(None),
        }
    }

    /// Open a fresh connection/channel pair: connect, enable publisher
    /// confirms, declare the exchange (idempotent).
    async fn open_link(&self) -> Result<(Connection, Channel), lapin::Error> {
        let connection = Connection::connect(&self.url, ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await?;
        channel
            .exchange_declare(
                &self.exchange,
                ExchangeKind::Direct,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        Ok((connection, channel))
    }

    async fn connect_with_retry(&self) -> Result<(Connection, Channel), PublishError> {
        let mut last_err = None;
        for attempt in 1..=CONNECT_ATTEMPTS {
            match self.open_link().await {
                Ok(link) => {
                    info!(attempt, exchange = %self.exchange, "Connected to broker");
                    return Ok(link);
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Broker connection failed");
                    last_err = Some(e);
                }
            }
            if attempt < CONNECT_ATTEMPTS {
                tokio::time::sleep(CONNECT_DELAY).await;
            }
        }
        Err(PublishError::Broker(last_err.expect("at least one attempt")))
    }

    async fn publish_once(
        &self,
        channel: &Channel,
        routing_key: &str,
        payload: &[u8],
    ) -> Result<Confirmation, lapin::Error> {
        // mandatory: have the broker return unroutable messages instead of
        // silently dropping them; delivery_mode 2: persist to disk.
        channel
            .basic_publish(
                &self.exchange,
                routing_key,
                BasicPublishOptions {
                    mandatory: true,
                    ..Default::default()
                },
                payload,
                BasicProperties::default().with_delivery_mode(2),
            )
            .await?
            .await
    }

    fn interpret(&self, confirmation: Confirmation, routing_key: &str) -> Result<(), PublishError> {
        match confirmation {
            Confirmation::Ack(None) | Confirmation::NotRequested => Ok(()),
            Confirmation::Ack(Some(_)) | Confirmation::Nack(Some(_)) => {
                error!(
                    exchange = %self.exchange,
                    routing_key,
                    "Publish was unroutable (no bound queue), message lost"
                );
                Err(PublishError::Unroutable {
                    routing_key: routing_key.to_string(),
                })
            }
            Confirmation::Nack(None) => Err(PublishError::Nacked),
        }
    }
}

#[async_trait]
impl AlertPublisher for Publisher {
    async fn publish(
        &self,
        alert: &NormalizedAlert,
        routing_key: &str,
    ) -> Result<(), PublishError> {
        let payload = encode_alert(alert)?;
        let mut guard = self.link.lock().await;

        let channel = match guard.as_ref() {
            Some((_, channel)) if channel.status().connected() => channel.clone(),
            _ => {
                let link = self.connect_with_retry().await?;
                let channel = link.1.clone();
                *guard = Some(link);
                channel
            }
        };

        match self.publish_once(&channel, routing_key, &payload).await {
            Ok(confirmation) => self.interpret(confirmation, routing_key),
            Err(e) => {
                // Channel fault mid-publish: reconnect once (itself bounded)
                // and retry before declaring failure.
                warn!(error = %e, routing_key, "Publish failed, reconnecting");
                *guard = None;
                let link = self.connect_with_retry().await?;
                let channel = link.1.clone();
                *guard = Some(link);
                let confirmation = self.publish_once(&channel, routing_key, &payload).await?;
                self.interpret(confirmation, routing_key)
            }
        }
    }
}
