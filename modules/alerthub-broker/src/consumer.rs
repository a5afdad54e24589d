//! Reconnecting consumer: declare, bind, consume, ack/nack, repeat.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;
use lapin::{
    message::Delivery,
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions,
        ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
    },
    types::FieldTable,
    Connection, ConnectionProperties, ExchangeKind,
};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use alerthub_common::NormalizedAlert;

use crate::codec::decode_alert;

/// Fixed delay before a reconnect attempt.
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConsumerState {
    Disconnected,
    Connecting,
    Bound,
    Consuming,
}

impl std::fmt::Display for ConsumerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConsumerState::Disconnected => write!(f, "disconnected"),
            ConsumerState::Connecting => write!(f, "connecting"),
            ConsumerState::Bound => write!(f, "bound"),
            ConsumerState::Consuming => write!(f, "consuming"),
        }
    }
}

/// Per-message processing seam. Completing without error acknowledges the
/// message; an error negatively acknowledges it without requeue.
#[async_trait]
pub trait AlertHandler: Send + Sync {
    async fn handle(&self, alert: NormalizedAlert, routing_key: &str) -> Result<()>;
}

/// Subscriber for one queue bound to any number of routing keys. Runs until
/// the shutdown signal flips; every connection fault goes back through a
/// fixed-delay reconnect.
pub struct Consumer {
    url: String,
    exchange: String,
    queue: String,
    routing_keys: Vec<String>,
}

impl Consumer {
    pub fn new(
        url: impl Into<String>,
        exchange: impl Into<String>,
        queue: impl Into<String>,
        routing_keys: Vec<String>,
    ) -> Self {
        Self {
            url: url.into(),
            exchange: exchange.into(),
            queue: queue.into(),
            routing_keys,
        }
    }

    /// The consume loop. Only returns when `shutdown` flips.
    pub async fn run(&self, handler: Arc<dyn AlertHandler>, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = shutdown.changed() => break,
                result = self.connect_and_consume(handler.clone()) => {
                    match result {
                        Ok(()) => warn!(queue = %self.queue, "Consume stream ended"),
                        Err(e) => warn!(queue = %self.queue, error = %e, "Consumer fault"),
                    }
                }
            }
            debug!(state = %ConsumerState::Disconnected, "Consumer state");

            info!(delay_secs = RECONNECT_DELAY.as_secs(), "Reconnecting consumer");
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(RECONNECT_DELAY) => {}
            }
        }
        info!(queue = %self.queue, "Consumer stopped");
    }

    async fn connect_and_consume(&self, handler: Arc<dyn AlertHandler>) -> Result<()> {
        debug!(state = %ConsumerState::Connecting, "Consumer state");
        let connection = Connection::connect(&self.url, ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;

        // Fair dispatch: one unacknowledged message at a time, so a slow
        // handler does not starve other consumers on the queue.
        channel.basic_qos(1, BasicQosOptions::default()).await?;

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
        channel
            .queue_declare(
                &self.queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        for routing_key in &self.routing_keys {
            channel
                .queue_bind(
                    &self.queue,
                    &self.exchange,
                    routing_key,
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await?;
        }
        debug!(state = %ConsumerState::Bound, keys = ?self.routing_keys, "Consumer state");

        let mut consumer = channel
            .basic_consume(
                &self.queue,
                "alerthub-fanout",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;
        info!(
            state = %ConsumerState::Consuming,
            queue = %self.queue,
            "Listening for alerts"
        );

        while let Some(delivery) = consumer.next().await {
            let delivery = delivery?;
            self.dispatch(handler.as_ref(), delivery).await?;
        }

        Ok(())
    }

    /// Process one delivery. Handler errors and undecodable bodies are
    /// nacked without requeue so a poison message cannot loop forever; only
    /// ack/nack transport failures propagate as connection faults.
    async fn dispatch(
        &self,
        handler: &dyn AlertHandler,
        delivery: Delivery,
    ) -> Result<(), lapin::Error> {
        let routing_key = delivery.routing_key.as_str().to_string();

        let alert = match decode_alert(&delivery.data) {
            Ok(alert) => alert,
            Err(e) => {
                warn!(routing_key, error = %e, "Undecodable message, dropping without requeue");
                return delivery
                    .nack(BasicNackOptions {
                        requeue: false,
                        ..Default::default()
                    })
                    .await;
            }
        };

        info!(routing_key, headline = %alert.headline, "Received alert");
        match handler.handle(alert, &routing_key).await {
            Ok(()) => delivery.ack(BasicAckOptions::default()).await,
            Err(e) => {
                warn!(routing_key, error = %e, "Handler failed, dropping without requeue");
                delivery
                    .nack(BasicNackOptions {
                        requeue: false,
                        ..Default::default()
                    })
                    .await
            }
        }
    }
}
