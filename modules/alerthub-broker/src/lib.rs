//! RabbitMQ plumbing between ingestion and fan-out.
//!
//! One durable direct exchange, durable queues bound by routing key. The
//! `Publisher` confirms every publish with the broker; the `Consumer` runs a
//! reconnect loop with prefetch 1 and explicit ack/nack. Each role owns its
//! connection outright, nothing is shared between them.

pub mod codec;
pub mod consumer;
pub mod publisher;

pub use codec::{decode_alert, encode_alert};
pub use consumer::{AlertHandler, Consumer};
pub use publisher::{AlertPublisher, PublishError, Publisher};
