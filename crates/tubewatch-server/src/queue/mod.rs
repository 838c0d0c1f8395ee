//! Durable message queue transport
//!
//! The fetcher publishes video batches and the ingestor consumes them through
//! the [`MessageQueue`] trait. Two implementations exist:
//!
//! - [`amqp::AmqpQueue`]: RabbitMQ over AMQP 0-9-1 (`lapin`), with a background
//!   reconnect task.
//! - [`memory::InMemoryQueue`]: an in-process broker with the same ack/nack and
//!   redelivery semantics, used by tests and `QUEUE_BACKEND=memory`.
//!
//! Deliveries are never auto-acked. A stream returned by
//! [`MessageQueue::consume`] ends when the underlying connection is lost; the
//! caller is expected to subscribe again once [`MessageQueue::state`] reports
//! [`ConnectionState::Connected`].

pub mod amqp;
pub mod memory;

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

pub use amqp::{AmqpQueue, AmqpSettings};
pub use memory::InMemoryQueue;

#[derive(Error, Debug)]
pub enum QueueError {
    /// Unrecoverable misconfiguration (bad URL, empty queue name)
    #[error("Queue configuration error: {0}")]
    Config(String),

    #[error("Broker error: {0}")]
    Broker(#[from] lapin::Error),

    #[error("Queue is not connected")]
    NotConnected,

    #[error("Queue has been closed")]
    Closed,

    #[error("Stale delivery {0}: its channel is gone")]
    StaleDelivery(u64),
}

/// Lifecycle of a transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Closing => "closing",
        };
        f.write_str(s)
    }
}

/// Settles a single delivery with the broker.
#[async_trait]
pub trait Acknowledger: Send + Sync {
    async fn ack(&self, delivery_tag: u64) -> Result<(), QueueError>;
    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<(), QueueError>;
}

/// One message taken off the queue. Must be settled with [`Delivery::ack`]
/// or [`Delivery::nack`]; dropping it leaves the message unacked until the
/// channel closes.
pub struct Delivery {
    pub payload: Vec<u8>,
    pub delivery_tag: u64,
    pub redelivered: bool,
    acker: Box<dyn Acknowledger>,
}

impl Delivery {
    pub fn new(
        payload: Vec<u8>,
        delivery_tag: u64,
        redelivered: bool,
        acker: Box<dyn Acknowledger>,
    ) -> Self {
        Self {
            payload,
            delivery_tag,
            redelivered,
            acker,
        }
    }

    pub async fn ack(self) -> Result<(), QueueError> {
        self.acker.ack(self.delivery_tag).await
    }

    pub async fn nack(self, requeue: bool) -> Result<(), QueueError> {
        self.acker.nack(self.delivery_tag, requeue).await
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("delivery_tag", &self.delivery_tag)
            .field("redelivered", &self.redelivered)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

pub type DeliveryStream = BoxStream<'static, Delivery>;

#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Publish a persistent message. Failures are logged and the message is
    /// dropped; publishing never blocks the caller on a broker outage.
    async fn publish(&self, payload: Vec<u8>);

    /// Subscribe to the queue with manual acknowledgement.
    async fn consume(&self) -> Result<DeliveryStream, QueueError>;

    fn state(&self) -> ConnectionState;

    /// Stop reconnecting and release the connection.
    async fn close(&self) -> Result<(), QueueError>;
}

/// Poll until the transport reports `Connected`, or `Closing`/`Disconnected`
/// after a close. Returns the state observed last.
pub async fn wait_until_connected(
    queue: &dyn MessageQueue,
    poll: std::time::Duration,
) -> ConnectionState {
    loop {
        match queue.state() {
            ConnectionState::Connecting => tokio::time::sleep(poll).await,
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_debug_hides_payload() {
        struct Noop;

        #[async_trait]
        impl Acknowledger for Noop {
            async fn ack(&self, _: u64) -> Result<(), QueueError> {
                Ok(())
            }
            async fn nack(&self, _: u64, _: bool) -> Result<(), QueueError> {
                Ok(())
            }
        }

        let delivery = Delivery::new(b"secret".to_vec(), 3, false, Box::new(Noop));
        let debug = format!("{delivery:?}");
        assert!(debug.contains("delivery_tag: 3"));
        assert!(!debug.contains("secret"));
    }

    #[test]
    fn test_connection_state_display() {
        assert_eq!(ConnectionState::Connecting.to_string(), "connecting");
        assert_eq!(ConnectionState::Closing.to_string(), "closing");
    }
}
