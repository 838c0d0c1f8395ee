//! Queue consumer that persists video batches
//!
//! Per delivery:
//! - payload does not decode: reject without requeue (it can never succeed)
//! - insert fails: `nack(requeue = true)` so the broker redelivers it
//! - insert succeeds (including "all duplicates"): ack
//!
//! There is no dead-letter path; a batch that keeps failing keeps coming back.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use thiserror::Error;

use super::storage::VideoStore;
use crate::models::decode_batch;
use crate::queue::{
    wait_until_connected, ConnectionState, Delivery, DeliveryStream, MessageQueue, QueueError,
};

pub const DEFAULT_RESUBSCRIBE_DELAY: Duration = Duration::from_secs(1);

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Failed to subscribe: {0}")]
    Subscribe(#[source] QueueError),

    #[error("Failed to settle delivery {tag}: {source}")]
    Settle {
        tag: u64,
        #[source]
        source: QueueError,
    },
}

/// How a delivery was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Acked { inserted: u64 },
    Requeued,
    Dropped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub acked: u64,
    pub requeued: u64,
    pub dropped: u64,
    pub inserted: u64,
    pub settle_failures: u64,
}

impl IngestStats {
    fn record(&mut self, outcome: &Result<DeliveryOutcome, IngestError>) {
        match outcome {
            Ok(DeliveryOutcome::Acked { inserted }) => {
                self.acked += 1;
                self.inserted += inserted;
            },
            Ok(DeliveryOutcome::Requeued) => self.requeued += 1,
            Ok(DeliveryOutcome::Dropped) => self.dropped += 1,
            Err(_) => self.settle_failures += 1,
        }
    }
}

#[derive(Clone)]
pub struct Ingestor {
    store: Arc<dyn VideoStore>,
    queue: Arc<dyn MessageQueue>,
    resubscribe_delay: Duration,
}

impl Ingestor {
    pub fn new(store: Arc<dyn VideoStore>, queue: Arc<dyn MessageQueue>) -> Self {
        Self {
            store,
            queue,
            resubscribe_delay: DEFAULT_RESUBSCRIBE_DELAY,
        }
    }

    pub fn with_resubscribe_delay(mut self, delay: Duration) -> Self {
        self.resubscribe_delay = delay;
        self
    }

    #[tracing::instrument(
        skip(self, delivery),
        fields(tag = delivery.delivery_tag, redelivered = delivery.redelivered)
    )]
    pub async fn process_delivery(&self, delivery: Delivery) -> Result<DeliveryOutcome, IngestError> {
        let tag = delivery.delivery_tag;
        let settle = |source| IngestError::Settle { tag, source };

        let videos = match decode_batch(&delivery.payload) {
            Ok(videos) => videos,
            Err(e) => {
                tracing::error!(error = %e, bytes = delivery.payload.len(), "Dropping undecodable batch");
                delivery.nack(false).await.map_err(settle)?;
                return Ok(DeliveryOutcome::Dropped);
            },
        };

        match self.store.insert_videos(&videos).await {
            Ok(inserted) => {
                delivery.ack().await.map_err(settle)?;
                tracing::info!(batch = videos.len(), inserted, "Batch persisted");
                Ok(DeliveryOutcome::Acked { inserted })
            },
            Err(e) => {
                tracing::warn!(error = %e, batch = videos.len(), "Persist failed, requeueing batch");
                delivery.nack(true).await.map_err(settle)?;
                Ok(DeliveryOutcome::Requeued)
            },
        }
    }

    /// Drain a delivery stream until it ends.
    pub async fn run(&self, mut deliveries: DeliveryStream) -> IngestStats {
        let mut stats = IngestStats::default();

        while let Some(delivery) = deliveries.next().await {
            let outcome = self.process_delivery(delivery).await;
            if let Err(ref e) = outcome {
                tracing::warn!(error = %e, "Delivery could not be settled");
            }
            stats.record(&outcome);
        }

        stats
    }

    /// Consume until the queue is closed, subscribing again whenever the
    /// stream ends because the connection dropped.
    pub async fn run_forever(&self) -> Result<IngestStats, IngestError> {
        let mut total = IngestStats::default();
        let poll = self.resubscribe_delay.max(Duration::from_millis(10));

        loop {
            if wait_until_connected(self.queue.as_ref(), poll).await != ConnectionState::Connected {
                tracing::info!("Queue closed, ingestor stopping");
                return Ok(total);
            }

            match self.queue.consume().await {
                Ok(stream) => {
                    tracing::info!("Ingestor subscribed");
                    let stats = self.run(stream).await;
                    total.acked += stats.acked;
                    total.requeued += stats.requeued;
                    total.dropped += stats.dropped;
                    total.inserted += stats.inserted;
                    total.settle_failures += stats.settle_failures;
                    tracing::warn!(?stats, "Delivery stream ended");
                },
                Err(QueueError::Closed) => {
                    tracing::info!("Queue closed, ingestor stopping");
                    return Ok(total);
                },
                Err(QueueError::Config(msg)) => {
                    return Err(IngestError::Subscribe(QueueError::Config(msg)));
                },
                Err(e) => {
                    tracing::warn!(error = %e, "Subscribe failed, retrying");
                },
            }

            tokio::time::sleep(self.resubscribe_delay).await;
        }
    }
}
