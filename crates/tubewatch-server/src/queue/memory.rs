//! In-process broker
//!
//! Mirrors the broker semantics the pipeline relies on: FIFO delivery,
//! manual ack, `nack(requeue)` putting the message back at the head with the
//! redelivered flag set, and unacked messages returning to the queue when the
//! connection drops. [`InMemoryQueue::simulate_disconnect`] ends every open
//! consumer stream the way a broker-side close does.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::Notify;

use super::{Acknowledger, ConnectionState, Delivery, DeliveryStream, MessageQueue, QueueError};

#[derive(Debug, Clone)]
struct Message {
    payload: Vec<u8>,
    redelivered: bool,
}

#[derive(Debug, Default)]
struct Inner {
    ready: VecDeque<Message>,
    unacked: HashMap<u64, Message>,
    next_tag: u64,
    generation: u64,
    closed: bool,
    published: u64,
    acked: u64,
    rejected: u64,
}

#[derive(Debug, Default)]
struct Shared {
    inner: Mutex<Inner>,
    notify: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryQueue {
    shared: Arc<Shared>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the "connection": open streams end and every unacked message is
    /// made ready again, flagged as redelivered.
    pub fn simulate_disconnect(&self) {
        {
            let mut inner = self.shared.lock();
            inner.generation += 1;

            let mut pending: Vec<(u64, Message)> = inner.unacked.drain().collect();
            pending.sort_by_key(|(tag, _)| *tag);
            for (_, mut message) in pending.into_iter().rev() {
                message.redelivered = true;
                inner.ready.push_front(message);
            }
        }
        tracing::warn!("in-memory broker connection dropped");
        self.shared.notify.notify_waiters();
    }

    pub fn ready_len(&self) -> usize {
        self.shared.lock().ready.len()
    }

    pub fn unacked_len(&self) -> usize {
        self.shared.lock().unacked.len()
    }

    pub fn published_count(&self) -> u64 {
        self.shared.lock().published
    }

    pub fn acked_count(&self) -> u64 {
        self.shared.lock().acked
    }

    /// Messages discarded through `nack(requeue = false)`.
    pub fn rejected_count(&self) -> u64 {
        self.shared.lock().rejected
    }

    /// Payloads currently waiting for a consumer, head first.
    pub fn ready_payloads(&self) -> Vec<Vec<u8>> {
        self.shared
            .lock()
            .ready
            .iter()
            .map(|m| m.payload.clone())
            .collect()
    }

    async fn next_delivery(shared: Arc<Shared>, generation: u64) -> Option<Delivery> {
        loop {
            let notified = shared.notify.notified();
            {
                let mut inner = shared.lock();
                if inner.closed || inner.generation != generation {
                    return None;
                }
                if let Some(message) = inner.ready.pop_front() {
                    inner.next_tag += 1;
                    let tag = inner.next_tag;
                    inner.unacked.insert(tag, message.clone());

                    let acker = MemoryAcker {
                        shared: Arc::clone(&shared),
                        generation,
                    };
                    return Some(Delivery::new(
                        message.payload,
                        tag,
                        message.redelivered,
                        Box::new(acker),
                    ));
                }
            }
            notified.await;
        }
    }
}

#[async_trait]
impl MessageQueue for InMemoryQueue {
    async fn publish(&self, payload: Vec<u8>) {
        {
            let mut inner = self.shared.lock();
            if inner.closed {
                tracing::error!(bytes = payload.len(), "publish on closed queue, message dropped");
                return;
            }
            inner.ready.push_back(Message {
                payload,
                redelivered: false,
            });
            inner.published += 1;
        }
        self.shared.notify.notify_waiters();
    }

    async fn consume(&self) -> Result<DeliveryStream, QueueError> {
        let generation = {
            let inner = self.shared.lock();
            if inner.closed {
                return Err(QueueError::Closed);
            }
            inner.generation
        };

        let shared = Arc::clone(&self.shared);
        let stream = futures::stream::unfold(shared, move |shared| async move {
            let delivery = Self::next_delivery(Arc::clone(&shared), generation).await?;
            Some((delivery, shared))
        });

        Ok(stream.boxed())
    }

    fn state(&self) -> ConnectionState {
        if self.shared.lock().closed {
            ConnectionState::Disconnected
        } else {
            ConnectionState::Connected
        }
    }

    async fn close(&self) -> Result<(), QueueError> {
        self.shared.lock().closed = true;
        self.shared.notify.notify_waiters();
        Ok(())
    }
}

struct MemoryAcker {
    shared: Arc<Shared>,
    generation: u64,
}

impl MemoryAcker {
    fn take(&self, inner: &mut Inner, delivery_tag: u64) -> Result<Message, QueueError> {
        if inner.generation != self.generation {
            return Err(QueueError::StaleDelivery(delivery_tag));
        }
        inner
            .unacked
            .remove(&delivery_tag)
            .ok_or(QueueError::StaleDelivery(delivery_tag))
    }
}

#[async_trait]
impl Acknowledger for MemoryAcker {
    async fn ack(&self, delivery_tag: u64) -> Result<(), QueueError> {
        let mut inner = self.shared.lock();
        self.take(&mut inner, delivery_tag)?;
        inner.acked += 1;
        Ok(())
    }

    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<(), QueueError> {
        {
            let mut inner = self.shared.lock();
            let mut message = self.take(&mut inner, delivery_tag)?;
            if !requeue {
                inner.rejected += 1;
                return Ok(());
            }
            message.redelivered = true;
            inner.ready.push_front(message);
        }
        self.shared.notify.notify_waiters();
        Ok(())
    }
}
