//! Fan-out of drained batches to stream subscribers
//!
//! Each connected client gets a bounded queue. Publishing never waits on a
//! queue: a full queue drops the payload for that subscriber only, and a
//! closed queue is pruned from the registry.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use futures::Stream;
use parking_lot::RwLock;
use tokio::sync::mpsc::{self, error::TrySendError};

use logcollect_types::Payload;

/// Default per-subscriber queue length
const DEFAULT_QUEUE_CAPACITY: usize = 16;

/// Outcome of one [`Broadcaster::publish`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Subscribers that accepted the payload
    pub delivered: usize,
    /// Subscribers whose queue was full
    pub dropped: usize,
    /// Subscribers found disconnected and removed
    pub closed: usize,
}

/// Registry of active subscriber queues
#[derive(Clone)]
pub struct Broadcaster {
    subscribers: Arc<RwLock<HashMap<u64, mpsc::Sender<Payload>>>>,
    next_id: Arc<AtomicU64>,
    queue_capacity: usize,
}

impl Broadcaster {
    /// Create a broadcaster whose subscribers buffer up to `queue_capacity` payloads
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            subscribers: Arc::new(RwLock::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Register a new subscriber.
    ///
    /// The registration lasts until the returned [`Subscription`] is dropped
    /// or [`Broadcaster::unsubscribe`] is called with its id.
    pub fn subscribe(&self) -> Subscription {
        let (sender, receiver) = mpsc::channel(self.queue_capacity);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.write().insert(id, sender);

        tracing::debug!(subscriber_id = id, "stream subscriber registered");

        Subscription {
            id,
            receiver,
            broadcaster: self.clone(),
        }
    }

    /// Remove a registration. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: u64) -> bool {
        let removed = self.subscribers.write().remove(&id).is_some();
        if removed {
            tracing::debug!(subscriber_id = id, "stream subscriber removed");
        }
        removed
    }

    /// Offer `payload` to every registered subscriber without waiting
    pub fn publish(&self, payload: Payload) -> PublishReport {
        // Copy the senders out so no lock is held while sending
        let targets: Vec<(u64, mpsc::Sender<Payload>)> = self
            .subscribers
            .read()
            .iter()
            .map(|(id, sender)| (*id, sender.clone()))
            .collect();

        let mut report = PublishReport::default();
        let mut disconnected = Vec::new();

        for (id, sender) in targets {
            match sender.try_send(Arc::clone(&payload)) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::trace!(subscriber_id = id, "subscriber queue full, payload dropped");
                    report.dropped += 1;
                }
                Err(TrySendError::Closed(_)) => disconnected.push(id),
            }
        }

        if !disconnected.is_empty() {
            let mut subscribers = self.subscribers.write();
            for id in &disconnected {
                subscribers.remove(id);
            }
            report.closed = disconnected.len();
        }

        report
    }

    /// Number of registered subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Check if anyone is listening
    pub fn has_subscribers(&self) -> bool {
        !self.subscribers.read().is_empty()
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

/// Receiving end of one stream subscriber.
///
/// Dropping it unregisters the subscriber.
pub struct Subscription {
    id: u64,
    receiver: mpsc::Receiver<Payload>,
    broadcaster: Broadcaster,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next payload. Returns `None` once unsubscribed and drained.
    pub async fn recv(&mut self) -> Option<Payload> {
        self.receiver.recv().await
    }

    /// Take a payload if one is queued
    pub fn try_recv(&mut self) -> Option<Payload> {
        self.receiver.try_recv().ok()
    }
}

impl Stream for Subscription {
    type Item = Payload;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.broadcaster.unsubscribe(self.id);
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
