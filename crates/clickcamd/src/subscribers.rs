//! Subscriber registries for the relay channels.
//!
//! Each relay channel (events, video) keeps its own [`SubscriberRegistry`].
//! Every subscriber gets a small bounded queue; a broadcast is a
//! non-blocking `try_send` to each member, so one slow client can never
//! stall delivery to the others or back-pressure the producer.
//!
//! # Delivery Rules
//!
//! - A subscriber only receives payloads broadcast after it joined.
//! - Payloads reach each subscriber in broadcast order (the queue is FIFO).
//! - A subscriber whose queue is full or whose receiver is gone is skipped
//!   for that payload. Broadcast never removes members; that is the
//!   connection's job via [`SubscriberRegistry::leave`].

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, trace};

// ============================================================================
// Types
// ============================================================================

/// Unique subscriber identifier. Never reused within a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("{registry} registry full ({max} subscribers)")]
    TooManySubscribers { registry: &'static str, max: usize },
}

/// A joined subscriber's end of the channel.
#[derive(Debug)]
pub struct Subscription<T> {
    pub id: SubscriberId,
    pub receiver: mpsc::Receiver<T>,
}

/// Outcome of a single broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub skipped: usize,
}

struct Subscriber<T> {
    sender: mpsc::Sender<T>,
    skipped: AtomicU64,
}

impl<T> Subscriber<T> {
    /// Ready means the queue has room and the receiver is still alive.
    fn is_ready(&self) -> bool {
        !self.sender.is_closed() && self.sender.capacity() > 0
    }
}

type SubscribersMap<T> = Arc<RwLock<HashMap<SubscriberId, Subscriber<T>>>>;

// ============================================================================
// Registry
// ============================================================================

/// The set of live subscribers for one relay channel.
///
/// Cloning yields another handle to the same set.
pub struct SubscriberRegistry<T> {
    name: &'static str,
    subscribers: SubscribersMap<T>,
    next_id: Arc<AtomicU64>,
    queue_depth: usize,
    max_subscribers: usize,
}

impl<T> Clone for SubscriberRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            subscribers: Arc::clone(&self.subscribers),
            next_id: Arc::clone(&self.next_id),
            queue_depth: self.queue_depth,
            max_subscribers: self.max_subscribers,
        }
    }
}

impl<T: Clone + Send + Sync + 'static> SubscriberRegistry<T> {
    /// Creates an empty registry. `queue_depth` is clamped to at least 1.
    pub fn new(name: &'static str, queue_depth: usize, max_subscribers: usize) -> Self {
        Self {
            name,
            subscribers: Arc::new(RwLock::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            queue_depth: queue_depth.max(1),
            max_subscribers,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Adds a subscriber.
    ///
    /// # Errors
    ///
    /// - `RegistryError::TooManySubscribers` if the registry is full
    pub async fn join(&self) -> Result<Subscription<T>, RegistryError> {
        let mut subs = self.subscribers.write().await;
        if subs.len() >= self.max_subscribers {
            return Err(RegistryError::TooManySubscribers {
                registry: self.name,
                max: self.max_subscribers,
            });
        }

        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = mpsc::channel(self.queue_depth);
        subs.insert(
            id,
            Subscriber {
                sender,
                skipped: AtomicU64::new(0),
            },
        );

        debug!(registry = self.name, subscriber = %id, total = subs.len(), "Subscriber joined");
        Ok(Subscription { id, receiver })
    }

    /// Removes a subscriber. Returns `false` if it was already gone.
    pub async fn leave(&self, id: SubscriberId) -> bool {
        let mut subs = self.subscribers.write().await;
        match subs.remove(&id) {
            Some(sub) => {
                debug!(
                    registry = self.name,
                    subscriber = %id,
                    skipped = sub.skipped.load(Ordering::Relaxed),
                    total = subs.len(),
                    "Subscriber left"
                );
                true
            }
            None => false,
        }
    }

    /// Offers `payload` to every ready subscriber without blocking.
    pub async fn broadcast(&self, payload: T) -> BroadcastReport {
        let subs = self.subscribers.read().await;
        let mut report = BroadcastReport::default();

        for (id, sub) in subs.iter() {
            if !sub.is_ready() {
                sub.skipped.fetch_add(1, Ordering::Relaxed);
                report.skipped += 1;
                trace!(registry = self.name, subscriber = %id, "Subscriber not ready, skipped");
                continue;
            }

            // The receiver may close between the check and the send
            match sub.sender.try_send(payload.clone()) {
                Ok(()) => report.delivered += 1,
                Err(_) => {
                    sub.skipped.fetch_add(1, Ordering::Relaxed);
                    report.skipped += 1;
                }
            }
        }

        report
    }

    pub async fn len(&self) -> usize {
        self.subscribers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.subscribers.read().await.is_empty()
    }

    /// Drops every subscriber, closing their queues.
    pub async fn clear(&self) {
        let mut subs = self.subscribers.write().await;
        let count = subs.len();
        subs.clear();
        if count > 0 {
            debug!(registry = self.name, count, "Cleared subscribers");
        }
    }
}
