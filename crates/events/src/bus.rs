//! Event publishing/subscription abstraction (mechanics only).
//!
//! This module provides the **event bus contract** shared by every service:
//! an ordered, append-only log per topic, split into partitions by message key,
//! consumed through named consumer groups.
//!
//! ## Delivery Guarantees
//!
//! - **Per-key ordering**: messages with the same key land on the same partition
//!   and a subscription never hands out a partition's next record before the
//!   current one has been committed or rewound.
//! - **At-least-once**: offsets are tracked per consumer group and advanced only
//!   by `commit`. A subscription that goes away without committing leaves the
//!   record to be delivered again to the next subscriber of the group.
//! - **No cross-key ordering**: partitions are independent.
//!
//! Consumers must therefore be idempotent.

use std::sync::Arc;
use std::sync::mpsc::RecvTimeoutError;
use std::time::Duration;

use thiserror::Error;

use crate::EventEnvelope;

/// Anything that can be placed on the bus exposes the key that scopes its ordering.
pub trait PartitionKey {
    fn partition_key(&self) -> &str;
}

impl<E> PartitionKey for EventEnvelope<E> {
    fn partition_key(&self) -> &str {
        self.key()
    }
}

/// Stable partition assignment (FNV-1a over the key bytes).
///
/// Must not change between releases: producers and consumers in different
/// processes rely on agreeing about where a key lives.
pub fn partition_for(key: &str, partitions: u32) -> u32 {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

    let partitions = partitions.max(1);
    let mut hash = FNV_OFFSET;
    for b in key.as_bytes() {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    (hash % u64::from(partitions)) as u32
}

/// One record handed to a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery<M> {
    pub partition: u32,
    pub offset: u64,
    pub message: M,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AckError {
    #[error("delivery at partition {partition} offset {offset} is not in flight for this subscription")]
    NotInFlight { partition: u32, offset: u64 },

    #[error("acknowledgement failed: {0}")]
    Backend(String),
}

/// Backend half of a subscription; implemented by each bus.
pub trait SubscriptionSource<M>: Send {
    fn recv_timeout(&mut self, timeout: Duration) -> Result<Delivery<M>, RecvTimeoutError>;

    fn commit(&mut self, delivery: &Delivery<M>) -> Result<(), AckError>;

    fn rewind(&mut self, delivery: &Delivery<M>) -> Result<(), AckError>;
}

/// A consumer group membership on one topic.
///
/// ## Usage Pattern
///
/// ```ignore
/// let mut sub = bus.subscribe("content-events", "recommendation-service");
///
/// loop {
///     match sub.recv_timeout(Duration::from_millis(250)) {
///         Ok(delivery) => match process(&delivery.message) {
///             Ok(()) => sub.commit(&delivery)?,
///             Err(_) => sub.rewind(&delivery)?,   // redeliver later
///         },
///         Err(RecvTimeoutError::Timeout) => continue,  // check for shutdown
///         Err(RecvTimeoutError::Disconnected) => break,
///     }
/// }
/// ```
///
/// Subscriptions are designed for single-threaded consumption.
pub struct Subscription<M> {
    topic: String,
    group: String,
    source: Box<dyn SubscriptionSource<M>>,
}

impl<M> Subscription<M> {
    pub fn new(
        topic: impl Into<String>,
        group: impl Into<String>,
        source: Box<dyn SubscriptionSource<M>>,
    ) -> Self {
        Self {
            topic: topic.into(),
            group: group.into(),
            source,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    /// Block for up to `timeout` waiting for the next record.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Result<Delivery<M>, RecvTimeoutError> {
        self.source.recv_timeout(timeout)
    }

    /// Mark the record as processed; the group's offset moves past it.
    pub fn commit(&mut self, delivery: &Delivery<M>) -> Result<(), AckError> {
        self.source.commit(delivery)
    }

    /// Give the record back; it (and everything after it on its partition) is delivered again.
    pub fn rewind(&mut self, delivery: &Delivery<M>) -> Result<(), AckError> {
        self.source.rewind(delivery)
    }
}

impl<M> core::fmt::Debug for Subscription<M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("group", &self.group)
            .finish_non_exhaustive()
    }
}

/// Domain-agnostic event bus.
///
/// ```text
/// Local write → Publisher (publish) → Event Bus → Consumer groups
///                                                   ├─ recommendation-service projection
///                                                   └─ ...
/// ```
///
/// `publish()` can fail (bus unavailable, network error). Failures are surfaced
/// to the caller, which decides whether the event is dropped or retried.
///
/// The trait requires `Send + Sync`; multiple threads can publish concurrently.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + core::fmt::Display + Send + Sync + 'static;

    fn publish(&self, topic: &str, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self, topic: &str, group: &str) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, topic: &str, message: M) -> Result<(), Self::Error> {
        (**self).publish(topic, message)
    }

    fn subscribe(&self, topic: &str, group: &str) -> Subscription<M> {
        (**self).subscribe(topic, group)
    }
}
