//! In-memory event bus for tests/dev.
//!
//! - Partitioned, append-only log per topic
//! - Committed offsets per (consumer group, partition)
//! - At-least-once: a new subscription resumes at the committed offset
//! - No IO / no async

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::bus::{
    AckError, Delivery, EventBus, PartitionKey, Subscription, SubscriptionSource, partition_for,
};

const DEFAULT_PARTITIONS: u32 = 4;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InMemoryBusError {
    /// Publish failed due to internal lock poisoning.
    #[error("in-memory bus lock poisoned")]
    Poisoned,

    /// The bus was switched offline (fault injection).
    #[error("in-memory bus unavailable")]
    Unavailable,
}

#[derive(Debug)]
struct TopicLog<M> {
    partitions: Vec<Vec<M>>,
    committed: HashMap<(String, u32), u64>,
}

impl<M> TopicLog<M> {
    fn new(partitions: u32) -> Self {
        Self {
            partitions: (0..partitions).map(|_| Vec::new()).collect(),
            committed: HashMap::new(),
        }
    }
}

#[derive(Debug)]
struct Shared<M> {
    topics: Mutex<HashMap<String, TopicLog<M>>>,
    appended: Condvar,
    partitions: u32,
    available: AtomicBool,
    failures_remaining: AtomicUsize,
}

/// In-memory partitioned log with consumer groups.
#[derive(Debug)]
pub struct InMemoryEventBus<M> {
    shared: Arc<Shared<M>>,
}

impl<M> InMemoryEventBus<M> {
    pub fn new() -> Self {
        Self::with_partitions(DEFAULT_PARTITIONS)
    }

    pub fn with_partitions(partitions: u32) -> Self {
        Self {
            shared: Arc::new(Shared {
                topics: Mutex::new(HashMap::new()),
                appended: Condvar::new(),
                partitions: partitions.max(1),
                available: AtomicBool::new(true),
                failures_remaining: AtomicUsize::new(0),
            }),
        }
    }

    pub fn partitions(&self) -> u32 {
        self.shared.partitions
    }

    /// Toggle availability; while offline every publish fails with `Unavailable`.
    pub fn set_available(&self, available: bool) {
        self.shared.available.store(available, Ordering::SeqCst);
    }

    /// Make the next `n` publishes fail with `Unavailable`.
    pub fn fail_next_publishes(&self, n: usize) {
        self.shared.failures_remaining.store(n, Ordering::SeqCst);
    }

    /// Committed offset of a consumer group on one partition (0 if never committed).
    pub fn committed_offset(&self, topic: &str, group: &str, partition: u32) -> u64 {
        self.shared
            .topics
            .lock()
            .ok()
            .and_then(|topics| {
                topics
                    .get(topic)
                    .and_then(|log| log.committed.get(&(group.to_string(), partition)).copied())
            })
            .unwrap_or(0)
    }

    fn take_injected_failure(&self) -> bool {
        self.shared
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl<M: Clone> InMemoryEventBus<M> {
    /// Every record ever appended to `topic`, partition by partition.
    pub fn records(&self, topic: &str) -> Vec<M> {
        match self.shared.topics.lock() {
            Ok(topics) => topics
                .get(topic)
                .map(|log| log.partitions.iter().flatten().cloned().collect())
                .unwrap_or_default(),
            Err(_) => vec![],
        }
    }
}

impl<M> Default for InMemoryEventBus<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> EventBus<M> for InMemoryEventBus<M>
where
    M: PartitionKey + Clone + Send + 'static,
{
    type Error = InMemoryBusError;

    fn publish(&self, topic: &str, message: M) -> Result<(), Self::Error> {
        if !self.shared.available.load(Ordering::SeqCst) || self.take_injected_failure() {
            return Err(InMemoryBusError::Unavailable);
        }

        let partition = partition_for(message.partition_key(), self.shared.partitions);
        let mut topics = self
            .shared
            .topics
            .lock()
            .map_err(|_| InMemoryBusError::Poisoned)?;
        topics
            .entry(topic.to_string())
            .or_insert_with(|| TopicLog::new(self.shared.partitions))
            .partitions[partition as usize]
            .push(message);
        drop(topics);

        self.shared.appended.notify_all();
        Ok(())
    }

    fn subscribe(&self, topic: &str, group: &str) -> Subscription<M> {
        let partitions = self.shared.partitions;
        let mut positions = vec![0u64; partitions as usize];

        // If the lock is poisoned, we still return a subscription;
        // it starts from the beginning of the log.
        if let Ok(mut topics) = self.shared.topics.lock() {
            let log = topics
                .entry(topic.to_string())
                .or_insert_with(|| TopicLog::new(partitions));
            for (p, pos) in positions.iter_mut().enumerate() {
                *pos = log
                    .committed
                    .get(&(group.to_string(), p as u32))
                    .copied()
                    .unwrap_or(0);
            }
        }

        let source = InMemorySubscription {
            shared: self.shared.clone(),
            topic: topic.to_string(),
            group: group.to_string(),
            positions,
            in_flight: vec![None; partitions as usize],
            next_partition: 0,
        };
        Subscription::new(topic, group, Box::new(source))
    }
}

struct InMemorySubscription<M> {
    shared: Arc<Shared<M>>,
    topic: String,
    group: String,
    /// Next offset to hand out, per partition.
    positions: Vec<u64>,
    /// Offset delivered but not yet committed or rewound, per partition.
    in_flight: Vec<Option<u64>>,
    next_partition: usize,
}

impl<M: Clone> InMemorySubscription<M> {
    fn take_next(&mut self, log: &TopicLog<M>) -> Option<Delivery<M>> {
        let n = self.positions.len();
        for i in 0..n {
            let p = (self.next_partition + i) % n;
            if self.in_flight[p].is_some() {
                continue;
            }
            let offset = self.positions[p];
            if let Some(message) = log.partitions[p].get(offset as usize) {
                self.in_flight[p] = Some(offset);
                self.positions[p] = offset + 1;
                self.next_partition = (p + 1) % n;
                return Some(Delivery {
                    partition: p as u32,
                    offset,
                    message: message.clone(),
                });
            }
        }
        None
    }

    fn check_in_flight(&self, delivery: &Delivery<M>) -> Result<usize, AckError> {
        let p = delivery.partition as usize;
        match self.in_flight.get(p) {
            Some(Some(offset)) if *offset == delivery.offset => Ok(p),
            _ => Err(AckError::NotInFlight {
                partition: delivery.partition,
                offset: delivery.offset,
            }),
        }
    }
}

impl<M> SubscriptionSource<M> for InMemorySubscription<M>
where
    M: Clone + Send + 'static,
{
    fn recv_timeout(&mut self, timeout: Duration) -> Result<Delivery<M>, RecvTimeoutError> {
        let deadline = Instant::now() + timeout;
        let shared = self.shared.clone();
        let mut topics = shared
            .topics
            .lock()
            .map_err(|_| RecvTimeoutError::Disconnected)?;

        loop {
            if let Some(log) = topics.get(&self.topic) {
                if let Some(delivery) = self.take_next(log) {
                    return Ok(delivery);
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(RecvTimeoutError::Timeout);
            }
            let (guard, _) = shared
                .appended
                .wait_timeout(topics, deadline - now)
                .map_err(|_| RecvTimeoutError::Disconnected)?;
            topics = guard;
        }
    }

    fn commit(&mut self, delivery: &Delivery<M>) -> Result<(), AckError> {
        let p = self.check_in_flight(delivery)?;
        let mut topics = self
            .shared
            .topics
            .lock()
            .map_err(|_| AckError::Backend("lock poisoned".to_string()))?;
        if let Some(log) = topics.get_mut(&self.topic) {
            let committed = log
                .committed
                .entry((self.group.clone(), delivery.partition))
                .or_insert(0);
            *committed = (*committed).max(delivery.offset + 1);
        }
        self.in_flight[p] = None;
        Ok(())
    }

    fn rewind(&mut self, delivery: &Delivery<M>) -> Result<(), AckError> {
        let p = self.check_in_flight(delivery)?;
        self.positions[p] = delivery.offset;
        self.in_flight[p] = None;
        Ok(())
    }
}
