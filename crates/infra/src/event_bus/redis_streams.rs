//! Redis Streams-backed event bus (durable, at-least-once delivery).
//!
//! This implementation uses Redis Streams (XADD/XREADGROUP/XACK) to provide:
//! - **Durable delivery**: entries persist until acknowledged
//! - **At-least-once**: unacknowledged entries stay pending and are reclaimed
//! - **Consumer groups**: each projection has its own group
//! - **Per-key ordering**: one stream per partition, one entry in flight per partition
//! - **Dead-letter handling**: entries redelivered too often go to a DLQ stream
//!
//! ## Layout
//!
//! - **Partition stream**: `marquee:{topic}:p{n}`
//! - **Dead-letter stream**: `marquee:{topic}:dlq`
//! - **Consumers**: `{group}-{uuid}`, one per subscription

use std::sync::Arc;
use std::sync::mpsc::RecvTimeoutError;
use std::time::{Duration, Instant};

use redis::Commands;
use redis::streams::{
    StreamClaimReply, StreamId, StreamPendingCountReply, StreamReadOptions, StreamReadReply,
};
use serde_json::Value as JsonValue;
use tracing::{error, instrument, warn};

use marquee_events::{
    AckError, Delivery, EventBus, EventEnvelope, Subscription, SubscriptionSource, partition_for,
};

const DEFAULT_PARTITIONS: u32 = 4;

/// Default max deliveries before an entry goes to the DLQ.
const DEFAULT_MAX_RETRIES: u32 = 5;

/// Entries pending longer than this are reclaimed from other (dead) consumers.
const DEFAULT_PENDING_TIMEOUT_MS: u64 = 60_000;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct RedisStreamsEventBus {
    client: Arc<redis::Client>,
    partitions: u32,
    max_retries: u32,
    pending_timeout_ms: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum RedisStreamsError {
    #[error("Redis connection error: {0}")]
    Connection(String),

    #[error("Redis command error: {0}")]
    Command(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

fn stream_key(topic: &str, partition: u32) -> String {
    format!("marquee:{topic}:p{partition}")
}

fn dlq_key(topic: &str) -> String {
    format!("marquee:{topic}:dlq")
}

impl RedisStreamsEventBus {
    /// Create a new Redis Streams event bus (e.g. `redis://localhost:6379`).
    pub fn new(redis_url: impl AsRef<str>) -> Result<Self, RedisStreamsError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| RedisStreamsError::Connection(e.to_string()))?;

        Ok(Self {
            client: Arc::new(client),
            partitions: DEFAULT_PARTITIONS,
            max_retries: DEFAULT_MAX_RETRIES,
            pending_timeout_ms: DEFAULT_PENDING_TIMEOUT_MS,
        })
    }

    pub fn with_partitions(mut self, partitions: u32) -> Self {
        self.partitions = partitions.max(1);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    fn connection(&self) -> Result<redis::Connection, RedisStreamsError> {
        self.client
            .get_connection()
            .map_err(|e| RedisStreamsError::Connection(e.to_string()))
    }

    #[instrument(
        skip(self, topic, message),
        fields(topic = %topic, key = %message.key(), event_id = %message.event_id()),
        err
    )]
    fn publish_sync(&self, topic: &str, message: EventEnvelope<JsonValue>) -> Result<(), RedisStreamsError> {
        let payload = serde_json::to_string(&message)
            .map_err(|e| RedisStreamsError::Serialization(e.to_string()))?;
        let partition = partition_for(message.key(), self.partitions);

        let mut conn = self.connection()?;
        let _: String = conn
            .xadd(
                stream_key(topic, partition),
                "*",
                &[
                    ("key", message.key()),
                    ("type", message.event_type()),
                    ("payload", payload.as_str()),
                ],
            )
            .map_err(|e| RedisStreamsError::Command(format!("XADD failed: {e}")))?;

        Ok(())
    }
}

impl EventBus<EventEnvelope<JsonValue>> for RedisStreamsEventBus {
    type Error = RedisStreamsError;

    fn publish(&self, topic: &str, message: EventEnvelope<JsonValue>) -> Result<(), Self::Error> {
        self.publish_sync(topic, message)
    }

    fn subscribe(&self, topic: &str, group: &str) -> Subscription<EventEnvelope<JsonValue>> {
        let source = RedisStreamsSubscription::new(self.clone(), topic, group);
        Subscription::new(topic, group, Box::new(source))
    }
}

#[derive(Debug, Default)]
struct PartitionState {
    /// Local offset handed out for the entry in flight, and its stream id.
    in_flight: Option<(u64, String)>,
    next_offset: u64,
    /// Re-read this consumer's pending entries before new ones.
    replay_pending: bool,
    /// Redeliveries of the current pending entry through `rewind`.
    retries: u32,
}

/// Consumer-group member on every partition stream of one topic.
struct RedisStreamsSubscription {
    bus: RedisStreamsEventBus,
    topic: String,
    group: String,
    consumer: String,
    conn: Option<redis::Connection>,
    partitions: Vec<PartitionState>,
    next_partition: usize,
}

impl RedisStreamsSubscription {
    fn new(bus: RedisStreamsEventBus, topic: &str, group: &str) -> Self {
        let partitions = (0..bus.partitions).map(|_| PartitionState::default()).collect();
        let mut sub = Self {
            consumer: format!("{group}-{}", uuid::Uuid::now_v7()),
            bus,
            topic: topic.to_string(),
            group: group.to_string(),
            conn: None,
            partitions,
            next_partition: 0,
        };

        if let Err(e) = sub.ensure_groups() {
            error!(topic = %sub.topic, group = %sub.group, error = %e, "failed to create consumer groups");
        }
        sub
    }

    fn conn(&mut self) -> Result<&mut redis::Connection, RedisStreamsError> {
        if self.conn.is_none() {
            self.conn = Some(self.bus.connection()?);
        }
        self.conn
            .as_mut()
            .ok_or_else(|| RedisStreamsError::Connection("no connection".to_string()))
    }

    /// XGROUP CREATE ... MKSTREAM on each partition; "already exists" is ignored.
    fn ensure_groups(&mut self) -> Result<(), RedisStreamsError> {
        let keys: Vec<String> = (0..self.bus.partitions)
            .map(|p| stream_key(&self.topic, p))
            .collect();
        let group = self.group.clone();
        let conn = self.conn()?;
        for key in keys {
            let _: Result<String, _> = conn.xgroup_create_mkstream(&key, &group, "0");
        }
        Ok(())
    }

    /// Next entry for one partition: own pending (after rewind), then entries
    /// abandoned by other consumers, then new ones.
    fn read_partition(&mut self, p: usize) -> Result<Option<StreamId>, RedisStreamsError> {
        let key = stream_key(&self.topic, p as u32);
        let group = self.group.clone();
        let consumer = self.consumer.clone();
        let replay = self.partitions[p].replay_pending;
        let min_idle = self.bus.pending_timeout_ms;
        let conn = self.conn()?;

        if replay {
            let opts = StreamReadOptions::default().group(&group, &consumer).count(1);
            let reply: Option<StreamReadReply> = conn
                .xread_options(&[&key], &["0"], &opts)
                .map_err(|e| RedisStreamsError::Command(format!("XREADGROUP failed: {e}")))?;
            if let Some(entry) = first_entry(reply) {
                return Ok(Some(entry));
            }
        }

        let pending: StreamPendingCountReply = conn
            .xpending_count(&key, &group, "-", "+", 1)
            .map_err(|e| RedisStreamsError::Command(format!("XPENDING failed: {e}")))?;
        if let Some(stale) = pending
            .ids
            .iter()
            .find(|id| id.consumer != consumer && id.last_delivered_ms as u64 >= min_idle)
        {
            let claimed: StreamClaimReply = conn
                .xclaim(&key, &group, &consumer, min_idle, &[&stale.id])
                .map_err(|e| RedisStreamsError::Command(format!("XCLAIM failed: {e}")))?;
            if let Some(entry) = claimed.ids.into_iter().next() {
                return Ok(Some(entry));
            }
        }

        let opts = StreamReadOptions::default().group(&group, &consumer).count(1);
        let reply: Option<StreamReadReply> = conn
            .xread_options(&[&key], &[">"], &opts)
            .map_err(|e| RedisStreamsError::Command(format!("XREADGROUP failed: {e}")))?;
        Ok(first_entry(reply))
    }

    fn ack(&mut self, partition: u32, stream_id: &str) -> Result<(), RedisStreamsError> {
        let key = stream_key(&self.topic, partition);
        let group = self.group.clone();
        let conn = self.conn()?;
        let _: u64 = conn
            .xack(&key, &group, &[stream_id])
            .map_err(|e| RedisStreamsError::Command(format!("XACK failed: {e}")))?;
        Ok(())
    }

    fn send_to_dlq(&mut self, partition: u32, entry: &StreamId, reason: &str) -> Result<(), RedisStreamsError> {
        let payload: String = entry.get("payload").unwrap_or_default();
        let retries = self.partitions[partition as usize].retries.to_string();
        let partition_str = partition.to_string();
        let failed_at = chrono::Utc::now().to_rfc3339();
        let dlq = dlq_key(&self.topic);
        let conn = self.conn()?;
        let _: String = conn
            .xadd(
                &dlq,
                "*",
                &[
                    ("original_message_id", entry.id.as_str()),
                    ("partition", partition_str.as_str()),
                    ("retry_count", retries.as_str()),
                    ("reason", reason),
                    ("failed_at", failed_at.as_str()),
                    ("payload", payload.as_str()),
                ],
            )
            .map_err(|e| RedisStreamsError::Command(format!("DLQ XADD failed: {e}")))?;

        warn!(
            topic = %self.topic,
            message_id = %entry.id,
            reason,
            "message sent to dead-letter queue"
        );
        self.ack(partition, &entry.id)
    }

    /// Turn a stream entry into a delivery, or dead-letter it.
    fn accept(&mut self, p: usize, entry: StreamId) -> Result<Option<Delivery<EventEnvelope<JsonValue>>>, RedisStreamsError> {
        if self.partitions[p].retries >= self.bus.max_retries {
            self.send_to_dlq(p as u32, &entry, "max retries exceeded")?;
            self.partitions[p].retries = 0;
            self.partitions[p].replay_pending = false;
            return Ok(None);
        }

        let payload: Option<String> = entry.get("payload");
        let envelope = match payload.map(|s| serde_json::from_str::<EventEnvelope<JsonValue>>(&s)) {
            Some(Ok(env)) => env,
            Some(Err(e)) => {
                self.send_to_dlq(p as u32, &entry, &format!("undecodable envelope: {e}"))?;
                return Ok(None);
            }
            None => {
                self.send_to_dlq(p as u32, &entry, "missing payload field")?;
                return Ok(None);
            }
        };

        let state = &mut self.partitions[p];
        let offset = state.next_offset;
        state.next_offset += 1;
        state.in_flight = Some((offset, entry.id));
        Ok(Some(Delivery {
            partition: p as u32,
            offset,
            message: envelope,
        }))
    }

    fn in_flight_id(&self, delivery: &Delivery<EventEnvelope<JsonValue>>) -> Result<String, AckError> {
        match self.partitions.get(delivery.partition as usize).and_then(|s| s.in_flight.as_ref()) {
            Some((offset, id)) if *offset == delivery.offset => Ok(id.clone()),
            _ => Err(AckError::NotInFlight {
                partition: delivery.partition,
                offset: delivery.offset,
            }),
        }
    }
}

fn first_entry(reply: Option<StreamReadReply>) -> Option<StreamId> {
    reply?
        .keys
        .into_iter()
        .next()
        .and_then(|k| k.ids.into_iter().next())
}

impl SubscriptionSource<EventEnvelope<JsonValue>> for RedisStreamsSubscription {
    fn recv_timeout(
        &mut self,
        timeout: Duration,
    ) -> Result<Delivery<EventEnvelope<JsonValue>>, RecvTimeoutError> {
        let deadline = Instant::now() + timeout;
        let n = self.partitions.len();

        loop {
            for i in 0..n {
                let p = (self.next_partition + i) % n;
                if self.partitions[p].in_flight.is_some() {
                    continue;
                }
                let read = self
                    .read_partition(p)
                    .and_then(|entry| match entry {
                        Some(e) => self.accept(p, e),
                        None => {
                            self.partitions[p].replay_pending = false;
                            Ok(None)
                        }
                    });
                match read {
                    Ok(Some(delivery)) => {
                        self.next_partition = (p + 1) % n;
                        return Ok(delivery);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        error!(topic = %self.topic, group = %self.group, error = %e, "failed to read from stream");
                        self.conn = None;
                    }
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(RecvTimeoutError::Timeout);
            }
            std::thread::sleep(POLL_INTERVAL.min(deadline - now));
        }
    }

    fn commit(&mut self, delivery: &Delivery<EventEnvelope<JsonValue>>) -> Result<(), AckError> {
        let id = self.in_flight_id(delivery)?;
        self.ack(delivery.partition, &id)
            .map_err(|e| AckError::Backend(e.to_string()))?;

        let state = &mut self.partitions[delivery.partition as usize];
        state.in_flight = None;
        state.retries = 0;
        Ok(())
    }

    fn rewind(&mut self, delivery: &Delivery<EventEnvelope<JsonValue>>) -> Result<(), AckError> {
        let _ = self.in_flight_id(delivery)?;
        let state = &mut self.partitions[delivery.partition as usize];
        state.in_flight = None;
        state.replay_pending = true;
        state.retries += 1;
        Ok(())
    }
}
