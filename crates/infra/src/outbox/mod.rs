//! Transactional outbox.
//!
//! In outbox mode a writer stores the envelope next to the domain row inside
//! the same critical section (`insert_with_outbox` on the repositories). The
//! [`OutboxDispatcher`] later drains pending entries to the bus, so an event
//! whose first submission fails is not lost.
//!
//! Entries are drained in insertion order. An entry that cannot be delivered
//! yet holds back every later entry with the same key, so per-key order on
//! the bus matches commit order.

mod dispatcher;

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use marquee_events::EventEnvelope;

use crate::error::StoreError;

pub use dispatcher::{DispatchReport, OutboxConfig, OutboxDispatcher};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboxStatus {
    Pending,
    /// Gave up after the configured number of attempts; kept for inspection.
    Dead,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutboxEntry {
    pub id: Uuid,
    pub topic: String,
    pub envelope: EventEnvelope<JsonValue>,
    pub status: OutboxStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub next_attempt_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Outcome of one delivery attempt, recorded by the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptResult {
    Delivered,
    Failed {
        error: String,
        next_attempt_at: DateTime<Utc>,
    },
    Dead {
        error: String,
    },
}

/// Local store of pending events.
pub trait OutboxStore: Send + Sync {
    fn enqueue(&self, topic: &str, envelope: EventEnvelope<JsonValue>) -> Result<Uuid, StoreError>;

    /// Pending entries in insertion order.
    fn pending(&self) -> Result<Vec<OutboxEntry>, StoreError>;

    fn dead(&self) -> Result<Vec<OutboxEntry>, StoreError>;

    /// Record an attempt. Delivered entries are removed.
    fn record_attempt(&self, id: Uuid, result: AttemptResult) -> Result<(), StoreError>;
}

impl<S> OutboxStore for std::sync::Arc<S>
where
    S: OutboxStore + ?Sized,
{
    fn enqueue(&self, topic: &str, envelope: EventEnvelope<JsonValue>) -> Result<Uuid, StoreError> {
        (**self).enqueue(topic, envelope)
    }

    fn pending(&self) -> Result<Vec<OutboxEntry>, StoreError> {
        (**self).pending()
    }

    fn dead(&self) -> Result<Vec<OutboxEntry>, StoreError> {
        (**self).dead()
    }

    fn record_attempt(&self, id: Uuid, result: AttemptResult) -> Result<(), StoreError> {
        (**self).record_attempt(id, result)
    }
}

/// In-memory outbox for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryOutboxStore {
    entries: Mutex<Vec<OutboxEntry>>,
}

impl InMemoryOutboxStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl OutboxStore for InMemoryOutboxStore {
    fn enqueue(&self, topic: &str, envelope: EventEnvelope<JsonValue>) -> Result<Uuid, StoreError> {
        let now = Utc::now();
        let id = Uuid::now_v7();
        let mut entries = self.entries.lock().map_err(|_| StoreError::poisoned())?;
        entries.push(OutboxEntry {
            id,
            topic: topic.to_string(),
            envelope,
            status: OutboxStatus::Pending,
            attempts: 0,
            last_error: None,
            next_attempt_at: now,
            created_at: now,
        });
        Ok(id)
    }

    fn pending(&self) -> Result<Vec<OutboxEntry>, StoreError> {
        let entries = self.entries.lock().map_err(|_| StoreError::poisoned())?;
        Ok(entries
            .iter()
            .filter(|e| e.status == OutboxStatus::Pending)
            .cloned()
            .collect())
    }

    fn dead(&self) -> Result<Vec<OutboxEntry>, StoreError> {
        let entries = self.entries.lock().map_err(|_| StoreError::poisoned())?;
        Ok(entries
            .iter()
            .filter(|e| e.status == OutboxStatus::Dead)
            .cloned()
            .collect())
    }

    fn record_attempt(&self, id: Uuid, result: AttemptResult) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::poisoned())?;
        let Some(pos) = entries.iter().position(|e| e.id == id) else {
            return Ok(());
        };

        match result {
            AttemptResult::Delivered => {
                entries.remove(pos);
            }
            AttemptResult::Failed {
                error,
                next_attempt_at,
            } => {
                let entry = &mut entries[pos];
                entry.attempts += 1;
                entry.last_error = Some(error);
                entry.next_attempt_at = next_attempt_at;
            }
            AttemptResult::Dead { error } => {
                let entry = &mut entries[pos];
                entry.attempts += 1;
                entry.last_error = Some(error);
                entry.status = OutboxStatus::Dead;
            }
        }
        Ok(())
    }
}
