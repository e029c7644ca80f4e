use std::sync::RwLock;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;

use marquee_core::{NewWatchRecord, VisitorId, WatchRecord, WatchRecordId};

use crate::error::StoreError;
use crate::outbox::OutboxStore;
use crate::publisher::Publishable;

#[async_trait]
pub trait WatchRecordRepository: Send + Sync {
    async fn insert(&self, new: NewWatchRecord) -> Result<WatchRecord, StoreError>;

    /// Insert the record and enqueue its `watch.recorded` envelope atomically.
    async fn insert_with_outbox(
        &self,
        new: NewWatchRecord,
        outbox: &dyn OutboxStore,
    ) -> Result<WatchRecord, StoreError>;

    /// A visitor's records, newest first.
    async fn find_by_visitor(&self, visitor_id: &VisitorId) -> Result<Vec<WatchRecord>, StoreError>;
}

#[derive(Debug)]
pub struct InMemoryWatchRecordRepository {
    rows: RwLock<Vec<WatchRecord>>,
    next_id: AtomicI64,
}

impl InMemoryWatchRecordRepository {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
            next_id: AtomicI64::new(1),
        }
    }

    fn allocate(&self, new: NewWatchRecord) -> WatchRecord {
        let id = WatchRecordId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        new.into_record(id, Utc::now())
    }
}

impl Default for InMemoryWatchRecordRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WatchRecordRepository for InMemoryWatchRecordRepository {
    async fn insert(&self, new: NewWatchRecord) -> Result<WatchRecord, StoreError> {
        let mut rows = self.rows.write().map_err(|_| StoreError::poisoned())?;
        let record = self.allocate(new);
        rows.push(record.clone());
        Ok(record)
    }

    async fn insert_with_outbox(
        &self,
        new: NewWatchRecord,
        outbox: &dyn OutboxStore,
    ) -> Result<WatchRecord, StoreError> {
        let mut rows = self.rows.write().map_err(|_| StoreError::poisoned())?;
        let record = self.allocate(new);
        let envelope = record
            .to_envelope()
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        outbox.enqueue(record.topic(), envelope)?;
        rows.push(record.clone());
        Ok(record)
    }

    async fn find_by_visitor(&self, visitor_id: &VisitorId) -> Result<Vec<WatchRecord>, StoreError> {
        let rows = self.rows.read().map_err(|_| StoreError::poisoned())?;
        let mut found: Vec<WatchRecord> = rows
            .iter()
            .filter(|r| &r.visitor_id == visitor_id)
            .cloned()
            .collect();
        // Same-instant inserts fall back to id so the order stays deterministic.
        found.sort_by(|a, b| b.watched_at.cmp(&a.watched_at).then(b.id.cmp(&a.id)));
        Ok(found)
    }
}
