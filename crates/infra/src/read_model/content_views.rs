use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use marquee_core::ContentId;

use super::{ContentView, ContentViewStore};
use crate::error::StoreError;

/// In-memory content view store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryContentViewStore {
    rows: RwLock<HashMap<ContentId, ContentView>>,
    failing_writes: AtomicUsize,
}

impl InMemoryContentViewStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` upserts fail with `Unavailable`.
    pub fn fail_next_writes(&self, n: usize) {
        self.failing_writes.store(n, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.rows.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn newest_first(a: &ContentView, b: &ContentView) -> std::cmp::Ordering {
    b.viewed_at
        .cmp(&a.viewed_at)
        .then(a.content_id.cmp(&b.content_id))
}

#[async_trait]
impl ContentViewStore for InMemoryContentViewStore {
    async fn get(&self, content_id: ContentId) -> Result<Option<ContentView>, StoreError> {
        let rows = self.rows.read().map_err(|_| StoreError::poisoned())?;
        Ok(rows.get(&content_id).cloned())
    }

    async fn upsert(&self, view: ContentView) -> Result<(), StoreError> {
        let injected = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StoreError::Unavailable("injected write failure".to_string()));
        }

        let mut rows = self.rows.write().map_err(|_| StoreError::poisoned())?;
        rows.insert(view.content_id, view);
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<ContentView>, StoreError> {
        let mut all = self.list().await?;
        all.truncate(limit);
        Ok(all)
    }

    async fn list(&self) -> Result<Vec<ContentView>, StoreError> {
        let rows = self.rows.read().map_err(|_| StoreError::poisoned())?;
        let mut all: Vec<ContentView> = rows.values().cloned().collect();
        all.sort_by(newest_first);
        Ok(all)
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let mut rows = self.rows.write().map_err(|_| StoreError::poisoned())?;
        rows.clear();
        Ok(())
    }
}
