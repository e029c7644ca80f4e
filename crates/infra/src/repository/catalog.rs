use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;

use marquee_core::{CatalogEntry, ContentId, NewCatalogEntry};

use crate::error::StoreError;

#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn insert(&self, new: NewCatalogEntry) -> Result<CatalogEntry, StoreError>;

    async fn get(&self, id: ContentId) -> Result<Option<CatalogEntry>, StoreError>;

    async fn list(&self) -> Result<Vec<CatalogEntry>, StoreError>;

    /// Entries for the given ids, ascending by id. Unknown ids are omitted.
    async fn find_by_ids(&self, ids: &BTreeSet<ContentId>) -> Result<Vec<CatalogEntry>, StoreError>;
}

#[derive(Debug)]
pub struct InMemoryCatalogRepository {
    rows: RwLock<BTreeMap<ContentId, CatalogEntry>>,
    next_id: AtomicI64,
}

impl InMemoryCatalogRepository {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
            next_id: AtomicI64::new(1),
        }
    }
}

impl Default for InMemoryCatalogRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CatalogRepository for InMemoryCatalogRepository {
    async fn insert(&self, new: NewCatalogEntry) -> Result<CatalogEntry, StoreError> {
        let mut rows = self.rows.write().map_err(|_| StoreError::poisoned())?;
        let id = ContentId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let entry = new.into_entry(id, Utc::now());
        rows.insert(id, entry.clone());
        Ok(entry)
    }

    async fn get(&self, id: ContentId) -> Result<Option<CatalogEntry>, StoreError> {
        let rows = self.rows.read().map_err(|_| StoreError::poisoned())?;
        Ok(rows.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<CatalogEntry>, StoreError> {
        let rows = self.rows.read().map_err(|_| StoreError::poisoned())?;
        Ok(rows.values().cloned().collect())
    }

    async fn find_by_ids(&self, ids: &BTreeSet<ContentId>) -> Result<Vec<CatalogEntry>, StoreError> {
        let rows = self.rows.read().map_err(|_| StoreError::poisoned())?;
        Ok(ids.iter().filter_map(|id| rows.get(id).cloned()).collect())
    }
}
