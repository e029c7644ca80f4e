use std::collections::BTreeMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;

use marquee_core::{Content, ContentId, NewContent};

use crate::error::StoreError;
use crate::outbox::OutboxStore;
use crate::publisher::Publishable;

#[async_trait]
pub trait ContentRepository: Send + Sync {
    async fn insert(&self, new: NewContent) -> Result<Content, StoreError>;

    /// Insert the content and enqueue its `content.created` envelope atomically.
    async fn insert_with_outbox(
        &self,
        new: NewContent,
        outbox: &dyn OutboxStore,
    ) -> Result<Content, StoreError>;

    async fn get(&self, id: ContentId) -> Result<Option<Content>, StoreError>;

    async fn list(&self) -> Result<Vec<Content>, StoreError>;
}

#[derive(Debug)]
pub struct InMemoryContentRepository {
    rows: RwLock<BTreeMap<ContentId, Content>>,
    next_id: AtomicI64,
}

impl InMemoryContentRepository {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    fn allocate(&self, new: NewContent) -> Content {
        let id = ContentId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        new.into_content(id, Utc::now())
    }
}

impl Default for InMemoryContentRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentRepository for InMemoryContentRepository {
    async fn insert(&self, new: NewContent) -> Result<Content, StoreError> {
        let mut rows = self.rows.write().map_err(|_| StoreError::poisoned())?;
        let content = self.allocate(new);
        rows.insert(content.id, content.clone());
        Ok(content)
    }

    async fn insert_with_outbox(
        &self,
        new: NewContent,
        outbox: &dyn OutboxStore,
    ) -> Result<Content, StoreError> {
        let mut rows = self.rows.write().map_err(|_| StoreError::poisoned())?;
        let content = self.allocate(new);
        let envelope = content
            .to_envelope()
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        outbox.enqueue(content.topic(), envelope)?;
        rows.insert(content.id, content.clone());
        Ok(content)
    }

    async fn get(&self, id: ContentId) -> Result<Option<Content>, StoreError> {
        let rows = self.rows.read().map_err(|_| StoreError::poisoned())?;
        Ok(rows.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<Content>, StoreError> {
        let rows = self.rows.read().map_err(|_| StoreError::poisoned())?;
        Ok(rows.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbox::InMemoryOutboxStore;
    use marquee_core::ContentType;
    use marquee_events::CONTENT_EVENTS_TOPIC;

    #[tokio::test]
    async fn assigns_sequential_ids() {
        let repo = InMemoryContentRepository::new();
        let a = repo
            .insert(NewContent::new("Inception", ContentType::Movie).unwrap())
            .await
            .unwrap();
        let b = repo
            .insert(NewContent::new("Dark", ContentType::Series).unwrap())
            .await
            .unwrap();
        assert_eq!(a.id, ContentId::new(1));
        assert_eq!(b.id, ContentId::new(2));
        assert_eq!(repo.list().await.unwrap().len(), 2);
        assert_eq!(repo.get(b.id).await.unwrap().unwrap().title, "Dark");
        assert!(repo.get(ContentId::new(99)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn insert_with_outbox_writes_row_and_entry() {
        let repo = InMemoryContentRepository::new();
        let outbox = InMemoryOutboxStore::new();

        let content = repo
            .insert_with_outbox(NewContent::new("Up", ContentType::Movie).unwrap(), &outbox)
            .await
            .unwrap();

        let pending = outbox.pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].topic, CONTENT_EVENTS_TOPIC);
        assert_eq!(pending[0].envelope.key(), content.id.to_string());
        assert!(repo.get(content.id).await.unwrap().is_some());
    }
}
