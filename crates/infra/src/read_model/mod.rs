//! Projected read models (disposable, rebuildable from the bus).

pub mod content_views;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use marquee_core::ContentId;

use crate::error::StoreError;

pub use content_views::InMemoryContentViewStore;
pub use postgres::PostgresContentViewStore;

/// Local, possibly stale copy of a content item, owned by recommendation-service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentView {
    pub content_id: ContentId,
    #[serde(rename = "contentTitle")]
    pub title: String,
    pub content_type: Option<String>,
    pub viewed_at: DateTime<Utc>,
    /// Id of the envelope that last wrote this row (duplicate detection).
    pub last_event_id: Uuid,
}

/// Storage for [`ContentView`] rows, keyed by content id.
#[async_trait]
pub trait ContentViewStore: Send + Sync {
    async fn get(&self, content_id: ContentId) -> Result<Option<ContentView>, StoreError>;

    /// Create the row, or overwrite every field of the existing one.
    async fn upsert(&self, view: ContentView) -> Result<(), StoreError>;

    /// Most recent `limit` rows by `viewed_at` desc (ties: content id asc).
    async fn recent(&self, limit: usize) -> Result<Vec<ContentView>, StoreError>;

    async fn list(&self) -> Result<Vec<ContentView>, StoreError>;

    /// Drop all rows (rebuild support).
    async fn clear(&self) -> Result<(), StoreError>;
}

#[async_trait]
impl<S> ContentViewStore for Arc<S>
where
    S: ContentViewStore + ?Sized,
{
    async fn get(&self, content_id: ContentId) -> Result<Option<ContentView>, StoreError> {
        (**self).get(content_id).await
    }

    async fn upsert(&self, view: ContentView) -> Result<(), StoreError> {
        (**self).upsert(view).await
    }

    async fn recent(&self, limit: usize) -> Result<Vec<ContentView>, StoreError> {
        (**self).recent(limit).await
    }

    async fn list(&self) -> Result<Vec<ContentView>, StoreError> {
        (**self).list().await
    }

    async fn clear(&self) -> Result<(), StoreError> {
        (**self).clear().await
    }
}
