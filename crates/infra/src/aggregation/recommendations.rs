use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{instrument, warn};

use marquee_core::ContentId;

use super::enrich;
use crate::clients::{CatalogClient, ContentClient};
use crate::error::StoreError;
use crate::read_model::{ContentView, ContentViewStore};

/// How many recent views a recommendation list holds.
pub const RECOMMENDATION_LIMIT: usize = 10;

/// A recently viewed item: local view fields plus catalog fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub content_id: ContentId,
    pub title: String,
    #[serde(rename = "type")]
    pub content_type: Option<String>,
    pub genre: Option<String>,
    pub duration_minutes: Option<i32>,
    pub content_published_at: Option<DateTime<Utc>>,
    pub viewed_at: DateTime<Utc>,
}

/// One view joined with content-service's record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationDetail {
    pub content_id: ContentId,
    pub title: String,
    #[serde(rename = "type")]
    pub content_type: Option<String>,
    pub content_created_at: Option<DateTime<Utc>>,
    pub viewed_at: DateTime<Utc>,
}

pub struct RecommendationService {
    views: Arc<dyn ContentViewStore>,
    catalog: Arc<dyn CatalogClient>,
    content: Arc<dyn ContentClient>,
    enrichment_timeout: Duration,
}

impl RecommendationService {
    pub fn new(
        views: Arc<dyn ContentViewStore>,
        catalog: Arc<dyn CatalogClient>,
        content: Arc<dyn ContentClient>,
        enrichment_timeout: Duration,
    ) -> Self {
        Self {
            views,
            catalog,
            content,
            enrichment_timeout,
        }
    }

    /// The most recent views, enriched with one catalog batch call.
    #[instrument(skip(self))]
    pub async fn recommendations(&self) -> Result<Vec<Recommendation>, StoreError> {
        let views = self.views.recent(RECOMMENDATION_LIMIT).await?;
        if views.is_empty() {
            return Ok(vec![]);
        }

        let ids: BTreeSet<ContentId> = views.iter().map(|v| v.content_id).collect();
        let catalog = enrich(self.catalog.as_ref(), &ids, self.enrichment_timeout).await;

        Ok(views
            .into_iter()
            .map(|v| {
                let c = catalog.get(&v.content_id);
                Recommendation {
                    content_id: v.content_id,
                    title: v.title,
                    content_type: v.content_type,
                    genre: c.and_then(|c| c.genre.clone()),
                    duration_minutes: c.and_then(|c| c.duration_minutes),
                    content_published_at: c.and_then(|c| c.published_at),
                    viewed_at: v.viewed_at,
                }
            })
            .collect())
    }

    /// One local view joined with a single-record lookup; `None` if there is no view.
    #[instrument(skip(self, content_id), fields(content_id = %content_id))]
    pub async fn recommendation_for(
        &self,
        content_id: ContentId,
    ) -> Result<Option<RecommendationDetail>, StoreError> {
        let Some(view) = self.views.get(content_id).await? else {
            return Ok(None);
        };

        let remote = match tokio::time::timeout(
            self.enrichment_timeout,
            self.content.get_content(content_id),
        )
        .await
        {
            Ok(found) => found,
            Err(_) => {
                warn!("content lookup timed out; returning local data only");
                None
            }
        };

        Ok(Some(RecommendationDetail {
            content_id: view.content_id,
            title: view.title,
            content_type: view.content_type,
            content_created_at: remote.and_then(|r| r.created_at),
            viewed_at: view.viewed_at,
        }))
    }

    /// Raw projected views, newest first.
    pub async fn content_views(&self) -> Result<Vec<ContentView>, StoreError> {
        self.views.list().await
    }
}
