use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::instrument;

use marquee_core::{ContentId, VisitorId, WatchRecordId};

use super::enrich;
use crate::clients::CatalogClient;
use crate::error::StoreError;
use crate::repository::WatchRecordRepository;

/// One watch record joined with catalog data.
///
/// Catalog-sourced fields serialize as `null` when unresolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchHistoryEntry {
    pub id: WatchRecordId,
    pub visitor_id: VisitorId,
    pub content_id: ContentId,
    pub content_title: Option<String>,
    pub content_type: Option<String>,
    pub genre: Option<String>,
    pub duration_minutes: Option<i32>,
    pub watched_seconds: i32,
    pub watched_at: DateTime<Utc>,
}

pub struct WatchHistoryService {
    records: Arc<dyn WatchRecordRepository>,
    catalog: Arc<dyn CatalogClient>,
    enrichment_timeout: Duration,
}

impl WatchHistoryService {
    pub fn new(
        records: Arc<dyn WatchRecordRepository>,
        catalog: Arc<dyn CatalogClient>,
        enrichment_timeout: Duration,
    ) -> Self {
        Self {
            records,
            catalog,
            enrichment_timeout,
        }
    }

    /// A visitor's history, newest first, enriched with one catalog batch call.
    #[instrument(skip(self, visitor_id), fields(visitor_id = %visitor_id))]
    pub async fn history(&self, visitor_id: &VisitorId) -> Result<Vec<WatchHistoryEntry>, StoreError> {
        let records = self.records.find_by_visitor(visitor_id).await?;
        if records.is_empty() {
            return Ok(vec![]);
        }

        let ids: BTreeSet<ContentId> = records.iter().map(|r| r.content_id).collect();
        let catalog = enrich(self.catalog.as_ref(), &ids, self.enrichment_timeout).await;

        Ok(records
            .into_iter()
            .map(|r| {
                let c = catalog.get(&r.content_id);
                WatchHistoryEntry {
                    id: r.id,
                    visitor_id: r.visitor_id,
                    content_id: r.content_id,
                    content_title: c.map(|c| c.title.clone()),
                    content_type: c.map(|c| c.content_type.clone()),
                    genre: c.and_then(|c| c.genre.clone()),
                    duration_minutes: c.and_then(|c| c.duration_minutes),
                    watched_seconds: r.watched_seconds,
                    watched_at: r.watched_at,
                }
            })
            .collect())
    }
}
