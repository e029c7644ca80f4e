//! Read-time aggregation: local rows joined with authoritative remote data.
//!
//! Each request reads the local rows, collects the distinct referenced ids,
//! resolves them with exactly one batch call bounded by a timeout, and joins
//! in memory. Remote fields that do not resolve are `null`; a local row is
//! never dropped because its remote counterpart is missing.

pub mod recommendations;
pub mod watch_history;

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use tracing::warn;

use marquee_core::ContentId;

use crate::clients::{CatalogClient, CatalogContent};

pub use recommendations::{Recommendation, RecommendationDetail, RecommendationService};
pub use watch_history::{WatchHistoryEntry, WatchHistoryService};

/// Default bound on a single enrichment call.
pub const DEFAULT_ENRICHMENT_TIMEOUT: Duration = Duration::from_secs(2);

/// One bounded batch lookup; an elapsed timeout yields an empty map.
pub(crate) async fn enrich(
    catalog: &dyn CatalogClient,
    ids: &BTreeSet<ContentId>,
    timeout: Duration,
) -> HashMap<ContentId, CatalogContent> {
    if ids.is_empty() {
        return HashMap::new();
    }

    match tokio::time::timeout(timeout, catalog.fetch_batch(ids)).await {
        Ok(found) => found,
        Err(_) => {
            warn!(
                ids = ids.len(),
                timeout_ms = timeout.as_millis() as u64,
                "catalog enrichment timed out; returning local data only"
            );
            HashMap::new()
        }
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use std::collections::{BTreeSet, HashMap};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use marquee_core::ContentId;

    use crate::clients::{CatalogClient, CatalogContent, ContentClient, RemoteContent};

    /// Catalog fake that records every batch it is asked for.
    #[derive(Default)]
    pub struct FakeCatalog {
        pub items: HashMap<ContentId, CatalogContent>,
        pub calls: Mutex<Vec<BTreeSet<ContentId>>>,
        pub delay: Option<Duration>,
    }

    impl FakeCatalog {
        pub fn with(items: impl IntoIterator<Item = CatalogContent>) -> Self {
            Self {
                items: items.into_iter().map(|c| (c.id, c)).collect(),
                ..Self::default()
            }
        }

        pub fn calls(&self) -> Vec<BTreeSet<ContentId>> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CatalogClient for FakeCatalog {
        async fn fetch_batch(&self, ids: &BTreeSet<ContentId>) -> HashMap<ContentId, CatalogContent> {
            self.calls.lock().unwrap().push(ids.clone());
            if let Some(d) = self.delay {
                tokio::time::sleep(d).await;
            }
            ids.iter()
                .filter_map(|id| self.items.get(id).map(|c| (*id, c.clone())))
                .collect()
        }
    }

    pub fn catalog_item(id: i64, title: &str, genre: &str, duration: i32) -> CatalogContent {
        CatalogContent {
            id: ContentId::new(id),
            title: title.to_string(),
            content_type: "MOVIE".to_string(),
            duration_minutes: Some(duration),
            genre: Some(genre.to_string()),
            published_at: None,
        }
    }

    #[derive(Default)]
    pub struct FakeContent {
        pub items: HashMap<ContentId, RemoteContent>,
    }

    #[async_trait]
    impl ContentClient for FakeContent {
        async fn get_content(&self, id: ContentId) -> Option<RemoteContent> {
            self.items.get(&id).cloned()
        }
    }
}
