use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use marquee_core::ContentId;

use super::{ClientError, HttpClientConfig};

/// Catalog data as returned by the batch endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogContent {
    pub id: ContentId,
    pub title: String,
    #[serde(rename = "type")]
    pub content_type: String,
    #[serde(default)]
    pub duration_minutes: Option<i32>,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default, deserialize_with = "super::timestamp::lenient")]
    pub published_at: Option<DateTime<Utc>>,
}

/// Batch lookup against catalog-service.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Resolve many ids with a single request.
    ///
    /// Ids the catalog does not know are absent from the map. Never fails: on
    /// any error the map is empty.
    async fn fetch_batch(&self, ids: &BTreeSet<ContentId>) -> HashMap<ContentId, CatalogContent>;
}

/// `GET {base}/api/catalog/batch?ids=1,2,3`
#[derive(Debug, Clone)]
pub struct HttpCatalogClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCatalogClient {
    pub fn new(config: HttpClientConfig) -> Result<Self, ClientError> {
        let (client, base_url) = config.build()?;
        Ok(Self { client, base_url })
    }

    fn batch_url(&self, ids: &BTreeSet<ContentId>) -> String {
        let joined = ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        format!("{}/api/catalog/batch?ids={}", self.base_url, joined)
    }

    async fn try_fetch_batch(&self, ids: &BTreeSet<ContentId>) -> Result<Vec<CatalogContent>, ClientError> {
        let response = self.client.get(self.batch_url(ids)).send().await?;
        if !response.status().is_success() {
            return Err(ClientError::Status(response.status().as_u16()));
        }
        Ok(response.json::<Vec<CatalogContent>>().await?)
    }
}

#[async_trait]
impl CatalogClient for HttpCatalogClient {
    #[instrument(skip(self, ids), fields(ids = ids.len()))]
    async fn fetch_batch(&self, ids: &BTreeSet<ContentId>) -> HashMap<ContentId, CatalogContent> {
        if ids.is_empty() {
            return HashMap::new();
        }

        match self.try_fetch_batch(ids).await {
            Ok(items) => {
                debug!(requested = ids.len(), resolved = items.len(), "catalog batch fetched");
                items.into_iter().map(|c| (c.id, c)).collect()
            }
            Err(e) => {
                warn!(error = %e, "catalog batch fetch failed; continuing without catalog data");
                HashMap::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::{Json, Router, routing::get};
    use serde_json::json;

    use super::*;

    /// Fake catalog-service whose batch endpoint sends zoneless timestamps.
    async fn spawn_zoneless_catalog() -> (String, tokio::task::JoinHandle<()>) {
        let app = Router::new().route(
            "/api/catalog/batch",
            get(|| async {
                Json(json!([
                    {
                        "id": 1,
                        "title": "Inception",
                        "type": "MOVIE",
                        "durationMinutes": 148,
                        "genre": "Sci-Fi",
                        "publishedAt": "2026-01-02T03:04:05.123456"
                    },
                    {
                        "id": 2,
                        "title": "Dark",
                        "type": "SERIES",
                        "publishedAt": "2026-01-03T00:00:00"
                    }
                ]))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), handle)
    }

    #[test]
    fn batch_url_joins_ids_with_commas() {
        let client = HttpCatalogClient::new(HttpClientConfig::new("http://catalog:8082/")).unwrap();
        let ids: BTreeSet<ContentId> = [3, 1, 2].into_iter().map(ContentId::new).collect();
        assert_eq!(client.batch_url(&ids), "http://catalog:8082/api/catalog/batch?ids=1,2,3");
    }

    #[test]
    fn blank_base_url_is_rejected() {
        assert!(matches!(
            HttpCatalogClient::new(HttpClientConfig::new("  ")),
            Err(ClientError::Config(_))
        ));
    }

    #[test]
    fn decodes_batch_item_with_missing_optionals() {
        let json = r#"{"id":4,"title":"Dune","type":"MOVIE"}"#;
        let item: CatalogContent = serde_json::from_str(json).unwrap();
        assert_eq!(item.id, ContentId::new(4));
        assert!(item.genre.is_none());
        assert!(item.published_at.is_none());
    }

    #[tokio::test]
    async fn empty_input_makes_no_call() {
        // Nothing listens on this port; a request would fail, not hang.
        let client = HttpCatalogClient::new(HttpClientConfig::new("http://127.0.0.1:9")).unwrap();
        assert!(client.fetch_batch(&BTreeSet::new()).await.is_empty());
    }

    #[tokio::test]
    async fn unreachable_catalog_yields_empty_map() {
        let client = HttpCatalogClient::new(
            HttpClientConfig::new("http://127.0.0.1:9")
                .with_timeout(std::time::Duration::from_millis(300)),
        )
        .unwrap();
        let ids: BTreeSet<ContentId> = [ContentId::new(1)].into_iter().collect();
        assert!(client.fetch_batch(&ids).await.is_empty());
    }

    #[test]
    fn bad_published_at_does_not_fail_the_item() {
        let json = r#"[
            {"id":1,"title":"Dune","type":"MOVIE","publishedAt":"not a date"},
            {"id":2,"title":"Dark","type":"SERIES","publishedAt":20260101}
        ]"#;
        let items: Vec<CatalogContent> = serde_json::from_str(json).unwrap();
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|i| i.published_at.is_none()));
    }

    #[tokio::test]
    async fn zoneless_published_at_resolves_every_id() {
        let (base, server) = spawn_zoneless_catalog().await;
        let client = HttpCatalogClient::new(HttpClientConfig::new(base)).unwrap();
        let ids: BTreeSet<ContentId> = [1, 2].into_iter().map(ContentId::new).collect();

        let found = client.fetch_batch(&ids).await;
        assert_eq!(found.len(), 2);

        let inception = &found[&ContentId::new(1)];
        assert_eq!(inception.genre.as_deref(), Some("Sci-Fi"));
        assert_eq!(
            inception.published_at.map(|t| t.to_rfc3339()).as_deref(),
            Some("2026-01-02T03:04:05.123456+00:00")
        );
        assert!(found[&ContentId::new(2)].published_at.is_some());

        server.abort();
    }
}
