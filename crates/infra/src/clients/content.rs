use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{instrument, warn};

use marquee_core::ContentId;

use super::{ClientError, HttpClientConfig};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteContent {
    pub id: ContentId,
    pub title: String,
    #[serde(rename = "type")]
    pub content_type: String,
    #[serde(default, deserialize_with = "super::timestamp::lenient")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Single-record lookup against content-service.
#[async_trait]
pub trait ContentClient: Send + Sync {
    /// `None` when the content does not exist or content-service cannot be reached.
    async fn get_content(&self, id: ContentId) -> Option<RemoteContent>;
}

/// `GET {base}/api/content/{id}`
#[derive(Debug, Clone)]
pub struct HttpContentClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpContentClient {
    pub fn new(config: HttpClientConfig) -> Result<Self, ClientError> {
        let (client, base_url) = config.build()?;
        Ok(Self { client, base_url })
    }

    async fn try_get(&self, id: ContentId) -> Result<Option<RemoteContent>, ClientError> {
        let url = format!("{}/api/content/{}", self.base_url, id);
        let response = self.client.get(url).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => Ok(Some(response.json::<RemoteContent>().await?)),
            s => Err(ClientError::Status(s.as_u16())),
        }
    }
}

#[async_trait]
impl ContentClient for HttpContentClient {
    #[instrument(skip(self, id), fields(content_id = %id))]
    async fn get_content(&self, id: ContentId) -> Option<RemoteContent> {
        match self.try_get(id).await {
            Ok(found) => found,
            Err(e) => {
                warn!(error = %e, "content lookup failed");
                None
            }
        }
    }
}
