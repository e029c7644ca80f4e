//! Clients for collaborating services.
//!
//! Every call degrades instead of failing: transport, status and decoding
//! errors are logged and surface as "nothing found" to the caller.

pub mod catalog;
pub mod content;
mod timestamp;

use std::time::Duration;

use thiserror::Error;

pub use catalog::{CatalogClient, CatalogContent, HttpCatalogClient};
pub use content::{ContentClient, HttpContentClient, RemoteContent};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("client configuration error: {0}")]
    Config(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {0}")]
    Status(u16),
}

/// Connection settings for one collaborator.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Base URL, e.g. `http://catalog-service:8082`.
    pub base_url: String,
    pub timeout: Duration,
}

impl HttpClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(2),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn build(&self) -> Result<(reqwest::Client, String), ClientError> {
        let base = self.base_url.trim().trim_end_matches('/');
        if base.is_empty() {
            return Err(ClientError::Config("base URL not configured".to_string()));
        }
        let client = reqwest::Client::builder().timeout(self.timeout).build()?;
        Ok((client, base.to_string()))
    }
}
