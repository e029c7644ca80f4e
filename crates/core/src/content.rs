use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::id::ContentId;

/// Kind of content item.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContentType {
    Movie,
    Series,
    Show,
    Documentary,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Movie => "MOVIE",
            ContentType::Series => "SERIES",
            ContentType::Show => "SHOW",
            ContentType::Documentary => "DOCUMENTARY",
        }
    }
}

impl core::fmt::Display for ContentType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for ContentType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "MOVIE" => Ok(ContentType::Movie),
            "SERIES" => Ok(ContentType::Series),
            "SHOW" => Ok(ContentType::Show),
            "DOCUMENTARY" => Ok(ContentType::Documentary),
            other => Err(DomainError::validation(format!(
                "unknown content type '{other}' (expected one of: MOVIE, SERIES, SHOW, DOCUMENTARY)"
            ))),
        }
    }
}

/// Content item owned by content-service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    pub id: ContentId,
    pub title: String,
    #[serde(rename = "type")]
    pub content_type: ContentType,
    pub created_at: DateTime<Utc>,
}

/// Unsaved content (the store assigns `id` and `created_at`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContent {
    pub title: String,
    pub content_type: ContentType,
}

impl NewContent {
    pub fn new(title: impl Into<String>, content_type: ContentType) -> DomainResult<Self> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(DomainError::validation("title must not be blank"));
        }
        Ok(Self { title, content_type })
    }

    pub fn into_content(self, id: ContentId, created_at: DateTime<Utc>) -> Content {
        Content {
            id,
            title: self.title,
            content_type: self.content_type,
            created_at,
        }
    }
}

/// Authoritative descriptive record owned by catalog-service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub id: ContentId,
    pub title: String,
    #[serde(rename = "type")]
    pub content_type: ContentType,
    pub duration_minutes: Option<i32>,
    pub genre: Option<String>,
    pub published_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCatalogEntry {
    pub title: String,
    pub content_type: ContentType,
    pub duration_minutes: Option<i32>,
    pub genre: Option<String>,
}

impl NewCatalogEntry {
    pub fn new(
        title: impl Into<String>,
        content_type: ContentType,
        duration_minutes: Option<i32>,
        genre: Option<String>,
    ) -> DomainResult<Self> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(DomainError::validation("title must not be blank"));
        }
        if matches!(duration_minutes, Some(d) if d < 0) {
            return Err(DomainError::validation("durationMinutes must not be negative"));
        }
        Ok(Self {
            title,
            content_type,
            duration_minutes,
            genre,
        })
    }

    pub fn into_entry(self, id: ContentId, published_at: DateTime<Utc>) -> CatalogEntry {
        CatalogEntry {
            id,
            title: self.title,
            content_type: self.content_type,
            duration_minutes: self.duration_minutes,
            genre: self.genre,
            published_at,
        }
    }
}
