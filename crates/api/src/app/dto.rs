use serde::Deserialize;

use marquee_core::{ContentId, ContentType, DomainError, NewCatalogEntry, NewContent, NewWatchRecord, VisitorId};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CreateContentRequest {
    pub title: String,
    #[serde(rename = "type")]
    pub content_type: String,
}

impl CreateContentRequest {
    pub fn into_new(self) -> Result<NewContent, DomainError> {
        NewContent::new(self.title, self.content_type.parse::<ContentType>()?)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCatalogEntryRequest {
    pub title: String,
    #[serde(rename = "type")]
    pub content_type: String,
    pub duration_minutes: Option<i32>,
    pub genre: Option<String>,
}

impl CreateCatalogEntryRequest {
    pub fn into_new(self) -> Result<NewCatalogEntry, DomainError> {
        NewCatalogEntry::new(
            self.title,
            self.content_type.parse::<ContentType>()?,
            self.duration_minutes,
            self.genre,
        )
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordWatchRequest {
    pub visitor_id: String,
    pub content_id: i64,
    pub watched_seconds: i32,
}

impl RecordWatchRequest {
    pub fn into_new(self) -> Result<NewWatchRecord, DomainError> {
        NewWatchRecord::new(
            VisitorId::parse(self.visitor_id)?,
            ContentId::new(self.content_id),
            self.watched_seconds,
        )
    }
}

// -------------------------
// Query parsing
// -------------------------

/// Ids from `ids=1,2,3` and/or repeated `ids=` pairs; duplicates removed, order kept.
pub fn parse_batch_ids(raw_query: Option<&str>) -> Result<Vec<ContentId>, DomainError> {
    let mut ids = Vec::new();
    for pair in raw_query.unwrap_or_default().split('&') {
        let Some(value) = pair.strip_prefix("ids=") else {
            continue;
        };
        for part in value.split(',').flat_map(|p| p.split("%2C")).flat_map(|p| p.split("%2c")) {
            if part.trim().is_empty() {
                continue;
            }
            let id = part.parse::<ContentId>()?;
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }
    Ok(ids)
}
