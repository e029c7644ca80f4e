use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::id::{ContentId, VisitorId, WatchRecordId};

/// A visitor watched some content for a number of seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchRecord {
    pub id: WatchRecordId,
    pub visitor_id: VisitorId,
    pub content_id: ContentId,
    pub watched_seconds: i32,
    pub watched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewWatchRecord {
    pub visitor_id: VisitorId,
    pub content_id: ContentId,
    pub watched_seconds: i32,
}

impl NewWatchRecord {
    pub fn new(visitor_id: VisitorId, content_id: ContentId, watched_seconds: i32) -> DomainResult<Self> {
        if watched_seconds < 0 {
            return Err(DomainError::validation("watchedSeconds must not be negative"));
        }
        Ok(Self {
            visitor_id,
            content_id,
            watched_seconds,
        })
    }

    pub fn into_record(self, id: WatchRecordId, watched_at: DateTime<Utc>) -> WatchRecord {
        WatchRecord {
            id,
            visitor_id: self.visitor_id,
            content_id: self.content_id,
            watched_seconds: self.watched_seconds,
            watched_at,
        }
    }
}
