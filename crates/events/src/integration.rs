//! Integration events exchanged between services.
//!
//! Field names are the JSON wire contract; renaming one breaks every consumer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use marquee_core::{ContentId, ContentType, VisitorId};

use crate::Event;

/// Topic carrying content lifecycle facts, keyed by content id.
pub const CONTENT_EVENTS_TOPIC: &str = "content-events";

/// Topic carrying watch facts, keyed by visitor id.
pub const WATCH_EVENTS_TOPIC: &str = "watch-events";

pub const CONTENT_CREATED: &str = "content.created";
pub const WATCH_RECORDED: &str = "watch.recorded";

/// A content item was created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentCreated {
    pub id: ContentId,
    pub title: String,
    #[serde(rename = "type")]
    pub content_type: ContentType,
    pub timestamp: DateTime<Utc>,
}

impl Event for ContentCreated {
    fn event_type(&self) -> &'static str {
        CONTENT_CREATED
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// A visitor watched content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchRecorded {
    pub visitor_id: VisitorId,
    pub content_id: ContentId,
    pub watched_seconds: i32,
    pub timestamp: DateTime<Utc>,
}

impl Event for WatchRecorded {
    fn event_type(&self) -> &'static str {
        WATCH_RECORDED
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.timestamp
    }
}
