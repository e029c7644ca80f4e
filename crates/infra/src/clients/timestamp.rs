//! Timestamp fields in collaborator payloads.
//!
//! Accepts RFC 3339 or a zoneless ISO-8601 date-time (read as UTC). Any other
//! value, string or not, decodes to `None` instead of failing the document.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer};
use tracing::debug;

#[derive(Deserialize)]
#[serde(untagged)]
enum Raw {
    Text(String),
    Other(IgnoredAny),
}

pub(crate) fn parse(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    raw.parse::<NaiveDateTime>().ok().map(|naive| naive.and_utc())
}

/// `#[serde(default, deserialize_with = "timestamp::lenient")]`
pub(crate) fn lenient<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Text(s)) => {
            let parsed = parse(&s);
            if parsed.is_none() {
                debug!(value = %s, "unparseable timestamp ignored");
            }
            parsed
        }
        Some(Raw::Other(_)) | None => None,
    })
}
