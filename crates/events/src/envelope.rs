use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::Event;

/// Envelope for an event crossing a service boundary.
///
/// This is the unit handed to the bus and delivered to consumers.
///
/// Notes:
/// - `key` is the id of the record that caused the event. The bus orders
///   delivery per key, so all events about one record arrive in order.
/// - `event_id` identifies one emission; redeliveries carry the same id.
/// - `payload` is the domain-agnostic event payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    key: String,
    #[serde(rename = "type")]
    event_type: String,
    payload: E,
    occurred_at: DateTime<Utc>,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        key: impl Into<String>,
        event_type: impl Into<String>,
        payload: E,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id,
            key: key.into(),
            event_type: event_type.into(),
            payload,
            occurred_at,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}

impl EventEnvelope<JsonValue> {
    /// Wrap a typed event, serializing its payload to JSON.
    ///
    /// A fresh UUIDv7 is assigned as the event id.
    pub fn from_event<E>(key: impl Into<String>, event: &E) -> Result<Self, serde_json::Error>
    where
        E: Event + Serialize,
    {
        let payload = serde_json::to_value(event)?;
        Ok(Self::new(
            Uuid::now_v7(),
            key,
            event.event_type(),
            payload,
            event.occurred_at(),
        ))
    }

    /// Decode the JSON payload into a typed event.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.payload)
    }
}
