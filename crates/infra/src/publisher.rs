//! Event publisher: turns a committed local write into an envelope on the bus.
//!
//! ```text
//! repository.insert(..)  ──commit──►  publisher.publish(&record)
//!                                        │ (FIFO channel → event-publisher thread)
//!                                        ▼
//!                                   bus.publish(topic, envelope)
//!                                        │
//!                                        ▼
//!                                   PublishCallback(&PublishOutcome)
//! ```
//!
//! The caller never waits for the bus. Serialization and transport failures
//! are reported through the callback and the event is dropped: the local
//! write stands, and no retry happens here. Use the outbox when losing the
//! event is not acceptable.
//!
//! One thread drains the submissions in call order, so records sharing a
//! key reach the bus in the order they were published.

use std::sync::{Arc, mpsc};
use std::thread;

use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{debug, error, warn};
use uuid::Uuid;

use marquee_core::{Content, WatchRecord};
use marquee_events::{
    CONTENT_EVENTS_TOPIC, ContentCreated, Event, EventBus, EventEnvelope, WATCH_EVENTS_TOPIC,
    WatchRecorded,
};

/// A committed record that announces itself on the bus.
pub trait Publishable {
    type Event: Event + Serialize;

    fn topic(&self) -> &'static str;

    /// Partition key; the id of the record that caused the event.
    fn key(&self) -> String;

    fn to_event(&self) -> Self::Event;

    fn to_envelope(&self) -> Result<EventEnvelope<JsonValue>, serde_json::Error> {
        EventEnvelope::from_event(self.key(), &self.to_event())
    }
}

impl Publishable for Content {
    type Event = ContentCreated;

    fn topic(&self) -> &'static str {
        CONTENT_EVENTS_TOPIC
    }

    fn key(&self) -> String {
        self.id.to_string()
    }

    fn to_event(&self) -> ContentCreated {
        ContentCreated {
            id: self.id,
            title: self.title.clone(),
            content_type: self.content_type,
            timestamp: self.created_at,
        }
    }
}

impl Publishable for WatchRecord {
    type Event = WatchRecorded;

    fn topic(&self) -> &'static str {
        WATCH_EVENTS_TOPIC
    }

    fn key(&self) -> String {
        self.visitor_id.to_string()
    }

    fn to_event(&self) -> WatchRecorded {
        WatchRecorded {
            visitor_id: self.visitor_id.clone(),
            content_id: self.content_id,
            watched_seconds: self.watched_seconds,
            timestamp: self.watched_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishStatus {
    Published,
    SerializationFailed(String),
    TransportFailed(String),
}

/// Completion report for one publish call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOutcome {
    pub topic: &'static str,
    pub key: String,
    /// `None` when the envelope could not be built.
    pub event_id: Option<Uuid>,
    pub status: PublishStatus,
}

impl PublishOutcome {
    pub fn is_published(&self) -> bool {
        self.status == PublishStatus::Published
    }
}

pub type PublishCallback = Arc<dyn Fn(&PublishOutcome) + Send + Sync>;

/// Default callback: one structured log line per outcome.
pub fn log_outcome(outcome: &PublishOutcome) {
    match &outcome.status {
        PublishStatus::Published => debug!(
            topic = outcome.topic,
            key = %outcome.key,
            event_id = ?outcome.event_id,
            "event published"
        ),
        PublishStatus::SerializationFailed(e) => error!(
            topic = outcome.topic,
            key = %outcome.key,
            error = %e,
            "event dropped: serialization failed"
        ),
        PublishStatus::TransportFailed(e) => warn!(
            topic = outcome.topic,
            key = %outcome.key,
            event_id = ?outcome.event_id,
            error = %e,
            "event dropped: bus rejected publish"
        ),
    }
}

/// One envelope waiting for the publisher thread.
struct Submission {
    topic: &'static str,
    key: String,
    envelope: EventEnvelope<JsonValue>,
}

/// Fire-and-forget publisher.
///
/// Submissions go through one FIFO channel drained by a single
/// `event-publisher` thread, so records reach the bus in the order
/// `publish` was called. The thread exits once every clone is dropped.
#[derive(Clone)]
pub struct EventPublisher {
    submissions: mpsc::Sender<Submission>,
    callback: PublishCallback,
}

impl EventPublisher {
    /// Start a publisher that reports outcomes through [`log_outcome`].
    pub fn new<B>(bus: B) -> std::io::Result<Self>
    where
        B: EventBus<EventEnvelope<JsonValue>> + 'static,
    {
        Self::with_callback(bus, Arc::new(log_outcome))
    }

    pub fn with_callback<B>(bus: B, callback: PublishCallback) -> std::io::Result<Self>
    where
        B: EventBus<EventEnvelope<JsonValue>> + 'static,
    {
        let (submissions, rx) = mpsc::channel::<Submission>();
        let thread_callback = callback.clone();

        thread::Builder::new()
            .name("event-publisher".to_string())
            .spawn(move || {
                for Submission { topic, key, envelope } in rx {
                    let event_id = Some(envelope.event_id());
                    let status = match bus.publish(topic, envelope) {
                        Ok(()) => PublishStatus::Published,
                        Err(e) => PublishStatus::TransportFailed(e.to_string()),
                    };
                    thread_callback(&PublishOutcome {
                        topic,
                        key,
                        event_id,
                        status,
                    });
                }
                debug!("event publisher stopped");
            })?;

        Ok(Self {
            submissions,
            callback,
        })
    }

    /// Publish the event for a record whose write has already committed.
    ///
    /// Returns immediately; the outcome is delivered to the callback.
    pub fn publish<R: Publishable>(&self, record: &R) {
        let topic = record.topic();
        let key = record.key();

        let envelope = match record.to_envelope() {
            Ok(env) => env,
            Err(e) => {
                (self.callback)(&PublishOutcome {
                    topic,
                    key,
                    event_id: None,
                    status: PublishStatus::SerializationFailed(e.to_string()),
                });
                return;
            }
        };

        let event_id = Some(envelope.event_id());
        if self
            .submissions
            .send(Submission {
                topic,
                key: key.clone(),
                envelope,
            })
            .is_err()
        {
            (self.callback)(&PublishOutcome {
                topic,
                key,
                event_id,
                status: PublishStatus::TransportFailed("publisher thread stopped".to_string()),
            });
        }
    }
}
