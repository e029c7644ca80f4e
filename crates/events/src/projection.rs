use serde_json::Value as JsonValue;

use crate::EventEnvelope;

/// What a projection did with one delivered envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionOutcome {
    /// The read model changed (or was confirmed) from this event.
    Applied,
    /// This exact event id was already applied; nothing written.
    Duplicate,
    /// The event type is not one this projection consumes.
    Ignored,
}

/// Classifies projection errors for the consuming worker.
///
/// A *poison* error means the envelope itself can never be applied (malformed
/// payload); retrying would block its partition forever, so the worker logs it
/// and moves past. Every other error is treated as transient and the record is
/// redelivered.
pub trait ProjectionFailure {
    fn is_poison(&self) -> bool;
}

/// A projection builds a read model from events delivered by the bus.
///
/// ## Idempotency
///
/// Delivery is at-least-once. Applying the same envelope twice must leave the
/// read model as if it had been applied once. Implementations typically key
/// their writes on the record id (upsert) and remember the last event id.
///
/// ## Disposability
///
/// Read models are derived data: they can be dropped and rebuilt by replaying
/// the topic from offset zero under a fresh consumer group.
#[async_trait::async_trait]
pub trait Projection: Send + Sync {
    type Error: std::error::Error + ProjectionFailure + Send + Sync + 'static;

    /// Stable name, used as the consumer group and in logs.
    fn name(&self) -> &'static str;

    /// Apply a single envelope to the read model.
    async fn apply(&self, envelope: &EventEnvelope<JsonValue>)
    -> Result<ProjectionOutcome, Self::Error>;
}
