//! `marquee-events`: event contracts shared by every service.
//!
//! Envelopes, the integration events on the wire, the bus contract and the
//! projection contract. No IO lives here apart from the in-memory bus.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;
pub mod integration;
pub mod projection;

pub use bus::{AckError, Delivery, EventBus, PartitionKey, Subscription, SubscriptionSource, partition_for};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use integration::{
    CONTENT_CREATED, CONTENT_EVENTS_TOPIC, ContentCreated, WATCH_EVENTS_TOPIC, WATCH_RECORDED,
    WatchRecorded,
};
pub use projection::{Projection, ProjectionFailure, ProjectionOutcome};
