//! Infrastructure event bus implementations.
//!
//! The bus contract lives in `marquee-events` as pure mechanics. This module
//! provides the Redis-backed implementation and [`SharedBus`], the runtime
//! choice between backends.

#[cfg(feature = "redis")]
pub mod redis_streams;

use std::sync::Arc;

use serde_json::Value as JsonValue;
use thiserror::Error;

use marquee_events::{EventBus, EventEnvelope, InMemoryBusError, InMemoryEventBus, Subscription};

#[cfg(feature = "redis")]
pub use redis_streams::{RedisStreamsError, RedisStreamsEventBus};

pub type Envelope = EventEnvelope<JsonValue>;

/// Bus selected at startup.
#[derive(Debug, Clone)]
pub enum SharedBus {
    InMemory(Arc<InMemoryEventBus<Envelope>>),
    #[cfg(feature = "redis")]
    Redis(Arc<RedisStreamsEventBus>),
}

#[derive(Debug, Error)]
pub enum BusError {
    #[error(transparent)]
    InMemory(#[from] InMemoryBusError),

    #[cfg(feature = "redis")]
    #[error(transparent)]
    Redis(#[from] RedisStreamsError),
}

impl SharedBus {
    pub fn in_memory() -> Self {
        Self::InMemory(Arc::new(InMemoryEventBus::new()))
    }

    pub fn backend(&self) -> &'static str {
        match self {
            Self::InMemory(_) => "memory",
            #[cfg(feature = "redis")]
            Self::Redis(_) => "redis",
        }
    }
}

impl EventBus<Envelope> for SharedBus {
    type Error = BusError;

    fn publish(&self, topic: &str, message: Envelope) -> Result<(), Self::Error> {
        match self {
            Self::InMemory(bus) => Ok(bus.publish(topic, message)?),
            #[cfg(feature = "redis")]
            Self::Redis(bus) => Ok(bus.publish(topic, message)?),
        }
    }

    fn subscribe(&self, topic: &str, group: &str) -> Subscription<Envelope> {
        match self {
            Self::InMemory(bus) => bus.subscribe(topic, group),
            #[cfg(feature = "redis")]
            Self::Redis(bus) => bus.subscribe(topic, group),
        }
    }
}
