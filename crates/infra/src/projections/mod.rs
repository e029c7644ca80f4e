//! Projection implementations (read model builders).
//!
//! Projections consume envelopes from the bus and maintain disposable,
//! rebuildable read models. All of them are idempotent under redelivery.

pub mod content_views;

pub use content_views::{
    CONTENT_VIEWS_PROJECTION, ContentViewProjection, ProjectionError, content_created_envelope,
};
