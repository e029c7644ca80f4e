//! Infrastructure layer: stores, bus backends, publisher, projections,
//! collaborator clients and read-time aggregation.

pub mod aggregation;
pub mod clients;
pub mod error;
pub mod event_bus;
pub mod outbox;
pub mod projections;
pub mod publisher;
pub mod read_model;
pub mod repository;
pub mod workers;


pub use error::StoreError;
