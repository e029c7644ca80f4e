//! `marquee-core`: domain records shared by every service.
//!
//! This crate contains **pure domain** types (no IO, no bus, no HTTP).

pub mod content;
pub mod error;
pub mod id;
pub mod watch;

pub use content::{CatalogEntry, Content, ContentType, NewCatalogEntry, NewContent};
pub use error::{DomainError, DomainResult};
pub use id::{ContentId, VisitorId, WatchRecordId};
pub use watch::{NewWatchRecord, WatchRecord};
