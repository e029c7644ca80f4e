//! Write-model stores of the owning services.
//!
//! Each trait has an in-memory implementation used for dev and tests; ids are
//! assigned from a per-store sequence starting at 1.

pub mod catalog;
pub mod content;
pub mod watch;

pub use catalog::{CatalogRepository, InMemoryCatalogRepository};
pub use content::{ContentRepository, InMemoryContentRepository};
pub use watch::{InMemoryWatchRecordRepository, WatchRecordRepository};
