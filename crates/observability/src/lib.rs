//! Tracing and logging setup shared by every Marquee service binary.

/// Tracing configuration (filters, layers).
pub mod tracing;

pub use self::tracing::{DEFAULT_FILTER, filter_from_env};

/// Initialize process-wide logging for `service`.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init(service: &str) {
    self::tracing::init();
    ::tracing::info!(service, "logging initialized");
}
