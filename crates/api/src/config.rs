//! Process configuration, read once from the environment at startup.
//!
//! Every setting has a default; a value that does not parse is logged and
//! replaced by its default rather than aborting startup.

use std::time::Duration;

use tracing::warn;

use marquee_infra::aggregation::DEFAULT_ENRICHMENT_TIMEOUT;
use marquee_infra::outbox::OutboxConfig;

/// Which service(s) this process hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceRole {
    Content,
    Catalog,
    WatchHistory,
    Recommendation,
    All,
}

impl ServiceRole {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "content" => Some(Self::Content),
            "catalog" => Some(Self::Catalog),
            "watch-history" | "watch_history" | "watch" => Some(Self::WatchHistory),
            "recommendation" | "recommendations" => Some(Self::Recommendation),
            "all" => Some(Self::All),
            _ => None,
        }
    }

    /// Whether a process configured as `self` serves `role`'s routes.
    pub fn hosts(self, role: ServiceRole) -> bool {
        self == Self::All || self == role
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Content => "content-service",
            Self::Catalog => "catalog-service",
            Self::WatchHistory => "watch-history-service",
            Self::Recommendation => "recommendation-service",
            Self::All => "marquee",
        }
    }
}

/// How a write reaches the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishMode {
    /// Fire-and-forget submit after the local commit.
    Direct,
    /// Envelope stored with the write, drained by the outbox dispatcher.
    Outbox,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusBackend {
    Memory,
    Redis,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub service: ServiceRole,
    pub bind_addr: String,
    pub catalog_service_url: String,
    pub content_service_url: String,
    pub enrichment_timeout: Duration,
    pub publish_mode: PublishMode,
    pub outbox: OutboxConfig,
    pub event_bus: BusBackend,
    pub redis_url: Option<String>,
    pub database_url: Option<String>,
}

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_SERVICE_URL: &str = "http://localhost:8080";

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            service: ServiceRole::All,
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            catalog_service_url: DEFAULT_SERVICE_URL.to_string(),
            content_service_url: DEFAULT_SERVICE_URL.to_string(),
            enrichment_timeout: DEFAULT_ENRICHMENT_TIMEOUT,
            publish_mode: PublishMode::Direct,
            outbox: OutboxConfig::default(),
            event_bus: BusBackend::Memory,
            redis_url: None,
            database_url: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the environment in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut cfg = Self::default();

        if let Some(v) = get("MARQUEE_SERVICE") {
            cfg.service = parsed("MARQUEE_SERVICE", &v, ServiceRole::parse(&v), cfg.service);
        }
        if let Some(v) = get("BIND_ADDR") {
            cfg.bind_addr = v;
        }
        if let Some(v) = get("CATALOG_SERVICE_URL") {
            cfg.catalog_service_url = v;
        }
        if let Some(v) = get("CONTENT_SERVICE_URL") {
            cfg.content_service_url = v;
        }
        if let Some(v) = get("ENRICHMENT_TIMEOUT_MS") {
            cfg.enrichment_timeout = parsed_millis("ENRICHMENT_TIMEOUT_MS", &v, cfg.enrichment_timeout);
        }
        if let Some(v) = get("PUBLISH_MODE") {
            let mode = match v.trim().to_ascii_lowercase().as_str() {
                "direct" => Some(PublishMode::Direct),
                "outbox" => Some(PublishMode::Outbox),
                _ => None,
            };
            cfg.publish_mode = parsed("PUBLISH_MODE", &v, mode, cfg.publish_mode);
        }
        if let Some(v) = get("OUTBOX_POLL_INTERVAL_MS") {
            cfg.outbox.poll_interval =
                parsed_millis("OUTBOX_POLL_INTERVAL_MS", &v, cfg.outbox.poll_interval);
        }
        if let Some(v) = get("OUTBOX_MAX_ATTEMPTS") {
            let attempts = v.trim().parse::<u32>().ok().filter(|n| *n > 0);
            cfg.outbox.max_attempts =
                parsed("OUTBOX_MAX_ATTEMPTS", &v, attempts, cfg.outbox.max_attempts);
        }
        if let Some(v) = get("EVENT_BUS") {
            let backend = match v.trim().to_ascii_lowercase().as_str() {
                "memory" | "in-memory" => Some(BusBackend::Memory),
                "redis" => Some(BusBackend::Redis),
                _ => None,
            };
            cfg.event_bus = parsed("EVENT_BUS", &v, backend, cfg.event_bus);
        }
        cfg.redis_url = get("REDIS_URL");
        cfg.database_url = get("DATABASE_URL");

        cfg
    }
}

fn parsed<T: std::fmt::Debug>(key: &str, raw: &str, value: Option<T>, default: T) -> T {
    match value {
        Some(v) => v,
        None => {
            warn!(key, value = raw, default = ?default, "invalid config value; using default");
            default
        }
    }
}

fn parsed_millis(key: &str, raw: &str, default: Duration) -> Duration {
    let value = raw.trim().parse::<u64>().ok().map(Duration::from_millis);
    parsed(key, raw, value, default)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(pairs: &[(&str, &str)]) -> AppConfig {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|k| env.get(k).cloned())
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let cfg = config(&[]);
        assert_eq!(cfg.service, ServiceRole::All);
        assert_eq!(cfg.bind_addr, DEFAULT_BIND_ADDR);
        assert_eq!(cfg.enrichment_timeout, Duration::from_millis(2000));
        assert_eq!(cfg.publish_mode, PublishMode::Direct);
        assert_eq!(cfg.event_bus, BusBackend::Memory);
        assert!(cfg.database_url.is_none());
    }

    #[test]
    fn values_are_read() {
        let cfg = config(&[
            ("MARQUEE_SERVICE", "watch-history"),
            ("CATALOG_SERVICE_URL", "http://catalog:8082"),
            ("ENRICHMENT_TIMEOUT_MS", "750"),
            ("PUBLISH_MODE", "OUTBOX"),
            ("OUTBOX_MAX_ATTEMPTS", "3"),
            ("EVENT_BUS", "redis"),
            ("REDIS_URL", "redis://localhost:6379"),
        ]);
        assert_eq!(cfg.service, ServiceRole::WatchHistory);
        assert_eq!(cfg.catalog_service_url, "http://catalog:8082");
        assert_eq!(cfg.enrichment_timeout, Duration::from_millis(750));
        assert_eq!(cfg.publish_mode, PublishMode::Outbox);
        assert_eq!(cfg.outbox.max_attempts, 3);
        assert_eq!(cfg.event_bus, BusBackend::Redis);
        assert_eq!(cfg.redis_url.as_deref(), Some("redis://localhost:6379"));
    }

    #[test]
    fn invalid_values_fall_back_to_defaults() {
        let cfg = config(&[
            ("MARQUEE_SERVICE", "billing"),
            ("ENRICHMENT_TIMEOUT_MS", "soon"),
            ("OUTBOX_MAX_ATTEMPTS", "0"),
            ("PUBLISH_MODE", "carrier-pigeon"),
        ]);
        assert_eq!(cfg.service, ServiceRole::All);
        assert_eq!(cfg.enrichment_timeout, DEFAULT_ENRICHMENT_TIMEOUT);
        assert_eq!(cfg.outbox.max_attempts, OutboxConfig::default().max_attempts);
        assert_eq!(cfg.publish_mode, PublishMode::Direct);
    }

    #[test]
    fn all_hosts_every_role() {
        assert!(ServiceRole::All.hosts(ServiceRole::Catalog));
        assert!(ServiceRole::Catalog.hosts(ServiceRole::Catalog));
        assert!(!ServiceRole::Catalog.hosts(ServiceRole::Content));
    }
}
