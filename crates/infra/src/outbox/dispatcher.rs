use std::collections::HashSet;
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value as JsonValue;
use tracing::{debug, error, info, warn};

use marquee_events::{EventBus, EventEnvelope};

use super::{AttemptResult, OutboxStore};
use crate::error::StoreError;
use crate::workers::WorkerHandle;

#[derive(Debug, Clone)]
pub struct OutboxConfig {
    pub poll_interval: Duration,
    /// Attempts before an entry is marked dead.
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            max_attempts: 10,
            base_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl OutboxConfig {
    /// Delay before the next attempt after `attempts` failures (exponential, capped).
    pub fn backoff_for(&self, attempts: u32) -> Duration {
        let exp = attempts.saturating_sub(1).min(16);
        self.base_backoff
            .saturating_mul(1u32 << exp)
            .min(self.max_backoff)
    }
}

/// Counts for one pass over the outbox.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
    pub dead: usize,
    /// Not attempted: backoff not elapsed, or an earlier entry for the same key is held back.
    pub deferred: usize,
}

/// Drains the outbox to the bus.
pub struct OutboxDispatcher<B> {
    store: Arc<dyn OutboxStore>,
    bus: B,
    config: OutboxConfig,
}

impl<B> OutboxDispatcher<B>
where
    B: EventBus<EventEnvelope<JsonValue>> + 'static,
{
    pub fn new(store: Arc<dyn OutboxStore>, bus: B, config: OutboxConfig) -> Self {
        Self { store, bus, config }
    }

    /// One pass over pending entries, in insertion order.
    pub fn dispatch_once(&self) -> Result<DispatchReport, StoreError> {
        let now = Utc::now();
        let mut report = DispatchReport::default();
        let mut held_keys: HashSet<String> = HashSet::new();

        for entry in self.store.pending()? {
            let key = entry.envelope.key().to_string();
            if held_keys.contains(&key) || entry.next_attempt_at > now {
                held_keys.insert(key);
                report.deferred += 1;
                continue;
            }

            match self.bus.publish(&entry.topic, entry.envelope.clone()) {
                Ok(()) => {
                    debug!(
                        outbox_id = %entry.id,
                        topic = %entry.topic,
                        key = %key,
                        event_id = %entry.envelope.event_id(),
                        "outbox entry delivered"
                    );
                    self.store.record_attempt(entry.id, AttemptResult::Delivered)?;
                    report.delivered += 1;
                }
                Err(e) => {
                    let attempts = entry.attempts + 1;
                    let error = e.to_string();
                    if attempts >= self.config.max_attempts {
                        error!(
                            outbox_id = %entry.id,
                            topic = %entry.topic,
                            key = %key,
                            attempts,
                            error = %error,
                            "outbox entry exhausted retries; marked dead"
                        );
                        self.store
                            .record_attempt(entry.id, AttemptResult::Dead { error })?;
                        report.dead += 1;
                    } else {
                        let delay = self.config.backoff_for(attempts);
                        warn!(
                            outbox_id = %entry.id,
                            topic = %entry.topic,
                            key = %key,
                            attempts,
                            retry_in_ms = delay.as_millis() as u64,
                            error = %error,
                            "outbox publish failed"
                        );
                        let next_attempt_at = now
                            + chrono::Duration::from_std(delay)
                                .unwrap_or_else(|_| chrono::Duration::seconds(1));
                        self.store.record_attempt(
                            entry.id,
                            AttemptResult::Failed {
                                error,
                                next_attempt_at,
                            },
                        )?;
                        held_keys.insert(key);
                        report.failed += 1;
                    }
                }
            }
        }

        Ok(report)
    }

    /// Run `dispatch_once` every `poll_interval` on a dedicated thread.
    pub fn spawn(self) -> std::io::Result<WorkerHandle>
    where
        B: Send,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let interval = self.config.poll_interval;

        let join = thread::Builder::new()
            .name("outbox-dispatcher".to_string())
            .spawn(move || {
                info!(poll_interval_ms = interval.as_millis() as u64, "outbox dispatcher started");
                loop {
                    match self.dispatch_once() {
                        Ok(report) if report.delivered + report.failed + report.dead > 0 => {
                            debug!(?report, "outbox pass");
                        }
                        Ok(_) => {}
                        Err(e) => error!(error = %e, "outbox pass failed"),
                    }

                    match shutdown_rx.recv_timeout(interval) {
                        Err(mpsc::RecvTimeoutError::Timeout) => continue,
                        _ => break,
                    }
                }
                info!("outbox dispatcher stopped");
            })?;

        Ok(WorkerHandle::new(shutdown_tx, join))
    }
}
