use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use serde_json::Value as JsonValue;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

use marquee_events::{
    Delivery, EventBus, EventEnvelope, Projection, ProjectionFailure, ProjectionOutcome,
    Subscription,
};

use super::WorkerHandle;

const TICK: Duration = Duration::from_millis(250);

/// Delay before a record that failed transiently is offered again.
const RETRY_DELAY: Duration = Duration::from_millis(200);

/// Generic projection worker loop.
///
/// - Joins the consumer group named after the projection
/// - Applies each envelope through the (idempotent) projection
/// - Commits the offset only once the envelope is applied, recognised as a
///   duplicate, ignored, or found to be poison
/// - Rewinds on transient failures so the record is delivered again
/// - Supports graceful shutdown
#[derive(Debug)]
pub struct ProjectionWorker;

impl ProjectionWorker {
    /// Spawn a worker thread consuming `topic`.
    ///
    /// `runtime` drives the async projection from the worker thread.
    pub fn spawn<B, P>(
        bus: B,
        topic: &str,
        projection: Arc<P>,
        runtime: Handle,
    ) -> std::io::Result<WorkerHandle>
    where
        B: EventBus<EventEnvelope<JsonValue>>,
        P: Projection + 'static,
    {
        let name = projection.name();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let sub = bus.subscribe(topic, name);

        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || worker_loop(sub, shutdown_rx, projection.as_ref(), &runtime))?;

        Ok(WorkerHandle::new(shutdown_tx, join))
    }
}

fn worker_loop<P>(
    mut sub: Subscription<EventEnvelope<JsonValue>>,
    shutdown_rx: mpsc::Receiver<()>,
    projection: &P,
    runtime: &Handle,
) where
    P: Projection,
{
    let name = projection.name();
    info!(worker = name, topic = sub.topic(), group = sub.group(), "projection worker started");

    loop {
        // Shutdown check (non-blocking)
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        let delivery = match sub.recv_timeout(TICK) {
            Ok(d) => d,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let result = runtime.block_on(projection.apply(&delivery.message));
        let ack = match result {
            Ok(outcome) => {
                log_outcome(name, &delivery, outcome);
                sub.commit(&delivery)
            }
            Err(e) if e.is_poison() => {
                warn!(
                    worker = name,
                    partition = delivery.partition,
                    offset = delivery.offset,
                    key = %delivery.message.key(),
                    event_id = %delivery.message.event_id(),
                    error = %e,
                    "skipping poison event"
                );
                sub.commit(&delivery)
            }
            Err(e) => {
                warn!(
                    worker = name,
                    partition = delivery.partition,
                    offset = delivery.offset,
                    key = %delivery.message.key(),
                    error = %e,
                    "projection failed; event will be redelivered"
                );
                // Doubles as a shutdown check while backing off.
                if shutdown_rx.recv_timeout(RETRY_DELAY).is_ok() {
                    let _ = sub.rewind(&delivery);
                    break;
                }
                sub.rewind(&delivery)
            }
        };

        if let Err(e) = ack {
            error!(worker = name, error = %e, "failed to acknowledge delivery");
        }
    }

    info!(worker = name, "projection worker stopped");
}

fn log_outcome(name: &str, delivery: &Delivery<EventEnvelope<JsonValue>>, outcome: ProjectionOutcome) {
    debug!(
        worker = name,
        partition = delivery.partition,
        offset = delivery.offset,
        key = %delivery.message.key(),
        event_type = %delivery.message.event_type(),
        ?outcome,
        "event processed"
    );
}
