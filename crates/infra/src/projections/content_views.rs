use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::debug;

use marquee_core::ContentId;
use marquee_events::{CONTENT_CREATED, EventEnvelope, Projection, ProjectionFailure, ProjectionOutcome};

use crate::error::StoreError;
use crate::read_model::{ContentView, ContentViewStore};

/// Consumer group / worker name of this projection.
pub const CONTENT_VIEWS_PROJECTION: &str = "recommendation-service.content-views";

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("failed to deserialize content event: {0}")]
    Deserialize(String),

    #[error("content view store failed: {0}")]
    Store(#[from] StoreError),
}

impl ProjectionFailure for ProjectionError {
    fn is_poison(&self) -> bool {
        matches!(self, ProjectionError::Deserialize(_))
    }
}

/// Payload as this consumer reads it.
///
/// Only `id` and `title` are required; an unknown or missing `type` is kept
/// as-is rather than rejecting the whole event.
#[derive(Debug, Deserialize)]
struct ContentCreatedPayload {
    id: ContentId,
    title: String,
    #[serde(rename = "type", default)]
    content_type: Option<String>,
}

/// Projects `content.created` events into [`ContentView`] rows.
///
/// - One row per content id (upsert), never one row per event
/// - `viewed_at` comes from the envelope, so a redelivery converges to the same row
/// - A row whose `last_event_id` equals the incoming event id is not rewritten
#[derive(Debug)]
pub struct ContentViewProjection<S>
where
    S: ContentViewStore,
{
    store: S,
}

impl<S> ContentViewProjection<S>
where
    S: ContentViewStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn get(&self, content_id: ContentId) -> Result<Option<ContentView>, StoreError> {
        self.store.get(content_id).await
    }

    pub async fn list(&self) -> Result<Vec<ContentView>, StoreError> {
        self.store.list().await
    }

    /// Apply one delivered envelope.
    pub async fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<ProjectionOutcome, ProjectionError> {
        if envelope.event_type() != CONTENT_CREATED {
            return Ok(ProjectionOutcome::Ignored);
        }

        let payload: ContentCreatedPayload = envelope
            .decode()
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        if envelope.key() != payload.id.to_string() {
            return Err(ProjectionError::Deserialize(format!(
                "envelope key {:?} does not match payload id {}",
                envelope.key(),
                payload.id
            )));
        }

        if let Some(existing) = self.store.get(payload.id).await? {
            if existing.last_event_id == envelope.event_id() {
                debug!(
                    content_id = %payload.id,
                    event_id = %envelope.event_id(),
                    "duplicate delivery; view unchanged"
                );
                return Ok(ProjectionOutcome::Duplicate);
            }
        }

        self.store
            .upsert(ContentView {
                content_id: payload.id,
                title: payload.title,
                content_type: payload.content_type,
                viewed_at: envelope.occurred_at(),
                last_event_id: envelope.event_id(),
            })
            .await?;

        Ok(ProjectionOutcome::Applied)
    }

    /// Rebuild the read model from scratch by replaying envelopes in the given order.
    ///
    /// Poison envelopes are skipped, as the live worker would.
    pub async fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<usize, ProjectionError> {
        self.store.clear().await?;

        let mut applied = 0;
        for env in envelopes {
            match self.apply_envelope(&env).await {
                Ok(ProjectionOutcome::Applied) => applied += 1,
                Ok(_) => {}
                Err(e) if e.is_poison() => {}
                Err(e) => return Err(e),
            }
        }
        Ok(applied)
    }
}

#[async_trait::async_trait]
impl<S> Projection for ContentViewProjection<S>
where
    S: ContentViewStore,
{
    type Error = ProjectionError;

    fn name(&self) -> &'static str {
        CONTENT_VIEWS_PROJECTION
    }

    async fn apply(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<ProjectionOutcome, Self::Error> {
        self.apply_envelope(envelope).await
    }
}

/// Build a `content.created` envelope as content-service would (test/bench helper).
pub fn content_created_envelope(
    id: i64,
    title: &str,
    content_type: &str,
    occurred_at: DateTime<Utc>,
) -> EventEnvelope<JsonValue> {
    EventEnvelope::new(
        uuid::Uuid::now_v7(),
        id.to_string(),
        CONTENT_CREATED,
        serde_json::json!({
            "id": id,
            "title": title,
            "type": content_type,
            "timestamp": occurred_at,
        }),
        occurred_at,
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;
    use proptest::prelude::*;

    use super::*;
    use crate::read_model::InMemoryContentViewStore;

    fn projection() -> ContentViewProjection<Arc<InMemoryContentViewStore>> {
        ContentViewProjection::new(Arc::new(InMemoryContentViewStore::new()))
    }

    fn block_on<F: std::future::Future>(f: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(f)
    }

    #[tokio::test]
    async fn content_created_materializes_view() {
        let p = projection();
        let env = content_created_envelope(1, "Inception", "MOVIE", Utc::now());

        let outcome = p.apply_envelope(&env).await.unwrap();
        assert_eq!(outcome, ProjectionOutcome::Applied);

        let view = p.get(ContentId::new(1)).await.unwrap().unwrap();
        assert_eq!(view.title, "Inception");
        assert_eq!(view.content_type.as_deref(), Some("MOVIE"));
        assert_eq!(view.viewed_at, env.occurred_at());
        assert_eq!(view.last_event_id, env.event_id());
    }

    #[tokio::test]
    async fn same_event_twice_leaves_one_identical_row() {
        let p = projection();
        let env = content_created_envelope(1, "Inception", "MOVIE", Utc::now());

        p.apply_envelope(&env).await.unwrap();
        let first = p.get(ContentId::new(1)).await.unwrap();

        assert_eq!(p.apply_envelope(&env).await.unwrap(), ProjectionOutcome::Duplicate);
        assert_eq!(p.store().len(), 1);
        assert_eq!(p.get(ContentId::new(1)).await.unwrap(), first);
    }

    #[tokio::test]
    async fn other_event_types_are_ignored() {
        let p = projection();
        let env = EventEnvelope::new(
            uuid::Uuid::now_v7(),
            "v-1",
            "watch.recorded",
            serde_json::json!({"visitorId": "v-1"}),
            Utc::now(),
        );
        assert_eq!(p.apply_envelope(&env).await.unwrap(), ProjectionOutcome::Ignored);
        assert!(p.store().is_empty());
    }

    #[tokio::test]
    async fn malformed_payload_is_poison() {
        let p = projection();
        let env = EventEnvelope::new(
            uuid::Uuid::now_v7(),
            "1",
            CONTENT_CREATED,
            serde_json::json!({"id": "not-a-number"}),
            Utc::now(),
        );
        let err = p.apply_envelope(&env).await.unwrap_err();
        assert!(err.is_poison());
        assert!(p.store().is_empty());
    }

    #[tokio::test]
    async fn key_payload_mismatch_is_poison() {
        let p = projection();
        let base = content_created_envelope(1, "x", "MOVIE", Utc::now());
        let env = EventEnvelope::new(
            base.event_id(),
            "2",
            base.event_type(),
            base.payload().clone(),
            base.occurred_at(),
        );
        assert!(p.apply_envelope(&env).await.unwrap_err().is_poison());
    }

    #[tokio::test]
    async fn unknown_content_type_is_kept() {
        let p = projection();
        let env = content_created_envelope(3, "Podcast", "PODCAST", Utc::now());
        p.apply_envelope(&env).await.unwrap();
        let view = p.get(ContentId::new(3)).await.unwrap().unwrap();
        assert_eq!(view.content_type.as_deref(), Some("PODCAST"));
    }

    #[tokio::test]
    async fn store_failure_is_transient() {
        let store = Arc::new(InMemoryContentViewStore::new());
        let p = ContentViewProjection::new(store.clone());
        store.fail_next_writes(1);

        let env = content_created_envelope(1, "x", "MOVIE", Utc::now());
        let err = p.apply_envelope(&env).await.unwrap_err();
        assert!(!err.is_poison());

        assert_eq!(p.apply_envelope(&env).await.unwrap(), ProjectionOutcome::Applied);
    }

    #[tokio::test]
    async fn rebuild_replays_into_empty_store() {
        let p = projection();
        p.apply_envelope(&content_created_envelope(9, "stale", "MOVIE", Utc::now()))
            .await
            .unwrap();

        let now = Utc::now();
        let applied = p
            .rebuild_from_scratch(vec![
                content_created_envelope(1, "a", "MOVIE", now),
                content_created_envelope(2, "b", "SERIES", now),
            ])
            .await
            .unwrap();

        assert_eq!(applied, 2);
        assert!(p.get(ContentId::new(9)).await.unwrap().is_none());
        assert_eq!(p.list().await.unwrap().len(), 2);
    }

    proptest! {
        #[test]
        fn redelivery_is_idempotent(copies in 1usize..6, title in "[A-Za-z ]{1,20}") {
            block_on(async {
                let once = projection();
                let many = projection();
                let env = content_created_envelope(1, &title, "MOVIE", Utc::now());

                once.apply_envelope(&env).await.unwrap();
                for _ in 0..copies {
                    many.apply_envelope(&env).await.unwrap();
                }

                prop_assert_eq!(once.list().await.unwrap(), many.list().await.unwrap());
                Ok(())
            })?;
        }

        #[test]
        fn last_event_per_key_wins_regardless_of_interleaving(
            other_keys in proptest::collection::vec(2i64..50, 0..10),
            split in 0usize..10,
        ) {
            block_on(async {
                let p = projection();
                let t0 = Utc::now();
                let e1 = content_created_envelope(1, "first", "MOVIE", t0);
                let e2 = content_created_envelope(1, "second", "MOVIE", t0 + Duration::seconds(1));

                let noise: Vec<_> = other_keys
                    .iter()
                    .map(|k| content_created_envelope(*k, "noise", "SHOW", t0))
                    .collect();
                let split = split.min(noise.len());

                for env in &noise[..split] {
                    p.apply_envelope(env).await.unwrap();
                }
                p.apply_envelope(&e1).await.unwrap();
                for env in &noise[split..] {
                    p.apply_envelope(env).await.unwrap();
                }
                p.apply_envelope(&e2).await.unwrap();

                let view = p.get(ContentId::new(1)).await.unwrap().unwrap();
                prop_assert_eq!(view.title, "second");
                prop_assert_eq!(view.last_event_id, e2.event_id());
                Ok(())
            })?;
        }
    }
}
