//! Postgres-backed content view store.
//!
//! Rows live in `content_views` (see `migrations/0001_content_views.sql`).
//! Writes are single-statement upserts keyed by `content_id`, so a redelivered
//! event rewrites the row with identical values.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use marquee_core::ContentId;

use super::{ContentView, ContentViewStore};
use crate::error::StoreError;

const SCHEMA: &str = include_str!("../../migrations/0001_content_views.sql");

#[derive(Debug, Clone)]
pub struct PostgresContentViewStore {
    pool: Arc<PgPool>,
}

impl PostgresContentViewStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self::new(pool))
    }

    /// Apply the table definition (idempotent).
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA).execute(&*self.pool).await?;
        Ok(())
    }
}

fn row_to_view(row: &sqlx::postgres::PgRow) -> Result<ContentView, StoreError> {
    Ok(ContentView {
        content_id: ContentId::new(row.try_get::<i64, _>("content_id")?),
        title: row.try_get("title")?,
        content_type: row.try_get("content_type")?,
        viewed_at: row.try_get::<DateTime<Utc>, _>("viewed_at")?,
        last_event_id: row.try_get::<Uuid, _>("last_event_id")?,
    })
}

#[async_trait]
impl ContentViewStore for PostgresContentViewStore {
    #[instrument(skip(self, content_id), fields(content_id = %content_id), err)]
    async fn get(&self, content_id: ContentId) -> Result<Option<ContentView>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT content_id, title, content_type, viewed_at, last_event_id
            FROM content_views
            WHERE content_id = $1
            "#,
        )
        .bind(content_id.get())
        .fetch_optional(&*self.pool)
        .await?;

        row.as_ref().map(row_to_view).transpose()
    }

    #[instrument(skip(self, view), fields(content_id = %view.content_id), err)]
    async fn upsert(&self, view: ContentView) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO content_views (content_id, title, content_type, viewed_at, last_event_id)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (content_id)
            DO UPDATE SET
                title = EXCLUDED.title,
                content_type = EXCLUDED.content_type,
                viewed_at = EXCLUDED.viewed_at,
                last_event_id = EXCLUDED.last_event_id
            "#,
        )
        .bind(view.content_id.get())
        .bind(&view.title)
        .bind(&view.content_type)
        .bind(view.viewed_at)
        .bind(view.last_event_id)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn recent(&self, limit: usize) -> Result<Vec<ContentView>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT content_id, title, content_type, viewed_at, last_event_id
            FROM content_views
            ORDER BY viewed_at DESC, content_id ASC
            LIMIT $1
            "#,
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&*self.pool)
        .await?;

        rows.iter().map(row_to_view).collect()
    }

    #[instrument(skip(self), err)]
    async fn list(&self) -> Result<Vec<ContentView>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT content_id, title, content_type, viewed_at, last_event_id
            FROM content_views
            ORDER BY viewed_at DESC, content_id ASC
            "#,
        )
        .fetch_all(&*self.pool)
        .await?;

        rows.iter().map(row_to_view).collect()
    }

    #[instrument(skip(self), err)]
    async fn clear(&self) -> Result<(), StoreError> {
        sqlx::query("TRUNCATE content_views")
            .execute(&*self.pool)
            .await?;
        Ok(())
    }
}
