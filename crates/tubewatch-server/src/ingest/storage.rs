//! Persistence for the ingestion pipeline
//!
//! Two narrow traits keep the fetcher and ingestor independent of Postgres:
//! [`CursorStore`] for the append-only `page_tokens` log and [`VideoStore`]
//! for idempotent video inserts. [`PgIngestStore`] implements both.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use thiserror::Error;

use crate::models::{Cursor, VideoRecord};

/// Rows per INSERT statement; keeps bind parameters well under the
/// Postgres limit of 65535 (5 per row).
const INSERT_CHUNK_SIZE: usize = 1000;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Injected by the in-memory store
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait CursorStore: Send + Sync {
    /// Newest unused cursor, or [`Cursor::empty`] when there is none.
    async fn get_available_cursor(&self) -> StoreResult<Cursor>;

    /// Flag a cursor as consumed. Unknown or already-used tokens are a no-op.
    async fn mark_used(&self, token: &str) -> StoreResult<()>;

    /// Append a cursor. A token that already exists is left untouched.
    async fn insert_next(&self, token: &str, watermark: DateTime<Utc>) -> StoreResult<()>;

    /// Newest `published_at` among stored videos.
    async fn latest_watermark(&self) -> StoreResult<Option<DateTime<Utc>>>;
}

#[async_trait]
pub trait VideoStore: Send + Sync {
    /// Insert videos, ignoring ones whose `youtube_id` already exists.
    /// Returns the number of rows actually inserted.
    async fn insert_videos(&self, videos: &[VideoRecord]) -> StoreResult<u64>;
}

#[derive(Debug, Clone)]
pub struct PgIngestStore {
    pool: PgPool,
}

impl PgIngestStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl CursorStore for PgIngestStore {
    async fn get_available_cursor(&self) -> StoreResult<Cursor> {
        let cursor = sqlx::query_as::<_, Cursor>(
            r#"
            SELECT next_page_token, published_after_time, is_used, created_at
            FROM page_tokens
            WHERE is_used = FALSE
            ORDER BY created_at DESC, seq DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(cursor.unwrap_or_else(Cursor::empty))
    }

    async fn mark_used(&self, token: &str) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE page_tokens
            SET is_used = TRUE
            WHERE next_page_token = $1 AND is_used = FALSE
            "#,
        )
        .bind(token)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn insert_next(&self, token: &str, watermark: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO page_tokens (next_page_token, published_after_time)
            VALUES ($1, $2)
            ON CONFLICT (next_page_token) DO NOTHING
            "#,
        )
        .bind(token)
        .bind(watermark)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn latest_watermark(&self) -> StoreResult<Option<DateTime<Utc>>> {
        let latest: Option<DateTime<Utc>> =
            sqlx::query_scalar("SELECT MAX(published_at) FROM videos")
                .fetch_one(&self.pool)
                .await?;

        Ok(latest)
    }
}

#[async_trait]
impl VideoStore for PgIngestStore {
    #[tracing::instrument(skip(self, videos), fields(batch = videos.len()))]
    async fn insert_videos(&self, videos: &[VideoRecord]) -> StoreResult<u64> {
        let mut inserted = 0;

        for chunk in videos.chunks(INSERT_CHUNK_SIZE) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO videos (youtube_id, title, description, published_at, thumbnail_url) ",
            );

            builder.push_values(chunk, |mut b, video| {
                b.push_bind(&video.youtube_id)
                    .push_bind(&video.title)
                    .push_bind(&video.description)
                    .push_bind(video.published_at)
                    .push_bind(&video.thumbnail_url);
            });

            builder.push(" ON CONFLICT (youtube_id) DO NOTHING");

            let result = builder.build().execute(&self.pool).await?;
            inserted += result.rows_affected();
        }

        tracing::debug!(inserted, skipped = videos.len() as u64 - inserted, "Videos stored");
        Ok(inserted)
    }
}
