//! List stored videos, newest first

use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use super::{DEFAULT_LIMIT, MAX_LIMIT};
use crate::models::VideoRecord;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListVideosQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
}

#[derive(Debug, thiserror::Error)]
pub enum ListVideosError {
    #[error("Limit must be between 1 and {MAX_LIMIT}")]
    InvalidLimit,
    #[error("Offset must be zero or greater")]
    InvalidOffset,
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ListVideosQuery {
    pub fn validate(&self) -> Result<(), ListVideosError> {
        if !(1..=MAX_LIMIT).contains(&self.limit()) {
            return Err(ListVideosError::InvalidLimit);
        }
        if self.offset() < 0 {
            return Err(ListVideosError::InvalidOffset);
        }
        Ok(())
    }

    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0)
    }
}

#[tracing::instrument(skip(pool))]
pub async fn handle(
    pool: PgPool,
    query: ListVideosQuery,
) -> Result<Vec<VideoRecord>, ListVideosError> {
    query.validate()?;

    let videos = sqlx::query_as::<_, VideoRecord>(
        r#"
        SELECT id, youtube_id, title, description, published_at, thumbnail_url
        FROM videos
        ORDER BY published_at DESC, id DESC
        LIMIT $1 OFFSET $2
        "#,
    )
    .bind(query.limit())
    .bind(query.offset())
    .fetch_all(&pool)
    .await?;

    Ok(videos)
}
