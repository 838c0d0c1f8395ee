//! Full-text search over title and description
//!
//! Matches against the generated `document_with_weights` column (title
//! weighted above description) and ranks by `ts_rank`, breaking ties by
//! recency.

use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use super::{DEFAULT_LIMIT, MAX_LIMIT};
use crate::models::VideoRecord;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchVideosQuery {
    #[serde(default)]
    pub search_string: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
}

#[derive(Debug, thiserror::Error)]
pub enum SearchVideosError {
    #[error("searchString is required and cannot be empty")]
    SearchStringRequired,
    #[error("Limit must be between 1 and {MAX_LIMIT}")]
    InvalidLimit,
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl SearchVideosQuery {
    pub fn new(search_string: impl Into<String>) -> Self {
        Self {
            search_string: search_string.into(),
            limit: None,
        }
    }

    pub fn validate(&self) -> Result<(), SearchVideosError> {
        if self.search_string.trim().is_empty() {
            return Err(SearchVideosError::SearchStringRequired);
        }
        if !(1..=MAX_LIMIT).contains(&self.limit()) {
            return Err(SearchVideosError::InvalidLimit);
        }
        Ok(())
    }

    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT)
    }
}

#[tracing::instrument(skip(pool), fields(q = %query.search_string))]
pub async fn handle(
    pool: PgPool,
    query: SearchVideosQuery,
) -> Result<Vec<VideoRecord>, SearchVideosError> {
    query.validate()?;

    let videos = sqlx::query_as::<_, VideoRecord>(
        r#"
        SELECT id, youtube_id, title, description, published_at, thumbnail_url
        FROM videos
        WHERE document_with_weights @@ plainto_tsquery('english', $1)
        ORDER BY ts_rank(document_with_weights, plainto_tsquery('english', $1)) DESC,
                 published_at DESC
        LIMIT $2
        "#,
    )
    .bind(query.search_string.trim())
    .bind(query.limit())
    .fetch_all(&pool)
    .await?;

    tracing::debug!(count = videos.len(), "Video search completed");

    Ok(videos)
}
