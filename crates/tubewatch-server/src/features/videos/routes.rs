use crate::api::response::{ApiResponse, OffsetMeta};
use crate::error::{AppError, AppResult};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use sqlx::PgPool;

use super::queries::{ListVideosError, ListVideosQuery, SearchVideosError, SearchVideosQuery};

pub fn videos_routes() -> Router<PgPool> {
    Router::new()
        .route("/videos", get(list_videos))
        .route("/videos/search", post(search_videos))
}

/// GET /videos?limit=50&offset=0
async fn list_videos(
    State(pool): State<PgPool>,
    Query(query): Query<ListVideosQuery>,
) -> AppResult<Response> {
    let (limit, offset) = (query.limit(), query.offset());
    let videos = super::queries::list::handle(pool, query).await?;

    let meta = OffsetMeta::new(limit, offset, videos.len()).to_value();

    Ok((StatusCode::OK, Json(ApiResponse::success_with_meta(videos, meta))).into_response())
}

/// POST /videos/search with `{"searchString": "..."}`
async fn search_videos(
    State(pool): State<PgPool>,
    Json(query): Json<SearchVideosQuery>,
) -> AppResult<Response> {
    let limit = query.limit();
    let videos = super::queries::search::handle(pool, query).await?;

    let meta = json!({ "limit": limit, "count": videos.len() });

    Ok((StatusCode::OK, Json(ApiResponse::success_with_meta(videos, meta))).into_response())
}

impl From<ListVideosError> for AppError {
    fn from(err: ListVideosError) -> Self {
        match err {
            ListVideosError::Database(e) => AppError::Database(e),
            other => AppError::Validation(other.to_string()),
        }
    }
}

impl From<SearchVideosError> for AppError {
    fn from(err: SearchVideosError) -> Self {
        match err {
            SearchVideosError::Database(e) => AppError::Database(e),
            other => AppError::Validation(other.to_string()),
        }
    }
}
