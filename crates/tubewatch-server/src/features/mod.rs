//! Feature slices of the query API
//!
//! Each feature is a vertical slice with its own `queries/` and `routes.rs`.
//! Everything here is read-only; writes happen in the ingestion pipeline.

pub mod videos;

use axum::Router;
use sqlx::PgPool;

/// Router with every feature mounted, to be nested under `/api/v1`.
pub fn router() -> Router<PgPool> {
    Router::new().merge(videos::videos_routes())
}
