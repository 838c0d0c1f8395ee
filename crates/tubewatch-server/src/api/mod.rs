pub mod response;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::{db, features, middleware};
use axum::{
    extract::State,
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use sqlx::PgPool;
use tower_http::compression::CompressionLayer;

/// Build the HTTP router with all routes and middleware.
pub fn create_router(pool: PgPool, config: &Config) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .nest("/api/v1", features::router())
        .fallback(not_found)
        .with_state(pool)
        // Layers apply from innermost to outermost
        .layer(CompressionLayer::new())
        .layer(middleware::tracing_layer())
        .layer(middleware::cors_layer(&config.cors))
}

async fn root() -> impl IntoResponse {
    Json(json!({
        "name": "Tubewatch",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}

async fn health_check(State(pool): State<PgPool>) -> AppResult<Response> {
    db::health_check(&pool).await.map_err(|e| {
        tracing::error!(error = %e, "Database health check failed");
        AppError::Unavailable("database is unreachable".to_string())
    })?;

    Ok((StatusCode::OK, Json(json!({ "status": "healthy" }))).into_response())
}

async fn not_found(uri: Uri) -> AppError {
    AppError::NotFound(format!("no route for {}", uri.path()))
}
