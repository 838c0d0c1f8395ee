//! Stored video listing and full-text search

pub mod queries;
pub mod routes;

pub use routes::videos_routes;
