//! Tubewatch server library
//!
//! A YouTube search poller and its query API:
//!
//! - [`ingest`]: cron-driven fetcher, credential rotation, queue consumer
//!   and idempotent persistence
//! - [`queue`]: AMQP and in-memory message transports
//! - [`api`] / [`features`]: REST listing and full-text search over stored
//!   videos

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod features;
pub mod ingest;
pub mod middleware;
pub mod models;
pub mod queue;

pub use error::{AppError, AppResult};
