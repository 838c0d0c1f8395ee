//! Tubewatch Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared building blocks for the Tubewatch workspace members:
//!
//! - **Error Handling**: the base error type and result alias
//! - **Environment**: typed readers for `KEY=value` configuration
//! - **Logging**: tracing subscriber setup (console, rolling files, JSON)
//!
//! # Example
//!
//! ```no_run
//! use tubewatch_common::env;
//! use tubewatch_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     init_logging(&LogConfig::from_env()?)?;
//!     let page_size: u32 = env::parse_or("YOUTUBE_PAGE_SIZE", 10)?;
//!     tracing::info!(page_size, "configured");
//!     Ok(())
//! }
//! ```

pub mod env;
pub mod error;
pub mod logging;

pub use error::{Error, Result};
