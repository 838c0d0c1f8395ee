//! Video queries

pub mod list;
pub mod search;

/// Default page size for list and search.
pub const DEFAULT_LIMIT: i64 = 50;

/// Largest page size a caller may request.
pub const MAX_LIMIT: i64 = 100;

pub use list::{ListVideosError, ListVideosQuery};
pub use search::{SearchVideosError, SearchVideosQuery};
