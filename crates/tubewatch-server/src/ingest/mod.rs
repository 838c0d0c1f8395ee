//! Video ingestion pipeline
//!
//! ```text
//! FetchScheduler ──tick──▶ Fetcher ──search──▶ YouTube API
//!                            │  ▲
//!                 cursors    │  │ CredentialRotator
//!                            ▼
//!                      MessageQueue ──deliveries──▶ Ingestor ──▶ videos
//! ```
//!
//! Fetching and persistence only meet at the queue. Delivery is
//! at-least-once and inserts ignore known `youtube_id`s, so a batch can be
//! redelivered any number of times without duplicating rows.

pub mod config;
pub mod credentials;
pub mod fetcher;
pub mod ingestor;
pub mod memory;
pub mod orchestrator;
pub mod scheduler;
pub mod storage;
pub mod youtube;

pub use config::{IngestConfig, QueueBackend, QueueConfig};
pub use credentials::{CredentialRotator, ExhaustionPolicy, Rotation};
pub use fetcher::{FetchError, FetchOutcome, Fetcher, FetcherSettings};
pub use ingestor::{DeliveryOutcome, IngestError, IngestStats, Ingestor};
pub use memory::InMemoryStore;
pub use orchestrator::{IngestHandles, IngestOrchestrator, QueuePair};
pub use scheduler::{parse_schedule, FetchScheduler, ScheduleError};
pub use storage::{CursorStore, PgIngestStore, StoreError, VideoStore};
pub use youtube::{SearchApi, SearchApiError, YoutubeClient};
