//! One fetch cycle: cursor → search page → queue
//!
//! The watermark is fixed for a whole paginated sweep. Only when no unused
//! cursor remains does a new sweep start, anchored at the newest stored
//! video (or `now - lookback` on an empty database).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::credentials::{CredentialRotator, ExhaustionPolicy, Rotation};
use super::storage::{CursorStore, StoreError};
use super::youtube::{SearchApi, SearchApiError, SearchItem, SearchPage, SearchRequest};
use crate::models::{encode_batch, Cursor, VideoRecord, ZERO_WATERMARK};
use crate::queue::MessageQueue;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Cursor store error: {0}")]
    Store(#[from] StoreError),

    #[error("Search request failed: {0}")]
    Search(#[source] SearchApiError),

    /// Every key in the pool hit its quota under the fail-fast policy
    #[error("All {pool_size} API keys exhausted their quota")]
    CredentialsExhausted { pool_size: usize },

    #[error("Gave up after {rotations} key rotations in one cycle")]
    RotationLimit { rotations: usize },

    #[error("Failed to encode video batch: {0}")]
    Encode(#[from] serde_json::Error),
}

impl FetchError {
    /// Errors that should stop the process rather than wait for the next tick.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::CredentialsExhausted { .. })
    }
}

#[derive(Debug, Clone)]
pub struct FetcherSettings {
    pub keyword: String,
    pub page_size: u32,
    pub lookback: chrono::Duration,
    pub max_rotations: usize,
}

/// Summary of a completed cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    pub watermark: DateTime<Utc>,
    /// Token the request was made with; empty for a first page
    pub page_token: String,
    pub credential_index: usize,
    /// Items in the API response
    pub fetched: usize,
    /// Records published to the queue
    pub published: usize,
    /// Items dropped during normalization
    pub skipped: usize,
    pub next_page_token: Option<String>,
}

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Clone)]
pub struct Fetcher {
    cursors: Arc<dyn CursorStore>,
    search: Arc<dyn SearchApi>,
    queue: Arc<dyn MessageQueue>,
    credentials: Arc<CredentialRotator>,
    settings: FetcherSettings,
    clock: Clock,
}

impl Fetcher {
    pub fn new(
        cursors: Arc<dyn CursorStore>,
        search: Arc<dyn SearchApi>,
        queue: Arc<dyn MessageQueue>,
        credentials: Arc<CredentialRotator>,
        settings: FetcherSettings,
    ) -> Self {
        Self {
            cursors,
            search,
            queue,
            credentials,
            settings,
            clock: Arc::new(Utc::now),
        }
    }

    /// Replace the wall clock used for the lookback window.
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn credentials(&self) -> &CredentialRotator {
        &self.credentials
    }

    #[tracing::instrument(skip(self), fields(keyword = %self.settings.keyword))]
    pub async fn fetch_once(&self) -> Result<FetchOutcome, FetchError> {
        let cursor = self.cursors.get_available_cursor().await?;
        let watermark = self.resolve_watermark(&cursor).await?;

        let request = SearchRequest {
            keyword: self.settings.keyword.clone(),
            published_after: watermark,
            page_token: cursor.token.clone(),
            max_results: self.settings.page_size,
        };

        let (page, credential_index) = self.search_with_rotation(&request).await?;
        let fetched = page.items.len();
        let next_page_token = page.next_page_token.clone().filter(|t| !t.is_empty());

        let (videos, skipped) = normalize(page);
        let published = videos.len();
        if !videos.is_empty() {
            let payload = encode_batch(&videos)?;
            self.queue.publish(payload).await;
        }

        if !cursor.token.is_empty() {
            if let Err(e) = self.cursors.mark_used(&cursor.token).await {
                tracing::warn!(error = %e, token = %cursor.token, "Failed to mark cursor used");
            }
        }

        if let Some(ref next) = next_page_token {
            if let Err(e) = self.cursors.insert_next(next, watermark).await {
                tracing::warn!(error = %e, token = %next, "Failed to store next cursor");
            }
        }

        let outcome = FetchOutcome {
            watermark,
            page_token: cursor.token,
            credential_index,
            fetched,
            published,
            skipped,
            next_page_token,
        };

        tracing::info!(
            watermark = %outcome.watermark,
            page_token = %outcome.page_token,
            fetched = outcome.fetched,
            published = outcome.published,
            skipped = outcome.skipped,
            has_next = outcome.next_page_token.is_some(),
            "Fetch cycle complete"
        );

        Ok(outcome)
    }

    async fn resolve_watermark(&self, cursor: &Cursor) -> Result<DateTime<Utc>, FetchError> {
        if !cursor.is_start() {
            return Ok(cursor.watermark);
        }

        match self.cursors.latest_watermark().await? {
            Some(latest) if latest > ZERO_WATERMARK => Ok(latest),
            _ => Ok((self.clock)()
                .checked_sub_signed(self.settings.lookback)
                .unwrap_or(ZERO_WATERMARK)),
        }
    }

    async fn search_with_rotation(
        &self,
        request: &SearchRequest,
    ) -> Result<(SearchPage, usize), FetchError> {
        let mut rotations = 0;

        loop {
            let credential = self.credentials.active();

            match self.search.search(request, &credential.key).await {
                Ok(page) => return Ok((page, credential.index)),
                Err(e) if e.is_quota() => {
                    tracing::warn!(key_index = credential.index, error = %e, "Search quota exhausted");

                    match self.credentials.advance(credential.index) {
                        Rotation::Exhausted => {
                            return Err(FetchError::CredentialsExhausted {
                                pool_size: self.credentials.len(),
                            });
                        },
                        Rotation::Retry { index } => {
                            // Fail-fast is bounded by the pool size through `Exhausted`
                            if self.credentials.policy() == ExhaustionPolicy::WrapAround
                                && rotations >= self.settings.max_rotations
                            {
                                return Err(FetchError::RotationLimit { rotations });
                            }
                            rotations += 1;
                            tracing::debug!(key_index = index, rotations, "Retrying with next key");
                        },
                    }
                },
                Err(e) => {
                    tracing::error!(error = %e, "Search request failed, skipping cycle");
                    return Err(FetchError::Search(e));
                },
            }
        }
    }
}

/// Convert a search page into records. Items without a video id or with an
/// unparsable publish time are dropped; the count of dropped items is
/// returned alongside.
pub fn normalize(page: SearchPage) -> (Vec<VideoRecord>, usize) {
    let total = page.items.len();
    let videos: Vec<VideoRecord> = page.items.into_iter().filter_map(normalize_item).collect();
    let skipped = total - videos.len();
    (videos, skipped)
}

fn normalize_item(item: SearchItem) -> Option<VideoRecord> {
    let Some(youtube_id) = item.id.video_id.filter(|id| !id.trim().is_empty()) else {
        tracing::warn!("Skipping search item without a video id");
        return None;
    };

    let Some(snippet) = item.snippet else {
        tracing::warn!(youtube_id = %youtube_id, "Skipping search item without a snippet");
        return None;
    };

    let published_at = match snippet
        .published_at
        .as_deref()
        .map(DateTime::parse_from_rfc3339)
    {
        Some(Ok(ts)) => ts.with_timezone(&Utc),
        Some(Err(e)) => {
            tracing::warn!(youtube_id = %youtube_id, error = %e, "Skipping item with bad publishedAt");
            return None;
        },
        None => {
            tracing::warn!(youtube_id = %youtube_id, "Skipping item without publishedAt");
            return None;
        },
    };

    let thumbnail_url = snippet
        .thumbnails
        .as_ref()
        .and_then(|t| t.preferred_url())
        .map(str::to_string);

    Some(VideoRecord {
        id: None,
        youtube_id,
        title: snippet.title.unwrap_or_default(),
        description: snippet.description.filter(|d| !d.is_empty()),
        published_at,
        thumbnail_url,
    })
}
