//! In-memory cursor and video store
//!
//! Behaves like the Postgres tables for the queries the pipeline issues, so
//! the fetch/ingest flow can run without a database. Failures can be
//! injected to exercise the requeue path.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::storage::{CursorStore, StoreError, StoreResult, VideoStore};
use crate::models::{Cursor, VideoRecord};

#[derive(Debug, Default)]
struct State {
    cursors: Vec<Cursor>,
    videos: BTreeMap<String, VideoRecord>,
    next_id: i64,
    failing_inserts: u32,
    insert_calls: u32,
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next `n` calls to `insert_videos` fail.
    pub fn fail_next_video_inserts(&self, n: u32) {
        self.lock().failing_inserts = n;
    }

    pub fn video_count(&self) -> usize {
        self.lock().videos.len()
    }

    pub fn videos(&self) -> Vec<VideoRecord> {
        self.lock().videos.values().cloned().collect()
    }

    pub fn insert_calls(&self) -> u32 {
        self.lock().insert_calls
    }

    /// Every stored cursor in insertion order.
    pub fn cursors(&self) -> Vec<Cursor> {
        self.lock().cursors.clone()
    }

    /// Seed a video directly, bypassing failure injection.
    pub fn seed_video(&self, video: VideoRecord) {
        let mut state = self.lock();
        state.next_id += 1;
        let id = state.next_id;
        state.videos.insert(
            video.youtube_id.clone(),
            VideoRecord {
                id: Some(id),
                ..video
            },
        );
    }
}

#[async_trait]
impl CursorStore for InMemoryStore {
    async fn get_available_cursor(&self) -> StoreResult<Cursor> {
        // Insertion order stands in for (created_at, seq).
        Ok(self
            .lock()
            .cursors
            .iter()
            .rev()
            .find(|c| !c.used)
            .cloned()
            .unwrap_or_else(Cursor::empty))
    }

    async fn mark_used(&self, token: &str) -> StoreResult<()> {
        if let Some(cursor) = self.lock().cursors.iter_mut().find(|c| c.token == token) {
            cursor.used = true;
        }
        Ok(())
    }

    async fn insert_next(&self, token: &str, watermark: DateTime<Utc>) -> StoreResult<()> {
        let mut state = self.lock();
        if state.cursors.iter().any(|c| c.token == token) {
            return Ok(());
        }
        state.cursors.push(Cursor {
            token: token.to_string(),
            watermark,
            used: false,
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn latest_watermark(&self) -> StoreResult<Option<DateTime<Utc>>> {
        Ok(self.lock().videos.values().map(|v| v.published_at).max())
    }
}

#[async_trait]
impl VideoStore for InMemoryStore {
    async fn insert_videos(&self, videos: &[VideoRecord]) -> StoreResult<u64> {
        let mut state = self.lock();
        state.insert_calls += 1;

        if state.failing_inserts > 0 {
            state.failing_inserts -= 1;
            return Err(StoreError::Unavailable("injected insert failure".to_string()));
        }

        let mut inserted = 0;
        for video in videos {
            if state.videos.contains_key(&video.youtube_id) {
                continue;
            }
            state.next_id += 1;
            let id = state.next_id;
            state.videos.insert(
                video.youtube_id.clone(),
                VideoRecord {
                    id: Some(id),
                    ..video.clone()
                },
            );
            inserted += 1;
        }
        Ok(inserted)
    }
}
