//! Postgres-backed cursor and video store tests
//!
//! Run with `cargo test --test storage_tests -- --ignored` (Docker required).

mod common;

use chrono::{Duration, TimeZone, Utc};
use common::{init_test_tracing, video, TestPostgres};
use tubewatch_server::ingest::{CursorStore, PgIngestStore, VideoStore};

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_insert_videos_is_idempotent() {
    init_test_tracing();
    let pg = TestPostgres::start().await.expect("Failed to start PostgreSQL");
    let store = PgIngestStore::new(pg.pool_clone());

    let t = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    let batch = vec![video("v1", "First", t), video("v2", "Second", t + Duration::minutes(1))];

    assert_eq!(store.insert_videos(&batch).await.unwrap(), 2);
    assert_eq!(store.insert_videos(&batch).await.unwrap(), 0);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM videos")
        .fetch_one(pg.pool())
        .await
        .unwrap();
    assert_eq!(count, 2);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_insert_videos_spans_chunks() {
    let pg = TestPostgres::start().await.expect("Failed to start PostgreSQL");
    let store = PgIngestStore::new(pg.pool_clone());

    let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let batch: Vec<_> = (0..2_500)
        .map(|i| video(&format!("bulk-{i}"), "Bulk", t + Duration::seconds(i)))
        .collect();

    assert_eq!(store.insert_videos(&batch).await.unwrap(), 2_500);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_cursor_lifecycle() {
    let pg = TestPostgres::start().await.expect("Failed to start PostgreSQL");
    let store = PgIngestStore::new(pg.pool_clone());
    let watermark = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap();

    let empty = store.get_available_cursor().await.unwrap();
    assert!(empty.is_start());

    store.insert_next("page-a", watermark).await.unwrap();
    store.insert_next("page-b", watermark).await.unwrap();
    // Re-inserting a known token is a no-op.
    store.insert_next("page-a", watermark).await.unwrap();

    let newest = store.get_available_cursor().await.unwrap();
    assert_eq!(newest.token, "page-b");
    assert_eq!(newest.watermark, watermark);
    assert!(!newest.used);

    store.mark_used("page-b").await.unwrap();
    assert_eq!(store.get_available_cursor().await.unwrap().token, "page-a");

    store.mark_used("page-a").await.unwrap();
    assert!(store.get_available_cursor().await.unwrap().is_start());

    // Used tokens stay used.
    store.insert_next("page-a", watermark).await.unwrap();
    assert!(store.get_available_cursor().await.unwrap().is_start());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_latest_watermark_tracks_newest_video() {
    let pg = TestPostgres::start().await.expect("Failed to start PostgreSQL");
    let store = PgIngestStore::new(pg.pool_clone());

    assert_eq!(store.latest_watermark().await.unwrap(), None);

    let older = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
    let newer = Utc.with_ymd_and_hms(2024, 6, 1, 11, 0, 0).unwrap();
    store
        .insert_videos(&[video("new", "Newer", newer), video("old", "Older", older)])
        .await
        .unwrap();

    assert_eq!(store.latest_watermark().await.unwrap(), Some(newer));
}
