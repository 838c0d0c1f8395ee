//! Domain models shared by the ingestion pipeline and the query API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single video as carried on the queue and stored in `videos`.
///
/// `id` is assigned by Postgres and is absent until the record has been
/// persisted; it is omitted from the wire format in that case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct VideoRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub youtube_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub published_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
}

impl VideoRecord {
    pub fn new(
        youtube_id: impl Into<String>,
        title: impl Into<String>,
        published_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            youtube_id: youtube_id.into(),
            title: title.into(),
            description: None,
            published_at,
            thumbnail_url: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_thumbnail_url(mut self, url: impl Into<String>) -> Self {
        self.thumbnail_url = Some(url.into());
        self
    }
}

/// Serialize a batch into the queue payload format (a JSON array).
pub fn encode_batch(videos: &[VideoRecord]) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(videos)
}

/// Parse a queue payload back into records.
pub fn decode_batch(payload: &[u8]) -> serde_json::Result<Vec<VideoRecord>> {
    serde_json::from_slice(payload)
}

/// Zero watermark: no lower bound has been established yet.
pub const ZERO_WATERMARK: DateTime<Utc> = DateTime::<Utc>::UNIX_EPOCH;

/// Pagination cursor over the external search results.
///
/// An empty token means "first page". The watermark is the `publishedAfter`
/// bound shared by every page of one sweep.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Cursor {
    #[sqlx(rename = "next_page_token")]
    pub token: String,
    #[sqlx(rename = "published_after_time")]
    pub watermark: DateTime<Utc>,
    #[sqlx(rename = "is_used")]
    pub used: bool,
    pub created_at: DateTime<Utc>,
}

impl Cursor {
    /// Cursor returned when no unused one is stored.
    pub fn empty() -> Self {
        Self {
            token: String::new(),
            watermark: ZERO_WATERMARK,
            used: false,
            created_at: ZERO_WATERMARK,
        }
    }

    /// True when neither a token nor a watermark is known.
    pub fn is_start(&self) -> bool {
        self.token.is_empty() && self.watermark == ZERO_WATERMARK
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_wire_format_is_camel_case_and_omits_missing_fields() {
        let published = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let video = VideoRecord::new("dQw4w9WgXcQ", "Never gonna", published);

        let value = serde_json::to_value(&video).unwrap();
        assert_eq!(value["youtubeId"], "dQw4w9WgXcQ");
        assert_eq!(value["publishedAt"], "2024-03-01T12:00:00Z");
        assert!(value.get("id").is_none());
        assert!(value.get("description").is_none());
        assert!(value.get("thumbnailUrl").is_none());
    }

    #[test]
    fn test_decode_batch_accepts_optional_fields() {
        let payload = br#"[
            {"youtubeId":"a","title":"A","publishedAt":"2024-03-01T12:00:00Z"},
            {"id":7,"youtubeId":"b","title":"B","description":"d",
             "publishedAt":"2024-03-01T13:00:00Z","thumbnailUrl":"https://i.ytimg.com/b.jpg"}
        ]"#;

        let videos = decode_batch(payload).unwrap();
        assert_eq!(videos.len(), 2);
        assert_eq!(videos[0].id, None);
        assert_eq!(videos[1].id, Some(7));
        assert_eq!(videos[1].thumbnail_url.as_deref(), Some("https://i.ytimg.com/b.jpg"));
    }

    #[test]
    fn test_decode_batch_rejects_non_array() {
        assert!(decode_batch(b"{\"youtubeId\":\"a\"}").is_err());
        assert!(decode_batch(b"not json").is_err());
    }

    #[test]
    fn test_empty_cursor_is_start() {
        let cursor = Cursor::empty();
        assert!(cursor.is_start());
        assert_eq!(cursor.watermark.timestamp(), 0);

        let resumed = Cursor {
            token: "CAoQAA".to_string(),
            ..Cursor::empty()
        };
        assert!(!resumed.is_start());
    }
}
