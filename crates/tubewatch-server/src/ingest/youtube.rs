//! YouTube Data API v3 `search.list` client

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_YOUTUBE_API_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";

#[derive(Error, Debug)]
pub enum SearchApiError {
    /// The key was rejected (403); rotate to the next one.
    #[error("API key rejected with status {0} (quota exhausted)")]
    QuotaExceeded(StatusCode),

    #[error("Search API returned status {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to decode search response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl SearchApiError {
    pub fn is_quota(&self) -> bool {
        matches!(self, Self::QuotaExceeded(_))
    }
}

/// Parameters of a single search page request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub keyword: String,
    pub published_after: DateTime<Utc>,
    /// Empty for the first page
    pub page_token: String,
    pub max_results: u32,
}

/// One page of search results, as returned by the API.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPage {
    #[serde(default)]
    pub next_page_token: Option<String>,
    #[serde(default)]
    pub items: Vec<SearchItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchItem {
    #[serde(default)]
    pub id: SearchItemId,
    #[serde(default)]
    pub snippet: Option<Snippet>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchItemId {
    #[serde(default)]
    pub video_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snippet {
    /// Kept raw so one bad timestamp only drops its own item
    #[serde(default)]
    pub published_at: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub thumbnails: Option<Thumbnails>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Thumbnails {
    #[serde(default)]
    pub medium: Option<Thumbnail>,
    #[serde(default)]
    pub default: Option<Thumbnail>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Thumbnail {
    pub url: String,
}

impl Thumbnails {
    /// Medium resolution if present, otherwise the default one.
    pub fn preferred_url(&self) -> Option<&str> {
        self.medium
            .as_ref()
            .or(self.default.as_ref())
            .map(|t| t.url.as_str())
    }
}

#[async_trait]
pub trait SearchApi: Send + Sync {
    async fn search(
        &self,
        request: &SearchRequest,
        api_key: &str,
    ) -> Result<SearchPage, SearchApiError>;
}

#[derive(Debug, Clone)]
pub struct YoutubeClient {
    client: reqwest::Client,
    base_url: String,
}

impl YoutubeClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, SearchApiError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("tubewatch/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl SearchApi for YoutubeClient {
    #[tracing::instrument(
        skip(self, api_key),
        fields(keyword = %request.keyword, page_token = %request.page_token)
    )]
    async fn search(
        &self,
        request: &SearchRequest,
        api_key: &str,
    ) -> Result<SearchPage, SearchApiError> {
        let published_after = request
            .published_after
            .to_rfc3339_opts(SecondsFormat::Secs, true);
        let max_results = request.max_results.to_string();

        let mut query: Vec<(&str, &str)> = vec![
            ("part", "id,snippet"),
            ("q", request.keyword.as_str()),
            ("type", "video"),
            ("order", "date"),
            ("publishedAfter", published_after.as_str()),
            ("maxResults", max_results.as_str()),
            ("key", api_key),
        ];
        if !request.page_token.is_empty() {
            query.push(("pageToken", request.page_token.as_str()));
        }

        let response = self
            .client
            .get(format!("{}/search", self.base_url))
            .query(&query)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::FORBIDDEN {
            return Err(SearchApiError::QuotaExceeded(status));
        }

        let body = response.text().await?;
        if !status.is_success() {
            return Err(SearchApiError::Status { status, body });
        }

        let page: SearchPage = serde_json::from_str(&body)?;
        tracing::debug!(
            items = page.items.len(),
            has_next = page.next_page_token.is_some(),
            "Search page received"
        );
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(token: &str) -> SearchRequest {
        SearchRequest {
            keyword: "rust".to_string(),
            published_after: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
            page_token: token.to_string(),
            max_results: 10,
        }
    }

    fn client(server: &MockServer) -> YoutubeClient {
        YoutubeClient::new(server.uri(), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_search_sends_expected_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "rust"))
            .and(query_param("type", "video"))
            .and(query_param("order", "date"))
            .and(query_param("publishedAfter", "2024-05-01T10:00:00Z"))
            .and(query_param("maxResults", "10"))
            .and(query_param("pageToken", "CAoQAA"))
            .and(query_param("key", "k1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "nextPageToken": "CBQQAA",
                "items": [{
                    "id": {"kind": "youtube#video", "videoId": "abc123"},
                    "snippet": {
                        "publishedAt": "2024-05-01T11:00:00Z",
                        "title": "Rust in 100 seconds",
                        "description": "d",
                        "thumbnails": {"medium": {"url": "https://i.ytimg.com/m.jpg"}}
                    }
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let page = client(&server).search(&request("CAoQAA"), "k1").await.unwrap();

        assert_eq!(page.next_page_token.as_deref(), Some("CBQQAA"));
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].id.video_id.as_deref(), Some("abc123"));
        let thumbs = page.items[0].snippet.as_ref().unwrap().thumbnails.as_ref().unwrap();
        assert_eq!(thumbs.preferred_url(), Some("https://i.ytimg.com/m.jpg"));
    }

    #[tokio::test]
    async fn test_first_page_omits_page_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(|req: &wiremock::Request| {
                let has_token = req.url.query_pairs().any(|(k, _)| k == "pageToken");
                if has_token {
                    ResponseTemplate::new(400)
                } else {
                    ResponseTemplate::new(200).set_body_json(json!({"items": []}))
                }
            })
            .mount(&server)
            .await;

        let page = client(&server).search(&request(""), "k1").await.unwrap();
        assert!(page.items.is_empty());
        assert!(page.next_page_token.is_none());
    }

    #[tokio::test]
    async fn test_forbidden_maps_to_quota_exceeded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(403).set_body_string("quotaExceeded"))
            .mount(&server)
            .await;

        let err = client(&server).search(&request(""), "k1").await.unwrap_err();
        assert!(err.is_quota());
    }

    #[tokio::test]
    async fn test_other_errors_are_not_quota() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(500).set_body_string("backend error"))
            .mount(&server)
            .await;

        let err = client(&server).search(&request(""), "k1").await.unwrap_err();
        assert!(!err.is_quota());
        assert!(matches!(err, SearchApiError::Status { status, .. } if status == StatusCode::INTERNAL_SERVER_ERROR));
    }

    #[tokio::test]
    async fn test_malformed_body_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = client(&server).search(&request(""), "k1").await.unwrap_err();
        assert!(matches!(err, SearchApiError::Decode(_)));
    }

    #[test]
    fn test_thumbnail_falls_back_to_default() {
        let thumbs: Thumbnails =
            serde_json::from_value(json!({"default": {"url": "https://i.ytimg.com/d.jpg"}}))
                .unwrap();
        assert_eq!(thumbs.preferred_url(), Some("https://i.ytimg.com/d.jpg"));
    }
}
