//! Source API seam: pagination cursor, page envelope, and the HTTP-backed
//! client.
//!
//! The trait carries single-attempt semantics; retry loops belong to the
//! components so tests can drive them with deterministic fakes.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::domain::record::{PartImage, PartRecord};
use crate::infrastructure::config::SourceConfig;
use crate::infrastructure::http::HttpClient;
use crate::sync::error::{FetchError, ImageFetchError};

/// Pointer to the next page to retrieve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageCursor {
    /// Numeric page index, used for the first page and for heuristic
    /// advancement after a failed page.
    Page(u32),
    /// Server-supplied continuation URL.
    Url(String),
}

/// Pagination metadata attached to every page response.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PageLinks {
    pub current_page: u32,
    pub last_page: u32,
    pub total: u64,
    #[serde(default)]
    pub next_page_url: Option<String>,
}

/// One page of raw records plus its pagination metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct PageEnvelope {
    pub data: Vec<PartRecord>,
    pub links: PageLinks,
}

impl PageEnvelope {
    /// Cursor for the following page, with the continuation URL normalized:
    /// scheme forced to https and `per_page` appended when the server drops
    /// it. Returns `None` at the end of the data set.
    pub fn next_cursor(&self, per_page: u32) -> Option<PageCursor> {
        let next = self.links.next_page_url.as_deref()?;
        Some(PageCursor::Url(normalize_continuation_url(next, per_page)))
    }
}

fn normalize_continuation_url(raw: &str, per_page: u32) -> String {
    match Url::parse(raw) {
        Ok(mut url) => {
            if url.scheme() == "http" {
                // The gateway redirects plain http; skip the round-trip.
                let _ = url.set_scheme("https");
            }
            let has_per_page = url.query_pairs().any(|(k, _)| k == "per_page");
            if !has_per_page {
                url.query_pairs_mut()
                    .append_pair("per_page", &per_page.to_string());
            }
            url.to_string()
        }
        Err(_) => raw.to_string(),
    }
}

/// Single-attempt source operations. Implemented by the HTTP client and by
/// in-memory fakes in tests.
#[async_trait]
pub trait SourceApi: Send + Sync {
    /// Fetch one page of records.
    async fn fetch_page(&self, cursor: &PageCursor) -> Result<PageEnvelope, FetchError>;

    /// Fetch the auxiliary images of one record.
    async fn fetch_images(&self, part_id: &str) -> Result<Vec<PartImage>, ImageFetchError>;
}

/// HTTP-backed source client.
pub struct SourceClient {
    config: SourceConfig,
    page_http: HttpClient,
    image_http: HttpClient,
}

impl SourceClient {
    /// `image_timeout` differs from the page timeout, hence two clients.
    pub fn new(
        config: SourceConfig,
        image_timeout: std::time::Duration,
    ) -> Result<Self, FetchError> {
        let page_http = HttpClient::new(config.request_timeout()).map_err(FetchError::from)?;
        let image_http = HttpClient::new(image_timeout).map_err(FetchError::from)?;
        Ok(Self { config, page_http, image_http })
    }

    fn page_url(&self, cursor: &PageCursor) -> String {
        match cursor {
            PageCursor::Page(n) => format!(
                "{}/parts?page={}&per_page={}",
                self.config.base_url, n, self.config.per_page
            ),
            PageCursor::Url(url) => url.clone(),
        }
    }

    fn headers(&self) -> [(&str, &str); 2] {
        [
            ("x-api-token", self.config.api_token.as_str()),
            ("Accept", "application/json"),
        ]
    }
}

#[async_trait]
impl SourceApi for SourceClient {
    async fn fetch_page(&self, cursor: &PageCursor) -> Result<PageEnvelope, FetchError> {
        let url = self.page_url(cursor);
        debug!(%url, "Fetching source page");
        let body = self.page_http.get_json(&url, &self.headers()).await?;
        let envelope: PageEnvelope = serde_json::from_value(body)
            .map_err(|e| FetchError::InvalidResponse(e.to_string()))?;
        Ok(envelope)
    }

    async fn fetch_images(&self, part_id: &str) -> Result<Vec<PartImage>, ImageFetchError> {
        let url = Url::parse_with_params(
            &format!("{}/images", self.config.base_url),
            &[("part_id", part_id)],
        )
        .map_err(|e| ImageFetchError::InvalidResponse(e.to_string()))?;
        let body = self
            .image_http
            .get_json(url.as_str(), &self.headers())
            .await?;
        // Shape: {"data": [...]}; anything else is treated as no images.
        let images = body
            .get("data")
            .and_then(|data| data.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| serde_json::from_value(item.clone()).ok())
                    .collect()
            })
            .unwrap_or_default();
        Ok(images)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_parses_wire_shape() {
        let body = json!({
            "data": [
                {"partId": "P-1", "description": "alternator"},
                {"partId": "P-2", "description": "radiator"}
            ],
            "links": {
                "current_page": 1,
                "last_page": 3,
                "total": 300,
                "next_page_url": "https://source.example.com/api/parts?page=2"
            }
        });
        let envelope: PageEnvelope = serde_json::from_value(body).unwrap();
        assert_eq!(envelope.data.len(), 2);
        assert_eq!(envelope.links.last_page, 3);
        assert_eq!(envelope.links.total, 300);
    }

    #[test]
    fn missing_next_url_ends_pagination() {
        let body = json!({
            "data": [],
            "links": {"current_page": 3, "last_page": 3, "total": 300, "next_page_url": null}
        });
        let envelope: PageEnvelope = serde_json::from_value(body).unwrap();
        assert!(envelope.next_cursor(100).is_none());
    }

    #[test]
    fn continuation_url_is_normalized() {
        let normalized = normalize_continuation_url("http://source.example.com/api/parts?page=2", 100);
        assert_eq!(
            normalized,
            "https://source.example.com/api/parts?page=2&per_page=100"
        );

        // Already https with per_page: untouched.
        let untouched = normalize_continuation_url(
            "https://source.example.com/api/parts?page=2&per_page=100",
            100,
        );
        assert_eq!(
            untouched,
            "https://source.example.com/api/parts?page=2&per_page=100"
        );
    }

    #[test]
    fn unparsable_continuation_url_passes_through() {
        assert_eq!(normalize_continuation_url("not a url", 100), "not a url");
    }
}
