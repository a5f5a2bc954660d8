//! Rate-limited HTTP collector handed to entry points
//!
//! A [`Collector`] bundles a `reqwest` client with a `governor` rate limiter.
//! The task runner builds a fresh one at the start of every run attempt, so
//! cookies and connection state never leak from a failed attempt into its
//! recovery.

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE},
    Client,
};
use scraper::{Html, Selector};
use serde::de::DeserializeOwned;
use std::num::NonZeroU32;
use thiserror::Error;

use crate::config::CollectorConfig;

/// Errors that can occur while collecting a page
#[derive(Error, Debug)]
pub enum FetchError {
    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status code
    #[error("Server responded with status {0}")]
    Status(u16),

    /// Request timeout
    #[error("Request timeout")]
    Timeout,

    /// Body could not be decoded
    #[error("Decoding error: {0}")]
    Decode(String),

    /// CSS selector did not parse
    #[error("Invalid selector: {0}")]
    Selector(String),
}

impl FetchError {
    /// Whether retrying the same request may succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Http(_) | Self::Timeout => true,
            Self::Status(code) => is_retryable_status(*code),
            Self::Decode(_) | Self::Selector(_) => false,
        }
    }
}

/// 429 and the transient 5xx family
fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

/// HTTP collector with rate limiting
pub struct Collector {
    /// HTTP client with configured timeout and compression
    client: Client,

    /// Rate limiter to control request frequency
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,

    /// Settings the collector was built from, kept for [`Collector::fresh`]
    config: CollectorConfig,

    /// Optional base URL prepended to relative requests
    base_url: Option<String>,
}

impl std::fmt::Debug for Collector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collector")
            .field("config", &self.config)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl Collector {
    /// Create a new collector
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Http` if the HTTP client cannot be created
    pub fn new(config: &CollectorConfig) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/json;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.8"));

        let client = Client::builder()
            .user_agent(&config.user_agent)
            .default_headers(headers)
            .timeout(config.request_timeout())
            .gzip(true)
            .cookie_store(true)
            .build()?;

        let rate = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = RateLimiter::direct(Quota::per_second(rate));

        Ok(Self {
            client,
            rate_limiter,
            config: config.clone(),
            base_url: None,
        })
    }

    /// Create a collector that resolves relative URLs against `base_url`
    pub fn with_base_url(config: &CollectorConfig, base_url: &str) -> Result<Self, FetchError> {
        let mut collector = Self::new(config)?;
        collector.base_url = Some(base_url.trim_end_matches('/').to_string());
        Ok(collector)
    }

    /// Build an unused collector with the same settings (empty cookie jar,
    /// fresh rate limiter)
    pub fn fresh(&self) -> Result<Self, FetchError> {
        let mut collector = Self::new(&self.config)?;
        collector.base_url = self.base_url.clone();
        Ok(collector)
    }

    fn resolve(&self, url: &str) -> String {
        match &self.base_url {
            Some(base) if !url.starts_with("http://") && !url.starts_with("https://") => {
                format!("{base}{url}")
            }
            _ => url.to_string(),
        }
    }

    /// Fetch a URL and return the body as text
    pub async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        self.rate_limiter.until_ready().await;

        let full_url = self.resolve(url);
        tracing::debug!(url = %full_url, "Collecting page");

        let response = self.client.get(&full_url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::Http(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        Ok(response.text().await?)
    }

    /// Fetch a URL and deserialize its JSON body
    pub async fn fetch_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        let body = self.fetch_text(url).await?;
        serde_json::from_str(&body).map_err(|e| FetchError::Decode(e.to_string()))
    }

    /// Fetch a page and return the text of every element matching `css`
    pub async fn select_text(&self, url: &str, css: &str) -> Result<Vec<String>, FetchError> {
        let body = self.fetch_text(url).await?;
        extract_text(&body, css)
    }

    /// Fetch a page and return `attr` of every element matching `css`
    pub async fn select_attr(
        &self,
        url: &str,
        css: &str,
        attr: &str,
    ) -> Result<Vec<String>, FetchError> {
        let body = self.fetch_text(url).await?;
        extract_attr(&body, css, attr)
    }
}

/// Text content of every element matching `css`, whitespace-trimmed
pub fn extract_text(html: &str, css: &str) -> Result<Vec<String>, FetchError> {
    let selector = Selector::parse(css).map_err(|e| FetchError::Selector(e.to_string()))?;
    let document = Html::parse_document(html);

    Ok(document
        .select(&selector)
        .map(|el| el.text().collect::<String>().trim().to_string())
        .collect())
}

/// Attribute values of every element matching `css` that carries `attr`
pub fn extract_attr(html: &str, css: &str, attr: &str) -> Result<Vec<String>, FetchError> {
    let selector = Selector::parse(css).map_err(|e| FetchError::Selector(e.to_string()))?;
    let document = Html::parse_document(html);

    Ok(document
        .select(&selector)
        .filter_map(|el| el.value().attr(attr).map(str::to_string))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_config() -> CollectorConfig {
        CollectorConfig {
            requests_per_second: 100,
            ..CollectorConfig::default()
        }
    }

    #[test]
    fn test_extract_text() {
        let html = r#"<ul><li class="doc"> First </li><li class="doc">Second</li><li>x</li></ul>"#;
        let texts = extract_text(html, "li.doc").unwrap();
        assert_eq!(texts, vec!["First", "Second"]);
    }

    #[test]
    fn test_extract_attr_skips_missing() {
        let html = r#"<a href="/a/1">one</a><a>none</a><a href="/a/2">two</a>"#;
        let links = extract_attr(html, "a", "href").unwrap();
        assert_eq!(links, vec!["/a/1", "/a/2"]);
    }

    #[test]
    fn test_invalid_selector() {
        let result = extract_text("<p></p>", "p[[");
        assert!(matches!(result, Err(FetchError::Selector(_))));
    }

    #[test]
    fn test_retryable_status() {
        assert!(FetchError::Status(503).is_recoverable());
        assert!(!FetchError::Status(404).is_recoverable());
        assert!(FetchError::Timeout.is_recoverable());
    }

    #[tokio::test]
    async fn test_fetch_text_and_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page/1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/page/2"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let collector = Collector::with_base_url(&fast_config(), &server.uri()).unwrap();

        assert_eq!(collector.fetch_text("/page/1").await.unwrap(), "hello");
        assert!(matches!(
            collector.fetch_text("/page/2").await,
            Err(FetchError::Status(503))
        ));
    }

    #[tokio::test]
    async fn test_fresh_keeps_base_url() {
        let collector = Collector::with_base_url(&fast_config(), "http://example.test/").unwrap();
        let fresh = collector.fresh().unwrap();
        assert_eq!(fresh.resolve("/x"), "http://example.test/x");
        assert_eq!(fresh.resolve("https://other.test/y"), "https://other.test/y");
    }
}
