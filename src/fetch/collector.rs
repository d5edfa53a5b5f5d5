// src/fetch/collector.rs
// =============================================================================
// The scraping-framework style backend.
//
// Behaves like a collector from a crawling framework rather than a bare
// HTTP client:
// - keeps cookies across requests (one session per fetcher)
// - waits out a per-host politeness delay (with random jitter) before each
//   request, no matter how many tasks share the fetcher
// - only accepts document content types (HTML, XHTML, XML, plain text)
//
// It is interchangeable with HttpFetcher through the Fetcher trait.
// =============================================================================

use super::document::{header_snapshot, ParsedDocument};
use super::http::{categorize_error, ACCEPT_DOCUMENTS};
use super::{FetchError, Fetcher};
use async_trait::async_trait;
use governor::{DefaultKeyedRateLimiter, Jitter, Quota, RateLimiter};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use std::time::Duration;
use url::Url;

/// Knobs for the collector backend.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub user_agent: String,
    /// Minimum gap between two requests to the same host
    pub delay: Duration,
    /// Extra random wait added on top of `delay`
    pub random_delay: Duration,
    pub max_redirects: usize,
    /// Hard cap per request, independent of the caller's deadline
    pub request_timeout: Duration,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (compatible; sitewarden-collector/0.1)".to_string(),
            delay: Duration::from_millis(200),
            random_delay: Duration::from_millis(100),
            max_redirects: 10,
            request_timeout: Duration::from_secs(45),
        }
    }
}

pub struct CollectorFetcher {
    client: Client,
    // None when no delay is configured
    politeness: Option<DefaultKeyedRateLimiter<String>>,
    config: CollectorConfig,
}

impl CollectorFetcher {
    pub fn new(config: CollectorConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| FetchError::Other(format!("failed to build collector client: {}", e)))?;

        let politeness: Option<DefaultKeyedRateLimiter<String>> =
            Quota::with_period(config.delay).map(RateLimiter::keyed);

        Ok(Self {
            client,
            politeness,
            config,
        })
    }

    // Blocks until this host's politeness window is open.
    async fn wait_turn(&self, url: &str) -> Result<(), FetchError> {
        let host = Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .ok_or_else(|| FetchError::InvalidUrl(url.to_string()))?;

        if let Some(limiter) = &self.politeness {
            limiter
                .until_key_ready_with_jitter(&host, Jitter::up_to(self.config.random_delay))
                .await;
        }
        Ok(())
    }
}

// Document types the collector is willing to hand back.
fn is_document_type(content_type: &str) -> bool {
    let content_type = content_type.to_ascii_lowercase();
    content_type.is_empty()
        || content_type.contains("html")
        || content_type.contains("xml")
        || content_type.starts_with("text/plain")
}

#[async_trait]
impl Fetcher for CollectorFetcher {
    async fn fetch_document(
        &self,
        url: &str,
        deadline: Duration,
    ) -> Result<ParsedDocument, FetchError> {
        self.wait_turn(url).await?;

        let response = self
            .client
            .get(url)
            .header(ACCEPT, ACCEPT_DOCUMENTS)
            .timeout(deadline.min(self.config.request_timeout))
            .send()
            .await
            .map_err(categorize_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if !is_document_type(&content_type) {
            return Err(FetchError::NotDocument(content_type));
        }

        let final_url = response.url().to_string();
        let headers = header_snapshot(response.headers());
        let body = response.text().await.map_err(categorize_error)?;

        Ok(ParsedDocument {
            url: url.to_string(),
            final_url,
            status: status.as_u16(),
            headers,
            body,
        })
    }

    async fn probe(&self, url: &str) -> Result<u16, FetchError> {
        self.wait_turn(url).await?;
        let response = self
            .client
            .head(url)
            .send()
            .await
            .map_err(categorize_error)?;
        Ok(response.status().as_u16())
    }

    fn name(&self) -> &'static str {
        "collector"
    }
}
