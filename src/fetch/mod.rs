// src/fetch/mod.rs
// =============================================================================
// This module is the document-fetch primitive everything else builds on.
//
// Discovery and the crawl orchestrator never talk to reqwest directly. They
// hold an `Arc<dyn Fetcher>` picked once at construction time:
// - http: direct GET with one pooled client
// - collector: scraping-framework style client (cookies, per-host politeness,
//   document-only content types)
//
// Both backends share the same error type so the retry policy can reason
// about failures without knowing which backend produced them.
// =============================================================================

mod collector;
mod document;
mod http;

pub use collector::{CollectorConfig, CollectorFetcher};
pub use document::{ParsedDocument, SelectorMode, TargetSelector};
pub use http::HttpFetcher;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Everything that can go wrong while fetching one document.
///
/// reqwest errors are not `Clone`, so they are categorised into one of these
/// variants at the backend boundary (see `http::categorize_error`).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Server answered with a non-2xx status
    #[error("HTTP {status}")]
    Status { status: u16 },
    /// Request did not finish before its deadline
    #[error("Request timed out")]
    Timeout,
    /// Hostname could not be resolved
    #[error("Could not resolve hostname")]
    Dns,
    /// TCP/TLS connection failed
    #[error("Connection failed: {0}")]
    Connect(String),
    /// Redirect loop or redirect cap exceeded
    #[error("Too many redirects")]
    TooManyRedirects,
    /// Response was an image, archive, etc.
    #[error("Response is not a document: content-type {0}")]
    NotDocument(String),
    /// URL could not be parsed
    #[error("Invalid URL '{0}'")]
    InvalidUrl(String),
    #[error("{0}")]
    Other(String),
}

impl FetchError {
    /// 4xx: the server has definitively rejected the request.
    pub fn is_client_error(&self) -> bool {
        matches!(self, FetchError::Status { status } if (400..500).contains(status))
    }

    /// Whether repeating the same request could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        !self.is_client_error() && !matches!(self, FetchError::InvalidUrl(_))
    }
}

/// A swappable document backend.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// GET `url` and return the parsed document, or fail within `deadline`.
    async fn fetch_document(&self, url: &str, deadline: Duration)
        -> Result<ParsedDocument, FetchError>;

    /// HEAD `url` and return the status code (existence check).
    async fn probe(&self, url: &str) -> Result<u16, FetchError>;

    /// Narrow a document down to the part matched by `selector`.
    fn apply_selector(&self, doc: &ParsedDocument, selector: &TargetSelector) -> ParsedDocument {
        doc.select_target(selector)
    }

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}

/// Which backend to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Http,
    Collector,
}

// Builds the configured backend.
//
// The choice is made here and nowhere else; callers only ever see the trait.
pub fn build_fetcher(
    backend: Backend,
    collector: CollectorConfig,
) -> Result<Arc<dyn Fetcher>, FetchError> {
    let fetcher: Arc<dyn Fetcher> = match backend {
        Backend::Http => Arc::new(HttpFetcher::new(&collector.user_agent)?),
        Backend::Collector => Arc::new(CollectorFetcher::new(collector)?),
    };
    tracing::debug!(backend = fetcher.name(), "document fetcher ready");
    Ok(fetcher)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_are_terminal() {
        let not_found = FetchError::Status { status: 404 };
        assert!(not_found.is_client_error());
        assert!(!not_found.is_retryable());
    }

    #[test]
    fn test_server_errors_and_timeouts_retry() {
        assert!(FetchError::Status { status: 503 }.is_retryable());
        assert!(FetchError::Timeout.is_retryable());
        assert!(!FetchError::InvalidUrl("::".into()).is_retryable());
    }

    #[test]
    fn test_status_display_matches_http_prefix() {
        assert_eq!(FetchError::Status { status: 410 }.to_string(), "HTTP 410");
    }
}
