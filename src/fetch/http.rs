// src/fetch/http.rs
// =============================================================================
// The direct-HTTP backend.
//
// Key functionality:
// - One reqwest Client shared by every request (connection pooling)
// - GET for documents, HEAD for existence checks
// - Maps reqwest failures onto FetchError (timeout, DNS, TLS, redirects...)
//
// Any non-2xx status is an error here; deciding whether that error is worth
// retrying is the crawl layer's job, not ours.
// =============================================================================

use super::document::{header_snapshot, ParsedDocument};
use super::{FetchError, Fetcher};
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::Client;
use std::time::Duration;

pub(crate) const ACCEPT_DOCUMENTS: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

// HEAD checks are cheap; they get a short fixed budget.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Plain reqwest backend.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::limited(10))
            .pool_max_idle_per_host(50)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| FetchError::Other(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch_document(
        &self,
        url: &str,
        deadline: Duration,
    ) -> Result<ParsedDocument, FetchError> {
        let response = self
            .client
            .get(url)
            .header(ACCEPT, ACCEPT_DOCUMENTS)
            .timeout(deadline)
            .send()
            .await
            .map_err(categorize_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
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
        let response = self
            .client
            .head(url)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .map_err(categorize_error)?;
        Ok(response.status().as_u16())
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

// Categorizes different error types from reqwest
//
// reqwest errors can happen for many reasons:
// - Network timeout
// - DNS resolution failure
// - SSL certificate issues
// - Too many redirects
// - etc.
pub(crate) fn categorize_error(error: reqwest::Error) -> FetchError {
    // Convert error to string once to avoid lifetime issues
    let error_string = error.to_string();

    if error.is_timeout() {
        FetchError::Timeout
    } else if error.is_redirect() {
        FetchError::TooManyRedirects
    } else if error.is_builder() {
        FetchError::InvalidUrl(error_string)
    } else if let Some(status) = error.status() {
        FetchError::Status {
            status: status.as_u16(),
        }
    } else if error.is_connect() {
        // Connection errors often mean DNS issues or host unreachable
        if error_string.contains("dns") {
            FetchError::Dns
        } else {
            FetchError::Connect(error_string)
        }
    } else {
        FetchError::Other(error_string)
    }
}
