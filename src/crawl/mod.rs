// src/crawl/mod.rs
// =============================================================================
// This module turns a list of URLs into a stream of extracted pages.
//
// Features:
// - Bounded concurrency plus a shared dispatch pace
// - Per-page timeout, overall deadline, caller cancellation
// - Retries with linear backoff; 4xx responses are dropped, not retried
// - Optional read-through cache
//
// Pieces:
// - page: PageDocument extraction
// - retry: the pure retry policy
// - orchestrator: the scheduling itself
// =============================================================================

mod orchestrator;
mod page;
mod retry;

pub use orchestrator::{
    CrawlEvent, CrawlLimits, CrawlOptions, CrawlRun, CrawlSummary, FailedPage, Orchestrator,
};
pub use page::{extract_from_body, Heading, PageDocument, PageImage, PageLink};
pub use retry::{RetryDecision, RetryPolicy};
