// src/crawl/orchestrator.rs
// =============================================================================
// The crawl orchestrator: URL list in, stream of page results out.
//
// Per URL:
//   Pending -> Admitted (semaphore) -> RateGated (shared ticker)
//           -> Fetching (per-page timeout) -> Succeeded | Retrying | Failed
//
// - at most `max_concurrent` fetches in flight
// - at most one dispatch per `dispatch_interval`, across all tasks
// - up to `retry.max_attempts` attempts with linear backoff; 4xx is dropped
// - every wait races the caller's CancellationToken and the overall
//   deadline; whichever fires first wins and the task stops
// - a panic inside one task becomes a failure for that URL only
//
// Results go out over a bounded channel as soon as they are ready, so a slow
// consumer applies backpressure. The stream ends with one Complete event
// unless the caller cancelled.
// =============================================================================

use super::page::PageDocument;
use super::retry::{RetryDecision, RetryPolicy};
use crate::cache::CacheStore;
use crate::fetch::{FetchError, Fetcher, ParsedDocument, TargetSelector};
use futures::FutureExt;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

/// Bounds on one crawl.
#[derive(Debug, Clone)]
pub struct CrawlLimits {
    pub max_concurrent: usize,
    /// Minimum gap between two dispatches; zero disables pacing
    pub dispatch_interval: Duration,
    pub page_timeout: Duration,
    pub overall_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for CrawlLimits {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            dispatch_interval: Duration::from_millis(200),
            page_timeout: Duration::from_secs(45),
            overall_timeout: Duration::from_secs(300),
            retry: RetryPolicy::default(),
        }
    }
}

/// Per-run options.
#[derive(Debug, Clone, Default)]
pub struct CrawlOptions {
    /// Only crawl the first N URLs; 0 = all
    pub max_pages: usize,
    /// Narrow each page's text to this selection; metadata and the raw
    /// body always come from the whole document
    pub target: Option<TargetSelector>,
    /// Serve fresh cache entries instead of fetching. Leave off while
    /// watching for changes, or drift inside the TTL goes unseen.
    pub read_cache: bool,
}

/// A URL whose attempts all failed.
#[derive(Debug, Clone, Serialize)]
pub struct FailedPage {
    pub url: String,
    pub error: String,
    pub attempts: u32,
    /// Best-effort stand-in ("Failed to load: ...")
    pub placeholder: PageDocument,
}

/// What the crawl stream yields.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CrawlEvent {
    Page(PageDocument),
    Failed(FailedPage),
    Complete { processed: usize, total: usize },
}

/// Final tally, available whether or not the Complete event was delivered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CrawlSummary {
    pub total: usize,
    /// URLs that reached a terminal outcome (page, failure or 4xx drop)
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// 4xx responses, dropped without a result
    pub dropped: usize,
    pub cancelled: bool,
    pub timed_out: bool,
}

/// A running crawl: consume `events`, then await `finished`.
pub struct CrawlRun {
    pub events: ReceiverStream<CrawlEvent>,
    pub finished: JoinHandle<CrawlSummary>,
}

// How one URL ended.
enum Outcome {
    Page(PageDocument),
    Failed { error: String, attempts: u32 },
    Dropped,
    // Stopped by cancellation or the overall deadline
    Interrupted,
}

#[derive(Default)]
struct Counters {
    processed: AtomicUsize,
    succeeded: AtomicUsize,
    failed: AtomicUsize,
    dropped: AtomicUsize,
}

// State shared by the driver and every task of one run.
struct RunState {
    fetcher: Arc<dyn Fetcher>,
    cache: Option<Arc<CacheStore>>,
    limits: CrawlLimits,
    target: Option<TargetSelector>,
    read_cache: bool,
    gate: Option<Mutex<Interval>>,
    cancel: CancellationToken,
    deadline: Instant,
    tx: mpsc::Sender<CrawlEvent>,
    counters: Counters,
}

impl RunState {
    fn stopped(&self) -> bool {
        self.cancel.is_cancelled() || Instant::now() >= self.deadline
    }

    // Waits for the shared ticker. Returns false if interrupted.
    async fn rate_gate(&self) -> bool {
        let gate = match &self.gate {
            Some(gate) => gate,
            None => return !self.stopped(),
        };
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep_until(self.deadline) => false,
            _ = async { gate.lock().await.tick().await } => true,
        }
    }

    // Sleeps between attempts. Returns false if interrupted.
    async fn backoff(&self, delay: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep_until(self.deadline) => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    // One fetch attempt bounded by the page timeout. None if interrupted.
    async fn attempt(&self, url: &str) -> Option<Result<ParsedDocument, FetchError>> {
        let timeout = self.limits.page_timeout;
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            _ = tokio::time::sleep_until(self.deadline) => None,
            result = tokio::time::timeout(timeout, self.fetcher.fetch_document(url, timeout)) => {
                Some(result.unwrap_or(Err(FetchError::Timeout)))
            }
        }
    }

    // Sends one event. A dropped receiver counts as the caller going away.
    async fn emit(&self, event: CrawlEvent) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep_until(self.deadline) => false,
            sent = self.tx.send(event) => {
                if sent.is_err() {
                    tracing::info!("result receiver dropped, cancelling crawl");
                    self.cancel.cancel();
                }
                sent.is_ok()
            }
        }
    }

    fn to_page(&self, doc: &ParsedDocument) -> PageDocument {
        let mut page = PageDocument::extract(doc);
        if let Some(target) = &self.target {
            let narrowed = PageDocument::extract(&self.fetcher.apply_selector(doc, target));
            page.text = narrowed.text;
            page.main_text = narrowed.main_text;
        }
        page
    }

    // The full life of one URL, minus emission.
    async fn process(&self, url: &str) -> Outcome {
        if let Some(cache) = self.cache.as_ref().filter(|_| self.read_cache) {
            if let Some(entry) = cache.get(url).await {
                let mut doc = ParsedDocument::from_body(url, entry.content);
                doc.headers = entry.headers;
                let mut page = self.to_page(&doc);
                page.from_cache = true;
                tracing::debug!(url, "served from cache");
                return Outcome::Page(page);
            }
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            if !self.rate_gate().await {
                return Outcome::Interrupted;
            }

            let error = match self.attempt(url).await {
                None => return Outcome::Interrupted,
                Some(Ok(doc)) => return Outcome::Page(self.to_page(&doc)),
                Some(Err(e)) => e,
            };

            match self.limits.retry.decide(attempt, &error) {
                RetryDecision::Drop => {
                    tracing::debug!(url, error = %error, "client error, dropping");
                    return Outcome::Dropped;
                }
                RetryDecision::GiveUp => {
                    tracing::warn!(url, attempt, error = %error, "giving up");
                    return Outcome::Failed {
                        error: error.to_string(),
                        attempts: attempt,
                    };
                }
                RetryDecision::Retry { backoff } => {
                    tracing::debug!(url, attempt, error = %error, ?backoff, "retrying");
                    if !self.backoff(backoff).await {
                        return Outcome::Interrupted;
                    }
                }
            }
        }
    }

    // Runs `process` with panic recovery, records the outcome, emits it.
    async fn run_task(self: Arc<Self>, url: String) {
        let outcome = match AssertUnwindSafe(self.process(&url)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!(url = %url, panic = %message, "crawl task panicked");
                Outcome::Failed {
                    error: format!("task panicked: {}", message),
                    attempts: 1,
                }
            }
        };

        let event = match outcome {
            Outcome::Interrupted => return,
            Outcome::Dropped => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                self.counters.processed.fetch_add(1, Ordering::Relaxed);
                return;
            }
            Outcome::Page(page) => {
                self.counters.succeeded.fetch_add(1, Ordering::Relaxed);
                CrawlEvent::Page(page)
            }
            Outcome::Failed { error, attempts } => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                CrawlEvent::Failed(FailedPage {
                    placeholder: PageDocument::placeholder(&url, &error),
                    url: url.clone(),
                    error,
                    attempts,
                })
            }
        };
        self.counters.processed.fetch_add(1, Ordering::Relaxed);
        self.emit(event).await;
    }
}

/// Runs crawls with one fetcher and one set of limits.
pub struct Orchestrator {
    fetcher: Arc<dyn Fetcher>,
    limits: CrawlLimits,
    cache: Option<Arc<CacheStore>>,
}

impl Orchestrator {
    pub fn new(fetcher: Arc<dyn Fetcher>, limits: CrawlLimits) -> Self {
        Self {
            fetcher,
            limits,
            cache: None,
        }
    }

    /// Serve fresh cache entries instead of fetching.
    pub fn with_cache(mut self, cache: Arc<CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    // Starts crawling `urls` in the background.
    //
    // Must be called from inside a tokio runtime. Cancelling `cancel` (or
    // dropping the returned stream) stops dispatch; in that case no
    // Complete event is sent.
    pub fn run(&self, mut urls: Vec<String>, options: CrawlOptions, cancel: CancellationToken) -> CrawlRun {
        if options.max_pages > 0 {
            urls.truncate(options.max_pages);
        }
        let total = urls.len();
        let max_concurrent = self.limits.max_concurrent.max(1);
        let (tx, rx) = mpsc::channel(max_concurrent * 2);

        let gate = (!self.limits.dispatch_interval.is_zero()).then(|| {
            let mut interval = tokio::time::interval(self.limits.dispatch_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            Mutex::new(interval)
        });

        let state = Arc::new(RunState {
            fetcher: self.fetcher.clone(),
            cache: self.cache.clone(),
            limits: self.limits.clone(),
            target: options.target,
            read_cache: options.read_cache,
            gate,
            cancel,
            deadline: Instant::now() + self.limits.overall_timeout,
            tx,
            counters: Counters::default(),
        });

        tracing::info!(total, max_concurrent, backend = self.fetcher.name(), "crawl starting");
        let finished = tokio::spawn(drive(state, urls, max_concurrent));

        CrawlRun {
            events: ReceiverStream::new(rx),
            finished,
        }
    }
}

// Admits URLs one by one, waits for every task, then sends Complete.
async fn drive(state: Arc<RunState>, urls: Vec<String>, max_concurrent: usize) -> CrawlSummary {
    let total = urls.len();
    let semaphore = Arc::new(Semaphore::new(max_concurrent));
    let mut tasks = JoinSet::new();

    for url in urls {
        let permit = tokio::select! {
            biased;
            _ = state.cancel.cancelled() => break,
            _ = tokio::time::sleep_until(state.deadline) => break,
            _ = state.tx.closed() => {
                tracing::info!("result receiver dropped, cancelling crawl");
                state.cancel.cancel();
                break;
            }
            permit = semaphore.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let task_state = state.clone();
        tasks.spawn(async move {
            task_state.run_task(url).await;
            drop(permit);
        });
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            tracing::error!(error = %e, "crawl task aborted");
        }
    }

    let cancelled = state.cancel.is_cancelled();
    let timed_out = !cancelled && Instant::now() >= state.deadline;
    let summary = CrawlSummary {
        total,
        processed: state.counters.processed.load(Ordering::Relaxed),
        succeeded: state.counters.succeeded.load(Ordering::Relaxed),
        failed: state.counters.failed.load(Ordering::Relaxed),
        dropped: state.counters.dropped.load(Ordering::Relaxed),
        cancelled,
        timed_out,
    };

    if cancelled {
        tracing::info!(processed = summary.processed, total, "crawl cancelled");
    } else {
        let complete = CrawlEvent::Complete {
            processed: summary.processed,
            total,
        };
        if state.tx.send(complete).await.is_err() {
            tracing::debug!("completion not delivered, receiver gone");
        }
        tracing::info!(
            processed = summary.processed,
            succeeded = summary.succeeded,
            failed = summary.failed,
            dropped = summary.dropped,
            total,
            "crawl finished"
        );
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::StreamExt;
    use std::collections::HashMap;

    // In-memory fetcher: a fixed response per URL, optional latency, and a
    // record of how often each URL was asked for.
    #[derive(Default)]
    struct ScriptedFetcher {
        responses: HashMap<String, Result<String, FetchError>>,
        latency: Duration,
        calls: parking_lot::Mutex<HashMap<String, u32>>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl ScriptedFetcher {
        fn with(mut self, url: &str, response: Result<&str, FetchError>) -> Self {
            self.responses
                .insert(url.to_string(), response.map(str::to_string));
            self
        }

        fn calls(&self, url: &str) -> u32 {
            self.calls.lock().get(url).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl Fetcher for ScriptedFetcher {
        async fn fetch_document(
            &self,
            url: &str,
            _deadline: Duration,
        ) -> Result<ParsedDocument, FetchError> {
            *self.calls.lock().entry(url.to_string()).or_insert(0) += 1;
            if url.ends_with("/boom") {
                panic!("scripted panic");
            }

            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.latency).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            match self.responses.get(url) {
                Some(Ok(body)) => Ok(ParsedDocument::from_body(url, body.clone())),
                Some(Err(e)) => Err(e.clone()),
                None => Ok(ParsedDocument::from_body(
                    url,
                    format!("<title>{}</title><p>ok</p>", url),
                )),
            }
        }

        async fn probe(&self, _url: &str) -> Result<u16, FetchError> {
            Ok(200)
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    fn urls(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("https://example.com/p{}", i)).collect()
    }

    async fn collect(run: CrawlRun) -> (Vec<CrawlEvent>, CrawlSummary) {
        let events: Vec<CrawlEvent> = run.events.collect().await;
        let summary = run.finished.await.unwrap();
        (events, summary)
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_url_yields_one_page_then_complete() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let orchestrator = Orchestrator::new(fetcher, CrawlLimits::default());
        let run = orchestrator.run(urls(4), CrawlOptions::default(), CancellationToken::new());

        let (events, summary) = collect(run).await;
        assert_eq!(events.len(), 5);
        let pages = events.iter().filter(|e| matches!(e, CrawlEvent::Page(_))).count();
        assert_eq!(pages, 4);
        assert!(matches!(
            events.last(),
            Some(CrawlEvent::Complete { processed: 4, total: 4 })
        ));
        assert_eq!(summary.succeeded, 4);
        assert!(!summary.cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_pages_truncates_the_list() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let orchestrator = Orchestrator::new(fetcher, CrawlLimits::default());
        let options = CrawlOptions {
            max_pages: 2,
            ..CrawlOptions::default()
        };
        let (events, summary) = collect(orchestrator.run(urls(5), options, CancellationToken::new())).await;
        assert!(matches!(
            events.last(),
            Some(CrawlEvent::Complete { processed: 2, total: 2 })
        ));
        assert_eq!(summary.total, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_error_is_tried_three_times_then_reported() {
        let url = "https://example.com/flaky";
        let fetcher = Arc::new(
            ScriptedFetcher::default().with(url, Err(FetchError::Status { status: 500 })),
        );
        let orchestrator = Orchestrator::new(fetcher.clone(), CrawlLimits::default());
        let started = Instant::now();
        let (events, summary) =
            collect(orchestrator.run(vec![url.to_string()], CrawlOptions::default(), CancellationToken::new())).await;

        assert_eq!(fetcher.calls(url), 3);
        // backoff of 1s then 2s between the attempts
        assert!(started.elapsed() >= Duration::from_secs(3));
        match &events[0] {
            CrawlEvent::Failed(failed) => {
                assert_eq!(failed.attempts, 3);
                assert_eq!(failed.error, "HTTP 500");
                assert_eq!(failed.placeholder.title, format!("Failed to load: {}", url));
                assert_eq!(failed.placeholder.text, "Error: HTTP 500");
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.processed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_error_is_dropped_without_retry() {
        let url = "https://example.com/missing";
        let fetcher = Arc::new(
            ScriptedFetcher::default().with(url, Err(FetchError::Status { status: 404 })),
        );
        let orchestrator = Orchestrator::new(fetcher.clone(), CrawlLimits::default());
        let (events, summary) =
            collect(orchestrator.run(vec![url.to_string()], CrawlOptions::default(), CancellationToken::new())).await;

        assert_eq!(fetcher.calls(url), 1);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], CrawlEvent::Complete { processed: 1, total: 1 }));
        assert_eq!(summary.dropped, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_task_fails_alone() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let orchestrator = Orchestrator::new(fetcher, CrawlLimits::default());
        let list = vec![
            "https://example.com/a".to_string(),
            "https://example.com/boom".to_string(),
            "https://example.com/b".to_string(),
        ];
        let (events, summary) = collect(orchestrator.run(list, CrawlOptions::default(), CancellationToken::new())).await;

        let failed: Vec<&FailedPage> = events
            .iter()
            .filter_map(|e| match e {
                CrawlEvent::Failed(f) => Some(f),
                _ => None,
            })
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].url, "https://example.com/boom");
        assert!(failed[0].error.contains("scripted panic"));
        assert_eq!(summary.succeeded, 2);
        assert!(matches!(events.last(), Some(CrawlEvent::Complete { processed: 3, total: 3 })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_is_bounded() {
        let fetcher = Arc::new(ScriptedFetcher {
            latency: Duration::from_secs(1),
            ..ScriptedFetcher::default()
        });
        let limits = CrawlLimits {
            max_concurrent: 2,
            dispatch_interval: Duration::ZERO,
            ..CrawlLimits::default()
        };
        let orchestrator = Orchestrator::new(fetcher.clone(), limits);
        let (_, summary) = collect(orchestrator.run(urls(6), CrawlOptions::default(), CancellationToken::new())).await;

        assert_eq!(summary.succeeded, 6);
        assert_eq!(fetcher.peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatches_are_paced() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let limits = CrawlLimits {
            dispatch_interval: Duration::from_millis(200),
            ..CrawlLimits::default()
        };
        let orchestrator = Orchestrator::new(fetcher, limits);
        let started = Instant::now();
        let _ = collect(orchestrator.run(urls(5), CrawlOptions::default(), CancellationToken::new())).await;
        // first tick is immediate, the other four wait 200ms each
        assert!(started.elapsed() >= Duration::from_millis(800));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_dispatch_and_skips_complete() {
        let fetcher = Arc::new(ScriptedFetcher {
            latency: Duration::from_secs(1),
            ..ScriptedFetcher::default()
        });
        let limits = CrawlLimits {
            max_concurrent: 1,
            dispatch_interval: Duration::ZERO,
            ..CrawlLimits::default()
        };
        let orchestrator = Orchestrator::new(fetcher.clone(), limits);
        let cancel = CancellationToken::new();
        let mut run = orchestrator.run(urls(10), CrawlOptions::default(), cancel.clone());

        let first = run.events.next().await;
        assert!(matches!(first, Some(CrawlEvent::Page(_))));
        cancel.cancel();

        let rest: Vec<CrawlEvent> = run.events.collect().await;
        assert!(!rest.iter().any(|e| matches!(e, CrawlEvent::Complete { .. })));

        let summary = run.finished.await.unwrap();
        assert!(summary.cancelled);
        assert!(summary.processed < 10);
        let fetched: u32 = (0..10).map(|i| fetcher.calls(&format!("https://example.com/p{}", i))).sum();
        assert!(fetched < 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overall_deadline_interrupts_slow_fetches() {
        let fetcher = Arc::new(ScriptedFetcher {
            latency: Duration::from_secs(100),
            ..ScriptedFetcher::default()
        });
        let limits = CrawlLimits {
            page_timeout: Duration::from_secs(1000),
            overall_timeout: Duration::from_secs(10),
            ..CrawlLimits::default()
        };
        let orchestrator = Orchestrator::new(fetcher, limits);
        let (events, summary) = collect(orchestrator.run(urls(3), CrawlOptions::default(), CancellationToken::new())).await;

        assert!(summary.timed_out);
        assert_eq!(summary.processed, 0);
        assert!(matches!(events.last(), Some(CrawlEvent::Complete { processed: 0, total: 3 })));
    }

    #[tokio::test]
    async fn test_fresh_cache_entries_skip_the_network() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(CacheStore::open(dir.path(), Duration::from_secs(60)).unwrap());
        let url = "https://example.com/cached";
        cache
            .put(url, "<title>From cache</title>", &Default::default())
            .await;

        let fetcher = Arc::new(ScriptedFetcher::default());
        let orchestrator = Orchestrator::new(fetcher.clone(), CrawlLimits::default()).with_cache(cache);
        let options = CrawlOptions {
            read_cache: true,
            ..CrawlOptions::default()
        };
        let (events, _) = collect(orchestrator.run(vec![url.to_string()], options, CancellationToken::new())).await;

        assert_eq!(fetcher.calls(url), 0);
        match &events[0] {
            CrawlEvent::Page(page) => {
                assert!(page.from_cache);
                assert_eq!(page.title, "From cache");
            }
            other => panic!("expected page, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cache_is_ignored_unless_read_cache_is_set() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(CacheStore::open(dir.path(), Duration::from_secs(60)).unwrap());
        let url = "https://example.com/drifting";
        cache
            .put(url, "<title>Old</title>", &Default::default())
            .await;

        let fetcher = Arc::new(ScriptedFetcher::default().with(url, Ok("<title>New</title><p>fresh</p>")));
        let orchestrator = Orchestrator::new(fetcher.clone(), CrawlLimits::default()).with_cache(cache);
        let (events, _) = collect(orchestrator.run(vec![url.to_string()], CrawlOptions::default(), CancellationToken::new())).await;

        assert_eq!(fetcher.calls(url), 1);
        match &events[0] {
            CrawlEvent::Page(page) => {
                assert!(!page.from_cache);
                assert_eq!(page.title, "New");
            }
            other => panic!("expected page, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_target_narrows_text_but_keeps_page_metadata() {
        let url = "https://example.com/es/";
        let body = r#"<html lang="es"><head><title>Inicio</title>
            <meta name="description" content="Portada">
            <link rel="alternate" hreflang="en" href="/en/"></head>
            <body><div id="main"><p>Hola mundo</p></div><p>outside the target</p></body></html>"#;
        let fetcher = Arc::new(ScriptedFetcher::default().with(url, Ok(body)));
        let orchestrator = Orchestrator::new(fetcher, CrawlLimits::default());
        let options = CrawlOptions {
            target: TargetSelector::from_kind("id", "main", crate::fetch::SelectorMode::Content),
            ..CrawlOptions::default()
        };
        let (events, _) = collect(orchestrator.run(vec![url.to_string()], options, CancellationToken::new())).await;

        match &events[0] {
            CrawlEvent::Page(page) => {
                assert_eq!(page.title, "Inicio");
                assert_eq!(page.lang.as_deref(), Some("es"));
                assert_eq!(page.meta_description, "Portada");
                assert!(page.html.contains("hreflang"));
                assert!(page.html.contains("outside the target"));
                assert!(page.text.contains("Hola mundo"));
                assert!(!page.text.contains("outside"));
                assert!(!page.main_text.contains("outside"));
            }
            other => panic!("expected page, got {:?}", other),
        }
    }
}
