// src/monitor/mod.rs
// =============================================================================
// This module is the per-page monitoring pipeline.
//
// The crawl's consumer hands every extracted page to `Monitor::process_page`,
// which runs, in order:
// 1. language analysis (version + alternates)
// 2. change detection against the stored baseline
// 3. cache write of the raw document
//
// Each stage can be switched off. Stats and the language-sync report are
// pull-based and safe to read while a crawl is still feeding pages in.
// =============================================================================

pub mod alert;
pub mod changes;
pub mod multilang;

pub use alert::{AlertError, AlertPayload, WebhookNotifier};
pub use changes::{
    extract_baseline, ChangeDetector, ChangeStats, ChangeType, ContentChange, PageBaseline,
    SpecificChange,
};
pub use multilang::{
    detect_language, find_alternates, LanguageStats, LanguageVersion, MultiLangMonitor, SyncIssue,
    SyncIssueKind,
};

use crate::cache::{CacheStats, CacheStore};
use crate::crawl::PageDocument;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How serious a change or sync issue is. Ordered low to high.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Low,
    Medium,
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub cache_enabled: bool,
    pub cache_dir: PathBuf,
    pub cache_ttl: Duration,
    pub multilang_enabled: bool,
    pub change_detection: bool,
    pub baseline_dir: PathBuf,
    pub webhook_url: Option<String>,
    pub comparison_threshold: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            cache_dir: PathBuf::from("./cache"),
            cache_ttl: Duration::from_secs(24 * 60 * 60),
            multilang_enabled: true,
            change_detection: true,
            baseline_dir: PathBuf::from("./baselines"),
            webhook_url: None,
            comparison_threshold: 0.8,
        }
    }
}

/// What monitoring made of one page.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingResult {
    pub url: String,
    pub processed_at: DateTime<Utc>,
    pub processing_time_ms: u64,
    pub cache_hit: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language_info: Option<LanguageVersion>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub language_alternates: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_info: Option<ContentChange>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonitoringStats {
    pub pages_processed: u64,
    pub cache_hit_rate: f64,
    pub languages_detected: usize,
    pub changes_detected: usize,
    pub average_processing_ms: f64,
    pub enabled: BTreeMap<&'static str, bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changes: Option<ChangeStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub languages: Option<LanguageStats>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LanguageSyncReport {
    pub enabled: bool,
    pub generated_at: DateTime<Utc>,
    pub total_pages: usize,
    pub languages: BTreeMap<String, usize>,
    pub sync_issues: Vec<SyncIssue>,
    pub issue_count: usize,
    pub recommendations: Vec<String>,
}

fn recommendations(issues: &[SyncIssue]) -> Vec<String> {
    let missing = issues
        .iter()
        .filter(|i| i.kind == SyncIssueKind::MissingTranslation)
        .count();
    let mismatched = issues
        .iter()
        .filter(|i| i.kind == SyncIssueKind::ContentMismatch)
        .count();

    let mut out = Vec::new();
    if missing > 0 {
        out.push(format!(
            "{} pages need translation - prioritize high-traffic pages",
            missing
        ));
    }
    if mismatched > 0 {
        out.push(format!(
            "{} pages have content length mismatches - review translation completeness",
            mismatched
        ));
    }
    if issues.is_empty() {
        out.push("All language versions are synchronized".to_string());
    }
    out
}

pub struct Monitor {
    site_name: String,
    config: MonitorConfig,
    cache: Option<Arc<CacheStore>>,
    changes: Option<ChangeDetector>,
    languages: Option<MultiLangMonitor>,
    pages_processed: AtomicU64,
    processing_micros: AtomicU64,
}

impl Monitor {
    // Builds every enabled stage. A store that cannot be opened disables
    // its stage rather than the whole monitor.
    pub fn new(site_name: &str, config: MonitorConfig) -> Self {
        let cache = if config.cache_enabled {
            match CacheStore::open(&config.cache_dir, config.cache_ttl) {
                Ok(store) => Some(Arc::new(store)),
                Err(e) => {
                    tracing::warn!(dir = %config.cache_dir.display(), error = %e, "cache disabled");
                    None
                }
            }
        } else {
            None
        };

        let changes = if config.change_detection {
            match ChangeDetector::open(&config.baseline_dir, config.webhook_url.as_deref()) {
                Ok(detector) => Some(detector),
                Err(e) => {
                    tracing::warn!(dir = %config.baseline_dir.display(), error = %e, "change detection disabled");
                    None
                }
            }
        } else {
            None
        };

        let languages = config.multilang_enabled.then(MultiLangMonitor::new);

        Self {
            site_name: site_name.to_string(),
            config,
            cache,
            changes,
            languages,
            pages_processed: AtomicU64::new(0),
            processing_micros: AtomicU64::new(0),
        }
    }

    /// The cache store, for handing to the crawl orchestrator.
    pub fn cache(&self) -> Option<Arc<CacheStore>> {
        self.cache.clone()
    }

    pub fn site_name(&self) -> &str {
        &self.site_name
    }

    pub async fn process_page(&self, page: &PageDocument) -> ProcessingResult {
        let started = Instant::now();
        let mut result = ProcessingResult {
            url: page.url.clone(),
            processed_at: Utc::now(),
            processing_time_ms: 0,
            cache_hit: page.from_cache,
            language_info: None,
            language_alternates: BTreeMap::new(),
            change_info: None,
        };

        let language = match &self.languages {
            Some(monitor) => {
                let version = monitor.analyze(page);
                let language = version.language.clone();
                result.language_alternates = find_alternates(page);
                monitor.add(version.clone());
                result.language_info = Some(version);
                language
            }
            None => detect_language(&page.url, page.lang.as_deref()),
        };

        if let Some(detector) = &self.changes {
            let baseline = extract_baseline(page, &language);
            if let Some(change) = detector.detect_change(&baseline).await {
                detector.record(change.clone());
                result.change_info = Some(change);
            }
        }

        // A page served from cache is not written back, so its freshness is
        // still measured from the original fetch.
        if let Some(cache) = &self.cache {
            if !page.from_cache && !page.html.is_empty() {
                cache.put(&page.url, &page.html, &page.headers).await;
            }
        }

        let elapsed = started.elapsed();
        result.processing_time_ms = elapsed.as_millis() as u64;
        self.pages_processed.fetch_add(1, Ordering::Relaxed);
        self.processing_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        result
    }

    pub async fn get_stats(&self) -> MonitoringStats {
        let pages = self.pages_processed.load(Ordering::Relaxed);
        let micros = self.processing_micros.load(Ordering::Relaxed);

        let cache = match &self.cache {
            Some(store) => Some(store.stats().await),
            None => None,
        };
        let changes = self.changes.as_ref().map(ChangeDetector::stats);
        let languages = self.languages.as_ref().map(MultiLangMonitor::stats);

        let mut enabled = BTreeMap::new();
        enabled.insert("cache", self.config.cache_enabled);
        enabled.insert("multilang", self.config.multilang_enabled);
        enabled.insert("changes", self.config.change_detection);

        MonitoringStats {
            pages_processed: pages,
            cache_hit_rate: cache.as_ref().map(|c| c.hit_rate).unwrap_or(0.0),
            languages_detected: languages.as_ref().map(|l| l.languages.len()).unwrap_or(0),
            changes_detected: changes.as_ref().map(|c| c.total_changes).unwrap_or(0),
            average_processing_ms: if pages == 0 {
                0.0
            } else {
                micros as f64 / pages as f64 / 1000.0
            },
            enabled,
            cache,
            changes,
            languages,
        }
    }

    pub fn analyze_language_sync(&self) -> LanguageSyncReport {
        let Some(monitor) = &self.languages else {
            return LanguageSyncReport {
                enabled: false,
                generated_at: Utc::now(),
                total_pages: 0,
                languages: BTreeMap::new(),
                sync_issues: Vec::new(),
                issue_count: 0,
                recommendations: Vec::new(),
            };
        };

        let issues = monitor.compare_versions(self.config.comparison_threshold);
        let stats = monitor.stats();
        LanguageSyncReport {
            enabled: true,
            generated_at: Utc::now(),
            total_pages: stats.total_pages,
            languages: stats.languages,
            issue_count: issues.len(),
            recommendations: recommendations(&issues),
            sync_issues: issues,
        }
    }

    // Flushes pending change alerts. Returns how many were delivered.
    pub async fn send_alerts(&self) -> Result<usize, AlertError> {
        match &self.changes {
            Some(detector) => detector.send_alert(&self.site_name).await,
            None => Ok(0),
        }
    }

    /// Sweeps expired cache entries, then flushes alerts.
    pub async fn cleanup(&self) -> Result<usize, AlertError> {
        if let Some(cache) = &self.cache {
            cache.sweep().await;
        }
        self.send_alerts().await
    }
}
