// src/config.rs
// =============================================================================
// Layered settings: built-in defaults, then an optional `sitewarden.toml`,
// then `SITEWARDEN__SECTION__KEY` environment variables.
//
// The sections mirror the runtime types they feed (crawl limits, collector
// backend, monitor) and are converted with the helpers at the bottom.
// =============================================================================

use crate::crawl::{CrawlLimits, RetryPolicy};
use crate::fetch::{Backend, CollectorConfig};
use crate::monitor::MonitorConfig;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (compatible; sitewarden/0.1)";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Name used in alert payloads
    pub site_name: String,
    pub crawler: CrawlerSettings,
    pub rate_limit: RateLimitSettings,
    pub collector: CollectorSettings,
    pub monitoring: MonitoringSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerSettings {
    pub user_agent: String,
    pub page_timeout_secs: u64,
    pub overall_timeout_secs: u64,
    pub max_attempts: u32,
    pub backoff_secs: u64,
    pub backend: Backend,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitSettings {
    pub max_concurrent: usize,
    pub dispatch_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollectorSettings {
    pub delay_ms: u64,
    pub random_delay_ms: u64,
    pub max_redirects: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringSettings {
    pub cache_enabled: bool,
    pub cache_dir: PathBuf,
    pub cache_ttl_secs: u64,
    pub multilang_enabled: bool,
    pub change_detection: bool,
    pub baseline_dir: PathBuf,
    #[serde(default)]
    pub webhook_url: Option<String>,
    pub comparison_threshold: f64,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load(Some("sitewarden"))
    }

    // `file` is a path without extension; None skips the file layer.
    pub fn load(file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("site_name", "site")?
            .set_default("crawler.user_agent", DEFAULT_USER_AGENT)?
            .set_default("crawler.page_timeout_secs", 45)?
            .set_default("crawler.overall_timeout_secs", 300)?
            .set_default("crawler.max_attempts", 3)?
            .set_default("crawler.backoff_secs", 1)?
            .set_default("crawler.backend", "http")?
            .set_default("rate_limit.max_concurrent", 5)?
            .set_default("rate_limit.dispatch_interval_ms", 200)?
            .set_default("collector.delay_ms", 200)?
            .set_default("collector.random_delay_ms", 100)?
            .set_default("collector.max_redirects", 10)?
            .set_default("monitoring.cache_enabled", true)?
            .set_default("monitoring.cache_dir", "./cache")?
            .set_default("monitoring.cache_ttl_secs", 86_400)?
            .set_default("monitoring.multilang_enabled", true)?
            .set_default("monitoring.change_detection", true)?
            .set_default("monitoring.baseline_dir", "./baselines")?
            .set_default("monitoring.comparison_threshold", 0.8)?;

        if let Some(file) = file {
            builder = builder.add_source(File::with_name(file).required(false));
        }

        builder
            .add_source(Environment::with_prefix("SITEWARDEN").separator("__"))
            .build()?
            .try_deserialize()
    }

    pub fn crawl_limits(&self) -> CrawlLimits {
        CrawlLimits {
            max_concurrent: self.rate_limit.max_concurrent.max(1),
            dispatch_interval: Duration::from_millis(self.rate_limit.dispatch_interval_ms),
            page_timeout: Duration::from_secs(self.crawler.page_timeout_secs),
            overall_timeout: Duration::from_secs(self.crawler.overall_timeout_secs),
            retry: RetryPolicy {
                max_attempts: self.crawler.max_attempts.max(1),
                backoff_base: Duration::from_secs(self.crawler.backoff_secs),
            },
        }
    }

    pub fn collector_config(&self) -> CollectorConfig {
        CollectorConfig {
            user_agent: self.crawler.user_agent.clone(),
            delay: Duration::from_millis(self.collector.delay_ms),
            random_delay: Duration::from_millis(self.collector.random_delay_ms),
            max_redirects: self.collector.max_redirects,
            request_timeout: Duration::from_secs(self.crawler.page_timeout_secs),
        }
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        let m = &self.monitoring;
        MonitorConfig {
            cache_enabled: m.cache_enabled,
            cache_dir: m.cache_dir.clone(),
            cache_ttl: Duration::from_secs(m.cache_ttl_secs),
            multilang_enabled: m.multilang_enabled,
            change_detection: m.change_detection,
            baseline_dir: m.baseline_dir.clone(),
            webhook_url: m.webhook_url.clone().filter(|u| !u.trim().is_empty()),
            comparison_threshold: m.comparison_threshold,
        }
    }
}
