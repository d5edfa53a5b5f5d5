// src/monitor/multilang.rs
// =============================================================================
// Translation-sync monitoring across language variants of the same page.
//
// Every observed page is reduced to a LanguageVersion and stored under its
// language code. Only the latest observation per language is kept. A
// comparison pass groups the stored versions by logical path (the path with
// any language prefix removed) and reports:
//
// - missing_translation: English without Spanish (high), Spanish without
//   English (medium)
// - content_mismatch: Spanish word count below `threshold` x English
//   (medium), or the same non-empty title in both (low)
//
// Issues are recomputed from scratch on every pass.
// =============================================================================

use super::Severity;
use crate::crawl::PageDocument;
use crate::discovery::language_prefix;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use url::Url;

// Codes recognised directly from the first path segment.
const URL_LANGUAGES: [&str; 5] = ["es", "en", "fr", "de", "pt"];

// Prefixes removed when grouping versions by logical path.
const GROUPED_PREFIXES: [&str; 4] = ["es", "en", "fr", "de"];

static HREFLANG: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("link[rel='alternate'][hreflang]").expect("constant selector")
});

/// One language's latest view of a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageVersion {
    pub language: String,
    pub url: String,
    pub title: String,
    pub content: String,
    pub meta_description: String,
    pub word_count: usize,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncIssueKind {
    MissingTranslation,
    ContentMismatch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncIssue {
    #[serde(rename = "type")]
    pub kind: SyncIssueKind,
    pub language: String,
    pub url: String,
    pub description: String,
    pub severity: Severity,
    pub detected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LanguageStats {
    /// Versions currently held (one per language)
    pub total_pages: usize,
    /// Pages observed per language over the session
    pub languages: BTreeMap<String, usize>,
    pub sync_issues: usize,
    pub issues_by_severity: BTreeMap<String, usize>,
}

#[derive(Default)]
struct LanguageState {
    versions: HashMap<String, LanguageVersion>,
    observed: BTreeMap<String, usize>,
    issues: Vec<SyncIssue>,
}

fn primary_subtag(tag: &str) -> Option<String> {
    let primary = tag.trim().split(['-', '_']).next()?.to_ascii_lowercase();
    (!primary.is_empty()).then_some(primary)
}

fn first_segment(path: &str) -> &str {
    path.trim_start_matches('/').split('/').next().unwrap_or("")
}

/// Language of a page, from its URL first and its `<html lang>` second.
///
/// A known code in the first path segment wins. A segment that merely looks
/// like a language code ("/it/...") is inconclusive and defers to the
/// document's declared language, then "unknown". Anything else is English.
pub fn detect_language(url: &str, lang_attr: Option<&str>) -> String {
    let path = match Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => return lang_attr.and_then(primary_subtag).unwrap_or_else(|| "unknown".to_string()),
    };

    let segment = first_segment(&path);
    if URL_LANGUAGES.contains(&segment) {
        return segment.to_string();
    }
    if language_prefix(&path).is_some() {
        return lang_attr
            .and_then(primary_subtag)
            .unwrap_or_else(|| "unknown".to_string());
    }
    "en".to_string()
}

// "/services" -> "/es/services", "/" -> "/es".
fn spanish_counterpart(url: &str) -> Option<String> {
    let mut parsed = Url::parse(url).ok()?;
    let path = match parsed.path() {
        "" | "/" => "/es".to_string(),
        other => format!("/es{}", other),
    };
    parsed.set_path(&path);
    Some(parsed.to_string())
}

fn english_counterpart(url: &str) -> String {
    url.replacen("/es/", "/", 1)
}

// Path with any grouped language prefix removed.
fn logical_path(url: &str) -> String {
    let path = match Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => return url.to_string(),
    };
    for code in GROUPED_PREFIXES {
        let bare = format!("/{}", code);
        if path == bare {
            return "/".to_string();
        }
        if let Some(rest) = path.strip_prefix(&format!("{}/", bare)) {
            return format!("/{}", rest);
        }
    }
    path
}

/// Alternate-language URLs for `page`, keyed by language code.
///
/// hreflang links come first. A missing Spanish or English entry is then
/// synthesized from URL conventions.
pub fn find_alternates(page: &PageDocument) -> BTreeMap<String, String> {
    let mut alternates = BTreeMap::new();

    if !page.html.is_empty() {
        let base = Url::parse(&page.url).ok();
        let dom = Html::parse_document(&page.html);
        for link in dom.select(&HREFLANG) {
            let e = link.value();
            let (Some(hreflang), Some(href)) = (e.attr("hreflang"), e.attr("href")) else {
                continue;
            };
            if hreflang.eq_ignore_ascii_case("x-default") {
                continue;
            }
            let resolved = match &base {
                Some(base) => base.join(href.trim()).map(|u| u.to_string()).ok(),
                None => Some(href.trim().to_string()),
            };
            if let (Some(lang), Some(resolved)) = (primary_subtag(hreflang), resolved) {
                alternates.insert(lang, resolved);
            }
        }
    }

    if !alternates.contains_key("es") && !page.url.contains("/es/") {
        if let Some(spanish) = spanish_counterpart(&page.url) {
            alternates.insert("es".to_string(), spanish);
        }
    }
    if !alternates.contains_key("en") {
        let english = if page.url.contains("/es/") {
            english_counterpart(&page.url)
        } else {
            page.url.clone()
        };
        alternates.insert("en".to_string(), english);
    }
    alternates
}

// Pure comparison over a snapshot of versions.
fn compare(versions: &[LanguageVersion], threshold: f64) -> Vec<SyncIssue> {
    let mut by_path: BTreeMap<String, BTreeMap<&str, &LanguageVersion>> = BTreeMap::new();
    for version in versions {
        by_path
            .entry(logical_path(&version.url))
            .or_default()
            .insert(version.language.as_str(), version);
    }

    let now = Utc::now();
    let mut issues = Vec::new();
    for variants in by_path.values() {
        match (variants.get("en"), variants.get("es")) {
            (Some(en), None) => issues.push(SyncIssue {
                kind: SyncIssueKind::MissingTranslation,
                language: "es".to_string(),
                url: spanish_counterpart(&en.url).unwrap_or_else(|| en.url.clone()),
                description: format!("Spanish translation missing for: {}", en.title),
                severity: Severity::High,
                detected_at: now,
            }),
            (None, Some(es)) => issues.push(SyncIssue {
                kind: SyncIssueKind::MissingTranslation,
                language: "en".to_string(),
                url: english_counterpart(&es.url),
                description: format!("English translation missing for: {}", es.title),
                severity: Severity::Medium,
                detected_at: now,
            }),
            (Some(en), Some(es)) => {
                if en.word_count > 0 && es.word_count > 0 {
                    let ratio = es.word_count as f64 / en.word_count as f64;
                    if ratio < threshold {
                        issues.push(SyncIssue {
                            kind: SyncIssueKind::ContentMismatch,
                            language: "es".to_string(),
                            url: es.url.clone(),
                            description: format!(
                                "Spanish content significantly shorter ({:.1}% of English): {}",
                                ratio * 100.0,
                                es.title
                            ),
                            severity: Severity::Medium,
                            detected_at: now,
                        });
                    }
                }
                if !en.title.is_empty() && en.title == es.title {
                    issues.push(SyncIssue {
                        kind: SyncIssueKind::ContentMismatch,
                        language: "es".to_string(),
                        url: es.url.clone(),
                        description: format!("Title not translated: {}", es.title),
                        severity: Severity::Low,
                        detected_at: now,
                    });
                }
            }
            (None, None) => {}
        }
    }
    issues
}

#[derive(Default)]
pub struct MultiLangMonitor {
    state: RwLock<LanguageState>,
}

impl MultiLangMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn analyze(&self, page: &PageDocument) -> LanguageVersion {
        let content = page.main_text.clone();
        LanguageVersion {
            language: detect_language(&page.url, page.lang.as_deref()),
            url: page.url.clone(),
            title: page.title.clone(),
            meta_description: page.meta_description.clone(),
            word_count: content.split_whitespace().count(),
            content,
            last_seen: Utc::now(),
        }
    }

    // Replaces whatever was held for this language.
    pub fn add(&self, version: LanguageVersion) {
        tracing::debug!(
            language = %version.language,
            url = %version.url,
            words = version.word_count,
            "language version recorded"
        );
        let mut state = self.state.write();
        *state.observed.entry(version.language.clone()).or_insert(0) += 1;
        state.versions.insert(version.language.clone(), version);
    }

    pub fn compare_versions(&self, threshold: f64) -> Vec<SyncIssue> {
        let snapshot: Vec<LanguageVersion> = self.state.read().versions.values().cloned().collect();
        let issues = compare(&snapshot, threshold);
        self.state.write().issues = issues.clone();
        issues
    }

    /// Issues from the last comparison pass.
    pub fn issues(&self) -> Vec<SyncIssue> {
        self.state.read().issues.clone()
    }

    pub fn stats(&self) -> LanguageStats {
        let state = self.state.read();
        let mut issues_by_severity = BTreeMap::new();
        for issue in &state.issues {
            *issues_by_severity.entry(issue.severity.to_string()).or_insert(0) += 1;
        }
        LanguageStats {
            total_pages: state.versions.len(),
            languages: state.observed.clone(),
            sync_issues: state.issues.len(),
            issues_by_severity,
        }
    }
}
