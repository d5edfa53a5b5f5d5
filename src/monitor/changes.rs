// src/monitor/changes.rs
// =============================================================================
// Content change detection.
//
// Each page observation becomes a PageBaseline (title, meta description,
// main text, headings, a structure hash and a content hash over all of
// them). The baseline is compared with the last one stored for the URL:
//
// - no stored baseline: a `new` change (medium), and the baseline is saved
// - same content hash: nothing happened
// - otherwise diff title, meta description, content (word-set Jaccard) and
//   structure (heading Jaccard), and grade the result
//
// Severity is max-wins: each rule can raise it, none can lower it.
// Whitespace and markup churn that leaves content >= 0.9 similar and
// nothing else changed is not a change.
//
// Detected changes pile up in memory until `send_alert` delivers them.
// =============================================================================

use super::alert::{AlertError, AlertPayload, WebhookNotifier};
use super::Severity;
use crate::crawl::PageDocument;
use crate::store::{sha256_hex, JsonStore, StoreError};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

// Content below this similarity counts as changed.
const CONTENT_THRESHOLD: f64 = 0.9;

// Old/new content values in a SpecificChange are cut to this many chars.
const SNIPPET_CHARS: usize = 200;

/// The durable fingerprint of one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageBaseline {
    pub url: String,
    pub title: String,
    pub meta_description: String,
    pub content: String,
    pub content_hash: String,
    pub headings: Vec<String>,
    pub images: Vec<String>,
    pub links: Vec<String>,
    pub structure_hash: String,
    pub word_count: usize,
    pub language: String,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    New,
    Modified,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::New => "new",
            ChangeType::Modified => "modified",
        }
    }
}

/// One field that differs between baseline and observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecificChange {
    pub field: String,
    pub old_value: String,
    pub new_value: String,
    pub similarity: f64,
}

/// One detected drift event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentChange {
    pub url: String,
    pub change_type: ChangeType,
    pub language: String,
    pub old_hash: String,
    pub new_hash: String,
    pub changes: Vec<SpecificChange>,
    pub severity: Severity,
    pub word_count_delta: i64,
    pub similarity_score: f64,
    pub detected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeStats {
    pub total_changes: usize,
    pub by_type: BTreeMap<String, usize>,
    pub by_severity: BTreeMap<String, usize>,
    pub webhook_configured: bool,
}

// Jaccard index of two token sets: |A ∩ B| / |A ∪ B|.
// Both empty -> 1.0, exactly one empty -> 0.0.
pub fn jaccard<'a>(a: impl IntoIterator<Item = &'a str>, b: impl IntoIterator<Item = &'a str>) -> f64 {
    let a: HashSet<&str> = a.into_iter().collect();
    let b: HashSet<&str> = b.into_iter().collect();
    match (a.is_empty(), b.is_empty()) {
        (true, true) => return 1.0,
        (true, false) | (false, true) => return 0.0,
        _ => {}
    }
    let intersection = a.intersection(&b).count();
    let union = a.len() + b.len() - intersection;
    intersection as f64 / union as f64
}

/// Word-set similarity of two texts, case-insensitive.
pub fn text_similarity(a: &str, b: &str) -> f64 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    jaccard(a.split_whitespace(), b.split_whitespace())
}

/// Similarity of two heading lists, case-insensitive.
pub fn heading_similarity(a: &[String], b: &[String]) -> f64 {
    let a: Vec<String> = a.iter().map(|h| h.to_lowercase()).collect();
    let b: Vec<String> = b.iter().map(|h| h.to_lowercase()).collect();
    jaccard(a.iter().map(String::as_str), b.iter().map(String::as_str))
}

fn snippet(s: &str) -> String {
    s.chars().take(SNIPPET_CHARS).collect()
}

// Builds the baseline for one observed page.
pub fn extract_baseline(page: &PageDocument, language: &str) -> PageBaseline {
    let content = page.main_text.clone();
    let headings: Vec<String> = page.headings.iter().map(|h| h.text.clone()).collect();
    let images: Vec<String> = page.images.iter().map(|i| i.src.clone()).collect();
    let links: Vec<String> = page.links.iter().map(|l| l.href.clone()).collect();

    let structure = format!("{}|{}|{}", headings.join("|"), images.join("|"), links.join("|"));
    let structure_hash = sha256_hex(&structure);
    // Covers every compared field, so an equal hash really means no change.
    let content_hash = sha256_hex(&format!(
        "{}\n{}\n{}\n{}",
        page.title, page.meta_description, structure_hash, content
    ));

    PageBaseline {
        url: page.url.clone(),
        title: page.title.clone(),
        meta_description: page.meta_description.clone(),
        content_hash,
        word_count: content.split_whitespace().count(),
        content,
        structure_hash,
        headings,
        images,
        links,
        language: language.to_string(),
        last_updated: Utc::now(),
    }
}

// Compares a stored baseline with a new observation of the same URL.
//
// Returns None when nothing meaningful changed.
pub fn compare(old: &PageBaseline, new: &PageBaseline) -> Option<ContentChange> {
    if old.content_hash == new.content_hash {
        return None;
    }

    let mut changes = Vec::new();
    let mut severity = Severity::Low;

    if old.title != new.title {
        changes.push(SpecificChange {
            field: "title".to_string(),
            old_value: old.title.clone(),
            new_value: new.title.clone(),
            similarity: text_similarity(&old.title, &new.title),
        });
        let raised = if new.title.is_empty() {
            Severity::High
        } else {
            Severity::Medium
        };
        severity = severity.max(raised);
    }

    if old.meta_description != new.meta_description {
        changes.push(SpecificChange {
            field: "meta_description".to_string(),
            old_value: old.meta_description.clone(),
            new_value: new.meta_description.clone(),
            similarity: text_similarity(&old.meta_description, &new.meta_description),
        });
    }

    let content_similarity = text_similarity(&old.content, &new.content);
    if content_similarity < CONTENT_THRESHOLD {
        changes.push(SpecificChange {
            field: "content".to_string(),
            old_value: snippet(&old.content),
            new_value: snippet(&new.content),
            similarity: content_similarity,
        });
        let raised = if content_similarity < 0.5 {
            Severity::High
        } else if content_similarity < 0.8 {
            Severity::Medium
        } else {
            Severity::Low
        };
        severity = severity.max(raised);
    }

    if old.structure_hash != new.structure_hash {
        changes.push(SpecificChange {
            field: "structure".to_string(),
            old_value: format!("{} headings", old.headings.len()),
            new_value: format!("{} headings", new.headings.len()),
            similarity: heading_similarity(&old.headings, &new.headings),
        });
    }

    if changes.is_empty() {
        return None;
    }

    Some(ContentChange {
        url: new.url.clone(),
        change_type: ChangeType::Modified,
        language: new.language.clone(),
        old_hash: old.content_hash.clone(),
        new_hash: new.content_hash.clone(),
        changes,
        severity,
        word_count_delta: new.word_count as i64 - old.word_count as i64,
        similarity_score: content_similarity,
        detected_at: Utc::now(),
    })
}

pub struct ChangeDetector {
    baselines: JsonStore<PageBaseline>,
    changes: RwLock<Vec<ContentChange>>,
    notifier: Option<WebhookNotifier>,
}

impl ChangeDetector {
    pub fn open(baseline_dir: impl AsRef<Path>, webhook_url: Option<&str>) -> Result<Self, StoreError> {
        let notifier = match webhook_url {
            Some(url) => match WebhookNotifier::new(url) {
                Ok(n) => Some(n),
                Err(e) => {
                    tracing::warn!(error = %e, "webhook client unavailable, alerts disabled");
                    None
                }
            },
            None => None,
        };
        Ok(Self {
            baselines: JsonStore::open(baseline_dir)?,
            changes: RwLock::new(Vec::new()),
            notifier,
        })
    }

    // Compares `current` with the stored baseline and updates storage.
    //
    // A missing or unreadable baseline counts as a first observation. The
    // stored baseline is only replaced when a change is reported.
    pub async fn detect_change(&self, current: &PageBaseline) -> Option<ContentChange> {
        let previous = match self.baselines.load(&current.url).await {
            Ok(previous) => previous,
            Err(e) => {
                tracing::warn!(url = %current.url, error = %e, "baseline unreadable, starting fresh");
                None
            }
        };

        let change = match previous {
            None => Some(ContentChange {
                url: current.url.clone(),
                change_type: ChangeType::New,
                language: current.language.clone(),
                old_hash: String::new(),
                new_hash: current.content_hash.clone(),
                changes: Vec::new(),
                severity: Severity::Medium,
                word_count_delta: current.word_count as i64,
                similarity_score: 0.0,
                detected_at: Utc::now(),
            }),
            Some(previous) => compare(&previous, current),
        };

        if change.is_some() {
            if let Err(e) = self.baselines.save(&current.url, current).await {
                tracing::warn!(url = %current.url, error = %e, "baseline write failed");
            }
        }
        change
    }

    pub fn record(&self, change: ContentChange) {
        tracing::info!(
            url = %change.url,
            change_type = change.change_type.as_str(),
            severity = %change.severity,
            "content change detected"
        );
        self.changes.write().push(change);
    }

    /// Everything recorded and not yet delivered.
    pub fn pending(&self) -> Vec<ContentChange> {
        self.changes.read().clone()
    }

    // Changes detected in the last `hours` hours; 0 means all of them.
    pub fn recent_changes(&self, hours: u32) -> Vec<ContentChange> {
        let changes = self.changes.read();
        if hours == 0 {
            return changes.clone();
        }
        let cutoff = Utc::now() - chrono::Duration::hours(i64::from(hours));
        changes
            .iter()
            .filter(|c| c.detected_at > cutoff)
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> ChangeStats {
        let changes = self.changes.read();
        let mut by_type = BTreeMap::new();
        let mut by_severity = BTreeMap::new();
        for change in changes.iter() {
            *by_type.entry(change.change_type.as_str().to_string()).or_insert(0) += 1;
            *by_severity.entry(change.severity.to_string()).or_insert(0) += 1;
        }
        ChangeStats {
            total_changes: changes.len(),
            by_type,
            by_severity,
            webhook_configured: self.notifier.is_some(),
        }
    }

    // Delivers the pending batch to the webhook.
    //
    // Returns how many changes were delivered. The batch is cleared only on
    // a 2xx; changes recorded while the request was in flight are kept.
    pub async fn send_alert(&self, site_name: &str) -> Result<usize, AlertError> {
        let notifier = match &self.notifier {
            Some(n) => n,
            None => return Ok(0),
        };

        let batch = self.pending();
        if batch.is_empty() {
            return Ok(0);
        }
        let sent = batch.len();
        let payload = AlertPayload::new(site_name, batch);

        notifier.send(&payload).await?;

        let mut changes = self.changes.write();
        let sent = sent.min(changes.len());
        changes.drain(..sent);
        tracing::info!(sent, priority = %payload.priority, "alert delivered");
        Ok(sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawl::extract_from_body;
    use std::sync::Arc;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn baseline(url: &str, title: &str, content: &str) -> PageBaseline {
        let html = format!(
            "<html><head><title>{}</title></head><body><main><h1>Welcome</h1><p>{}</p></main></body></html>",
            title, content
        );
        extract_baseline(&extract_from_body(url, &html), "en")
    }

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("word{}", i)).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_jaccard_edges() {
        assert_eq!(text_similarity("", ""), 1.0);
        assert_eq!(text_similarity("a", ""), 0.0);
        assert_eq!(text_similarity("", "a"), 0.0);
        assert_eq!(text_similarity("Hello World", "hello world"), 1.0);
        assert!((text_similarity("a b c", "a b d") - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_whitespace_churn_is_not_a_change() {
        let old = baseline("https://example.com/", "Home", "Hello world. Welcome.");
        let new = baseline("https://example.com/", "Home", "Hello   world.  Welcome.");
        assert!(compare(&old, &new).is_none());
    }

    #[test]
    fn test_single_synonym_swap_is_not_a_change() {
        let text = words(100);
        let swapped = text.replace("word50", "term50");
        let old = baseline("https://example.com/", "Home", &text);
        let new = baseline("https://example.com/", "Home", &swapped);
        assert_ne!(old.content_hash, new.content_hash);
        assert!(compare(&old, &new).is_none());
    }

    #[test]
    fn test_emptied_title_is_high() {
        let old = baseline("https://example.com/", "Dental Clinic", "same body text");
        let new = baseline("https://example.com/", "", "same body text");
        assert_eq!(old.content, new.content);
        let change = compare(&old, &new).unwrap();
        assert_eq!(change.severity, Severity::High);
        assert_eq!(change.changes.len(), 1);
        assert_eq!(change.changes[0].field, "title");
    }

    #[test]
    fn test_moved_link_is_a_structure_change() {
        let page = |href: &str| {
            let html = format!(
                r#"<title>Home</title><main><h1>Welcome</h1><a href="{}">Book now</a></main>"#,
                href
            );
            extract_baseline(&extract_from_body("https://example.com/", &html), "en")
        };
        let change = compare(&page("/book"), &page("/reservar")).unwrap();
        assert_eq!(change.changes.len(), 1);
        assert_eq!(change.changes[0].field, "structure");
        assert_eq!(change.severity, Severity::Low);
    }

    #[tokio::test]
    async fn test_detector_sees_edits_to_served_html() {
        let dir = tempfile::tempdir().unwrap();
        let detector = ChangeDetector::open(dir.path(), None).unwrap();
        let url = "https://example.com/precios";
        let observe = |html: &str| extract_baseline(&extract_from_body(url, html), "es");

        let original = r#"<html lang="es"><head><title>Precios</title>
            <meta name="description" content="Tarifas de limpieza dental"></head>
            <body><main><h1>Precios</h1><p>Limpieza dental desde 40 euros por visita</p></main></body></html>"#;
        assert_eq!(
            detector.detect_change(&observe(original)).await.unwrap().change_type,
            ChangeType::New
        );
        assert!(detector.detect_change(&observe(original)).await.is_none());

        // only the <title> moves
        let retitled = original.replace("<title>Precios</title>", "<title>Tarifas 2026</title>");
        let change = detector.detect_change(&observe(&retitled)).await.unwrap();
        assert_eq!(change.change_type, ChangeType::Modified);
        assert_eq!(change.severity, Severity::Medium);
        let fields: Vec<&str> = change.changes.iter().map(|c| c.field.as_str()).collect();
        assert_eq!(fields, vec!["title"]);

        // body rewritten under the same title
        let rewritten = retitled.replace(
            "Limpieza dental desde 40 euros por visita",
            "Consulte nuestras ofertas de ortodoncia infantil",
        );
        let change = detector.detect_change(&observe(&rewritten)).await.unwrap();
        assert_eq!(change.severity, Severity::High);
        let fields: Vec<&str> = change.changes.iter().map(|c| c.field.as_str()).collect();
        assert_eq!(fields, vec!["content"]);
        assert!(change.similarity_score < 0.5);
        assert_ne!(change.old_hash, change.new_hash);

        let stored = detector.baselines.load(url).await.unwrap().unwrap();
        assert_eq!(stored.title, "Tarifas 2026");
        assert!(stored.content.contains("ortodoncia"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_observers_of_one_url() {
        let dir = tempfile::tempdir().unwrap();
        let detector = Arc::new(ChangeDetector::open(dir.path(), None).unwrap());
        let url = "https://example.com/";

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..24 {
            let detector = detector.clone();
            tasks.spawn(async move {
                let observed = baseline(url, "Home", &format!("version {} {}", i, words(30)));
                if let Some(change) = detector.detect_change(&observed).await {
                    detector.record(change);
                }
            });
        }
        while let Some(joined) = tasks.join_next().await {
            joined.unwrap();
        }

        let files: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(files.len(), 1, "{:?}", files);
        assert!(files[0].ends_with(".json"));

        let stored = detector.baselines.load(url).await.unwrap().unwrap();
        assert_eq!(stored.url, url);
        assert!(stored.content.starts_with("Welcome version "));
        assert!(!detector.pending().is_empty());
        assert!(detector.pending().len() <= 24);
        assert!(detector.detect_change(&stored).await.is_none());
    }

    #[test]
    fn test_renamed_title_is_at_least_medium() {
        let old = baseline("https://example.com/", "Dental Clinic", &words(10));
        let new = baseline("https://example.com/", "Dental Care", &format!("{} extra", words(10)));
        let change = compare(&old, &new).unwrap();
        assert_eq!(change.severity, Severity::Medium);
        assert_eq!(change.change_type, ChangeType::Modified);
    }

    #[test]
    fn test_content_similarity_grades() {
        let base = words(100);

        // 61 of 141 distinct words shared -> well under 0.5
        let rewritten = format!("{} {}", words(60), (0..40).map(|i| format!("new{}", i)).collect::<Vec<_>>().join(" "));
        let change = compare(
            &baseline("https://example.com/", "T", &base),
            &baseline("https://example.com/", "T", &rewritten),
        )
        .unwrap();
        assert!(change.similarity_score < 0.8);
        assert!(change.severity >= Severity::Medium);

        // 86 shared of 116 -> ~0.74, medium
        let partly = format!("{} {}", words(85), (0..15).map(|i| format!("new{}", i)).collect::<Vec<_>>().join(" "));
        let change = compare(
            &baseline("https://example.com/", "T", &base),
            &baseline("https://example.com/", "T", &partly),
        )
        .unwrap();
        assert_eq!(change.severity, Severity::Medium);

        // 93 shared of 109 -> ~0.85, low
        let slightly = format!("{} {}", words(92), (0..8).map(|i| format!("new{}", i)).collect::<Vec<_>>().join(" "));
        let change = compare(
            &baseline("https://example.com/", "T", &base),
            &baseline("https://example.com/", "T", &slightly),
        )
        .unwrap();
        assert_eq!(change.severity, Severity::Low);
        assert_eq!(change.changes[0].field, "content");
    }

    #[test]
    fn test_content_values_are_truncated() {
        let long = "x".repeat(500);
        let old = baseline("https://example.com/", "T", &long);
        let new = baseline("https://example.com/", "T", "completely different");
        let change = compare(&old, &new).unwrap();
        let content = change.changes.iter().find(|c| c.field == "content").unwrap();
        assert_eq!(content.old_value.chars().count(), 200);
        assert_eq!(change.severity, Severity::High);
    }

    #[tokio::test]
    async fn test_first_observation_is_new_then_quiet() {
        let dir = tempfile::tempdir().unwrap();
        let detector = ChangeDetector::open(dir.path(), None).unwrap();
        let first = baseline("https://example.com/", "Home", "one two three");

        let change = detector.detect_change(&first).await.unwrap();
        assert_eq!(change.change_type, ChangeType::New);
        assert_eq!(change.severity, Severity::Medium);
        // heading text is part of the main content
        assert_eq!(change.word_count_delta, 4);

        assert!(detector.detect_change(&first).await.is_none());
    }

    #[tokio::test]
    async fn test_baseline_is_replaced_only_on_change() {
        let dir = tempfile::tempdir().unwrap();
        let detector = ChangeDetector::open(dir.path(), None).unwrap();
        let url = "https://example.com/";
        detector.detect_change(&baseline(url, "Home", "alpha beta")).await;

        let changed = baseline(url, "Home", "gamma delta");
        assert!(detector.detect_change(&changed).await.is_some());
        // the new observation is now the baseline
        assert!(detector.detect_change(&changed).await.is_none());
    }

    #[tokio::test]
    async fn test_stats_and_recent_changes() {
        let dir = tempfile::tempdir().unwrap();
        let detector = ChangeDetector::open(dir.path(), None).unwrap();
        let change = detector
            .detect_change(&baseline("https://example.com/", "Home", "x y"))
            .await
            .unwrap();
        detector.record(change);

        let stats = detector.stats();
        assert_eq!(stats.total_changes, 1);
        assert_eq!(stats.by_type.get("new"), Some(&1));
        assert_eq!(stats.by_severity.get("medium"), Some(&1));
        assert!(!stats.webhook_configured);
        assert_eq!(detector.recent_changes(1).len(), 1);
        assert_eq!(detector.recent_changes(0).len(), 1);
    }

    #[tokio::test]
    async fn test_alert_clears_batch_only_on_success() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let webhook = format!("{}/hook", server.uri());
        let detector = ChangeDetector::open(dir.path(), Some(&webhook)).unwrap();

        for url in ["https://example.com/a", "https://example.com/b"] {
            let change = detector.detect_change(&baseline(url, "T", "words here")).await.unwrap();
            detector.record(change);
        }

        // first delivery fails: batch kept
        let failing = Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount_as_scoped(&server)
            .await;
        let err = detector.send_alert("acme").await.unwrap_err();
        assert!(matches!(err, AlertError::Status(500)));
        assert_eq!(detector.pending().len(), 2);
        drop(failing);

        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_partial_json(serde_json::json!({
                "site_name": "acme",
                "total_changes": 2,
                "priority": "medium",
                "summary": "Detected 2 content changes"
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        assert_eq!(detector.send_alert("acme").await.unwrap(), 2);
        assert!(detector.pending().is_empty());
        assert_eq!(detector.send_alert("acme").await.unwrap(), 0);
    }
}
