// src/discovery/script.rs
// =============================================================================
// Script-text URL mining.
//
// Nothing is executed. Inline <script> bodies are scanned with a few regexes
// for string literals that look like pages:
// - quoted strings ending in a page extension ("team.html", "form.php")
// - quoted root-relative paths ("/services/dental")
// - values assigned to href/url/link/route/path-like keys
//
// Everything found still goes through the normal scope and asset filters.
// =============================================================================

use super::filter::{accept, SiteScope};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

static SCRIPT: Lazy<Selector> = Lazy::new(|| Selector::parse("script").expect("constant selector"));

static PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r#"["']([^"'\s]+\.(?:html?|php|aspx?|jsp))["']"#,
        r#"["'](/[^"'?\s#]*)["']"#,
        r#"(?i)\b(?:href|url|link|route|path)\s*[:=]\s*["']([^"'#]+)["']"#,
    ]
    .iter()
    .map(|p| Regex::new(p).expect("constant regex"))
    .collect()
});

// Literal values that are never links.
fn is_junk(candidate: &str) -> bool {
    let lower = candidate.to_ascii_lowercase();
    candidate.len() < 2
        || lower.starts_with("data:")
        || lower.starts_with("blob:")
        || lower.starts_with("javascript:")
        || lower.contains("void(0)")
}

/// Raw candidates from one script body, before scope filtering.
pub fn script_candidates(script: &str) -> Vec<String> {
    let mut found = Vec::new();
    for re in PATTERNS.iter() {
        for caps in re.captures_iter(script) {
            if let Some(m) = caps.get(1) {
                let candidate = m.as_str().trim();
                if !is_junk(candidate) {
                    found.push(candidate.to_string());
                }
            }
        }
    }
    found
}

// Mines every inline script in `doc`.
pub fn script_urls(doc: &Html, base: &Url, scope: &SiteScope) -> Vec<Url> {
    doc.select(&SCRIPT)
        .flat_map(|script| script_candidates(&script.text().collect::<String>()))
        .filter_map(|candidate| accept(base, scope, &candidate))
        .collect()
}
