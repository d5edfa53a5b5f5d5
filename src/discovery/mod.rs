// src/discovery/mod.rs
// =============================================================================
// The URL discovery engine.
//
// Given a seed URL, returns every same-site page URL we can find. Several
// independent passes run over the seed page and their outputs are unioned:
//
// 1. Structural selectors (anchors, forms, menus, hidden dropdowns, ...)
// 2. Metadata (canonical, Open Graph, Twitter card, refresh)
// 3. hreflang alternates
// 4. Sitemaps (/sitemap.xml, /sitemap_index.xml, /sitemap.txt)
// 5. URLs mined out of inline script text
// 6. Language-pattern inference over everything found so far
// 7. Recursive language-folder expansion
//
// A pass that fails contributes nothing; only an unusable seed is an error.
// Every URL is normalized (no fragment, no query) and filtered for scope and
// assets, then swept for assets once more at the end.
// =============================================================================

mod catalogue;
mod filter;
mod language;
mod script;
mod sitemap;

pub use filter::{is_page_url, normalize, SiteScope};
pub use language::language_prefix;

use crate::fetch::Fetcher;
use catalogue::{document_base, harvest, ALTERNATE_SOURCES, METADATA_SOURCES, STRUCTURAL_SOURCES};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Which discovery source produced a URL. Diagnostic only; never identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "source", content = "detail", rename_all = "snake_case")]
pub enum Provenance {
    Seed,
    /// A structural selector family ("navigation", "webflow-dropdown", ...)
    Selector(&'static str),
    /// A metadata tag ("og:url", "canonical", ...)
    Metadata(&'static str),
    LanguageAlternate,
    Sitemap,
    Script,
    LanguagePattern,
    LanguageFolder,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provenance::Seed => write!(f, "seed"),
            Provenance::Selector(family) => write!(f, "selector:{}", family),
            Provenance::Metadata(tag) => write!(f, "meta:{}", tag),
            Provenance::LanguageAlternate => write!(f, "hreflang"),
            Provenance::Sitemap => write!(f, "sitemap"),
            Provenance::Script => write!(f, "script"),
            Provenance::LanguagePattern => write!(f, "language-pattern"),
            Provenance::LanguageFolder => write!(f, "language-folder"),
        }
    }
}

/// A normalized same-site page URL and where it was found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredUrl {
    pub url: Url,
    pub provenance: Provenance,
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("invalid seed URL '{url}': {reason}")]
    InvalidSeed { url: String, reason: String },
}

// The working set: URL string -> first sighting. BTreeMap keeps output
// deterministic for a fixed document.
#[derive(Default)]
struct UrlSet {
    entries: BTreeMap<String, DiscoveredUrl>,
}

impl UrlSet {
    // Returns true if the URL was new.
    fn add(&mut self, url: Url, provenance: Provenance) -> bool {
        let key = url.to_string();
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(key, DiscoveredUrl { url, provenance });
        true
    }

    fn extend(&mut self, urls: impl IntoIterator<Item = Url>, provenance: Provenance) -> usize {
        urls.into_iter().filter(|u| self.add(u.clone(), provenance)).count()
    }

    fn urls(&self) -> Vec<Url> {
        self.entries.values().map(|d| d.url.clone()).collect()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

const SEED_DEADLINE: Duration = Duration::from_secs(30);

/// Runs discovery against one site through a swappable fetcher.
pub struct Discoverer {
    fetcher: Arc<dyn Fetcher>,
}

impl Discoverer {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher }
    }

    // Discovers the page set reachable from `seed`.
    //
    // Parameters:
    //   seed: absolute http(s) URL to start from
    //   max_depth: path-segment depth relative to the seed path; 0 = unlimited
    //
    // Returns: the sorted, deduplicated URL set. If the seed itself can't be
    // fetched, the set is just the seed.
    pub async fn discover(
        &self,
        seed: &str,
        max_depth: usize,
    ) -> Result<Vec<DiscoveredUrl>, DiscoveryError> {
        let invalid = |reason: String| DiscoveryError::InvalidSeed {
            url: seed.to_string(),
            reason,
        };
        let seed_url = Url::parse(seed).map_err(|e| invalid(e.to_string()))?;
        if seed_url.scheme() != "http" && seed_url.scheme() != "https" {
            return Err(invalid(format!("unsupported scheme '{}'", seed_url.scheme())));
        }
        let scope = SiteScope::new(&seed_url).ok_or_else(|| invalid("URL has no host".to_string()))?;
        let seed_url = normalize(seed_url);

        let mut set = UrlSet::default();
        set.add(seed_url.clone(), Provenance::Seed);

        let doc = match self
            .fetcher
            .fetch_document(seed_url.as_str(), SEED_DEADLINE)
            .await
        {
            Ok(doc) => doc,
            Err(e) => {
                tracing::warn!(url = %seed_url, error = %e, "seed page unavailable, returning seed only");
                return Ok(finish(set, &seed_url, &scope, max_depth));
            }
        };

        // Passes 1, 2, 3 and 5 share one parse of the seed page. The DOM is
        // dropped before the next .await.
        let page_url = Url::parse(&doc.final_url).unwrap_or_else(|_| seed_url.clone());
        let (structural, metadata, alternates, scripted) = {
            let dom = doc.html();
            let base = document_base(&dom, &page_url);
            (
                harvest(&dom, &base, &scope, &STRUCTURAL_SOURCES),
                harvest(&dom, &base, &scope, &METADATA_SOURCES),
                harvest(&dom, &base, &scope, &ALTERNATE_SOURCES),
                script::script_urls(&dom, &base, &scope),
            )
        };

        for (url, provenance) in structural.into_iter().chain(metadata).chain(alternates) {
            set.add(url, provenance);
        }
        tracing::debug!(total = set.len(), "after markup extraction");

        let from_sitemaps = sitemap::sitemap_urls(self.fetcher.as_ref(), &seed_url, &scope).await;
        let added = set.extend(from_sitemaps, Provenance::Sitemap);
        tracing::debug!(added, total = set.len(), "after sitemaps");

        let added = set.extend(scripted, Provenance::Script);
        tracing::debug!(added, total = set.len(), "after script mining");

        let known = set.urls();
        let synthesized: Vec<Url> = language::synthesize_variants(known.iter())
            .into_iter()
            .map(normalize)
            .filter(|u| scope.contains(u) && is_page_url(u))
            .collect();
        let added = set.extend(synthesized, Provenance::LanguagePattern);
        tracing::debug!(added, total = set.len(), "after language patterns");

        let known = set.urls();
        let expanded = language::expand_language_folders(self.fetcher.as_ref(), &known, &scope).await;
        let added = set.extend(expanded, Provenance::LanguageFolder);
        tracing::debug!(added, total = set.len(), "after language folders");

        Ok(finish(set, &seed_url, &scope, max_depth))
    }
}

// Final asset sweep plus the depth filter.
fn finish(set: UrlSet, seed: &Url, scope: &SiteScope, max_depth: usize) -> Vec<DiscoveredUrl> {
    let before = set.len();
    let urls: Vec<DiscoveredUrl> = set
        .entries
        .into_values()
        .filter(|d| scope.contains(&d.url) && is_page_url(&d.url))
        .filter(|d| max_depth == 0 || calculate_url_depth(&d.url, seed) <= max_depth)
        .collect();
    tracing::info!(found = urls.len(), dropped = before - urls.len(), "discovery finished");
    urls
}

// Path-segment depth of `target` relative to `base`.
//
// Examples (base path "/docs"):
//   /docs          -> 0
//   /docs/a/b      -> 2
//   /blog/post     -> 0 (outside the base path)
pub fn calculate_url_depth(target: &Url, base: &Url) -> usize {
    let base_path = base.path().trim_matches('/');
    let target_path = target.path().trim_matches('/');

    let remaining = if base_path.is_empty() {
        target_path
    } else {
        match target_path.strip_prefix(base_path) {
            Some(rest) => rest.trim_matches('/'),
            None => return 0,
        }
    };

    if remaining.is_empty() {
        0
    } else {
        remaining.split('/').count()
    }
}
