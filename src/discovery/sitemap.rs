// src/discovery/sitemap.rs
// =============================================================================
// Sitemap sub-source: /sitemap.xml, /sitemap_index.xml and /sitemap.txt.
//
// XML sitemaps contribute every <loc> entry; the text form is one absolute
// URL per line. A missing file, an error status or a body that yields
// nothing all mean the same thing: this source contributes an empty list.
// =============================================================================

use super::filter::{accept, SiteScope};
use crate::fetch::Fetcher;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use std::time::Duration;
use url::Url;

const SITEMAP_PATHS: &[&str] = &["/sitemap.xml", "/sitemap_index.xml", "/sitemap.txt"];

const SITEMAP_DEADLINE: Duration = Duration::from_secs(15);

static LOC: Lazy<Selector> = Lazy::new(|| Selector::parse("loc").expect("constant selector"));

// Fetches every well-known sitemap location and returns the accepted URLs.
pub async fn sitemap_urls(fetcher: &dyn Fetcher, seed: &Url, scope: &SiteScope) -> Vec<Url> {
    let mut urls = Vec::new();

    for path in SITEMAP_PATHS {
        let location = match seed.join(path) {
            Ok(u) => u,
            Err(_) => continue,
        };

        let doc = match fetcher.fetch_document(location.as_str(), SITEMAP_DEADLINE).await {
            Ok(doc) => doc,
            Err(e) => {
                tracing::debug!(sitemap = %location, error = %e, "sitemap unavailable");
                continue;
            }
        };

        let entries = if path.ends_with(".txt") {
            parse_text_sitemap(&doc.body)
        } else {
            parse_xml_sitemap(&doc.body)
        };

        let before = urls.len();
        urls.extend(entries.iter().filter_map(|raw| accept(seed, scope, raw)));
        tracing::debug!(sitemap = %location, found = urls.len() - before, "sitemap parsed");
    }

    urls
}

// Every non-empty <loc> text in an XML sitemap or sitemap index.
pub fn parse_xml_sitemap(body: &str) -> Vec<String> {
    let doc = Html::parse_document(body);
    doc.select(&LOC)
        .map(|loc| loc.text().collect::<String>().trim().to_string())
        .filter(|text| !text.is_empty())
        .collect()
}

// One URL per line; blank lines and comments are skipped.
pub fn parse_text_sitemap(body: &str) -> Vec<String> {
    body.lines()
        .map(str::trim)
        .filter(|line| line.starts_with("http://") || line.starts_with("https://"))
        .map(str::to_string)
        .collect()
}
