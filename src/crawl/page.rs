// src/crawl/page.rs
// =============================================================================
// PageDocument: the extracted form of one fetched page.
//
// Extraction is a single pass over the DOM:
// - title, <html lang>, and every <meta name|property> in the head
// - visible body text (script/style/noscript skipped), and the text of the
//   main content regions when the page marks any up
// - headings in document order, links and images (absolute URLs)
//
// A PageDocument is plain owned data. It is built by the task that fetched
// it and handed by value to whoever consumes the crawl stream.
// =============================================================================

use crate::fetch::ParsedDocument;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Node, Selector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("constant selector")
}

static TITLE: Lazy<Selector> = Lazy::new(|| selector("title"));
static HTML_LANG: Lazy<Selector> = Lazy::new(|| selector("html[lang]"));
static META: Lazy<Selector> = Lazy::new(|| selector("meta[content]"));
static BODY: Lazy<Selector> = Lazy::new(|| selector("body"));
static MAIN_REGION: Lazy<Selector> = Lazy::new(|| selector("main, article, .content, section"));
static HEADINGS: Lazy<Selector> = Lazy::new(|| selector("h1, h2, h3, h4, h5, h6"));
static LINKS: Lazy<Selector> = Lazy::new(|| selector("a[href]"));
static IMAGES: Lazy<Selector> = Lazy::new(|| selector("img[src]"));

// Text under these elements is never visible content.
const INVISIBLE: &[&str] = &["script", "style", "noscript", "template"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heading {
    pub level: u8,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageLink {
    pub href: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageImage {
    pub src: String,
    pub alt: String,
}

/// One crawled page, ready for the monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageDocument {
    pub url: String,
    pub title: String,
    /// Declared document language (`<html lang>`), as written
    pub lang: Option<String>,
    pub meta_description: String,
    /// Every `<meta name|property content>` pair
    pub meta: BTreeMap<String, String>,
    /// Visible text of the whole body, whitespace collapsed
    pub text: String,
    /// Visible text of the main content region (falls back to `text`)
    pub main_text: String,
    pub headings: Vec<Heading>,
    pub links: Vec<PageLink>,
    pub images: Vec<PageImage>,
    /// Response headers the page was served with
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(skip)]
    pub html: String,
    /// Served from the cache instead of the network
    #[serde(default)]
    pub from_cache: bool,
}

impl PageDocument {
    // Extracts a PageDocument from a fetched document.
    pub fn extract(doc: &ParsedDocument) -> Self {
        let base = Url::parse(&doc.final_url)
            .or_else(|_| Url::parse(&doc.url))
            .ok();
        let dom = doc.html();

        let title = dom
            .select(&TITLE)
            .next()
            .map(|t| collapse(&t.text().collect::<String>()))
            .unwrap_or_default();

        let lang = dom
            .select(&HTML_LANG)
            .next()
            .and_then(|h| h.value().attr("lang"))
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty());

        let mut meta = BTreeMap::new();
        for element in dom.select(&META) {
            let e = element.value();
            let key = e.attr("name").or_else(|| e.attr("property"));
            if let (Some(key), Some(content)) = (key, e.attr("content")) {
                meta.entry(key.to_ascii_lowercase())
                    .or_insert_with(|| content.trim().to_string());
            }
        }
        let meta_description = meta.get("description").cloned().unwrap_or_default();

        let text = dom
            .select(&BODY)
            .next()
            .map(visible_text)
            .unwrap_or_else(|| visible_text(dom.root_element()));

        // Every outermost region counts; a <section> inside <main> is
        // already covered by its parent.
        let regions: Vec<String> = dom
            .select(&MAIN_REGION)
            .filter(|region| {
                !region
                    .ancestors()
                    .filter_map(ElementRef::wrap)
                    .any(|a| MAIN_REGION.matches(&a))
            })
            .map(visible_text)
            .filter(|t| !t.is_empty())
            .collect();
        let main_text = if regions.is_empty() {
            text.clone()
        } else {
            regions.join(" ")
        };

        let headings = dom
            .select(&HEADINGS)
            .filter_map(|h| {
                let level = h.value().name()[1..].parse().ok()?;
                let text = collapse(&h.text().collect::<String>());
                (!text.is_empty()).then_some(Heading { level, text })
            })
            .collect();

        let links = dom
            .select(&LINKS)
            .filter_map(|a| {
                let href = absolute(base.as_ref(), a.value().attr("href")?)?;
                Some(PageLink {
                    href,
                    text: collapse(&a.text().collect::<String>()),
                })
            })
            .collect();

        let images = dom
            .select(&IMAGES)
            .filter_map(|img| {
                let src = absolute(base.as_ref(), img.value().attr("src")?)?;
                Some(PageImage {
                    src,
                    alt: img.value().attr("alt").unwrap_or("").trim().to_string(),
                })
            })
            .collect();

        Self {
            url: doc.url.clone(),
            title,
            lang,
            meta_description,
            meta,
            text,
            main_text,
            headings,
            links,
            images,
            headers: doc.headers.clone(),
            html: doc.body.clone(),
            from_cache: false,
        }
    }

    // Stand-in emitted when every attempt at a URL failed.
    pub fn placeholder(url: &str, error: &str) -> Self {
        Self {
            url: url.to_string(),
            title: format!("Failed to load: {}", url),
            lang: None,
            meta_description: String::new(),
            meta: BTreeMap::new(),
            text: format!("Error: {}", error),
            main_text: format!("Error: {}", error),
            headings: Vec::new(),
            links: Vec::new(),
            images: Vec::new(),
            headers: BTreeMap::new(),
            html: String::new(),
            from_cache: false,
        }
    }

    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

fn collapse(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

// Resolves hrefs/srcs; keeps only http(s) results.
fn absolute(base: Option<&Url>, raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with('#') {
        return None;
    }
    let url = match base {
        Some(base) => base.join(raw).ok()?,
        None => Url::parse(raw).ok()?,
    };
    matches!(url.scheme(), "http" | "https").then(|| url.to_string())
}

// Visible text under `root`: text nodes not inside script/style/etc.
fn visible_text(root: ElementRef) -> String {
    let mut words: Vec<&str> = Vec::new();
    for node in root.descendants() {
        if let Node::Text(text) = node.value() {
            let hidden = node.ancestors().any(|a| {
                matches!(a.value(), Node::Element(e) if INVISIBLE.contains(&e.name()))
            });
            if !hidden {
                words.extend(text.split_whitespace());
            }
        }
    }
    words.join(" ")
}

/// Parse a raw body directly (used for cache hits and tests).
pub fn extract_from_body(url: &str, body: &str) -> PageDocument {
    PageDocument::extract(&ParsedDocument::from_body(url, body))
}
