// src/discovery/catalogue.rs
// =============================================================================
// The selector catalogue: plain data describing where URLs hide in markup.
//
// Each entry is (CSS selector, where the URL lives, provenance). A single
// generic routine, `harvest`, applies any slice of entries to a document.
// Adding a new navigation convention means adding a line here, not code.
//
// Many entries overlap on purpose (an <a> inside <nav class="menu"> matches
// several). Overlap is harmless: the working set dedups by URL and keeps
// the first provenance it saw.
// =============================================================================

use super::filter::{accept, SiteScope};
use super::Provenance;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use url::Url;

/// Where the URL sits on a matched element.
#[derive(Debug, Clone, Copy)]
pub enum UrlSlot {
    Attr(&'static str),
    /// `<meta http-equiv="refresh" content="5; url=/next">`
    Refresh,
}

#[derive(Debug, Clone, Copy)]
pub struct UrlSource {
    pub selector: &'static str,
    pub slot: UrlSlot,
    pub provenance: Provenance,
}

const fn href(selector: &'static str, family: &'static str) -> UrlSource {
    UrlSource {
        selector,
        slot: UrlSlot::Attr("href"),
        provenance: Provenance::Selector(family),
    }
}

const fn meta(selector: &'static str, family: &'static str) -> UrlSource {
    UrlSource {
        selector,
        slot: UrlSlot::Attr("content"),
        provenance: Provenance::Metadata(family),
    }
}

/// Anchors, forms, link/area/base tags and navigation conventions.
pub const STRUCTURAL: &[UrlSource] = &[
    // Primary navigation sources
    href("a[href]", "links"),
    UrlSource {
        selector: "form[action]",
        slot: UrlSlot::Attr("action"),
        provenance: Provenance::Selector("forms"),
    },
    href("link[href]", "link-tags"),
    href("area[href]", "image-maps"),
    href("base[href]", "base-tags"),
    // Page regions
    href("nav a[href]", "navigation"),
    href("header a[href]", "header"),
    href("footer a[href]", "footer"),
    href("aside a[href]", "sidebar"),
    // Dropdowns and mega-menus, usually hidden until hovered
    href(".w-dropdown a[href]", "webflow-dropdown"),
    href(".dropdown-wrapper a[href]", "dropdown-wrapper"),
    href(".w-dropdown-list a[href]", "dropdown-list"),
    href(".w-dropdown-link[href]", "dropdown-link"),
    href(".w-dropdown-toggle + .w-dropdown-list a[href]", "webflow-toggle-list"),
    href(".w-dropdown-nav a[href]", "webflow-nav"),
    href("nav.dropdown-wrapper a[href]", "nav-dropdown-wrapper"),
    href(".dropdown a[href]", "dropdown"),
    href(".dropdown-menu a[href]", "dropdown-menu"),
    href(".mega-menu a[href]", "mega-menu"),
    href(".submenu a[href]", "submenu"),
    href(".sub-menu a[href]", "sub-menu"),
    href(".nav-dropdown a[href]", "nav-dropdown"),
    href(".navbar-dropdown a[href]", "navbar-dropdown"),
    // Inline-hidden containers
    href("[style*='opacity: 0'] a[href]", "hidden-opacity"),
    href("[style*='opacity:0'] a[href]", "hidden-opacity"),
    href("[style*='display: none'] a[href]", "hidden-display"),
    href("[style*='display:none'] a[href]", "hidden-display"),
    href("[style*='visibility: hidden'] a[href]", "hidden-visibility"),
    href("[style*='visibility:hidden'] a[href]", "hidden-visibility"),
    href("[hidden] a[href]", "hidden-attribute"),
    href("[aria-hidden='true'] a[href]", "aria-hidden"),
    // Language switchers
    href(".language-selector a[href]", "language-selector"),
    href(".lang-switch a[href]", "lang-switch"),
    href(".locale-nav a[href]", "locale-nav"),
    href(".language a[href]", "language-switcher"),
    href(".lang a[href]", "lang-switcher"),
    href(".locale a[href]", "locale-switcher"),
    // Menu and navigation classes
    href(".menu a[href]", "menu-class"),
    href(".nav a[href]", "nav-class"),
    href(".navigation a[href]", "navigation-class"),
    href(".navbar a[href]", "navbar-class"),
    href(".main-nav a[href]", "main-nav-class"),
    href(".primary-nav a[href]", "primary-nav-class"),
    href(".secondary-nav a[href]", "secondary-nav-class"),
    href(".breadcrumb a[href]", "breadcrumb"),
    href(".breadcrumbs a[href]", "breadcrumbs"),
    // Sitemap and directory structures
    href(".sitemap a[href]", "sitemap-class"),
    href(".site-map a[href]", "site-map-class"),
    href("#sitemap a[href]", "sitemap-id"),
    href(".directory a[href]", "directory"),
    // Content areas
    href("main a[href]", "main-content"),
    href("article a[href]", "articles"),
    href("section a[href]", "sections"),
    href(".content a[href]", "content-class"),
    href(".post a[href]", "posts"),
    href(".page a[href]", "pages"),
    // Lists
    href("ul a[href]", "unordered-lists"),
    href("ol a[href]", "ordered-lists"),
    href("dl a[href]", "definition-lists"),
    // Buttons and calls to action
    href(".button[href]", "button-class"),
    href(".btn[href]", "btn-class"),
    href(".cta[href]", "cta-class"),
    href(".call-to-action[href]", "call-to-action"),
    // Pagination
    href(".pagination a[href]", "pagination"),
    href(".pager a[href]", "pager"),
    href(".page-numbers a[href]", "page-numbers"),
    href(".social a[href]", "social-links"),
    // Generic containers named after navigation
    href("div[class*='nav'] a[href]", "nav-divs"),
    href("div[class*='menu'] a[href]", "menu-divs"),
    href("div[id*='nav'] a[href]", "nav-id-divs"),
    href("div[id*='menu'] a[href]", "menu-id-divs"),
    // HTML sitemaps
    href("ul.sitemap_list a[href]", "html-sitemap"),
    href("ul[role='list'] a[href]", "html-sitemap"),
    href("nav.sitemap a[href]", "html-sitemap"),
    href("ul li a[href]", "html-sitemap"),
];

/// Canonical, Open Graph and Twitter-card URLs.
pub const METADATA: &[UrlSource] = &[
    meta("meta[property='og:url']", "og:url"),
    meta("meta[name='twitter:url']", "twitter:url"),
    meta("meta[property='al:web:url']", "al:web:url"),
    meta("meta[property='og:image']", "og:image"),
    meta("meta[name='twitter:image']", "twitter:image"),
    meta("meta[property='article:author']", "article:author"),
    meta("meta[name='canonical']", "canonical-meta"),
    meta("meta[property='og:video']", "og:video"),
    UrlSource {
        selector: "meta[http-equiv='refresh']",
        slot: UrlSlot::Refresh,
        provenance: Provenance::Metadata("refresh"),
    },
    UrlSource {
        selector: "link[rel='canonical']",
        slot: UrlSlot::Attr("href"),
        provenance: Provenance::Metadata("canonical"),
    },
    UrlSource {
        selector: "link[rel='alternate'][type='application/rss+xml']",
        slot: UrlSlot::Attr("href"),
        provenance: Provenance::Metadata("rss"),
    },
];

/// hreflang alternates: both URLs to crawl and a language-prefix signal.
pub const ALTERNATES: &[UrlSource] = &[UrlSource {
    selector: "link[rel='alternate'][hreflang]",
    slot: UrlSlot::Attr("href"),
    provenance: Provenance::LanguageAlternate,
}];

/// A catalogue entry with its selector parsed.
pub struct CompiledSource {
    selector: Selector,
    source: UrlSource,
}

fn compile(sources: &[UrlSource]) -> Vec<CompiledSource> {
    sources
        .iter()
        .filter_map(|source| match Selector::parse(source.selector) {
            Ok(selector) => Some(CompiledSource {
                selector,
                source: *source,
            }),
            Err(e) => {
                tracing::warn!(selector = source.selector, error = ?e, "skipping unparsable catalogue selector");
                None
            }
        })
        .collect()
}

pub static STRUCTURAL_SOURCES: Lazy<Vec<CompiledSource>> = Lazy::new(|| compile(STRUCTURAL));
pub static METADATA_SOURCES: Lazy<Vec<CompiledSource>> = Lazy::new(|| compile(METADATA));
pub static ALTERNATE_SOURCES: Lazy<Vec<CompiledSource>> = Lazy::new(|| compile(ALTERNATES));

static BASE_HREF: Lazy<Selector> =
    Lazy::new(|| Selector::parse("base[href]").expect("constant selector"));

// Base URL for resolution: <base href> when present, else the page URL.
pub fn document_base(doc: &Html, page_url: &Url) -> Url {
    doc.select(&BASE_HREF)
        .next()
        .and_then(|base| base.value().attr("href"))
        .and_then(|href| page_url.join(href).ok())
        .unwrap_or_else(|| page_url.clone())
}

// Pulls the URL out of a refresh directive ("5; url=/next" -> "/next").
fn refresh_target(content: &str) -> Option<&str> {
    let lower = content.to_ascii_lowercase();
    let at = lower.find("url=")?;
    let target = content[at + 4..].trim().trim_matches(|c| c == '\'' || c == '"');
    (!target.is_empty()).then_some(target)
}

// Applies every entry in `sources` to `doc` and returns the accepted URLs
// with the provenance of the entry that matched.
pub fn harvest(
    doc: &Html,
    base: &Url,
    scope: &SiteScope,
    sources: &[CompiledSource],
) -> Vec<(Url, Provenance)> {
    let mut found = Vec::new();
    for compiled in sources {
        for element in doc.select(&compiled.selector) {
            let raw = match compiled.source.slot {
                UrlSlot::Attr(name) => element.value().attr(name),
                UrlSlot::Refresh => element.value().attr("content").and_then(refresh_target),
            };
            if let Some(url) = raw.and_then(|raw| accept(base, scope, raw)) {
                found.push((url, compiled.source.provenance));
            }
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(html: &str, sources: &[CompiledSource]) -> Vec<String> {
        let doc = Html::parse_document(html);
        let page = Url::parse("https://example.com/").unwrap();
        let scope = SiteScope::new(&page).unwrap();
        let base = document_base(&doc, &page);
        harvest(&doc, &base, &scope, sources)
            .into_iter()
            .map(|(u, _)| u.to_string())
            .collect()
    }

    #[test]
    fn test_every_catalogue_selector_parses() {
        assert_eq!(STRUCTURAL_SOURCES.len(), STRUCTURAL.len());
        assert_eq!(METADATA_SOURCES.len(), METADATA.len());
        assert_eq!(ALTERNATE_SOURCES.len(), ALTERNATES.len());
    }

    #[test]
    fn test_hidden_dropdown_links_are_found() {
        let html = r#"<div class="w-dropdown-list" style="display: none">
            <a href="/services/cleaning">Cleaning</a></div>"#;
        let urls = run(html, &STRUCTURAL_SOURCES);
        assert!(urls.contains(&"https://example.com/services/cleaning".to_string()));
    }

    #[test]
    fn test_form_actions_and_base_tag() {
        let html = r#"<html><head><base href="/en/"></head>
            <body><form action="search"></form><a href="team">Team</a></body></html>"#;
        let urls = run(html, &STRUCTURAL_SOURCES);
        assert!(urls.contains(&"https://example.com/en/search".to_string()));
        assert!(urls.contains(&"https://example.com/en/team".to_string()));
    }

    #[test]
    fn test_metadata_sources() {
        let html = r#"<head>
            <meta property="og:url" content="https://www.example.com/home?utm=1">
            <meta http-equiv="refresh" content="5; url=/moved">
            <link rel="canonical" href="/canonical">
            <meta property="og:image" content="/hero.png">
        </head>"#;
        let urls = run(html, &METADATA_SOURCES);
        assert!(urls.contains(&"https://www.example.com/home".to_string()));
        assert!(urls.contains(&"https://example.com/moved".to_string()));
        assert!(urls.contains(&"https://example.com/canonical".to_string()));
        assert!(!urls.iter().any(|u| u.ends_with(".png")));
    }

    #[test]
    fn test_hreflang_alternates_carry_their_provenance() {
        let html = r#"<head><link rel="alternate" hreflang="es" href="/es/"></head>"#;
        let doc = Html::parse_document(html);
        let page = Url::parse("https://example.com/").unwrap();
        let scope = SiteScope::new(&page).unwrap();
        let found = harvest(&doc, &page, &scope, &ALTERNATE_SOURCES);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0.as_str(), "https://example.com/es/");
        assert_eq!(found[0].1, Provenance::LanguageAlternate);
    }

    #[test]
    fn test_refresh_target() {
        assert_eq!(refresh_target("0; URL='/next'"), Some("/next"));
        assert_eq!(refresh_target("10"), None);
    }
}
