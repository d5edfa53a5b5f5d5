// src/discovery/filter.rs
// =============================================================================
// URL normalization and the two filters every discovered URL goes through.
//
// - resolve_href: turn an href/src/content value into an absolute URL, or
//   None for anchors, mailto:, tel:, javascript:, data: and friends
// - normalize: strip fragment and query (the dedup key)
// - SiteScope::contains: same registrable host, www/non-www equivalent,
//   minus a fixed denylist of third-party CDN/analytics/social hosts
// - is_page_url: reject static assets by extension and by directory
//
// The asset filter runs during extraction AND again as a final sweep,
// because script mining and pattern synthesis can bring assets back in.
// =============================================================================

use url::Url;

// Hosts that are never part of the site even when links point at them.
const THIRD_PARTY_HOSTS: &[&str] = &[
    "fonts.googleapis.com",
    "fonts.gstatic.com",
    "googletagmanager.com",
    "google-analytics.com",
    "doubleclick.net",
    "cdnjs.cloudflare.com",
    "cdn.jsdelivr.net",
    "unpkg.com",
    "facebook.com",
    "twitter.com",
    "x.com",
    "instagram.com",
    "linkedin.com",
    "youtube.com",
];

const ASSET_EXTENSIONS: &[&str] = &[
    // images
    "jpg", "jpeg", "png", "gif", "svg", "webp", "bmp", "ico", "tiff", "avif",
    // video
    "mp4", "avi", "mov", "wmv", "flv", "webm", "mkv", "m4v",
    // audio
    "mp3", "wav", "ogg", "aac", "flac", "m4a",
    // archives
    "zip", "rar", "tar", "gz", "7z", "bz2",
    // fonts
    "woff", "woff2", "ttf", "eot", "otf",
    // code and data
    "css", "js", "mjs", "map", "json", "xml", "txt",
    // documents
    "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx",
];

const ASSET_DIRECTORIES: &[&str] = &[
    "/js/", "/css/", "/assets/", "/static/", "/files/", "/api/", "/webhook",
    "/callback", "/packs/", "/dist/", "/build/", "/node_modules/",
];

// Hrefs that never point at a page.
const SKIPPED_SCHEMES: &[&str] = &["mailto:", "tel:", "javascript:", "data:", "blob:", "ftp:"];

// Resolves a link (possibly relative) to an absolute URL
//
// Returns None for:
// - empty values and in-page anchors ("#section")
// - non-page schemes (mailto:, tel:, javascript:, data:, blob:, ftp:)
// - void-call patterns like "javascript:void(0)" hidden in odd places
// - anything the url crate can't join
pub fn resolve_href(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') || href.contains("void(0)") {
        return None;
    }
    let lower = href.to_ascii_lowercase();
    if SKIPPED_SCHEMES.iter().any(|s| lower.starts_with(s)) {
        return None;
    }
    base.join(href).ok()
}

/// Drop fragment and query; the result is the dedup key.
pub fn normalize(mut url: Url) -> Url {
    url.set_fragment(None);
    url.set_query(None);
    url
}

/// The host a crawl is confined to.
#[derive(Debug, Clone)]
pub struct SiteScope {
    bare_host: String,
}

impl SiteScope {
    pub fn new(seed: &Url) -> Option<Self> {
        let host = seed.host_str()?.to_ascii_lowercase();
        Some(Self {
            bare_host: strip_www(&host).to_string(),
        })
    }

    /// Same site: http(s), same host modulo "www.", not a third-party host.
    pub fn contains(&self, url: &Url) -> bool {
        if url.scheme() != "http" && url.scheme() != "https" {
            return false;
        }
        let host = match url.host_str() {
            Some(h) => h.to_ascii_lowercase(),
            None => return false,
        };
        if THIRD_PARTY_HOSTS
            .iter()
            .any(|denied| host == *denied || host.ends_with(&format!(".{}", denied)))
        {
            return false;
        }
        strip_www(&host) == self.bare_host
    }
}

fn strip_www(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}

// Checks if a URL looks like a page rather than a static asset
//
// Two checks:
// 1. The last path segment's extension isn't in the asset list
// 2. The URL doesn't live under an asset-style directory (/js/, /api/, ...)
pub fn is_page_url(url: &Url) -> bool {
    let path = url.path().to_ascii_lowercase();

    let last_segment = path.rsplit('/').next().unwrap_or("");
    if let Some((_, ext)) = last_segment.rsplit_once('.') {
        if ASSET_EXTENSIONS.contains(&ext) {
            return false;
        }
    }

    !ASSET_DIRECTORIES.iter().any(|dir| path.contains(dir))
}

// Full pipeline for one candidate: resolve, normalize, scope, asset check.
pub fn accept(base: &Url, scope: &SiteScope, raw: &str) -> Option<Url> {
    let url = normalize(resolve_href(base, raw)?);
    (scope.contains(&url) && is_page_url(&url)).then_some(url)
}
