// src/discovery/language.rs
// =============================================================================
// Language-variant inference and recursive language-folder expansion.
//
// Multilingual sites often link only one language from the home page. Two
// passes compensate:
//
// 1. Pattern inference: find the language prefixes that actually occur
//    among discovered paths (/es/..., /fr/...), then
//    - put every unprefixed path under each prefix (/about -> /es/about)
//    - strip the prefix from prefixed paths (/es/about -> /about)
//    - for the root path, also guess a few common pages (/es/contact, ...)
//
// 2. Folder expansion: visit up to MAX_FOLDER_PAGES pages under a language
//    prefix (HEAD first, GET only if it exists) and keep their same-prefix
//    links. Runs sequentially on purpose, to bound discovery latency.
// =============================================================================

use super::filter::{accept, SiteScope};
use crate::fetch::Fetcher;
use once_cell::sync::Lazy;
use scraper::Selector;
use std::collections::BTreeSet;
use std::time::Duration;
use url::Url;

pub const MAX_FOLDER_PAGES: usize = 5;

const COMMON_PAGES: &[&str] = &["/about", "/contact", "/services", "/blog"];

const FOLDER_DEADLINE: Duration = Duration::from_secs(15);

static ANCHORS: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("constant selector"));

fn is_language_code(segment: &str) -> bool {
    (2..=3).contains(&segment.len()) && segment.bytes().all(|b| b.is_ascii_lowercase())
}

// The language code of a path like "/es/servicios" (first segment of 2-3
// lowercase letters, followed by '/').
pub fn language_prefix(path: &str) -> Option<&str> {
    let rest = path.strip_prefix('/')?;
    let (segment, _) = rest.split_once('/')?;
    is_language_code(segment).then_some(segment)
}

// Like `language_prefix` but also accepts the bare folder ("/es").
fn folder_code(path: &str) -> Option<&str> {
    language_prefix(path).or_else(|| {
        let segment = path.strip_prefix('/')?;
        is_language_code(segment).then_some(segment)
    })
}

/// Language codes present among `urls`, sorted.
pub fn detect_prefixes<'a>(urls: impl IntoIterator<Item = &'a Url>) -> BTreeSet<String> {
    urls.into_iter()
        .filter_map(|u| language_prefix(u.path()).map(str::to_string))
        .collect()
}

fn with_path(url: &Url, path: &str) -> Url {
    let mut out = url.clone();
    out.set_path(path);
    out.set_query(None);
    out.set_fragment(None);
    out
}

// Synthesizes language variants for every URL in `urls`.
//
// Returns only candidates; the caller filters them and dedups against what
// it already has.
pub fn synthesize_variants<'a>(
    urls: impl IntoIterator<Item = &'a Url> + Clone,
) -> Vec<Url> {
    let prefixes = detect_prefixes(urls.clone());
    if prefixes.is_empty() {
        return Vec::new();
    }
    tracing::debug!(prefixes = ?prefixes, "language prefixes detected");

    let mut out = Vec::new();
    for url in urls {
        let path = url.path();
        match language_prefix(path) {
            Some(code) => {
                // "/es/about" -> "/about"
                let base = &path[code.len() + 1..];
                out.push(with_path(url, base));
            }
            None => {
                for code in &prefixes {
                    if path == "/" || path.is_empty() {
                        out.push(with_path(url, &format!("/{}/", code)));
                        for page in COMMON_PAGES {
                            out.push(with_path(url, &format!("/{}{}", code, page)));
                        }
                    } else {
                        out.push(with_path(url, &format!("/{}{}", code, path)));
                    }
                }
            }
        }
    }
    out
}

// Visits a few pages under language folders and harvests links that stay in
// the same folder.
//
// `known` should be sorted so the representative pages are deterministic.
pub async fn expand_language_folders(
    fetcher: &dyn Fetcher,
    known: &[Url],
    scope: &SiteScope,
) -> Vec<Url> {
    let pages: Vec<&Url> = known
        .iter()
        .filter(|u| folder_code(u.path()).is_some())
        .take(MAX_FOLDER_PAGES)
        .collect();

    let mut found = Vec::new();
    for page in pages {
        let code = match folder_code(page.path()) {
            Some(code) => code.to_string(),
            None => continue,
        };

        match fetcher.probe(page.as_str()).await {
            Ok(status) if status < 400 => {}
            Ok(status) => {
                tracing::debug!(url = %page, status, "language page missing, skipping");
                continue;
            }
            Err(e) => {
                tracing::debug!(url = %page, error = %e, "language page probe failed");
                continue;
            }
        }

        let doc = match fetcher.fetch_document(page.as_str(), FOLDER_DEADLINE).await {
            Ok(doc) => doc,
            Err(e) => {
                tracing::debug!(url = %page, error = %e, "language page fetch failed");
                continue;
            }
        };

        let base = Url::parse(&doc.final_url).unwrap_or_else(|_| page.clone());
        let folder = format!("/{}/", code);
        let links: Vec<Url> = {
            let dom = doc.html();
            dom.select(&ANCHORS)
                .filter_map(|a| a.value().attr("href"))
                .filter_map(|href| accept(&base, scope, href))
                .filter(|u| u.path().starts_with(&folder))
                .collect()
        };
        tracing::debug!(url = %page, found = links.len(), "explored language folder");
        found.extend(links);
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::HttpFetcher;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn urls(list: &[&str]) -> Vec<Url> {
        list.iter().map(|s| Url::parse(s).unwrap()).collect()
    }

    fn paths(list: &[Url]) -> Vec<String> {
        list.iter().map(|u| u.path().to_string()).collect()
    }

    #[test]
    fn test_language_prefix() {
        assert_eq!(language_prefix("/es/servicios"), Some("es"));
        assert_eq!(language_prefix("/por/x"), Some("por"));
        assert_eq!(language_prefix("/ES/x"), None);
        assert_eq!(language_prefix("/es"), None);
        assert_eq!(language_prefix("/about/team"), None);
        assert_eq!(folder_code("/es"), Some("es"));
    }

    #[test]
    fn test_no_prefixes_means_no_synthesis() {
        let set = urls(&["https://example.com/", "https://example.com/about"]);
        assert!(synthesize_variants(set.iter()).is_empty());
    }

    #[test]
    fn test_synthesis_adds_and_strips_prefixes() {
        let set = urls(&[
            "https://example.com/",
            "https://example.com/pricing",
            "https://example.com/es/equipo",
        ]);
        let out = paths(&synthesize_variants(set.iter()));

        assert!(out.contains(&"/es/".to_string()));
        assert!(out.contains(&"/es/pricing".to_string()));
        assert!(out.contains(&"/equipo".to_string()));
        for page in COMMON_PAGES {
            assert!(out.contains(&format!("/es{}", page)));
        }
        // prefixed paths are not re-prefixed
        assert!(!out.contains(&"/es/es/equipo".to_string()));
    }

    #[tokio::test]
    async fn test_folder_expansion_keeps_same_prefix_links() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/es/"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/es/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<a href="/es/equipo">Equipo</a><a href="/about">About</a><a href="/es/logo.png">x</a>"#,
            ))
            .mount(&server)
            .await;
        // HEAD /fr/ falls through to 404

        let fetcher = HttpFetcher::new("test-agent").unwrap();
        let seed = Url::parse(&format!("{}/", server.uri())).unwrap();
        let scope = SiteScope::new(&seed).unwrap();
        let known = urls(&[
            format!("{}/es/", server.uri()).as_str(),
            format!("{}/fr/", server.uri()).as_str(),
        ]);

        let found = expand_language_folders(&fetcher, &known, &scope).await;
        assert_eq!(paths(&found), vec!["/es/equipo".to_string()]);
    }
}
