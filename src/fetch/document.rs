// src/fetch/document.rs
// =============================================================================
// The parsed-document value passed between the fetch layer and its callers.
//
// scraper::Html is not Send, so a ParsedDocument keeps the raw body and hands
// out a fresh DOM on demand with `html()`. Callers parse, query, and drop the
// DOM inside a synchronous block; nothing holds a DOM across an .await.
// =============================================================================

use reqwest::header::HeaderMap;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A fetched page: where it came from, what the server said, and the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDocument {
    /// The URL that was requested
    pub url: String,
    /// The URL after redirects (base for resolving relative links)
    pub final_url: String,
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl ParsedDocument {
    /// Wrap an in-memory body (tests, cache hits).
    pub fn from_body(url: &str, body: impl Into<String>) -> Self {
        Self {
            url: url.to_string(),
            final_url: url.to_string(),
            status: 200,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    /// Parse the body into a DOM.
    pub fn html(&self) -> Html {
        Html::parse_document(&self.body)
    }

    // Returns a new document containing only what `target` matches.
    //
    // An invalid selector or an empty selection leaves the document as is,
    // so a bad target never costs the caller the whole page.
    pub fn select_target(&self, target: &TargetSelector) -> ParsedDocument {
        let selector = match Selector::parse(&target.selector) {
            Ok(s) => s,
            Err(_) => {
                tracing::warn!(selector = %target.selector, "invalid target selector, keeping full document");
                return self.clone();
            }
        };

        let dom = self.html();
        let fragment: String = dom
            .select(&selector)
            .map(|element| match target.mode {
                SelectorMode::Element => element.html(),
                SelectorMode::Content => element.inner_html(),
            })
            .collect();

        if fragment.trim().is_empty() {
            return self.clone();
        }

        ParsedDocument {
            body: format!("<html><body>{}</body></html>", fragment),
            ..self.clone()
        }
    }
}

/// How much of a matched element to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectorMode {
    /// Inner HTML of the match
    #[default]
    Content,
    /// The match including its own tag
    Element,
}

/// A user-chosen part of the page to extract instead of the whole document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSelector {
    pub selector: String,
    pub mode: SelectorMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl TargetSelector {
    // Builds a selector from a kind ("id", "class", "tag", "custom") and value.
    //
    // Examples:
    //   ("id", "main")      -> "#main"
    //   ("class", "post")   -> ".post"
    //   ("custom", "div>p") -> "div>p"
    pub fn from_kind(kind: &str, value: &str, mode: SelectorMode) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        let selector = match kind {
            "id" => format!("#{}", value),
            "class" => format!(".{}", value),
            "tag" | "custom" => value.to_string(),
            _ => return None,
        };
        Some(Self {
            selector,
            mode,
            description: None,
        })
    }
}

// Snapshot response headers as plain strings; non-UTF-8 values are skipped.
pub(crate) fn header_snapshot(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
        .collect()
}
