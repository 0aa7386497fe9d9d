//! Server-side DOM cleaning and extraction
//!
//! Used when the fetcher hands back raw HTML without an in-page snapshot.
//! Replicates the in-browser extraction semantics against a kuchiki DOM:
//! the same removal selectors, the same main-region priority order and the
//! same link rules, so both paths produce equivalent records.

use anyhow::{Context, Result, anyhow};
use kuchiki::NodeRef;
use kuchiki::traits::TendrilSink;
use log::warn;
use url::Url;

use super::text::normalize_text;

/// Elements stripped from the cleaned DOM before text extraction
const REMOVAL_SELECTORS: &[&str] = &[
    "script",
    "style",
    "noscript",
    "iframe",
    "nav",
    "footer",
    "header",
    "aside",
    ".advertisement",
    ".ads",
    ".sidebar",
    ".cookie-banner",
    ".popup",
    "[role=\"banner\"]",
    "[role=\"navigation\"]",
    "[role=\"contentinfo\"]",
];

/// Main content region candidates, in priority order
const MAIN_SELECTORS: &[&str] = &[
    "main",
    "article",
    "[role=\"main\"]",
    ".content",
    "#content",
    "body",
];

/// Extraction result from raw HTML
#[derive(Debug, Clone)]
pub struct DomExtract {
    pub title: String,
    pub headings: Vec<String>,
    pub links: Vec<String>,
    pub text: String,
    pub cleaned_html: String,
    /// Set when a secondary step failed but the content itself was usable
    pub partial_error: Option<String>,
}

/// Clean `html` and extract the record fields
///
/// Relative links are resolved against `base_url` to match the in-browser
/// behavior where `a.href` is always absolute.
pub fn extract_from_html(html: &str, base_url: &str) -> Result<DomExtract> {
    let document = kuchiki::parse_html().one(html);
    let mut partial_error = None;

    let title = document
        .select_first("title")
        .map(|t| t.text_contents().trim().to_string())
        .unwrap_or_default();

    // Links come from the original DOM, before boilerplate removal
    let links = match extract_links(&document, base_url) {
        Ok(links) => links,
        Err(e) => {
            warn!("Link extraction failed: {e}");
            partial_error = Some(format!("link extraction failed: {e}"));
            Vec::new()
        }
    };

    for selector in REMOVAL_SELECTORS {
        let matches: Vec<NodeRef> = match document.select(selector) {
            Ok(selection) => selection.map(|m| m.as_node().clone()).collect(),
            Err(()) => {
                warn!("Invalid removal selector: {selector}");
                continue;
            }
        };
        for node in matches {
            node.detach();
        }
    }

    let headings = document
        .select("h1, h2, h3, h4, h5, h6")
        .map_err(|()| anyhow!("heading selector failed to parse"))?
        .map(|h| h.text_contents().trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();

    let main = select_main_region(&document);
    let text = normalize_text(&main.text_contents());
    let cleaned_html = inner_html(&main).context("Failed to serialize main region")?;

    Ok(DomExtract {
        title,
        headings,
        links,
        text,
        cleaned_html,
        partial_error,
    })
}

/// Every `a[href]` resolved to absolute form, HTTP(S) only, deduplicated in
/// document order
fn extract_links(document: &NodeRef, base_url: &str) -> Result<Vec<String>> {
    let base = Url::parse(base_url).with_context(|| format!("Invalid base URL {base_url}"))?;

    let anchors = document
        .select("a[href]")
        .map_err(|()| anyhow!("anchor selector failed to parse"))?;

    let mut seen = std::collections::HashSet::new();
    let mut links = Vec::new();
    for anchor in anchors {
        let attributes = anchor.attributes.borrow();
        let Some(href) = attributes.get("href") else {
            continue;
        };
        let Ok(resolved) = base.join(href) else {
            continue;
        };
        if !matches!(resolved.scheme(), "http" | "https") {
            continue;
        }
        let absolute = resolved.to_string();
        if seen.insert(absolute.clone()) {
            links.push(absolute);
        }
    }
    Ok(links)
}

fn select_main_region(document: &NodeRef) -> NodeRef {
    for selector in MAIN_SELECTORS {
        if let Ok(found) = document.select_first(selector) {
            return found.as_node().clone();
        }
    }
    document.clone()
}

/// Serialized inner HTML of a node
fn inner_html(node: &NodeRef) -> Result<String> {
    let mut bytes = Vec::new();
    for child in node.children() {
        child
            .serialize(&mut bytes)
            .context("Failed to serialize node")?;
    }
    Ok(String::from_utf8_lossy(&bytes).trim().to_string())
}
