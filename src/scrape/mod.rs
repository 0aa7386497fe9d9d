//! Content scraper
//!
//! Turns a fetched page into a `ScrapedContent` record: cleaned body text,
//! headings, deduplicated outbound links, word count, detected language and
//! a content hash. Prefers the fetcher's in-page DOM snapshot; falls back to
//! server-side cleaning of the raw HTML with identical semantics.

pub mod clean;
pub mod language;
pub mod schema;
pub mod text;

use chrono::Utc;
use log::warn;

use crate::fetcher::FetchedPage;

pub use clean::{DomExtract, extract_from_html};
pub use language::detect_language;
pub use schema::{ScrapeMetadata, ScrapeStatus, ScrapedContent};
pub use text::{content_hash, normalize_text, word_count};

/// Stateless scraper over fetched pages
#[derive(Debug, Clone, Copy, Default)]
pub struct PageScraper;

impl PageScraper {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Build the content record for a fetched page
    ///
    /// Never fails: extraction errors yield a record with `Failed` status
    /// and an error message, secondary failures yield `Partial`.
    #[must_use]
    pub fn scrape(
        &self,
        url: &str,
        depth: u32,
        parent_url: Option<String>,
        page: &FetchedPage,
    ) -> ScrapedContent {
        let crawled_at = Utc::now()
            - chrono::Duration::milliseconds(page.fetch_duration.as_millis() as i64);

        let extract = match &page.dom {
            Some(snapshot) => DomExtract {
                title: snapshot.title.clone(),
                headings: snapshot.headings.clone(),
                links: dedupe_http_links(&snapshot.links),
                text: text::normalize_text(&snapshot.text),
                cleaned_html: snapshot.cleaned_html.clone(),
                partial_error: None,
            },
            None => match clean::extract_from_html(&page.html, &page.final_url) {
                Ok(extract) => extract,
                Err(e) => {
                    warn!("Scrape failed for {url}: {e:#}");
                    let mut record =
                        ScrapedContent::failed(url.to_string(), depth, parent_url, format!("{e:#}"));
                    record.metadata.status_code = page.status_code;
                    record.metadata.content_type = page.content_type.clone();
                    record.metadata.fetch_duration_ms = page.fetch_duration.as_millis() as u64;
                    return record;
                }
            },
        };

        let body_text = extract.text;
        let status = if extract.partial_error.is_some() {
            ScrapeStatus::Partial
        } else {
            ScrapeStatus::Success
        };

        ScrapedContent {
            url: url.to_string(),
            title: extract.title,
            headings: extract.headings,
            links: extract.links,
            cleaned_html: extract.cleaned_html,
            metadata: ScrapeMetadata {
                crawled_at,
                scraped_at: Utc::now(),
                fetch_duration_ms: page.fetch_duration.as_millis() as u64,
                depth,
                parent_url,
                status_code: page.status_code,
                content_type: page.content_type.clone(),
                word_count: text::word_count(&body_text),
                language: language::detect_language(&body_text).to_string(),
                content_hash: text::content_hash(&body_text),
                status,
                error_message: extract.partial_error,
            },
            body_text,
        }
    }
}

/// Keep valid absolute HTTP(S) links, first occurrence only
fn dedupe_http_links(links: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    links
        .iter()
        .filter(|l| crate::utils::is_valid_url(l))
        .filter(|l| seen.insert(l.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::DomSnapshot;
    use std::time::Duration;

    fn page_with_html(html: &str) -> FetchedPage {
        FetchedPage {
            status_code: 200,
            content_type: Some("text/html".to_string()),
            etag: None,
            last_modified: None,
            final_url: "https://example.com/".to_string(),
            html: html.to_string(),
            dom: None,
            fetch_duration: Duration::from_millis(42),
        }
    }

    #[test]
    fn test_scrape_from_raw_html() {
        let scraper = PageScraper::new();
        let page = page_with_html(
            "<html><head><title>T</title></head><body><main>\
             <h1>Head</h1><p>The content of the page is here and it is good.</p>\
             </main></body></html>",
        );

        let record = scraper.scrape("https://example.com/", 0, None, &page);
        assert_eq!(record.metadata.status, ScrapeStatus::Success);
        assert_eq!(record.title, "T");
        assert_eq!(record.headings, vec!["Head"]);
        assert_eq!(record.metadata.language, "en");
        assert!(record.metadata.word_count > 5);
        assert_eq!(record.metadata.content_hash.len(), 16);
        assert_eq!(record.metadata.status_code, 200);
    }

    #[test]
    fn test_scrape_prefers_dom_snapshot() {
        let scraper = PageScraper::new();
        let mut page = page_with_html("<html><body>ignored</body></html>");
        page.dom = Some(DomSnapshot {
            title: "Snapshot title".to_string(),
            headings: vec!["H".to_string()],
            links: vec![
                "https://example.com/a".to_string(),
                "https://example.com/a".to_string(),
                "ftp://example.com/skip".to_string(),
            ],
            text: "  snapshot   text  ".to_string(),
            cleaned_html: "<p>snapshot text</p>".to_string(),
        });

        let record = scraper.scrape("https://example.com/", 1, None, &page);
        assert_eq!(record.title, "Snapshot title");
        assert_eq!(record.body_text, "snapshot text");
        assert_eq!(record.links, vec!["https://example.com/a".to_string()]);
    }

    #[test]
    fn test_empty_body_hash_is_empty() {
        let scraper = PageScraper::new();
        let page = page_with_html("<html><body><main></main></body></html>");
        let record = scraper.scrape("https://example.com/", 0, None, &page);
        assert_eq!(record.metadata.content_hash, "");
        assert_eq!(record.metadata.word_count, 0);
    }
}
