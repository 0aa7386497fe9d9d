//! Scraped content record types
//!
//! `ScrapedContent` is the contract surface written to the result stream and
//! consumed by downstream renderers. Field names serialise in camelCase to
//! match the persisted wire format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Terminal status of one page scrape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScrapeStatus {
    Success,
    Failed,
    /// Content extracted but a secondary step (language, hash, links) failed
    Partial,
}

/// Metadata attached to every scraped page
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeMetadata {
    pub crawled_at: DateTime<Utc>,
    pub scraped_at: DateTime<Utc>,
    pub fetch_duration_ms: u64,
    pub depth: u32,
    pub parent_url: Option<String>,
    pub status_code: u16,
    pub content_type: Option<String>,
    pub word_count: usize,
    /// ISO 639-1 code, or "unknown" when detection was impossible
    pub language: String,
    /// First 16 hex chars of the SHA-256 of the body text; empty for an
    /// empty body
    pub content_hash: String,
    pub status: ScrapeStatus,
    pub error_message: Option<String>,
}

/// Cleaned, extracted content of one page
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapedContent {
    pub url: String,
    pub title: String,
    /// Text of every h1-h6, in document order
    pub headings: Vec<String>,
    /// Whitespace-normalised plain text of the main content region
    pub body_text: String,
    /// Deduplicated outbound absolute HTTP(S) links
    pub links: Vec<String>,
    /// Inner HTML of the main content region after cleaning
    pub cleaned_html: String,
    pub metadata: ScrapeMetadata,
}

impl ScrapedContent {
    /// A record for a page whose scrape failed entirely
    #[must_use]
    pub fn failed(url: String, depth: u32, parent_url: Option<String>, error: String) -> Self {
        let now = Utc::now();
        Self {
            url,
            title: String::new(),
            headings: Vec::new(),
            body_text: String::new(),
            links: Vec::new(),
            cleaned_html: String::new(),
            metadata: ScrapeMetadata {
                crawled_at: now,
                scraped_at: now,
                fetch_duration_ms: 0,
                depth,
                parent_url,
                status_code: 0,
                content_type: None,
                word_count: 0,
                language: "unknown".to_string(),
                content_hash: String::new(),
                status: ScrapeStatus::Failed,
                error_message: Some(error),
            },
        }
    }
}
