//! Page fetching capability
//!
//! The crawler drives pages through the `PageFetcher` trait: an injected
//! capability that navigates a URL and hands back the response metadata, the
//! raw HTML and (when the fetcher can evaluate scripts in-page) a pre-cleaned
//! DOM snapshot assembled in a single traversal. The default implementation
//! is chromiumoxide-backed; tests inject their own.

pub mod chromium;
pub mod js;

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use chromium::{ChromiumFetcher, ChromiumFetcherFactory, ChromiumFetcherOptions};

/// Errors surfaced by page fetchers
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("HTTP {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("navigation timed out after {seconds}s")]
    Timeout { seconds: u64 },
    #[error("navigation failed: {0}")]
    Navigation(String),
    #[error("browser error: {0}")]
    Browser(String),
    #[error("fetch cancelled")]
    Cancelled,
}

impl FetchError {
    /// HTTP status carried by this error, when any
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Stable short name for per-kind counters
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::HttpStatus { .. } => "http_status",
            Self::Timeout { .. } => "timeout",
            Self::Navigation(_) => "navigation",
            Self::Browser(_) => "browser",
            Self::Cancelled => "cancelled",
        }
    }
}

/// How long to wait for a page before extracting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderingMode {
    /// DOMContentLoaded only
    Fast,
    /// Network idle, capped at 15 s, falling back to DOMContentLoaded
    Complete,
    /// DOMContentLoaded; wait for network idle (max 10 s) only when the
    /// rendered text is shorter than the configured minimum
    Adaptive,
}

impl FromStr for RenderingMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "fast" => Ok(Self::Fast),
            "complete" => Ok(Self::Complete),
            "adaptive" => Ok(Self::Adaptive),
            other => anyhow::bail!("Unknown rendering mode: {other}"),
        }
    }
}

/// Per-navigation options
#[derive(Debug, Clone)]
pub struct NavigateOptions {
    pub timeout: Duration,
    pub rendering_mode: RenderingMode,
    /// Threshold for the adaptive mode's second wait
    pub min_content_length: usize,
}

impl Default for NavigateOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            rendering_mode: RenderingMode::Adaptive,
            min_content_length: 200,
        }
    }
}

/// Pre-extracted DOM data assembled in-page in one traversal
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomSnapshot {
    pub title: String,
    pub headings: Vec<String>,
    pub links: Vec<String>,
    pub text: String,
    pub cleaned_html: String,
}

/// Everything a navigation produced
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub status_code: u16,
    /// First `;`-delimited token of the Content-Type header
    pub content_type: Option<String>,
    /// ETag with any weak `W/` prefix stripped
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub final_url: String,
    pub html: String,
    /// Present when the fetcher ran the in-page extraction script
    pub dom: Option<DomSnapshot>,
    pub fetch_duration: Duration,
}

/// Injected page fetching capability
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Navigate to `url` and return the loaded page
    async fn navigate(&self, url: &str, opts: &NavigateOptions) -> Result<FetchedPage, FetchError>;

    /// Release the underlying context
    async fn close(&self) -> Result<(), FetchError>;
}

/// Creates fetcher contexts for the worker pool
#[async_trait]
pub trait FetcherFactory: Send + Sync {
    async fn create(&self) -> anyhow::Result<std::sync::Arc<dyn PageFetcher>>;
}
