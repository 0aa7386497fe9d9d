//! Operator request adapter
//!
//! Validates a start-crawl request at the boundary and converts it into an
//! engine configuration. Validation failures carry a human-readable message
//! for the caller's 400-style response.

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::config::{CrawlConfig, OperationMode};
use crate::writer::OutputFormat;

use super::stats::CrawlReport;

/// Depth ceiling enforced by engine policy regardless of the request
pub const MAX_ENGINE_DEPTH: u32 = 5;

/// Largest depth a request may even ask for
pub const MAX_REQUEST_DEPTH: u32 = 10;

/// Rendered output shapes an operator may ask for
///
/// The renderers themselves live outside this crate; the engine only needs
/// to pick the stream encoding that feeds them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestedFormat {
    Json,
    Markdown,
    Summary,
    LinksOnly,
    Html,
}

impl RequestedFormat {
    /// Stream encoding backing this rendered format
    #[must_use]
    pub const fn stream_format(&self) -> OutputFormat {
        match self {
            Self::Json => OutputFormat::Json,
            Self::Markdown | Self::Summary | Self::LinksOnly | Self::Html => OutputFormat::Jsonl,
        }
    }
}

impl FromStr for RequestedFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_uppercase().as_str() {
            "JSON" => Ok(Self::Json),
            "MARKDOWN" => Ok(Self::Markdown),
            "SUMMARY" => Ok(Self::Summary),
            "LINKS_ONLY" => Ok(Self::LinksOnly),
            "HTML" => Ok(Self::Html),
            other => anyhow::bail!("Unknown output format: {other}"),
        }
    }
}

/// Start-crawl request from the admin surface
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlRequest {
    pub seed_url: String,
    pub include_subpages: bool,
    pub depth: u32,
    pub operation_mode: OperationMode,
    pub output_format: RequestedFormat,
    pub university_name: Option<String>,
    pub process_id: Option<String>,
}

/// Validation failure with a human-readable message
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct RequestError {
    pub message: String,
}

impl RequestError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl CrawlRequest {
    /// Validate the request fields
    pub fn validate(&self) -> Result<(), RequestError> {
        let parsed = Url::parse(&self.seed_url)
            .map_err(|e| RequestError::new(format!("seedUrl is not a valid URL: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(RequestError::new(format!(
                "seedUrl must be http or https, got {}",
                parsed.scheme()
            )));
        }
        if parsed.host_str().is_none() {
            return Err(RequestError::new("seedUrl has no host"));
        }
        if self.depth > MAX_REQUEST_DEPTH {
            return Err(RequestError::new(format!(
                "depth must be between 0 and {MAX_REQUEST_DEPTH}, got {}",
                self.depth
            )));
        }
        Ok(())
    }

    /// Apply this request on top of a base configuration
    ///
    /// The requested depth is clamped to the engine's own ceiling.
    pub fn into_config(self, base: CrawlConfig) -> Result<CrawlConfig, RequestError> {
        self.validate()?;
        let mut config = base;
        config.seed_url = self.seed_url;
        config.include_subpages = self.include_subpages;
        config.max_depth = self.depth.min(MAX_ENGINE_DEPTH);
        config.operation_mode = self.operation_mode;
        config.output_format = self.output_format.stream_format();
        config.job_id = self.process_id;
        Ok(config)
    }
}

/// Successful start-crawl response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlResponse {
    pub success: bool,
    pub process_id: String,
    pub counts: ResponseCounts,
    pub performance: ResponsePerformance,
    pub output_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseCounts {
    pub discovered: usize,
    pub processed: usize,
    pub skipped: usize,
    pub unchanged: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponsePerformance {
    pub duration_ms: u64,
    pub avg_page_time_ms: u64,
    pub pages_per_second: f64,
}

impl From<&CrawlReport> for CrawlResponse {
    fn from(report: &CrawlReport) -> Self {
        Self {
            success: true,
            process_id: report.job_id.clone(),
            counts: ResponseCounts {
                discovered: report.discovered,
                processed: report.processed,
                skipped: report.skipped,
                unchanged: report.unchanged,
                failed: report.failed,
            },
            performance: ResponsePerformance {
                duration_ms: report.duration_ms,
                avg_page_time_ms: report.avg_page_time_ms,
                pages_per_second: report.pages_per_second,
            },
            output_path: report.output_path.clone(),
        }
    }
}
