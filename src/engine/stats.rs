//! Run statistics, discovery records and the health surface

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::circuit_breaker::CircuitBreakerStats;
use crate::domain_filter::FilterStats;
use crate::queue::QueueStats;
use crate::rate_limiter::RateLimitStats;
use crate::retry::RetryStats;

/// Whether a link stays on the seed host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkType {
    Internal,
    External,
}

/// A URL task annotated with its fetch outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredUrl {
    pub url: String,
    pub depth: u32,
    pub parent_url: Option<String>,
    pub status_code: Option<u16>,
    pub content_type: Option<String>,
    pub discovered_at: DateTime<Utc>,
    pub fetch_duration_ms: Option<u64>,
    pub link_type: LinkType,
    /// Why the URL was not fully processed, when it was not
    pub skip_reason: Option<String>,
}

/// Final report of one crawl run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlReport {
    pub job_id: String,
    pub seed_url: String,
    /// URLs accepted into the queue over the whole run
    pub discovered: usize,
    /// Pages fetched, scraped and emitted
    pub processed: usize,
    /// Pages skipped by policy (robots, circuit, cancellation)
    pub skipped: usize,
    /// Pages fetched but not re-emitted because they were unchanged
    pub unchanged: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub avg_page_time_ms: u64,
    pub pages_per_second: f64,
    pub output_path: PathBuf,
    /// Records in the output file (matches the writer meta)
    pub total_results: usize,
}

/// Aggregated subsystem counters for the health surface
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSnapshot {
    pub circuits: CircuitBreakerStats,
    pub rate_limiter: RateLimitStats,
    pub retry: RetryStats,
    pub filter: FilterStats,
    pub queue: QueueStats,
}
