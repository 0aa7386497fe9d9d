//! Core configuration types for crawl runs
//!
//! `CrawlConfig` carries everything one engine run needs, grouped the way
//! operators tune it: crawler scale, politeness and resilience. Derivation
//! methods translate the flat config into each subsystem's own config type.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::change_detection::ChangeDetectionConfig;
use crate::circuit_breaker::CircuitBreakerConfig;
use crate::domain_filter::FilterConfig;
use crate::fetcher::{ChromiumFetcherOptions, NavigateOptions, RenderingMode};
use crate::queue::QueueConfig;
use crate::rate_limiter::RateLimiterConfig;
use crate::retry::RetryConfig;
use crate::robots::RobotsConfig;
use crate::worker_pool::PoolConfig;
use crate::writer::{OutputFormat, WriterConfig};

/// What a crawl run does with each page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationMode {
    /// Discovery only - records carry links and metadata but no body
    CrawlOnly,
    /// Scrape the seed page only, no discovery
    ScrapeOnly,
    /// Full discovery and extraction
    CrawlAndScrape,
}

impl FromStr for OperationMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_uppercase().as_str() {
            "CRAWL_ONLY" => Ok(Self::CrawlOnly),
            "SCRAPE_ONLY" => Ok(Self::ScrapeOnly),
            "CRAWL_AND_SCRAPE" => Ok(Self::CrawlAndScrape),
            other => anyhow::bail!("Unknown operation mode: {other}"),
        }
    }
}

/// Politeness tunables (per-host pacing and robots handling)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolitenessConfig {
    /// Delay applied when robots.txt declares none
    pub delay_ms: u64,
    /// Lower clamp for robots-declared delays
    pub min_delay_ms: u64,
    /// Upper clamp for robots-declared delays
    pub max_delay_ms: u64,
    pub respect_robots: bool,
    pub user_agent: String,
    pub robots_cache_ttl_secs: u64,
    pub robots_timeout_secs: u64,
    pub max_concurrent_per_domain: usize,
}

impl Default for PolitenessConfig {
    fn default() -> Self {
        Self {
            delay_ms: 500,
            min_delay_ms: 100,
            max_delay_ms: 30_000,
            respect_robots: true,
            user_agent: "webgrazer/0.4 (+https://webgrazer.dev/bot)".to_string(),
            robots_cache_ttl_secs: 3600,
            robots_timeout_secs: 10,
            max_concurrent_per_domain: 2,
        }
    }
}

/// Resilience tunables (retries and circuit breaking)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilienceConfig {
    pub max_retries: u32,
    pub retry_initial_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub retry_backoff_multiplier: f64,
    pub retry_jitter: f64,
    /// Retry errors that cannot be classified
    pub retry_unknown_errors: bool,
    /// Overall budget for one request attempt, in milliseconds; overrides
    /// the handler timeout when set
    pub request_timeout_ms: Option<u64>,
    pub circuit_breaker_enabled: bool,
    pub circuit_breaker_threshold: usize,
    pub circuit_breaker_window_ms: u64,
    pub circuit_breaker_reset_ms: u64,
    pub circuit_breaker_success_threshold: u32,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_initial_delay_ms: 1000,
            retry_max_delay_ms: 30_000,
            retry_backoff_multiplier: 2.0,
            retry_jitter: 0.2,
            retry_unknown_errors: true,
            request_timeout_ms: None,
            circuit_breaker_enabled: true,
            circuit_breaker_threshold: 5,
            circuit_breaker_window_ms: 60_000,
            circuit_breaker_reset_ms: 300_000,
            circuit_breaker_success_threshold: 2,
        }
    }
}

/// Full configuration for one crawl run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlConfig {
    pub seed_url: String,
    pub include_subpages: bool,
    pub operation_mode: OperationMode,
    /// Explicit job id; a v4 UUID is minted when absent
    pub job_id: Option<String>,

    // Crawler scale
    /// Hard cap on processed pages for the run
    pub max_requests: usize,
    /// Number of fetcher contexts (workers)
    pub discovery_concurrency: usize,
    /// Concurrent pages per worker
    pub pages_per_worker: usize,
    pub nav_timeout_secs: u64,
    pub handler_timeout_secs: u64,
    pub max_depth: u32,
    pub headless: bool,
    pub rendering_mode: RenderingMode,
    pub min_content_length: usize,

    pub politeness: PolitenessConfig,
    pub resilience: ResilienceConfig,
    pub filter: FilterConfig,

    // Queue bounds
    pub queue_max_size: usize,
    pub queue_batch_size: usize,
    pub domain_batch_size: usize,

    // Output
    pub output_format: OutputFormat,
    pub results_dir: PathBuf,
    pub fingerprint_dir: PathBuf,
    /// Per-run working directory for the fetcher
    pub storage_dir: PathBuf,
    pub fingerprint_max_age_secs: u64,
    pub writer_flush_every: usize,
    pub writer_max_buffer: usize,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            seed_url: String::new(),
            include_subpages: true,
            operation_mode: OperationMode::CrawlAndScrape,
            job_id: None,
            max_requests: 50_000,
            discovery_concurrency: num_cpus::get().clamp(1, 8),
            pages_per_worker: 2,
            nav_timeout_secs: 30,
            handler_timeout_secs: 60,
            max_depth: 3,
            headless: true,
            rendering_mode: RenderingMode::Adaptive,
            min_content_length: 200,
            politeness: PolitenessConfig::default(),
            resilience: ResilienceConfig::default(),
            filter: FilterConfig::default(),
            queue_max_size: 100_000,
            queue_batch_size: 50,
            domain_batch_size: 5,
            output_format: OutputFormat::Jsonl,
            results_dir: PathBuf::from("./data/results"),
            fingerprint_dir: PathBuf::from("./data/fingerprints"),
            storage_dir: PathBuf::from("./storage"),
            fingerprint_max_age_secs: 7 * 24 * 3600,
            writer_flush_every: 25,
            writer_max_buffer: 200,
        }
    }
}

impl CrawlConfig {
    #[must_use]
    pub fn robots_config(&self) -> RobotsConfig {
        RobotsConfig {
            respect_robots: self.politeness.respect_robots,
            user_agent: self.politeness.user_agent.clone(),
            timeout_secs: self.politeness.robots_timeout_secs,
            cache_ttl_secs: self.politeness.robots_cache_ttl_secs,
            default_delay_ms: self.politeness.delay_ms,
            min_delay_ms: self.politeness.min_delay_ms,
            max_delay_ms: self.politeness.max_delay_ms,
        }
    }

    #[must_use]
    pub fn rate_limiter_config(&self) -> RateLimiterConfig {
        RateLimiterConfig {
            max_concurrent_per_host: self.politeness.max_concurrent_per_domain,
        }
    }

    #[must_use]
    pub fn circuit_breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            enabled: self.resilience.circuit_breaker_enabled,
            failure_threshold: self.resilience.circuit_breaker_threshold,
            failure_window: Duration::from_millis(self.resilience.circuit_breaker_window_ms),
            reset_timeout: Duration::from_millis(self.resilience.circuit_breaker_reset_ms),
            success_threshold: self.resilience.circuit_breaker_success_threshold,
        }
    }

    #[must_use]
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.resilience.max_retries,
            initial_delay_ms: self.resilience.retry_initial_delay_ms,
            max_delay_ms: self.resilience.retry_max_delay_ms,
            backoff_multiplier: self.resilience.retry_backoff_multiplier,
            jitter: self.resilience.retry_jitter,
            retry_unknown_errors: self.resilience.retry_unknown_errors,
        }
    }

    #[must_use]
    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            max_size: self.queue_max_size,
            batch_size: self.queue_batch_size,
            domain_batch_size: self.domain_batch_size,
        }
    }

    #[must_use]
    pub fn change_detection_config(&self) -> ChangeDetectionConfig {
        ChangeDetectionConfig {
            cache_dir: self.fingerprint_dir.clone(),
            max_age: Duration::from_secs(self.fingerprint_max_age_secs),
        }
    }

    #[must_use]
    pub fn writer_config(&self) -> WriterConfig {
        WriterConfig {
            output_dir: self.results_dir.clone(),
            format: self.output_format,
            flush_every: self.writer_flush_every,
            max_buffer: self.writer_max_buffer,
        }
    }

    #[must_use]
    pub fn pool_config(&self) -> PoolConfig {
        let handler_timeout = self.resilience.request_timeout_ms.map_or(
            Duration::from_secs(self.handler_timeout_secs),
            Duration::from_millis,
        );
        PoolConfig {
            workers: self.discovery_concurrency.max(1),
            per_worker_parallelism: self.pages_per_worker.max(1),
            navigate: NavigateOptions {
                timeout: Duration::from_secs(self.nav_timeout_secs),
                rendering_mode: self.rendering_mode,
                min_content_length: self.min_content_length,
            },
            handler_timeout,
        }
    }

    #[must_use]
    pub fn fetcher_options(&self, job_id: &str) -> ChromiumFetcherOptions {
        ChromiumFetcherOptions {
            headless: self.headless,
            user_data_dir: Some(self.storage_dir.join(job_id)),
            chrome_executable: None,
        }
    }
}
