//! webgrazer - polite, large-scale web crawler and content extractor
//!
//! Given a seed URL, discovers linked pages within the same hostname up to a
//! bounded depth, extracts cleaned text and structural metadata from each
//! page with a headless browser, and streams results to persistent storage.
//! Politeness (robots.txt, per-host rate limiting, circuit breaking) and
//! fault tolerance (classified retries, change detection, bounded queues)
//! are first-class concerns.

pub mod cancel;
pub mod change_detection;
pub mod circuit_breaker;
pub mod config;
pub mod domain_filter;
pub mod engine;
pub mod events;
pub mod fetcher;
pub mod queue;
pub mod rate_limiter;
pub mod retry;
pub mod robots;
pub mod scrape;
pub mod utils;
pub mod worker_pool;
pub mod writer;

pub use cancel::CancelToken;
pub use change_detection::{ChangeDecision, ChangeDetector, ChangeStatus, PageFingerprint};
pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use config::{CrawlConfig, CrawlConfigBuilder, OperationMode};
pub use domain_filter::{DomainFilter, FilterConfig};
pub use engine::{
    CrawlEngine, CrawlError, CrawlReport, CrawlRequest, CrawlResponse, DiscoveredUrl,
    HealthSnapshot, RequestError, RequestedFormat,
};
pub use events::{CrawlSignal, SignalBus};
pub use fetcher::{
    ChromiumFetcher, ChromiumFetcherFactory, ChromiumFetcherOptions, DomSnapshot, FetchError,
    FetchedPage, FetcherFactory, NavigateOptions, PageFetcher, RenderingMode,
};
pub use queue::{QueueConfig, UrlQueue, UrlTask};
pub use rate_limiter::{HostRateLimiter, RateLimitError, RateLimitGuard};
pub use retry::{ErrorClass, RetryController, RetryOutcome};
pub use robots::{RobotsPolicyCache, RobotsRules};
pub use scrape::{PageScraper, ScrapeStatus, ScrapedContent};
pub use worker_pool::{PageOutcome, SkipReason, WorkerPool};
pub use writer::{OutputFormat, StreamingWriter, WriterMeta};

/// Run a crawl with the default chromium-backed fetcher
///
/// Convenience wrapper over `CrawlEngine` for callers that do not need to
/// inject their own fetcher or observe signals mid-run.
pub async fn crawl(config: CrawlConfig) -> Result<CrawlReport, CrawlError> {
    let engine = CrawlEngine::new(config)?;
    let factory = ChromiumFetcherFactory::new(
        engine
            .config()
            .fetcher_options(engine.job_id()),
    );
    engine.run(&factory).await
}
