//! Crawl engine
//!
//! Single-pass orchestration of discovery and extraction: the seed enters
//! the queue at depth 0, workers pull batches through the politeness and
//! resilience layers, scraped content flows through change detection into
//! the streaming writer, and outbound links re-enter the queue one level
//! deeper. The queue's disjoint sets guarantee each URL is processed at
//! most once.

pub mod error;
pub mod request;
pub mod stats;

use std::sync::Arc;
use std::time::Instant;

use log::{debug, info, warn};
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::cancel::CancelToken;
use crate::change_detection::ChangeDetector;
use crate::circuit_breaker::CircuitBreaker;
use crate::config::{CrawlConfig, OperationMode};
use crate::domain_filter::DomainFilter;
use crate::events::{CrawlSignal, SignalBus};
use crate::fetcher::FetcherFactory;
use crate::queue::{UrlQueue, UrlTask};
use crate::rate_limiter::HostRateLimiter;
use crate::retry::RetryController;
use crate::robots::RobotsPolicyCache;
use crate::scrape::{PageScraper, ScrapedContent};
use crate::utils::host_of;
use crate::worker_pool::{PageOutcome, PoolContext, WorkerPool};
use crate::writer::StreamingWriter;

pub use error::CrawlError;
pub use request::{CrawlRequest, CrawlResponse, RequestError, RequestedFormat};
pub use stats::{CrawlReport, DiscoveredUrl, HealthSnapshot, LinkType};

/// Orchestrates one crawl run
pub struct CrawlEngine {
    config: CrawlConfig,
    job_id: String,
    filter: Arc<DomainFilter>,
    robots: Arc<RobotsPolicyCache>,
    limiter: Arc<HostRateLimiter>,
    breaker: Arc<CircuitBreaker>,
    retry: Arc<RetryController>,
    queue: Arc<UrlQueue>,
    change: Arc<ChangeDetector>,
    bus: Arc<SignalBus>,
    cancel: CancelToken,
    discovered: Mutex<Vec<DiscoveredUrl>>,
}

impl CrawlEngine {
    /// Wire up all subsystems for a run
    pub fn new(config: CrawlConfig) -> Result<Self, CrawlError> {
        let job_id = config
            .job_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let bus = Arc::new(SignalBus::default());
        let robots = Arc::new(
            RobotsPolicyCache::new(config.robots_config())
                .map_err(|e| CrawlError::Config(e.to_string()))?,
        );

        Ok(Self {
            filter: Arc::new(DomainFilter::new(config.filter.clone())),
            limiter: Arc::new(HostRateLimiter::new(
                config.rate_limiter_config(),
                Arc::clone(&robots),
            )),
            breaker: Arc::new(CircuitBreaker::new(config.circuit_breaker_config())),
            retry: Arc::new(RetryController::new(config.retry_config())),
            queue: Arc::new(UrlQueue::new(config.queue_config()).with_bus(Arc::clone(&bus))),
            change: Arc::new(ChangeDetector::new(config.change_detection_config())),
            robots,
            bus,
            cancel: CancelToken::new(),
            discovered: Mutex::new(Vec::new()),
            job_id,
            config,
        })
    }

    /// Token for cancelling this run from outside
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Subscribe to this run's signals
    #[must_use]
    pub fn signals(&self) -> broadcast::Receiver<CrawlSignal> {
        self.bus.subscribe()
    }

    /// Job id of this run
    #[must_use]
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// The configuration this engine was built with
    #[must_use]
    pub fn config(&self) -> &CrawlConfig {
        &self.config
    }

    /// Aggregated subsystem counters
    #[must_use]
    pub fn health(&self) -> HealthSnapshot {
        HealthSnapshot {
            circuits: self.breaker.stats(),
            rate_limiter: self.limiter.stats(),
            retry: self.retry.stats(),
            filter: self.filter.stats(),
            queue: self.queue.stats(),
        }
    }

    /// Discovery records accumulated during the run
    #[must_use]
    pub fn discovered_urls(&self) -> Vec<DiscoveredUrl> {
        self.discovered.lock().clone()
    }

    /// Run the crawl to completion (or cancellation)
    pub async fn run(&self, factory: &dyn FetcherFactory) -> Result<CrawlReport, CrawlError> {
        let started = Instant::now();
        let seed_url = self.config.seed_url.clone();

        let seed_decision = self.filter.allow(&seed_url, None);
        if !seed_decision.allowed {
            let reason = seed_decision
                .reason
                .map_or("rejected", |r| r.as_str());
            return Err(CrawlError::InvalidSeed(format!("{seed_url} ({reason})")));
        }
        let Some(seed_host) = host_of(&seed_url) else {
            return Err(CrawlError::InvalidSeed(seed_url));
        };

        let max_depth = self.effective_max_depth();
        info!(
            "Starting crawl {} of {seed_url} (depth {max_depth}, mode {:?})",
            self.job_id, self.config.operation_mode
        );

        // Warm the robots cache before workers hit the host
        let _ = self.robots.rules_for(&seed_url).await;
        self.change.ensure_host_loaded(&seed_host).await;

        let writer = StreamingWriter::create(&self.job_id, self.config.writer_config())
            .await
            .map_err(|e| CrawlError::Writer(e.to_string()))?;

        let pool = WorkerPool::initialize(
            factory,
            self.config.pool_config(),
            PoolContext {
                limiter: Arc::clone(&self.limiter),
                breaker: Arc::clone(&self.breaker),
                retry: Arc::clone(&self.retry),
                scraper: PageScraper::new(),
                cancel: self.cancel.clone(),
            },
        )
        .await?;

        self.queue.add(&seed_url, 0, None, None);

        let mut processed = 0usize;
        let mut skipped = 0usize;
        let mut unchanged = 0usize;
        let mut failed = 0usize;
        let mut page_time_total_ms = 0u64;
        let mut run_error: Option<CrawlError> = None;

        'crawl: loop {
            if self.cancel.is_cancelled() {
                info!("Crawl {} cancelled, draining", self.job_id);
                break;
            }
            if processed + unchanged >= self.config.max_requests {
                info!("Crawl {} reached page limit", self.job_id);
                break;
            }

            let batch = self.queue.get_batch();
            if batch.is_empty() {
                if self.queue.in_progress_len() == 0 {
                    self.queue.mark_discovery_complete();
                }
                if self.queue.is_finished() {
                    break;
                }
                continue;
            }

            let outcomes = pool
                .process(batch, |done, total, worker_id| {
                    debug!("worker {worker_id}: {done}/{total} of batch complete");
                })
                .await;

            for outcome in outcomes {
                match self
                    .handle_outcome(outcome, &seed_host, max_depth, &writer)
                    .await
                {
                    Ok(HandledOutcome::Processed(ms)) => {
                        processed += 1;
                        page_time_total_ms += ms;
                    }
                    Ok(HandledOutcome::Unchanged) => unchanged += 1,
                    Ok(HandledOutcome::Skipped) => skipped += 1,
                    Ok(HandledOutcome::Failed) => failed += 1,
                    Err(e) => {
                        // Writer failure after open ends the whole run
                        run_error = Some(e);
                        break 'crawl;
                    }
                }
            }

            self.bus.publish(CrawlSignal::progress(
                self.queue.stats().added as usize,
                processed,
                failed,
            ));
        }

        // Best-effort teardown in a fixed order: fingerprints, writer, pool
        if let Err(e) = self.change.persist_all().await {
            warn!("Fingerprint persistence failed: {e:#}");
            run_error.get_or_insert(CrawlError::Fingerprints(e.to_string()));
        }
        let total_results = match writer.close().await {
            Ok(meta) => meta.total_results,
            Err(e) => {
                warn!("Writer close failed: {e:#}");
                run_error.get_or_insert(CrawlError::Writer(e.to_string()));
                0
            }
        };
        pool.shutdown().await;

        if let Some(e) = run_error {
            return Err(e);
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        let report = CrawlReport {
            job_id: self.job_id.clone(),
            seed_url,
            discovered: self.queue.stats().added as usize,
            processed,
            skipped,
            unchanged,
            failed,
            duration_ms,
            avg_page_time_ms: if processed > 0 {
                page_time_total_ms / processed as u64
            } else {
                0
            },
            pages_per_second: if duration_ms > 0 {
                processed as f64 / (duration_ms as f64 / 1000.0)
            } else {
                0.0
            },
            output_path: writer.path().to_path_buf(),
            total_results,
        };
        info!(
            "Crawl {} finished: {} processed, {} unchanged, {} skipped, {} failed in {}ms",
            report.job_id, report.processed, report.unchanged, report.skipped, report.failed,
            report.duration_ms
        );
        Ok(report)
    }

    async fn handle_outcome(
        &self,
        outcome: PageOutcome,
        seed_host: &str,
        max_depth: u32,
        writer: &StreamingWriter,
    ) -> Result<HandledOutcome, CrawlError> {
        match outcome {
            PageOutcome::Fetched {
                task,
                page,
                content,
            } => {
                let decision = self
                    .change
                    .check(&task.url, page.etag.as_deref(), page.last_modified.as_deref())
                    .await;

                self.record_discovery(&task, seed_host, Some(&page), None);

                if !decision.recrawl {
                    debug!(
                        "Unchanged ({}): {}",
                        decision.reason.unwrap_or("validator"),
                        task.url
                    );
                    self.queue.complete(&task.url);
                    // Outbound links still feed discovery so an unchanged hub
                    // page cannot hide new children
                    self.enqueue_links(&task, &content.links, seed_host, max_depth);
                    return Ok(HandledOutcome::Unchanged);
                }

                self.change
                    .update(
                        &task.url,
                        &content.body_text,
                        &content.links,
                        &content.headings,
                        page.etag.as_deref(),
                        page.last_modified.as_deref(),
                    )
                    .await;

                let record = self.record_for_mode(content);
                writer
                    .write(&record)
                    .await
                    .map_err(|e| CrawlError::Writer(e.to_string()))?;

                self.queue.complete(&task.url);
                self.enqueue_links(&task, &record.links, seed_host, max_depth);
                Ok(HandledOutcome::Processed(page.fetch_duration.as_millis() as u64))
            }
            PageOutcome::Skipped { task, reason } => {
                debug!("Skipped ({}): {}", reason.as_str(), task.url);
                self.record_discovery(&task, seed_host, None, Some(reason.as_str().to_string()));
                self.queue.complete(&task.url);
                Ok(HandledOutcome::Skipped)
            }
            PageOutcome::Failed {
                task,
                error,
                attempts,
            } => {
                warn!("Failed after {attempts} attempts: {} ({error})", task.url);
                self.record_discovery(&task, seed_host, None, Some(error.clone()));
                self.queue.fail(&task.url, &error, false);
                Ok(HandledOutcome::Failed)
            }
        }
    }

    /// Filter and enqueue a page's outbound links one level deeper
    fn enqueue_links(&self, task: &UrlTask, links: &[String], seed_host: &str, max_depth: u32) {
        if !self.discovery_enabled() || task.depth >= max_depth {
            return;
        }
        for link in links {
            if self.filter.allow(link, Some(seed_host)).allowed {
                self.queue
                    .add(link, task.depth + 1, Some(task.url.clone()), None);
            }
        }
    }

    fn record_discovery(
        &self,
        task: &UrlTask,
        seed_host: &str,
        page: Option<&crate::fetcher::FetchedPage>,
        skip_reason: Option<String>,
    ) {
        let link_type = if task.host == seed_host || task.host.ends_with(&format!(".{seed_host}"))
        {
            LinkType::Internal
        } else {
            LinkType::External
        };
        self.discovered.lock().push(DiscoveredUrl {
            url: task.url.clone(),
            depth: task.depth,
            parent_url: task.parent_url.clone(),
            status_code: page.map(|p| p.status_code),
            content_type: page.and_then(|p| p.content_type.clone()),
            discovered_at: task.enqueued_at,
            fetch_duration_ms: page.map(|p| p.fetch_duration.as_millis() as u64),
            link_type,
            skip_reason,
        });
    }

    /// Strip the body for discovery-only runs
    fn record_for_mode(&self, mut content: ScrapedContent) -> ScrapedContent {
        if self.config.operation_mode == OperationMode::CrawlOnly {
            content.body_text = String::new();
            content.cleaned_html = String::new();
        }
        content
    }

    fn discovery_enabled(&self) -> bool {
        self.config.include_subpages
            && self.config.operation_mode != OperationMode::ScrapeOnly
    }

    fn effective_max_depth(&self) -> u32 {
        if !self.discovery_enabled() {
            return 0;
        }
        self.config.max_depth.min(request::MAX_ENGINE_DEPTH)
    }
}

enum HandledOutcome {
    /// Page emitted; carries the fetch duration in milliseconds
    Processed(u64),
    Unchanged,
    Skipped,
    Failed,
}
