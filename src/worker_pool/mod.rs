//! Worker pool for parallel page processing
//!
//! Fans URL tasks out to `W` fetcher contexts, each running up to `C` pages
//! in parallel. Every task runs the same gauntlet: circuit breaker check,
//! rate-limiter acquisition (which verifies robots.txt), retry-wrapped
//! navigation, then scraping. Successes and failures feed back into the
//! circuit breaker.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Result;
use futures::future::join_all;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::circuit_breaker::CircuitBreaker;
use crate::fetcher::{FetchError, FetchedPage, FetcherFactory, NavigateOptions, PageFetcher};
use crate::queue::UrlTask;
use crate::rate_limiter::{HostRateLimiter, RateLimitError};
use crate::retry::RetryController;
use crate::scrape::{PageScraper, ScrapedContent};

/// Configuration for the worker pool
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of fetcher contexts
    pub workers: usize,
    /// Concurrent pages per worker
    pub per_worker_parallelism: usize,
    /// Options applied to every navigation
    pub navigate: NavigateOptions,
    /// Overall budget for one fetch attempt (navigation + extraction)
    pub handler_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: num_cpus::get().clamp(1, 8),
            per_worker_parallelism: 2,
            navigate: NavigateOptions::default(),
            handler_timeout: Duration::from_secs(60),
        }
    }
}

/// Shared services each task runs through
pub struct PoolContext {
    pub limiter: Arc<HostRateLimiter>,
    pub breaker: Arc<CircuitBreaker>,
    pub retry: Arc<RetryController>,
    pub scraper: PageScraper,
    pub cancel: CancelToken,
}

/// Why a task was skipped without fetching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    CircuitOpen,
    RobotsDisallowed,
    Cancelled,
}

impl SkipReason {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::CircuitOpen => "circuit-open",
            Self::RobotsDisallowed => "robots-disallowed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Result of processing one task
pub enum PageOutcome {
    /// Page fetched and scraped
    Fetched {
        task: UrlTask,
        page: FetchedPage,
        content: ScrapedContent,
    },
    /// Task skipped by policy before any fetch
    Skipped { task: UrlTask, reason: SkipReason },
    /// Fetch failed terminally after retries
    Failed {
        task: UrlTask,
        error: String,
        attempts: u32,
    },
}

struct Worker {
    id: usize,
    fetcher: Arc<dyn PageFetcher>,
}

/// Pool of fetcher-backed workers
pub struct WorkerPool {
    workers: Vec<Worker>,
    config: PoolConfig,
    ctx: Arc<PoolContext>,
}

impl WorkerPool {
    /// Spin up all fetcher contexts in parallel
    pub async fn initialize(
        factory: &dyn FetcherFactory,
        config: PoolConfig,
        ctx: PoolContext,
    ) -> Result<Self> {
        let creates = (0..config.workers.max(1)).map(|_| factory.create());
        let fetchers = futures::future::try_join_all(creates).await?;

        let workers = fetchers
            .into_iter()
            .enumerate()
            .map(|(id, fetcher)| Worker { id, fetcher })
            .collect::<Vec<_>>();
        info!("Worker pool initialized with {} workers", workers.len());

        Ok(Self {
            workers,
            config,
            ctx: Arc::new(ctx),
        })
    }

    /// Process a batch of tasks
    ///
    /// Tasks are distributed round-robin across workers; each worker runs
    /// its share in slices of `per_worker_parallelism` with full in-slice
    /// parallelism. `on_progress(completed, total, worker_id)` fires after
    /// every slice.
    pub async fn process<F>(&self, tasks: Vec<UrlTask>, on_progress: F) -> Vec<PageOutcome>
    where
        F: Fn(usize, usize, usize) + Send + Sync,
    {
        let total = tasks.len();
        let completed = AtomicUsize::new(0);

        // Round-robin distribution keeps per-host batches spread out
        let mut shares: Vec<Vec<UrlTask>> = (0..self.workers.len()).map(|_| Vec::new()).collect();
        for (i, task) in tasks.into_iter().enumerate() {
            shares[i % self.workers.len()].push(task);
        }

        let worker_futures = self.workers.iter().zip(shares).map(|(worker, share)| {
            let ctx = Arc::clone(&self.ctx);
            let on_progress = &on_progress;
            let completed = &completed;
            async move {
                let mut outcomes = Vec::with_capacity(share.len());
                for slice in share.chunks(self.config.per_worker_parallelism.max(1)) {
                    let slice_futures = slice.iter().map(|task| {
                        process_task(
                            Arc::clone(&ctx),
                            Arc::clone(&worker.fetcher),
                            task.clone(),
                            &self.config,
                        )
                    });
                    let slice_outcomes = join_all(slice_futures).await;
                    let done = completed.fetch_add(slice_outcomes.len(), Ordering::SeqCst)
                        + slice_outcomes.len();
                    outcomes.extend(slice_outcomes);
                    on_progress(done, total, worker.id);
                }
                outcomes
            }
        });

        join_all(worker_futures).await.into_iter().flatten().collect()
    }

    /// Stop all workers and release their fetcher contexts
    pub async fn shutdown(&self) {
        let closes = self.workers.iter().map(|worker| async move {
            if let Err(e) = worker.fetcher.close().await {
                warn!("Worker {} fetcher close failed: {e}", worker.id);
            }
        });
        join_all(closes).await;
        debug!("Worker pool shut down");
    }
}

/// Run one task through the full processing gauntlet
async fn process_task(
    ctx: Arc<PoolContext>,
    fetcher: Arc<dyn PageFetcher>,
    task: UrlTask,
    config: &PoolConfig,
) -> PageOutcome {
    if ctx.cancel.is_cancelled() {
        return PageOutcome::Skipped {
            task,
            reason: SkipReason::Cancelled,
        };
    }

    let decision = ctx.breaker.check(&task.url);
    if !decision.allowed {
        debug!(
            "Skipping {} ({})",
            task.url,
            decision.reason.as_deref().unwrap_or("circuit open")
        );
        return PageOutcome::Skipped {
            task,
            reason: SkipReason::CircuitOpen,
        };
    }

    let guard = match ctx.limiter.acquire(&task.url, &ctx.cancel).await {
        Ok(guard) => guard,
        Err(RateLimitError::RobotsDisallowed { .. }) => {
            return PageOutcome::Skipped {
                task,
                reason: SkipReason::RobotsDisallowed,
            };
        }
        Err(RateLimitError::Cancelled) => {
            return PageOutcome::Skipped {
                task,
                reason: SkipReason::Cancelled,
            };
        }
    };

    let handler_timeout = config.handler_timeout;
    let outcome = ctx
        .retry
        .execute("fetch", &ctx.cancel, || {
            let fetcher = Arc::clone(&fetcher);
            let url = task.url.clone();
            let opts = config.navigate.clone();
            async move {
                let attempt = async {
                    let page = fetcher.navigate(&url, &opts).await?;
                    if page.status_code >= 400 {
                        return Err(FetchError::HttpStatus {
                            status: page.status_code,
                            url: url.clone(),
                        });
                    }
                    Ok(page)
                };
                match tokio::time::timeout(handler_timeout, attempt).await {
                    Ok(result) => result.map_err(anyhow::Error::new),
                    Err(_) => Err(anyhow::Error::new(FetchError::Timeout {
                        seconds: handler_timeout.as_secs(),
                    })),
                }
            }
        })
        .await;
    guard.release();

    match outcome.value {
        Some(page) => {
            ctx.breaker.record_success(&task.url);
            let content = ctx
                .scraper
                .scrape(&task.url, task.depth, task.parent_url.clone(), &page);
            PageOutcome::Fetched {
                task,
                page,
                content,
            }
        }
        None => {
            let error = outcome
                .error
                .unwrap_or_else(|| "unknown fetch failure".to_string());
            ctx.breaker.record_failure(&task.url, &error);
            PageOutcome::Failed {
                task,
                error,
                attempts: outcome.attempts,
            }
        }
    }
}
