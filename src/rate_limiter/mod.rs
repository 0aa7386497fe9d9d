//! Per-host request rate limiter
//!
//! Enforces the politeness contract for every host: a minimum inter-request
//! delay (robots-declared or default) and a cap on concurrent in-flight
//! requests. Acquisition verifies robots.txt first; a robots denial is a
//! non-retryable outcome surfaced to the caller.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use log::debug;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cancel::CancelToken;
use crate::robots::RobotsPolicyCache;
use crate::utils::host_of;

/// Configuration for the rate limiter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimiterConfig {
    /// Maximum concurrent in-flight requests per host
    pub max_concurrent_per_host: usize,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_concurrent_per_host: 2,
        }
    }
}

/// Why an acquisition was refused
#[derive(Debug, Clone, Error)]
pub enum RateLimitError {
    #[error("blocked by robots.txt: {url}")]
    RobotsDisallowed { url: String },
    #[error("rate limiter acquisition cancelled")]
    Cancelled,
}

/// Mutable politeness state for one host
#[derive(Debug)]
struct HostRateState {
    /// Timestamp of the most recently admitted request (reservation slot)
    last_request: Option<Instant>,
    /// Required delay currently in force for this host
    delay: Duration,
    in_flight: usize,
    total_requests: u64,
    blocked_requests: u64,
}

impl HostRateState {
    fn new() -> Self {
        Self {
            last_request: None,
            delay: Duration::ZERO,
            in_flight: 0,
            total_requests: 0,
            blocked_requests: 0,
        }
    }
}

/// Counter snapshot across all hosts
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RateLimitStats {
    pub total_requests: u64,
    pub blocked_requests: u64,
    pub tracked_hosts: usize,
}

/// RAII token holding one in-flight slot for a host
///
/// Dropping the guard releases the slot; `release` makes the hand-back
/// explicit at call sites.
pub struct RateLimitGuard {
    state: Arc<Mutex<HostRateState>>,
}

impl RateLimitGuard {
    /// Explicitly release the in-flight slot
    pub fn release(self) {
        // Drop does the work
    }
}

impl Drop for RateLimitGuard {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
    }
}

/// Per-host rate limiter backed by the robots policy cache
pub struct HostRateLimiter {
    config: RateLimiterConfig,
    robots: Arc<RobotsPolicyCache>,
    hosts: DashMap<String, Arc<Mutex<HostRateState>>>,
    total_requests: AtomicU64,
    blocked_requests: AtomicU64,
}

impl HostRateLimiter {
    #[must_use]
    pub fn new(config: RateLimiterConfig, robots: Arc<RobotsPolicyCache>) -> Self {
        Self {
            config,
            robots,
            hosts: DashMap::new(),
            total_requests: AtomicU64::new(0),
            blocked_requests: AtomicU64::new(0),
        }
    }

    /// Acquire permission to fetch `url`
    ///
    /// Verifies robots.txt, waits out the per-host delay and in-flight cap,
    /// then returns a guard whose drop releases the in-flight slot. The
    /// returned future resolves no earlier than `delay(host)` after the
    /// previous successful acquisition for the same host.
    pub async fn acquire(
        &self,
        url: &str,
        cancel: &CancelToken,
    ) -> Result<RateLimitGuard, RateLimitError> {
        let host = host_of(url).unwrap_or_else(|| "unknown".to_string());
        let state = self.state_for(&host);

        if !self.robots.is_allowed(url).await {
            debug!("robots.txt denies {url}");
            state.lock().blocked_requests += 1;
            self.blocked_requests.fetch_add(1, Ordering::Relaxed);
            return Err(RateLimitError::RobotsDisallowed {
                url: url.to_string(),
            });
        }

        let delay = Duration::from_millis(self.robots.crawl_delay_ms(url).await);

        let slot = loop {
            let mut guard = state.lock();
            guard.delay = delay;

            if guard.in_flight >= self.config.max_concurrent_per_host {
                let delay_in_force = guard.delay.max(Duration::from_millis(10));
                drop(guard);
                if !cancel.sleep(delay_in_force).await {
                    return Err(RateLimitError::Cancelled);
                }
                continue;
            }

            // Reserve the next slot so concurrent acquirers observe the
            // delay in program order
            let now = Instant::now();
            let slot = match guard.last_request {
                Some(last) => {
                    let earliest = last + delay;
                    if earliest > now { earliest } else { now }
                }
                None => now,
            };
            guard.last_request = Some(slot);
            guard.in_flight += 1;
            guard.total_requests += 1;
            break slot;
        };

        self.total_requests.fetch_add(1, Ordering::Relaxed);

        let wait = slot.saturating_duration_since(Instant::now());
        if !wait.is_zero() && !cancel.sleep(wait).await {
            let mut guard = state.lock();
            guard.in_flight = guard.in_flight.saturating_sub(1);
            return Err(RateLimitError::Cancelled);
        }

        Ok(RateLimitGuard { state })
    }

    /// Current in-flight count for a host (0 if never seen)
    #[must_use]
    pub fn in_flight(&self, host: &str) -> usize {
        self.hosts
            .get(host)
            .map_or(0, |entry| entry.value().lock().in_flight)
    }

    /// (total, blocked) request counts for a host
    #[must_use]
    pub fn host_totals(&self, host: &str) -> (u64, u64) {
        self.hosts.get(host).map_or((0, 0), |entry| {
            let state = entry.value().lock();
            (state.total_requests, state.blocked_requests)
        })
    }

    /// Read-only snapshot of the limiter counters
    #[must_use]
    pub fn stats(&self) -> RateLimitStats {
        RateLimitStats {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            blocked_requests: self.blocked_requests.load(Ordering::Relaxed),
            tracked_hosts: self.hosts.len(),
        }
    }

    fn state_for(&self, host: &str) -> Arc<Mutex<HostRateState>> {
        Arc::clone(
            self.hosts
                .entry(host.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(HostRateState::new())))
                .value(),
        )
    }
}
