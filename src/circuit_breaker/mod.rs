//! Circuit breaker for host-level failure detection
//!
//! Tracks a sliding window of failure timestamps per host and short-circuits
//! fetches against hosts that are consistently failing:
//! - Closed: normal operation, requests proceed
//! - Open: too many failures inside the window, requests are blocked
//! - `HalfOpen`: probing after the reset timeout

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::utils::host_of;

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    /// Normal operation - requests proceed
    Closed,
    /// Probing after the reset timeout - limited requests allowed
    HalfOpen,
    /// Failing - requests are blocked
    Open,
}

/// Configuration for the circuit breaker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// When false every check behaves as Closed
    pub enabled: bool,
    /// Failures within the window that open the circuit
    pub failure_threshold: usize,
    /// Width of the sliding failure window
    pub failure_window: Duration,
    /// Time an open circuit waits before admitting a probe
    pub reset_timeout: Duration,
    /// Consecutive half-open successes required to close
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            failure_window: Duration::from_secs(60),
            reset_timeout: Duration::from_secs(300),
            success_threshold: 2,
        }
    }
}

/// Health tracking for a single host
#[derive(Debug, Clone)]
pub struct HostCircuit {
    pub state: CircuitState,
    /// Failure timestamps inside the sliding window
    failure_times: VecDeque<Instant>,
    /// Consecutive successes while in `HalfOpen` state
    pub half_open_successes: u32,
    pub last_state_change: Instant,
    opened_at: Option<Instant>,
}

impl HostCircuit {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_times: VecDeque::new(),
            half_open_successes: 0,
            last_state_change: Instant::now(),
            opened_at: None,
        }
    }

    fn prune_window(&mut self, window: Duration, now: Instant) {
        while let Some(oldest) = self.failure_times.front() {
            if now.duration_since(*oldest) > window {
                self.failure_times.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Outcome of a circuit check
#[derive(Debug, Clone)]
pub struct CircuitDecision {
    pub allowed: bool,
    pub state: CircuitState,
    pub reason: Option<String>,
}

/// Snapshot of circuit breaker counters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CircuitBreakerStats {
    pub total_blocked: u64,
    pub closed: usize,
    pub half_open: usize,
    pub open: usize,
}

/// Per-host circuit breaker
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    hosts: DashMap<String, HostCircuit>,
    total_blocked: AtomicU64,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            hosts: DashMap::new(),
            total_blocked: AtomicU64::new(0),
        }
    }

    /// Check whether a request to the host of `url` may proceed
    ///
    /// An Open circuit whose reset timeout has elapsed transitions to
    /// `HalfOpen` and admits the caller as a probe. Blocked checks carry a
    /// remaining-seconds reason and bump the blocked counter.
    pub fn check(&self, url: &str) -> CircuitDecision {
        if !self.config.enabled {
            return CircuitDecision {
                allowed: true,
                state: CircuitState::Closed,
                reason: None,
            };
        }

        let host = host_of(url).unwrap_or_else(|| "unknown".to_string());
        let mut circuit = self.hosts.entry(host.clone()).or_insert_with(HostCircuit::new);

        match circuit.state {
            CircuitState::Closed | CircuitState::HalfOpen => CircuitDecision {
                allowed: true,
                state: circuit.state,
                reason: None,
            },
            CircuitState::Open => {
                let now = Instant::now();
                if let Some(opened) = circuit.opened_at
                    && now.duration_since(opened) >= self.config.reset_timeout
                {
                    circuit.state = CircuitState::HalfOpen;
                    circuit.half_open_successes = 0;
                    circuit.last_state_change = now;
                    info!("Circuit HALF-OPEN for host {host}, admitting probe");
                    return CircuitDecision {
                        allowed: true,
                        state: CircuitState::HalfOpen,
                        reason: None,
                    };
                }

                let remaining = circuit.opened_at.map_or(self.config.reset_timeout, |opened| {
                    self.config
                        .reset_timeout
                        .saturating_sub(now.duration_since(opened))
                });
                self.total_blocked.fetch_add(1, Ordering::Relaxed);
                CircuitDecision {
                    allowed: false,
                    state: CircuitState::Open,
                    reason: Some(format!(
                        "circuit open for {host}, retry in {}s",
                        remaining.as_secs()
                    )),
                }
            }
        }
    }

    /// Record a successful request to the host of `url`
    pub fn record_success(&self, url: &str) {
        if !self.config.enabled {
            return;
        }
        let host = host_of(url).unwrap_or_else(|| "unknown".to_string());
        let Some(mut circuit) = self.hosts.get_mut(&host) else {
            return;
        };

        match circuit.state {
            CircuitState::Closed => {
                // Failures age out of the sliding window on their own
            }
            CircuitState::HalfOpen => {
                circuit.half_open_successes += 1;
                if circuit.half_open_successes >= self.config.success_threshold {
                    circuit.state = CircuitState::Closed;
                    circuit.failure_times.clear();
                    circuit.opened_at = None;
                    circuit.last_state_change = Instant::now();
                    info!("Circuit CLOSED for host {host}");
                } else {
                    debug!(
                        "Circuit HALF-OPEN success for host {host} ({}/{})",
                        circuit.half_open_successes, self.config.success_threshold
                    );
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Record a failed request to the host of `url`
    ///
    /// May open the circuit when the windowed failure count reaches the
    /// threshold, or re-open it immediately from `HalfOpen`.
    pub fn record_failure(&self, url: &str, error: &str) {
        if !self.config.enabled {
            return;
        }
        let host = host_of(url).unwrap_or_else(|| "unknown".to_string());
        let mut circuit = self.hosts.entry(host.clone()).or_insert_with(HostCircuit::new);
        let now = Instant::now();

        match circuit.state {
            CircuitState::HalfOpen => {
                circuit.state = CircuitState::Open;
                circuit.opened_at = Some(now);
                circuit.half_open_successes = 0;
                circuit.last_state_change = now;
                warn!("Circuit RE-OPENED for host {host} after half-open failure: {error}");
            }
            CircuitState::Closed => {
                circuit.failure_times.push_back(now);
                circuit.prune_window(self.config.failure_window, now);

                if circuit.failure_times.len() >= self.config.failure_threshold {
                    circuit.state = CircuitState::Open;
                    circuit.opened_at = Some(now);
                    circuit.last_state_change = now;
                    warn!(
                        "Circuit OPEN for host {host} after {} failures in window. Last error: {error}",
                        circuit.failure_times.len()
                    );
                } else {
                    debug!(
                        "Circuit failure for host {host} ({}/{}): {error}",
                        circuit.failure_times.len(),
                        self.config.failure_threshold
                    );
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Current state for a host (Closed if never seen)
    #[must_use]
    pub fn state(&self, host: &str) -> CircuitState {
        self.hosts
            .get(host)
            .map_or(CircuitState::Closed, |c| c.state)
    }

    /// Hosts currently in the Open state
    #[must_use]
    pub fn open_hosts(&self) -> Vec<String> {
        self.hosts
            .iter()
            .filter(|entry| entry.value().state == CircuitState::Open)
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Read-only snapshot of circuit counters
    #[must_use]
    pub fn stats(&self) -> CircuitBreakerStats {
        let mut stats = CircuitBreakerStats {
            total_blocked: self.total_blocked.load(Ordering::Relaxed),
            ..CircuitBreakerStats::default()
        };
        for entry in self.hosts.iter() {
            match entry.value().state {
                CircuitState::Closed => stats.closed += 1,
                CircuitState::HalfOpen => stats.half_open += 1,
                CircuitState::Open => stats.open += 1,
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: usize, reset_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            enabled: true,
            failure_threshold: threshold,
            failure_window: Duration::from_secs(10),
            reset_timeout: Duration::from_millis(reset_ms),
            success_threshold: 1,
        })
    }

    #[test]
    fn test_closed_allows_requests() {
        let cb = breaker(3, 60_000);
        let decision = cb.check("https://example.com/a");
        assert!(decision.allowed);
        assert_eq!(decision.state, CircuitState::Closed);
    }

    #[test]
    fn test_opens_after_threshold_failures() {
        let cb = breaker(3, 60_000);
        for _ in 0..3 {
            cb.record_failure("https://example.com/a", "boom");
        }
        let decision = cb.check("https://example.com/b");
        assert!(!decision.allowed);
        assert_eq!(decision.state, CircuitState::Open);
        assert!(decision.reason.as_deref().unwrap_or("").contains("retry in"));
        assert_eq!(cb.stats().total_blocked, 1);
    }

    #[test]
    fn test_failures_below_threshold_keep_closed() {
        let cb = breaker(3, 60_000);
        cb.record_failure("https://example.com/a", "boom");
        cb.record_success("https://example.com/a");
        cb.record_failure("https://example.com/a", "boom");
        assert_eq!(cb.state("example.com"), CircuitState::Closed);
    }

    #[test]
    fn test_failures_outside_window_do_not_count() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig {
            enabled: true,
            failure_threshold: 2,
            failure_window: Duration::from_millis(40),
            reset_timeout: Duration::from_secs(60),
            success_threshold: 1,
        });
        cb.record_failure("https://example.com/a", "boom");
        std::thread::sleep(Duration::from_millis(60));
        cb.record_failure("https://example.com/a", "boom");
        // The first failure aged out before the second arrived
        assert_eq!(cb.state("example.com"), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_probe_then_close() {
        let cb = breaker(2, 50);
        cb.record_failure("https://example.com/a", "boom");
        cb.record_failure("https://example.com/a", "boom");
        assert!(!cb.check("https://example.com/a").allowed);

        tokio::time::sleep(Duration::from_millis(80)).await;

        let probe = cb.check("https://example.com/a");
        assert!(probe.allowed);
        assert_eq!(probe.state, CircuitState::HalfOpen);

        cb.record_success("https://example.com/a");
        assert_eq!(cb.state("example.com"), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_failure_reopens() {
        let cb = breaker(2, 50);
        cb.record_failure("https://example.com/a", "boom");
        cb.record_failure("https://example.com/a", "boom");
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(cb.check("https://example.com/a").allowed);

        cb.record_failure("https://example.com/a", "boom again");
        assert_eq!(cb.state("example.com"), CircuitState::Open);
        assert!(!cb.check("https://example.com/a").allowed);
    }

    #[test]
    fn test_disabled_breaker_always_allows() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig {
            enabled: false,
            ..CircuitBreakerConfig::default()
        });
        for _ in 0..100 {
            cb.record_failure("https://example.com/a", "boom");
        }
        assert!(cb.check("https://example.com/a").allowed);
    }
}
