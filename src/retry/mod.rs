//! Retry controller with exponential backoff
//!
//! Wraps fallible operations, classifies their failures and retries the
//! transient ones with capped exponential backoff and symmetric jitter.
//! Whether unclassifiable errors are retried is a configuration decision
//! rather than a hard-coded policy.

pub mod classify;

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use log::{debug, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;

pub use classify::{ErrorClass, classify_error, error_name, is_retryable_status};

/// Configuration for retry behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Additional attempts after the first failure
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    /// Symmetric jitter fraction applied to each delay (0.0 - 1.0)
    pub jitter: f64,
    /// Retry errors that classify as Unknown
    pub retry_unknown_errors: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter: 0.2,
            retry_unknown_errors: true,
        }
    }
}

/// Result of a retried operation
#[derive(Debug)]
pub struct RetryOutcome<T> {
    /// The successful value, when any attempt succeeded
    pub value: Option<T>,
    /// Terminal error message, when all attempts failed
    pub error: Option<String>,
    /// Total attempts made (1 = succeeded first try)
    pub attempts: u32,
    pub total_duration: Duration,
    /// Message of the most recent failed attempt, if any attempt failed
    pub last_error: Option<String>,
    /// Classification of the terminal error, when all attempts failed
    pub terminal_class: Option<ErrorClass>,
}

impl<T> RetryOutcome<T> {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.value.is_some()
    }
}

/// Snapshot of the controller's global counters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetryStats {
    pub total_attempts: u64,
    pub successful_retries: u64,
    pub failed_retries: u64,
    pub permanent_failures: u64,
    pub errors_by_name: HashMap<String, u64>,
}

/// Retry controller with process-wide counters
pub struct RetryController {
    config: RetryConfig,
    total_attempts: AtomicU64,
    successful_retries: AtomicU64,
    failed_retries: AtomicU64,
    permanent_failures: AtomicU64,
    errors_by_name: DashMap<String, u64>,
}

impl RetryController {
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            total_attempts: AtomicU64::new(0),
            successful_retries: AtomicU64::new(0),
            failed_retries: AtomicU64::new(0),
            permanent_failures: AtomicU64::new(0),
            errors_by_name: DashMap::new(),
        }
    }

    /// Run `op`, retrying transient failures with backoff
    ///
    /// The operation is attempted at most `1 + max_retries` times. Permanent
    /// failures stop immediately; unknown failures follow the
    /// `retry_unknown_errors` flag. Backoff sleeps abort on cancellation.
    ///
    /// # Arguments
    /// * `label` - Operation name used in log lines
    /// * `cancel` - Cancellation token checked during backoff sleeps
    /// * `op` - Closure producing the fallible future, called per attempt
    pub async fn execute<T, F, Fut>(
        &self,
        label: &str,
        cancel: &CancelToken,
        mut op: F,
    ) -> RetryOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let started = Instant::now();
        let mut last_error: Option<String> = None;

        for attempt in 0..=self.config.max_retries {
            self.total_attempts.fetch_add(1, Ordering::Relaxed);

            match op().await {
                Ok(value) => {
                    if attempt > 0 {
                        self.successful_retries.fetch_add(1, Ordering::Relaxed);
                        debug!("{label} succeeded on attempt {}", attempt + 1);
                    }
                    return RetryOutcome {
                        value: Some(value),
                        error: None,
                        attempts: attempt + 1,
                        total_duration: started.elapsed(),
                        last_error,
                        terminal_class: None,
                    };
                }
                Err(error) => {
                    let class = classify_error(&error);
                    let message = format!("{error:#}");
                    *self
                        .errors_by_name
                        .entry(error_name(&error))
                        .or_insert(0) += 1;
                    last_error = Some(message.clone());

                    let retryable = match class {
                        ErrorClass::Transient => true,
                        ErrorClass::Permanent => false,
                        ErrorClass::Unknown => self.config.retry_unknown_errors,
                    };

                    if !retryable {
                        self.permanent_failures.fetch_add(1, Ordering::Relaxed);
                        debug!("{label} failed permanently: {message}");
                        return RetryOutcome {
                            value: None,
                            error: Some(message.clone()),
                            attempts: attempt + 1,
                            total_duration: started.elapsed(),
                            last_error: Some(message),
                            terminal_class: Some(class),
                        };
                    }

                    if attempt == self.config.max_retries {
                        self.failed_retries.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            "{label} failed after {} attempts: {message}",
                            attempt + 1
                        );
                        return RetryOutcome {
                            value: None,
                            error: Some(message.clone()),
                            attempts: attempt + 1,
                            total_duration: started.elapsed(),
                            last_error: Some(message),
                            terminal_class: Some(class),
                        };
                    }

                    let delay = self.backoff_delay(attempt);
                    debug!(
                        "{label} attempt {} failed ({message}), retrying in {delay:?}",
                        attempt + 1
                    );
                    if !cancel.sleep(delay).await {
                        self.failed_retries.fetch_add(1, Ordering::Relaxed);
                        return RetryOutcome {
                            value: None,
                            error: Some("retry cancelled".to_string()),
                            attempts: attempt + 1,
                            total_duration: started.elapsed(),
                            last_error: Some(message),
                            terminal_class: Some(class),
                        };
                    }
                }
            }
        }

        unreachable!("retry loop always returns")
    }

    /// Backoff delay for the given zero-based attempt index
    ///
    /// `initial * multiplier^attempt`, capped at `max_delay_ms`, with
    /// symmetric jitter `±delay*jitter`, clamped at zero.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.config.initial_delay_ms as f64
            * self.config.backoff_multiplier.powi(attempt as i32);
        let capped = base.min(self.config.max_delay_ms as f64);

        let jittered = if self.config.jitter > 0.0 {
            let jitter = rand::rng().random_range(-self.config.jitter..=self.config.jitter);
            capped * (1.0 + jitter)
        } else {
            capped
        };

        Duration::from_millis(jittered.max(0.0) as u64)
    }

    /// Read-only snapshot of the global counters
    #[must_use]
    pub fn stats(&self) -> RetryStats {
        RetryStats {
            total_attempts: self.total_attempts.load(Ordering::Relaxed),
            successful_retries: self.successful_retries.load(Ordering::Relaxed),
            failed_retries: self.failed_retries.load(Ordering::Relaxed),
            permanent_failures: self.permanent_failures.load(Ordering::Relaxed),
            errors_by_name: self
                .errors_by_name
                .iter()
                .map(|entry| (entry.key().clone(), *entry.value()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::FetchError;
    use std::sync::atomic::AtomicU32;

    fn controller(max_retries: u32, initial_ms: u64) -> RetryController {
        RetryController::new(RetryConfig {
            max_retries,
            initial_delay_ms: initial_ms,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
            jitter: 0.0,
            retry_unknown_errors: true,
        })
    }

    #[tokio::test]
    async fn test_transient_failure_then_success() {
        let controller = controller(2, 10);
        let cancel = CancelToken::new();
        let calls = AtomicU32::new(0);

        let outcome = controller
            .execute("fetch", &cancel, || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(anyhow::Error::new(FetchError::HttpStatus {
                            status: 503,
                            url: "https://example.com/".to_string(),
                        }))
                    } else {
                        Ok("body")
                    }
                }
            })
            .await;

        assert!(outcome.is_success());
        assert_eq!(outcome.attempts, 3);
        assert!(outcome.last_error.is_some());
        assert_eq!(controller.stats().successful_retries, 1);
    }

    #[tokio::test]
    async fn test_permanent_failure_not_retried() {
        let controller = controller(3, 10);
        let cancel = CancelToken::new();
        let calls = AtomicU32::new(0);

        let outcome: RetryOutcome<()> = controller
            .execute("fetch", &cancel, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(anyhow::Error::new(FetchError::HttpStatus {
                        status: 404,
                        url: "https://example.com/missing".to_string(),
                    }))
                }
            })
            .await;

        assert!(!outcome.is_success());
        assert_eq!(outcome.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.terminal_class, Some(ErrorClass::Permanent));
        assert_eq!(controller.stats().permanent_failures, 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let controller = controller(2, 5);
        let cancel = CancelToken::new();

        let outcome: RetryOutcome<()> = controller
            .execute("fetch", &cancel, || async {
                Err(anyhow::anyhow!("connection reset by peer"))
            })
            .await;

        assert!(!outcome.is_success());
        assert_eq!(outcome.attempts, 3);
        assert_eq!(controller.stats().failed_retries, 1);
        assert_eq!(controller.stats().total_attempts, 3);
    }

    #[tokio::test]
    async fn test_unknown_not_retried_when_disabled() {
        let controller = RetryController::new(RetryConfig {
            max_retries: 3,
            initial_delay_ms: 5,
            max_delay_ms: 100,
            backoff_multiplier: 2.0,
            jitter: 0.0,
            retry_unknown_errors: false,
        });
        let cancel = CancelToken::new();
        let calls = AtomicU32::new(0);

        let outcome: RetryOutcome<()> = controller
            .execute("fetch", &cancel, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(anyhow::anyhow!("inexplicable")) }
            })
            .await;

        assert!(!outcome.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_backoff_timing_without_jitter() {
        let controller = controller(2, 100);
        let cancel = CancelToken::new();
        let calls = AtomicU32::new(0);

        let started = Instant::now();
        let outcome = controller
            .execute("fetch", &cancel, || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(anyhow::anyhow!("request timed out"))
                    } else {
                        Ok(())
                    }
                }
            })
            .await;
        let elapsed = started.elapsed();

        assert!(outcome.is_success());
        // Two backoff sleeps: 100ms + 200ms
        assert!(
            elapsed >= Duration::from_millis(300),
            "expected >= 300ms of backoff, got {elapsed:?}"
        );
        assert!(
            elapsed < Duration::from_millis(900),
            "backoff took unexpectedly long: {elapsed:?}"
        );
    }
}
