//! Environment variable overrides
//!
//! Every tunable can be overridden through the environment, in three groups:
//! crawler scale (`CRAWLER_*`), politeness (`CRAWL_*`, robots) and
//! resilience (retries, circuit breaker). Unparseable values fall back to
//! the configured default with a warning rather than failing the run.

use std::fmt::Display;
use std::str::FromStr;

use log::warn;

use super::types::CrawlConfig;
use crate::fetcher::RenderingMode;

/// Parse an environment variable, keeping `default` on absence or bad input
fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: Display,
{
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(e) => {
                warn!("Ignoring {key}={raw}: {e}");
                default
            }
        },
        Err(_) => default,
    }
}

/// Parse a boolean-ish environment variable ("1", "true", "yes", "on")
fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(raw) => matches!(
            raw.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => default,
    }
}

fn env_string(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

impl CrawlConfig {
    /// Defaults with every environment override applied
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().apply_env()
    }

    /// Apply environment overrides on top of this configuration
    #[must_use]
    pub fn apply_env(mut self) -> Self {
        // Crawler scale
        self.max_requests = env_parse("CRAWLER_MAX_REQUESTS", self.max_requests);
        self.discovery_concurrency =
            env_parse("CRAWLER_DISCOVERY_CONCURRENCY", self.discovery_concurrency);
        self.nav_timeout_secs = env_parse("CRAWLER_NAV_TIMEOUT_SECS", self.nav_timeout_secs);
        self.handler_timeout_secs =
            env_parse("CRAWLER_HANDLER_TIMEOUT_SECS", self.handler_timeout_secs);
        self.max_depth = env_parse("CRAWLER_MAX_DEPTH", self.max_depth);
        self.headless = env_bool("CRAWLER_HEADLESS", self.headless);
        self.rendering_mode = env_parse::<RenderingMode>("CRAWLER_RENDERING_MODE", self.rendering_mode);
        self.min_content_length =
            env_parse("CRAWLER_MIN_CONTENT_LENGTH", self.min_content_length);

        // Politeness
        self.politeness.delay_ms = env_parse("CRAWL_DELAY_MS", self.politeness.delay_ms);
        self.politeness.min_delay_ms = env_parse("CRAWL_MIN_DELAY_MS", self.politeness.min_delay_ms);
        self.politeness.max_delay_ms = env_parse("CRAWL_MAX_DELAY_MS", self.politeness.max_delay_ms);
        self.politeness.respect_robots =
            env_bool("RESPECT_ROBOTS_TXT", self.politeness.respect_robots);
        self.politeness.user_agent =
            env_string("CRAWL_USER_AGENT", self.politeness.user_agent.clone());
        self.politeness.robots_cache_ttl_secs = env_parse(
            "ROBOTS_TXT_CACHE_TTL",
            self.politeness.robots_cache_ttl_secs,
        );
        self.politeness.max_concurrent_per_domain = env_parse(
            "MAX_CONCURRENT_PER_DOMAIN",
            self.politeness.max_concurrent_per_domain,
        );
        self.politeness.robots_timeout_secs =
            env_parse("ROBOTS_TXT_TIMEOUT", self.politeness.robots_timeout_secs);

        // Resilience
        self.resilience.max_retries = env_parse("MAX_RETRIES", self.resilience.max_retries);
        self.resilience.retry_initial_delay_ms = env_parse(
            "RETRY_INITIAL_DELAY_MS",
            self.resilience.retry_initial_delay_ms,
        );
        self.resilience.retry_max_delay_ms =
            env_parse("RETRY_MAX_DELAY_MS", self.resilience.retry_max_delay_ms);
        self.resilience.retry_backoff_multiplier = env_parse(
            "RETRY_BACKOFF_MULTIPLIER",
            self.resilience.retry_backoff_multiplier,
        );
        self.resilience.retry_jitter = env_parse("RETRY_JITTER", self.resilience.retry_jitter);
        if let Ok(raw) = std::env::var("REQUEST_TIMEOUT") {
            match raw.trim().parse::<u64>() {
                Ok(ms) => self.resilience.request_timeout_ms = Some(ms),
                Err(e) => warn!("Ignoring REQUEST_TIMEOUT={raw}: {e}"),
            }
        }
        self.resilience.circuit_breaker_enabled = env_bool(
            "CIRCUIT_BREAKER_ENABLED",
            self.resilience.circuit_breaker_enabled,
        );
        self.resilience.circuit_breaker_threshold = env_parse(
            "CIRCUIT_BREAKER_THRESHOLD",
            self.resilience.circuit_breaker_threshold,
        );
        self.resilience.circuit_breaker_window_ms = env_parse(
            "CIRCUIT_BREAKER_WINDOW_MS",
            self.resilience.circuit_breaker_window_ms,
        );
        self.resilience.circuit_breaker_reset_ms = env_parse(
            "CIRCUIT_BREAKER_RESET_MS",
            self.resilience.circuit_breaker_reset_ms,
        );
        self.resilience.circuit_breaker_success_threshold = env_parse(
            "CIRCUIT_BREAKER_SUCCESS_THRESHOLD",
            self.resilience.circuit_breaker_success_threshold,
        );

        self
    }
}
