//! robots.txt policy cache
//!
//! Fetches and parses `robots.txt` per host, caches the resulting rules with
//! a TTL, and answers path admission and crawl-delay queries. Any fetch or
//! parse failure degrades to allow-everything rules so a broken robots file
//! never stalls a crawl.

pub mod parser;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use url::Url;

pub use parser::{parse_robots_txt, pattern_matches};

/// Configuration for robots.txt handling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RobotsConfig {
    /// Whether robots.txt is consulted at all
    pub respect_robots: bool,
    /// User agent sent with the fetch and used for section matching
    pub user_agent: String,
    /// Fetch timeout
    pub timeout_secs: u64,
    /// Cache TTL for parsed rules
    pub cache_ttl_secs: u64,
    /// Delay applied when robots declares none
    pub default_delay_ms: u64,
    /// Lower clamp for robots-declared delays
    pub min_delay_ms: u64,
    /// Upper clamp for robots-declared delays
    pub max_delay_ms: u64,
}

impl Default for RobotsConfig {
    fn default() -> Self {
        Self {
            respect_robots: true,
            user_agent: "webgrazer/0.4 (+https://webgrazer.dev/bot)".to_string(),
            timeout_secs: 10,
            cache_ttl_secs: 3600,
            default_delay_ms: 500,
            min_delay_ms: 100,
            max_delay_ms: 30_000,
        }
    }
}

/// Parsed robots.txt rules for one host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RobotsRules {
    pub host: String,
    /// Crawl-delay in seconds, when declared
    pub crawl_delay: Option<f64>,
    pub disallow_patterns: Vec<String>,
    pub allow_patterns: Vec<String>,
    pub sitemaps: Vec<String>,
    pub fetched_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl RobotsRules {
    /// Rules that permit everything (used when fetch or parse fails)
    #[must_use]
    pub fn allow_all(host: &str) -> Self {
        let now = Utc::now();
        Self {
            host: host.to_string(),
            crawl_delay: None,
            disallow_patterns: Vec::new(),
            allow_patterns: Vec::new(),
            sitemaps: Vec::new(),
            fetched_at: now,
            expires_at: now,
        }
    }

    /// Evaluate path+query admission against these rules
    ///
    /// The most specific (longest) matching pattern wins; Allow takes
    /// precedence over Disallow on equal specificity. A low-specificity
    /// Allow never overrides a more specific Disallow.
    #[must_use]
    pub fn is_path_allowed(&self, path_and_query: &str) -> bool {
        let best_allow = self
            .allow_patterns
            .iter()
            .filter(|p| pattern_matches(p, path_and_query))
            .map(|p| p.len())
            .max();
        let best_disallow = self
            .disallow_patterns
            .iter()
            .filter(|p| pattern_matches(p, path_and_query))
            .map(|p| p.len())
            .max();

        match (best_allow, best_disallow) {
            (_, None) => true,
            (None, Some(_)) => false,
            (Some(allow), Some(disallow)) => allow >= disallow,
        }
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Per-host robots.txt cache with lazy fetch and TTL expiry
pub struct RobotsPolicyCache {
    config: RobotsConfig,
    client: reqwest::Client,
    cache: DashMap<String, Arc<RobotsRules>>,
}

impl RobotsPolicyCache {
    /// Create a cache; building the HTTP client can fail on TLS setup
    pub fn new(config: RobotsConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            config,
            client,
            cache: DashMap::new(),
        })
    }

    /// Get (fetching if necessary) the rules for the host of `url`
    ///
    /// Unparseable URLs and disabled robots handling yield allow-all rules.
    pub async fn rules_for(&self, url: &str) -> Arc<RobotsRules> {
        let Some((scheme, host)) = Self::scheme_and_authority(url) else {
            return Arc::new(RobotsRules::allow_all("unknown"));
        };

        if !self.config.respect_robots {
            return Arc::new(RobotsRules::allow_all(&host));
        }

        let now = Utc::now();
        if let Some(cached) = self.cache.get(&host)
            && !cached.is_expired(now)
        {
            return Arc::clone(cached.value());
        }

        let rules = Arc::new(self.fetch_and_parse(&scheme, &host).await);
        self.cache.insert(host, Arc::clone(&rules));
        rules
    }

    /// Check whether `url` may be fetched according to robots.txt
    pub async fn is_allowed(&self, url: &str) -> bool {
        if !self.config.respect_robots {
            return true;
        }
        let Ok(parsed) = Url::parse(url) else {
            return true;
        };
        let path_and_query = match parsed.query() {
            Some(q) => format!("{}?{}", parsed.path(), q),
            None => parsed.path().to_string(),
        };

        let rules = self.rules_for(url).await;
        rules.is_path_allowed(&path_and_query)
    }

    /// Required inter-request delay for the host of `url`, in milliseconds
    ///
    /// Robots-declared delays are clamped to the configured bounds; hosts
    /// without a declaration use the default delay.
    pub async fn crawl_delay_ms(&self, url: &str) -> u64 {
        let rules = self.rules_for(url).await;
        match rules.crawl_delay {
            Some(delay_secs) => {
                let ms = (delay_secs * 1000.0) as u64;
                ms.clamp(self.config.min_delay_ms, self.config.max_delay_ms)
            }
            None => self.config.default_delay_ms,
        }
    }

    /// Number of hosts with cached rules
    #[must_use]
    pub fn cached_host_count(&self) -> usize {
        self.cache.len()
    }

    async fn fetch_and_parse(&self, scheme: &str, host: &str) -> RobotsRules {
        let robots_url = format!("{scheme}://{host}/robots.txt");
        debug!("Fetching robots.txt: {robots_url}");

        let body = match self.client.get(&robots_url).send().await {
            Ok(response) if response.status().as_u16() == 200 => match response.text().await {
                Ok(text) => Some(text),
                Err(e) => {
                    warn!("Failed to read robots.txt body for {host}: {e}");
                    None
                }
            },
            Ok(response) => {
                debug!(
                    "robots.txt for {host} returned HTTP {}, allowing everything",
                    response.status().as_u16()
                );
                None
            }
            Err(e) => {
                warn!("Failed to fetch robots.txt for {host}: {e}");
                None
            }
        };

        let mut rules = match body {
            Some(text) => parse_robots_txt(host, &text, &self.config.user_agent),
            None => RobotsRules::allow_all(host),
        };

        let now = Utc::now();
        rules.fetched_at = now;
        rules.expires_at = now
            + chrono::Duration::seconds(i64::try_from(self.config.cache_ttl_secs).unwrap_or(3600));
        rules
    }

    /// Scheme plus host:port authority; non-default ports carry their own
    /// robots.txt
    fn scheme_and_authority(url: &str) -> Option<(String, String)> {
        let parsed = Url::parse(url).ok()?;
        let host = parsed.host_str()?.to_lowercase();
        let authority = match parsed.port() {
            Some(port) => format!("{host}:{port}"),
            None => host,
        };
        Some((parsed.scheme().to_string(), authority))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_precedence_over_disallow() {
        let mut rules = RobotsRules::allow_all("ex.com");
        rules.disallow_patterns.push("/private".to_string());
        rules.allow_patterns.push("/private/pub".to_string());

        assert!(!rules.is_path_allowed("/private/x"));
        assert!(rules.is_path_allowed("/private/pub/doc"));
        assert!(rules.is_path_allowed("/open"));
    }

    #[test]
    fn test_low_specificity_allow_does_not_override() {
        let mut rules = RobotsRules::allow_all("ex.com");
        rules.allow_patterns.push("/p".to_string());
        rules.disallow_patterns.push("/private".to_string());

        // The broad allow is less specific than the disallow
        assert!(!rules.is_path_allowed("/private/x"));
        assert!(rules.is_path_allowed("/public"));

        // An exact allow wins over the same-length disallow
        rules.allow_patterns.push("/private".to_string());
        assert!(rules.is_path_allowed("/private/x"));
    }

    #[test]
    fn test_allow_all_permits_everything() {
        let rules = RobotsRules::allow_all("ex.com");
        assert!(rules.is_path_allowed("/anything"));
        assert!(rules.is_path_allowed("/"));
    }

    #[tokio::test]
    async fn test_disabled_robots_allows_everything() {
        let cache = RobotsPolicyCache::new(RobotsConfig {
            respect_robots: false,
            ..RobotsConfig::default()
        })
        .expect("client should build");

        assert!(cache.is_allowed("https://example.com/private/x").await);
        assert_eq!(cache.crawl_delay_ms("https://example.com/").await, 500);
    }
}
