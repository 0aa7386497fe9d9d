//! URL admission filter
//!
//! Classifies URLs by host and decides whether they may enter the crawl:
//! length and parseability checks, host blacklist/whitelist, file-extension
//! and path-prefix skip rules, seed-host containment and an optional strict
//! mode that only admits institutional domains.

use std::collections::HashMap;

use log::debug;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use url::Url;

/// File extensions that are never worth fetching with a browser
static DEFAULT_SKIP_EXTENSIONS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        ".pdf", ".doc", ".docx", ".xls", ".xlsx", ".ppt", ".pptx", ".zip", ".tar", ".gz", ".rar",
        ".7z", ".jpg", ".jpeg", ".png", ".gif", ".svg", ".webp", ".ico", ".mp3", ".mp4", ".avi",
        ".mov", ".wmv", ".flv", ".wav", ".css", ".js", ".json", ".xml", ".rss", ".atom", ".exe",
        ".dmg", ".iso", ".bin",
    ]
});

/// Host suffixes recognised as institutional domains in strict mode
static DEFAULT_UNIVERSITY_SUFFIXES: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![".edu", ".ac.uk", ".edu.au", ".ac.in", ".ac.jp", ".ac.nz", ".edu.cn", ".ac.za"]
});

/// Configuration for the domain filter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Maximum accepted URL length in characters
    pub max_url_length: usize,
    /// File extensions skipped by case-insensitive path suffix match
    pub skip_extensions: Vec<String>,
    /// Path prefixes that are never crawled (e.g. `/cgi-bin/`)
    pub blocked_paths: Vec<String>,
    /// Hosts rejected outright (exact match or dot-suffix)
    pub blacklist: Vec<String>,
    /// Hosts admitted unconditionally (exact match or dot-suffix)
    pub whitelist: Vec<String>,
    /// Suffixes that identify institutional hosts
    pub university_suffixes: Vec<String>,
    /// When true, only hosts matching a university suffix are admitted
    pub strict_university_mode: bool,
    /// Allow subdomains of the seed host (and vice versa)
    pub allow_subdomains: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            max_url_length: 2048,
            skip_extensions: DEFAULT_SKIP_EXTENSIONS.iter().map(|s| (*s).to_string()).collect(),
            blocked_paths: vec![
                "/cgi-bin/".to_string(),
                "/wp-admin/".to_string(),
                "/admin/".to_string(),
                "/login".to_string(),
                "/logout".to_string(),
            ],
            blacklist: Vec::new(),
            whitelist: Vec::new(),
            university_suffixes: DEFAULT_UNIVERSITY_SUFFIXES
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            strict_university_mode: false,
            allow_subdomains: false,
        }
    }
}

/// Why a URL was rejected by the filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RejectReason {
    TooLong,
    Unparseable,
    Blacklisted,
    SkippedExtension,
    BlockedPath,
    OutsideSeedHost,
    NotUniversity,
}

impl RejectReason {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::TooLong => "too-long",
            Self::Unparseable => "unparseable",
            Self::Blacklisted => "blacklisted",
            Self::SkippedExtension => "skipped-extension",
            Self::BlockedPath => "blocked-path",
            Self::OutsideSeedHost => "outside-seed-host",
            Self::NotUniversity => "not-university",
        }
    }
}

/// Result of a pure classification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlClassification {
    pub domain: Option<String>,
    pub is_university: bool,
    pub is_whitelisted: bool,
    pub is_blacklisted: bool,
}

/// Admission decision with optional rejection reason
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterDecision {
    pub allowed: bool,
    pub reason: Option<RejectReason>,
}

impl FilterDecision {
    const fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    const fn reject(reason: RejectReason) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
        }
    }
}

/// Snapshot of filter counters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterStats {
    pub total_checked: u64,
    pub allowed: u64,
    pub blocked: u64,
    pub blocked_by_reason: HashMap<String, u64>,
}

/// URL admission filter with decision counters
pub struct DomainFilter {
    config: FilterConfig,
    stats: Mutex<FilterStats>,
}

impl DomainFilter {
    #[must_use]
    pub fn new(config: FilterConfig) -> Self {
        Self {
            config,
            stats: Mutex::new(FilterStats::default()),
        }
    }

    /// Classify a URL without advancing any counter
    ///
    /// This is a pure function of the URL and the filter configuration.
    #[must_use]
    pub fn classify(&self, url: &str) -> UrlClassification {
        let domain = crate::utils::host_of(url);
        let (is_university, is_whitelisted, is_blacklisted) = match &domain {
            Some(host) => (
                self.matches_suffix_list(host, &self.config.university_suffixes),
                self.matches_host_list(host, &self.config.whitelist),
                self.matches_host_list(host, &self.config.blacklist),
            ),
            None => (false, false, false),
        };

        UrlClassification {
            domain,
            is_university,
            is_whitelisted,
            is_blacklisted,
        }
    }

    /// Decide whether a URL may be crawled
    ///
    /// Rules short-circuit in a fixed order; every call advances the
    /// filter counters.
    ///
    /// # Arguments
    /// * `url` - Absolute URL to check
    /// * `seed_host` - When present, the URL must stay within this host
    ///   (or share a subdomain relationship when subdomains are enabled)
    pub fn allow(&self, url: &str, seed_host: Option<&str>) -> FilterDecision {
        let decision = self.evaluate(url, seed_host);
        self.record(decision);
        decision
    }

    fn evaluate(&self, url: &str, seed_host: Option<&str>) -> FilterDecision {
        if url.len() > self.config.max_url_length {
            return FilterDecision::reject(RejectReason::TooLong);
        }

        let Ok(parsed) = Url::parse(url) else {
            return FilterDecision::reject(RejectReason::Unparseable);
        };
        let Some(host) = parsed.host_str().map(str::to_lowercase) else {
            return FilterDecision::reject(RejectReason::Unparseable);
        };

        if self.matches_host_list(&host, &self.config.blacklist) {
            return FilterDecision::reject(RejectReason::Blacklisted);
        }

        let path = parsed.path().to_lowercase();
        if self
            .config
            .skip_extensions
            .iter()
            .any(|ext| path.ends_with(ext.as_str()))
        {
            return FilterDecision::reject(RejectReason::SkippedExtension);
        }

        if self
            .config
            .blocked_paths
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
        {
            return FilterDecision::reject(RejectReason::BlockedPath);
        }

        if self.matches_host_list(&host, &self.config.whitelist) {
            return FilterDecision::allow();
        }

        if let Some(seed) = seed_host {
            let seed = seed.to_lowercase();
            if !self.within_seed_host(&host, &seed) {
                return FilterDecision::reject(RejectReason::OutsideSeedHost);
            }
        }

        if self.config.strict_university_mode
            && !self.matches_suffix_list(&host, &self.config.university_suffixes)
        {
            return FilterDecision::reject(RejectReason::NotUniversity);
        }

        FilterDecision::allow()
    }

    /// Same host, or a mutual suffix relationship when subdomains are enabled
    fn within_seed_host(&self, host: &str, seed: &str) -> bool {
        if host == seed {
            return true;
        }
        if self.config.allow_subdomains {
            return host.ends_with(&format!(".{seed}")) || seed.ends_with(&format!(".{host}"));
        }
        false
    }

    /// Exact match or dot-suffix match against a host list
    fn matches_host_list(&self, host: &str, list: &[String]) -> bool {
        list.iter().any(|entry| {
            let entry = entry.to_lowercase();
            host == entry || host.ends_with(&format!(".{entry}"))
        })
    }

    fn matches_suffix_list(&self, host: &str, suffixes: &[String]) -> bool {
        suffixes
            .iter()
            .any(|suffix| host.ends_with(suffix.to_lowercase().as_str()))
    }

    fn record(&self, decision: FilterDecision) {
        let mut stats = self.stats.lock();
        stats.total_checked += 1;
        if decision.allowed {
            stats.allowed += 1;
        } else {
            stats.blocked += 1;
            if let Some(reason) = decision.reason {
                *stats
                    .blocked_by_reason
                    .entry(reason.as_str().to_string())
                    .or_insert(0) += 1;
            } else {
                debug!("blocked decision without a reason");
            }
        }
    }

    /// Read-only snapshot of the filter counters
    #[must_use]
    pub fn stats(&self) -> FilterStats {
        self.stats.lock().clone()
    }
}
