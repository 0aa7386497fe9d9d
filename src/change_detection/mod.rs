//! Incremental change detection
//!
//! Persists a fingerprint per URL (content hash, structure hash, validator
//! headers) in one JSON file per host and decides whether a page needs
//! re-crawling. Host files are loaded lazily on first touch and written back
//! in one batch at the end of a run; corrupt files are treated as empty and
//! overwritten.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::utils::{host_of, sanitize_host};

/// Configuration for change detection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeDetectionConfig {
    /// Directory holding one fingerprint file per host
    pub cache_dir: PathBuf,
    /// Fingerprints older than this always trigger a re-crawl
    pub max_age: Duration,
}

impl Default for ChangeDetectionConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("./data/fingerprints"),
            max_age: Duration::from_secs(7 * 24 * 3600),
        }
    }
}

/// Persisted per-URL fingerprint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageFingerprint {
    pub url: String,
    /// MD5 of the body text
    pub content_hash: String,
    /// MD5 of the canonicalised structure summary
    pub structure_hash: String,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub last_crawled: DateTime<Utc>,
    pub crawl_count: u64,
    /// Changes observed between successive crawls; never exceeds `crawl_count`
    pub change_count: u64,
    /// Mean milliseconds between observed changes
    pub mean_change_interval_ms: f64,
}

/// What the pre-emission check concluded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChangeStatus {
    /// Never fingerprinted before
    New,
    /// Fingerprint older than the configured max age
    Expired,
    /// ETag differs from the stored one
    EtagChanged,
    /// Optimistically assumed changed; verified after the fetch
    Content,
    /// Validators say the page has not changed
    Unchanged,
}

/// Re-crawl decision for one URL
#[derive(Debug, Clone)]
pub struct ChangeDecision {
    pub status: ChangeStatus,
    pub recrawl: bool,
    pub reason: Option<&'static str>,
}

#[derive(Debug, Default)]
struct HostFingerprints {
    fingerprints: HashMap<String, PageFingerprint>,
    dirty: bool,
}

/// Per-host fingerprint store with lazy load and batched save
pub struct ChangeDetector {
    config: ChangeDetectionConfig,
    hosts: DashMap<String, HostFingerprints>,
}

impl ChangeDetector {
    #[must_use]
    pub fn new(config: ChangeDetectionConfig) -> Self {
        Self {
            config,
            hosts: DashMap::new(),
        }
    }

    /// Load the fingerprint file for a host if not yet in memory
    ///
    /// Missing files yield an empty map; corrupt files are logged, treated
    /// as empty and overwritten on the next save.
    pub async fn ensure_host_loaded(&self, host: &str) {
        if self.hosts.contains_key(host) {
            return;
        }

        let path = self.host_file(host);
        let fingerprints = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<HashMap<String, PageFingerprint>>(&bytes) {
                Ok(map) => {
                    debug!("Loaded {} fingerprints for {host}", map.len());
                    map
                }
                Err(e) => {
                    warn!(
                        "Corrupt fingerprint cache {} ({e}), starting empty",
                        path.display()
                    );
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                warn!("Failed to read {} ({e}), starting empty", path.display());
                HashMap::new()
            }
        };

        self.hosts.entry(host.to_string()).or_insert(HostFingerprints {
            fingerprints,
            dirty: false,
        });
    }

    /// Decide whether a URL needs re-crawling
    ///
    /// Decision ladder: no record → new; record too old → expired; equal
    /// ETags → unchanged; differing ETags → changed; Last-Modified not newer
    /// → unchanged; otherwise optimistically changed (verified by `update`
    /// after the fetch). An unchanged verdict skips emission only - the
    /// stored structure hash is not refreshed until the next content change.
    pub async fn check(
        &self,
        url: &str,
        etag: Option<&str>,
        last_modified: Option<&str>,
    ) -> ChangeDecision {
        let host = host_of(url).unwrap_or_else(|| "unknown".to_string());
        self.ensure_host_loaded(&host).await;

        let Some(entry) = self.hosts.get(&host) else {
            return ChangeDecision {
                status: ChangeStatus::New,
                recrawl: true,
                reason: None,
            };
        };
        let Some(prior) = entry.fingerprints.get(url) else {
            return ChangeDecision {
                status: ChangeStatus::New,
                recrawl: true,
                reason: None,
            };
        };

        let age = Utc::now().signed_duration_since(prior.last_crawled);
        if age.num_milliseconds() > self.config.max_age.as_millis() as i64 {
            return ChangeDecision {
                status: ChangeStatus::Expired,
                recrawl: true,
                reason: None,
            };
        }

        if let (Some(stored), Some(received)) = (prior.etag.as_deref(), etag) {
            if stored == received {
                return ChangeDecision {
                    status: ChangeStatus::Unchanged,
                    recrawl: false,
                    reason: Some("etag-unchanged"),
                };
            }
            return ChangeDecision {
                status: ChangeStatus::EtagChanged,
                recrawl: true,
                reason: None,
            };
        }

        if let (Some(stored), Some(received)) = (prior.last_modified.as_deref(), last_modified)
            && let (Ok(stored_at), Ok(received_at)) = (
                DateTime::parse_from_rfc2822(stored),
                DateTime::parse_from_rfc2822(received),
            )
            && received_at <= stored_at
        {
            return ChangeDecision {
                status: ChangeStatus::Unchanged,
                recrawl: false,
                reason: Some("lm-unchanged"),
            };
        }

        ChangeDecision {
            status: ChangeStatus::Content,
            recrawl: true,
            reason: None,
        }
    }

    /// Record a freshly scraped page and report whether it changed
    ///
    /// Computes new content and structure hashes, compares them with any
    /// stored values and rewrites the fingerprint. The first observation of
    /// a URL reports changed without counting towards `change_count`
    /// (changes are observed between crawls).
    pub async fn update(
        &self,
        url: &str,
        body_text: &str,
        links: &[String],
        headings: &[String],
        etag: Option<&str>,
        last_modified: Option<&str>,
    ) -> bool {
        let host = host_of(url).unwrap_or_else(|| "unknown".to_string());
        self.ensure_host_loaded(&host).await;

        let content_hash = format!("{:x}", md5::compute(body_text.as_bytes()));
        let structure_hash = Self::structure_hash(links, headings);
        let now = Utc::now();

        let mut entry = self
            .hosts
            .entry(host)
            .or_default();

        let changed = match entry.fingerprints.get_mut(url) {
            Some(prior) => {
                let changed =
                    prior.content_hash != content_hash || prior.structure_hash != structure_hash;
                prior.crawl_count += 1;
                if changed {
                    prior.change_count += 1;
                    let interval_ms =
                        now.signed_duration_since(prior.last_crawled).num_milliseconds() as f64;
                    let n = prior.change_count as f64;
                    prior.mean_change_interval_ms +=
                        (interval_ms - prior.mean_change_interval_ms) / n;
                    prior.content_hash = content_hash;
                    prior.structure_hash = structure_hash;
                }
                prior.etag = etag.map(str::to_string);
                prior.last_modified = last_modified.map(str::to_string);
                prior.last_crawled = now;
                changed
            }
            None => {
                entry.fingerprints.insert(
                    url.to_string(),
                    PageFingerprint {
                        url: url.to_string(),
                        content_hash,
                        structure_hash,
                        etag: etag.map(str::to_string),
                        last_modified: last_modified.map(str::to_string),
                        last_crawled: now,
                        crawl_count: 1,
                        change_count: 0,
                        mean_change_interval_ms: 0.0,
                    },
                );
                true
            }
        };

        entry.dirty = true;
        changed
    }

    /// Fingerprint for a URL, when one is stored
    #[must_use]
    pub fn fingerprint(&self, url: &str) -> Option<PageFingerprint> {
        let host = host_of(url)?;
        self.hosts
            .get(&host)
            .and_then(|entry| entry.fingerprints.get(url).cloned())
    }

    /// Write every dirty host file to disk
    pub async fn persist_all(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.config.cache_dir)
            .await
            .with_context(|| {
                format!(
                    "Failed to create fingerprint dir {}",
                    self.config.cache_dir.display()
                )
            })?;

        // Snapshot dirty hosts first; holding a map guard across the file
        // writes would block concurrent checks
        let dirty_hosts: Vec<String> = self
            .hosts
            .iter()
            .filter(|entry| entry.dirty)
            .map(|entry| entry.key().clone())
            .collect();

        for host in dirty_hosts {
            let Some(snapshot) = self.hosts.get(&host).map(|entry| entry.fingerprints.clone())
            else {
                continue;
            };
            let path = self.host_file(&host);
            let json = serde_json::to_vec_pretty(&snapshot)
                .context("Failed to serialize fingerprints")?;
            tokio::fs::write(&path, json)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            debug!(
                "Persisted {} fingerprints to {}",
                snapshot.len(),
                path.display()
            );
            if let Some(mut entry) = self.hosts.get_mut(&host) {
                entry.dirty = false;
            }
        }
        Ok(())
    }

    /// Canonical structure summary hash: link count, heading count, the
    /// sorted first ten links and the first ten headings
    fn structure_hash(links: &[String], headings: &[String]) -> String {
        let mut sorted_links: Vec<&String> = links.iter().collect();
        sorted_links.sort();
        sorted_links.truncate(10);
        let top_headings: Vec<&String> = headings.iter().take(10).collect();

        let summary = serde_json::json!({
            "linkCount": links.len(),
            "headingCount": headings.len(),
            "links": sorted_links,
            "headings": top_headings,
        });
        // serde_json::Value orders object keys, so the rendering is canonical
        format!("{:x}", md5::compute(summary.to_string().as_bytes()))
    }

    fn host_file(&self, host: &str) -> PathBuf {
        self.config
            .cache_dir
            .join(format!("{}.json", sanitize_host(host)))
    }
}
