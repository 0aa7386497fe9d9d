//! Deduplicating URL queue with domain-aware batching
//!
//! The unit of work is a `UrlTask`; a task's URL is its identity. At any
//! instant a URL lives in at most one of {queued, in-progress, processed},
//! which is also what breaks cycles in the link graph - no explicit graph is
//! stored. The queue is bounded: producers are never blocked, overflowing
//! URLs are dropped with an observable signal.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::events::{CrawlSignal, SignalBus};
use crate::utils::host_of;

/// Priority assigned to failed tasks that are re-enqueued for retry
pub const RETRY_PRIORITY: u32 = 100;

/// A unit of crawl work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlTask {
    pub url: String,
    pub depth: u32,
    pub parent_url: Option<String>,
    /// Lower-cased host, derived from the URL at enqueue time
    pub host: String,
    /// Lower value is higher priority; defaults to the depth
    pub priority: u32,
    pub enqueued_at: DateTime<Utc>,
}

/// Configuration for the queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum number of queued (not yet dispatched) URLs
    pub max_size: usize,
    /// Maximum URLs returned per batch
    pub batch_size: usize,
    /// Maximum URLs per host within one batch
    pub domain_batch_size: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_size: 100_000,
            batch_size: 50,
            domain_batch_size: 5,
        }
    }
}

/// Snapshot of queue counters and set sizes
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueStats {
    pub added: u64,
    pub duplicates: u64,
    pub overflow_drops: u64,
    pub completed: u64,
    pub failed: u64,
    pub queued: usize,
    pub in_progress: usize,
    pub processed: usize,
}

#[derive(Debug, Default)]
struct QueueInner {
    queued: HashMap<String, UrlTask>,
    in_progress: HashMap<String, UrlTask>,
    processed: HashSet<String>,
    discovery_complete: bool,
    added: u64,
    duplicates: u64,
    overflow_drops: u64,
    completed: u64,
    failed: u64,
}

/// Deduplicating FIFO queue with priority and per-domain batching
pub struct UrlQueue {
    config: QueueConfig,
    inner: Mutex<QueueInner>,
    bus: Option<Arc<SignalBus>>,
}

impl UrlQueue {
    #[must_use]
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(QueueInner::default()),
            bus: None,
        }
    }

    /// Attach a signal bus for queue events
    #[must_use]
    pub fn with_bus(mut self, bus: Arc<SignalBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Enqueue a URL
    ///
    /// Rejects duplicates (any of the three sets) and overflows. Returns
    /// whether the URL was accepted.
    ///
    /// # Arguments
    /// * `priority` - Lower is higher; `None` uses the depth
    pub fn add(
        &self,
        url: &str,
        depth: u32,
        parent_url: Option<String>,
        priority: Option<u32>,
    ) -> bool {
        let mut inner = self.inner.lock();

        if inner.queued.contains_key(url)
            || inner.in_progress.contains_key(url)
            || inner.processed.contains(url)
        {
            inner.duplicates += 1;
            return false;
        }

        if inner.queued.len() >= self.config.max_size {
            inner.overflow_drops += 1;
            warn!("Queue full ({}), dropping {url}", self.config.max_size);
            drop(inner);
            self.publish(CrawlSignal::overflow(url.to_string()));
            return false;
        }

        let task = UrlTask {
            url: url.to_string(),
            depth,
            parent_url,
            host: host_of(url).unwrap_or_else(|| "unknown".to_string()),
            priority: priority.unwrap_or(depth),
            enqueued_at: Utc::now(),
        };
        inner.queued.insert(url.to_string(), task);
        inner.added += 1;
        drop(inner);

        self.publish(CrawlSignal::url_added(url.to_string(), depth));
        true
    }

    /// Pull the next batch of tasks, moving them to in-progress
    ///
    /// Tasks are ordered by ascending priority (FIFO within equal priority)
    /// and capped at `domain_batch_size` per host.
    #[must_use]
    pub fn get_batch(&self) -> Vec<UrlTask> {
        let mut inner = self.inner.lock();

        let mut candidates: Vec<&UrlTask> = inner.queued.values().collect();
        candidates.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| a.enqueued_at.cmp(&b.enqueued_at))
        });

        let mut per_host: HashMap<String, usize> = HashMap::new();
        let mut selected: Vec<String> = Vec::new();
        for task in candidates {
            if selected.len() >= self.config.batch_size {
                break;
            }
            let count = per_host.entry(task.host.clone()).or_insert(0);
            if *count >= self.config.domain_batch_size {
                continue;
            }
            *count += 1;
            selected.push(task.url.clone());
        }

        let mut batch = Vec::with_capacity(selected.len());
        for url in selected {
            if let Some(task) = inner.queued.remove(&url) {
                inner.in_progress.insert(url, task.clone());
                batch.push(task);
            }
        }

        debug!(
            "Dispatching batch of {} ({} still queued)",
            batch.len(),
            inner.queued.len()
        );
        batch
    }

    /// Mark an in-progress URL as successfully processed
    pub fn complete(&self, url: &str) -> bool {
        let mut inner = self.inner.lock();
        if inner.in_progress.remove(url).is_none() {
            return false;
        }
        inner.processed.insert(url.to_string());
        inner.completed += 1;
        drop(inner);

        self.publish(CrawlSignal::url_complete(url.to_string()));
        true
    }

    /// Mark an in-progress URL as failed
    ///
    /// With `retry` the task is re-enqueued at a deprioritised priority;
    /// otherwise it becomes terminally processed.
    pub fn fail(&self, url: &str, error: &str, retry: bool) -> bool {
        let mut inner = self.inner.lock();
        let Some(task) = inner.in_progress.remove(url) else {
            return false;
        };

        if retry {
            let requeued = UrlTask {
                priority: RETRY_PRIORITY,
                enqueued_at: Utc::now(),
                ..task
            };
            inner.queued.insert(url.to_string(), requeued);
        } else {
            inner.processed.insert(url.to_string());
            inner.failed += 1;
        }
        drop(inner);

        self.publish(CrawlSignal::url_failed(url.to_string(), error.to_string()));
        true
    }

    /// Signal that no further URLs will be produced
    pub fn mark_discovery_complete(&self) {
        let mut inner = self.inner.lock();
        if inner.discovery_complete {
            return;
        }
        inner.discovery_complete = true;
        drop(inner);

        self.publish(CrawlSignal::discovery_complete());
    }

    /// True when discovery is complete and nothing is queued or in progress
    #[must_use]
    pub fn is_finished(&self) -> bool {
        let inner = self.inner.lock();
        inner.discovery_complete && inner.queued.is_empty() && inner.in_progress.is_empty()
    }

    /// True when a URL is present in any of the three sets
    #[must_use]
    pub fn contains(&self, url: &str) -> bool {
        let inner = self.inner.lock();
        inner.queued.contains_key(url)
            || inner.in_progress.contains_key(url)
            || inner.processed.contains(url)
    }

    /// Number of URLs waiting for dispatch
    #[must_use]
    pub fn queued_len(&self) -> usize {
        self.inner.lock().queued.len()
    }

    /// Number of URLs currently being processed
    #[must_use]
    pub fn in_progress_len(&self) -> usize {
        self.inner.lock().in_progress.len()
    }

    /// Read-only snapshot of counters and set sizes
    #[must_use]
    pub fn stats(&self) -> QueueStats {
        let inner = self.inner.lock();
        QueueStats {
            added: inner.added,
            duplicates: inner.duplicates,
            overflow_drops: inner.overflow_drops,
            completed: inner.completed,
            failed: inner.failed,
            queued: inner.queued.len(),
            in_progress: inner.in_progress.len(),
            processed: inner.processed.len(),
        }
    }

    fn publish(&self, signal: CrawlSignal) {
        if let Some(bus) = &self.bus {
            bus.publish(signal);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue() -> UrlQueue {
        UrlQueue::new(QueueConfig::default())
    }

    #[test]
    fn test_add_and_dedup() {
        let q = queue();
        assert!(q.add("https://example.com/", 0, None, None));
        assert!(!q.add("https://example.com/", 1, None, None));
        assert_eq!(q.stats().duplicates, 1);
        assert_eq!(q.stats().added, 1);
    }

    #[test]
    fn test_duplicate_of_processed_rejected() {
        let q = queue();
        q.add("https://example.com/", 0, None, None);
        let batch = q.get_batch();
        assert_eq!(batch.len(), 1);
        q.complete("https://example.com/");

        assert!(!q.add("https://example.com/", 2, None, None));
        assert_eq!(q.stats().duplicates, 1);
    }

    #[test]
    fn test_overflow_drops_and_counts() {
        let q = UrlQueue::new(QueueConfig {
            max_size: 2,
            ..QueueConfig::default()
        });
        assert!(q.add("https://example.com/1", 0, None, None));
        assert!(q.add("https://example.com/2", 0, None, None));
        assert!(!q.add("https://example.com/3", 0, None, None));
        assert_eq!(q.stats().overflow_drops, 1);
    }

    #[test]
    fn test_batch_priority_ordering() {
        let q = queue();
        q.add("https://example.com/deep", 3, None, None);
        q.add("https://example.com/shallow", 0, None, None);
        q.add("https://example.com/mid", 1, None, None);

        let batch = q.get_batch();
        let urls: Vec<&str> = batch.iter().map(|t| t.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://example.com/shallow",
                "https://example.com/mid",
                "https://example.com/deep"
            ]
        );
    }

    #[test]
    fn test_domain_batch_cap() {
        let q = UrlQueue::new(QueueConfig {
            max_size: 1000,
            batch_size: 10,
            domain_batch_size: 2,
        });
        for i in 0..5 {
            q.add(&format!("https://one.com/{i}"), 0, None, None);
        }
        for i in 0..5 {
            q.add(&format!("https://two.com/{i}"), 0, None, None);
        }

        let batch = q.get_batch();
        assert_eq!(batch.len(), 4);
        let one_count = batch.iter().filter(|t| t.host == "one.com").count();
        let two_count = batch.iter().filter(|t| t.host == "two.com").count();
        assert_eq!(one_count, 2);
        assert_eq!(two_count, 2);
    }

    #[test]
    fn test_fail_with_retry_requeues_deprioritised() {
        let q = queue();
        q.add("https://example.com/", 0, None, None);
        let _ = q.get_batch();
        assert!(q.fail("https://example.com/", "boom", true));

        let batch = q.get_batch();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].priority, RETRY_PRIORITY);
    }

    #[test]
    fn test_terminal_fail_is_processed() {
        let q = queue();
        q.add("https://example.com/", 0, None, None);
        let _ = q.get_batch();
        assert!(q.fail("https://example.com/", "boom", false));

        assert!(q.contains("https://example.com/"));
        assert_eq!(q.stats().failed, 1);
        assert_eq!(q.stats().processed, 1);
        assert!(!q.add("https://example.com/", 0, None, None));
    }

    #[test]
    fn test_lifecycle_and_is_finished() {
        let q = queue();
        q.add("https://example.com/", 0, None, None);
        assert!(!q.is_finished());

        q.mark_discovery_complete();
        assert!(!q.is_finished());

        let batch = q.get_batch();
        assert!(!q.is_finished());
        q.complete(&batch[0].url);
        assert!(q.is_finished());
    }

    #[tokio::test]
    async fn test_events_emitted() {
        let bus = Arc::new(SignalBus::new(16));
        let q = UrlQueue::new(QueueConfig::default()).with_bus(Arc::clone(&bus));
        let mut rx = bus.subscribe();

        q.add("https://example.com/", 0, None, None);
        assert!(matches!(
            rx.recv().await.expect("signal"),
            CrawlSignal::UrlAdded { .. }
        ));

        let _ = q.get_batch();
        q.complete("https://example.com/");
        assert!(matches!(
            rx.recv().await.expect("signal"),
            CrawlSignal::UrlComplete { .. }
        ));
    }
}
