//! Named crawl signals over a broadcast channel
//!
//! The queue and engine surface observable events (url-added, url-complete,
//! url-failed, overflow, discovery-complete, progress). Subscribers receive
//! them through a `tokio::sync::broadcast` channel; there is no global bus,
//! each engine owns its own.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Default buffered capacity for a signal channel
const DEFAULT_CAPACITY: usize = 1024;

/// Observable signals emitted during a crawl
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CrawlSignal {
    /// A URL was accepted into the queue
    UrlAdded {
        url: String,
        depth: u32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    /// A URL finished processing (success or skip)
    UrlComplete {
        url: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    /// A URL failed terminally
    UrlFailed {
        url: String,
        error: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    /// The queue rejected a URL because it is full
    Overflow {
        url: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    /// No further URLs will be produced
    DiscoveryComplete {
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    /// Periodic progress summary from the engine
    Progress {
        discovered: usize,
        processed: usize,
        failed: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl CrawlSignal {
    #[must_use]
    pub fn url_added(url: String, depth: u32) -> Self {
        Self::UrlAdded {
            url,
            depth,
            timestamp: chrono::Utc::now(),
        }
    }

    #[must_use]
    pub fn url_complete(url: String) -> Self {
        Self::UrlComplete {
            url,
            timestamp: chrono::Utc::now(),
        }
    }

    #[must_use]
    pub fn url_failed(url: String, error: String) -> Self {
        Self::UrlFailed {
            url,
            error,
            timestamp: chrono::Utc::now(),
        }
    }

    #[must_use]
    pub fn overflow(url: String) -> Self {
        Self::Overflow {
            url,
            timestamp: chrono::Utc::now(),
        }
    }

    #[must_use]
    pub fn discovery_complete() -> Self {
        Self::DiscoveryComplete {
            timestamp: chrono::Utc::now(),
        }
    }

    #[must_use]
    pub fn progress(discovered: usize, processed: usize, failed: usize) -> Self {
        Self::Progress {
            discovered,
            processed,
            failed,
            timestamp: chrono::Utc::now(),
        }
    }
}

/// Broadcast bus for crawl signals
///
/// Publishing never blocks; when no subscriber is attached the signal is
/// dropped silently. Lagging subscribers lose the oldest events.
#[derive(Debug)]
pub struct SignalBus {
    sender: broadcast::Sender<CrawlSignal>,
}

impl Default for SignalBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl SignalBus {
    /// Create a bus with the given buffered capacity
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to all future signals
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CrawlSignal> {
        self.sender.subscribe()
    }

    /// Publish a signal to all current subscribers
    pub fn publish(&self, signal: CrawlSignal) {
        // A send error only means there are no subscribers right now.
        let _ = self.sender.send(signal);
    }

    /// Number of currently attached subscribers
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
