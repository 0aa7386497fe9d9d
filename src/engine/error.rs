//! Engine boundary errors

use thiserror::Error;

/// Whole-run failures surfaced to the caller
///
/// Per-URL failures are recovered locally and never appear here; these are
/// the failures that end or prevent a run.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// Seed URL invalid or rejected by the domain filter
    #[error("invalid seed URL: {0}")]
    InvalidSeed(String),
    /// Configuration could not be realised (e.g. HTTP client build)
    #[error("configuration error: {0}")]
    Config(String),
    /// Result stream I/O failed after being opened
    #[error("writer failure: {0}")]
    Writer(String),
    /// Fingerprint cache could not be persisted at close
    #[error("fingerprint persistence failure: {0}")]
    Fingerprints(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
