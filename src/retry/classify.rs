//! Error classification for retry decisions
//!
//! Failures are sorted into transient (worth retrying), permanent (never
//! retried) and unknown. HTTP status codes are authoritative when present;
//! otherwise the error message is matched against pattern lists.

use crate::fetcher::FetchError;

/// Retry-relevant classification of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Likely to succeed on retry (timeouts, 5xx, 408, 429)
    Transient,
    /// Will not succeed on retry (4xx, malformed input, robots denial)
    Permanent,
    /// Unclassifiable - retryability is a configuration decision
    Unknown,
}

/// Message fragments that indicate a transient failure
const TRANSIENT_PATTERNS: &[&str] = &[
    "timeout",
    "timed out",
    "timed_out",
    "etimedout",
    "connection reset",
    "connection_reset",
    "econnreset",
    "connection refused",
    "connection_refused",
    "econnrefused",
    "socket hang up",
    "dns",
    "name_not_resolved",
    "eai_again",
    "network",
    "temporarily unavailable",
    "too many requests",
];

/// Message fragments that indicate a permanent failure
const PERMANENT_PATTERNS: &[&str] = &[
    "not found",
    "forbidden",
    "unauthorized",
    "invalid url",
    "malformed",
    "blocked by robots",
];

/// HTTP statuses worth retrying: 408, 429 and the 5xx range
/// (including the Cloudflare 520-524 variants)
#[must_use]
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 429) || (500..=599).contains(&status)
}

/// Classify an error for the retry controller
#[must_use]
pub fn classify_error(error: &anyhow::Error) -> ErrorClass {
    if let Some(fetch_err) = error.downcast_ref::<FetchError>()
        && let Some(status) = fetch_err.status_code()
    {
        if is_retryable_status(status) {
            return ErrorClass::Transient;
        }
        if (400..=499).contains(&status) {
            return ErrorClass::Permanent;
        }
    }

    let message = format!("{error:#}").to_lowercase();
    if TRANSIENT_PATTERNS.iter().any(|p| message.contains(p)) {
        return ErrorClass::Transient;
    }
    if PERMANENT_PATTERNS.iter().any(|p| message.contains(p)) {
        return ErrorClass::Permanent;
    }

    ErrorClass::Unknown
}

/// Short name for per-error-kind counters
#[must_use]
pub fn error_name(error: &anyhow::Error) -> String {
    if let Some(fetch_err) = error.downcast_ref::<FetchError>() {
        return fetch_err.kind_name().to_string();
    }
    match classify_error(error) {
        ErrorClass::Transient => "transient".to_string(),
        ErrorClass::Permanent => "permanent".to_string(),
        ErrorClass::Unknown => "unknown".to_string(),
    }
}
