//! URL and path manipulation utilities.
//!
//! This module provides functions for working with URLs and host names
//! in the context of web crawling and cache persistence.

use url::Url;

/// Schemes the crawler can actually fetch
const CRAWLABLE_SCHEMES: &[&str] = &["http", "https"];

/// Check if a URL is a crawlable absolute HTTP(S) URL
///
/// Anything the parser rejects, any non-web scheme (`javascript:`,
/// `mailto:`, `data:`, `ftp:`, ...) and host-less URLs all fail the check.
#[must_use]
pub fn is_valid_url(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    CRAWLABLE_SCHEMES.contains(&parsed.scheme()) && parsed.host_str().is_some()
}

/// Extract the lower-cased host component of an absolute URL
///
/// Returns None if the URL is unparseable or has no host.
#[must_use]
pub fn host_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
}

/// Sanitize a host name for use as a filename
///
/// Replaces any character outside `[A-Za-z0-9.-]` with `_` so per-host
/// cache files are safe on all filesystems.
#[must_use]
pub fn sanitize_host(host: &str) -> String {
    host.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_valid_url() {
        assert!(is_valid_url("https://example.com/page"));
        assert!(is_valid_url("http://example.com"));
        assert!(!is_valid_url(""));
        assert!(!is_valid_url("javascript:void(0)"));
        assert!(!is_valid_url("mailto:someone@example.com"));
        assert!(!is_valid_url("data:text/plain,hello"));
        assert!(!is_valid_url("ftp://example.com/file"));
        assert!(!is_valid_url("not a url"));
    }

    #[test]
    fn test_host_of() {
        assert_eq!(host_of("https://Example.COM/path"), Some("example.com".to_string()));
        assert_eq!(
            host_of("http://sub.example.com:8080/x?q=1"),
            Some("sub.example.com".to_string())
        );
        assert_eq!(host_of("not a url"), None);
    }

    #[test]
    fn test_sanitize_host() {
        assert_eq!(sanitize_host("example.com"), "example.com");
        assert_eq!(sanitize_host("sub.example-site.com"), "sub.example-site.com");
        assert_eq!(sanitize_host("host:8080"), "host_8080");
        assert_eq!(sanitize_host("weird/host name"), "weird_host_name");
    }
}
