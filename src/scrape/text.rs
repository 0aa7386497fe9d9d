//! Text normalisation and hashing helpers

use sha2::{Digest, Sha256};

/// Length of the hex prefix kept from the SHA-256 digest
const CONTENT_HASH_LEN: usize = 16;

/// Normalise extracted page text
///
/// Collapses whitespace runs inside lines, reduces consecutive blank lines to
/// a single paragraph break and trims the result.
#[must_use]
pub fn normalize_text(raw: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut blank_pending = false;

    for line in raw.lines() {
        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            blank_pending = !lines.is_empty();
        } else {
            if blank_pending {
                lines.push(String::new());
                blank_pending = false;
            }
            lines.push(collapsed);
        }
    }

    lines.join("\n")
}

/// Count whitespace-separated tokens
#[must_use]
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// First 16 hex characters of the SHA-256 of the body text
///
/// An empty body hashes to the empty string so unchanged-empty pages never
/// collide with real content.
#[must_use]
pub fn content_hash(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let digest = Sha256::digest(text.as_bytes());
    hex::encode(digest)[..CONTENT_HASH_LEN].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_collapses_whitespace() {
        assert_eq!(normalize_text("a   b\t\tc"), "a b c");
    }

    #[test]
    fn test_normalize_blank_lines() {
        let raw = "first\n\n\n\nsecond\n\n";
        assert_eq!(normalize_text(raw), "first\n\nsecond");
    }

    #[test]
    fn test_normalize_trims() {
        assert_eq!(normalize_text("\n\n  hello  \n\n"), "hello");
    }

    #[test]
    fn test_word_count() {
        assert_eq!(word_count("one two  three\nfour"), 4);
        assert_eq!(word_count(""), 0);
        assert_eq!(word_count("   "), 0);
    }

    #[test]
    fn test_content_hash() {
        let hash = content_hash("hello world");
        assert_eq!(hash.len(), 16);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hash, content_hash("hello world"));
        assert_ne!(hash, content_hash("hello worlds"));
        assert_eq!(content_hash(""), "");
    }
}
