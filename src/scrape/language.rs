//! Score-based language detection
//!
//! Matches page text against per-language function-word lists and picks the
//! highest score. Ties break to English, and text with no hits at all
//! defaults to English - the detector prefers a stable wrong answer over a
//! flapping one.

use std::collections::HashSet;

use once_cell::sync::Lazy;

/// Function words per supported language (ISO 639-1 code)
static FUNCTION_WORDS: Lazy<Vec<(&'static str, HashSet<&'static str>)>> = Lazy::new(|| {
    vec![
        (
            "en",
            [
                "the", "and", "of", "to", "in", "is", "that", "for", "with", "as", "was", "on",
                "are", "this", "be", "at", "by", "it", "from", "or",
            ]
            .into_iter()
            .collect(),
        ),
        (
            "es",
            [
                "el", "la", "de", "que", "y", "en", "los", "del", "se", "las", "por", "un", "una",
                "con", "para", "es", "su", "al", "como", "más",
            ]
            .into_iter()
            .collect(),
        ),
        (
            "fr",
            [
                "le", "la", "les", "de", "des", "et", "en", "un", "une", "du", "que", "pour",
                "dans", "sur", "avec", "est", "au", "qui", "par", "plus",
            ]
            .into_iter()
            .collect(),
        ),
        (
            "de",
            [
                "der", "die", "das", "und", "in", "den", "von", "zu", "mit", "sich", "des", "auf",
                "für", "ist", "im", "dem", "nicht", "ein", "eine", "als",
            ]
            .into_iter()
            .collect(),
        ),
        (
            "pt",
            [
                "de", "a", "o", "que", "e", "do", "da", "em", "um", "para", "com", "não", "uma",
                "os", "no", "se", "na", "por", "mais", "as",
            ]
            .into_iter()
            .collect(),
        ),
        (
            "it",
            [
                "di", "e", "il", "la", "che", "per", "un", "in", "una", "del", "con", "non",
                "sono", "della", "le", "si", "da", "al", "come", "più",
            ]
            .into_iter()
            .collect(),
        ),
    ]
});

/// Detect the dominant language of a text
#[must_use]
pub fn detect_language(text: &str) -> &'static str {
    let mut scores = vec![0usize; FUNCTION_WORDS.len()];

    for token in text.split_whitespace() {
        let word = token
            .trim_matches(|c: char| !c.is_alphanumeric())
            .to_lowercase();
        if word.is_empty() {
            continue;
        }
        for (idx, (_, words)) in FUNCTION_WORDS.iter().enumerate() {
            if words.contains(word.as_str()) {
                scores[idx] += 1;
            }
        }
    }

    // max_by_key keeps the later element on ties, so scan manually: the
    // first (English) entry must win equal scores
    let mut best_idx = 0;
    let mut best_score = scores[0];
    for (idx, score) in scores.iter().enumerate().skip(1) {
        if *score > best_score {
            best_idx = idx;
            best_score = *score;
        }
    }

    FUNCTION_WORDS[best_idx].0
}
