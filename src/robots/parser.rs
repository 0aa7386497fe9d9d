//! robots.txt line parser and path pattern matching
//!
//! Implements the RFC 9309 subset the crawler needs: user-agent sections with
//! Allow/Disallow/Crawl-delay directives, Sitemap collection, `*` wildcards
//! and a trailing `$` end-of-string anchor in path patterns.

use super::RobotsRules;

/// Parse a robots.txt body into rules for the configured user agent
///
/// Directive names are case-insensitive. A section is relevant when its agent
/// token is `*`, is a substring of the configured agent, or contains the
/// configured agent's product token. Sitemap directives are collected from
/// every section. Empty Disallow values are ignored; Crawl-delay must parse
/// as a positive float.
#[must_use]
pub fn parse_robots_txt(host: &str, body: &str, user_agent: &str) -> RobotsRules {
    let mut rules = RobotsRules::allow_all(host);

    let agent_lower = user_agent.to_lowercase();
    // Product token: "webgrazer/1.0 (+https://…)" → "webgrazer"
    let product_token = agent_lower
        .split(['/', ' '])
        .next()
        .unwrap_or(&agent_lower)
        .to_string();

    let mut in_relevant_section = false;
    let mut section_seen_directive = true;

    for raw_line in body.lines() {
        // Strip comments and surrounding whitespace
        let line = match raw_line.find('#') {
            Some(idx) => &raw_line[..idx],
            None => raw_line,
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim().to_lowercase();
        let value = value.trim();

        match name.as_str() {
            "user-agent" => {
                let agent = value.to_lowercase();
                let relevant = agent == "*"
                    || agent_lower.contains(agent.as_str())
                    || agent.contains(product_token.as_str());
                if section_seen_directive {
                    // A new agent group starts
                    in_relevant_section = relevant;
                    section_seen_directive = false;
                } else {
                    // Consecutive user-agent lines extend the current group
                    in_relevant_section = in_relevant_section || relevant;
                }
            }
            "sitemap" => {
                if !value.is_empty() {
                    rules.sitemaps.push(value.to_string());
                }
                // Sitemap lines do not terminate an agent group
            }
            "allow" => {
                section_seen_directive = true;
                if in_relevant_section && !value.is_empty() {
                    rules.allow_patterns.push(value.to_string());
                }
            }
            "disallow" => {
                section_seen_directive = true;
                if in_relevant_section && !value.is_empty() {
                    rules.disallow_patterns.push(value.to_string());
                }
            }
            "crawl-delay" => {
                section_seen_directive = true;
                if in_relevant_section
                    && let Ok(delay) = value.parse::<f64>()
                    && delay > 0.0
                {
                    rules.crawl_delay = Some(delay);
                }
            }
            _ => {
                section_seen_directive = true;
            }
        }
    }

    rules
}

/// Match a robots path pattern against a path+query string
///
/// Patterns containing `*` (any sequence) or a trailing `$` (end anchor) use
/// wildcard matching; everything else is a literal prefix match.
#[must_use]
pub fn pattern_matches(pattern: &str, path: &str) -> bool {
    if pattern.contains('*') || pattern.ends_with('$') {
        wildcard_matches(pattern, path)
    } else {
        path.starts_with(pattern)
    }
}

fn wildcard_matches(pattern: &str, path: &str) -> bool {
    let (pattern, anchored) = match pattern.strip_suffix('$') {
        Some(stripped) => (stripped, true),
        None => (pattern, false),
    };

    let parts: Vec<&str> = pattern.split('*').collect();
    let last_idx = parts.len() - 1;
    let mut pos = 0usize;

    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            // Leading literal must match at the start
            if !path.starts_with(part) {
                return false;
            }
            pos = part.len();
        } else if anchored && i == last_idx {
            // Final literal must sit at the very end, after what was consumed
            if path.len() < pos + part.len() || !path.ends_with(part) {
                return false;
            }
            pos = path.len();
        } else {
            match path[pos..].find(part) {
                Some(offset) => pos = pos + offset + part.len(),
                None => return false,
            }
        }
    }

    if anchored {
        // A pattern ending in "*$" consumes any remainder; otherwise the
        // whole path must have been matched
        pattern.ends_with('*') || pos == path.len()
    } else {
        true
    }
}
