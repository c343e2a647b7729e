use regex::{Regex, RegexBuilder};
use rustc_hash::FxHashSet;
use tracing::debug;

/// A compiled regex rule together with the text it was compiled from.
#[derive(Debug, Clone)]
pub struct RegexRule {
    pub source: Box<str>,
    pub pattern: Regex,
}

/// Typed rules extracted from one source's raw content.
#[derive(Debug, Clone, Default)]
pub struct ParsedRules {
    pub domains: FxHashSet<Box<str>>,
    pub hosts: FxHashSet<Box<str>>,
    /// First-seen order, deduplicated by pattern text.
    pub regexes: Vec<RegexRule>,
    /// Lines accepted into any category, duplicates included.
    pub accepted: usize,
}

impl ParsedRules {
    pub fn is_empty(&self) -> bool {
        self.domains.is_empty() && self.hosts.is_empty() && self.regexes.is_empty()
    }
}

enum Line {
    Domain(Box<str>),
    Hosts(Box<str>),
    Regex(RegexRule),
}

/// Checks `[A-Za-z0-9.-]+\.[A-Za-z]{2,}` over the whole string, without
/// leading or trailing dots and without empty labels.
pub fn is_valid_domain(domain: &str) -> bool {
    let domain = domain.trim();
    if domain.is_empty() || domain.starts_with('.') || domain.ends_with('.') {
        return false;
    }
    if domain.contains("..") {
        return false;
    }
    if !domain
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'-')
    {
        return false;
    }

    // The TLD part holds no dots, so it must follow the last one.
    match domain.rfind('.') {
        Some(idx) => {
            let tld = &domain[idx + 1..];
            idx > 0 && tld.len() >= 2 && tld.bytes().all(|b| b.is_ascii_alphabetic())
        }
        None => false,
    }
}

fn normalized_domain(candidate: &str) -> Option<Box<str>> {
    let candidate = candidate.trim().to_lowercase();
    if is_valid_domain(&candidate) {
        Some(candidate.into_boxed_str())
    } else {
        None
    }
}

fn compile_regex(pattern: &str) -> Option<RegexRule> {
    if pattern.is_empty() {
        return None;
    }
    match RegexBuilder::new(pattern).case_insensitive(true).build() {
        Ok(compiled) => Some(RegexRule {
            source: pattern.into(),
            pattern: compiled,
        }),
        Err(e) => {
            debug!("Skipping invalid regex rule /{}/: {}", pattern, e);
            None
        }
    }
}

fn parse_line(line: &str) -> Option<Line> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
        return None;
    }

    // Exception rules are not supported
    if line.starts_with("@@") {
        return None;
    }

    if let Some(inner) = line
        .strip_prefix("||")
        .and_then(|rest| rest.strip_suffix('^'))
    {
        return normalized_domain(inner).map(Line::Domain);
    }

    if line.len() >= 2 && line.starts_with('/') && line.ends_with('/') {
        return compile_regex(&line[1..line.len() - 1]).map(Line::Regex);
    }

    if line.contains(char::is_whitespace) {
        return line
            .split_whitespace()
            .nth(1)
            .and_then(normalized_domain)
            .map(Line::Hosts);
    }

    normalized_domain(line).map(Line::Domain)
}

/// Parses raw block-list text into typed rule sets. Malformed lines are
/// skipped; this never fails.
pub fn parse_rules(source_id: &str, text: &str) -> ParsedRules {
    let mut parsed = ParsedRules::default();
    let mut seen_patterns: FxHashSet<Box<str>> = FxHashSet::default();
    let mut skipped = 0usize;

    for raw in text.lines() {
        match parse_line(raw) {
            Some(Line::Domain(domain)) => {
                parsed.domains.insert(domain);
                parsed.accepted += 1;
            }
            Some(Line::Hosts(domain)) => {
                parsed.hosts.insert(domain);
                parsed.accepted += 1;
            }
            Some(Line::Regex(rule)) => {
                if seen_patterns.insert(rule.source.clone()) {
                    parsed.regexes.push(rule);
                }
                parsed.accepted += 1;
            }
            None => skipped += 1,
        }
    }

    debug!(
        "Parsed '{}': {} domain, {} hosts, {} regex rules ({} accepted, {} lines skipped)",
        source_id,
        parsed.domains.len(),
        parsed.hosts.len(),
        parsed.regexes.len(),
        parsed.accepted,
        skipped
    );

    parsed
}
