use super::store::{RuleSnapshot, SourceRules};
use super::traits::DomainMatcher;
use super::types::{MatchedRule, RuleKind};
use rustc_hash::FxHashSet;

/// Finds `domain` or its closest listed ancestor in `set`.
///
/// Walks parents by stripping one leading label at a time, so a rule only
/// ever matches on a dot boundary (`notads.com` never hits `ads.com`).
fn ancestor_match<'a>(set: &FxHashSet<Box<str>>, domain: &'a str) -> Option<&'a str> {
    let mut part = domain;
    loop {
        if set.contains(part) {
            return Some(part);
        }

        // Strip leading label
        match part.find('.') {
            Some(idx) => {
                part = &part[idx + 1..];
                if part.is_empty() {
                    break;
                }
            }
            None => break,
        }
    }

    None
}

fn regex_match<'a>(rules: &'a SourceRules, domain: &str) -> Option<&'a str> {
    rules
        .regexes
        .iter()
        .find(|r| r.pattern.is_match(domain))
        .map(|r| &*r.source)
}

fn record(
    matches: &mut Vec<MatchedRule>,
    source_id: &str,
    rules: &SourceRules,
    rule: &str,
    kind: RuleKind,
) {
    matches.push(MatchedRule {
        rule: rule.to_string(),
        rule_source: rules.name.to_string(),
        rule_source_url: source_id.to_string(),
        rule_type: kind,
    });
}

/// Resolves `domain` against every source in the snapshot.
///
/// `domain` must already be trimmed, lowercased and validated. Output is all
/// domain matches, then all hosts matches, then all regex matches, each group
/// in source identifier order, with at most one match per source per group.
pub fn match_domain(snapshot: &RuleSnapshot, domain: &str) -> Vec<MatchedRule> {
    let mut matches = Vec::new();

    for (source_id, rules) in snapshot.sources() {
        if let Some(rule) = ancestor_match(&rules.domains, domain) {
            record(&mut matches, source_id, rules, rule, RuleKind::Domain);
        }
    }

    for (source_id, rules) in snapshot.sources() {
        if let Some(rule) = ancestor_match(&rules.hosts, domain) {
            record(&mut matches, source_id, rules, rule, RuleKind::Hosts);
        }
    }

    for (source_id, rules) in snapshot.sources() {
        if let Some(rule) = regex_match(rules, domain) {
            record(&mut matches, source_id, rules, rule, RuleKind::Regex);
        }
    }

    matches
}

impl DomainMatcher for RuleSnapshot {
    fn check(&self, domain: &str) -> Vec<MatchedRule> {
        match_domain(self, domain)
    }
}
