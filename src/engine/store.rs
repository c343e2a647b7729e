//! Per-source rule storage.
//!
//! The whole store is a single immutable [`StoreState`] behind an
//! [`ArcSwap`]. Readers take a [`RuleSnapshot`] without locking; writers build
//! the next state with `rcu`, sharing every untouched source's rules by `Arc`.

use super::parser::{ParsedRules, RegexRule};
use arc_swap::ArcSwap;
use rustc_hash::FxHashSet;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// How `replace` treats a category that parsed to nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplacePolicy {
    /// Keep the previous non-empty set for that category.
    #[default]
    KeepNonEmpty,
    /// Install the empty set.
    Overwrite,
}

/// The rules committed for one source.
#[derive(Debug, Clone)]
pub struct SourceRules {
    pub name: Arc<str>,
    pub domains: Arc<FxHashSet<Box<str>>>,
    pub hosts: Arc<FxHashSet<Box<str>>>,
    pub regexes: Arc<Vec<RegexRule>>,
}

impl SourceRules {
    fn is_empty(&self) -> bool {
        self.domains.is_empty() && self.hosts.is_empty() && self.regexes.is_empty()
    }
}

#[derive(Debug, Default)]
struct StoreState {
    generation: u64,
    // Sorted by source URL; match output order depends on it.
    sources: BTreeMap<Arc<str>, Arc<SourceRules>>,
}

/// Rule totals per category, summed across sources.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RuleCounts {
    pub domain: usize,
    pub hosts: usize,
    pub regex: usize,
}

/// An immutable view of the store, valid for as long as it is held.
#[derive(Debug, Clone)]
pub struct RuleSnapshot {
    state: Arc<StoreState>,
}

impl RuleSnapshot {
    /// Bumped by every store mutation; cached results carry the generation
    /// they were computed against.
    pub fn generation(&self) -> u64 {
        self.state.generation
    }

    /// Sources in ascending identifier order.
    pub fn sources(&self) -> impl Iterator<Item = (&str, &SourceRules)> {
        self.state
            .sources
            .iter()
            .map(|(id, rules)| (id.as_ref(), rules.as_ref()))
    }

    pub fn get(&self, source_id: &str) -> Option<&SourceRules> {
        self.state.sources.get(source_id).map(|r| r.as_ref())
    }

    pub fn source_count(&self) -> usize {
        self.state.sources.len()
    }

    pub fn counts(&self) -> RuleCounts {
        self.state
            .sources
            .values()
            .fold(RuleCounts::default(), |acc, rules| RuleCounts {
                domain: acc.domain + rules.domains.len(),
                hosts: acc.hosts + rules.hosts.len(),
                regex: acc.regex + rules.regexes.len(),
            })
    }
}

#[derive(Debug)]
pub struct RuleStore {
    state: ArcSwap<StoreState>,
    policy: ReplacePolicy,
}

impl RuleStore {
    pub fn new(policy: ReplacePolicy) -> Self {
        Self {
            state: ArcSwap::from_pointee(StoreState::default()),
            policy,
        }
    }

    pub fn snapshot(&self) -> RuleSnapshot {
        RuleSnapshot {
            state: self.state.load_full(),
        }
    }

    pub fn generation(&self) -> u64 {
        self.state.load().generation
    }

    /// Installs the parsed rules for `source_id` in one atomic step.
    pub fn replace(&self, source_id: &str, source_name: &str, parsed: ParsedRules) {
        let ParsedRules {
            domains,
            hosts,
            regexes,
            ..
        } = parsed;
        let id: Arc<str> = Arc::from(source_id);
        let name: Arc<str> = Arc::from(source_name);
        let domains = Arc::new(domains);
        let hosts = Arc::new(hosts);
        let regexes = Arc::new(regexes);
        let policy = self.policy;

        self.state.rcu(|current| {
            let previous = current.sources.get(&id);
            let keep = |fresh_empty: bool| policy == ReplacePolicy::KeepNonEmpty && fresh_empty;

            let rules = SourceRules {
                name: name.clone(),
                domains: match previous {
                    Some(prev) if keep(domains.is_empty()) => prev.domains.clone(),
                    _ => domains.clone(),
                },
                hosts: match previous {
                    Some(prev) if keep(hosts.is_empty()) => prev.hosts.clone(),
                    _ => hosts.clone(),
                },
                regexes: match previous {
                    Some(prev) if keep(regexes.is_empty()) => prev.regexes.clone(),
                    _ => regexes.clone(),
                },
            };

            let mut sources = current.sources.clone();
            if rules.is_empty() {
                sources.remove(&id);
            } else {
                sources.insert(id.clone(), Arc::new(rules));
            }
            StoreState {
                generation: current.generation + 1,
                sources,
            }
        });
    }

    /// Removes every category for `source_id`. Returns whether anything was
    /// stored for it.
    pub fn delete(&self, source_id: &str) -> bool {
        let previous = self.state.rcu(|current| {
            let mut sources = current.sources.clone();
            sources.remove(source_id);
            StoreState {
                generation: current.generation + 1,
                sources,
            }
        });
        previous.sources.contains_key(source_id)
    }
}

impl Default for RuleStore {
    fn default() -> Self {
        Self::new(ReplacePolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::parser::parse_rules;

    const URL: &str = "https://lists.example/a.txt";

    fn domains_of(snapshot: &RuleSnapshot, id: &str) -> Vec<String> {
        let mut out: Vec<String> = snapshot
            .get(id)
            .map(|r| r.domains.iter().map(|d| d.to_string()).collect())
            .unwrap_or_default();
        out.sort();
        out
    }

    #[test]
    fn test_replace_and_snapshot() {
        let store = RuleStore::default();
        let before = store.snapshot();

        store.replace(URL, "A", parse_rules(URL, "ads.com\n0.0.0.0 t.example\n/^x/"));

        let after = store.snapshot();
        assert_eq!(before.source_count(), 0);
        assert_eq!(after.source_count(), 1);
        assert!(after.generation() > before.generation());
        assert_eq!(
            after.counts(),
            RuleCounts {
                domain: 1,
                hosts: 1,
                regex: 1
            }
        );
        assert_eq!(&*after.get(URL).unwrap().name, "A");
    }

    #[test]
    fn test_snapshot_is_isolated_from_later_writes() {
        let store = RuleStore::default();
        store.replace(URL, "A", parse_rules(URL, "old.com"));
        let held = store.snapshot();

        store.replace(URL, "A", parse_rules(URL, "new.com"));

        assert_eq!(domains_of(&held, URL), vec!["old.com"]);
        assert_eq!(domains_of(&store.snapshot(), URL), vec!["new.com"]);
    }

    #[test]
    fn test_empty_category_keeps_previous_rules() {
        let store = RuleStore::new(ReplacePolicy::KeepNonEmpty);
        store.replace(URL, "A", parse_rules(URL, "ads.com\n/^x/"));
        store.replace(URL, "A", parse_rules(URL, "other.com"));

        let snap = store.snapshot();
        assert_eq!(domains_of(&snap, URL), vec!["other.com"]);
        assert_eq!(snap.get(URL).unwrap().regexes.len(), 1);
    }

    #[test]
    fn test_overwrite_policy_clears_empty_categories() {
        let store = RuleStore::new(ReplacePolicy::Overwrite);
        store.replace(URL, "A", parse_rules(URL, "ads.com\n/^x/"));
        store.replace(URL, "A", parse_rules(URL, "other.com"));

        let snap = store.snapshot();
        assert_eq!(domains_of(&snap, URL), vec!["other.com"]);
        assert!(snap.get(URL).unwrap().regexes.is_empty());
    }

    #[test]
    fn test_delete_only_touches_one_source() {
        let store = RuleStore::default();
        store.replace("b", "B", parse_rules("b", "b.com"));
        store.replace("a", "A", parse_rules("a", "a.com"));

        assert!(store.delete("a"));
        assert!(!store.delete("a"));

        let snap = store.snapshot();
        assert!(snap.get("a").is_none());
        assert_eq!(domains_of(&snap, "b"), vec!["b.com"]);
    }

    #[test]
    fn test_sources_iterate_in_identifier_order() {
        let store = RuleStore::default();
        for id in ["https://c", "https://a", "https://b"] {
            store.replace(id, id, parse_rules(id, "x.com"));
        }
        let ids: Vec<String> = store
            .snapshot()
            .sources()
            .map(|(id, _)| id.to_string())
            .collect();
        assert_eq!(ids, vec!["https://a", "https://b", "https://c"]);
    }

    #[test]
    fn test_concurrent_replace_keeps_all_sources() {
        let store = Arc::new(RuleStore::default());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    let id = format!("https://src{}", i);
                    store.replace(&id, &id, parse_rules(&id, &format!("d{}.com", i)));
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let snap = store.snapshot();
        assert_eq!(snap.source_count(), 8);
        assert_eq!(snap.generation(), 8);
    }
}
