use super::types::{RuleSource, SourceStatus};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// Metadata for every known rule source, keyed by URL.
///
/// Guards are never held across an `.await`; callers get clones.
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    sources: Arc<RwLock<BTreeMap<String, RuleSource>>>,
}

impl SourceRegistry {
    pub fn new(initial: impl IntoIterator<Item = RuleSource>) -> Self {
        let sources = initial.into_iter().map(|s| (s.url.clone(), s)).collect();
        Self {
            sources: Arc::new(RwLock::new(sources)),
        }
    }

    pub fn list(&self) -> Vec<RuleSource> {
        let guard = self.sources.read().unwrap();
        guard.values().cloned().collect()
    }

    pub fn enabled(&self) -> Vec<RuleSource> {
        let guard = self.sources.read().unwrap();
        guard.values().filter(|s| s.enabled).cloned().collect()
    }

    pub fn get(&self, url: &str) -> Option<RuleSource> {
        let guard = self.sources.read().unwrap();
        guard.get(url).cloned()
    }

    pub fn contains(&self, url: &str) -> bool {
        let guard = self.sources.read().unwrap();
        guard.contains_key(url)
    }

    /// Inserts or replaces the source stored under its URL.
    pub fn upsert(&self, source: RuleSource) -> Option<RuleSource> {
        let mut guard = self.sources.write().unwrap();
        guard.insert(source.url.clone(), source)
    }

    pub fn remove(&self, url: &str) -> Option<RuleSource> {
        let mut guard = self.sources.write().unwrap();
        guard.remove(url)
    }

    /// Records a refresh outcome. No-op if the source was removed meanwhile.
    pub fn record_status(&self, url: &str, status: SourceStatus) {
        let mut guard = self.sources.write().unwrap();
        if let Some(source) = guard.get_mut(url) {
            source.status = status;
        }
    }

    /// Records a successful commit of `rule_count` rules at `now_ms`.
    pub fn record_update(&self, url: &str, rule_count: usize, now_ms: i64) {
        let mut guard = self.sources.write().unwrap();
        if let Some(source) = guard.get_mut(url) {
            source.rule_count = rule_count;
            source.last_updated = Some(now_ms);
            source.status = SourceStatus::Updated;
        }
    }

    pub fn len(&self) -> usize {
        self.sources.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn enabled_count(&self) -> usize {
        let guard = self.sources.read().unwrap();
        guard.values().filter(|s| s.enabled).count()
    }

    /// Most recent successful update across all sources.
    pub fn last_update(&self) -> Option<i64> {
        let guard = self.sources.read().unwrap();
        guard.values().filter_map(|s| s.last_updated).max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_lifecycle() {
        let registry = SourceRegistry::new(vec![
            RuleSource::new("https://b", "B", true),
            RuleSource::new("https://a", "A", false),
        ]);

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.enabled_count(), 1);
        assert_eq!(registry.enabled()[0].url, "https://b");
        assert_eq!(registry.last_update(), None);

        registry.record_update("https://b", 42, 1_000);
        let b = registry.get("https://b").unwrap();
        assert_eq!(b.rule_count, 42);
        assert_eq!(b.last_updated, Some(1_000));
        assert_eq!(b.status, SourceStatus::Updated);
        assert_eq!(registry.last_update(), Some(1_000));

        registry.record_status("https://b", SourceStatus::Failed("timeout".into()));
        let b = registry.get("https://b").unwrap();
        // failure keeps the last good count
        assert_eq!(b.rule_count, 42);
        assert_eq!(b.status, SourceStatus::Failed("timeout".into()));

        assert!(registry.remove("https://a").is_some());
        assert!(!registry.contains("https://a"));
    }

    #[test]
    fn test_updates_for_removed_source_are_dropped() {
        let registry = SourceRegistry::default();
        registry.record_update("https://gone", 10, 5);
        registry.record_status("https://gone", SourceStatus::Empty);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_list_is_sorted_by_url() {
        let registry = SourceRegistry::default();
        registry.upsert(RuleSource::new("https://z", "Z", true));
        registry.upsert(RuleSource::new("https://m", "M", true));
        let urls: Vec<String> = registry.list().into_iter().map(|s| s.url).collect();
        assert_eq!(urls, vec!["https://m", "https://z"]);
    }
}
