//! The query and source-management surface over the rule engine.
//!
//! Input is validated here; everything below this layer assumes trimmed,
//! lowercased, well-formed domains.

use crate::config::{Config, SourceConfig};
use crate::engine::{
    is_valid_domain, DomainMatcher, QueryCache, QueryResult, RefreshManager, RefreshOutcome,
    RuleFetcher, RuleSource, RuleStore, SourceRegistry,
};
use crate::error::{QueryError, SourceError};
use crate::stats::{StatsCollector, StatsSnapshot};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const MAX_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub total_sources: usize,
    pub enabled_sources: usize,
    pub domain_rules: usize,
    pub hosts_rules: usize,
    pub regex_rules: usize,
    /// Unix millis of the most recent successful source update, 0 if none.
    pub last_update: i64,
    pub cache_size: u64,
    #[serde(flatten)]
    pub queries: StatsSnapshot,
}

/// Trims, lowercases and validates a user-supplied domain.
pub fn normalize_domain(raw: &str) -> Result<String, QueryError> {
    let domain = raw.trim().to_lowercase();
    if domain.is_empty() {
        return Err(QueryError::EmptyDomain);
    }
    if !is_valid_domain(&domain) {
        return Err(QueryError::InvalidDomain(raw.trim().to_string()));
    }
    Ok(domain)
}

fn validate_source(new: SourceConfig) -> Result<RuleSource, SourceError> {
    let url = new.url.trim();
    let name = new.name.trim();
    if url.is_empty() {
        return Err(SourceError::EmptyUrl);
    }
    if name.is_empty() {
        return Err(SourceError::EmptyName);
    }

    let parsed = url::Url::parse(url).map_err(|e| SourceError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(SourceError::InvalidUrl {
            url: url.to_string(),
            reason: format!("unsupported scheme '{}'", parsed.scheme()),
        });
    }

    Ok(RuleSource::new(url, name, new.enabled))
}

#[derive(Clone)]
pub struct RuleService {
    store: Arc<RuleStore>,
    registry: SourceRegistry,
    cache: QueryCache,
    manager: Arc<RefreshManager>,
    stats: Arc<StatsCollector>,
    refresh_tx: mpsc::Sender<()>,
}

impl RuleService {
    /// Builds the service from configuration. The returned receiver feeds
    /// [`RuleService::spawn_scheduler`].
    pub fn new(
        config: &Config,
        fetcher: Arc<dyn RuleFetcher>,
        stats: Arc<StatsCollector>,
    ) -> (Self, mpsc::Receiver<()>) {
        let store = Arc::new(RuleStore::new(config.updates.replace_policy()));
        let registry = SourceRegistry::new(config.initial_sources());
        let cache = QueryCache::new(config.cache.capacity, config.cache.ttl());
        let manager = Arc::new(RefreshManager::new(
            fetcher,
            store.clone(),
            registry.clone(),
            cache.clone(),
            config.updates.concurrent_downloads,
            config.updates.fetch_timeout(),
        ));

        // A single slot: a trigger arriving while one is queued is redundant
        let (refresh_tx, refresh_rx) = mpsc::channel(1);

        let service = Self {
            store,
            registry,
            cache,
            manager,
            stats,
            refresh_tx,
        };
        (service, refresh_rx)
    }

    /// Starts the background refresh loop: one refresh right away, then
    /// every `interval` and on each [`RuleService::refresh_now`].
    pub fn spawn_scheduler(
        &self,
        trigger: mpsc::Receiver<()>,
        interval: Duration,
    ) -> JoinHandle<()> {
        self.manager.clone().spawn_scheduler(interval, trigger)
    }

    fn resolve(&self, domain: &str) -> QueryResult {
        let start = Instant::now();
        self.stats.inc_queries();

        let snapshot = self.store.snapshot();
        if let Some(hit) = self.cache.get(domain, snapshot.generation()) {
            self.stats.inc_cache_hit();
            if let Some(kind) = hit.rule_type {
                self.stats.inc_blocked_by(kind);
            }
            return hit;
        }

        let mut result = QueryResult::from_matches(domain.to_string(), snapshot.check(domain));
        result.duration = start.elapsed().as_millis() as u64;
        if let Some(kind) = result.rule_type {
            self.stats.inc_blocked_by(kind);
        }
        debug!(
            "Resolved {}: blocked={} ({} matches)",
            domain,
            result.blocked,
            result.matched_rules.len()
        );

        self.cache.put(domain, snapshot.generation(), result.clone());
        result
    }

    pub fn query_domain(&self, raw: &str) -> Result<QueryResult, QueryError> {
        let domain = normalize_domain(raw)?;
        Ok(self.resolve(&domain))
    }

    /// Resolves up to [`MAX_BATCH_SIZE`] domains. Entries that fail
    /// validation are skipped, not reported.
    pub fn query_domains<S: AsRef<str>>(
        &self,
        raw: &[S],
    ) -> Result<Vec<QueryResult>, QueryError> {
        if raw.is_empty() {
            return Err(QueryError::EmptyBatch);
        }
        if raw.len() > MAX_BATCH_SIZE {
            return Err(QueryError::BatchTooLarge {
                max: MAX_BATCH_SIZE,
                got: raw.len(),
            });
        }

        Ok(raw
            .iter()
            .filter_map(|d| normalize_domain(d.as_ref()).ok())
            .map(|d| self.resolve(&d))
            .collect())
    }

    pub fn list_sources(&self) -> Vec<RuleSource> {
        self.registry.list()
    }

    /// Registers (or replaces) a source. Enabled sources are fetched in the
    /// background.
    pub fn add_source(&self, new: SourceConfig) -> Result<RuleSource, SourceError> {
        let source = validate_source(new)?;
        if self.registry.upsert(source.clone()).is_some() {
            info!("Replaced rule source '{}' ({})", source.name, source.url);
        } else {
            info!("Added rule source '{}' ({})", source.name, source.url);
        }
        self.cache.invalidate_all();

        if source.enabled {
            let manager = self.manager.clone();
            let url = source.url.clone();
            tokio::spawn(async move {
                let outcome = manager.refresh_source(&url).await;
                if let Some(RefreshOutcome::Failed(reason)) = outcome {
                    warn!("Initial fetch of {} failed: {}", url, reason);
                }
            });
        }

        Ok(source)
    }

    /// Removes a source and every rule it contributed. Returns whether the
    /// source was known.
    pub fn remove_source(&self, url: &str) -> Result<bool, SourceError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(SourceError::EmptyUrl);
        }

        let existed = self.registry.remove(url).is_some();
        self.store.delete(url);
        self.cache.invalidate_all();

        if existed {
            info!("Removed rule source {}", url);
        } else {
            debug!("Remove requested for unknown rule source {}", url);
        }
        Ok(existed)
    }

    /// Asks the scheduler for an out-of-band refresh without waiting for it.
    /// Returns false if the scheduler is no longer running.
    pub fn refresh_now(&self) -> bool {
        match self.refresh_tx.try_send(()) {
            Ok(()) => true,
            Err(TrySendError::Full(())) => {
                debug!("Refresh already pending");
                true
            }
            Err(TrySendError::Closed(())) => {
                warn!("Refresh requested but the scheduler is not running");
                false
            }
        }
    }

    /// Refreshes every enabled source and waits for completion.
    pub async fn refresh_all(&self) {
        self.manager.refresh_all().await;
    }

    /// Refreshes one source and waits for completion.
    pub async fn refresh_source(&self, url: &str) -> Option<RefreshOutcome> {
        self.manager.refresh_source(url).await
    }

    pub fn statistics(&self) -> Statistics {
        let counts = self.store.snapshot().counts();
        Statistics {
            total_sources: self.registry.len(),
            enabled_sources: self.registry.enabled_count(),
            domain_rules: counts.domain,
            hosts_rules: counts.hosts,
            regex_rules: counts.regex,
            last_update: self.registry.last_update().unwrap_or(0),
            cache_size: self.cache.len(),
            queries: self.stats.get_snapshot(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::RuleKind;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const A: &str = "https://lists.example/a.txt";

    #[derive(Default)]
    struct StaticFetcher {
        bodies: Mutex<HashMap<String, String>>,
    }

    #[async_trait::async_trait]
    impl RuleFetcher for StaticFetcher {
        async fn fetch(&self, url: &str) -> anyhow::Result<String> {
            self.bodies
                .lock()
                .unwrap()
                .get(url)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("404 Not Found"))
        }
    }

    fn service(content: &str) -> (RuleService, mpsc::Receiver<()>) {
        let fetcher = Arc::new(StaticFetcher::default());
        fetcher
            .bodies
            .lock()
            .unwrap()
            .insert(A.to_string(), content.to_string());

        let mut config = Config::default();
        config.sources = vec![SourceConfig {
            url: A.to_string(),
            name: "A".to_string(),
            enabled: true,
        }];
        RuleService::new(&config, fetcher, StatsCollector::new(60))
    }

    #[test]
    fn test_normalize_domain() {
        assert_eq!(normalize_domain("  Ads.Example.COM "), Ok("ads.example.com".to_string()));
        assert_eq!(normalize_domain("   "), Err(QueryError::EmptyDomain));
        assert!(matches!(
            normalize_domain("not a domain"),
            Err(QueryError::InvalidDomain(_))
        ));
    }

    #[test]
    fn test_validate_source() {
        let ok = validate_source(SourceConfig {
            url: " https://lists.example/x.txt ".into(),
            name: " X ".into(),
            enabled: false,
        })
        .unwrap();
        assert_eq!(ok.url, "https://lists.example/x.txt");
        assert_eq!(ok.name, "X");
        assert!(!ok.enabled);

        let empty_url = SourceConfig {
            url: " ".into(),
            name: "X".into(),
            enabled: true,
        };
        assert_eq!(validate_source(empty_url), Err(SourceError::EmptyUrl));

        let empty_name = SourceConfig {
            url: A.into(),
            name: "".into(),
            enabled: true,
        };
        assert_eq!(validate_source(empty_name), Err(SourceError::EmptyName));

        let bad_scheme = SourceConfig {
            url: "ftp://lists.example/x.txt".into(),
            name: "X".into(),
            enabled: true,
        };
        assert!(matches!(
            validate_source(bad_scheme),
            Err(SourceError::InvalidUrl { .. })
        ));
    }

    #[tokio::test]
    async fn test_query_uses_cache_until_rules_change() {
        let (service, _) = service("doubleclick.net");
        service.refresh_all().await;

        let first = service.query_domain("ads.doubleclick.net").unwrap();
        let second = service.query_domain("ads.doubleclick.net").unwrap();
        assert!(first.blocked);
        assert_eq!(first, second);
        assert_eq!(service.statistics().queries.cache_hits, 1);
        assert_eq!(service.statistics().queries.blocked_by_domain, 2);

        service.remove_source(A).unwrap();
        let third = service.query_domain("ads.doubleclick.net").unwrap();
        assert!(!third.blocked);
    }

    #[tokio::test]
    async fn test_batch_limits() {
        let (service, _) = service("a.com");
        assert_eq!(
            service.query_domains::<&str>(&[]),
            Err(QueryError::EmptyBatch)
        );

        let too_many: Vec<String> = (0..=MAX_BATCH_SIZE).map(|i| format!("d{}.com", i)).collect();
        assert_eq!(
            service.query_domains(&too_many),
            Err(QueryError::BatchTooLarge {
                max: MAX_BATCH_SIZE,
                got: MAX_BATCH_SIZE + 1
            })
        );

        let results = service
            .query_domains(&["a.com", "", "bad domain", "B.COM"])
            .unwrap();
        let domains: Vec<&str> = results.iter().map(|r| r.domain.as_str()).collect();
        assert_eq!(domains, vec!["a.com", "b.com"]);
    }

    #[tokio::test]
    async fn test_statistics() {
        let (service, _) = service("a.com\n0.0.0.0 b.com\n/^c/");
        service.refresh_all().await;
        service.query_domain("a.com").unwrap();

        let stats = service.statistics();
        assert_eq!(stats.total_sources, 1);
        assert_eq!(stats.enabled_sources, 1);
        assert_eq!(stats.domain_rules, 1);
        assert_eq!(stats.hosts_rules, 1);
        assert_eq!(stats.regex_rules, 1);
        assert!(stats.last_update > 0);
        assert_eq!(stats.cache_size, 1);
        assert_eq!(stats.queries.total_queries, 1);

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["domainRules"], 1);
        assert_eq!(json["totalQueries"], 1);
    }

    #[tokio::test]
    async fn test_refresh_now_without_scheduler() {
        let (service, rx) = service("a.com");
        assert!(service.refresh_now());
        // second trigger while the first is still queued
        assert!(service.refresh_now());
        drop(rx);
        assert!(!service.refresh_now());
    }

    #[tokio::test]
    async fn test_hosts_kind_is_reported() {
        let (service, _) = service("0.0.0.0 tracker.example");
        service.refresh_all().await;
        let result = service.query_domain("tracker.example").unwrap();
        assert_eq!(result.rule_type, Some(RuleKind::Hosts));
    }
}
