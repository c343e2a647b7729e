use super::cache::QueryCache;
use super::parser::parse_rules;
use super::sources::SourceRegistry;
use super::store::RuleStore;
use super::traits::RuleFetcher;
use super::types::{RuleSource, SourceStatus};
use anyhow::{Context, Result};
use futures::{stream, FutureExt, StreamExt};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

/// Upper bound on the scheduler period; longer periods overflow `Instant`.
const MAX_REFRESH_INTERVAL: Duration = Duration::from_secs(365 * 24 * 3600);

/// Fetches rule sources over HTTP(S).
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent("RuleCheck/1.0")
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl RuleFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        let resp = self.client.get(url).send().await?.error_for_status()?;
        Ok(resp.text().await?)
    }
}

/// What a single source refresh ended with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Updated(usize),
    Empty,
    Failed(String),
    /// The source was removed while its fetch was in flight.
    Discarded,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub updated: usize,
    pub empty: usize,
    pub failed: usize,
}

/// Keeps the rule store in step with the configured sources.
pub struct RefreshManager {
    fetcher: Arc<dyn RuleFetcher>,
    store: Arc<RuleStore>,
    registry: SourceRegistry,
    cache: QueryCache,
    concurrent_downloads: usize,
    fetch_timeout: Duration,
}

impl RefreshManager {
    pub fn new(
        fetcher: Arc<dyn RuleFetcher>,
        store: Arc<RuleStore>,
        registry: SourceRegistry,
        cache: QueryCache,
        concurrent_downloads: usize,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            fetcher,
            store,
            registry,
            cache,
            concurrent_downloads: concurrent_downloads.max(1),
            fetch_timeout,
        }
    }

    /// Fetches, parses and commits one source.
    ///
    /// Failed and empty fetches leave the stored rules untouched; only the
    /// source status changes.
    pub async fn refresh_one(&self, source: &RuleSource) -> RefreshOutcome {
        let url = source.url.as_str();
        info!("Fetching rule source '{}' from {}", source.name, url);

        let fetch = self.fetcher.fetch(url);
        let body = match tokio::time::timeout(self.fetch_timeout, fetch).await {
            Ok(Ok(body)) => body,
            Ok(Err(e)) => {
                error!("Failed to fetch {}: {:#}", url, e);
                return self.fail(url, format!("{:#}", e));
            }
            Err(_) => {
                error!(
                    "Fetching {} timed out after {}s",
                    url,
                    self.fetch_timeout.as_secs()
                );
                return self.fail(
                    url,
                    format!("timed out after {}s", self.fetch_timeout.as_secs()),
                );
            }
        };

        if body.trim().is_empty() {
            warn!("Rule source '{}' returned an empty body", source.name);
            self.registry.record_status(url, SourceStatus::Empty);
            return RefreshOutcome::Empty;
        }

        let parsed = parse_rules(url, &body);
        let accepted = parsed.accepted;

        // Current name wins over the one captured when the refresh started
        let name = match self.registry.get(url) {
            Some(current) => current.name,
            None => {
                info!("Rule source {} was removed during refresh, discarding", url);
                return RefreshOutcome::Discarded;
            }
        };

        self.store.replace(url, &name, parsed);
        if !self.registry.contains(url) {
            self.store.delete(url);
            return RefreshOutcome::Discarded;
        }

        self.registry
            .record_update(url, accepted, chrono::Utc::now().timestamp_millis());
        info!("Rule source '{}' updated with {} rules", name, accepted);
        RefreshOutcome::Updated(accepted)
    }

    fn fail(&self, url: &str, reason: String) -> RefreshOutcome {
        self.registry
            .record_status(url, SourceStatus::Failed(reason.clone()));
        RefreshOutcome::Failed(reason)
    }

    /// Refreshes every enabled source with bounded concurrency, then drops
    /// all cached query results once.
    pub async fn refresh_all(&self) -> RefreshSummary {
        info!("Refreshing rule sources...");
        let sources = self.registry.enabled();

        // Owned sources and boxed futures keep the scheduler task `Send`
        let tasks = sources
            .into_iter()
            .map(|source| async move { self.refresh_one(&source).await }.boxed());
        let outcomes: Vec<RefreshOutcome> = stream::iter(tasks)
            .buffer_unordered(self.concurrent_downloads)
            .collect()
            .await;

        self.cache.invalidate_all();

        let mut summary = RefreshSummary::default();
        for outcome in &outcomes {
            match outcome {
                RefreshOutcome::Updated(_) => summary.updated += 1,
                RefreshOutcome::Empty => summary.empty += 1,
                RefreshOutcome::Failed(_) => summary.failed += 1,
                RefreshOutcome::Discarded => {}
            }
        }

        let snapshot = self.store.snapshot();
        let counts = snapshot.counts();
        info!(
            "Rule refresh complete. Updated: {}, Empty: {}, Failed: {}. Domain rules: {}, Hosts rules: {}, Regex rules: {} across {} sources",
            summary.updated,
            summary.empty,
            summary.failed,
            counts.domain,
            counts.hosts,
            counts.regex,
            snapshot.source_count()
        );

        summary
    }

    /// Refreshes a single registered source and drops cached results.
    pub async fn refresh_source(&self, url: &str) -> Option<RefreshOutcome> {
        let source = self.registry.get(url)?;
        let outcome = self.refresh_one(&source).await;
        self.cache.invalidate_all();
        Some(outcome)
    }

    /// Runs `refresh_all` immediately, then on every `interval` tick and on
    /// every message received on `trigger`. Stops once all trigger senders
    /// are dropped.
    pub fn spawn_scheduler(
        self: Arc<Self>,
        interval: Duration,
        mut trigger: mpsc::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let period = interval.clamp(Duration::from_secs(1), MAX_REFRESH_INTERVAL);
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        info!("Scheduled rule refresh...");
                    }
                    msg = trigger.recv() => {
                        match msg {
                            Some(()) => {
                                info!("Forced rule refresh triggered via API...");
                                ticker.reset(); // Reset timer to avoid double update
                            }
                            None => {
                                info!("Refresh trigger closed, stopping scheduler");
                                break;
                            }
                        }
                    }
                }
                self.refresh_all().await;
            }
        })
    }
}
