use crate::engine::RuleKind;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration};
use tracing::info;

#[derive(Debug)]
pub struct StatsCollector {
    // Basic Counters
    total_queries: AtomicU64,
    blocked_queries: AtomicU64,
    cache_hits: AtomicU64,

    // Indexed by the first matching rule's kind: domain, hosts, regex
    blocks_by_kind: [AtomicU64; 3],

    log_interval: Duration,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub total_queries: u64,
    pub blocked_queries: u64,
    pub cache_hits: u64,
    pub blocked_by_domain: u64,
    pub blocked_by_hosts: u64,
    pub blocked_by_regex: u64,
}

fn kind_index(kind: RuleKind) -> usize {
    match kind {
        RuleKind::Domain => 0,
        RuleKind::Hosts => 1,
        RuleKind::Regex => 2,
    }
}

impl StatsCollector {
    pub fn new(log_interval_sec: u64) -> Arc<Self> {
        Arc::new(Self {
            total_queries: AtomicU64::new(0),
            blocked_queries: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            blocks_by_kind: [0; 3].map(|_| AtomicU64::new(0)),
            log_interval: Duration::from_secs(log_interval_sec.max(1)),
        })
    }

    /// Spawns the periodic stats dump.
    pub fn spawn_logger(self: &Arc<Self>) -> JoinHandle<()> {
        let stats = self.clone();
        tokio::spawn(async move {
            stats.run_logger().await;
        })
    }

    pub fn inc_queries(&self) {
        self.total_queries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_blocked_by(&self, kind: RuleKind) {
        self.blocked_queries.fetch_add(1, Ordering::Relaxed);
        self.blocks_by_kind[kind_index(kind)].fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_queries: self.total_queries.load(Ordering::Relaxed),
            blocked_queries: self.blocked_queries.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            blocked_by_domain: self.blocks_by_kind[0].load(Ordering::Relaxed),
            blocked_by_hosts: self.blocks_by_kind[1].load(Ordering::Relaxed),
            blocked_by_regex: self.blocks_by_kind[2].load(Ordering::Relaxed),
        }
    }

    async fn run_logger(&self) {
        let mut interval = time::interval(self.log_interval);
        loop {
            interval.tick().await;
            self.dump_stats();
        }
    }

    fn dump_stats(&self) {
        let s = self.get_snapshot();
        let pct = |n: u64| {
            if s.total_queries > 0 {
                (n as f64 / s.total_queries as f64) * 100.0
            } else {
                0.0
            }
        };

        info!(
            "STATS DUMP: Total: {}, Blocked: {} ({:.1}%), CacheHits: {} ({:.1}%), BlockStats: [domain: {}] [hosts: {}] [regex: {}]",
            s.total_queries,
            s.blocked_queries,
            pct(s.blocked_queries),
            s.cache_hits,
            pct(s.cache_hits),
            s.blocked_by_domain,
            s.blocked_by_hosts,
            s.blocked_by_regex
        );
    }
}
