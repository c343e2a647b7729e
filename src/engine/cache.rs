use super::types::QueryResult;
use moka::sync::Cache;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Clone)]
struct CachedResult {
    result: Arc<QueryResult>,
    generation: u64,
    valid_until: Instant,
}

/// Memoized query results keyed by normalized domain.
///
/// Bounded by entry count and by age. An entry is also stale once the rule
/// store has moved past the generation it was computed against, which closes
/// the window between a commit and the following `invalidate_all`.
#[derive(Clone)]
pub struct QueryCache {
    cache: Cache<Arc<str>, CachedResult>,
    ttl: Duration,
}

impl QueryCache {
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(ttl)
            .build();
        Self { cache, ttl }
    }

    pub fn get(&self, domain: &str, generation: u64) -> Option<QueryResult> {
        let entry = self.cache.get(domain)?;
        if entry.generation != generation || Instant::now() >= entry.valid_until {
            self.cache.invalidate(domain);
            return None;
        }
        Some(entry.result.as_ref().clone())
    }

    pub fn put(&self, domain: &str, generation: u64, result: QueryResult) {
        self.cache.insert(
            Arc::from(domain),
            CachedResult {
                result: Arc::new(result),
                generation,
                valid_until: Instant::now() + self.ttl,
            },
        );
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    /// Approximate number of live entries.
    pub fn len(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
