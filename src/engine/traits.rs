use super::types::MatchedRule;

/// The "Hot Path" check of one domain against committed rules.
pub trait DomainMatcher: Send + Sync {
    /// Returns every matching rule in deterministic order; empty if allowed.
    fn check(&self, domain: &str) -> Vec<MatchedRule>;
}

/// Retrieves the raw content of a rule source.
#[async_trait::async_trait]
pub trait RuleFetcher: Send + Sync {
    /// Fetches the full body for `url`. Errors cover transport failures,
    /// timeouts and non-2xx responses.
    async fn fetch(&self, url: &str) -> anyhow::Result<String>;
}
