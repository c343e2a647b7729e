mod cache;
mod manager;
mod matcher;
pub mod parser;
mod sources;
mod store;
mod traits;
pub mod types;

pub use cache::QueryCache;
pub use manager::{HttpFetcher, RefreshManager, RefreshOutcome, RefreshSummary};
pub use matcher::match_domain;
pub use parser::{is_valid_domain, parse_rules, ParsedRules, RegexRule};
pub use sources::SourceRegistry;
pub use store::{ReplacePolicy, RuleCounts, RuleSnapshot, RuleStore, SourceRules};
pub use traits::{DomainMatcher, RuleFetcher};
pub use types::{MatchedRule, QueryResult, RuleKind, RuleSource, SourceStatus};
