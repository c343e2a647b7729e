use serde::{Deserialize, Serialize};

/// Which structural form a rule was parsed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    Domain,
    Hosts,
    Regex,
}

impl RuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleKind::Domain => "domain",
            RuleKind::Hosts => "hosts",
            RuleKind::Regex => "regex",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchedRule {
    pub rule: String,
    pub rule_source: String,
    pub rule_source_url: String,
    pub rule_type: RuleKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub domain: String,
    pub blocked: bool,
    pub matched_rules: Vec<MatchedRule>,
    // First match, kept for older clients that only read one rule.
    pub matched_rule: Option<String>,
    pub rule_source: Option<String>,
    pub rule_type: Option<RuleKind>,
    /// Unix millis at which the result was computed.
    pub query_time: i64,
    /// Resolution time in milliseconds.
    pub duration: u64,
}

impl QueryResult {
    /// Builds a result from an ordered match list. `blocked` is derived from
    /// the list so the two can never disagree.
    pub fn from_matches(domain: String, matched_rules: Vec<MatchedRule>) -> Self {
        let first = matched_rules.first();
        Self {
            blocked: !matched_rules.is_empty(),
            matched_rule: first.map(|m| m.rule.clone()),
            rule_source: first.map(|m| m.rule_source.clone()),
            rule_type: first.map(|m| m.rule_type),
            domain,
            matched_rules,
            query_time: chrono::Utc::now().timestamp_millis(),
            duration: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "lowercase")]
pub enum SourceStatus {
    Pending,
    Updated,
    Empty,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleSource {
    pub url: String,
    pub name: String,
    pub enabled: bool,
    /// Unix millis of the last successful commit.
    pub last_updated: Option<i64>,
    pub rule_count: usize,
    pub status: SourceStatus,
}

impl RuleSource {
    pub fn new(url: impl Into<String>, name: impl Into<String>, enabled: bool) -> Self {
        Self {
            url: url.into(),
            name: name.into(),
            enabled,
            last_updated: None,
            rule_count: 0,
            status: SourceStatus::Pending,
        }
    }
}
