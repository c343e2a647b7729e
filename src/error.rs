use thiserror::Error;

/// Rejections of query input, raised before the rule engine is consulted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("Domain must not be empty")]
    EmptyDomain,

    #[error("Invalid domain format: {0}")]
    InvalidDomain(String),

    #[error("Domain list must not be empty")]
    EmptyBatch,

    #[error("At most {max} domains per batch, got {got}")]
    BatchTooLarge { max: usize, got: usize },
}

/// Rejections of source management requests.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("Source URL must not be empty")]
    EmptyUrl,

    #[error("Source name must not be empty")]
    EmptyName,

    #[error("Invalid source URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}
