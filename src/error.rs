use datafusion::{arrow::error::ArrowError, error::DataFusionError};
use thiserror::Error;

/// Classification of failures reported by the ads platform. The adapter maps
/// every failed source call into one of these kinds; nothing above the
/// adapter inspects raw responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceErrorKind {
    Query,
    Auth,
    RateLimit,
    Unknown,
}

impl SourceErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceErrorKind::Query => "QUERY_ERROR",
            SourceErrorKind::Auth => "AUTH_ERROR",
            SourceErrorKind::RateLimit => "RATE_LIMIT_ERROR",
            SourceErrorKind::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for SourceErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Config: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Credential file '{path}' is not usable: {reason}")]
    Credentials { path: String, reason: String },

    #[error("DataFusion: {0}")]
    DataFusion(#[from] DataFusionError),

    #[error("Arrow: {0}")]
    Arrow(#[from] ArrowError),

    #[error("API responded with error: {0}")]
    ApiFailure(#[from] reqwest::Error),

    #[error("Failed to parse URL: {0}")]
    UrlParsingFailed(#[from] url::ParseError),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Ads source {kind} for account {customer_id}: {message}")]
    Source {
        kind: SourceErrorKind,
        customer_id: String,
        message: String,
    },

    #[error("Warehouse write to {table} failed: {message}")]
    Sink { table: String, message: String },
}

impl Error {
    /// True when the error came from the ads source itself, i.e. the kind a
    /// sub-task is allowed to degrade on. Everything else escapes to the
    /// account level.
    pub fn is_source(&self) -> bool {
        matches!(self, Error::Source { .. })
    }
}
