use thiserror::Error;

/// Error taxonomy for the ingestion pipeline.
///
/// Each variant carries a stable category tag (see [`IngestError::category`])
/// so callers can branch on kind without matching on the full variant.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("transient error: {0}")]
    Transient(String),

    #[error("schema missing: {0}")]
    SchemaMissing(String),

    #[error("provider {provider} error for {symbol}: {message}")]
    Provider {
        provider: String,
        symbol: String,
        message: String,
    },

    #[error("cache error: {0}")]
    Cache(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("fatal: {0}")]
    Fatal(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("{count} operation(s) failed: {summary}")]
    Aggregate { count: usize, summary: String },
}

/// How many underlying messages an aggregate error retains.
const AGGREGATE_MESSAGE_CAP: usize = 5;

impl IngestError {
    pub fn provider(provider: &str, symbol: &str, message: impl Into<String>) -> Self {
        IngestError::Provider {
            provider: provider.to_string(),
            symbol: symbol.to_string(),
            message: message.into(),
        }
    }

    /// Build an aggregate from per-task failures, keeping the first few messages.
    pub fn aggregate(failures: Vec<(String, IngestError)>) -> Self {
        let count = failures.len();
        let summary = failures
            .iter()
            .take(AGGREGATE_MESSAGE_CAP)
            .map(|(label, err)| format!("{}: {}", label, err))
            .collect::<Vec<_>>()
            .join("; ");
        IngestError::Aggregate { count, summary }
    }

    /// Stable category tag for logging and metrics.
    pub fn category(&self) -> &'static str {
        match self {
            IngestError::Validation(_) => "validation",
            IngestError::NotFound(_) => "not_found",
            IngestError::Conflict(_) => "conflict",
            IngestError::Transient(_) => "transient",
            IngestError::SchemaMissing(_) => "schema_missing",
            IngestError::Provider { .. } => "provider",
            IngestError::Cache(_) => "cache",
            IngestError::Database(_) => "database",
            IngestError::Fatal(_) => "fatal",
            IngestError::Cancelled => "cancelled",
            IngestError::Aggregate { .. } => "aggregate",
        }
    }

    /// Whether a retry with backoff can reasonably succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, IngestError::Transient(_))
    }

    /// "relation does not exist" style failures tolerated in bulk write paths.
    pub fn is_schema_missing(&self) -> bool {
        matches!(self, IngestError::SchemaMissing(_))
    }
}

impl From<sqlx::Error> for IngestError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => {
                return IngestError::NotFound("row not found".to_string());
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                return IngestError::Transient(err.to_string());
            }
            _ => {}
        }

        let message = err.to_string();
        let lowered = message.to_lowercase();
        if lowered.contains("unique constraint") {
            IngestError::Conflict(message)
        } else if lowered.contains("no such table") || lowered.contains("does not exist") {
            IngestError::SchemaMissing(message)
        } else if lowered.contains("database is locked")
            || lowered.contains("deadlock")
            || lowered.contains("serialization")
            || lowered.contains("connection")
        {
            IngestError::Transient(message)
        } else {
            IngestError::Database(message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_are_stable() {
        assert_eq!(IngestError::Validation("x".into()).category(), "validation");
        assert_eq!(IngestError::Cancelled.category(), "cancelled");
        assert_eq!(
            IngestError::provider("alphavantage", "AAPL", "boom").category(),
            "provider"
        );
    }

    #[test]
    fn only_transient_is_retryable() {
        assert!(IngestError::Transient("timeout".into()).is_transient());
        assert!(!IngestError::Validation("bad ticker".into()).is_transient());
        assert!(!IngestError::Conflict("dup".into()).is_transient());
    }

    #[test]
    fn aggregate_caps_messages() {
        let failures: Vec<(String, IngestError)> = (0..10)
            .map(|i| (format!("task{}", i), IngestError::Transient("t".into())))
            .collect();
        let err = IngestError::aggregate(failures);
        match err {
            IngestError::Aggregate { count, summary } => {
                assert_eq!(count, 10);
                assert!(summary.contains("task0"));
                assert!(!summary.contains("task9"));
            }
            _ => panic!("expected aggregate"),
        }
    }

    #[test]
    fn provider_error_names_provider_and_symbol() {
        let err = IngestError::provider("finnhub", "MSFT", "HTTP 500");
        let text = err.to_string();
        assert!(text.contains("finnhub"));
        assert!(text.contains("MSFT"));
    }
}
