use std::time::Duration;

use crate::error::IngestError;

/// Credentials and endpoint for one upstream provider.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub api_key: String,
    pub base_url: Option<String>,
}

/// Application configuration resolved from the environment at startup.
/// Missing credentials are a startup error, not a runtime surprise.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub redis_url: Option<String>,
    pub alphavantage: ProviderConfig,
    pub finnhub: ProviderConfig,
    pub ratings: ProviderConfig,
    pub http_timeout: Duration,
}

fn required(name: &str) -> Result<String, IngestError> {
    std::env::var(name)
        .map_err(|_| IngestError::Fatal(format!("{} must be set", name)))
        .and_then(|v| {
            if v.trim().is_empty() {
                Err(IngestError::Fatal(format!("{} must not be empty", name)))
            } else {
                Ok(v)
            }
        })
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl AppConfig {
    pub fn from_env() -> Result<Self, IngestError> {
        Ok(Self {
            database_url: optional("DATABASE_URL")
                .unwrap_or_else(|| "sqlite:marketline.db?mode=rwc".to_string()),
            redis_url: optional("REDIS_URL"),
            alphavantage: ProviderConfig {
                api_key: required("ALPHAVANTAGE_API_KEY")?,
                base_url: optional("ALPHAVANTAGE_BASE_URL"),
            },
            finnhub: ProviderConfig {
                api_key: required("FINNHUB_API_KEY")?,
                base_url: optional("FINNHUB_BASE_URL"),
            },
            ratings: ProviderConfig {
                api_key: required("RATINGS_API_KEY")?,
                base_url: optional("RATINGS_BASE_URL"),
            },
            http_timeout: Duration::from_secs(
                optional("HTTP_TIMEOUT_SECS")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(30),
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_is_fatal() {
        // Scoped env juggling: clear one required var and expect Fatal.
        std::env::remove_var("ALPHAVANTAGE_API_KEY");
        std::env::set_var("FINNHUB_API_KEY", "k");
        std::env::set_var("RATINGS_API_KEY", "k");
        let err = AppConfig::from_env().unwrap_err();
        assert_eq!(err.category(), "fatal");
    }
}
