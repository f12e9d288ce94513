use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::IngestError;
use crate::models::title_case;

pub const TICKER_MAX_LEN: usize = 10;
pub const NAME_MIN_LEN: usize = 2;
pub const NAME_MAX_LEN: usize = 200;

/// A listed company. Tickers are globally unique; companies are soft-deleted
/// only because rating facts keep referencing them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Company {
    pub id: Uuid,
    pub ticker: String,
    pub name: String,
    pub sector: Option<String>,
    pub exchange: Option<String>,
    pub market_cap: Option<f64>,
    pub logo_url: Option<String>,
    pub currency: Option<String>,
    pub ipo_date: Option<NaiveDate>,
    pub employee_count: Option<i64>,
    pub week_high_52: Option<f64>,
    pub week_low_52: Option<f64>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Company {
    /// Build a normalized company from raw provider strings.
    pub fn new(ticker: &str, name: &str) -> Result<Self, IngestError> {
        let now = Utc::now();
        let company = Self {
            id: Uuid::new_v4(),
            ticker: Self::normalize_ticker(ticker),
            name: name.trim().to_string(),
            sector: None,
            exchange: None,
            market_cap: None,
            logo_url: None,
            currency: None,
            ipo_date: None,
            employee_count: None,
            week_high_52: None,
            week_low_52: None,
            is_active: true,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        company.validate()?;
        Ok(company)
    }

    /// `upper(trim(..))`. Idempotent.
    pub fn normalize_ticker(raw: &str) -> String {
        raw.trim().to_uppercase()
    }

    /// Normalize the optional sector into title case.
    pub fn set_sector(&mut self, sector: Option<&str>) {
        self.sector = sector
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(title_case);
    }

    pub fn validate(&self) -> Result<(), IngestError> {
        if self.ticker.is_empty() || self.ticker.len() > TICKER_MAX_LEN {
            return Err(IngestError::Validation(format!(
                "ticker must be 1-{} characters, got {:?}",
                TICKER_MAX_LEN, self.ticker
            )));
        }
        if self.name.len() < NAME_MIN_LEN || self.name.len() > NAME_MAX_LEN {
            return Err(IngestError::Validation(format!(
                "company name must be {}-{} characters",
                NAME_MIN_LEN, NAME_MAX_LEN
            )));
        }
        if let Some(cap) = self.market_cap {
            if cap < 0.0 {
                return Err(IngestError::Validation(
                    "market cap must be non-negative".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_normalizes_ticker_and_name() {
        let company = Company::new("  aapl ", "  Apple Inc. ").unwrap();
        assert_eq!(company.ticker, "AAPL");
        assert_eq!(company.name, "Apple Inc.");
        assert!(company.is_active);
    }

    #[test]
    fn normalization_is_idempotent() {
        let once = Company::normalize_ticker(" msft ");
        assert_eq!(Company::normalize_ticker(&once), once);
    }

    #[test]
    fn rejects_overlong_ticker() {
        assert!(Company::new("TOOLONGTICKER", "Some Name").is_err());
        assert!(Company::new("", "Some Name").is_err());
    }

    #[test]
    fn rejects_short_name() {
        assert!(Company::new("AAPL", "A").is_err());
    }

    #[test]
    fn rejects_negative_market_cap() {
        let mut company = Company::new("AAPL", "Apple Inc.").unwrap();
        company.market_cap = Some(-1.0);
        assert!(company.validate().is_err());
    }

    #[test]
    fn sector_is_title_cased() {
        let mut company = Company::new("AAPL", "Apple Inc.").unwrap();
        company.set_sector(Some("information technology"));
        assert_eq!(company.sector.as_deref(), Some("Information Technology"));
        company.set_sector(Some("  "));
        assert_eq!(company.sector, None);
    }
}
