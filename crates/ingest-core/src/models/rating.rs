use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::IngestError;

/// A single analyst action (upgrade/downgrade/reiteration) keyed by
/// `(company_id, brokerage_id, event_time)`. Immutable once inserted, except
/// the `is_processed` flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockRating {
    pub id: Uuid,
    pub company_id: Uuid,
    pub brokerage_id: Uuid,
    pub action: String,
    pub rating_from: Option<String>,
    pub rating_to: Option<String>,
    pub target_from: Option<f64>,
    pub target_to: Option<f64>,
    pub event_time: DateTime<Utc>,
    pub source: String,
    pub is_processed: bool,
    pub raw_payload: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StockRating {
    pub fn new(
        company_id: Uuid,
        brokerage_id: Uuid,
        action: &str,
        event_time: DateTime<Utc>,
        source: &str,
    ) -> Result<Self, IngestError> {
        let now = Utc::now();
        let rating = Self {
            id: Uuid::new_v4(),
            company_id,
            brokerage_id,
            action: action.trim().to_lowercase(),
            rating_from: None,
            rating_to: None,
            target_from: None,
            target_to: None,
            event_time,
            source: source.to_string(),
            is_processed: false,
            raw_payload: None,
            created_at: now,
            updated_at: now,
        };
        rating.validate()?;
        Ok(rating)
    }

    pub fn validate(&self) -> Result<(), IngestError> {
        if self.action.is_empty() {
            return Err(IngestError::Validation(
                "rating action must not be empty".to_string(),
            ));
        }
        if self.company_id.is_nil() || self.brokerage_id.is_nil() {
            return Err(IngestError::Validation(
                "rating must reference a company and a brokerage".to_string(),
            ));
        }
        Ok(())
    }

    /// Natural unique key of the fact.
    pub fn event_key(&self) -> (Uuid, Uuid, DateTime<Utc>) {
        (self.company_id, self.brokerage_id, self.event_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_is_lowercased() {
        let rating = StockRating::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            " Upgraded By ",
            Utc::now(),
            "test",
        )
        .unwrap();
        assert_eq!(rating.action, "upgraded by");
        assert!(!rating.is_processed);
    }

    #[test]
    fn rejects_empty_action() {
        assert!(StockRating::new(Uuid::new_v4(), Uuid::new_v4(), "  ", Utc::now(), "test").is_err());
    }

    #[test]
    fn rejects_nil_references() {
        assert!(StockRating::new(Uuid::nil(), Uuid::new_v4(), "upgrade", Utc::now(), "test").is_err());
    }
}
