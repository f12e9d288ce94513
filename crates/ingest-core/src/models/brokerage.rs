use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::IngestError;

pub const NAME_MIN_LEN: usize = 2;
pub const NAME_MAX_LEN: usize = 100;

/// An analyst firm issuing rating events. Names are unique; soft-deleted only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Brokerage {
    pub id: Uuid,
    pub name: String,
    pub website: Option<String>,
    /// ISO 3166-1 alpha-3.
    pub country: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Brokerage {
    pub fn new(name: &str) -> Result<Self, IngestError> {
        let now = Utc::now();
        let brokerage = Self {
            id: Uuid::new_v4(),
            name: name.trim().to_string(),
            website: None,
            country: None,
            is_active: true,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        brokerage.validate()?;
        Ok(brokerage)
    }

    /// Websites are stored with an explicit scheme.
    pub fn set_website(&mut self, website: Option<&str>) {
        self.website = website
            .map(str::trim)
            .filter(|w| !w.is_empty())
            .map(|w| {
                if w.starts_with("http://") || w.starts_with("https://") {
                    w.to_string()
                } else {
                    format!("https://{}", w)
                }
            });
    }

    pub fn validate(&self) -> Result<(), IngestError> {
        if self.name.len() < NAME_MIN_LEN || self.name.len() > NAME_MAX_LEN {
            return Err(IngestError::Validation(format!(
                "brokerage name must be {}-{} characters",
                NAME_MIN_LEN, NAME_MAX_LEN
            )));
        }
        if let Some(country) = &self.country {
            if country.len() != 3 || !country.chars().all(|c| c.is_ascii_uppercase()) {
                return Err(IngestError::Validation(format!(
                    "country must be ISO 3166-1 alpha-3, got {:?}",
                    country
                )));
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
    fn website_gets_https_prefix() {
        let mut brokerage = Brokerage::new("The Goldman Sachs Group").unwrap();
        brokerage.set_website(Some("goldmansachs.com"));
        assert_eq!(
            brokerage.website.as_deref(),
            Some("https://goldmansachs.com")
        );
        brokerage.set_website(Some("http://example.com"));
        assert_eq!(brokerage.website.as_deref(), Some("http://example.com"));
    }

    #[test]
    fn rejects_invalid_country() {
        let mut brokerage = Brokerage::new("Morgan Stanley").unwrap();
        brokerage.country = Some("usa".to_string());
        assert!(brokerage.validate().is_err());
        brokerage.country = Some("USA".to_string());
        assert!(brokerage.validate().is_ok());
    }

    #[test]
    fn rejects_short_name() {
        assert!(Brokerage::new("X").is_err());
    }
}
