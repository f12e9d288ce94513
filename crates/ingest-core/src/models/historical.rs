use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::IngestError;
use crate::models::Period;

/// Open gap threshold relative to the previous close. Tunable.
pub const GAP_THRESHOLD: f64 = 0.02;

pub const HISTORICAL_STALENESS_HOURS: i64 = 24;

/// One OHLCV row per `(company, date, timeframe)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoricalData {
    pub id: Uuid,
    pub company_id: Uuid,
    pub symbol: String,
    pub date: NaiveDate,
    pub timeframe: Period,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub adjusted_close: Option<f64>,
    pub volume: i64,
    /// Close-over-previous-close, as a fraction. None for the first row of a series.
    pub daily_return: Option<f64>,
    pub price_range: f64,
    pub gap_up: bool,
    pub gap_down: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl HistoricalData {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        company_id: Uuid,
        symbol: &str,
        date: NaiveDate,
        timeframe: Period,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: i64,
    ) -> Result<Self, IngestError> {
        let now = Utc::now();
        let row = Self {
            id: Uuid::new_v4(),
            company_id,
            symbol: symbol.trim().to_uppercase(),
            date,
            timeframe,
            open,
            high,
            low,
            close,
            adjusted_close: None,
            volume,
            daily_return: None,
            price_range: high - low,
            gap_up: false,
            gap_down: false,
            created_at: now,
            updated_at: now,
        };
        row.validate()?;
        Ok(row)
    }

    pub fn validate(&self) -> Result<(), IngestError> {
        if self.volume < 0 {
            return Err(IngestError::Validation(format!(
                "{} {}: negative volume",
                self.symbol, self.date
            )));
        }
        if self.low <= 0.0 {
            return Err(IngestError::Validation(format!(
                "{} {}: prices must be positive",
                self.symbol, self.date
            )));
        }
        let body_high = self.open.max(self.close);
        let body_low = self.open.min(self.close);
        if self.high < body_high || body_low < self.low {
            return Err(IngestError::Validation(format!(
                "{} {}: inverted high/low range",
                self.symbol, self.date
            )));
        }
        Ok(())
    }

    /// Fill return and gap flags from the previous bar of the same series.
    pub fn derive_from_previous(&mut self, prev_close: f64) {
        if prev_close > 0.0 {
            self.daily_return = Some((self.close - prev_close) / prev_close);
            self.gap_up = self.open > prev_close * (1.0 + GAP_THRESHOLD);
            self.gap_down = self.open < prev_close * (1.0 - GAP_THRESHOLD);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(open: f64, high: f64, low: f64, close: f64, volume: i64) -> Result<HistoricalData, IngestError> {
        HistoricalData::new(
            Uuid::new_v4(),
            "aapl",
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            Period::Daily,
            open,
            high,
            low,
            close,
            volume,
        )
    }

    #[test]
    fn accepts_well_formed_bar() {
        let row = bar(100.0, 104.0, 99.0, 103.0, 1_000_000).unwrap();
        assert_eq!(row.symbol, "AAPL");
        assert!((row.price_range - 5.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_negative_volume() {
        assert!(bar(100.0, 104.0, 99.0, 103.0, -1).is_err());
    }

    #[test]
    fn rejects_inverted_range() {
        assert!(bar(100.0, 99.0, 98.0, 103.0, 10).is_err());
        assert!(bar(100.0, 104.0, 101.0, 103.0, 10).is_err());
    }

    #[test]
    fn rejects_zero_price() {
        assert!(bar(0.0, 0.0, 0.0, 0.0, 10).is_err());
    }

    #[test]
    fn gap_flags_use_threshold() {
        let mut row = bar(103.0, 104.0, 99.0, 103.0, 10).unwrap();
        row.derive_from_previous(100.0);
        assert!(row.gap_up);
        assert!(!row.gap_down);
        assert!((row.daily_return.unwrap() - 0.03).abs() < 1e-9);

        let mut flat = bar(100.5, 104.0, 99.0, 103.0, 10).unwrap();
        flat.derive_from_previous(100.0);
        assert!(!flat.gap_up);
        assert!(!flat.gap_down);
    }
}
