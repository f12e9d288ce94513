//! Time-series payloads into validated [`HistoricalData`] rows.

use alphavantage_client::TimeSeriesResponse;
use ingest_core::{HistoricalData, Period};
use uuid::Uuid;

use crate::parse::{parse_optional_f64, parse_utc_date};

/// Convert a series to OHLCV rows, oldest first. Rows that fail validation
/// (inverted range, zero price, negative volume) are dropped; derived fields
/// (return, gaps) are filled from the surviving predecessor.
pub fn time_series_to_historical(
    resp: &TimeSeriesResponse,
    company_id: Uuid,
    timeframe: Period,
) -> Vec<HistoricalData> {
    let mut rows: Vec<HistoricalData> = Vec::with_capacity(resp.points.len());
    let mut prev_close: Option<f64> = None;

    // BTreeMap iteration gives ascending dates, which the derivation needs.
    for (date_key, point) in &resp.points {
        let Some(date) = parse_utc_date(date_key) else {
            continue;
        };
        let (Some(open), Some(high), Some(low), Some(close)) = (
            parse_optional_f64(&point.open),
            parse_optional_f64(&point.high),
            parse_optional_f64(&point.low),
            parse_optional_f64(&point.close),
        ) else {
            continue;
        };
        let Some(volume) = parse_optional_f64(&point.volume) else {
            continue;
        };

        let mut row = match HistoricalData::new(
            company_id,
            &resp.symbol,
            date,
            timeframe,
            open,
            high,
            low,
            close,
            volume as i64,
        ) {
            Ok(row) => row,
            Err(e) => {
                tracing::debug!("dropping invalid bar: {}", e);
                continue;
            }
        };

        row.adjusted_close = point.adjusted_close.as_deref().and_then(parse_optional_f64);
        if let Some(prev) = prev_close {
            row.derive_from_previous(prev);
        }
        prev_close = Some(close);
        rows.push(row);
    }

    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn series(points: &[(&str, &str, &str, &str, &str, &str)]) -> TimeSeriesResponse {
        let mut map = BTreeMap::new();
        for (date, open, high, low, close, volume) in points {
            map.insert(
                date.to_string(),
                serde_json::from_value(serde_json::json!({
                    "1. open": open,
                    "2. high": high,
                    "3. low": low,
                    "4. close": close,
                    "5. volume": volume,
                }))
                .unwrap(),
            );
        }
        TimeSeriesResponse {
            symbol: "IBM".to_string(),
            points: map,
        }
    }

    #[test]
    fn converts_and_derives_returns() {
        let resp = series(&[
            ("2024-02-29", "100.0", "104.0", "99.0", "100.0", "1000"),
            ("2024-03-01", "101.0", "106.0", "100.5", "105.0", "2000"),
        ]);
        let rows = time_series_to_historical(&resp, Uuid::new_v4(), Period::Daily);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].daily_return, None);
        assert!((rows[1].daily_return.unwrap() - 0.05).abs() < 1e-9);
        assert!(!rows[1].gap_up);
    }

    #[test]
    fn drops_invalid_bars_but_keeps_series_going() {
        let resp = series(&[
            ("2024-02-28", "100.0", "104.0", "99.0", "100.0", "1000"),
            // high below close: rejected
            ("2024-02-29", "100.0", "99.0", "98.0", "103.0", "1000"),
            ("2024-03-01", "103.5", "106.0", "100.5", "105.0", "2000"),
        ]);
        let rows = time_series_to_historical(&resp, Uuid::new_v4(), Period::Daily);
        assert_eq!(rows.len(), 2);
        // Return derived against the last *valid* close.
        assert!((rows[1].daily_return.unwrap() - 0.05).abs() < 1e-9);
        assert!(rows[1].gap_up);
    }

    #[test]
    fn unparseable_volume_drops_row() {
        let resp = series(&[("2024-03-01", "100.0", "104.0", "99.0", "100.0", "None")]);
        assert!(time_series_to_historical(&resp, Uuid::new_v4(), Period::Daily).is_empty());
    }
}
