//! Indicator payloads into [`TechnicalIndicators`] rows, one row per timestamp
//! with that indicator family populated and derived signals recomputed.

use alphavantage_client::{
    AdxResponse, AroonResponse, BbandsResponse, CciResponse, EmaResponse, IndicatorResponse,
    MacdResponse, RsiResponse, SmaResponse, StochResponse,
};
use ingest_core::{signals, IngestError, Period, TechnicalIndicators};
use uuid::Uuid;

use crate::parse::{date_to_utc, parse_optional_f64, parse_utc_date};

fn base_row(
    company_id: Uuid,
    symbol: &str,
    timeframe: Period,
    date_key: &str,
) -> Option<TechnicalIndicators> {
    let date = parse_utc_date(date_key)?;
    let mut row = TechnicalIndicators::new(company_id, symbol, timeframe);
    row.last_updated = date_to_utc(date);
    Some(row)
}

pub fn rsi_to_technicals(
    resp: &RsiResponse,
    symbol: &str,
    company_id: Uuid,
    timeframe: Period,
) -> Vec<TechnicalIndicators> {
    resp.series
        .iter()
        .filter_map(|(date, point)| {
            let mut row = base_row(company_id, symbol, timeframe, date)?;
            row.rsi_14 = parse_optional_f64(&point.rsi);
            row.rsi_14?;
            signals::recompute(&mut row);
            Some(row)
        })
        .collect()
}

pub fn sma_to_technicals(
    resp: &SmaResponse,
    symbol: &str,
    company_id: Uuid,
    timeframe: Period,
    time_period: u32,
) -> Vec<TechnicalIndicators> {
    resp.series
        .iter()
        .filter_map(|(date, point)| {
            let mut row = base_row(company_id, symbol, timeframe, date)?;
            let value = parse_optional_f64(&point.sma)?;
            match time_period {
                20 => row.sma_20 = Some(value),
                50 => row.sma_50 = Some(value),
                200 => row.sma_200 = Some(value),
                _ => row.sma_20 = Some(value),
            }
            signals::recompute(&mut row);
            Some(row)
        })
        .collect()
}

pub fn ema_to_technicals(
    resp: &EmaResponse,
    symbol: &str,
    company_id: Uuid,
    timeframe: Period,
    time_period: u32,
) -> Vec<TechnicalIndicators> {
    resp.series
        .iter()
        .filter_map(|(date, point)| {
            let mut row = base_row(company_id, symbol, timeframe, date)?;
            let value = parse_optional_f64(&point.ema)?;
            if time_period >= 26 {
                row.ema_26 = Some(value);
            } else {
                row.ema_12 = Some(value);
            }
            signals::recompute(&mut row);
            Some(row)
        })
        .collect()
}

pub fn macd_to_technicals(
    resp: &MacdResponse,
    symbol: &str,
    company_id: Uuid,
    timeframe: Period,
) -> Vec<TechnicalIndicators> {
    resp.series
        .iter()
        .filter_map(|(date, point)| {
            let mut row = base_row(company_id, symbol, timeframe, date)?;
            row.macd_line = parse_optional_f64(&point.macd);
            row.macd_signal = parse_optional_f64(&point.signal);
            row.macd_histogram = parse_optional_f64(&point.histogram);
            row.macd_line?;
            signals::recompute(&mut row);
            Some(row)
        })
        .collect()
}

pub fn bbands_to_technicals(
    resp: &BbandsResponse,
    symbol: &str,
    company_id: Uuid,
    timeframe: Period,
) -> Vec<TechnicalIndicators> {
    resp.series
        .iter()
        .filter_map(|(date, point)| {
            let mut row = base_row(company_id, symbol, timeframe, date)?;
            let upper = parse_optional_f64(&point.upper)?;
            let middle = parse_optional_f64(&point.middle)?;
            let lower = parse_optional_f64(&point.lower)?;
            row.bb_upper = Some(upper);
            row.bb_middle = Some(middle);
            row.bb_lower = Some(lower);
            if upper > lower {
                // %B against the middle band close proxy; width relative to middle.
                row.bb_percent_b = Some((middle - lower) / (upper - lower));
            }
            if middle != 0.0 {
                row.bb_width = Some((upper - lower) / middle);
            }
            signals::recompute(&mut row);
            Some(row)
        })
        .collect()
}

pub fn stoch_to_technicals(
    resp: &StochResponse,
    symbol: &str,
    company_id: Uuid,
    timeframe: Period,
) -> Vec<TechnicalIndicators> {
    resp.series
        .iter()
        .filter_map(|(date, point)| {
            let mut row = base_row(company_id, symbol, timeframe, date)?;
            row.stoch_k = parse_optional_f64(&point.slow_k);
            row.stoch_d = parse_optional_f64(&point.slow_d);
            row.stoch_k?;
            signals::recompute(&mut row);
            Some(row)
        })
        .collect()
}

pub fn adx_to_technicals(
    resp: &AdxResponse,
    symbol: &str,
    company_id: Uuid,
    timeframe: Period,
) -> Vec<TechnicalIndicators> {
    resp.series
        .iter()
        .filter_map(|(date, point)| {
            let mut row = base_row(company_id, symbol, timeframe, date)?;
            row.adx = parse_optional_f64(&point.adx);
            row.adx?;
            signals::recompute(&mut row);
            Some(row)
        })
        .collect()
}

pub fn cci_to_technicals(
    resp: &CciResponse,
    symbol: &str,
    company_id: Uuid,
    timeframe: Period,
) -> Vec<TechnicalIndicators> {
    resp.series
        .iter()
        .filter_map(|(date, point)| {
            let mut row = base_row(company_id, symbol, timeframe, date)?;
            row.cci = parse_optional_f64(&point.cci);
            row.cci?;
            signals::recompute(&mut row);
            Some(row)
        })
        .collect()
}

pub fn aroon_to_technicals(
    resp: &AroonResponse,
    symbol: &str,
    company_id: Uuid,
    timeframe: Period,
) -> Vec<TechnicalIndicators> {
    resp.series
        .iter()
        .filter_map(|(date, point)| {
            let mut row = base_row(company_id, symbol, timeframe, date)?;
            row.aroon_up = parse_optional_f64(&point.aroon_up);
            row.aroon_down = parse_optional_f64(&point.aroon_down);
            row.aroon_up?;
            signals::recompute(&mut row);
            Some(row)
        })
        .collect()
}

/// Dispatch an [`IndicatorResponse`] to its family adapter. `time_period`
/// matters only for the SMA/EMA variants.
pub fn indicator_to_technicals(
    resp: &IndicatorResponse,
    symbol: &str,
    company_id: Uuid,
    timeframe: Period,
    time_period: u32,
) -> Result<Vec<TechnicalIndicators>, IngestError> {
    Ok(match resp {
        IndicatorResponse::Rsi(r) => rsi_to_technicals(r, symbol, company_id, timeframe),
        IndicatorResponse::Sma(r) => {
            sma_to_technicals(r, symbol, company_id, timeframe, time_period)
        }
        IndicatorResponse::Ema(r) => {
            ema_to_technicals(r, symbol, company_id, timeframe, time_period)
        }
        IndicatorResponse::Macd(r) => macd_to_technicals(r, symbol, company_id, timeframe),
        IndicatorResponse::Bbands(r) => bbands_to_technicals(r, symbol, company_id, timeframe),
        IndicatorResponse::Stoch(r) => stoch_to_technicals(r, symbol, company_id, timeframe),
        IndicatorResponse::Adx(r) => adx_to_technicals(r, symbol, company_id, timeframe),
        IndicatorResponse::Cci(r) => cci_to_technicals(r, symbol, company_id, timeframe),
        IndicatorResponse::Aroon(r) => aroon_to_technicals(r, symbol, company_id, timeframe),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rsi_rows_carry_value_and_signals() {
        let resp: RsiResponse = serde_json::from_str(
            r#"{"Technical Analysis: RSI": {
                "2024-02-29": {"RSI": "28.11"},
                "2024-03-01": {"RSI": "56.08"}
            }}"#,
        )
        .unwrap();
        let rows = rsi_to_technicals(&resp, "IBM", Uuid::new_v4(), Period::Daily);
        assert_eq!(rows.len(), 2);
        // BTreeMap keys iterate ascending, so the last row is the newest.
        let newest = rows.last().unwrap();
        assert_eq!(newest.rsi_14, Some(56.08));
        assert_eq!(newest.symbol, "IBM");
    }

    #[test]
    fn unparseable_values_are_dropped() {
        let resp: RsiResponse = serde_json::from_str(
            r#"{"Technical Analysis: RSI": {"2024-03-01": {"RSI": "None"}}}"#,
        )
        .unwrap();
        assert!(rsi_to_technicals(&resp, "IBM", Uuid::new_v4(), Period::Daily).is_empty());
    }

    #[test]
    fn sma_period_routes_to_field() {
        let resp: SmaResponse = serde_json::from_str(
            r#"{"Technical Analysis: SMA": {"2024-03-01": {"SMA": "182.4"}}}"#,
        )
        .unwrap();
        let rows = sma_to_technicals(&resp, "IBM", Uuid::new_v4(), Period::Daily, 200);
        assert_eq!(rows[0].sma_200, Some(182.4));
        assert_eq!(rows[0].sma_20, None);
    }

    #[test]
    fn bbands_derives_percent_b_and_width() {
        let resp: BbandsResponse = serde_json::from_str(
            r#"{"Technical Analysis: BBANDS": {"2024-03-01": {
                "Real Upper Band": "110.0",
                "Real Middle Band": "100.0",
                "Real Lower Band": "90.0"
            }}}"#,
        )
        .unwrap();
        let rows = bbands_to_technicals(&resp, "IBM", Uuid::new_v4(), Period::Daily);
        let row = &rows[0];
        assert!((row.bb_percent_b.unwrap() - 0.5).abs() < 1e-9);
        assert!((row.bb_width.unwrap() - 0.2).abs() < 1e-9);
    }
}
