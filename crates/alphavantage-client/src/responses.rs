//! Typed payloads for each Alpha Vantage operation. Numeric values arrive as
//! strings (`"56.0832"`), sometimes `"None"`; adapters own the parsing.

use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;

/// `GLOBAL_QUOTE`, used by the health check.
#[derive(Debug, Clone, Deserialize)]
pub struct GlobalQuoteResponse {
    #[serde(rename = "Global Quote", default)]
    pub quote: HashMap<String, String>,
}

/// `OVERVIEW` fundamentals snapshot, all values as strings.
#[derive(Debug, Clone, Deserialize)]
pub struct CompanyOverview {
    #[serde(rename = "Symbol")]
    pub symbol: String,
    #[serde(rename = "Name")]
    pub name: Option<String>,
    #[serde(rename = "Sector")]
    pub sector: Option<String>,
    #[serde(rename = "Exchange")]
    pub exchange: Option<String>,
    #[serde(rename = "Currency")]
    pub currency: Option<String>,
    #[serde(rename = "MarketCapitalization")]
    pub market_capitalization: Option<String>,
    #[serde(rename = "PERatio")]
    pub pe_ratio: Option<String>,
    #[serde(rename = "PEGRatio")]
    pub peg_ratio: Option<String>,
    #[serde(rename = "PriceToBookRatio")]
    pub price_to_book: Option<String>,
    #[serde(rename = "PriceToSalesRatioTTM")]
    pub price_to_sales: Option<String>,
    #[serde(rename = "EVToEBITDA")]
    pub ev_to_ebitda: Option<String>,
    #[serde(rename = "ProfitMargin")]
    pub profit_margin: Option<String>,
    #[serde(rename = "OperatingMarginTTM")]
    pub operating_margin: Option<String>,
    #[serde(rename = "ReturnOnEquityTTM")]
    pub return_on_equity: Option<String>,
    #[serde(rename = "ReturnOnAssetsTTM")]
    pub return_on_assets: Option<String>,
    #[serde(rename = "QuarterlyRevenueGrowthYOY")]
    pub revenue_growth_yoy: Option<String>,
    #[serde(rename = "QuarterlyEarningsGrowthYOY")]
    pub earnings_growth_yoy: Option<String>,
    #[serde(rename = "EPS")]
    pub eps: Option<String>,
    #[serde(rename = "BookValue")]
    pub book_value: Option<String>,
    #[serde(rename = "RevenuePerShareTTM")]
    pub revenue_per_share: Option<String>,
    #[serde(rename = "DividendYield")]
    pub dividend_yield: Option<String>,
    #[serde(rename = "Beta")]
    pub beta: Option<String>,
    #[serde(rename = "AnalystTargetPrice")]
    pub analyst_target_price: Option<String>,
    #[serde(rename = "AnalystRatingStrongBuy")]
    pub analyst_strong_buy: Option<String>,
    #[serde(rename = "AnalystRatingBuy")]
    pub analyst_buy: Option<String>,
    #[serde(rename = "AnalystRatingHold")]
    pub analyst_hold: Option<String>,
    #[serde(rename = "AnalystRatingSell")]
    pub analyst_sell: Option<String>,
    #[serde(rename = "LatestQuarter")]
    pub latest_quarter: Option<String>,
    #[serde(rename = "52WeekHigh")]
    pub week_high_52: Option<String>,
    #[serde(rename = "52WeekLow")]
    pub week_low_52: Option<String>,
}

/// One OHLCV point inside a time-series response. Field numbering differs
/// between the plain and adjusted endpoints, hence the aliases.
#[derive(Debug, Clone, Deserialize)]
pub struct OhlcvPoint {
    #[serde(rename = "1. open")]
    pub open: String,
    #[serde(rename = "2. high")]
    pub high: String,
    #[serde(rename = "3. low")]
    pub low: String,
    #[serde(rename = "4. close")]
    pub close: String,
    #[serde(rename = "5. adjusted close", default)]
    pub adjusted_close: Option<String>,
    #[serde(rename = "6. volume", alias = "5. volume")]
    pub volume: String,
}

/// Unified shape returned by the daily/weekly/monthly series operations.
/// Keys are `YYYY-MM-DD` dates; `BTreeMap` keeps them ascending.
#[derive(Debug, Clone)]
pub struct TimeSeriesResponse {
    pub symbol: String,
    pub points: BTreeMap<String, OhlcvPoint>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DailySeriesPayload {
    #[serde(rename = "Time Series (Daily)", default)]
    pub series: BTreeMap<String, OhlcvPoint>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WeeklySeriesPayload {
    #[serde(rename = "Weekly Time Series", default)]
    pub series: BTreeMap<String, OhlcvPoint>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MonthlySeriesPayload {
    #[serde(rename = "Monthly Time Series", default)]
    pub series: BTreeMap<String, OhlcvPoint>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RsiPoint {
    #[serde(rename = "RSI")]
    pub rsi: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RsiResponse {
    #[serde(rename = "Technical Analysis: RSI", default)]
    pub series: BTreeMap<String, RsiPoint>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmaPoint {
    #[serde(rename = "SMA")]
    pub sma: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmaResponse {
    #[serde(rename = "Technical Analysis: SMA", default)]
    pub series: BTreeMap<String, SmaPoint>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmaPoint {
    #[serde(rename = "EMA")]
    pub ema: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmaResponse {
    #[serde(rename = "Technical Analysis: EMA", default)]
    pub series: BTreeMap<String, EmaPoint>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MacdPoint {
    #[serde(rename = "MACD")]
    pub macd: String,
    #[serde(rename = "MACD_Signal")]
    pub signal: String,
    #[serde(rename = "MACD_Hist")]
    pub histogram: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MacdResponse {
    #[serde(rename = "Technical Analysis: MACD", default)]
    pub series: BTreeMap<String, MacdPoint>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BbandsPoint {
    #[serde(rename = "Real Upper Band")]
    pub upper: String,
    #[serde(rename = "Real Middle Band")]
    pub middle: String,
    #[serde(rename = "Real Lower Band")]
    pub lower: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BbandsResponse {
    #[serde(rename = "Technical Analysis: BBANDS", default)]
    pub series: BTreeMap<String, BbandsPoint>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StochPoint {
    #[serde(rename = "SlowK")]
    pub slow_k: String,
    #[serde(rename = "SlowD")]
    pub slow_d: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StochResponse {
    #[serde(rename = "Technical Analysis: STOCH", default)]
    pub series: BTreeMap<String, StochPoint>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdxPoint {
    #[serde(rename = "ADX")]
    pub adx: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdxResponse {
    #[serde(rename = "Technical Analysis: ADX", default)]
    pub series: BTreeMap<String, AdxPoint>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CciPoint {
    #[serde(rename = "CCI")]
    pub cci: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CciResponse {
    #[serde(rename = "Technical Analysis: CCI", default)]
    pub series: BTreeMap<String, CciPoint>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AroonPoint {
    #[serde(rename = "Aroon Up")]
    pub aroon_up: String,
    #[serde(rename = "Aroon Down")]
    pub aroon_down: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AroonResponse {
    #[serde(rename = "Technical Analysis: AROON", default)]
    pub series: BTreeMap<String, AroonPoint>,
}

/// `EARNINGS` quarterly EPS history.
#[derive(Debug, Clone, Deserialize)]
pub struct EarningsResponse {
    pub symbol: String,
    #[serde(rename = "quarterlyEarnings", default)]
    pub quarterly_earnings: Vec<QuarterlyEarning>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuarterlyEarning {
    #[serde(rename = "fiscalDateEnding")]
    pub fiscal_date_ending: String,
    #[serde(rename = "reportedDate", default)]
    pub reported_date: Option<String>,
    #[serde(rename = "reportedEPS", default)]
    pub reported_eps: Option<String>,
    #[serde(rename = "estimatedEPS", default)]
    pub estimated_eps: Option<String>,
    #[serde(rename = "surprise", default)]
    pub surprise: Option<String>,
    #[serde(rename = "surprisePercentage", default)]
    pub surprise_percentage: Option<String>,
}

/// Sum type over every indicator operation so a single dispatcher (the
/// strategy registry) can hand each strategy its own typed payload.
#[derive(Debug, Clone)]
pub enum IndicatorResponse {
    Rsi(RsiResponse),
    Sma(SmaResponse),
    Ema(EmaResponse),
    Macd(MacdResponse),
    Bbands(BbandsResponse),
    Stoch(StochResponse),
    Adx(AdxResponse),
    Cci(CciResponse),
    Aroon(AroonResponse),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_overview_payload() {
        let body = r#"{
            "Symbol": "IBM",
            "Name": "International Business Machines",
            "Sector": "TECHNOLOGY",
            "MarketCapitalization": "168553415000",
            "PERatio": "22.96",
            "EPS": "8.23",
            "DividendYield": "0.0366",
            "52WeekHigh": "199.18",
            "52WeekLow": "130.68"
        }"#;
        let overview: CompanyOverview = serde_json::from_str(body).unwrap();
        assert_eq!(overview.symbol, "IBM");
        assert_eq!(overview.pe_ratio.as_deref(), Some("22.96"));
        assert_eq!(overview.week_high_52.as_deref(), Some("199.18"));
    }

    #[test]
    fn parses_daily_series_with_plain_volume_key() {
        let body = r#"{
            "Meta Data": {"2. Symbol": "IBM"},
            "Time Series (Daily)": {
                "2024-03-01": {
                    "1. open": "185.00",
                    "2. high": "188.50",
                    "3. low": "184.10",
                    "4. close": "187.64",
                    "5. volume": "4521000"
                }
            }
        }"#;
        let payload: DailySeriesPayload = serde_json::from_str(body).unwrap();
        let point = payload.series.get("2024-03-01").unwrap();
        assert_eq!(point.volume, "4521000");
        assert!(point.adjusted_close.is_none());
    }

    #[test]
    fn parses_macd_series() {
        let body = r#"{
            "Technical Analysis: MACD": {
                "2024-03-01": {
                    "MACD": "1.0742",
                    "MACD_Signal": "0.8891",
                    "MACD_Hist": "0.1851"
                }
            }
        }"#;
        let macd: MacdResponse = serde_json::from_str(body).unwrap();
        assert_eq!(macd.series.len(), 1);
        assert_eq!(macd.series["2024-03-01"].histogram, "0.1851");
    }

    #[test]
    fn parses_earnings_payload() {
        let body = r#"{
            "symbol": "IBM",
            "quarterlyEarnings": [{
                "fiscalDateEnding": "2023-12-31",
                "reportedDate": "2024-01-24",
                "reportedEPS": "3.87",
                "estimatedEPS": "3.78",
                "surprise": "0.09",
                "surprisePercentage": "2.381"
            }]
        }"#;
        let earnings: EarningsResponse = serde_json::from_str(body).unwrap();
        assert_eq!(earnings.quarterly_earnings.len(), 1);
        assert_eq!(
            earnings.quarterly_earnings[0].reported_eps.as_deref(),
            Some("3.87")
        );
    }

    #[test]
    fn missing_series_key_defaults_to_empty() {
        let rsi: RsiResponse = serde_json::from_str("{}").unwrap();
        assert!(rsi.series.is_empty());
    }
}
