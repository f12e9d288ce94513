use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::IngestError;

pub const TECHNICALS_STALENESS_HOURS: i64 = 24;

/// Sampling period for series and indicators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Period {
    Daily,
    Weekly,
    Monthly,
}

impl Period {
    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Daily => "daily",
            Period::Weekly => "weekly",
            Period::Monthly => "monthly",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, IngestError> {
        match raw.trim().to_lowercase().as_str() {
            "daily" => Ok(Period::Daily),
            "weekly" => Ok(Period::Weekly),
            "monthly" => Ok(Period::Monthly),
            other => Err(IngestError::Validation(format!(
                "unsupported period {:?}",
                other
            ))),
        }
    }
}

/// Indicator families served by the strategy registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndicatorKind {
    Rsi,
    Macd,
    Sma,
    Ema,
    Bbands,
    Stoch,
    Adx,
    Cci,
    Aroon,
}

impl IndicatorKind {
    pub const ALL: [IndicatorKind; 9] = [
        IndicatorKind::Rsi,
        IndicatorKind::Macd,
        IndicatorKind::Sma,
        IndicatorKind::Ema,
        IndicatorKind::Bbands,
        IndicatorKind::Stoch,
        IndicatorKind::Adx,
        IndicatorKind::Cci,
        IndicatorKind::Aroon,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IndicatorKind::Rsi => "RSI",
            IndicatorKind::Macd => "MACD",
            IndicatorKind::Sma => "SMA",
            IndicatorKind::Ema => "EMA",
            IndicatorKind::Bbands => "BBANDS",
            IndicatorKind::Stoch => "STOCH",
            IndicatorKind::Adx => "ADX",
            IndicatorKind::Cci => "CCI",
            IndicatorKind::Aroon => "AROON",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, IngestError> {
        match raw.trim().to_uppercase().as_str() {
            "RSI" => Ok(IndicatorKind::Rsi),
            "MACD" => Ok(IndicatorKind::Macd),
            "SMA" => Ok(IndicatorKind::Sma),
            "EMA" => Ok(IndicatorKind::Ema),
            "BBANDS" => Ok(IndicatorKind::Bbands),
            "STOCH" => Ok(IndicatorKind::Stoch),
            "ADX" => Ok(IndicatorKind::Adx),
            "CCI" => Ok(IndicatorKind::Cci),
            "AROON" => Ok(IndicatorKind::Aroon),
            other => Err(IngestError::Validation(format!(
                "unsupported indicator {:?}",
                other
            ))),
        }
    }
}

/// Discrete signal emitted by the scoring pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalLevel {
    StrongSell,
    Sell,
    Hold,
    Buy,
    StrongBuy,
}

impl SignalLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalLevel::StrongSell => "STRONG_SELL",
            SignalLevel::Sell => "SELL",
            SignalLevel::Hold => "HOLD",
            SignalLevel::Buy => "BUY",
            SignalLevel::StrongBuy => "STRONG_BUY",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, IngestError> {
        match raw {
            "STRONG_SELL" => Ok(SignalLevel::StrongSell),
            "SELL" => Ok(SignalLevel::Sell),
            "HOLD" => Ok(SignalLevel::Hold),
            "BUY" => Ok(SignalLevel::Buy),
            "STRONG_BUY" => Ok(SignalLevel::StrongBuy),
            other => Err(IngestError::Validation(format!(
                "unknown signal level {:?}",
                other
            ))),
        }
    }

    /// Score in [-100, 100] used when combining signals.
    pub fn to_score(&self) -> i32 {
        match self {
            SignalLevel::StrongBuy => 100,
            SignalLevel::Buy => 50,
            SignalLevel::Hold => 0,
            SignalLevel::Sell => -50,
            SignalLevel::StrongSell => -100,
        }
    }

    pub fn from_score(score: i32) -> Self {
        match score {
            s if s >= 70 => SignalLevel::StrongBuy,
            s if s >= 25 => SignalLevel::Buy,
            s if s > -25 => SignalLevel::Hold,
            s if s > -70 => SignalLevel::Sell,
            _ => SignalLevel::StrongSell,
        }
    }
}

/// Indicator snapshot per `(company, timeframe)`. Derived signal fields are
/// recomputed on every write from the numeric fields (see `signals`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TechnicalIndicators {
    pub id: Uuid,
    pub company_id: Uuid,
    pub symbol: String,
    pub timeframe: Period,

    // Moving averages
    pub sma_20: Option<f64>,
    pub sma_50: Option<f64>,
    pub sma_200: Option<f64>,
    pub ema_12: Option<f64>,
    pub ema_26: Option<f64>,

    // Oscillators
    pub rsi_14: Option<f64>,
    pub stoch_k: Option<f64>,
    pub stoch_d: Option<f64>,
    pub williams_r: Option<f64>,
    pub cci: Option<f64>,

    // MACD triad
    pub macd_line: Option<f64>,
    pub macd_signal: Option<f64>,
    pub macd_histogram: Option<f64>,

    // Bollinger
    pub bb_upper: Option<f64>,
    pub bb_middle: Option<f64>,
    pub bb_lower: Option<f64>,
    pub bb_percent_b: Option<f64>,
    pub bb_width: Option<f64>,

    // Volume
    pub vwap: Option<f64>,
    pub obv: Option<f64>,

    // Trend
    pub adx: Option<f64>,
    pub aroon_up: Option<f64>,
    pub aroon_down: Option<f64>,
    pub parabolic_sar: Option<f64>,

    // Volatility / levels
    pub atr: Option<f64>,
    pub support_level: Option<f64>,
    pub resistance_level: Option<f64>,

    // Derived signals
    pub trend_signal: SignalLevel,
    pub momentum_signal: SignalLevel,
    pub volume_signal: SignalLevel,
    pub overall_signal: SignalLevel,
    /// Confidence of `overall_signal`, clamped to [0, 100].
    pub signal_strength: f64,

    pub last_updated: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TechnicalIndicators {
    pub fn new(company_id: Uuid, symbol: &str, timeframe: Period) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            company_id,
            symbol: symbol.trim().to_uppercase(),
            timeframe,
            sma_20: None,
            sma_50: None,
            sma_200: None,
            ema_12: None,
            ema_26: None,
            rsi_14: None,
            stoch_k: None,
            stoch_d: None,
            williams_r: None,
            cci: None,
            macd_line: None,
            macd_signal: None,
            macd_histogram: None,
            bb_upper: None,
            bb_middle: None,
            bb_lower: None,
            bb_percent_b: None,
            bb_width: None,
            vwap: None,
            obv: None,
            adx: None,
            aroon_up: None,
            aroon_down: None,
            parabolic_sar: None,
            atr: None,
            support_level: None,
            resistance_level: None,
            trend_signal: SignalLevel::Hold,
            momentum_signal: SignalLevel::Hold,
            volume_signal: SignalLevel::Hold,
            overall_signal: SignalLevel::Hold,
            signal_strength: 0.0,
            last_updated: now,
            created_at: now,
            updated_at: now,
        }
    }

    /// Copy every populated numeric field from `other` into `self`.
    /// Signal fields are left for the scoring pass.
    pub fn merge_from(&mut self, other: &TechnicalIndicators) {
        macro_rules! take {
            ($field:ident) => {
                if other.$field.is_some() {
                    self.$field = other.$field;
                }
            };
        }
        take!(sma_20);
        take!(sma_50);
        take!(sma_200);
        take!(ema_12);
        take!(ema_26);
        take!(rsi_14);
        take!(stoch_k);
        take!(stoch_d);
        take!(williams_r);
        take!(cci);
        take!(macd_line);
        take!(macd_signal);
        take!(macd_histogram);
        take!(bb_upper);
        take!(bb_middle);
        take!(bb_lower);
        take!(bb_percent_b);
        take!(bb_width);
        take!(vwap);
        take!(obv);
        take!(adx);
        take!(aroon_up);
        take!(aroon_down);
        take!(parabolic_sar);
        take!(atr);
        take!(support_level);
        take!(resistance_level);
        if other.last_updated > self.last_updated {
            self.last_updated = other.last_updated;
        }
    }

    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        now - self.last_updated > chrono::Duration::hours(TECHNICALS_STALENESS_HOURS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_round_trips() {
        for period in [Period::Daily, Period::Weekly, Period::Monthly] {
            assert_eq!(Period::parse(period.as_str()).unwrap(), period);
        }
        assert!(Period::parse("hourly").is_err());
    }

    #[test]
    fn indicator_kind_round_trips() {
        for kind in IndicatorKind::ALL {
            assert_eq!(IndicatorKind::parse(kind.as_str()).unwrap(), kind);
        }
        assert!(IndicatorKind::parse("ICHIMOKU").is_err());
    }

    #[test]
    fn signal_level_score_round_trip() {
        assert_eq!(SignalLevel::from_score(100), SignalLevel::StrongBuy);
        assert_eq!(SignalLevel::from_score(0), SignalLevel::Hold);
        assert_eq!(SignalLevel::from_score(-100), SignalLevel::StrongSell);
    }

    #[test]
    fn merge_keeps_existing_when_other_is_none() {
        let company = Uuid::new_v4();
        let mut base = TechnicalIndicators::new(company, "AAPL", Period::Daily);
        base.rsi_14 = Some(55.0);

        let mut incoming = TechnicalIndicators::new(company, "AAPL", Period::Daily);
        incoming.macd_line = Some(1.2);

        base.merge_from(&incoming);
        assert_eq!(base.rsi_14, Some(55.0));
        assert_eq!(base.macd_line, Some(1.2));
    }
}
