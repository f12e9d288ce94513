use chrono::{DateTime, Utc};
use ingest_core::{signals, IngestError, Period, SignalLevel, TechnicalIndicators};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::company::parse_id;

#[derive(Debug, sqlx::FromRow)]
struct IndicatorsRow {
    id: String,
    company_id: String,
    symbol: String,
    timeframe: String,
    sma_20: Option<f64>,
    sma_50: Option<f64>,
    sma_200: Option<f64>,
    ema_12: Option<f64>,
    ema_26: Option<f64>,
    rsi_14: Option<f64>,
    stoch_k: Option<f64>,
    stoch_d: Option<f64>,
    williams_r: Option<f64>,
    cci: Option<f64>,
    macd_line: Option<f64>,
    macd_signal: Option<f64>,
    macd_histogram: Option<f64>,
    bb_upper: Option<f64>,
    bb_middle: Option<f64>,
    bb_lower: Option<f64>,
    bb_percent_b: Option<f64>,
    bb_width: Option<f64>,
    vwap: Option<f64>,
    obv: Option<f64>,
    adx: Option<f64>,
    aroon_up: Option<f64>,
    aroon_down: Option<f64>,
    parabolic_sar: Option<f64>,
    atr: Option<f64>,
    support_level: Option<f64>,
    resistance_level: Option<f64>,
    trend_signal: String,
    momentum_signal: String,
    volume_signal: String,
    overall_signal: String,
    signal_strength: f64,
    last_updated: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<IndicatorsRow> for TechnicalIndicators {
    type Error = IngestError;

    fn try_from(row: IndicatorsRow) -> Result<Self, Self::Error> {
        Ok(TechnicalIndicators {
            id: parse_id(&row.id)?,
            company_id: parse_id(&row.company_id)?,
            symbol: row.symbol,
            timeframe: Period::parse(&row.timeframe)?,
            sma_20: row.sma_20,
            sma_50: row.sma_50,
            sma_200: row.sma_200,
            ema_12: row.ema_12,
            ema_26: row.ema_26,
            rsi_14: row.rsi_14,
            stoch_k: row.stoch_k,
            stoch_d: row.stoch_d,
            williams_r: row.williams_r,
            cci: row.cci,
            macd_line: row.macd_line,
            macd_signal: row.macd_signal,
            macd_histogram: row.macd_histogram,
            bb_upper: row.bb_upper,
            bb_middle: row.bb_middle,
            bb_lower: row.bb_lower,
            bb_percent_b: row.bb_percent_b,
            bb_width: row.bb_width,
            vwap: row.vwap,
            obv: row.obv,
            adx: row.adx,
            aroon_up: row.aroon_up,
            aroon_down: row.aroon_down,
            parabolic_sar: row.parabolic_sar,
            atr: row.atr,
            support_level: row.support_level,
            resistance_level: row.resistance_level,
            trend_signal: SignalLevel::parse(&row.trend_signal)?,
            momentum_signal: SignalLevel::parse(&row.momentum_signal)?,
            volume_signal: SignalLevel::parse(&row.volume_signal)?,
            overall_signal: SignalLevel::parse(&row.overall_signal)?,
            signal_strength: row.signal_strength,
            last_updated: row.last_updated,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Clone)]
pub struct TechnicalIndicatorsRepository {
    pool: SqlitePool,
}

impl TechnicalIndicatorsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// One snapshot per `(company, timeframe)`. Signals are recomputed from
    /// the numeric fields before every write, so stored signals can never
    /// drift from stored numbers.
    pub async fn upsert_snapshot(
        &self,
        indicators: &TechnicalIndicators,
    ) -> Result<(), IngestError> {
        let mut fresh = indicators.clone();
        signals::recompute(&mut fresh);
        fresh.updated_at = Utc::now();

        sqlx::query(
            "INSERT INTO technical_indicators \
             (id, company_id, symbol, timeframe, sma_20, sma_50, sma_200, ema_12, ema_26, \
              rsi_14, stoch_k, stoch_d, williams_r, cci, macd_line, macd_signal, macd_histogram, \
              bb_upper, bb_middle, bb_lower, bb_percent_b, bb_width, vwap, obv, adx, \
              aroon_up, aroon_down, parabolic_sar, atr, support_level, resistance_level, \
              trend_signal, momentum_signal, volume_signal, overall_signal, signal_strength, \
              last_updated, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(company_id, timeframe) DO UPDATE SET \
              symbol = excluded.symbol, sma_20 = excluded.sma_20, sma_50 = excluded.sma_50, \
              sma_200 = excluded.sma_200, ema_12 = excluded.ema_12, ema_26 = excluded.ema_26, \
              rsi_14 = excluded.rsi_14, stoch_k = excluded.stoch_k, stoch_d = excluded.stoch_d, \
              williams_r = excluded.williams_r, cci = excluded.cci, \
              macd_line = excluded.macd_line, macd_signal = excluded.macd_signal, \
              macd_histogram = excluded.macd_histogram, bb_upper = excluded.bb_upper, \
              bb_middle = excluded.bb_middle, bb_lower = excluded.bb_lower, \
              bb_percent_b = excluded.bb_percent_b, bb_width = excluded.bb_width, \
              vwap = excluded.vwap, obv = excluded.obv, adx = excluded.adx, \
              aroon_up = excluded.aroon_up, aroon_down = excluded.aroon_down, \
              parabolic_sar = excluded.parabolic_sar, atr = excluded.atr, \
              support_level = excluded.support_level, \
              resistance_level = excluded.resistance_level, \
              trend_signal = excluded.trend_signal, momentum_signal = excluded.momentum_signal, \
              volume_signal = excluded.volume_signal, overall_signal = excluded.overall_signal, \
              signal_strength = excluded.signal_strength, last_updated = excluded.last_updated, \
              updated_at = excluded.updated_at",
        )
        .bind(fresh.id.to_string())
        .bind(fresh.company_id.to_string())
        .bind(&fresh.symbol)
        .bind(fresh.timeframe.as_str())
        .bind(fresh.sma_20)
        .bind(fresh.sma_50)
        .bind(fresh.sma_200)
        .bind(fresh.ema_12)
        .bind(fresh.ema_26)
        .bind(fresh.rsi_14)
        .bind(fresh.stoch_k)
        .bind(fresh.stoch_d)
        .bind(fresh.williams_r)
        .bind(fresh.cci)
        .bind(fresh.macd_line)
        .bind(fresh.macd_signal)
        .bind(fresh.macd_histogram)
        .bind(fresh.bb_upper)
        .bind(fresh.bb_middle)
        .bind(fresh.bb_lower)
        .bind(fresh.bb_percent_b)
        .bind(fresh.bb_width)
        .bind(fresh.vwap)
        .bind(fresh.obv)
        .bind(fresh.adx)
        .bind(fresh.aroon_up)
        .bind(fresh.aroon_down)
        .bind(fresh.parabolic_sar)
        .bind(fresh.atr)
        .bind(fresh.support_level)
        .bind(fresh.resistance_level)
        .bind(fresh.trend_signal.as_str())
        .bind(fresh.momentum_signal.as_str())
        .bind(fresh.volume_signal.as_str())
        .bind(fresh.overall_signal.as_str())
        .bind(fresh.signal_strength)
        .bind(fresh.last_updated)
        .bind(fresh.created_at)
        .bind(fresh.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_by_company_and_timeframe(
        &self,
        company_id: Uuid,
        timeframe: Period,
    ) -> Result<Option<TechnicalIndicators>, IngestError> {
        let row: Option<IndicatorsRow> = sqlx::query_as(
            "SELECT * FROM technical_indicators WHERE company_id = ? AND timeframe = ?",
        )
        .bind(company_id.to_string())
        .bind(timeframe.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(TechnicalIndicators::try_from).transpose()
    }

    /// Screen: strong positive overall signal.
    pub async fn get_bullish_stocks(
        &self,
        min_strength: f64,
    ) -> Result<Vec<TechnicalIndicators>, IngestError> {
        let rows: Vec<IndicatorsRow> = sqlx::query_as(
            "SELECT * FROM technical_indicators \
             WHERE overall_signal IN ('BUY', 'STRONG_BUY') AND signal_strength >= ? \
             ORDER BY signal_strength DESC",
        )
        .bind(min_strength)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TechnicalIndicators::try_from).collect()
    }

    pub async fn delete_by_company(&self, company_id: Uuid) -> Result<(), IngestError> {
        sqlx::query("DELETE FROM technical_indicators WHERE company_id = ?")
            .bind(company_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
