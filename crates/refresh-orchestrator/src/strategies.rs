//! Strategy registry: one `(fetch, convert)` pair per period and per
//! indicator family. Strategies bind their own typed response, so nothing
//! downstream ever type-asserts an untyped payload.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use alphavantage_client::{AlphaVantageClient, IndicatorResponse, TimeSeriesResponse};
use async_trait::async_trait;
use ingest_core::{HistoricalData, IndicatorKind, IngestError, Period, TechnicalIndicators};
use market_adapters::{indicator_to_technicals, time_series_to_historical};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[async_trait]
pub trait PeriodStrategy: Send + Sync {
    fn period(&self) -> Period;

    async fn fetch(
        &self,
        client: &AlphaVantageClient,
        symbol: &str,
        cancel: &CancellationToken,
    ) -> Result<TimeSeriesResponse, IngestError>;

    fn convert(
        &self,
        response: &TimeSeriesResponse,
        company_id: Uuid,
    ) -> Result<Vec<HistoricalData>, IngestError>;
}

#[async_trait]
pub trait IndicatorStrategy: Send + Sync {
    fn kind(&self) -> IndicatorKind;

    async fn fetch(
        &self,
        client: &AlphaVantageClient,
        symbol: &str,
        interval: &str,
        cancel: &CancellationToken,
    ) -> Result<IndicatorResponse, IngestError>;

    fn convert(
        &self,
        response: &IndicatorResponse,
        symbol: &str,
        company_id: Uuid,
        timeframe: Period,
    ) -> Result<Vec<TechnicalIndicators>, IngestError>;
}

macro_rules! period_strategy {
    ($name:ident, $period:expr, $method:ident) => {
        pub struct $name;

        #[async_trait]
        impl PeriodStrategy for $name {
            fn period(&self) -> Period {
                $period
            }

            async fn fetch(
                &self,
                client: &AlphaVantageClient,
                symbol: &str,
                cancel: &CancellationToken,
            ) -> Result<TimeSeriesResponse, IngestError> {
                client.$method(symbol, cancel).await
            }

            fn convert(
                &self,
                response: &TimeSeriesResponse,
                company_id: Uuid,
            ) -> Result<Vec<HistoricalData>, IngestError> {
                Ok(time_series_to_historical(response, company_id, $period))
            }
        }
    };
}

period_strategy!(DailyStrategy, Period::Daily, time_series_daily);
period_strategy!(WeeklyStrategy, Period::Weekly, time_series_weekly);
period_strategy!(MonthlyStrategy, Period::Monthly, time_series_monthly);

/// Default indicator parameters, mirroring the common published settings.
const RSI_PERIOD: u32 = 14;
const SMA_PERIOD: u32 = 20;
const EMA_PERIOD: u32 = 12;
const BBANDS_PERIOD: u32 = 20;
const ADX_PERIOD: u32 = 14;
const CCI_PERIOD: u32 = 20;
const AROON_PERIOD: u32 = 25;
const SERIES_TYPE: &str = "close";

pub struct RsiStrategy {
    pub time_period: u32,
}

#[async_trait]
impl IndicatorStrategy for RsiStrategy {
    fn kind(&self) -> IndicatorKind {
        IndicatorKind::Rsi
    }

    async fn fetch(
        &self,
        client: &AlphaVantageClient,
        symbol: &str,
        interval: &str,
        cancel: &CancellationToken,
    ) -> Result<IndicatorResponse, IngestError> {
        Ok(IndicatorResponse::Rsi(
            client
                .rsi(symbol, interval, self.time_period, SERIES_TYPE, cancel)
                .await?,
        ))
    }

    fn convert(
        &self,
        response: &IndicatorResponse,
        symbol: &str,
        company_id: Uuid,
        timeframe: Period,
    ) -> Result<Vec<TechnicalIndicators>, IngestError> {
        indicator_to_technicals(response, symbol, company_id, timeframe, self.time_period)
    }
}

pub struct SmaStrategy {
    pub time_period: u32,
}

#[async_trait]
impl IndicatorStrategy for SmaStrategy {
    fn kind(&self) -> IndicatorKind {
        IndicatorKind::Sma
    }

    async fn fetch(
        &self,
        client: &AlphaVantageClient,
        symbol: &str,
        interval: &str,
        cancel: &CancellationToken,
    ) -> Result<IndicatorResponse, IngestError> {
        Ok(IndicatorResponse::Sma(
            client
                .sma(symbol, interval, self.time_period, SERIES_TYPE, cancel)
                .await?,
        ))
    }

    fn convert(
        &self,
        response: &IndicatorResponse,
        symbol: &str,
        company_id: Uuid,
        timeframe: Period,
    ) -> Result<Vec<TechnicalIndicators>, IngestError> {
        indicator_to_technicals(response, symbol, company_id, timeframe, self.time_period)
    }
}

pub struct EmaStrategy {
    pub time_period: u32,
}

#[async_trait]
impl IndicatorStrategy for EmaStrategy {
    fn kind(&self) -> IndicatorKind {
        IndicatorKind::Ema
    }

    async fn fetch(
        &self,
        client: &AlphaVantageClient,
        symbol: &str,
        interval: &str,
        cancel: &CancellationToken,
    ) -> Result<IndicatorResponse, IngestError> {
        Ok(IndicatorResponse::Ema(
            client
                .ema(symbol, interval, self.time_period, SERIES_TYPE, cancel)
                .await?,
        ))
    }

    fn convert(
        &self,
        response: &IndicatorResponse,
        symbol: &str,
        company_id: Uuid,
        timeframe: Period,
    ) -> Result<Vec<TechnicalIndicators>, IngestError> {
        indicator_to_technicals(response, symbol, company_id, timeframe, self.time_period)
    }
}

pub struct MacdStrategy;

#[async_trait]
impl IndicatorStrategy for MacdStrategy {
    fn kind(&self) -> IndicatorKind {
        IndicatorKind::Macd
    }

    async fn fetch(
        &self,
        client: &AlphaVantageClient,
        symbol: &str,
        interval: &str,
        cancel: &CancellationToken,
    ) -> Result<IndicatorResponse, IngestError> {
        Ok(IndicatorResponse::Macd(
            client.macd(symbol, interval, SERIES_TYPE, cancel).await?,
        ))
    }

    fn convert(
        &self,
        response: &IndicatorResponse,
        symbol: &str,
        company_id: Uuid,
        timeframe: Period,
    ) -> Result<Vec<TechnicalIndicators>, IngestError> {
        indicator_to_technicals(response, symbol, company_id, timeframe, 0)
    }
}

pub struct BbandsStrategy {
    pub time_period: u32,
}

#[async_trait]
impl IndicatorStrategy for BbandsStrategy {
    fn kind(&self) -> IndicatorKind {
        IndicatorKind::Bbands
    }

    async fn fetch(
        &self,
        client: &AlphaVantageClient,
        symbol: &str,
        interval: &str,
        cancel: &CancellationToken,
    ) -> Result<IndicatorResponse, IngestError> {
        Ok(IndicatorResponse::Bbands(
            client
                .bbands(symbol, interval, self.time_period, SERIES_TYPE, cancel)
                .await?,
        ))
    }

    fn convert(
        &self,
        response: &IndicatorResponse,
        symbol: &str,
        company_id: Uuid,
        timeframe: Period,
    ) -> Result<Vec<TechnicalIndicators>, IngestError> {
        indicator_to_technicals(response, symbol, company_id, timeframe, self.time_period)
    }
}

pub struct StochStrategy;

#[async_trait]
impl IndicatorStrategy for StochStrategy {
    fn kind(&self) -> IndicatorKind {
        IndicatorKind::Stoch
    }

    async fn fetch(
        &self,
        client: &AlphaVantageClient,
        symbol: &str,
        interval: &str,
        cancel: &CancellationToken,
    ) -> Result<IndicatorResponse, IngestError> {
        Ok(IndicatorResponse::Stoch(
            client.stoch(symbol, interval, cancel).await?,
        ))
    }

    fn convert(
        &self,
        response: &IndicatorResponse,
        symbol: &str,
        company_id: Uuid,
        timeframe: Period,
    ) -> Result<Vec<TechnicalIndicators>, IngestError> {
        indicator_to_technicals(response, symbol, company_id, timeframe, 0)
    }
}

pub struct AdxStrategy {
    pub time_period: u32,
}

#[async_trait]
impl IndicatorStrategy for AdxStrategy {
    fn kind(&self) -> IndicatorKind {
        IndicatorKind::Adx
    }

    async fn fetch(
        &self,
        client: &AlphaVantageClient,
        symbol: &str,
        interval: &str,
        cancel: &CancellationToken,
    ) -> Result<IndicatorResponse, IngestError> {
        Ok(IndicatorResponse::Adx(
            client
                .adx(symbol, interval, self.time_period, cancel)
                .await?,
        ))
    }

    fn convert(
        &self,
        response: &IndicatorResponse,
        symbol: &str,
        company_id: Uuid,
        timeframe: Period,
    ) -> Result<Vec<TechnicalIndicators>, IngestError> {
        indicator_to_technicals(response, symbol, company_id, timeframe, self.time_period)
    }
}

pub struct CciStrategy {
    pub time_period: u32,
}

#[async_trait]
impl IndicatorStrategy for CciStrategy {
    fn kind(&self) -> IndicatorKind {
        IndicatorKind::Cci
    }

    async fn fetch(
        &self,
        client: &AlphaVantageClient,
        symbol: &str,
        interval: &str,
        cancel: &CancellationToken,
    ) -> Result<IndicatorResponse, IngestError> {
        Ok(IndicatorResponse::Cci(
            client
                .cci(symbol, interval, self.time_period, cancel)
                .await?,
        ))
    }

    fn convert(
        &self,
        response: &IndicatorResponse,
        symbol: &str,
        company_id: Uuid,
        timeframe: Period,
    ) -> Result<Vec<TechnicalIndicators>, IngestError> {
        indicator_to_technicals(response, symbol, company_id, timeframe, self.time_period)
    }
}

pub struct AroonStrategy {
    pub time_period: u32,
}

#[async_trait]
impl IndicatorStrategy for AroonStrategy {
    fn kind(&self) -> IndicatorKind {
        IndicatorKind::Aroon
    }

    async fn fetch(
        &self,
        client: &AlphaVantageClient,
        symbol: &str,
        interval: &str,
        cancel: &CancellationToken,
    ) -> Result<IndicatorResponse, IngestError> {
        Ok(IndicatorResponse::Aroon(
            client
                .aroon(symbol, interval, self.time_period, cancel)
                .await?,
        ))
    }

    fn convert(
        &self,
        response: &IndicatorResponse,
        symbol: &str,
        company_id: Uuid,
        timeframe: Period,
    ) -> Result<Vec<TechnicalIndicators>, IngestError> {
        indicator_to_technicals(response, symbol, company_id, timeframe, self.time_period)
    }
}

/// Read-mostly registry. Defaults are registered at construction; runtime
/// registration is guarded by the inner locks.
pub struct StrategyRegistry {
    periods: RwLock<HashMap<Period, Arc<dyn PeriodStrategy>>>,
    indicators: RwLock<HashMap<IndicatorKind, Arc<dyn IndicatorStrategy>>>,
}

impl StrategyRegistry {
    pub fn with_defaults() -> Self {
        let registry = Self {
            periods: RwLock::new(HashMap::new()),
            indicators: RwLock::new(HashMap::new()),
        };
        registry.register_period(Arc::new(DailyStrategy));
        registry.register_period(Arc::new(WeeklyStrategy));
        registry.register_period(Arc::new(MonthlyStrategy));
        registry.register_indicator(Arc::new(RsiStrategy {
            time_period: RSI_PERIOD,
        }));
        registry.register_indicator(Arc::new(MacdStrategy));
        registry.register_indicator(Arc::new(SmaStrategy {
            time_period: SMA_PERIOD,
        }));
        registry.register_indicator(Arc::new(EmaStrategy {
            time_period: EMA_PERIOD,
        }));
        registry.register_indicator(Arc::new(BbandsStrategy {
            time_period: BBANDS_PERIOD,
        }));
        registry.register_indicator(Arc::new(StochStrategy));
        registry.register_indicator(Arc::new(AdxStrategy {
            time_period: ADX_PERIOD,
        }));
        registry.register_indicator(Arc::new(CciStrategy {
            time_period: CCI_PERIOD,
        }));
        registry.register_indicator(Arc::new(AroonStrategy {
            time_period: AROON_PERIOD,
        }));
        registry
    }

    pub fn register_period(&self, strategy: Arc<dyn PeriodStrategy>) {
        self.periods
            .write()
            .expect("period registry poisoned")
            .insert(strategy.period(), strategy);
    }

    pub fn register_indicator(&self, strategy: Arc<dyn IndicatorStrategy>) {
        self.indicators
            .write()
            .expect("indicator registry poisoned")
            .insert(strategy.kind(), strategy);
    }

    pub fn period(&self, period: Period) -> Result<Arc<dyn PeriodStrategy>, IngestError> {
        self.periods
            .read()
            .expect("period registry poisoned")
            .get(&period)
            .cloned()
            .ok_or_else(|| {
                IngestError::Validation(format!("unsupported period {:?}", period.as_str()))
            })
    }

    pub fn indicator(
        &self,
        kind: IndicatorKind,
    ) -> Result<Arc<dyn IndicatorStrategy>, IngestError> {
        self.indicators
            .read()
            .expect("indicator registry poisoned")
            .get(&kind)
            .cloned()
            .ok_or_else(|| {
                IngestError::Validation(format!("unsupported indicator {:?}", kind.as_str()))
            })
    }

    /// Resolve from a wire/CLI name, e.g. `"rsi"`.
    pub fn indicator_by_name(&self, name: &str) -> Result<Arc<dyn IndicatorStrategy>, IngestError> {
        self.indicator(IndicatorKind::parse(name)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_period_and_indicator() {
        let registry = StrategyRegistry::with_defaults();
        for period in [Period::Daily, Period::Weekly, Period::Monthly] {
            assert!(registry.period(period).is_ok());
        }
        for kind in IndicatorKind::ALL {
            assert!(registry.indicator(kind).is_ok(), "missing {:?}", kind);
        }
    }

    #[test]
    fn unknown_names_yield_typed_unsupported_errors() {
        let registry = StrategyRegistry::with_defaults();
        let err = match registry.indicator_by_name("ICHIMOKU") {
            Err(e) => e,
            Ok(_) => panic!("expected unsupported indicator error"),
        };
        assert_eq!(err.category(), "validation");
        assert!(err.to_string().contains("unsupported"));
    }

    #[test]
    fn runtime_registration_replaces_defaults() {
        let registry = StrategyRegistry::with_defaults();
        registry.register_indicator(Arc::new(SmaStrategy { time_period: 200 }));
        let strategy = registry.indicator(IndicatorKind::Sma).unwrap();
        assert_eq!(strategy.kind(), IndicatorKind::Sma);
    }

    #[test]
    fn convert_rejects_nothing_for_matching_variant() {
        let registry = StrategyRegistry::with_defaults();
        let strategy = registry.indicator(IndicatorKind::Rsi).unwrap();
        let response = IndicatorResponse::Rsi(
            serde_json::from_str(r#"{"Technical Analysis: RSI": {"2024-03-01": {"RSI": "41.0"}}}"#)
                .unwrap(),
        );
        let rows = strategy
            .convert(&response, "IBM", Uuid::new_v4(), Period::Daily)
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].rsi_14, Some(41.0));
    }
}
