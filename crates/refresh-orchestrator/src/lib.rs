//! Refresh orchestrator: per-symbol fan-out across providers with a bounded
//! worker pool, per-provider pacing, a strategy registry for period and
//! indicator variants, and a freshness gate in front of every remote call.

pub mod strategies;

#[cfg(test)]
mod orchestrator_tests;

use std::sync::Arc;
use std::time::Duration;

use alphavantage_client::AlphaVantageClient;
use chrono::Utc;
use finnhub_client::FinnhubClient;
use futures_util::FutureExt;
use ingest_core::{
    Company, EarningsQuarter, IndicatorKind, IngestError, Period, TechnicalIndicators,
};
use market_adapters::{
    apply_overview_to_company, earnings_to_quarters, financials_to_basic, news_to_items,
    overview_to_financial_metrics, profile_to_company_profile, quote_to_market_data,
};
use market_cache::{keys, CacheClient, EntityKind};
use market_store::{CompanyRepository, MarketStore};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

pub use strategies::StrategyRegistry;

/// Worker pool bound for bulk refresh.
const DEFAULT_WORKERS: usize = 5;
/// Post-call pacing per worker, keeping bulk refresh under provider quotas.
const PACING: Duration = Duration::from_millis(200);
/// Indicator families fetched by a standard technicals refresh.
const DEFAULT_INDICATORS: [IndicatorKind; 5] = [
    IndicatorKind::Rsi,
    IndicatorKind::Macd,
    IndicatorKind::Sma,
    IndicatorKind::Ema,
    IndicatorKind::Bbands,
];
/// News lookback window for `sync_news`.
const NEWS_LOOKBACK_DAYS: i64 = 7;

/// What one per-symbol refresh actually did.
#[derive(Debug, Clone, Default)]
pub struct RefreshOutcome {
    pub symbol: String,
    pub metrics_refreshed: bool,
    pub technicals_refreshed: bool,
    pub historical_inserted: u64,
    pub historical_skipped: u64,
    /// Sub-refreshes skipped because stored data was still fresh.
    pub skipped_fresh: Vec<&'static str>,
}

/// Per-symbol results of a bulk run, in input order.
#[derive(Debug, Default)]
pub struct BulkRefreshReport {
    pub outcomes: Vec<RefreshOutcome>,
    pub failures: Vec<(String, IngestError)>,
}

pub struct RefreshOrchestrator {
    alphavantage: AlphaVantageClient,
    finnhub: FinnhubClient,
    store: MarketStore,
    cache: CacheClient,
    registry: StrategyRegistry,
    workers: usize,
    pacing: Duration,
}

impl RefreshOrchestrator {
    pub fn new(
        alphavantage: AlphaVantageClient,
        finnhub: FinnhubClient,
        store: MarketStore,
        cache: CacheClient,
    ) -> Self {
        Self {
            alphavantage,
            finnhub,
            store,
            cache,
            registry: StrategyRegistry::with_defaults(),
            workers: DEFAULT_WORKERS,
            pacing: PACING,
        }
    }

    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    /// Sequentially refresh financial metrics, technical indicators and daily
    /// historical data for one symbol. Sub-refreshes fail independently: the
    /// rest still run and persist, and the failures come back as one
    /// aggregate error naming each failed stage.
    pub async fn refresh_stock_data(
        &self,
        symbol: &str,
        cancel: &CancellationToken,
    ) -> Result<RefreshOutcome, IngestError> {
        let symbol = Company::normalize_ticker(symbol);
        let company = self.ensure_company(&symbol, cancel).await?;

        let mut outcome = RefreshOutcome {
            symbol: symbol.clone(),
            ..Default::default()
        };
        let mut failures: Vec<(String, IngestError)> = Vec::new();

        match self.refresh_financial_metrics(&company, cancel).await {
            Ok(refreshed) => {
                outcome.metrics_refreshed = refreshed;
                if !refreshed {
                    outcome.skipped_fresh.push("financial_metrics");
                }
            }
            Err(IngestError::Cancelled) => return Err(IngestError::Cancelled),
            Err(e) => failures.push(("financial metrics refresh failed".to_string(), e)),
        }

        match self.refresh_technical_indicators(&company, cancel).await {
            Ok(refreshed) => {
                outcome.technicals_refreshed = refreshed;
                if !refreshed {
                    outcome.skipped_fresh.push("technical_indicators");
                }
            }
            Err(IngestError::Cancelled) => return Err(IngestError::Cancelled),
            Err(e) => failures.push(("technical indicators refresh failed".to_string(), e)),
        }

        match self.refresh_historical_data(&company, cancel).await {
            Ok((inserted, skipped)) => {
                outcome.historical_inserted = inserted;
                outcome.historical_skipped = skipped;
            }
            Err(IngestError::Cancelled) => return Err(IngestError::Cancelled),
            Err(e) => failures.push(("historical data refresh failed".to_string(), e)),
        }

        if failures.is_empty() {
            Ok(outcome)
        } else {
            Err(IngestError::aggregate(failures))
        }
    }

    /// Fan out over symbols with a bounded worker pool and per-worker pacing.
    /// Success iff every symbol succeeded; otherwise an aggregate enumerating
    /// the failures (the report still carries successful outcomes).
    pub async fn bulk_refresh(
        self: &Arc<Self>,
        symbols: &[String],
        cancel: &CancellationToken,
    ) -> Result<BulkRefreshReport, IngestError> {
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut handles = Vec::with_capacity(symbols.len());

        for symbol in symbols {
            let orchestrator = Arc::clone(self);
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            let symbol = symbol.clone();

            handles.push(tokio::spawn(async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .expect("refresh semaphore closed");
                // Drain on cancellation: queued symbols never start.
                if cancel.is_cancelled() {
                    return (symbol, Err(IngestError::Cancelled));
                }

                let result = orchestrator.refresh_stock_data(&symbol, &cancel).await;

                // Pacing holds the permit, bounding the provider call rate to
                // workers / pacing-interval.
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(orchestrator.pacing) => {}
                }

                (symbol, result)
            }));
        }

        let mut report = BulkRefreshReport::default();
        for handle in handles {
            let (symbol, result) = handle
                .await
                .map_err(|e| IngestError::Fatal(format!("refresh worker panicked: {}", e)))?;
            match result {
                Ok(outcome) => report.outcomes.push(outcome),
                Err(e) => report.failures.push((symbol, e)),
            }
        }

        if report.failures.is_empty() {
            Ok(report)
        } else {
            tracing::warn!(
                "bulk refresh: {}/{} symbols failed",
                report.failures.len(),
                symbols.len()
            );
            Err(IngestError::aggregate(report.failures))
        }
    }

    /// Company lookup with create-on-demand: an unknown symbol gets a minimal
    /// row so dependent snapshots have an owner.
    async fn ensure_company(
        &self,
        symbol: &str,
        cancel: &CancellationToken,
    ) -> Result<Company, IngestError> {
        if let Some(company) = self.store.companies.get_by_ticker(symbol).await? {
            return Ok(company);
        }

        let placeholder = Company::new(symbol, &format!("{} (pending profile)", symbol))?;
        let (company, created) = self
            .store
            .transactions
            .execute_in_transaction(cancel, move |conn| {
                let placeholder = placeholder.clone();
                async move {
                    CompanyRepository::create_ignore_duplicates_with_tx(conn, &placeholder).await
                }
                .boxed()
            })
            .await?;
        if created {
            tracing::info!("created company {} on demand", symbol);
        }
        Ok(company)
    }

    /// Maps the overview into a metrics snapshot plus descriptive company fields.
    /// Returns false when the stored snapshot is still fresh.
    async fn refresh_financial_metrics(
        &self,
        company: &Company,
        cancel: &CancellationToken,
    ) -> Result<bool, IngestError> {
        let now = Utc::now();
        if let Some(existing) = self
            .store
            .financial_metrics
            .get_by_company(company.id)
            .await?
        {
            if !existing.is_stale(now) {
                tracing::debug!("{}: financial metrics fresh, skipping", company.ticker);
                return Ok(false);
            }
        }

        let overview = self
            .alphavantage
            .company_overview(&company.ticker, cancel)
            .await?;

        let metrics = overview_to_financial_metrics(&overview, company.id);
        match self.store.financial_metrics.upsert_for_company(&metrics).await {
            Ok(()) => {}
            Err(e) if e.is_schema_missing() => {
                tracing::warn!("financial_metrics table missing, skipping persistence: {}", e);
                return Ok(true);
            }
            Err(e) => return Err(e),
        }

        // The overview also carries descriptive company attributes.
        let mut enriched = company.clone();
        apply_overview_to_company(&overview, &mut enriched);
        if enriched.validate().is_ok() {
            self.store.companies.update(&enriched).await?;
        }

        let _ = self
            .cache
            .set_entity(EntityKind::Company, &keys::company(&enriched.ticker), &enriched)
            .await;

        Ok(true)
    }

    /// Fetch the default indicator families, merge the newest point of each
    /// into one snapshot, recompute signals and upsert.
    async fn refresh_technical_indicators(
        &self,
        company: &Company,
        cancel: &CancellationToken,
    ) -> Result<bool, IngestError> {
        let now = Utc::now();
        if let Some(existing) = self
            .store
            .technical_indicators
            .get_by_company_and_timeframe(company.id, Period::Daily)
            .await?
        {
            if !existing.is_stale(now) {
                tracing::debug!("{}: technicals fresh, skipping", company.ticker);
                return Ok(false);
            }
        }

        let mut merged = TechnicalIndicators::new(company.id, &company.ticker, Period::Daily);

        for kind in DEFAULT_INDICATORS {
            let strategy = self.registry.indicator(kind)?;
            let response = strategy
                .fetch(&self.alphavantage, &company.ticker, "daily", cancel)
                .await?;
            let rows =
                strategy.convert(&response, &company.ticker, company.id, Period::Daily)?;
            if let Some(latest) = rows
                .into_iter()
                .max_by_key(|row| row.last_updated)
            {
                merged.merge_from(&latest);
            }
        }

        match self.store.technical_indicators.upsert_snapshot(&merged).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_schema_missing() => {
                tracing::warn!(
                    "technical_indicators table missing, returning computed data unpersisted: {}",
                    e
                );
                Ok(true)
            }
            Err(e) => Err(e),
        }
    }

    /// Daily series to validated bars, inserted row by row with duplicate tolerance.
    /// A missing table stops persistence for the batch but the computed rows
    /// still count; any other row error is logged and the batch continues.
    async fn refresh_historical_data(
        &self,
        company: &Company,
        cancel: &CancellationToken,
    ) -> Result<(u64, u64), IngestError> {
        let now = Utc::now();
        if let Some(latest) = self
            .store
            .historical
            .latest_for_company(company.id, Period::Daily)
            .await?
        {
            if now - latest.updated_at
                < chrono::Duration::hours(ingest_core::HISTORICAL_STALENESS_HOURS)
            {
                tracing::debug!("{}: historicals fresh, skipping", company.ticker);
                return Ok((0, 0));
            }
        }

        let strategy = self.registry.period(Period::Daily)?;
        let response = strategy
            .fetch(&self.alphavantage, &company.ticker, cancel)
            .await?;
        let rows = strategy.convert(&response, company.id)?;

        let mut inserted = 0u64;
        let mut skipped = 0u64;
        let mut persistence_disabled = false;

        for row in &rows {
            if persistence_disabled {
                break;
            }
            match self
                .store
                .historical
                .bulk_insert_ignore_duplicates(std::slice::from_ref(row))
                .await
            {
                Ok((i, s)) => {
                    inserted += i;
                    skipped += s;
                }
                Err(e) if e.is_schema_missing() => {
                    tracing::warn!(
                        "historical_data table missing, skipping persistence for batch: {}",
                        e
                    );
                    persistence_disabled = true;
                }
                Err(e) => {
                    tracing::warn!("{} {}: row insert failed: {}", company.ticker, row.date, e);
                }
            }
        }

        Ok((inserted, skipped))
    }

    /// Quote path of the freshness gate: serve the stored snapshot while it
    /// is younger than the 5-minute window, otherwise hit the provider and
    /// write through.
    pub async fn sync_market_data(
        &self,
        symbol: &str,
        cancel: &CancellationToken,
    ) -> Result<ingest_core::MarketData, IngestError> {
        let symbol = Company::normalize_ticker(symbol);
        let now = Utc::now();

        if let Some(stored) = self.store.market_data.get_by_symbol(&symbol).await? {
            if !stored.is_stale(now) {
                return Ok(stored);
            }
        }

        let quote = self.finnhub.quote(&symbol, cancel).await?;
        let data = quote_to_market_data(&quote, &symbol)?;
        self.store.market_data.upsert_by_symbol(&data).await?;
        let _ = self
            .cache
            .set_entity(EntityKind::Generic, &keys::market_data(&symbol), &data)
            .await;
        Ok(data)
    }

    /// Profile path (24-hour window).
    pub async fn sync_company_profile(
        &self,
        symbol: &str,
        cancel: &CancellationToken,
    ) -> Result<ingest_core::CompanyProfile, IngestError> {
        let symbol = Company::normalize_ticker(symbol);
        let now = Utc::now();

        if let Some(stored) = self.store.profiles.get_by_symbol(&symbol).await? {
            if !stored.is_stale(now) {
                return Ok(stored);
            }
        }

        let payload = self.finnhub.company_profile(&symbol, cancel).await?;
        let profile = profile_to_company_profile(&payload, &symbol);
        self.store.profiles.upsert_by_symbol(&profile).await?;
        let _ = self
            .cache
            .set_entity(EntityKind::Generic, &keys::company_profile(&symbol), &profile)
            .await;
        Ok(profile)
    }

    /// Basic-financials path (24-hour window).
    pub async fn sync_basic_financials(
        &self,
        symbol: &str,
        cancel: &CancellationToken,
    ) -> Result<ingest_core::BasicFinancials, IngestError> {
        let symbol = Company::normalize_ticker(symbol);
        let now = Utc::now();

        if let Some(stored) = self.store.basic_financials.get_by_symbol(&symbol).await? {
            if !stored.is_stale(now) {
                return Ok(stored);
            }
        }

        let payload = self.finnhub.basic_financials(&symbol, cancel).await?;
        let financials = financials_to_basic(&payload, &symbol);
        self.store
            .basic_financials
            .upsert_by_symbol(&financials)
            .await?;
        let _ = self
            .cache
            .set_entity(
                EntityKind::Generic,
                &keys::basic_financials(&symbol),
                &financials,
            )
            .await;
        Ok(financials)
    }

    /// Pull the last week of news and append what is new.
    pub async fn sync_news(
        &self,
        symbol: &str,
        cancel: &CancellationToken,
    ) -> Result<(u64, u64), IngestError> {
        let symbol = Company::normalize_ticker(symbol);
        let to = Utc::now().date_naive();
        let from = to - chrono::Duration::days(NEWS_LOOKBACK_DAYS);

        let articles = self
            .finnhub
            .company_news(
                &symbol,
                &from.format("%Y-%m-%d").to_string(),
                &to.format("%Y-%m-%d").to_string(),
                cancel,
            )
            .await?;
        let items = news_to_items(&articles, &symbol);
        self.store.news.bulk_insert_ignore_duplicates(&items).await
    }

    /// Earnings calendar passthrough; computed, not persisted.
    pub async fn fetch_earnings(
        &self,
        symbol: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<EarningsQuarter>, IngestError> {
        let symbol = Company::normalize_ticker(symbol);
        let response = self.alphavantage.earnings(&symbol, cancel).await?;
        Ok(earnings_to_quarters(&response))
    }

    /// One health probe per dependency, each reported independently.
    pub async fn health_check(
        &self,
        cancel: &CancellationToken,
    ) -> Vec<(&'static str, Result<(), IngestError>)> {
        vec![
            (
                "alphavantage",
                self.alphavantage.health_check(cancel).await,
            ),
            ("finnhub", self.finnhub.health_check(cancel).await),
            ("cache", self.cache.ping().await),
            (
                "database",
                sqlx_ping(self.store.db.pool()).await,
            ),
        ]
    }
}

async fn sqlx_ping(pool: &sqlx::SqlitePool) -> Result<(), IngestError> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}
