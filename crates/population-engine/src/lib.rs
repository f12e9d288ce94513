//! Paginated population engine: pulls rating-event pages from a
//! [`StockDataProvider`], resolves Company/Brokerage dimensions with
//! conflict-tolerant upserts, and bulk-inserts rating facts: one
//! transaction per page, dimensions strictly before facts.

use std::collections::HashMap;
use std::time::Duration;

use futures_util::FutureExt;
use ingest_core::{
    Brokerage, Company, IngestError, RatingEvent, StockDataProvider, StockRating,
};
use market_adapters::parse::parse_optional_f64;
use market_cache::{keys, CacheClient, EntityKind};
use market_store::{
    BrokerageRepository, CompanyRepository, HealthStatus, MarketStore, StockRatingRepository,
};
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[cfg(test)]
mod engine_tests;

const RATING_SOURCE: &str = "ratings-feed";
const TX_ATTEMPTS: u32 = 3;
/// How many error strings the result retains.
const ERROR_CAP: usize = 20;

/// Preset shapes for a population run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopulationMode {
    Quick,
    Full,
    Incremental,
}

#[derive(Debug, Clone)]
pub struct PopulationConfig {
    pub batch_size: usize,
    pub max_pages: u32,
    pub delay_between: Duration,
    pub clear_first: bool,
    pub use_cache: bool,
    pub dry_run: bool,
    pub validate_after: bool,
}

impl PopulationConfig {
    pub fn for_mode(mode: PopulationMode) -> Self {
        let (max_pages, batch_size) = match mode {
            PopulationMode::Quick => (3, 100),
            PopulationMode::Full => (50, 500),
            PopulationMode::Incremental => (5, 100),
        };
        Self {
            batch_size,
            max_pages,
            delay_between: Duration::from_millis(500),
            clear_first: false,
            use_cache: true,
            dry_run: false,
            validate_after: false,
        }
    }

    pub fn pages(mut self, pages: u32) -> Self {
        self.max_pages = pages.clamp(1, 50);
        self
    }

    pub fn batch(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.clamp(10, 1000);
        self
    }

    pub fn validate(&self) -> Result<(), IngestError> {
        if !(1..=50).contains(&self.max_pages) {
            return Err(IngestError::Validation(format!(
                "max_pages must be 1-50, got {}",
                self.max_pages
            )));
        }
        if !(10..=1000).contains(&self.batch_size) {
            return Err(IngestError::Validation(format!(
                "batch_size must be 10-1000, got {}",
                self.batch_size
            )));
        }
        Ok(())
    }
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self::for_mode(PopulationMode::Quick)
    }
}

/// Tally of one population run.
#[derive(Debug, Clone, Default)]
pub struct PopulationResult {
    pub pages_requested: u32,
    pub pages_with_data: u32,
    pub items_seen: u64,
    pub items_processed: u64,
    pub items_skipped: u64,
    pub error_count: u64,
    pub companies_created: u64,
    pub companies_skipped: u64,
    pub brokerages_created: u64,
    pub brokerages_skipped: u64,
    pub ratings_inserted: u64,
    pub ratings_skipped: u64,
    pub duration: Duration,
    pub errors: Vec<String>,
}

impl PopulationResult {
    fn record_error(&mut self, message: String) {
        self.error_count += 1;
        if self.errors.len() < ERROR_CAP {
            self.errors.push(message);
        }
    }
}

/// Counts coming back from one page transaction.
#[derive(Debug, Clone, Default)]
struct PageOutcome {
    companies_created: u64,
    companies_skipped: u64,
    brokerages_created: u64,
    brokerages_skipped: u64,
    ratings_inserted: u64,
    ratings_skipped: u64,
    created_companies: Vec<Company>,
    created_brokerages: Vec<Brokerage>,
}

pub struct PopulationEngine {
    provider: Arc<dyn StockDataProvider>,
    store: MarketStore,
    cache: CacheClient,
}

impl PopulationEngine {
    pub fn new(provider: Arc<dyn StockDataProvider>, store: MarketStore, cache: CacheClient) -> Self {
        Self {
            provider,
            store,
            cache,
        }
    }

    pub async fn run(
        &self,
        config: &PopulationConfig,
        cancel: &CancellationToken,
    ) -> Result<PopulationResult, IngestError> {
        config.validate()?;
        let started = Instant::now();
        let mut result = PopulationResult::default();

        if config.clear_first && !config.dry_run {
            // Truncation is best-effort; the cache clear is the guaranteed part.
            if let Err(e) = self.store.db.clear_fact_tables().await {
                tracing::warn!("clear_first: fact truncation failed: {}", e);
                result.record_error(format!("clear: {}", e));
            }
            self.cache.clear().await?;
        }

        let mut next_token: Option<String> = None;

        for page_num in 1..=config.max_pages {
            if cancel.is_cancelled() {
                return Err(IngestError::Cancelled);
            }

            let page = self
                .provider
                .fetch_page(next_token.as_deref(), cancel)
                .await?;
            result.pages_requested += 1;

            if page.items.is_empty() {
                tracing::info!("page {}: empty, stopping", page_num);
                break;
            }
            result.pages_with_data += 1;
            result.items_seen += page.items.len() as u64;

            if config.dry_run {
                result.items_processed += page.items.len() as u64;
            } else {
                for chunk in page.items.chunks(config.batch_size) {
                    self.process_batch(chunk, config.use_cache, &mut result, cancel)
                        .await?;
                }
            }

            next_token = page.next_page.clone();
            let more_pages = page.has_more && page_num < config.max_pages;
            if !more_pages {
                break;
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(IngestError::Cancelled),
                _ = tokio::time::sleep(config.delay_between) => {}
            }
        }

        result.duration = started.elapsed();
        tracing::info!(
            "population: pages={} seen={} processed={} skipped={} errors={} in {:?}",
            result.pages_requested,
            result.items_seen,
            result.items_processed,
            result.items_skipped,
            result.error_count,
            result.duration
        );

        if config.validate_after && !config.dry_run {
            self.validate_and_repair(&mut result).await?;
        }

        Ok(result)
    }

    /// One transactional batch: dimensions first, facts second, all-or-nothing.
    async fn process_batch(
        &self,
        items: &[RatingEvent],
        use_cache: bool,
        result: &mut PopulationResult,
        cancel: &CancellationToken,
    ) -> Result<(), IngestError> {
        // Per-item isolation: malformed items are counted and dropped here,
        // never allowed to abort the batch.
        let mut valid: Vec<&RatingEvent> = Vec::with_capacity(items.len());
        for item in items {
            let ticker_len = item.ticker.trim().len();
            let company_len = item.company_name.trim().len();
            let brokerage_len = item.brokerage_name.trim().len();
            if !(1..=10).contains(&ticker_len)
                || !(2..=200).contains(&company_len)
                || !(2..=100).contains(&brokerage_len)
                || item.action.trim().is_empty()
            {
                result.items_skipped += 1;
                result.record_error(format!(
                    "invalid item skipped (ticker={:?}, brokerage={:?})",
                    item.ticker, item.brokerage_name
                ));
                continue;
            }
            valid.push(item);
        }
        if valid.is_empty() {
            return Ok(());
        }

        let events: Vec<RatingEvent> = valid.into_iter().cloned().collect();
        let outcome = self
            .store
            .transactions
            .execute_with_retry(TX_ATTEMPTS, cancel, move |conn| {
                let events = events.clone();
                async move {
                    let mut outcome = PageOutcome::default();

                    // Dimensions happen-before facts, inside the same
                    // transaction. First occurrence wins the name.
                    let mut companies: HashMap<String, Company> = HashMap::new();
                    for event in &events {
                        let ticker = Company::normalize_ticker(&event.ticker);
                        if companies.contains_key(&ticker) {
                            continue;
                        }
                        let candidate = Company::new(&event.ticker, &event.company_name)?;
                        let (canonical, created) =
                            CompanyRepository::create_ignore_duplicates_with_tx(conn, &candidate)
                                .await?;
                        if created {
                            outcome.companies_created += 1;
                            outcome.created_companies.push(canonical.clone());
                        } else {
                            outcome.companies_skipped += 1;
                        }
                        companies.insert(ticker, canonical);
                    }

                    let mut brokerages: HashMap<String, Brokerage> = HashMap::new();
                    for event in &events {
                        let name = event.brokerage_name.trim().to_string();
                        if brokerages.contains_key(&name) {
                            continue;
                        }
                        let candidate = Brokerage::new(&name)?;
                        let (canonical, created) =
                            BrokerageRepository::create_ignore_duplicates_with_tx(conn, &candidate)
                                .await?;
                        if created {
                            outcome.brokerages_created += 1;
                            outcome.created_brokerages.push(canonical.clone());
                        } else {
                            outcome.brokerages_skipped += 1;
                        }
                        brokerages.insert(name, canonical);
                    }

                    // Rebuild item -> ids from the canonical rows so the fact
                    // rows reference whatever actually exists.
                    let mut ratings = Vec::with_capacity(events.len());
                    for event in &events {
                        let ticker = Company::normalize_ticker(&event.ticker);
                        let company = companies.get(&ticker).ok_or_else(|| {
                            IngestError::Database(format!("no canonical company for {}", ticker))
                        })?;
                        let brokerage =
                            brokerages.get(event.brokerage_name.trim()).ok_or_else(|| {
                                IngestError::Database(format!(
                                    "no canonical brokerage for {}",
                                    event.brokerage_name
                                ))
                            })?;

                        let mut rating = StockRating::new(
                            company.id,
                            brokerage.id,
                            &event.action,
                            event.event_time,
                            RATING_SOURCE,
                        )?;
                        rating.rating_from = event.rating_from.clone();
                        rating.rating_to = event.rating_to.clone();
                        rating.target_from =
                            event.target_from.as_deref().and_then(parse_optional_f64);
                        rating.target_to =
                            event.target_to.as_deref().and_then(parse_optional_f64);
                        rating.raw_payload = serde_json::to_string(event).ok();
                        ratings.push(rating);
                    }

                    let (inserted, skipped) =
                        StockRatingRepository::bulk_insert_ignore_duplicates_with_tx(
                            conn, &ratings,
                        )
                        .await?;
                    outcome.ratings_inserted = inserted;
                    outcome.ratings_skipped = skipped;

                    Ok(outcome)
                }
                .boxed()
            })
            .await?;

        result.companies_created += outcome.companies_created;
        result.companies_skipped += outcome.companies_skipped;
        result.brokerages_created += outcome.brokerages_created;
        result.brokerages_skipped += outcome.brokerages_skipped;
        result.ratings_inserted += outcome.ratings_inserted;
        result.ratings_skipped += outcome.ratings_skipped;
        result.items_processed += outcome.ratings_inserted;
        result.items_skipped += outcome.ratings_skipped;

        if !use_cache {
            return Ok(());
        }

        // Advisory write-through; the cache never fails a population run.
        for company in &outcome.created_companies {
            let _ = self
                .cache
                .set_entity(EntityKind::Company, &keys::company(&company.ticker), company)
                .await;
        }
        for brokerage in &outcome.created_brokerages {
            let _ = self
                .cache
                .set_entity(
                    EntityKind::Brokerage,
                    &keys::brokerage(&brokerage.name),
                    brokerage,
                )
                .await;
        }

        Ok(())
    }

    async fn validate_and_repair(&self, result: &mut PopulationResult) -> Result<(), IngestError> {
        let report = self.store.integrity.validate_full_integrity().await?;
        if report.overall_status == HealthStatus::Healthy {
            return Ok(());
        }

        let summary = self.store.integrity.repair_minor_issues(false).await?;
        tracing::info!(
            "post-load repair: orphans={} duplicates={}",
            summary.orphans_removed,
            summary.duplicates_removed
        );

        let after = self.store.integrity.validate_full_integrity().await?;
        if after.overall_status == HealthStatus::Critical {
            result.record_error(format!(
                "integrity still critical after repair ({} critical issues)",
                after.critical_issues
            ));
            return Err(IngestError::Database(format!(
                "integrity critical after repair: {} critical issues",
                after.critical_issues
            )));
        }
        Ok(())
    }
}
