//! Persistence layer: sqlx/SQLite repositories for every entity, the
//! transaction service, and the integrity/repair subsystem.

mod brokerage;
mod company;
mod db;
mod financial_metrics;
mod historical;
mod integrity;
mod rating;
mod snapshots;
mod technical_indicators;
mod transaction;

#[cfg(test)]
mod store_tests;

pub use brokerage::BrokerageRepository;
pub use company::CompanyRepository;
pub use db::MarketDb;
pub use financial_metrics::FinancialMetricsRepository;
pub use historical::HistoricalDataRepository;
pub use integrity::{
    DuplicateKeep, HealthStatus, IntegrityReport, IntegrityService, IssueKind, RepairSummary,
};
pub use rating::{RatingWithRelations, StockRatingRepository};
pub use snapshots::{
    BasicFinancialsRepository, CompanyProfileRepository, MarketDataRepository, NewsRepository,
};
pub use technical_indicators::TechnicalIndicatorsRepository;
pub use transaction::TransactionService;

/// Convenience bundle wiring every repository to one pool.
#[derive(Clone)]
pub struct MarketStore {
    pub db: MarketDb,
    pub companies: CompanyRepository,
    pub brokerages: BrokerageRepository,
    pub ratings: StockRatingRepository,
    pub financial_metrics: FinancialMetricsRepository,
    pub technical_indicators: TechnicalIndicatorsRepository,
    pub historical: HistoricalDataRepository,
    pub market_data: MarketDataRepository,
    pub profiles: CompanyProfileRepository,
    pub news: NewsRepository,
    pub basic_financials: BasicFinancialsRepository,
    pub transactions: TransactionService,
    pub integrity: IntegrityService,
}

impl MarketStore {
    pub fn new(db: MarketDb) -> Self {
        let pool = db.pool().clone();
        Self {
            companies: CompanyRepository::new(pool.clone()),
            brokerages: BrokerageRepository::new(pool.clone()),
            ratings: StockRatingRepository::new(pool.clone()),
            financial_metrics: FinancialMetricsRepository::new(pool.clone()),
            technical_indicators: TechnicalIndicatorsRepository::new(pool.clone()),
            historical: HistoricalDataRepository::new(pool.clone()),
            market_data: MarketDataRepository::new(pool.clone()),
            profiles: CompanyProfileRepository::new(pool.clone()),
            news: NewsRepository::new(pool.clone()),
            basic_financials: BasicFinancialsRepository::new(pool.clone()),
            transactions: TransactionService::new(pool.clone()),
            integrity: IntegrityService::new(pool),
            db,
        }
    }
}
