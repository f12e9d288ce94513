#[cfg(test)]
mod tests {
    use crate::{PopulationConfig, PopulationEngine, PopulationMode};
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, Utc};
    use ingest_core::{IngestError, RatingEvent, RatingsPage, StockDataProvider};
    use market_cache::CacheClient;
    use market_store::{MarketDb, MarketStore};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    /// Scripted in-process provider: token "0" returns pages[0], and so on.
    struct ScriptedProvider {
        pages: Vec<Vec<RatingEvent>>,
        calls: AtomicU32,
    }

    impl ScriptedProvider {
        fn new(pages: Vec<Vec<RatingEvent>>) -> Arc<Self> {
            Arc::new(Self {
                pages,
                calls: AtomicU32::new(0),
            })
        }

        fn call_count(&self) -> u32 {
            self.calls.load(Ordering::Relaxed)
        }
    }

    #[async_trait]
    impl StockDataProvider for ScriptedProvider {
        async fn fetch_page(
            &self,
            next_token: Option<&str>,
            _cancel: &CancellationToken,
        ) -> Result<RatingsPage, IngestError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            let index: usize = next_token.map(|t| t.parse().unwrap_or(0)).unwrap_or(0);
            let items = self.pages.get(index).cloned().unwrap_or_default();
            let has_more = index + 1 < self.pages.len();
            Ok(RatingsPage {
                items,
                next_page: has_more.then(|| (index + 1).to_string()),
                has_more,
            })
        }
    }

    fn event(ticker: &str, company: &str, brokerage: &str, hours_ago: i64) -> RatingEvent {
        RatingEvent {
            ticker: ticker.to_string(),
            company_name: company.to_string(),
            brokerage_name: brokerage.to_string(),
            action: "Upgraded By".to_string(),
            rating_from: Some("Hold".to_string()),
            rating_to: Some("Buy".to_string()),
            target_from: Some("$100.00".to_string()),
            target_to: Some("$1,250.00".to_string()),
            event_time: Utc::now() - ChronoDuration::hours(hours_ago),
        }
    }

    fn two_pages() -> Vec<Vec<RatingEvent>> {
        vec![
            vec![
                event("aapl", "Apple Inc.", "Goldman Sachs", 1),
                event("MSFT", "Microsoft Corporation", "Morgan Stanley", 2),
                event("GOOG", "Alphabet Inc.", "JP Morgan", 3),
            ],
            vec![
                // Overlapping company and brokerage, fresh event times.
                event("AAPL", "Apple Inc.", "Morgan Stanley", 4),
                event("NVDA", "NVIDIA Corporation", "Goldman Sachs", 5),
                event("TSLA", "Tesla Inc.", "Barclays", 6),
            ],
        ]
    }

    async fn engine_with(pages: Vec<Vec<RatingEvent>>) -> (PopulationEngine, MarketStore, Arc<ScriptedProvider>) {
        let db = MarketDb::connect("sqlite::memory:").await.unwrap();
        let store = MarketStore::new(db);
        let provider = ScriptedProvider::new(pages);
        let engine = PopulationEngine::new(
            provider.clone(),
            store.clone(),
            CacheClient::in_memory(),
        );
        (engine, store, provider)
    }

    fn quick_config() -> PopulationConfig {
        let mut config = PopulationConfig::for_mode(PopulationMode::Quick);
        config.delay_between = std::time::Duration::from_millis(1);
        config
    }

    #[tokio::test]
    async fn fresh_two_page_run_populates_everything() {
        let (engine, store, _provider) = engine_with(two_pages()).await;
        let cancel = CancellationToken::new();

        let result = engine.run(&quick_config(), &cancel).await.unwrap();

        assert_eq!(result.pages_requested, 2);
        assert_eq!(result.pages_with_data, 2);
        assert_eq!(result.items_seen, 6);
        assert_eq!(result.items_processed, 6);
        assert_eq!(result.items_skipped, 0);
        assert_eq!(result.error_count, 0);
        assert_eq!(result.ratings_inserted, 6);
        // 5 unique tickers, AAPL repeats across pages.
        assert_eq!(result.companies_created, 5);
        assert_eq!(result.companies_skipped, 1);
        // 4 unique brokerages.
        assert_eq!(result.brokerages_created, 4);

        assert_eq!(store.ratings.count().await.unwrap(), 6);
        assert_eq!(store.companies.count().await.unwrap(), 5);
        assert_eq!(store.brokerages.count().await.unwrap(), 4);

        // Normalization invariant: stored tickers are upper(trim(..)).
        let apple = store.companies.get_by_ticker("AAPL").await.unwrap().unwrap();
        assert_eq!(apple.ticker, "AAPL");
        // Target prices parsed out of display strings.
        let ratings = store.ratings.list_by_company(apple.id, 10).await.unwrap();
        assert!(ratings.iter().all(|r| r.target_to == Some(1250.0)));
        assert!(ratings.iter().all(|r| r.action == "upgraded by"));
    }

    #[tokio::test]
    async fn replay_is_idempotent() {
        let (engine, store, _provider) = engine_with(two_pages()).await;
        let cancel = CancellationToken::new();

        engine.run(&quick_config(), &cancel).await.unwrap();
        let replay = engine.run(&quick_config(), &cancel).await.unwrap();

        assert_eq!(replay.items_seen, 6);
        assert_eq!(replay.items_processed, 0);
        assert_eq!(replay.items_skipped, 6);
        assert_eq!(replay.ratings_inserted, 0);
        assert_eq!(replay.ratings_skipped, 6);
        assert_eq!(replay.companies_created, 0);

        // Row counts unchanged by the second run.
        assert_eq!(store.ratings.count().await.unwrap(), 6);
        assert_eq!(store.companies.count().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn dry_run_counts_without_writing() {
        let items: Vec<RatingEvent> = (0..50)
            .map(|i| {
                event(
                    &format!("T{:03}", i),
                    &format!("Company {:03}", i),
                    "Goldman Sachs",
                    i,
                )
            })
            .collect();
        let (engine, store, _provider) = engine_with(vec![items]).await;
        let cancel = CancellationToken::new();

        let mut config = quick_config();
        config.dry_run = true;

        let result = engine.run(&config, &cancel).await.unwrap();
        assert_eq!(result.items_seen, 50);
        assert_eq!(result.items_processed, 50);
        assert_eq!(result.ratings_inserted, 0);
        assert_eq!(store.ratings.count().await.unwrap(), 0);
        assert_eq!(store.companies.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn bad_item_is_skipped_without_sinking_the_batch() {
        let mut items = vec![
            event("AAPL", "Apple Inc.", "Goldman Sachs", 1),
            event("MSFT", "Microsoft Corporation", "Morgan Stanley", 2),
        ];
        items.push(event("", "No Ticker Corp", "Goldman Sachs", 3));
        items.push(event("LONGTICKER123", "Too Long Corp", "Goldman Sachs", 4));

        let (engine, store, _provider) = engine_with(vec![items]).await;
        let cancel = CancellationToken::new();

        let result = engine.run(&quick_config(), &cancel).await.unwrap();
        assert_eq!(result.items_seen, 4);
        assert_eq!(result.items_processed, 2);
        assert_eq!(result.items_skipped, 2);
        assert_eq!(result.error_count, 2);
        assert!(!result.errors.is_empty());
        assert_eq!(store.ratings.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn max_pages_caps_fetching() {
        let pages = (0..10)
            .map(|p| vec![event(&format!("TK{}", p), "Some Company", "Goldman Sachs", p)])
            .collect();
        let (engine, _store, provider) = engine_with(pages).await;
        let cancel = CancellationToken::new();

        let config = quick_config().pages(2);
        let result = engine.run(&config, &cancel).await.unwrap();
        assert_eq!(result.pages_requested, 2);
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn pre_cancelled_run_returns_cancelled() {
        let (engine, _store, provider) = engine_with(two_pages()).await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = engine.run(&quick_config(), &cancel).await.unwrap_err();
        assert_eq!(err.category(), "cancelled");
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn validate_after_passes_on_healthy_load() {
        let (engine, _store, _provider) = engine_with(two_pages()).await;
        let cancel = CancellationToken::new();

        let mut config = quick_config();
        config.validate_after = true;
        let result = engine.run(&config, &cancel).await.unwrap();
        assert_eq!(result.error_count, 0);
    }

    #[tokio::test]
    async fn clear_first_truncates_facts_and_keeps_dimensions() {
        let (engine, store, _provider) = engine_with(two_pages()).await;
        let cancel = CancellationToken::new();

        engine.run(&quick_config(), &cancel).await.unwrap();
        assert_eq!(store.ratings.count().await.unwrap(), 6);

        let mut config = quick_config();
        config.clear_first = true;
        let result = engine.run(&config, &cancel).await.unwrap();

        // Facts were wiped, then reloaded fresh; dimensions survived.
        assert_eq!(result.ratings_inserted, 6);
        assert_eq!(result.companies_created, 0);
        assert_eq!(result.companies_skipped, 6);
        assert_eq!(store.ratings.count().await.unwrap(), 6);
        assert_eq!(store.companies.count().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn config_bounds_are_enforced() {
        assert!(PopulationConfig::default().validate().is_ok());
        let config = PopulationConfig {
            max_pages: 0,
            ..PopulationConfig::default()
        };
        assert!(config.validate().is_err());
        let config = PopulationConfig {
            batch_size: 5,
            ..PopulationConfig::default()
        };
        assert!(config.validate().is_err());

        // Builder-style overrides clamp instead of failing.
        assert_eq!(PopulationConfig::default().pages(99).max_pages, 50);
        assert_eq!(PopulationConfig::default().batch(1).batch_size, 10);
    }
}
