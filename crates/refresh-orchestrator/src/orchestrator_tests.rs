#[cfg(test)]
mod tests {
    use crate::RefreshOrchestrator;
    use alphavantage_client::AlphaVantageClient;
    use chrono::Utc;
    use finnhub_client::FinnhubClient;
    use ingest_core::MarketData;
    use market_cache::CacheClient;
    use market_store::{MarketDb, MarketStore};
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;
    use uuid::Uuid;

    /// Clients pointed at a closed local port: any attempted provider call
    /// fails fast with a connection error instead of leaving the machine.
    async fn offline_orchestrator() -> (Arc<RefreshOrchestrator>, MarketStore) {
        let db = MarketDb::connect("sqlite::memory:").await.unwrap();
        let store = MarketStore::new(db);
        let orchestrator = RefreshOrchestrator::new(
            AlphaVantageClient::new(
                "test-key".to_string(),
                Some("http://127.0.0.1:9/query".to_string()),
            ),
            FinnhubClient::new(
                "test-key".to_string(),
                Some("http://127.0.0.1:9".to_string()),
            ),
            store.clone(),
            CacheClient::in_memory(),
        );
        (Arc::new(orchestrator), store)
    }

    fn quote_row(symbol: &str, age: chrono::Duration) -> MarketData {
        let now = Utc::now();
        MarketData {
            id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            price: 190.0,
            change: 1.0,
            change_percent: 0.5,
            open: None,
            high: None,
            low: None,
            previous_close: None,
            volume: None,
            market_timestamp: now - age,
            data_source: "finnhub".to_string(),
            last_updated: now - age,
            created_at: now - age,
            updated_at: now - age,
        }
    }

    #[tokio::test]
    async fn fresh_quote_short_circuits_the_provider() {
        let (orchestrator, store) = offline_orchestrator().await;
        let cancel = CancellationToken::new();

        store
            .market_data
            .upsert_by_symbol(&quote_row("AAPL", chrono::Duration::minutes(2)))
            .await
            .unwrap();

        // The provider is unreachable, so success proves no call was made.
        let data = orchestrator.sync_market_data("aapl", &cancel).await.unwrap();
        assert_eq!(data.symbol, "AAPL");
        assert_eq!(data.price, 190.0);
    }

    #[tokio::test]
    async fn stale_quote_opens_the_gate() {
        let (orchestrator, store) = offline_orchestrator().await;
        let cancel = CancellationToken::new();

        store
            .market_data
            .upsert_by_symbol(&quote_row("AAPL", chrono::Duration::minutes(30)))
            .await
            .unwrap();

        // Stale snapshot forces a remote fetch, which fails against the
        // closed port; the error proves the gate opened.
        let err = orchestrator
            .sync_market_data("AAPL", &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err.category(), "transient" | "provider"));
    }

    #[tokio::test]
    async fn cancelled_bulk_refresh_drains_without_provider_calls() {
        let (orchestrator, _store) = offline_orchestrator().await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let symbols = vec!["AAPL".to_string(), "MSFT".to_string(), "GOOG".to_string()];
        let started = std::time::Instant::now();
        let err = orchestrator
            .bulk_refresh(&symbols, &cancel)
            .await
            .unwrap_err();

        assert_eq!(err.category(), "aggregate");
        assert!(err.to_string().contains("cancelled"));
        // Drain promptly: nothing waits on pacing timers or retries.
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
    }

    #[tokio::test]
    async fn earnings_path_surfaces_provider_errors_with_context() {
        let (orchestrator, _store) = offline_orchestrator().await;
        let cancel = CancellationToken::new();

        let err = orchestrator
            .fetch_earnings("AAPL", &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err.category(), "transient" | "provider"));
    }
}
