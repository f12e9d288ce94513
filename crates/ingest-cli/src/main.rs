//! ingest: operational entry point for the ingestion platform.
//!
//! Usage:
//!   ingest populate [--mode quick|full|incremental] [--pages N] [--batch N]
//!                   [--dry-run] [--clear-first] [--validate] [--no-cache]
//!   ingest refresh --symbols AAPL MSFT ...
//!   ingest validate [--repair [--dry-run]]
//!   ingest status

use std::sync::Arc;

use alphavantage_client::AlphaVantageClient;
use finnhub_client::FinnhubClient;
use ingest_core::AppConfig;
use market_cache::CacheClient;
use market_store::{HealthStatus, MarketDb, MarketStore};
use population_engine::{PopulationConfig, PopulationEngine, PopulationMode};
use ratings_client::RatingsApiClient;
use refresh_orchestrator::RefreshOrchestrator;
use tokio_util::sync::CancellationToken;

fn usage() -> ! {
    eprintln!("Usage:");
    eprintln!("  ingest populate [--mode quick|full|incremental] [--pages N] [--batch N]");
    eprintln!("                  [--dry-run] [--clear-first] [--validate] [--no-cache]");
    eprintln!("  ingest refresh --symbols AAPL MSFT ...");
    eprintln!("  ingest validate [--repair [--dry-run]]");
    eprintln!("  ingest status");
    std::process::exit(1);
}

fn flag(args: &[String], name: &str) -> bool {
    args.iter().any(|a| a == name)
}

fn value_of<T: std::str::FromStr>(args: &[String], name: &str) -> Option<T> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .and_then(|v| v.parse().ok())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ingest=info,population_engine=info,refresh_orchestrator=info".into()),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = args.first().map(String::as_str).unwrap_or("");

    let config = AppConfig::from_env().map_err(|e| anyhow::anyhow!("{}", e))?;

    let db = MarketDb::connect(&config.database_url)
        .await
        .map_err(|e| anyhow::anyhow!("{}", e))?;
    let store = MarketStore::new(db);
    let cache = CacheClient::connect(config.redis_url.as_deref()).await;

    // Ctrl-C flips the token; every in-flight call drains or aborts.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, cancelling");
                cancel.cancel();
            }
        });
    }

    match command {
        "populate" => {
            let mode = match value_of::<String>(&args, "--mode").as_deref() {
                Some("full") => PopulationMode::Full,
                Some("incremental") => PopulationMode::Incremental,
                Some("quick") | None => PopulationMode::Quick,
                Some(other) => {
                    eprintln!("unknown mode {:?}", other);
                    usage();
                }
            };

            let mut population = PopulationConfig::for_mode(mode);
            if let Some(pages) = value_of::<u32>(&args, "--pages") {
                population = population.pages(pages);
            }
            if let Some(batch) = value_of::<usize>(&args, "--batch") {
                population = population.batch(batch);
            }
            population.dry_run = flag(&args, "--dry-run");
            population.clear_first = flag(&args, "--clear-first");
            population.validate_after = flag(&args, "--validate");
            if flag(&args, "--no-cache") {
                population.use_cache = false;
            }

            let provider = Arc::new(RatingsApiClient::new(
                config.ratings.api_key.clone(),
                config
                    .ratings
                    .base_url
                    .clone()
                    .unwrap_or_else(|| "https://api.ratings.example.com".to_string()),
            ));
            let engine = PopulationEngine::new(provider, store, cache);

            let result = engine
                .run(&population, &cancel)
                .await
                .map_err(|e| anyhow::anyhow!("{}", e))?;

            tracing::info!(
                "populate done: pages={}/{} items={} processed={} skipped={} \
                 companies=+{} brokerages=+{} ratings=+{} errors={} in {:?}",
                result.pages_with_data,
                result.pages_requested,
                result.items_seen,
                result.items_processed,
                result.items_skipped,
                result.companies_created,
                result.brokerages_created,
                result.ratings_inserted,
                result.error_count,
                result.duration,
            );
            for error in &result.errors {
                tracing::warn!("  {}", error);
            }
        }

        "refresh" => {
            let symbols: Vec<String> = match args.iter().position(|a| a == "--symbols") {
                Some(idx) => args[idx + 1..]
                    .iter()
                    .take_while(|a| !a.starts_with("--"))
                    .cloned()
                    .collect(),
                None => usage(),
            };
            if symbols.is_empty() {
                usage();
            }

            let alphavantage = AlphaVantageClient::new(
                config.alphavantage.api_key.clone(),
                config.alphavantage.base_url.clone(),
            );
            let finnhub = FinnhubClient::new(
                config.finnhub.api_key.clone(),
                config.finnhub.base_url.clone(),
            );
            let orchestrator = Arc::new(RefreshOrchestrator::new(
                alphavantage,
                finnhub,
                store,
                cache,
            ));

            match orchestrator.bulk_refresh(&symbols, &cancel).await {
                Ok(report) => {
                    for outcome in &report.outcomes {
                        tracing::info!(
                            "{}: metrics={} technicals={} bars=+{} (skipped {})",
                            outcome.symbol,
                            outcome.metrics_refreshed,
                            outcome.technicals_refreshed,
                            outcome.historical_inserted,
                            outcome.historical_skipped,
                        );
                    }
                }
                Err(e) => {
                    tracing::error!("bulk refresh failed: {}", e);
                    std::process::exit(2);
                }
            }
        }

        "validate" => {
            let report = store
                .integrity
                .validate_full_integrity()
                .await
                .map_err(|e| anyhow::anyhow!("{}", e))?;
            tracing::info!(
                "integrity: {} ({} issues, {} critical; processed={} unprocessed={})",
                report.overall_status.as_str(),
                report.total_issues,
                report.critical_issues,
                report.processed_count,
                report.unprocessed_count,
            );
            for (kind, count) in &report.issues_by_kind {
                if *count > 0 {
                    tracing::info!("  {}: {}", kind.as_str(), count);
                }
            }

            if flag(&args, "--repair") {
                let dry_run = flag(&args, "--dry-run");
                let summary = store
                    .integrity
                    .repair_minor_issues(dry_run)
                    .await
                    .map_err(|e| anyhow::anyhow!("{}", e))?;
                tracing::info!(
                    "repair{}: orphans={} duplicates={}",
                    if dry_run { " (dry run)" } else { "" },
                    summary.orphans_removed,
                    summary.duplicates_removed,
                );

                if !dry_run {
                    let after = store
                        .integrity
                        .validate_full_integrity()
                        .await
                        .map_err(|e| anyhow::anyhow!("{}", e))?;
                    if after.overall_status == HealthStatus::Critical {
                        tracing::error!("integrity still critical after repair");
                        std::process::exit(2);
                    }
                }
            }
        }

        "status" => {
            let alphavantage = AlphaVantageClient::new(
                config.alphavantage.api_key.clone(),
                config.alphavantage.base_url.clone(),
            );
            let finnhub = FinnhubClient::new(
                config.finnhub.api_key.clone(),
                config.finnhub.base_url.clone(),
            );
            let orchestrator =
                RefreshOrchestrator::new(alphavantage, finnhub, store, cache.clone());

            for (name, result) in orchestrator.health_check(&cancel).await {
                match result {
                    Ok(()) => tracing::info!("{}: ok", name),
                    Err(e) => tracing::warn!("{}: {}", name, e),
                }
            }
            let stats = cache.stats();
            tracing::info!(
                "cache[{}]: hits={} misses={} errors={}",
                stats.backend,
                stats.hits,
                stats.misses,
                stats.errors,
            );
        }

        _ => usage(),
    }

    Ok(())
}
