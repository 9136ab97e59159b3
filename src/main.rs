//! swing_bot entry point
//!
//! Orchestrates:
//! 1. Env + logging initialization
//! 2. Configuration loading and validation (fatal if invalid)
//! 3. Trade ledger replay and position hydration (fatal if corrupt)
//! 4. Gateway construction from environment credentials
//! 5. Scheduler tick loop
//! 6. Ctrl+C graceful shutdown at a tick boundary

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::broadcast;
use tracing::info;

use swing_bot::config::{init_logging, load_config};
use swing_bot::core::{Heartbeat, Scheduler};
use swing_bot::executor::OrderExecutor;
use swing_bot::gateway::{MarketDataGateway, RestExchange, RestMarketData};
use swing_bot::ledger::TradeLedger;
use swing_bot::market::{CacheStore, HistoricalStore};

/// Environment variable for the market data endpoint
const MARKET_DATA_URL_ENV: &str = "MARKET_DATA_URL";
/// Environment variable for the exchange endpoint
const EXCHANGE_URL_ENV: &str = "EXCHANGE_URL";
/// Environment variable overriding the config file location
const CONFIG_PATH_ENV: &str = "CONFIG_PATH";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_logging();

    info!("=== swing_bot starting ===");

    // Configuration: any violation is fatal before the first tick
    let config_path =
        std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "config.yaml".to_string());
    let config = load_config(std::path::Path::new(&config_path))
        .with_context(|| format!("loading configuration from {config_path}"))?;

    // Ledger first: refuse to trade with an unverifiable position
    let ledger = TradeLedger::open(&config.data.ledger_path)
        .context("opening trade ledger")?;
    let heartbeat = Heartbeat::new(&config.data.heartbeat_path);

    // Gateways from environment
    let market_data_url = std::env::var(MARKET_DATA_URL_ENV)
        .with_context(|| format!("{MARKET_DATA_URL_ENV} not set"))?;
    let exchange_url = std::env::var(EXCHANGE_URL_ENV)
        .with_context(|| format!("{EXCHANGE_URL_ENV} not set"))?;
    let market_data: Arc<dyn MarketDataGateway> = Arc::new(RestMarketData::new(market_data_url));
    let exchange = Arc::new(RestExchange::from_env(exchange_url).context("exchange credentials")?);

    // Cache store, warmed from the spill directory
    let instruments = config.instrument_symbols();
    let cache = Arc::new(CacheStore::new(
        market_data,
        config.ttl_map(),
        chrono::Duration::seconds(config.ttl.intraday_secs as i64),
        config.bucket_secs,
        config.cache_retention_bars,
        Some(config.data.cache_dir.clone()),
    ));
    let warmed = cache
        .warm(&instruments, chrono::Utc::now())
        .await
        .context("warming cache from disk")?;
    info!(bars = warmed, "Cache warmed from disk");

    let market_hours = config
        .market_hours
        .as_ref()
        .map(|hours| hours.resolve())
        .transpose()?;

    let scheduler = Scheduler::new(
        instruments,
        std::time::Duration::from_secs(config.tick_interval_secs),
        config.refresh_concurrency,
        market_hours,
        cache,
        HistoricalStore::new(config.data.historical_dir.clone()),
        config.strategy.build(),
        config.risk,
        OrderExecutor::new(exchange, config.retry),
        ledger,
        heartbeat,
    );

    // Ctrl+C requests a cooperative stop at the next tick boundary
    let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            let _ = shutdown_tx.send(());
        }
    });

    scheduler.run(shutdown_rx).await?;

    info!("=== Shutdown complete ===");
    Ok(())
}
