//! Multi-chain Payments Service
//!
//! Balance checks, fiat price quotes and transfers on EVM chains
//! (Ethereum, BSC, Base, Polygon), Solana and Tron.
//!
//! Transfers are signed with caller-supplied keys or the configured admin
//! keys, submitted once, and optionally polled to a terminal status using
//! each chain's own backoff schedule.

mod api;
mod chain;
mod config;
mod db;
mod dispatcher;
mod explorer;
mod poller;
mod prices;
#[cfg(test)]
mod test_support;
mod validator;
mod wallets;
mod workers;

use api::ApiState;
use chain::ChainFamily;
use config::Config;
use db::Database;
use dispatcher::Dispatcher;
use prices::coingecko::CoinGeckoSource;
use prices::PriceCache;
use wallets::{evm::EvmAdapter, rpc::RpcClient, solana::SolanaAdapter, tron::TronAdapter};
use workers::BlockingPool;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line args
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/opt/multichain-payments/config.toml".to_string());

    // Load configuration
    let config = Config::load_with_env(&config_path)?;

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!("Starting Multi-chain Payments Service");

    // Initialize database
    let db = Database::new(&config.database.path).await?;
    info!("Transfer ledger initialized at {:?}", config.database.path);

    // Price quotes
    let quote_source = CoinGeckoSource::new(
        &config.prices.quote_url,
        &config.prices.fiat,
        config.prices.symbols.clone(),
        Duration::from_secs(config.prices.request_timeout_secs),
    )?
    .with_coins_url(&config.prices.coins_url);
    let quote_source = Arc::new(quote_source);
    let prices = Arc::new(PriceCache::new(quote_source.clone(), config.prices.settings()));
    info!(
        fiat = %config.prices.fiat,
        cache = ?config.prices.cache_path,
        "Price cache ready"
    );

    // Chain adapters share one RPC client and one signing pool
    let rpc = RpcClient::new(Duration::from_secs(config.service.rpc_timeout_secs))?;
    let pool = BlockingPool::new(config.service.blocking_workers);

    let mut dispatcher = Dispatcher::new(prices, &config.tron.default_rpc_url)
        .with_adapter(Arc::new(EvmAdapter::new(
            rpc.clone(),
            pool.clone(),
            config.evm_settings(),
        )))
        .with_adapter(Arc::new(SolanaAdapter::new(
            rpc.clone(),
            pool.clone(),
            config.solana_settings(),
        )))
        .with_adapter(Arc::new(TronAdapter::new(rpc, pool, config.tron_settings())))
        .with_ledger(db);

    let admin_keys = [
        (ChainFamily::Evm, config.evm.admin_key.clone()),
        (ChainFamily::Solana, config.solana.admin_key.clone()),
        (ChainFamily::Tron, config.tron.admin_key.clone()),
    ];
    for (family, key) in admin_keys {
        if let Some(key) = key {
            info!(family = %family, "Admin key configured");
            dispatcher = dispatcher.with_admin_key(family, key);
        }
    }

    if config.api.proxy_secret.is_empty() {
        info!("Gateway proxy secret not set, requests are not authenticated");
    }

    // Start API server
    let api_state = ApiState {
        dispatcher: Arc::new(dispatcher),
        tokens: quote_source,
        proxy_secret: config.api.proxy_secret.clone(),
    };
    let api_router = api::create_router(api_state);
    let api_addr: SocketAddr = format!("{}:{}", config.api.listen, config.api.port).parse()?;

    let listener = tokio::net::TcpListener::bind(api_addr).await?;
    info!("API server listening on {}", api_addr);

    axum::serve(listener, api_router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Payments service shut down");
    Ok(())
}

/// Wait for Ctrl+C
async fn shutdown_signal() {
    if signal::ctrl_c().await.is_ok() {
        info!("Received Ctrl+C, shutting down...");
    }
}
