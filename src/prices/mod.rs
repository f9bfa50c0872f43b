//! Price quotes in the configured fiat currency
//!
//! Lookup order: in-memory entry younger than the TTL, then a live fetch
//! (bounded retries), then the on-disk cache regardless of age, then 0.

pub mod coingecko;

use crate::chain::ChainId;
use crate::wallets::{WalletError, WalletResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Remote quote provider
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Fetch prices for `symbols` in one request. Symbols the provider did
    /// not price are simply absent from the result.
    async fn fetch(&self, symbols: &[String]) -> anyhow::Result<HashMap<String, Decimal>>;
}

/// Token metadata as listed by a market data provider
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenMetadata {
    pub name: Option<String>,
    pub symbol: Option<String>,
    /// Decimals of the token contract on the requested chain
    pub decimals: Option<u32>,
    pub contract_address: Option<String>,
    pub coingecko_id: String,
}

/// Remote token metadata lookup
#[async_trait]
pub trait TokenDirectory: Send + Sync {
    /// `Ok(None)` when the provider does not list the token. Contract
    /// details come from `chain`'s platform, Ethereum when absent.
    async fn token_info(
        &self,
        token: &str,
        chain: Option<ChainId>,
    ) -> anyhow::Result<Option<TokenMetadata>>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceQuote {
    pub token_symbol: String,
    pub fiat_code: String,
    pub price: Decimal,
    pub fetched_at: DateTime<Utc>,
}

/// Where a returned price came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QuoteOrigin {
    Live,
    Memory,
    Disk,
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceLookup {
    pub price: Decimal,
    pub origin: QuoteOrigin,
    pub fetched_at: Option<DateTime<Utc>>,
}

impl PriceLookup {
    fn unavailable() -> Self {
        Self {
            price: Decimal::ZERO,
            origin: QuoteOrigin::Unavailable,
            fetched_at: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PriceSettings {
    pub fiat: String,
    pub ttl: Duration,
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub cache_path: PathBuf,
    /// Symbols fetched together on every live request
    pub symbols: Vec<String>,
}

/// On-disk entry
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DiskEntry {
    price: Decimal,
    updated_at: DateTime<Utc>,
}

struct MemoryEntry {
    quote: PriceQuote,
    stored: Instant,
}

pub struct PriceCache {
    source: Arc<dyn QuoteSource>,
    settings: PriceSettings,
    memory: RwLock<HashMap<String, MemoryEntry>>,
}

impl PriceCache {
    pub fn new(source: Arc<dyn QuoteSource>, settings: PriceSettings) -> Self {
        Self {
            source,
            settings,
            memory: RwLock::new(HashMap::new()),
        }
    }

    pub fn fiat(&self) -> &str {
        &self.settings.fiat
    }

    pub fn symbols(&self) -> &[String] {
        &self.settings.symbols
    }

    /// Price of `symbol` in fiat; 0 means "unavailable", never a real price
    pub async fn get_price(&self, symbol: &str) -> Decimal {
        self.lookup(symbol).await.price
    }

    pub async fn lookup(&self, symbol: &str) -> PriceLookup {
        let symbol = symbol.trim().to_lowercase();

        if !self.settings.symbols.contains(&symbol) {
            warn!(symbol = %symbol, "No quote source mapping for symbol");
            return PriceLookup::unavailable();
        }

        if let Some(quote) = self.fresh_from_memory(&symbol).await {
            debug!(symbol = %symbol, price = %quote.price, "Price served from memory");
            return PriceLookup {
                price: quote.price,
                origin: QuoteOrigin::Memory,
                fetched_at: Some(quote.fetched_at),
            };
        }

        if let Some(quote) = self.fetch_live(&symbol).await {
            return PriceLookup {
                price: quote.price,
                origin: QuoteOrigin::Live,
                fetched_at: Some(quote.fetched_at),
            };
        }

        match self.read_disk().await.remove(&symbol) {
            Some(entry) if entry.price > Decimal::ZERO => {
                warn!(
                    symbol = %symbol,
                    price = %entry.price,
                    updated_at = %entry.updated_at,
                    "Live price unavailable, serving disk cache"
                );
                PriceLookup {
                    price: entry.price,
                    origin: QuoteOrigin::Disk,
                    fetched_at: Some(entry.updated_at),
                }
            }
            _ => {
                error!(symbol = %symbol, "No price available from any source");
                PriceLookup::unavailable()
            }
        }
    }

    async fn fresh_from_memory(&self, symbol: &str) -> Option<PriceQuote> {
        let memory = self.memory.read().await;
        memory
            .get(symbol)
            .filter(|entry| entry.stored.elapsed() < self.settings.ttl)
            .map(|entry| entry.quote.clone())
    }

    /// Live fetch with bounded retries. A failed request, a missing symbol
    /// and a zero price all count as failed attempts.
    async fn fetch_live(&self, symbol: &str) -> Option<PriceQuote> {
        let max_attempts = self.settings.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            match self.source.fetch(&self.settings.symbols).await {
                Ok(prices) => match prices.get(symbol) {
                    Some(price) if *price > Decimal::ZERO => {
                        let fetched_at = Utc::now();
                        self.store(&prices, fetched_at).await;
                        info!(
                            symbol = %symbol,
                            price = %price,
                            fiat = %self.settings.fiat,
                            "Live price fetched"
                        );
                        return Some(PriceQuote {
                            token_symbol: symbol.to_string(),
                            fiat_code: self.settings.fiat.clone(),
                            price: *price,
                            fetched_at,
                        });
                    }
                    _ => warn!(
                        symbol = %symbol,
                        attempt = attempt,
                        "Quote source returned no usable price"
                    ),
                },
                Err(e) => warn!(
                    symbol = %symbol,
                    attempt = attempt,
                    error = %e,
                    "Price fetch failed"
                ),
            }

            if attempt < max_attempts {
                tokio::time::sleep(self.settings.retry_delay).await;
            }
        }

        None
    }

    /// Update memory and disk with every usable price from one fetch
    async fn store(&self, prices: &HashMap<String, Decimal>, fetched_at: DateTime<Utc>) {
        let usable: Vec<(&String, &Decimal)> =
            prices.iter().filter(|(_, price)| **price > Decimal::ZERO).collect();

        {
            let mut memory = self.memory.write().await;
            let stored = Instant::now();
            for (symbol, price) in &usable {
                memory.insert(
                    symbol.to_string(),
                    MemoryEntry {
                        quote: PriceQuote {
                            token_symbol: symbol.to_string(),
                            fiat_code: self.settings.fiat.clone(),
                            price: **price,
                            fetched_at,
                        },
                        stored,
                    },
                );
            }
        }

        let mut disk = self.read_disk().await;
        for (symbol, price) in usable {
            disk.insert(
                symbol.clone(),
                DiskEntry {
                    price: *price,
                    updated_at: fetched_at,
                },
            );
        }
        if let Err(e) = self.write_disk(&disk).await {
            warn!(path = ?self.settings.cache_path, error = %e, "Failed to persist price cache");
        }
    }

    async fn read_disk(&self) -> HashMap<String, DiskEntry> {
        let contents = match tokio::fs::read(&self.settings.cache_path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return HashMap::new(),
            Err(e) => {
                warn!(path = ?self.settings.cache_path, error = %e, "Failed to read price cache");
                return HashMap::new();
            }
        };

        serde_json::from_slice(&contents).unwrap_or_else(|e| {
            warn!(
                path = ?self.settings.cache_path,
                error = %e,
                "Price cache file is corrupt, ignoring"
            );
            HashMap::new()
        })
    }

    /// Rewrite the whole file through a temp file so readers never see a partial write
    async fn write_disk(&self, entries: &HashMap<String, DiskEntry>) -> anyhow::Result<()> {
        let path = &self.settings.cache_path;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(entries)?).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

/// Token amount worth `nominal` fiat at `price`, rounded to 6 places
pub fn token_amount_for_fiat(nominal: Decimal, price: Decimal) -> WalletResult<Decimal> {
    if price <= Decimal::ZERO {
        return Err(WalletError::Validation("price unavailable".to_string()));
    }
    if nominal <= Decimal::ZERO {
        return Err(WalletError::Validation("nominal must be positive".to_string()));
    }
    nominal
        .checked_div(price)
        .map(|amount| amount.round_dp(6))
        .ok_or_else(|| WalletError::Validation("nominal amount out of range".to_string()))
}
