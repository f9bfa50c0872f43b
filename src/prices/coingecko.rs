//! CoinGecko simple-price quotes and coin metadata

use super::{QuoteSource, TokenDirectory, TokenMetadata};
use crate::chain::ChainId;
use anyhow::{anyhow, bail};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::{debug, info};

/// `{ "solana": { "idr": 2500000, "usd": 150.1 }, ... }`
type SimplePriceResponse = HashMap<String, HashMap<String, Decimal>>;

/// Subset of `/coins/{id}`
#[derive(Debug, Deserialize)]
struct CoinResponse {
    id: String,
    name: Option<String>,
    symbol: Option<String>,
    #[serde(default)]
    detail_platforms: HashMap<String, PlatformDetail>,
}

#[derive(Debug, Deserialize)]
struct PlatformDetail {
    decimal_place: Option<u32>,
    contract_address: Option<String>,
}

pub struct CoinGeckoSource {
    client: Client,
    quote_url: String,
    coins_url: String,
    fiat: String,
    /// Symbol -> CoinGecko coin id
    ids: BTreeMap<String, String>,
}

impl CoinGeckoSource {
    pub fn new(
        quote_url: &str,
        fiat: &str,
        ids: BTreeMap<String, String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            quote_url: quote_url.to_string(),
            coins_url: default_coins_url(),
            fiat: fiat.to_lowercase(),
            ids,
        })
    }

    /// Base of the `/coins/{id}` metadata endpoint
    pub fn with_coins_url(mut self, coins_url: &str) -> Self {
        self.coins_url = coins_url.trim_end_matches('/').to_string();
        self
    }

    fn vs_currencies(&self) -> String {
        if self.fiat == "usd" {
            self.fiat.clone()
        } else {
            format!("{},usd", self.fiat)
        }
    }
}

#[async_trait]
impl QuoteSource for CoinGeckoSource {
    async fn fetch(&self, symbols: &[String]) -> anyhow::Result<HashMap<String, Decimal>> {
        let wanted: Vec<(&String, &String)> = symbols
            .iter()
            .filter_map(|symbol| self.ids.get(symbol).map(|id| (symbol, id)))
            .collect();
        if wanted.is_empty() {
            bail!("no coin ids mapped for {:?}", symbols);
        }

        let ids = wanted
            .iter()
            .map(|(_, id)| id.as_str())
            .collect::<Vec<_>>()
            .join(",");

        let response = self
            .client
            .get(&self.quote_url)
            .query(&[("ids", ids.as_str()), ("vs_currencies", self.vs_currencies().as_str())])
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::TOO_MANY_REQUESTS => bail!("CoinGecko rate limit exceeded"),
            status => bail!("CoinGecko returned HTTP {}", status),
        }

        let body: SimplePriceResponse = response
            .json()
            .await
            .map_err(|e| anyhow!("Malformed CoinGecko response: {}", e))?;

        let prices: HashMap<String, Decimal> = wanted
            .into_iter()
            .filter_map(|(symbol, id)| {
                let price = body.get(id)?.get(&self.fiat)?;
                (*price > Decimal::ZERO).then(|| (symbol.clone(), *price))
            })
            .collect();

        debug!(requested = %ids, priced = prices.len(), "CoinGecko quotes received");
        Ok(prices)
    }
}

#[async_trait]
impl TokenDirectory for CoinGeckoSource {
    async fn token_info(
        &self,
        token: &str,
        chain: Option<ChainId>,
    ) -> anyhow::Result<Option<TokenMetadata>> {
        let token = token.trim().to_lowercase();
        let id = coin_id_for(&token);
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            debug!(token = %token, "Not a CoinGecko coin id");
            return Ok(None);
        }

        let response = self
            .client
            .get(format!("{}/{}", self.coins_url, id))
            .query(&[
                ("localization", "false"),
                ("tickers", "false"),
                ("market_data", "false"),
                ("community_data", "false"),
                ("developer_data", "false"),
            ])
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => return Ok(None),
            StatusCode::TOO_MANY_REQUESTS => bail!("CoinGecko rate limit exceeded"),
            status => bail!("CoinGecko returned HTTP {}", status),
        }

        let coin: CoinResponse = response
            .json()
            .await
            .map_err(|e| anyhow!("Malformed CoinGecko coin response: {}", e))?;

        let platform = chain.map(platform_for).unwrap_or("ethereum");
        let detail = coin.detail_platforms.get(platform);
        info!(token = %token, id = %coin.id, platform = %platform, "Token info fetched");

        Ok(Some(TokenMetadata {
            name: coin.name,
            symbol: coin.symbol.map(|s| s.to_uppercase()),
            decimals: detail.and_then(|d| d.decimal_place),
            contract_address: detail
                .and_then(|d| d.contract_address.clone())
                .filter(|a| !a.is_empty()),
            coingecko_id: coin.id,
        }))
    }
}

/// Popular tickers -> coin id; anything else is taken as an id already
fn coin_id_for(token: &str) -> &str {
    match token {
        "eth" | "weth" => "ethereum",
        "sol" => "solana",
        "bnb" => "binancecoin",
        "busd" => "binance-usd",
        "usdt" => "tether",
        "usdc" => "usd-coin",
        "trx" => "tron",
        "ton" => "the-open-network",
        "ada" => "cardano",
        "dot" => "polkadot",
        "matic" => "matic-network",
        "avax" => "avalanche-2",
        "doge" => "dogecoin",
        "shib" => "shiba-inu",
        "ltc" => "litecoin",
        "btc" => "bitcoin",
        "atom" => "cosmos",
        "ftm" => "fantom",
        "cake" => "pancakeswap-token",
        other => other,
    }
}

/// CoinGecko asset platform of a chain
fn platform_for(chain: ChainId) -> &'static str {
    match chain {
        ChainId::Eth => "ethereum",
        ChainId::Bsc => "binance-smart-chain",
        ChainId::Base => "base",
        ChainId::Polygon => "polygon-pos",
        ChainId::Solana => "solana",
        ChainId::Tron => "tron",
    }
}

pub fn default_coins_url() -> String {
    "https://api.coingecko.com/api/v3/coins".to_string()
}

/// Default symbol -> coin id map
pub fn default_ids() -> BTreeMap<String, String> {
    [
        ("sol", "solana"),
        ("eth", "ethereum"),
        ("usdt", "tether"),
        ("usdc", "usd-coin"),
        ("bnb", "binancecoin"),
        ("trx", "tron"),
        ("ton", "the-open-network"),
        ("base", "base-protocol"),
        ("matic", "matic-network"),
    ]
    .into_iter()
    .map(|(symbol, id)| (symbol.to_string(), id.to_string()))
    .collect()
}
