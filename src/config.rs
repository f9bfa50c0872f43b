//! Configuration for the multi-chain payments service

use crate::prices::coingecko::{default_coins_url, default_ids};
use crate::prices::PriceSettings;
use crate::wallets::evm::EvmSettings;
use crate::wallets::solana::SolanaSettings;
use crate::wallets::tron::TronSettings;
use crate::wallets::SigningSecret;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub prices: PricesConfig,

    #[serde(default)]
    pub polling: PollingConfig,

    #[serde(default)]
    pub evm: EvmConfig,

    #[serde(default)]
    pub solana: SolanaConfig,

    #[serde(default)]
    pub tron: TronConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Threads allowed to sign or derive keys at the same time
    #[serde(default = "default_blocking_workers")]
    pub blocking_workers: usize,

    /// Per-request timeout for chain RPC calls (seconds)
    #[serde(default = "default_rpc_timeout")]
    pub rpc_timeout_secs: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_blocking_workers() -> usize {
    4
}

fn default_rpc_timeout() -> u64 {
    30
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            blocking_workers: default_blocking_workers(),
            rpc_timeout_secs: default_rpc_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_listen")]
    pub listen: String,

    #[serde(default = "default_api_port")]
    pub port: u16,

    /// Shared secret the API gateway sends in `X-RapidAPI-Proxy-Secret`.
    /// If empty, the check is disabled
    #[serde(default)]
    pub proxy_secret: String,
}

fn default_api_listen() -> String {
    "127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
    8090
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: default_api_listen(),
            port: default_api_port(),
            proxy_secret: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite transfer ledger
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("/opt/multichain-payments/data/transfers.db")
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PricesConfig {
    #[serde(default = "default_quote_url")]
    pub quote_url: String,

    /// Coin metadata endpoint behind `/token_info`
    #[serde(default = "default_coins_url")]
    pub coins_url: String,

    /// Fiat currency prices are quoted in
    #[serde(default = "default_fiat")]
    pub fiat: String,

    #[serde(default = "default_price_ttl")]
    pub ttl_secs: u64,

    #[serde(default = "default_price_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_price_retry_delay")]
    pub retry_delay_ms: u64,

    #[serde(default = "default_price_timeout")]
    pub request_timeout_secs: u64,

    /// Disk fallback used when every live attempt fails
    #[serde(default = "default_price_cache_path")]
    pub cache_path: PathBuf,

    /// Token symbol -> CoinGecko coin id
    #[serde(default = "default_ids")]
    pub symbols: BTreeMap<String, String>,
}

fn default_quote_url() -> String {
    "https://api.coingecko.com/api/v3/simple/price".to_string()
}

fn default_fiat() -> String {
    "idr".to_string()
}

fn default_price_ttl() -> u64 {
    15
}

fn default_price_attempts() -> u32 {
    3
}

fn default_price_retry_delay() -> u64 {
    1000
}

fn default_price_timeout() -> u64 {
    5
}

fn default_price_cache_path() -> PathBuf {
    PathBuf::from("/opt/multichain-payments/data/price_cache.json")
}

impl Default for PricesConfig {
    fn default() -> Self {
        Self {
            quote_url: default_quote_url(),
            coins_url: default_coins_url(),
            fiat: default_fiat(),
            ttl_secs: default_price_ttl(),
            max_attempts: default_price_attempts(),
            retry_delay_ms: default_price_retry_delay(),
            request_timeout_secs: default_price_timeout(),
            cache_path: default_price_cache_path(),
            symbols: default_ids(),
        }
    }
}

impl PricesConfig {
    pub fn settings(&self) -> PriceSettings {
        PriceSettings {
            fiat: self.fiat.to_lowercase(),
            ttl: Duration::from_secs(self.ttl_secs),
            max_attempts: self.max_attempts,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            cache_path: self.cache_path.clone(),
            symbols: self.symbols.keys().map(|s| s.to_lowercase()).collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_evm_interval")]
    pub evm_interval_secs: u64,

    #[serde(default = "default_evm_timeout")]
    pub evm_timeout_secs: u64,

    #[serde(default = "default_solana_base_delay")]
    pub solana_base_delay_secs: u64,

    #[serde(default = "default_solana_attempts")]
    pub solana_max_attempts: u32,

    #[serde(default = "default_tron_interval")]
    pub tron_interval_secs: u64,

    #[serde(default = "default_tron_attempts")]
    pub tron_max_attempts: u32,
}

fn default_evm_interval() -> u64 {
    5
}

fn default_evm_timeout() -> u64 {
    180
}

fn default_solana_base_delay() -> u64 {
    2
}

fn default_solana_attempts() -> u32 {
    15
}

fn default_tron_interval() -> u64 {
    3
}

fn default_tron_attempts() -> u32 {
    10
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            evm_interval_secs: default_evm_interval(),
            evm_timeout_secs: default_evm_timeout(),
            solana_base_delay_secs: default_solana_base_delay(),
            solana_max_attempts: default_solana_attempts(),
            tron_interval_secs: default_tron_interval(),
            tron_max_attempts: default_tron_attempts(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EvmConfig {
    /// Applied to the node's gas price
    #[serde(default = "default_gas_multiplier")]
    pub gas_price_multiplier: Decimal,

    #[serde(default = "default_native_gas_limit")]
    pub native_gas_limit: u64,

    #[serde(default = "default_token_gas_limit")]
    pub token_gas_limit: u64,

    /// Hex private key used when a request carries none
    #[serde(default)]
    pub admin_key: Option<SigningSecret>,
}

fn default_gas_multiplier() -> Decimal {
    Decimal::new(12, 1)
}

fn default_native_gas_limit() -> u64 {
    21_000
}

fn default_token_gas_limit() -> u64 {
    100_000
}

impl Default for EvmConfig {
    fn default() -> Self {
        Self {
            gas_price_multiplier: default_gas_multiplier(),
            native_gas_limit: default_native_gas_limit(),
            token_gas_limit: default_token_gas_limit(),
            admin_key: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SolanaConfig {
    /// Base58 secret (32-byte seed or 64-byte keypair)
    #[serde(default)]
    pub admin_key: Option<SigningSecret>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TronConfig {
    /// TRX the sender must hold before any submission
    #[serde(default = "default_min_energy_fee")]
    pub min_energy_fee_trx: Decimal,

    #[serde(default = "default_fee_limit")]
    pub fee_limit_sun: u64,

    /// Used by status lookups that omit an RPC endpoint
    #[serde(default = "default_tron_rpc")]
    pub default_rpc_url: String,

    #[serde(default)]
    pub admin_key: Option<SigningSecret>,
}

fn default_min_energy_fee() -> Decimal {
    Decimal::new(1, 1)
}

fn default_fee_limit() -> u64 {
    100_000_000
}

fn default_tron_rpc() -> String {
    "https://api.trongrid.io".to_string()
}

impl Default for TronConfig {
    fn default() -> Self {
        Self {
            min_energy_fee_trx: default_min_energy_fee(),
            fee_limit_sun: default_fee_limit(),
            default_rpc_url: default_tron_rpc(),
            admin_key: None,
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &str) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(val) = var("PAYMENTS_DB_PATH") {
            self.database.path = PathBuf::from(val);
        }
        if let Some(val) = var("PAYMENTS_API_PORT") {
            if let Ok(port) = val.parse() {
                self.api.port = port;
            }
        }
        if let Some(val) = var("PAYMENTS_LOG_LEVEL") {
            self.service.log_level = val;
        }
        if let Some(val) = var("PAYMENTS_PROXY_SECRET") {
            self.api.proxy_secret = val;
        }
        if let Some(val) = var("PRICE_CACHE_PATH") {
            self.prices.cache_path = PathBuf::from(val);
        }

        // Admin keys
        if let Some(val) = var("EVM_ADMIN_KEY") {
            self.evm.admin_key = Some(SigningSecret::new(val));
        }
        if let Some(val) = var("SOLANA_ADMIN_KEY") {
            self.solana.admin_key = Some(SigningSecret::new(val));
        }
        if let Some(val) = var("TRON_ADMIN_KEY") {
            self.tron.admin_key = Some(SigningSecret::new(val));
        }
    }

    pub fn evm_settings(&self) -> EvmSettings {
        EvmSettings {
            gas_price_multiplier: self.evm.gas_price_multiplier,
            native_gas_limit: self.evm.native_gas_limit,
            token_gas_limit: self.evm.token_gas_limit,
            poll_interval: Duration::from_secs(self.polling.evm_interval_secs),
            poll_timeout: Duration::from_secs(self.polling.evm_timeout_secs),
        }
    }

    pub fn solana_settings(&self) -> SolanaSettings {
        SolanaSettings {
            poll_base_delay: Duration::from_secs(self.polling.solana_base_delay_secs),
            poll_max_attempts: self.polling.solana_max_attempts,
            ..SolanaSettings::default()
        }
    }

    pub fn tron_settings(&self) -> TronSettings {
        TronSettings {
            min_energy_fee: self.tron.min_energy_fee_trx,
            fee_limit_sun: self.tron.fee_limit_sun,
            poll_interval: Duration::from_secs(self.polling.tron_interval_secs),
            poll_max_attempts: self.polling.tron_max_attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();

        assert_eq!(config.api.port, 8090);
        assert_eq!(config.prices.fiat, "idr");
        assert_eq!(config.prices.symbols["usdc"], "usd-coin");
        assert_eq!(config.prices.coins_url, "https://api.coingecko.com/api/v3/coins");
        assert_eq!(config.polling.solana_max_attempts, 15);
        assert_eq!(config.tron.default_rpc_url, "https://api.trongrid.io");
        assert!(config.evm.admin_key.is_none());

        let settings = config.prices.settings();
        assert_eq!(settings.ttl, Duration::from_secs(15));
        assert_eq!(settings.retry_delay, Duration::from_secs(1));
        assert_eq!(settings.symbols.len(), 9);
    }

    #[test]
    fn sections_override_defaults() {
        let config: Config = toml::from_str(
            r#"
            [api]
            port = 9000
            proxy_secret = "gateway"

            [polling]
            evm_timeout_secs = 60

            [evm]
            gas_price_multiplier = "1.5"
            admin_key = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318"
            "#,
        )
        .unwrap();

        assert_eq!(config.api.port, 9000);
        assert_eq!(config.api.proxy_secret, "gateway");
        assert_eq!(config.evm_settings().poll_timeout, Duration::from_secs(60));
        assert_eq!(config.evm_settings().gas_price_multiplier, Decimal::new(15, 1));
        assert!(config.evm.admin_key.is_some());
        // keys never show up in logs
        assert!(!format!("{:?}", config).contains("4c0883a6"));
    }

    #[test]
    fn environment_overrides_file_values() {
        let env: HashMap<&str, &str> = [
            ("PAYMENTS_API_PORT", "9100"),
            ("PAYMENTS_PROXY_SECRET", "s3cret"),
            ("PRICE_CACHE_PATH", "/tmp/prices.json"),
            ("TRON_ADMIN_KEY", "abcd"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(config.api.port, 9100);
        assert_eq!(config.api.proxy_secret, "s3cret");
        assert_eq!(config.prices.cache_path, PathBuf::from("/tmp/prices.json"));
        assert_eq!(config.tron.admin_key.unwrap().expose(), "abcd");
        assert!(config.solana.admin_key.is_none());
    }
}
