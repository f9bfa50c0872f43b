//! Chain adapters for the supported chain families
//!
//! Each adapter provides:
//! - Sender address derivation from a signing secret
//! - Balance queries (native coin and fungible tokens)
//! - Transaction building, signing and submission
//! - Receipt lookup for the confirmation poller
//! - Network fee estimates

pub mod evm;
pub mod rpc;
pub mod solana;
mod solana_tx;
pub mod tron;
pub mod units;

use crate::chain::{Asset, ChainFamily, ChainId};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;
use zeroize::Zeroizing;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Insufficient balance: have {have}, need {need}")]
    InsufficientBalance { have: Decimal, need: Decimal },

    #[error("Destination is the sender's own address: {0}")]
    SelfTransfer(String),

    #[error("RPC connection failed: {0}")]
    Connectivity(String),

    #[error("RPC request failed: {0}")]
    Rpc(String),

    #[error("RPC node rate limit hit")]
    RateLimited,

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("{0} out of range")]
    OutOfRange(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for wallet operations
pub type WalletResult<T> = Result<T, WalletError>;

/// Private key material supplied by the caller or the admin config.
///
/// Redacted in `Debug`, wiped from memory on drop.
#[derive(Clone)]
pub struct SigningSecret(Zeroizing<String>);

impl SigningSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(Zeroizing::new(secret.into()))
    }

    pub fn expose(&self) -> &str {
        self.0.trim()
    }

    /// Hex secret without the optional `0x` prefix
    pub(crate) fn expose_hex(&self) -> &str {
        let secret = self.expose();
        secret
            .strip_prefix("0x")
            .or_else(|| secret.strip_prefix("0X"))
            .unwrap_or(secret)
    }
}

impl fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningSecret(<redacted>)")
    }
}

impl<'de> Deserialize<'de> for SigningSecret {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(SigningSecret::new)
    }
}

/// Terminal outcome of a confirmation session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TerminalStatus {
    Confirmed,
    Failed,
    /// Not observed within the poll budget; the transfer may still land
    PendingTimeout,
}

impl fmt::Display for TerminalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminalStatus::Confirmed => write!(f, "confirmed"),
            TerminalStatus::Failed => write!(f, "failed"),
            TerminalStatus::PendingTimeout => write!(f, "pending-timeout"),
        }
    }
}

/// Receipt data observed on chain
#[derive(Debug, Clone, PartialEq)]
pub struct Receipt {
    pub status: TerminalStatus,
    /// Fee paid, in the chain's native coin
    pub fee: Option<Decimal>,
    /// Block number or slot
    pub block: Option<String>,
    /// Solana only: transaction seen without execution metadata
    pub provisional: bool,
}

/// Outcome of a single receipt lookup
#[derive(Debug, Clone, PartialEq)]
pub enum ReceiptCheck {
    /// Not found yet, or found without a decisive result
    Pending,
    /// The node asked us to slow down
    RateLimited,
    Final(Receipt),
}

/// Backoff schedule between receipt lookups
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollSchedule {
    /// Fixed interval until a wall-clock timeout
    Fixed { interval: Duration, timeout: Duration },
    /// Delay doubles after every attempt
    Exponential { base: Duration, max_attempts: u32 },
    /// Fixed interval; rate-limited attempts wait `interval * attempt`
    FixedWithRateLimit { interval: Duration, max_attempts: u32 },
}

/// A transfer after dispatcher pre-flight: everything an adapter needs to
/// build and submit the transaction.
#[derive(Debug, Clone)]
pub struct TransferOrder<'a> {
    pub chain: ChainId,
    pub asset: &'a Asset,
    pub destination: &'a str,
    pub amount: Decimal,
    pub rpc_url: &'a str,
    /// Explicit EIP-155 chain id; inferred from the RPC URL when absent
    pub evm_chain_id: Option<u64>,
}

/// Expected network fee for a transfer, in the chain's native coin
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeeEstimate {
    pub fee: Decimal,
    /// Gas, energy or signatures the estimate is based on
    pub units: Option<u64>,
    /// Native coin per unit
    pub unit_price: Option<Decimal>,
    /// Most the transfer can burn
    pub max_fee: Option<Decimal>,
}

/// Receipt lookup primitive used by the confirmation poller
#[async_trait]
pub trait ReceiptSource: Send + Sync {
    /// Look up a submitted transaction once
    async fn check_receipt(
        &self,
        chain: ChainId,
        rpc_url: &str,
        handle: &str,
    ) -> WalletResult<ReceiptCheck>;

    /// Backoff schedule for this chain family
    fn schedule(&self) -> PollSchedule;
}

/// Common adapter operations, one implementation per chain family
#[async_trait]
pub trait ChainAdapter: ReceiptSource {
    fn family(&self) -> ChainFamily;

    /// Derive the sender address for a signing secret
    async fn sender_address(&self, secret: &SigningSecret) -> WalletResult<String>;

    /// Query a balance in whole units (ETH, SOL, TRX, tokens)
    async fn balance(
        &self,
        chain: ChainId,
        rpc_url: &str,
        address: &str,
        asset: &Asset,
    ) -> WalletResult<Decimal>;

    /// Chain-specific checks that run after the shared pre-flight
    async fn preflight(&self, _order: &TransferOrder<'_>, _sender: &str) -> WalletResult<()> {
        Ok(())
    }

    /// Network fee the transfer would cost. `sender` sharpens the estimate
    /// where the chain can simulate the call.
    async fn estimate_fee(
        &self,
        order: &TransferOrder<'_>,
        sender: Option<&str>,
    ) -> WalletResult<FeeEstimate>;

    /// Build, sign and submit. Returns the transaction handle without
    /// waiting for confirmation.
    async fn submit(
        &self,
        order: &TransferOrder<'_>,
        secret: &SigningSecret,
        sender: &str,
    ) -> WalletResult<String>;

    /// Address equality as the chain defines it
    fn same_address(&self, a: &str, b: &str) -> bool {
        a.trim() == b.trim()
    }
}

/// Balance that distinguishes "zero" from "could not be determined"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceReading {
    Known(Decimal),
    Unknown,
}

impl BalanceReading {
    /// Collapse to the "unknown == zero" contract
    pub fn or_zero(self) -> Decimal {
        match self {
            BalanceReading::Known(value) => value,
            BalanceReading::Unknown => Decimal::ZERO,
        }
    }

    pub fn is_known(self) -> bool {
        matches!(self, BalanceReading::Known(_))
    }
}

/// Attempts for balance reads when the node is unreachable
pub const BALANCE_READ_ATTEMPTS: u32 = 3;
pub const BALANCE_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Balance read that retries connectivity failures a bounded number of times
pub async fn fetch_balance(
    adapter: &dyn ChainAdapter,
    chain: ChainId,
    rpc_url: &str,
    address: &str,
    asset: &Asset,
) -> WalletResult<Decimal> {
    let mut attempt = 1;
    loop {
        match adapter.balance(chain, rpc_url, address, asset).await {
            Err(WalletError::Connectivity(msg)) if attempt < BALANCE_READ_ATTEMPTS => {
                warn!(
                    chain = %chain,
                    address = %address,
                    attempt = attempt,
                    error = %msg,
                    "Balance read failed, retrying"
                );
                tokio::time::sleep(BALANCE_RETRY_DELAY).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}

/// Balance read that never fails
pub async fn read_balance(
    adapter: &dyn ChainAdapter,
    chain: ChainId,
    rpc_url: &str,
    address: &str,
    asset: &Asset,
) -> BalanceReading {
    match fetch_balance(adapter, chain, rpc_url, address, asset).await {
        Ok(value) => BalanceReading::Known(value),
        Err(e) => {
            warn!(
                chain = %chain,
                address = %address,
                error = %e,
                "Balance unavailable, reporting zero"
            );
            BalanceReading::Unknown
        }
    }
}
