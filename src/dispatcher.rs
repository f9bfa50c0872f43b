//! Transfer dispatcher
//!
//! Handles:
//! - Selecting the adapter for a chain
//! - Shared pre-flight checks (address grammar, amount, self-transfer, balance)
//! - Submission (never retried) and optional confirmation polling
//! - Fee estimates priced in the configured fiat
//! - Recording every attempt in the transfer ledger

use crate::chain::{Asset, ChainFamily, ChainId};
use crate::db::{Database, NewTransfer, TransferRecord, TransferStatus};
use crate::explorer::{chain_explorer_url, is_devnet_endpoint};
use crate::poller::await_confirmation;
use crate::prices::{token_amount_for_fiat, PriceCache};
use crate::validator::{is_valid_for, is_valid_tx_handle, normalize_evm};
use crate::wallets::{
    fetch_balance, read_balance, BalanceReading, ChainAdapter, FeeEstimate, SigningSecret,
    TerminalStatus, TransferOrder, WalletError, WalletResult,
};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

/// How much to send
#[derive(Debug, Clone)]
pub enum TransferAmount {
    /// Whole token units (ETH, SOL, USDT, ...)
    Units(Decimal),
    /// Fiat value converted at the current quote. `symbol` defaults to the
    /// chain's native coin and is required for token transfers.
    Fiat {
        nominal: Decimal,
        symbol: Option<String>,
    },
}

#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub chain: ChainId,
    pub asset: Asset,
    pub destination: String,
    pub amount: TransferAmount,
    pub rpc_url: String,
    /// Falls back to the configured admin key for the chain family
    pub signing_key: Option<SigningSecret>,
    pub evm_chain_id: Option<u64>,
    /// Defaults to waiting for token transfers only
    pub wait_for_confirmation: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransferResult {
    pub transaction_handle: String,
    /// `None` when the caller did not wait for confirmation
    pub terminal_status: Option<TerminalStatus>,
    pub chain_fee: Option<Decimal>,
    pub block_reference: Option<String>,
    pub provisional: bool,
    pub sender: String,
    pub amount: Decimal,
    pub explorer_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TxStatusReport {
    pub chain: ChainId,
    pub transaction_handle: String,
    pub status: TerminalStatus,
    pub chain_fee: Option<Decimal>,
    pub block_reference: Option<String>,
    pub provisional: bool,
    pub attempts: u32,
    pub explorer_url: String,
    /// Ledger row, when the transfer was sent through this service
    pub ledger_entry: Option<TransferRecord>,
}

#[derive(Debug, Clone)]
pub struct FeeRequest {
    pub chain: ChainId,
    pub asset: Asset,
    pub destination: String,
    pub amount: Decimal,
    pub rpc_url: String,
    /// Lets EVM and Tron simulate the call from the real sender
    pub sender: Option<String>,
    pub evm_chain_id: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeeReport {
    pub chain: ChainId,
    pub native_symbol: &'static str,
    #[serde(flatten)]
    pub estimate: FeeEstimate,
    pub fiat: String,
    /// `None` when no quote is known for the native coin
    pub fee_fiat: Option<Decimal>,
}

/// What is known about a transfer so far, for the ledger
#[derive(Default)]
struct Draft {
    destination: String,
    amount: Decimal,
    sender: Option<String>,
}

/// A transfer that passed every pre-flight check
struct Checked {
    destination: String,
    amount: Decimal,
    sender: String,
    secret: SigningSecret,
}

pub struct Dispatcher {
    adapters: HashMap<ChainFamily, Arc<dyn ChainAdapter>>,
    admin_keys: HashMap<ChainFamily, SigningSecret>,
    prices: Arc<PriceCache>,
    ledger: Option<Database>,
    tron_default_rpc: String,
}

impl Dispatcher {
    pub fn new(prices: Arc<PriceCache>, tron_default_rpc: &str) -> Self {
        Self {
            adapters: HashMap::new(),
            admin_keys: HashMap::new(),
            prices,
            ledger: None,
            tron_default_rpc: tron_default_rpc.to_string(),
        }
    }

    pub fn with_adapter(mut self, adapter: Arc<dyn ChainAdapter>) -> Self {
        self.adapters.insert(adapter.family(), adapter);
        self
    }

    pub fn with_admin_key(mut self, family: ChainFamily, secret: SigningSecret) -> Self {
        self.admin_keys.insert(family, secret);
        self
    }

    pub fn with_ledger(mut self, ledger: Database) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn ledger(&self) -> Option<&Database> {
        self.ledger.as_ref()
    }

    pub fn prices(&self) -> &PriceCache {
        &self.prices
    }

    fn adapter(&self, chain: ChainId) -> WalletResult<&dyn ChainAdapter> {
        self.adapters
            .get(&chain.family())
            .map(|adapter| adapter.as_ref())
            .ok_or_else(|| WalletError::Unsupported(format!("No adapter configured for {}", chain)))
    }

    /// Balance of `address`; connectivity failures read as `Unknown`
    pub async fn check_balance(
        &self,
        chain: ChainId,
        address: &str,
        rpc_url: &str,
        token_address: Option<&str>,
    ) -> WalletResult<BalanceReading> {
        let adapter = self.adapter(chain)?;
        let family = chain.family();

        let address = normalize_address(family, address);
        if !is_valid_for(family, &address) {
            return Err(WalletError::Validation(format!("Invalid {} address: {}", chain, address)));
        }
        if rpc_url.trim().is_empty() {
            return Err(WalletError::Validation("rpc_url is required".to_string()));
        }

        let asset = match token_address.map(str::trim).filter(|t| !t.is_empty()) {
            Some(token) => Asset::Token {
                address: normalize_address(family, token),
            },
            None => Asset::Native,
        };

        Ok(read_balance(adapter, chain, rpc_url, &address, &asset).await)
    }

    /// Pre-flight, submit and (optionally) wait for a terminal status
    pub async fn transfer(&self, request: &TransferRequest) -> WalletResult<TransferResult> {
        let adapter = self.adapter(request.chain)?;

        let mut draft = Draft {
            destination: request.destination.trim().to_string(),
            ..Draft::default()
        };
        let checked = match self.check_transfer(adapter, request, &mut draft).await {
            Ok(checked) => checked,
            Err(e) => {
                warn!(
                    chain = %request.chain,
                    asset = %request.asset.kind(),
                    to = %draft.destination,
                    error = %e,
                    "Transfer rejected"
                );
                self.record(request, &draft, None, TransferStatus::Rejected, Some(&e))
                    .await;
                return Err(e);
            }
        };

        let order = TransferOrder {
            chain: request.chain,
            asset: &request.asset,
            destination: &checked.destination,
            amount: checked.amount,
            rpc_url: request.rpc_url.trim(),
            evm_chain_id: request.evm_chain_id,
        };

        let draft = Draft {
            destination: checked.destination.clone(),
            amount: checked.amount,
            sender: Some(checked.sender.clone()),
        };

        let handle = match adapter.submit(&order, &checked.secret, &checked.sender).await {
            Ok(handle) => handle,
            Err(e) => {
                error!(
                    chain = %request.chain,
                    from = %checked.sender,
                    to = %checked.destination,
                    error = %e,
                    "Transfer submission failed"
                );
                self.record(request, &draft, None, TransferStatus::Failed, Some(&e))
                    .await;
                return Err(e);
            }
        };

        info!(
            chain = %request.chain,
            asset = %request.asset.kind(),
            from = %checked.sender,
            to = %checked.destination,
            amount = %checked.amount,
            tx = %handle,
            "Transfer submitted"
        );
        self.record(request, &draft, Some(&handle), TransferStatus::Submitted, None)
            .await;

        let mut result = TransferResult {
            explorer_url: chain_explorer_url(
                request.chain,
                &handle,
                is_devnet_endpoint(order.rpc_url),
            ),
            transaction_handle: handle,
            terminal_status: None,
            chain_fee: None,
            block_reference: None,
            provisional: false,
            sender: checked.sender,
            amount: checked.amount,
        };

        let wait = request
            .wait_for_confirmation
            .unwrap_or(matches!(request.asset, Asset::Token { .. }));
        if wait {
            let handle = result.transaction_handle.as_str();
            let outcome = await_confirmation(adapter, request.chain, order.rpc_url, handle).await;
            result.terminal_status = Some(outcome.status);
            if let Some(receipt) = outcome.receipt {
                result.chain_fee = receipt.fee;
                result.block_reference = receipt.block;
                result.provisional = receipt.provisional;
            }
            self.record_status(
                request.chain,
                &result.transaction_handle,
                outcome.status,
                result.chain_fee,
                result.block_reference.as_deref(),
            )
            .await;
        }

        Ok(result)
    }

    async fn check_transfer(
        &self,
        adapter: &dyn ChainAdapter,
        request: &TransferRequest,
        draft: &mut Draft,
    ) -> WalletResult<Checked> {
        let chain = request.chain;
        let family = chain.family();

        let destination = normalize_address(family, &request.destination);
        draft.destination = destination.clone();
        if !is_valid_for(family, &destination) {
            return Err(WalletError::Validation(format!(
                "Invalid {} destination address: {}",
                chain, destination
            )));
        }

        if let Asset::Token { address } = &request.asset {
            if !is_valid_for(family, &normalize_address(family, address)) {
                return Err(WalletError::Validation(format!(
                    "Invalid {} token address: {}",
                    chain, address
                )));
            }
        }

        if request.rpc_url.trim().is_empty() {
            return Err(WalletError::Validation("rpc_url is required".to_string()));
        }

        let amount = self.resolve_amount(request).await?;
        draft.amount = amount;
        if amount <= Decimal::ZERO {
            return Err(WalletError::Validation(format!(
                "Amount must be positive, got {}",
                amount
            )));
        }

        let secret = match &request.signing_key {
            Some(secret) if !secret.expose().is_empty() => secret.clone(),
            _ => self.admin_keys.get(&family).cloned().ok_or_else(|| {
                WalletError::Validation(format!(
                    "private_key is required: no admin key configured for {}",
                    family
                ))
            })?,
        };

        let sender = adapter.sender_address(&secret).await?;
        draft.sender = Some(sender.clone());

        if adapter.same_address(&sender, &destination) {
            return Err(WalletError::SelfTransfer(destination));
        }

        // Connectivity failures propagate here: an unknown balance must not pass as zero
        let balance =
            fetch_balance(adapter, chain, request.rpc_url.trim(), &sender, &request.asset).await?;
        if balance < amount {
            return Err(WalletError::InsufficientBalance {
                have: balance,
                need: amount,
            });
        }

        let order = TransferOrder {
            chain,
            asset: &request.asset,
            destination: &destination,
            amount,
            rpc_url: request.rpc_url.trim(),
            evm_chain_id: request.evm_chain_id,
        };
        adapter.preflight(&order, &sender).await?;

        Ok(Checked {
            destination,
            amount,
            sender,
            secret,
        })
    }

    async fn resolve_amount(&self, request: &TransferRequest) -> WalletResult<Decimal> {
        match &request.amount {
            TransferAmount::Units(amount) => Ok(*amount),
            TransferAmount::Fiat { nominal, symbol } => {
                let symbol = match (symbol, &request.asset) {
                    (Some(symbol), _) => symbol.trim().to_lowercase(),
                    (None, Asset::Native) => request.chain.native_symbol().to_string(),
                    (None, Asset::Token { .. }) => {
                        return Err(WalletError::Validation(
                            "token_symbol is required to size a token transfer in fiat"
                                .to_string(),
                        ))
                    }
                };

                let price = self.prices.get_price(&symbol).await;
                let amount = token_amount_for_fiat(*nominal, price)?;
                info!(
                    symbol = %symbol,
                    nominal = %nominal,
                    fiat = %self.prices.fiat(),
                    price = %price,
                    amount = %amount,
                    "Sized transfer from fiat nominal"
                );
                Ok(amount)
            }
        }
    }

    /// Expected network fee of a transfer, without signing anything
    pub async fn estimate_fee(&self, request: &FeeRequest) -> WalletResult<FeeReport> {
        let chain = request.chain;
        let family = chain.family();
        let adapter = self.adapter(chain)?;

        let destination = normalize_address(family, &request.destination);
        if !is_valid_for(family, &destination) {
            return Err(WalletError::Validation(format!(
                "Invalid {} destination address: {}",
                chain, destination
            )));
        }
        if let Asset::Token { address } = &request.asset {
            if !is_valid_for(family, &normalize_address(family, address)) {
                return Err(WalletError::Validation(format!(
                    "Invalid {} token address: {}",
                    chain, address
                )));
            }
        }
        let sender = request
            .sender
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| normalize_address(family, s));
        if let Some(sender) = &sender {
            if !is_valid_for(family, sender) {
                return Err(WalletError::Validation(format!(
                    "Invalid {} sender address: {}",
                    chain, sender
                )));
            }
        }
        if request.rpc_url.trim().is_empty() {
            return Err(WalletError::Validation("rpc_url is required".to_string()));
        }
        if request.amount <= Decimal::ZERO {
            return Err(WalletError::Validation(format!(
                "Amount must be positive, got {}",
                request.amount
            )));
        }

        let order = TransferOrder {
            chain,
            asset: &request.asset,
            destination: &destination,
            amount: request.amount,
            rpc_url: request.rpc_url.trim(),
            evm_chain_id: request.evm_chain_id,
        };
        let estimate = adapter.estimate_fee(&order, sender.as_deref()).await?;

        let symbol = chain.native_symbol();
        let price = self.prices.get_price(symbol).await;
        let fee_fiat = (price > Decimal::ZERO).then(|| (estimate.fee * price).round_dp(2));
        info!(
            chain = %chain,
            asset = %request.asset.kind(),
            fee = %estimate.fee,
            "Estimated transfer fee"
        );

        Ok(FeeReport {
            chain,
            native_symbol: symbol,
            estimate,
            fiat: self.prices.fiat().to_string(),
            fee_fiat,
        })
    }

    /// Poll a transaction to a terminal status and note it in the ledger.
    ///
    /// Tron lookups may omit `rpc_url`; the other chains need one.
    pub async fn get_tx_status(
        &self,
        chain: ChainId,
        handle: &str,
        rpc_url: Option<&str>,
    ) -> WalletResult<TxStatusReport> {
        let adapter = self.adapter(chain)?;

        let handle = handle.trim();
        if handle.is_empty() {
            return Err(WalletError::Validation("tx_hash is required".to_string()));
        }
        if !is_valid_tx_handle(adapter.family(), handle) {
            return Err(WalletError::Validation(format!(
                "Invalid {} transaction hash: {}",
                chain, handle
            )));
        }

        let rpc_url = match rpc_url.map(str::trim).filter(|u| !u.is_empty()) {
            Some(url) => url,
            None if chain == ChainId::Tron => self.tron_default_rpc.as_str(),
            None => {
                return Err(WalletError::Validation(format!(
                    "rpc_url is required for {}",
                    chain
                )))
            }
        };

        let outcome = await_confirmation(adapter, chain, rpc_url, handle).await;
        let receipt = outcome.receipt.as_ref();
        let mut report = TxStatusReport {
            chain,
            transaction_handle: handle.to_string(),
            status: outcome.status,
            chain_fee: receipt.and_then(|r| r.fee),
            block_reference: receipt.and_then(|r| r.block.clone()),
            provisional: receipt.map(|r| r.provisional).unwrap_or(false),
            attempts: outcome.attempts,
            explorer_url: chain_explorer_url(chain, handle, is_devnet_endpoint(rpc_url)),
            ledger_entry: None,
        };

        self.record_status(
            chain,
            handle,
            report.status,
            report.chain_fee,
            report.block_reference.as_deref(),
        )
        .await;

        if let Some(ledger) = &self.ledger {
            report.ledger_entry = ledger.get_by_handle(chain, handle).await.unwrap_or_else(|e| {
                error!(chain = %chain, tx = %handle, error = %e, "Failed to read ledger entry");
                None
            });
        }

        Ok(report)
    }

    /// Ledger write; failures are logged, never surfaced
    async fn record(
        &self,
        request: &TransferRequest,
        draft: &Draft,
        handle: Option<&str>,
        status: TransferStatus,
        error: Option<&WalletError>,
    ) {
        let Some(ledger) = &self.ledger else {
            return;
        };

        let message = error.map(|e| e.to_string());
        let transfer = NewTransfer {
            chain: request.chain,
            asset_kind: request.asset.kind(),
            token_address: request.asset.token_address(),
            sender: draft.sender.as_deref(),
            destination: &draft.destination,
            amount: draft.amount,
            tx_handle: handle,
            status,
            error_message: message.as_deref(),
        };

        if let Err(e) = ledger.record_transfer(&transfer).await {
            error!(chain = %request.chain, error = %e, "Failed to record transfer in ledger");
        }
    }

    async fn record_status(
        &self,
        chain: ChainId,
        handle: &str,
        status: TerminalStatus,
        fee: Option<Decimal>,
        block: Option<&str>,
    ) {
        let Some(ledger) = &self.ledger else {
            return;
        };

        if let Err(e) = ledger
            .update_status(chain, handle, status.into(), fee, block)
            .await
        {
            error!(chain = %chain, tx = %handle, error = %e, "Failed to update ledger status");
        }
    }
}

fn normalize_address(family: ChainFamily, address: &str) -> String {
    match family {
        ChainFamily::Evm => normalize_evm(address),
        ChainFamily::Solana | ChainFamily::Tron => address.trim().to_string(),
    }
}
