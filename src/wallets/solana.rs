//! Solana adapter (SOL and SPL tokens)

use super::rpc::RpcClient;
use super::solana_tx::{
    self, associated_token_address, compile_message, create_associated_token_account,
    decode_pubkey, encode_pubkey, sign_transaction, system_transfer, transfer_checked,
    Instruction, Pubkey,
};
use super::units::{from_base_units, to_base_units};
use super::{
    ChainAdapter, FeeEstimate, PollSchedule, Receipt, ReceiptCheck, ReceiptSource, SigningSecret,
    TerminalStatus, TransferOrder, WalletError, WalletResult,
};
use crate::chain::{Asset, ChainFamily, ChainId};
use crate::workers::BlockingPool;
use async_trait::async_trait;
use base64::Engine;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Lamports per SOL
const NATIVE_DECIMALS: u32 = 9;

/// SPL transfers in this service are sized with a fixed precision
const TOKEN_DECIMALS: u8 = 6;

/// Size of an SPL token account, for the rent-exempt deposit
const TOKEN_ACCOUNT_LEN: u64 = 165;

/// Commitments tried, in order, when looking up a signature
const LOOKUP_COMMITMENTS: [&str; 2] = ["confirmed", "finalized"];

#[derive(Debug, Clone)]
pub struct SolanaSettings {
    pub poll_base_delay: Duration,
    pub poll_max_attempts: u32,
    /// Status checks while waiting for an account-creation transaction
    pub ata_confirm_attempts: u32,
    pub ata_confirm_interval: Duration,
}

impl Default for SolanaSettings {
    fn default() -> Self {
        Self {
            poll_base_delay: Duration::from_secs(2),
            poll_max_attempts: 15,
            ata_confirm_attempts: 30,
            ata_confirm_interval: Duration::from_secs(1),
        }
    }
}

pub struct SolanaAdapter {
    rpc: RpcClient,
    pool: BlockingPool,
    settings: SolanaSettings,
}

#[derive(Deserialize)]
struct Contextual<T> {
    value: T,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LatestBlockhash {
    blockhash: String,
}

#[derive(Deserialize)]
struct TokenAmount {
    amount: String,
    decimals: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignatureStatus {
    err: Option<Value>,
    confirmation_status: Option<String>,
}

impl SolanaAdapter {
    pub fn new(rpc: RpcClient, pool: BlockingPool, settings: SolanaSettings) -> Self {
        Self { rpc, pool, settings }
    }

    async fn account_exists(&self, rpc_url: &str, account: &Pubkey) -> WalletResult<bool> {
        let info: Contextual<Option<Value>> = self
            .rpc
            .call(
                rpc_url,
                "getAccountInfo",
                json!([encode_pubkey(account), {"encoding": "base64", "commitment": "confirmed"}]),
            )
            .await?;
        Ok(info.value.is_some())
    }

    async fn latest_blockhash(&self, rpc_url: &str) -> WalletResult<Pubkey> {
        let latest: Contextual<LatestBlockhash> = self
            .rpc
            .call(rpc_url, "getLatestBlockhash", json!([{"commitment": "confirmed"}]))
            .await?;
        decode_pubkey(&latest.value.blockhash)
            .map_err(|e| WalletError::Rpc(format!("Bad blockhash from node: {}", e)))
    }

    /// Lamports the node would charge for a message with these instructions
    async fn fee_for_message(
        &self,
        rpc_url: &str,
        payer: &Pubkey,
        instructions: &[Instruction],
    ) -> WalletResult<u64> {
        let blockhash = self.latest_blockhash(rpc_url).await?;
        let message = compile_message(payer, instructions, &blockhash)?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(message);

        let fee: Contextual<Option<u64>> = self
            .rpc
            .call(
                rpc_url,
                "getFeeForMessage",
                json!([encoded, {"commitment": "confirmed"}]),
            )
            .await?;
        fee.value
            .ok_or_else(|| WalletError::Rpc("Node could not price the message".to_string()))
    }

    /// Sign with a fresh blockhash and submit. Returns the signature.
    async fn send(
        &self,
        rpc_url: &str,
        secret: &SigningSecret,
        instructions: Vec<Instruction>,
    ) -> WalletResult<String> {
        let blockhash = self.latest_blockhash(rpc_url).await?;
        let secret = secret.clone();

        let (wire, signature) = self
            .pool
            .run(move || {
                let key = solana_tx::signing_key(&secret)?;
                sign_transaction(&key, &instructions, &blockhash)
            })
            .await?;

        let encoded = base64::engine::general_purpose::STANDARD.encode(wire);
        let submitted: String = self
            .rpc
            .call(
                rpc_url,
                "sendTransaction",
                json!([encoded, {
                    "encoding": "base64",
                    "skipPreflight": false,
                    "preflightCommitment": "confirmed"
                }]),
            )
            .await?;

        if submitted != signature {
            warn!(
                expected = %signature,
                returned = %submitted,
                "Node returned a different signature"
            );
        }
        Ok(submitted)
    }

    /// Bounded wait for a helper transaction to reach `confirmed`
    async fn await_signature(&self, rpc_url: &str, signature: &str) -> WalletResult<()> {
        for attempt in 1..=self.settings.ata_confirm_attempts {
            let statuses: Contextual<Vec<Option<SignatureStatus>>> = self
                .rpc
                .call(rpc_url, "getSignatureStatuses", json!([[signature]]))
                .await?;

            if let Some(Some(status)) = statuses.value.into_iter().next() {
                if let Some(err) = status.err {
                    return Err(WalletError::TransactionFailed(format!(
                        "Account creation {} failed: {}",
                        signature, err
                    )));
                }
                let level = status.confirmation_status.as_deref();
                if matches!(level, Some("confirmed" | "finalized")) {
                    return Ok(());
                }
            }

            if attempt < self.settings.ata_confirm_attempts {
                tokio::time::sleep(self.settings.ata_confirm_interval).await;
            }
        }

        Err(WalletError::TransactionFailed(format!(
            "Account creation {} not confirmed in time",
            signature
        )))
    }

    /// Associated token account for `owner`, created (and confirmed) when missing
    async fn ensure_token_account(
        &self,
        rpc_url: &str,
        secret: &SigningSecret,
        payer: Pubkey,
        owner: Pubkey,
        mint: Pubkey,
    ) -> WalletResult<Pubkey> {
        let account = associated_token_address(&owner, &mint)?;
        if self.account_exists(rpc_url, &account).await? {
            return Ok(account);
        }

        info!(
            owner = %encode_pubkey(&owner),
            account = %encode_pubkey(&account),
            "Creating associated token account"
        );
        let ix = create_associated_token_account(payer, owner, mint)?;
        let signature = self.send(rpc_url, secret, vec![ix]).await?;
        self.await_signature(rpc_url, &signature).await?;

        info!(
            account = %encode_pubkey(&account),
            tx = %signature,
            "Associated token account created"
        );
        Ok(account)
    }

    async fn lookup(&self, rpc_url: &str, signature: &str) -> WalletResult<Option<Value>> {
        for commitment in LOOKUP_COMMITMENTS {
            let found: Option<Value> = self
                .rpc
                .call_nullable(
                    rpc_url,
                    "getTransaction",
                    json!([signature, {
                        "commitment": commitment,
                        "encoding": "json",
                        "maxSupportedTransactionVersion": 0
                    }]),
                )
                .await?;
            if found.is_some() {
                return Ok(found);
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl ReceiptSource for SolanaAdapter {
    async fn check_receipt(
        &self,
        chain: ChainId,
        rpc_url: &str,
        handle: &str,
    ) -> WalletResult<ReceiptCheck> {
        let Some(tx) = self.lookup(rpc_url, handle).await? else {
            return Ok(ReceiptCheck::Pending);
        };

        let block = tx.get("slot").and_then(|s| s.as_u64()).map(|s| s.to_string());

        let receipt = match tx.get("meta").filter(|meta| !meta.is_null()) {
            // Metadata can lag the slot; report success provisionally
            None => {
                warn!(
                    chain = %chain,
                    tx = %handle,
                    "Transaction found without metadata, provisional success"
                );
                Receipt {
                    status: TerminalStatus::Confirmed,
                    fee: None,
                    block,
                    provisional: true,
                }
            }
            Some(meta) => {
                let status = match meta.get("err") {
                    None | Some(Value::Null) => TerminalStatus::Confirmed,
                    Some(_) => TerminalStatus::Failed,
                };
                let fee = meta
                    .get("fee")
                    .and_then(|f| f.as_u64())
                    .and_then(|lamports| {
                        from_base_units(u128::from(lamports), NATIVE_DECIMALS).ok()
                    });
                Receipt {
                    status,
                    fee,
                    block,
                    provisional: false,
                }
            }
        };

        debug!(chain = %chain, tx = %handle, status = %receipt.status, "Solana transaction found");
        Ok(ReceiptCheck::Final(receipt))
    }

    fn schedule(&self) -> PollSchedule {
        PollSchedule::Exponential {
            base: self.settings.poll_base_delay,
            max_attempts: self.settings.poll_max_attempts,
        }
    }
}

#[async_trait]
impl ChainAdapter for SolanaAdapter {
    fn family(&self) -> ChainFamily {
        ChainFamily::Solana
    }

    async fn sender_address(&self, secret: &SigningSecret) -> WalletResult<String> {
        let secret = secret.clone();
        self.pool
            .run(move || {
                let key = solana_tx::signing_key(&secret)?;
                Ok(encode_pubkey(&key.verifying_key().to_bytes()))
            })
            .await
    }

    async fn balance(
        &self,
        _chain: ChainId,
        rpc_url: &str,
        address: &str,
        asset: &Asset,
    ) -> WalletResult<Decimal> {
        let owner = decode_pubkey(address)?;

        match asset {
            Asset::Native => {
                let lamports: Contextual<u64> = self
                    .rpc
                    .call(
                        rpc_url,
                        "getBalance",
                        json!([encode_pubkey(&owner), {"commitment": "confirmed"}]),
                    )
                    .await?;
                from_base_units(u128::from(lamports.value), NATIVE_DECIMALS)
            }
            Asset::Token { address: mint } => {
                let account = associated_token_address(&owner, &decode_pubkey(mint)?)?;
                if !self.account_exists(rpc_url, &account).await? {
                    debug!(owner = %address, mint = %mint, "No token account yet, balance is zero");
                    return Ok(Decimal::ZERO);
                }

                let balance: Contextual<TokenAmount> = self
                    .rpc
                    .call(rpc_url, "getTokenAccountBalance", json!([encode_pubkey(&account)]))
                    .await?;
                let raw = balance
                    .value
                    .amount
                    .parse::<u128>()
                    .map_err(|e| WalletError::Rpc(format!("Bad token amount: {}", e)))?;
                from_base_units(raw, balance.value.decimals)
            }
        }
    }

    async fn estimate_fee(
        &self,
        order: &TransferOrder<'_>,
        sender: Option<&str>,
    ) -> WalletResult<FeeEstimate> {
        self.transfer_fee(order, sender).await
    }

    async fn submit(
        &self,
        order: &TransferOrder<'_>,
        secret: &SigningSecret,
        sender: &str,
    ) -> WalletResult<String> {
        let payer = decode_pubkey(sender)?;
        let destination = decode_pubkey(order.destination)?;

        let (instruction, units) = match order.asset {
            Asset::Native => {
                let lamports = base_units_u64(order.amount, NATIVE_DECIMALS)?;
                (system_transfer(payer, destination, lamports)?, lamports)
            }
            Asset::Token { address } => {
                let mint = decode_pubkey(address)?;
                let amount = base_units_u64(order.amount, u32::from(TOKEN_DECIMALS))?;

                let source = self
                    .ensure_token_account(order.rpc_url, secret, payer, payer, mint)
                    .await?;
                let target = self
                    .ensure_token_account(order.rpc_url, secret, payer, destination, mint)
                    .await?;

                (
                    transfer_checked(source, mint, target, payer, amount, TOKEN_DECIMALS)?,
                    amount,
                )
            }
        };

        let signature = self.send(order.rpc_url, secret, vec![instruction]).await?;

        info!(
            chain = %order.chain,
            asset = %order.asset.kind(),
            to = %order.destination,
            amount = %order.amount,
            units = units,
            tx = %signature,
            "Solana transaction submitted"
        );

        Ok(signature)
    }
}

impl SolanaAdapter {
    /// Signature fees, plus the rent deposit when the destination has no
    /// token account yet (submission creates it in a separate transaction)
    async fn transfer_fee(
        &self,
        order: &TransferOrder<'_>,
        sender: Option<&str>,
    ) -> WalletResult<FeeEstimate> {
        let destination = decode_pubkey(order.destination)?;
        // The fee only depends on the signatures, so any payer prices the message
        let payer = match sender {
            Some(sender) => decode_pubkey(sender)?,
            None => destination,
        };

        let (instruction, setup) = match order.asset {
            Asset::Native => {
                let lamports = base_units_u64(order.amount, NATIVE_DECIMALS)?;
                (system_transfer(payer, destination, lamports)?, None)
            }
            Asset::Token { address } => {
                let mint = decode_pubkey(address)?;
                let amount = base_units_u64(order.amount, u32::from(TOKEN_DECIMALS))?;
                let source = associated_token_address(&payer, &mint)?;
                let target = associated_token_address(&destination, &mint)?;

                let setup = if self.account_exists(order.rpc_url, &target).await? {
                    None
                } else {
                    Some(create_associated_token_account(payer, destination, mint)?)
                };
                (
                    transfer_checked(source, mint, target, payer, amount, TOKEN_DECIMALS)?,
                    setup,
                )
            }
        };

        let per_signature = self
            .fee_for_message(order.rpc_url, &payer, &[instruction])
            .await?;
        let mut lamports = per_signature;
        let mut signatures = 1u64;

        if let Some(create) = setup {
            let creation = self.fee_for_message(order.rpc_url, &payer, &[create]).await?;
            let rent: u64 = self
                .rpc
                .call(
                    order.rpc_url,
                    "getMinimumBalanceForRentExemption",
                    json!([TOKEN_ACCOUNT_LEN]),
                )
                .await?;
            debug!(
                destination = %order.destination,
                rent = rent,
                "Destination token account missing, adding its rent"
            );
            lamports = lamports
                .checked_add(creation)
                .and_then(|total| total.checked_add(rent))
                .ok_or_else(|| WalletError::OutOfRange("fee".to_string()))?;
            signatures += 1;
        }

        let fee = from_base_units(u128::from(lamports), NATIVE_DECIMALS)?;
        Ok(FeeEstimate {
            fee,
            units: Some(signatures),
            unit_price: Some(from_base_units(u128::from(per_signature), NATIVE_DECIMALS)?),
            max_fee: Some(fee),
        })
    }
}

fn base_units_u64(amount: Decimal, decimals: u32) -> WalletResult<u64> {
    let units = to_base_units(amount, decimals)?;
    u64::try_from(units)
        .map_err(|_| WalletError::Validation(format!("Amount {} is too large", amount)))
}
