//! Tron adapter (TRX and TRC20) over the node's HTTP wallet API

use super::rpc::RpcClient;
use super::units::{from_base_units, to_base_units};
use super::{
    ChainAdapter, FeeEstimate, PollSchedule, Receipt, ReceiptCheck, ReceiptSource, SigningSecret,
    TerminalStatus, TransferOrder, WalletError, WalletResult,
};
use crate::chain::{Asset, ChainFamily, ChainId};
use crate::workers::BlockingPool;
use async_trait::async_trait;
use ethers::abi::{encode, Token};
use ethers::types::{Address, U256};
use ethers::utils::keccak256;
use k256::ecdsa::signature::hazmat::PrehashSigner;
use k256::ecdsa::{RecoveryId, Signature, SigningKey};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::{debug, info, warn};

/// SUN per TRX
const NATIVE_DECIMALS: u32 = 6;

/// Used when a TRC20 contract will not report its decimals
const DEFAULT_TOKEN_DECIMALS: u32 = 6;

/// Mainnet address prefix byte
const ADDRESS_PREFIX: u8 = 0x41;

/// Bandwidth bytes of a signed TRX transfer and a TRC20 `transfer` call
const NATIVE_TRANSFER_BANDWIDTH: u64 = 268;
const TOKEN_TRANSFER_BANDWIDTH: u64 = 345;

/// Network defaults, in SUN, when the node omits a chain parameter
const DEFAULT_ENERGY_FEE: u64 = 420;
const DEFAULT_BANDWIDTH_FEE: u64 = 1_000;

#[derive(Debug, Clone)]
pub struct TronSettings {
    /// Native balance required before any submission, to cover energy and bandwidth
    pub min_energy_fee: Decimal,
    /// Maximum SUN a TRC20 call may burn
    pub fee_limit_sun: u64,
    pub poll_interval: Duration,
    pub poll_max_attempts: u32,
}

impl Default for TronSettings {
    fn default() -> Self {
        Self {
            min_energy_fee: Decimal::new(1, 1),
            fee_limit_sun: 100_000_000,
            poll_interval: Duration::from_secs(3),
            poll_max_attempts: 10,
        }
    }
}

pub struct TronAdapter {
    rpc: RpcClient,
    pool: BlockingPool,
    settings: TronSettings,
}

impl TronAdapter {
    pub fn new(rpc: RpcClient, pool: BlockingPool, settings: TronSettings) -> Self {
        Self { rpc, pool, settings }
    }

    async fn native_balance(&self, rpc_url: &str, address: &str) -> WalletResult<Decimal> {
        let account: Value = self
            .rpc
            .post(rpc_url, "/wallet/getaccount", &json!({"address": address, "visible": true}))
            .await?;

        // Accounts that were never activated come back as `{}`
        let sun = account.get("balance").and_then(|b| b.as_u64()).unwrap_or(0);
        from_base_units(u128::from(sun), NATIVE_DECIMALS)
    }

    /// Read-only contract call; returns the first 32-byte result word
    async fn constant_call(
        &self,
        rpc_url: &str,
        owner: &str,
        contract: &str,
        selector: &str,
        parameter: String,
    ) -> WalletResult<U256> {
        let response: Value = self
            .rpc
            .post(
                rpc_url,
                "/wallet/triggerconstantcontract",
                &json!({
                    "owner_address": owner,
                    "contract_address": contract,
                    "function_selector": selector,
                    "parameter": parameter,
                    "visible": true
                }),
            )
            .await?;

        let word = response
            .get("constant_result")
            .and_then(|r| r.get(0))
            .and_then(|r| r.as_str())
            .filter(|r| !r.is_empty())
            .ok_or_else(|| {
                WalletError::Rpc(format!(
                    "{} returned no result: {}",
                    selector,
                    node_message(&response)
                ))
            })?;

        U256::from_str_radix(word, 16)
            .map_err(|e| WalletError::Rpc(format!("Invalid {} result: {}", selector, e)))
    }

    /// SUN per energy unit and per bandwidth byte
    async fn resource_prices(&self, rpc_url: &str) -> WalletResult<(u64, u64)> {
        let response: Value = self
            .rpc
            .post(rpc_url, "/wallet/getchainparameters", &json!({}))
            .await?;

        let parameter = |key: &str| {
            response
                .get("chainParameter")
                .and_then(|params| params.as_array())
                .and_then(|params| {
                    params
                        .iter()
                        .find(|p| p.get("key").and_then(|k| k.as_str()) == Some(key))
                })
                .and_then(|p| p.get("value"))
                .and_then(|v| v.as_u64())
        };

        Ok((
            parameter("getEnergyFee").unwrap_or(DEFAULT_ENERGY_FEE),
            parameter("getTransactionFee").unwrap_or(DEFAULT_BANDWIDTH_FEE),
        ))
    }

    /// Energy a TRC20 transfer would consume, simulated from `owner`
    async fn simulate_energy(
        &self,
        order: &TransferOrder<'_>,
        owner: &str,
        contract: &str,
    ) -> WalletResult<Option<u64>> {
        let decimals = self.token_decimals(order.rpc_url, contract).await;
        let units = to_base_units(order.amount, decimals)?;
        let parameter = hex::encode(encode(&[
            Token::Address(abi_address(order.destination)?),
            Token::Uint(U256::from(units)),
        ]));

        let response: Value = self
            .rpc
            .post(
                order.rpc_url,
                "/wallet/triggerconstantcontract",
                &json!({
                    "owner_address": owner,
                    "contract_address": contract,
                    "function_selector": "transfer(address,uint256)",
                    "parameter": parameter,
                    "visible": true
                }),
            )
            .await?;

        Ok(response.get("energy_used").and_then(|e| e.as_u64()))
    }

    async fn token_decimals(&self, rpc_url: &str, contract: &str) -> u32 {
        match self
            .constant_call(rpc_url, contract, contract, "decimals()", String::new())
            .await
        {
            Ok(decimals) if decimals <= U256::from(u8::MAX) => decimals.as_u32(),
            Ok(_) | Err(_) => {
                warn!(
                    token = %contract,
                    fallback = DEFAULT_TOKEN_DECIMALS,
                    "Failed to read TRC20 decimals, using default"
                );
                DEFAULT_TOKEN_DECIMALS
            }
        }
    }

    async fn build_native(
        &self,
        order: &TransferOrder<'_>,
        sender: &str,
    ) -> WalletResult<Value> {
        let sun = to_base_units(order.amount, NATIVE_DECIMALS)?;
        let sun = u64::try_from(sun)
            .map_err(|_| WalletError::Validation(format!("Amount {} is too large", order.amount)))?;

        let tx: Value = self
            .rpc
            .post(
                order.rpc_url,
                "/wallet/createtransaction",
                &json!({
                    "owner_address": sender,
                    "to_address": order.destination,
                    "amount": sun,
                    "visible": true
                }),
            )
            .await?;

        if tx.get("txID").is_none() {
            return Err(WalletError::Rpc(format!(
                "Node refused to build transfer: {}",
                node_message(&tx)
            )));
        }
        Ok(tx)
    }

    async fn build_token(
        &self,
        order: &TransferOrder<'_>,
        sender: &str,
        contract: &str,
    ) -> WalletResult<Value> {
        let decimals = self.token_decimals(order.rpc_url, contract).await;
        let units = to_base_units(order.amount, decimals)?;
        let parameter = hex::encode(encode(&[
            Token::Address(abi_address(order.destination)?),
            Token::Uint(U256::from(units)),
        ]));

        let response: Value = self
            .rpc
            .post(
                order.rpc_url,
                "/wallet/triggersmartcontract",
                &json!({
                    "owner_address": sender,
                    "contract_address": contract,
                    "function_selector": "transfer(address,uint256)",
                    "parameter": parameter,
                    "fee_limit": self.settings.fee_limit_sun,
                    "call_value": 0,
                    "visible": true
                }),
            )
            .await?;

        let accepted = response
            .get("result")
            .and_then(|r| r.get("result"))
            .and_then(|r| r.as_bool())
            .unwrap_or(false);

        match response.get("transaction") {
            Some(tx) if accepted => Ok(tx.clone()),
            _ => Err(WalletError::Rpc(format!(
                "Node refused to build TRC20 transfer: {}",
                node_message(&response)
            ))),
        }
    }

    /// Sign `tx` in place, after checking that its id really is the hash of its raw data
    async fn sign(&self, mut tx: Value, secret: &SigningSecret) -> WalletResult<(Value, String)> {
        let raw_hex = tx
            .get("raw_data_hex")
            .and_then(|r| r.as_str())
            .ok_or_else(|| WalletError::Rpc("Transaction has no raw_data_hex".to_string()))?;
        let raw = hex::decode(raw_hex)
            .map_err(|e| WalletError::Rpc(format!("Invalid raw_data_hex: {}", e)))?;

        let digest: [u8; 32] = Sha256::digest(&raw).into();
        let tx_id = hex::encode(digest);

        let reported = tx.get("txID").and_then(|id| id.as_str()).unwrap_or_default();
        if !reported.eq_ignore_ascii_case(&tx_id) {
            return Err(WalletError::Rpc(format!(
                "Transaction id mismatch: node says {}, raw data hashes to {}",
                reported, tx_id
            )));
        }

        let secret = secret.clone();
        let signature = self
            .pool
            .run(move || {
                let key = signing_key(&secret)?;
                let (signature, recovery): (Signature, RecoveryId) = key
                    .sign_prehash(&digest)
                    .map_err(|e| WalletError::Internal(format!("Signing failed: {}", e)))?;

                let mut bytes = signature.to_bytes().to_vec();
                bytes.push(recovery.to_byte() + 27);
                Ok(hex::encode(bytes))
            })
            .await?;

        tx["signature"] = json!([signature]);
        Ok((tx, tx_id))
    }
}

#[async_trait]
impl ReceiptSource for TronAdapter {
    async fn check_receipt(
        &self,
        chain: ChainId,
        rpc_url: &str,
        handle: &str,
    ) -> WalletResult<ReceiptCheck> {
        let info: Value = match self
            .rpc
            .post(rpc_url, "/wallet/gettransactioninfobyid", &json!({"value": handle}))
            .await
        {
            Ok(info) => info,
            Err(WalletError::RateLimited) => return Ok(ReceiptCheck::RateLimited),
            Err(e) => return Err(e),
        };

        let status = match info.pointer("/receipt/result").and_then(|r| r.as_str()) {
            Some("SUCCESS") => TerminalStatus::Confirmed,
            Some("FAILED") => TerminalStatus::Failed,
            other => {
                debug!(
                    chain = %chain,
                    tx = %handle,
                    result = ?other,
                    "Tron receipt not decisive yet"
                );
                return Ok(ReceiptCheck::Pending);
            }
        };

        let fee = info
            .get("fee")
            .and_then(|f| f.as_u64())
            .and_then(|sun| from_base_units(u128::from(sun), NATIVE_DECIMALS).ok());
        let block = info
            .get("blockNumber")
            .and_then(|b| b.as_u64())
            .map(|b| b.to_string());

        Ok(ReceiptCheck::Final(Receipt {
            status,
            fee,
            block,
            provisional: false,
        }))
    }

    fn schedule(&self) -> PollSchedule {
        PollSchedule::FixedWithRateLimit {
            interval: self.settings.poll_interval,
            max_attempts: self.settings.poll_max_attempts,
        }
    }
}

#[async_trait]
impl ChainAdapter for TronAdapter {
    fn family(&self) -> ChainFamily {
        ChainFamily::Tron
    }

    async fn sender_address(&self, secret: &SigningSecret) -> WalletResult<String> {
        let secret = secret.clone();
        self.pool
            .run(move || {
                let key = signing_key(&secret)?;
                let point = key.verifying_key().to_encoded_point(false);
                let hash = keccak256(&point.as_bytes()[1..]);

                let mut payload = vec![ADDRESS_PREFIX];
                payload.extend_from_slice(&hash[12..]);
                Ok(bs58::encode(payload).with_check().into_string())
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
        match asset {
            Asset::Native => self.native_balance(rpc_url, address).await,
            Asset::Token { address: contract } => {
                let decimals = self.token_decimals(rpc_url, contract).await;
                let parameter = hex::encode(encode(&[Token::Address(abi_address(address)?)]));
                let raw = self
                    .constant_call(rpc_url, address, contract, "balanceOf(address)", parameter)
                    .await?;
                if raw > U256::from(u128::MAX) {
                    return Err(WalletError::OutOfRange(format!("token balance {}", raw)));
                }
                from_base_units(raw.as_u128(), decimals)
            }
        }
    }

    async fn preflight(&self, order: &TransferOrder<'_>, sender: &str) -> WalletResult<()> {
        let native = self.native_balance(order.rpc_url, sender).await?;
        if native < self.settings.min_energy_fee {
            warn!(
                sender = %sender,
                balance = %native,
                required = %self.settings.min_energy_fee,
                "TRX balance too low to cover fees"
            );
            return Err(WalletError::InsufficientBalance {
                have: native,
                need: self.settings.min_energy_fee,
            });
        }
        Ok(())
    }

    /// Bandwidth burn for TRX transfers. TRC20 transfers add the simulated
    /// energy; the fee limit caps what they can burn. Free bandwidth and
    /// staked energy are not subtracted.
    async fn estimate_fee(
        &self,
        order: &TransferOrder<'_>,
        sender: Option<&str>,
    ) -> WalletResult<FeeEstimate> {
        let (energy_fee, bandwidth_fee) = self.resource_prices(order.rpc_url).await?;
        let sun = |value: u64| from_base_units(u128::from(value), NATIVE_DECIMALS);

        match order.asset {
            Asset::Native => {
                let burn = NATIVE_TRANSFER_BANDWIDTH.saturating_mul(bandwidth_fee);
                Ok(FeeEstimate {
                    fee: sun(burn)?,
                    units: Some(NATIVE_TRANSFER_BANDWIDTH),
                    unit_price: Some(sun(bandwidth_fee)?),
                    max_fee: Some(sun(burn)?),
                })
            }
            Asset::Token { address: contract } => {
                let owner = sender.unwrap_or(order.destination);
                let bandwidth = TOKEN_TRANSFER_BANDWIDTH.saturating_mul(bandwidth_fee);
                let energy = self.simulate_energy(order, owner, contract).await?;
                let burn = match energy {
                    Some(energy) => energy
                        .checked_mul(energy_fee)
                        .and_then(|e| e.checked_add(bandwidth))
                        .ok_or_else(|| WalletError::OutOfRange(format!("energy {}", energy)))?
                        .min(self.settings.fee_limit_sun),
                    None => {
                        warn!(
                            token = %contract,
                            "Node did not report energy, assuming the fee limit"
                        );
                        self.settings.fee_limit_sun
                    }
                };

                Ok(FeeEstimate {
                    fee: sun(burn)?,
                    units: energy,
                    unit_price: Some(sun(energy_fee)?),
                    max_fee: Some(sun(self.settings.fee_limit_sun)?),
                })
            }
        }
    }

    async fn submit(
        &self,
        order: &TransferOrder<'_>,
        secret: &SigningSecret,
        sender: &str,
    ) -> WalletResult<String> {
        let unsigned = match order.asset {
            Asset::Native => self.build_native(order, sender).await?,
            Asset::Token { address } => self.build_token(order, sender, address).await?,
        };

        let (signed, tx_id) = self.sign(unsigned, secret).await?;

        let response: Value = self
            .rpc
            .post(order.rpc_url, "/wallet/broadcasttransaction", &signed)
            .await?;

        if response.get("result").and_then(|r| r.as_bool()) != Some(true) {
            return Err(WalletError::TransactionFailed(format!(
                "Broadcast rejected: {}",
                node_message(&response)
            )));
        }

        info!(
            chain = %order.chain,
            asset = %order.asset.kind(),
            to = %order.destination,
            amount = %order.amount,
            tx = %tx_id,
            "Tron transaction broadcast"
        );

        Ok(tx_id)
    }
}

fn signing_key(secret: &SigningSecret) -> WalletResult<SigningKey> {
    let bytes = hex::decode(secret.expose_hex())
        .map_err(|_| WalletError::Validation("Tron private key must be hex".to_string()))?;
    SigningKey::from_slice(&bytes)
        .map_err(|_| WalletError::Validation("Invalid Tron private key".to_string()))
}

/// Base58check address to the 20-byte form used in ABI parameters
fn abi_address(address: &str) -> WalletResult<Address> {
    let payload = bs58::decode(address.trim())
        .with_check(Some(ADDRESS_PREFIX))
        .into_vec()
        .map_err(|e| WalletError::Validation(format!("Invalid Tron address {}: {}", address, e)))?;

    if payload.len() != 21 {
        return Err(WalletError::Validation(format!(
            "Tron address {} has the wrong length",
            address
        )));
    }
    Ok(Address::from_slice(&payload[1..]))
}

/// Best-effort human message from a node error body. Tron hex-encodes most of them.
fn node_message(body: &Value) -> String {
    let message = body
        .get("Error")
        .or_else(|| body.get("message"))
        .or_else(|| body.pointer("/result/message"))
        .and_then(|m| m.as_str());

    match message {
        Some(text) => hex::decode(text)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .unwrap_or_else(|| text.to_string()),
        None => body.to_string(),
    }
}
