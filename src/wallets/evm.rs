//! EVM adapter (Ethereum, BSC, Base, Polygon)
//!
//! Talks plain JSON-RPC to whatever node the caller names. Transactions are
//! legacy (EIP-155) and signed locally with `ethers`.

use super::rpc::RpcClient;
use super::units::{from_base_units, to_base_units};
use super::{
    ChainAdapter, FeeEstimate, PollSchedule, Receipt, ReceiptCheck, ReceiptSource, SigningSecret,
    TerminalStatus, TransferOrder, WalletError, WalletResult,
};
use crate::chain::{Asset, ChainFamily, ChainId};
use crate::validator::normalize_evm;
use crate::workers::BlockingPool;
use async_trait::async_trait;
use ethers::abi::{encode, Token};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, TransactionRequest, U256};
use ethers::utils::{id, to_checksum};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Native coins on every supported EVM chain use 18 decimals
const NATIVE_DECIMALS: u32 = 18;

/// `decimals()` selector
const DECIMALS_CALL: &str = "0x313ce567";

#[derive(Debug, Clone)]
pub struct EvmSettings {
    pub gas_price_multiplier: Decimal,
    pub native_gas_limit: u64,
    pub token_gas_limit: u64,
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
}

impl Default for EvmSettings {
    fn default() -> Self {
        Self {
            gas_price_multiplier: Decimal::new(12, 1),
            native_gas_limit: 21_000,
            token_gas_limit: 100_000,
            poll_interval: Duration::from_secs(5),
            poll_timeout: Duration::from_secs(180),
        }
    }
}

pub struct EvmAdapter {
    rpc: RpcClient,
    pool: BlockingPool,
    settings: EvmSettings,
}

/// Call a transfer makes: plain value transfer or ERC-20 `transfer`
struct EvmCall {
    to: Address,
    value: U256,
    data: Bytes,
    gas_limit: u64,
}

impl EvmAdapter {
    pub fn new(rpc: RpcClient, pool: BlockingPool, settings: EvmSettings) -> Self {
        Self { rpc, pool, settings }
    }

    /// Token decimals from the contract, with a per-chain fallback
    async fn token_decimals(&self, chain: ChainId, rpc_url: &str, token: &Address) -> u32 {
        let result: WalletResult<String> = self
            .rpc
            .call(
                rpc_url,
                "eth_call",
                json!([{"to": format!("{:?}", token), "data": DECIMALS_CALL}, "latest"]),
            )
            .await;

        match result.and_then(|raw| parse_quantity(&raw)) {
            Ok(decimals) if decimals <= U256::from(u8::MAX) => decimals.as_u32(),
            Ok(decimals) => {
                warn!(
                    chain = %chain,
                    token = ?token,
                    decimals = %decimals,
                    "Implausible token decimals, using default"
                );
                default_token_decimals(chain)
            }
            Err(e) => {
                let fallback = default_token_decimals(chain);
                warn!(
                    chain = %chain,
                    token = ?token,
                    error = %e,
                    fallback = fallback,
                    "Failed to read token decimals, using default"
                );
                fallback
            }
        }
    }

    async fn token_balance_raw(
        &self,
        rpc_url: &str,
        token: &Address,
        owner: &Address,
    ) -> WalletResult<U256> {
        let raw: String = self
            .rpc
            .call(
                rpc_url,
                "eth_call",
                json!([{"to": format!("{:?}", token), "data": balance_of_call(owner)}, "latest"]),
            )
            .await?;
        parse_quantity(&raw)
    }

    async fn gas_price(&self, rpc_url: &str) -> WalletResult<U256> {
        let raw: String = self.rpc.call(rpc_url, "eth_gasPrice", json!([])).await?;
        let node_price = u256_to_u128(parse_quantity(&raw)?, "gas price")?;

        Decimal::from_u128(node_price)
            .and_then(|price| price.checked_mul(self.settings.gas_price_multiplier))
            .and_then(|price| price.trunc().to_u128())
            .map(U256::from)
            .ok_or_else(|| WalletError::OutOfRange(format!("gas price {}", node_price)))
    }

    async fn build_call(&self, order: &TransferOrder<'_>) -> WalletResult<EvmCall> {
        let destination = parse_address(order.destination)?;

        match order.asset {
            Asset::Native => {
                let wei = to_base_units(order.amount, NATIVE_DECIMALS)?;
                Ok(EvmCall {
                    to: destination,
                    value: U256::from(wei),
                    data: Bytes::new(),
                    gas_limit: self.settings.native_gas_limit,
                })
            }
            Asset::Token { address } => {
                let token = parse_address(address)?;
                let decimals = self.token_decimals(order.chain, order.rpc_url, &token).await;
                let units = to_base_units(order.amount, decimals)?;
                Ok(EvmCall {
                    to: token,
                    value: U256::zero(),
                    data: transfer_call(&destination, U256::from(units)),
                    gas_limit: self.settings.token_gas_limit,
                })
            }
        }
    }

    /// Gas the node expects the call to use, or the configured limit when
    /// it cannot simulate it
    async fn simulate_gas(&self, rpc_url: &str, from: &str, call: &EvmCall) -> u64 {
        let request = json!([{
            "from": normalize_evm(from),
            "to": format!("{:?}", call.to),
            "value": format!("0x{:x}", call.value),
            "data": format!("0x{}", hex::encode(&call.data)),
        }]);

        let estimated: WalletResult<u64> = self
            .rpc
            .call::<String>(rpc_url, "eth_estimateGas", request)
            .await
            .and_then(|raw| parse_quantity(&raw))
            .and_then(|gas| {
                if gas > U256::from(u64::MAX) {
                    return Err(WalletError::OutOfRange(format!("gas {}", gas)));
                }
                Ok(gas.as_u64())
            });

        match estimated {
            Ok(gas) => {
                if gas > call.gas_limit {
                    warn!(
                        estimated = gas,
                        limit = call.gas_limit,
                        "Estimated gas exceeds the configured limit"
                    );
                }
                gas
            }
            Err(e) => {
                warn!(error = %e, limit = call.gas_limit, "Gas simulation failed, using the limit");
                call.gas_limit
            }
        }
    }
}

#[async_trait]
impl ReceiptSource for EvmAdapter {
    async fn check_receipt(
        &self,
        chain: ChainId,
        rpc_url: &str,
        handle: &str,
    ) -> WalletResult<ReceiptCheck> {
        let receipt: Option<Value> = self
            .rpc
            .call_nullable(rpc_url, "eth_getTransactionReceipt", json!([handle]))
            .await?;

        let Some(receipt) = receipt else {
            return Ok(ReceiptCheck::Pending);
        };

        let status = match receipt.get("status").and_then(|s| s.as_str()) {
            Some("0x1") => TerminalStatus::Confirmed,
            _ => TerminalStatus::Failed,
        };

        let quantity = |field: &str| {
            receipt
                .get(field)
                .and_then(|v| v.as_str())
                .and_then(|v| parse_quantity(v).ok())
        };

        let fee = match (quantity("gasUsed"), quantity("effectiveGasPrice")) {
            (Some(used), Some(price)) => used
                .checked_mul(price)
                .and_then(|wei| u256_to_u128(wei, "fee").ok())
                .and_then(|wei| from_base_units(wei, NATIVE_DECIMALS).ok()),
            _ => None,
        };

        debug!(chain = %chain, tx = %handle, status = %status, "EVM receipt found");

        Ok(ReceiptCheck::Final(Receipt {
            status,
            fee,
            block: quantity("blockNumber").map(|n| n.to_string()),
            provisional: false,
        }))
    }

    fn schedule(&self) -> PollSchedule {
        PollSchedule::Fixed {
            interval: self.settings.poll_interval,
            timeout: self.settings.poll_timeout,
        }
    }
}

#[async_trait]
impl ChainAdapter for EvmAdapter {
    fn family(&self) -> ChainFamily {
        ChainFamily::Evm
    }

    async fn sender_address(&self, secret: &SigningSecret) -> WalletResult<String> {
        let wallet = self.wallet(secret).await?;
        Ok(to_checksum(&wallet.address(), None))
    }

    async fn balance(
        &self,
        chain: ChainId,
        rpc_url: &str,
        address: &str,
        asset: &Asset,
    ) -> WalletResult<Decimal> {
        let owner = parse_address(address)?;

        match asset {
            Asset::Native => {
                let raw: String = self
                    .rpc
                    .call(rpc_url, "eth_getBalance", json!([format!("{:?}", owner), "latest"]))
                    .await?;
                from_base_units(u256_to_u128(parse_quantity(&raw)?, "balance")?, NATIVE_DECIMALS)
            }
            Asset::Token { address: token } => {
                let token = parse_address(token)?;
                let decimals = self.token_decimals(chain, rpc_url, &token).await;
                let raw = self.token_balance_raw(rpc_url, &token, &owner).await?;
                from_base_units(u256_to_u128(raw, "token balance")?, decimals)
            }
        }
    }

    async fn submit(
        &self,
        order: &TransferOrder<'_>,
        secret: &SigningSecret,
        sender: &str,
    ) -> WalletResult<String> {
        let chain_id = order
            .evm_chain_id
            .unwrap_or_else(|| infer_chain_id(order.chain, order.rpc_url));
        let call = self.build_call(order).await?;

        let nonce: String = self
            .rpc
            .call(order.rpc_url, "eth_getTransactionCount", json!([sender, "pending"]))
            .await?;
        let nonce = parse_quantity(&nonce)?;
        let gas_price = self.gas_price(order.rpc_url).await?;

        let tx: TypedTransaction = TransactionRequest::new()
            .to(call.to)
            .value(call.value)
            .data(call.data)
            .gas(call.gas_limit)
            .gas_price(gas_price)
            .nonce(nonce)
            .chain_id(chain_id)
            .into();

        let wallet = self.wallet(secret).await?;
        let raw = self
            .pool
            .run(move || {
                let signature = wallet
                    .sign_transaction_sync(&tx)
                    .map_err(|e| WalletError::Internal(format!("Signing failed: {}", e)))?;
                Ok(tx.rlp_signed(&signature))
            })
            .await?;

        let tx_hash: String = self
            .rpc
            .call(
                order.rpc_url,
                "eth_sendRawTransaction",
                json!([format!("0x{}", hex::encode(&raw))]),
            )
            .await?;

        info!(
            chain = %order.chain,
            chain_id = chain_id,
            asset = %order.asset.kind(),
            to = %order.destination,
            amount = %order.amount,
            nonce = %nonce,
            tx = %tx_hash,
            "EVM transaction submitted"
        );

        Ok(tx_hash)
    }

    async fn estimate_fee(
        &self,
        order: &TransferOrder<'_>,
        sender: Option<&str>,
    ) -> WalletResult<FeeEstimate> {
        let call = self.build_call(order).await?;
        let gas_price = self.gas_price(order.rpc_url).await?;
        let gas = match sender {
            Some(from) => self.simulate_gas(order.rpc_url, from, &call).await,
            None => call.gas_limit,
        };

        let native = |gas: u64, what: &str| -> WalletResult<Decimal> {
            let wei = gas_price
                .checked_mul(U256::from(gas))
                .ok_or_else(|| WalletError::OutOfRange(what.to_string()))?;
            from_base_units(u256_to_u128(wei, what)?, NATIVE_DECIMALS)
        };

        let estimate = FeeEstimate {
            fee: native(gas, "fee")?,
            units: Some(gas),
            unit_price: Some(native(1, "gas price")?),
            max_fee: Some(native(gas.max(call.gas_limit), "max fee")?),
        };
        debug!(
            chain = %order.chain,
            gas = gas,
            fee = %estimate.fee,
            "EVM fee estimated"
        );
        Ok(estimate)
    }

    fn same_address(&self, a: &str, b: &str) -> bool {
        normalize_evm(a).eq_ignore_ascii_case(&normalize_evm(b))
    }
}

impl EvmAdapter {
    async fn wallet(&self, secret: &SigningSecret) -> WalletResult<LocalWallet> {
        let secret = secret.clone();
        self.pool
            .run(move || {
                LocalWallet::from_str(secret.expose_hex())
                    .map_err(|_| WalletError::Validation("Invalid EVM private key".to_string()))
            })
            .await
    }
}

/// EIP-155 chain id from RPC URL hints, falling back to the chain's mainnet
pub fn infer_chain_id(chain: ChainId, rpc_url: &str) -> u64 {
    let url = rpc_url.to_lowercase();

    if url.contains("goerli") {
        5
    } else if url.contains("sepolia") {
        if chain == ChainId::Base {
            84_532
        } else {
            11_155_111
        }
    } else if url.contains("bsc-test") || (chain == ChainId::Bsc && url.contains("testnet")) {
        97
    } else if url.contains("bsc") {
        56
    } else if chain == ChainId::Polygon && url.contains("amoy") {
        80_002
    } else {
        chain.evm_mainnet_id().unwrap_or(1)
    }
}

/// Fallback when `decimals()` cannot be read: BEP-20 stablecoins use 18,
/// the USDT/USDC contracts elsewhere use 6
fn default_token_decimals(chain: ChainId) -> u32 {
    match chain {
        ChainId::Bsc => 18,
        _ => 6,
    }
}

fn parse_address(address: &str) -> WalletResult<Address> {
    Address::from_str(&normalize_evm(address))
        .map_err(|_| WalletError::Validation(format!("Invalid EVM address: {}", address)))
}

fn parse_quantity(raw: &str) -> WalletResult<U256> {
    let digits = raw.trim().trim_start_matches("0x");
    if digits.is_empty() {
        return Err(WalletError::Rpc(format!("Empty quantity '{}'", raw)));
    }
    U256::from_str_radix(digits, 16)
        .map_err(|e| WalletError::Rpc(format!("Invalid quantity '{}': {}", raw, e)))
}

fn u256_to_u128(value: U256, what: &str) -> WalletResult<u128> {
    if value > U256::from(u128::MAX) {
        return Err(WalletError::OutOfRange(format!("{} {}", what, value)));
    }
    Ok(value.as_u128())
}

fn balance_of_call(owner: &Address) -> String {
    let mut data = id("balanceOf(address)").to_vec();
    data.extend(encode(&[Token::Address(*owner)]));
    format!("0x{}", hex::encode(data))
}

fn transfer_call(to: &Address, amount: U256) -> Bytes {
    let mut data = id("transfer(address,uint256)").to_vec();
    data.extend(encode(&[Token::Address(*to), Token::Uint(amount)]));
    Bytes::from(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockNode;
    use ethers::utils::rlp::Rlp;
    use std::sync::{Arc, Mutex};

    const KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";
    const KEY_ADDRESS: &str = "0x2c7536E3605D9C16a7a3D7b1898e529396a65c23";
    const DEST: &str = "0x52908400098527886E0F7030069857D2E4169EE7";
    const TOKEN: &str = "0xdAC17F958D2ee523a2206206994597C13D831ec7";

    fn adapter() -> EvmAdapter {
        EvmAdapter::new(
            RpcClient::new(Duration::from_secs(5)).unwrap(),
            BlockingPool::new(2),
            EvmSettings::default(),
        )
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn chain_id_heuristics() {
        assert_eq!(infer_chain_id(ChainId::Eth, "https://eth-goerli.example"), 5);
        assert_eq!(infer_chain_id(ChainId::Eth, "https://rpc.sepolia.org"), 11_155_111);
        assert_eq!(infer_chain_id(ChainId::Base, "https://sepolia.base.org"), 84_532);
        assert_eq!(
            infer_chain_id(ChainId::Bsc, "https://data-seed-prebsc-1-s1.bsc-testnet.io"),
            97
        );
        assert_eq!(infer_chain_id(ChainId::Bsc, "https://bsc-test.example"), 97);
        assert_eq!(infer_chain_id(ChainId::Bsc, "https://bsc-dataseed.binance.org"), 56);
        assert_eq!(infer_chain_id(ChainId::Polygon, "https://rpc-amoy.polygon.technology"), 80_002);
        assert_eq!(infer_chain_id(ChainId::Polygon, "https://polygon-rpc.com"), 137);
        assert_eq!(infer_chain_id(ChainId::Base, "https://mainnet.base.org"), 8453);
    }

    #[test]
    fn encodes_erc20_calls() {
        let owner = parse_address(DEST).unwrap();
        let call = balance_of_call(&owner);
        assert!(call.starts_with("0x70a08231"));
        assert_eq!(call.len(), 2 + 8 + 64);

        let data = transfer_call(&owner, U256::from(1_000_000u64));
        assert_eq!(&data[..4], &[0xa9, 0x05, 0x9c, 0xbb]);
        assert_eq!(data.len(), 4 + 64);
    }

    #[test]
    fn address_comparison_ignores_case_and_prefix() {
        let adapter = adapter();
        assert!(adapter.same_address(KEY_ADDRESS, &KEY_ADDRESS.to_lowercase()));
        assert!(adapter.same_address(KEY_ADDRESS, &KEY_ADDRESS[2..]));
        assert!(!adapter.same_address(KEY_ADDRESS, DEST));
    }

    #[tokio::test]
    async fn derives_checksummed_sender() {
        let sender = adapter().sender_address(&SigningSecret::new(KEY)).await.unwrap();
        assert_eq!(sender, KEY_ADDRESS);

        let err = adapter()
            .sender_address(&SigningSecret::new("not-a-key"))
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::Validation(_)));
    }

    #[tokio::test]
    async fn reads_native_balance() {
        let node = MockNode::start(|method, _| match method {
            "eth_getBalance" => json!({"jsonrpc": "2.0", "id": 1, "result": "0x14d1120d7b160000"}),
            _ => json!({"jsonrpc": "2.0", "id": 1, "error": {"code": -32601, "message": "no"}}),
        })
        .await;

        let balance = adapter()
            .balance(ChainId::Eth, &node.url(), DEST, &Asset::Native)
            .await
            .unwrap();
        assert_eq!(balance, dec("1.5"));
    }

    #[tokio::test]
    async fn token_decimals_fall_back_per_chain() {
        let node = MockNode::start(|_, body| {
            let data = body["params"][0]["data"].as_str().unwrap_or_default();
            if data == DECIMALS_CALL {
                json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "error": {"code": 3, "message": "execution reverted"}
                })
            } else {
                // 2_000_000 base units
                json!({"jsonrpc": "2.0", "id": 1, "result": format!("0x{:064x}", 2_000_000u64)})
            }
        })
        .await;
        let token = Asset::Token { address: TOKEN.to_string() };

        let eth = adapter().balance(ChainId::Eth, &node.url(), DEST, &token).await.unwrap();
        assert_eq!(eth, dec("2"));

        let bsc = adapter().balance(ChainId::Bsc, &node.url(), DEST, &token).await.unwrap();
        assert_eq!(bsc, dec("0.000000000002"));
    }

    #[tokio::test]
    async fn signs_and_submits_legacy_transaction() {
        let raw_tx = Arc::new(Mutex::new(None::<String>));
        let captured = raw_tx.clone();
        let node = MockNode::start(move |method, body| {
            let result = match method {
                "eth_getTransactionCount" => {
                    assert_eq!(body["params"][1], "pending");
                    json!("0x5")
                }
                "eth_gasPrice" => json!("0x3b9aca00"),
                "eth_sendRawTransaction" => {
                    *captured.lock().unwrap() = body["params"][0].as_str().map(str::to_string);
                    json!("0xfeed")
                }
                other => panic!("unexpected call {other}"),
            };
            json!({"jsonrpc": "2.0", "id": 1, "result": result})
        })
        .await;

        let url = node.url();
        let order = TransferOrder {
            chain: ChainId::Eth,
            asset: &Asset::Native,
            destination: DEST,
            amount: dec("0.5"),
            rpc_url: &url,
            evm_chain_id: Some(11_155_111),
        };

        let handle = adapter()
            .submit(&order, &SigningSecret::new(KEY), KEY_ADDRESS)
            .await
            .unwrap();
        assert_eq!(handle, "0xfeed");

        let raw = raw_tx.lock().unwrap().clone().unwrap();
        let bytes = hex::decode(raw.trim_start_matches("0x")).unwrap();
        let (tx, _) = TypedTransaction::decode_signed(&Rlp::new(&bytes)).unwrap();

        assert_eq!(tx.from(), Some(&parse_address(KEY_ADDRESS).unwrap()));
        assert_eq!(tx.to_addr(), Some(&parse_address(DEST).unwrap()));
        assert_eq!(tx.nonce(), Some(&U256::from(5u64)));
        assert_eq!(tx.gas(), Some(&U256::from(21_000u64)));
        assert_eq!(tx.gas_price(), Some(U256::from(1_200_000_000u64)));
        assert_eq!(tx.value(), Some(&U256::from(500_000_000_000_000_000u64)));
        assert_eq!(tx.chain_id().map(|id| id.as_u64()), Some(11_155_111));
    }

    #[tokio::test]
    async fn estimates_fee_from_gas_price_and_simulation() {
        let node = MockNode::start(|method, body| {
            let result = match method {
                "eth_gasPrice" => json!("0x3b9aca00"),
                "eth_estimateGas" => {
                    assert_eq!(body["params"][0]["from"], KEY_ADDRESS);
                    json!("0xfde8")
                }
                "eth_call" => json!(format!("0x{:064x}", 6)),
                other => panic!("unexpected call {other}"),
            };
            json!({"jsonrpc": "2.0", "id": 1, "result": result})
        })
        .await;
        let url = node.url();
        let token = Asset::Token { address: TOKEN.to_string() };
        let mut order = TransferOrder {
            chain: ChainId::Eth,
            asset: &Asset::Native,
            destination: DEST,
            amount: dec("0.5"),
            rpc_url: &url,
            evm_chain_id: None,
        };

        // no sender: the configured limit at 1.2 gwei
        let native = adapter().estimate_fee(&order, None).await.unwrap();
        assert_eq!(native.units, Some(21_000));
        assert_eq!(native.unit_price, Some(dec("0.0000000012")));
        assert_eq!(native.fee, dec("0.0000252"));
        assert_eq!(node.hits("eth_estimateGas"), 0);

        order.asset = &token;
        let erc20 = adapter().estimate_fee(&order, Some(KEY_ADDRESS)).await.unwrap();
        assert_eq!(erc20.units, Some(65_000));
        assert_eq!(erc20.fee, dec("0.000078"));
        assert_eq!(erc20.max_fee, Some(dec("0.00012")));
    }

    #[tokio::test]
    async fn oversized_balance_reports_out_of_range() {
        let node = MockNode::start(|_, _| {
            json!({"jsonrpc": "2.0", "id": 1, "result": format!("0x1{}", "0".repeat(40))})
        })
        .await;

        let err = adapter()
            .balance(ChainId::Eth, &node.url(), DEST, &Asset::Native)
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::OutOfRange(_)), "{err}");
        assert!(err.to_string().starts_with("balance"));
    }

    #[tokio::test]
    async fn reads_receipt_status_and_fee() {
        let node = MockNode::start(|_, body| {
            let result = match body["params"][0].as_str() {
                Some("0xok") => json!({
                    "status": "0x1",
                    "gasUsed": "0x5208",
                    "effectiveGasPrice": "0x3b9aca00",
                    "blockNumber": "0x10"
                }),
                Some("0xbad") => json!({"status": "0x0", "blockNumber": "0x11"}),
                _ => Value::Null,
            };
            json!({"jsonrpc": "2.0", "id": 1, "result": result})
        })
        .await;
        let adapter = adapter();

        let ok = adapter.check_receipt(ChainId::Eth, &node.url(), "0xok").await.unwrap();
        assert_eq!(
            ok,
            ReceiptCheck::Final(Receipt {
                status: TerminalStatus::Confirmed,
                fee: Some(dec("0.000021")),
                block: Some("16".to_string()),
                provisional: false,
            })
        );

        let bad = adapter.check_receipt(ChainId::Eth, &node.url(), "0xbad").await.unwrap();
        assert!(matches!(
            bad,
            ReceiptCheck::Final(Receipt { status: TerminalStatus::Failed, fee: None, .. })
        ));

        let missing = adapter.check_receipt(ChainId::Eth, &node.url(), "0xnone").await.unwrap();
        assert_eq!(missing, ReceiptCheck::Pending);
    }
}
