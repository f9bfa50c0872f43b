//! Wallet address validation
//!
//! Purely syntactic: no network call is made and a valid result says nothing
//! about whether the address exists or can receive funds.

use crate::chain::{ChainFamily, ChainId};
use tracing::{debug, warn};

const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Validate `address` against the grammar of `chain`.
///
/// Returns `(is_valid, normalized_chain)`. Unknown chains yield
/// `(false, None)`; a known chain with a bad address yields
/// `(false, Some(chain))`.
pub fn validate(chain: &str, address: &str) -> (bool, Option<ChainId>) {
    let address = address.trim();
    let Some(chain_id) = resolve_chain(chain) else {
        warn!(chain = %chain, "Unknown chain for address validation");
        return (false, None);
    };

    (is_valid_for(chain_id.family(), address), Some(chain_id))
}

/// Grammar check for an already-resolved chain family
pub fn is_valid_for(family: ChainFamily, address: &str) -> bool {
    let address = address.trim();
    let valid = match family {
        ChainFamily::Evm => is_evm_address(&normalize_evm(address)),
        ChainFamily::Solana => is_solana_address(address),
        ChainFamily::Tron => is_tron_address(address),
    };

    if !valid {
        debug!(family = %family, address = %address, "Address rejected by grammar check");
    }
    valid
}

/// Transaction handle grammar: EVM `0x` + 64 hex, Tron 64 hex, Solana a
/// base58 signature of 64 bytes
pub fn is_valid_tx_handle(family: ChainFamily, handle: &str) -> bool {
    let handle = handle.trim();
    match family {
        ChainFamily::Evm => handle.strip_prefix("0x").is_some_and(is_hash_hex),
        ChainFamily::Tron => is_hash_hex(handle),
        ChainFamily::Solana => bs58::decode(handle)
            .into_vec()
            .is_ok_and(|bytes| bytes.len() == 64),
    }
}

fn is_hash_hex(body: &str) -> bool {
    body.len() == 64 && body.chars().all(|c| c.is_ascii_hexdigit())
}

/// Add the `0x` prefix when missing
pub fn normalize_evm(address: &str) -> String {
    let address = address.trim();
    if address.starts_with("0x") {
        address.to_string()
    } else {
        format!("0x{}", address)
    }
}

/// Chain names accepted by the validator. Besides the chain aliases this
/// includes the EVM-hosted stablecoin names, which map to Ethereum.
fn resolve_chain(chain: &str) -> Option<ChainId> {
    match chain.trim().to_lowercase().as_str() {
        "usdt" | "usdc" => Some(ChainId::Eth),
        other => other.parse().ok(),
    }
}

fn is_evm_address(address: &str) -> bool {
    match address.strip_prefix("0x") {
        Some(body) => body.len() == 40 && body.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

fn is_solana_address(address: &str) -> bool {
    (32..=44).contains(&address.len()) && address.chars().all(|c| BASE58_ALPHABET.contains(c))
}

fn is_tron_address(address: &str) -> bool {
    match address.strip_prefix('T') {
        Some(body) => body.len() == 33 && body.chars().all(|c| c.is_ascii_alphanumeric()),
        None => false,
    }
}
