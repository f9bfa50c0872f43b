//! Block explorer links for submitted transactions (display only)

use crate::chain::ChainId;

/// Build a human-viewable link for `tx_hash`.
///
/// Unrecognised chains fall back to the bare hash.
pub fn explorer_url(chain: &str, tx_hash: &str, devnet: bool) -> String {
    match chain.parse::<ChainId>() {
        Ok(chain) => chain_explorer_url(chain, tx_hash, devnet),
        Err(_) => tx_hash.to_string(),
    }
}

pub fn chain_explorer_url(chain: ChainId, tx_hash: &str, devnet: bool) -> String {
    match chain {
        ChainId::Solana if devnet => {
            format!("https://explorer.solana.com/tx/{}?cluster=devnet", tx_hash)
        }
        ChainId::Solana => format!("https://solscan.io/tx/{}", tx_hash),
        ChainId::Eth => format!("https://etherscan.io/tx/{}", tx_hash),
        ChainId::Bsc => format!("https://bscscan.com/tx/{}", tx_hash),
        ChainId::Base => format!("https://basescan.org/tx/{}", tx_hash),
        ChainId::Polygon => format!("https://polygonscan.com/tx/{}", tx_hash),
        ChainId::Tron => format!("https://tronscan.org/#/transaction/{}", tx_hash),
    }
}

/// Whether an RPC endpoint points at Solana devnet
pub fn is_devnet_endpoint(rpc_url: &str) -> bool {
    rpc_url.to_lowercase().contains("devnet")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_chain_templates() {
        assert_eq!(explorer_url("eth", "0xabc", false), "https://etherscan.io/tx/0xabc");
        assert_eq!(explorer_url("bnb", "0xabc", false), "https://bscscan.com/tx/0xabc");
        assert_eq!(
            explorer_url("trx", "ff00", false),
            "https://tronscan.org/#/transaction/ff00"
        );
        assert_eq!(explorer_url("sol", "5sig", false), "https://solscan.io/tx/5sig");
        assert_eq!(
            explorer_url("sol", "5sig", true),
            "https://explorer.solana.com/tx/5sig?cluster=devnet"
        );
    }

    #[test]
    fn unknown_chain_falls_back_to_hash() {
        assert_eq!(explorer_url("ton", "abc", false), "abc");
    }

    #[test]
    fn devnet_detection() {
        assert!(is_devnet_endpoint("https://api.devnet.solana.com"));
        assert!(!is_devnet_endpoint("https://api.mainnet-beta.solana.com"));
    }
}
