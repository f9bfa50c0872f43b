//! Chain and asset identifiers shared by every layer

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported chains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainId {
    Eth,
    Bsc,
    Base,
    Polygon,
    Solana,
    Tron,
}

/// Chain families; one adapter implementation per family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainFamily {
    Evm,
    Solana,
    Tron,
}

impl ChainId {
    pub const ALL: [ChainId; 6] = [
        ChainId::Eth,
        ChainId::Bsc,
        ChainId::Base,
        ChainId::Polygon,
        ChainId::Solana,
        ChainId::Tron,
    ];

    pub fn family(self) -> ChainFamily {
        match self {
            ChainId::Eth | ChainId::Bsc | ChainId::Base | ChainId::Polygon => ChainFamily::Evm,
            ChainId::Solana => ChainFamily::Solana,
            ChainId::Tron => ChainFamily::Tron,
        }
    }

    /// Price symbol of the chain's native coin
    pub fn native_symbol(self) -> &'static str {
        match self {
            ChainId::Eth | ChainId::Base => "eth",
            ChainId::Bsc => "bnb",
            ChainId::Polygon => "matic",
            ChainId::Solana => "sol",
            ChainId::Tron => "trx",
        }
    }

    /// EIP-155 chain id of the mainnet, EVM chains only
    pub fn evm_mainnet_id(self) -> Option<u64> {
        match self {
            ChainId::Eth => Some(1),
            ChainId::Bsc => Some(56),
            ChainId::Base => Some(8453),
            ChainId::Polygon => Some(137),
            ChainId::Solana | ChainId::Tron => None,
        }
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainId::Eth => write!(f, "eth"),
            ChainId::Bsc => write!(f, "bsc"),
            ChainId::Base => write!(f, "base"),
            ChainId::Polygon => write!(f, "polygon"),
            ChainId::Solana => write!(f, "solana"),
            ChainId::Tron => write!(f, "tron"),
        }
    }
}

impl fmt::Display for ChainFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainFamily::Evm => write!(f, "evm"),
            ChainFamily::Solana => write!(f, "solana"),
            ChainFamily::Tron => write!(f, "tron"),
        }
    }
}

/// Error returned for chain names nobody recognises
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unsupported chain: {0}")]
pub struct UnknownChain(pub String);

impl FromStr for ChainId {
    type Err = UnknownChain;

    /// Accepts the canonical names plus the aliases callers use
    /// ("bnb", "sol", "trx", ...). Normalisation happens here, once.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "eth" | "ethereum" => Ok(ChainId::Eth),
            "bsc" | "bnb" => Ok(ChainId::Bsc),
            "base" => Ok(ChainId::Base),
            "polygon" | "matic" => Ok(ChainId::Polygon),
            "sol" | "solana" => Ok(ChainId::Solana),
            "trx" | "tron" => Ok(ChainId::Tron),
            other => Err(UnknownChain(other.to_string())),
        }
    }
}

/// What is being moved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Native,
    Token,
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetKind::Native => write!(f, "native"),
            AssetKind::Token => write!(f, "token"),
        }
    }
}

/// Asset reference carried through the adapters
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Asset {
    Native,
    /// Contract (EVM/Tron) or mint (Solana) address
    Token { address: String },
}

impl Asset {
    pub fn kind(&self) -> AssetKind {
        match self {
            Asset::Native => AssetKind::Native,
            Asset::Token { .. } => AssetKind::Token,
        }
    }

    pub fn token_address(&self) -> Option<&str> {
        match self {
            Asset::Native => None,
            Asset::Token { address } => Some(address),
        }
    }
}
