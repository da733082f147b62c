use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 0x-prefixed hex string (e.g. "0x1234...").
pub type Hex = String;

/// 0x-prefixed, lowercase 20-byte account address.
pub type Address = String;

/// Verity client SDK error types.
#[derive(Debug, Error)]
pub enum VerityError {
    #[error("wallet not connected")]
    WalletNotConnected,

    #[error("signature request rejected")]
    SigningRejected,

    #[error("nonce unavailable: {0}")]
    NonceUnavailable(String),

    #[error("relay unavailable: {0}")]
    RelayUnavailable(String),

    #[error("relay rejected request: {0}")]
    RelayRejected(String),

    #[error("insufficient allowance: have {have} wei, need {need} wei")]
    InsufficientAllowance { have: u128, need: u128 },

    #[error("insufficient balance: have {have} wei, need {need} wei")]
    InsufficientBalance { have: u128, need: u128 },

    #[error("claim not confirmed after {0} poll attempts")]
    PollTimeout(u32),

    #[error("indexer unavailable: {0}")]
    IndexerUnavailable(String),

    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("{0}")]
    Other(String),
}

impl VerityError {
    /// Whether the whole user action can be retried as-is (fresh nonce,
    /// fresh signature). Rejected envelopes and rejected signatures
    /// require the user to re-initiate the action instead.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            VerityError::NonceUnavailable(_)
                | VerityError::RelayUnavailable(_)
                | VerityError::IndexerUnavailable(_)
                | VerityError::PollTimeout(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, VerityError>;

/// A signed meta-transaction envelope executed by the relay on the user's
/// behalf. Field order matches the EIP-712 struct the forwarder verifies;
/// reordering fields invalidates signatures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForwardRequest {
    pub from: Address,
    pub to: Address,
    pub value: u128,
    pub gas: u64,
    pub nonce: u64,
    pub deadline: u64,
    pub data: Hex,
}

/// Which side of a claim a stake backs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StakeSide {
    Support,
    Challenge,
}

impl StakeSide {
    /// Wire encoding used by the stake engine contract.
    pub fn as_u8(self) -> u8 {
        match self {
            StakeSide::Support => 0,
            StakeSide::Challenge => 1,
        }
    }
}

/// Ledger identity of a committed claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnChainRef {
    pub post_id: u64,
    #[serde(default)]
    pub creator: Option<Address>,
}

/// One indexer read of a claim's authoritative state.
///
/// Stake fields are raw server values; dust normalization is applied only
/// at display time (see [`dust::clean`]), never here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ClaimSnapshot {
    #[serde(default)]
    pub on_chain: Option<OnChainRef>,
    #[serde(default)]
    pub stake_support: f64,
    #[serde(default)]
    pub stake_challenge: f64,
    #[serde(default)]
    pub verity_score: f64,
    #[serde(default)]
    pub user_support: f64,
    #[serde(default)]
    pub user_challenge: f64,
}

impl ClaimSnapshot {
    pub fn post_id(&self) -> Option<u64> {
        self.on_chain.as_ref().map(|oc| oc.post_id)
    }
}

/// Normalize claim text for keying: trim and collapse inner whitespace.
/// Claims are identified by this form until the ledger assigns a post id.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse a hex string to a byte array.
pub fn hex_to_bytes(hex_str: &str) -> Result<Vec<u8>> {
    let hex_str = hex_str.strip_prefix("0x").unwrap_or(hex_str);
    hex::decode(hex_str).map_err(|e| VerityError::InvalidHex(e.to_string()))
}

/// Convert bytes to a 0x-prefixed hex string.
pub fn bytes_to_hex(bytes: &[u8]) -> Hex {
    format!("0x{}", hex::encode(bytes))
}

/// Parse a 0x-prefixed address into its 20 raw bytes.
pub fn address_to_bytes(address: &str) -> Result<[u8; 20]> {
    let bytes = hex_to_bytes(address)?;
    bytes
        .try_into()
        .map_err(|_| VerityError::InvalidAddress(address.to_string()))
}

pub mod dust {
    /// Stakes below this magnitude are displayed as zero.
    pub const DUST: f64 = 0.001;

    /// View-layer dust rule: values within `DUST` of zero compare and
    /// display as exactly zero. The stored value is never modified.
    pub fn clean(n: f64) -> f64 {
        if n.abs() < DUST {
            0.0
        } else {
            n
        }
    }

    /// Whether a stake amount is non-zero after dust normalization.
    pub fn is_nonzero(n: f64) -> bool {
        clean(n) != 0.0
    }
}

pub mod units {
    /// Token base-unit scale (18 decimals).
    pub const WEI_PER_TOKEN: u128 = 1_000_000_000_000_000_000;

    /// Convert a display amount to base units, rounding to the nearest wei.
    pub fn to_wei(amount: f64) -> u128 {
        (amount * WEI_PER_TOKEN as f64).round() as u128
    }

    /// Convert base units to a display amount.
    pub fn from_wei(wei: u128) -> f64 {
        wei as f64 / WEI_PER_TOKEN as f64
    }
}
