//! Relay protocol: fee-less, signature-authorized transactions.
//!
//! - Build ABI calldata for registry / stake-engine / token calls
//! - Fetch the next replay-protection nonce from the relay
//! - Sign a `ForwardRequest` envelope and submit it in one attempt

use serde::{Deserialize, Serialize};
use verity_types::{ClaimSnapshot, Hex};

pub mod calldata;
pub mod client;
pub mod sender;

pub use client::RelayClient;
pub use sender::{MetaTxSender, Relayer};

/// Envelope expiry window: seconds from signing to the relay deadline.
/// An envelope not submitted within this window is discarded, not resent.
pub const DEADLINE_WINDOW_SECS: u64 = 300;

/// Per-action gas limits forwarded to the relay.
pub mod gas {
    pub const APPROVE: u64 = 100_000;
    pub const CREATE_CLAIM: u64 = 400_000;
    pub const CREATE_LINK: u64 = 500_000;
    pub const STAKE: u64 = 400_000;
    pub const WITHDRAW: u64 = 300_000;
}

/// Relay response after a successful submission.
///
/// `entity` is a best-effort snapshot of the affected claim, present only
/// when the relay can determine it synchronously (fast-path confirmation).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayReceipt {
    #[serde(default = "default_ok")]
    pub ok: bool,
    pub tx_hash: Hex,
    #[serde(default)]
    pub entity: Option<ClaimSnapshot>,
}

fn default_ok() -> bool {
    true
}

/// Current unix time in seconds.
pub(crate) fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
