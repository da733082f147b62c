//! Read side of the ledger: the background indexer's polling API.
//!
//! The indexer is the sole source of truth for committed claims. Reads:
//! - `claim-status` keyed by normalized claim text (pre-commitment identity)
//! - `edges` keyed by post id (committed identity)
//!
//! Indexing lags the chain, so a bounded poll loop bridges the gap
//! between "submitted" and "observed".

pub mod client;

pub use client::{Edge, EdgeSet, IndexerClient};

/// Bounded-poll settings for commit confirmation.
///
/// Exhausting the budget is not a hard failure; the claim is re-checked
/// on the next user-triggered refresh instead of polling forever.
#[derive(Debug, Clone)]
pub struct PollConfig {
    pub attempts: u32,
    pub interval_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            attempts: 5,
            interval_ms: 2_000,
        }
    }
}
