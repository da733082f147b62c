//! Process-local stores backing the action hooks and the reconciliation
//! engine.
//!
//! Everything here is process-lifetime state: nothing survives a
//! restart, after which claims re-derive their true state from the
//! indexer. Stores are injected rather than kept as module singletons so
//! tests can build a fresh one per case.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use verity_types::Hex;

pub mod memory;

pub use memory::{MemoryActionLog, MemoryMarkers};

/// Claim texts this user has attempted to create during this process
/// lifetime. An entry suppresses duplicate "create" affordances while a
/// submission is in flight or awaiting indexing; commitment supersedes
/// an entry but does not remove it.
///
/// Keys are normalized claim text (see `verity_types::normalize_text`).
#[async_trait]
pub trait SessionMarkers: Send + Sync {
    async fn mark(&self, text: &str);
    async fn contains(&self, text: &str) -> bool;
    /// Drop all markers. Intended for tests.
    async fn clear(&self);
}

/// What a logged submission attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Approve,
    CreateClaim,
    CreateLink,
    Stake,
    Withdraw,
}

/// One relay submission, recorded at the action-hook boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    pub kind: ActionKind,
    /// Claim text for creates, post id rendered as text for stakes.
    pub subject: String,
    pub tx_hash: Option<Hex>,
    pub error: Option<String>,
    pub created_at: u64,
}

/// History of relay submissions made by this process.
#[async_trait]
pub trait ActionLog: Send + Sync {
    async fn record(&self, record: ActionRecord);
    async fn list(&self) -> Vec<ActionRecord>;
}
