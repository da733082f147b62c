//! Per-claim merged view: one record per claim, replaced whole.

use serde::Serialize;
use verity_types::{dust, Address, ClaimSnapshot, StakeSide};

/// Commitment lifecycle of a claim, as shown to the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// First render; no server knowledge yet.
    Local,
    /// A status fetch is in flight.
    Fetching,
    /// The indexer knows no post id for this text; "create" may be offered.
    Uncommitted,
    /// A create was submitted but the indexer has not observed it yet.
    PendingCreate,
    /// The ledger assigned a post id. Terminal for commitment: a claim
    /// never leaves the committed family again.
    Committed,
    /// Committed, with a stake submission in flight.
    Staking,
    /// Committed, with a withdrawal in flight.
    Unstaking,
}

impl Phase {
    pub fn is_committed(self) -> bool {
        matches!(self, Phase::Committed | Phase::Staking | Phase::Unstaking)
    }
}

/// The one authoritative record the UI reads for a claim.
///
/// Stake fields hold raw server values; the `display_*` accessors apply
/// the dust rule. Records are replaced whole on every update, so a
/// reader never observes half of one update and half of another.
#[derive(Debug, Clone, Serialize)]
pub struct ClaimView {
    /// Normalized claim text; the claim's identity before commitment.
    pub text: String,
    pub phase: Phase,
    pub post_id: Option<u64>,
    pub creator: Option<Address>,
    pub stake_support: f64,
    pub stake_challenge: f64,
    pub verity_score: f64,
    pub user_support: f64,
    pub user_challenge: f64,
    /// Bumped on every submitted mutation; polls started before the
    /// current value are stale and discarded on arrival.
    pub(crate) mutation_seq: u64,
    /// Last phase that was not `Fetching`; fetch failures fall back to
    /// this instead of whatever transient phase a concurrent fetch left.
    #[serde(skip)]
    pub(crate) settled_phase: Phase,
}

impl ClaimView {
    pub(crate) fn new_local(text: String) -> Self {
        Self {
            text,
            phase: Phase::Local,
            post_id: None,
            creator: None,
            stake_support: 0.0,
            stake_challenge: 0.0,
            verity_score: 0.0,
            user_support: 0.0,
            user_challenge: 0.0,
            mutation_seq: 0,
            settled_phase: Phase::Local,
        }
    }

    /// Whole-record merge of a server snapshot into this view.
    /// Commitment is monotonic: a snapshot without a post id never
    /// removes one already observed.
    pub(crate) fn merged_with(&self, snap: &ClaimSnapshot) -> Self {
        let mut next = self.clone();
        if let Some(oc) = &snap.on_chain {
            next.post_id = Some(oc.post_id);
            if oc.creator.is_some() {
                next.creator = oc.creator.clone();
            }
            next.phase = Phase::Committed;
        } else if next.post_id.is_some() {
            next.phase = Phase::Committed;
        } else if next.phase == Phase::PendingCreate {
            // Submitted but not yet indexed; do not revert.
        } else {
            next.phase = Phase::Uncommitted;
        }
        next.stake_support = snap.stake_support;
        next.stake_challenge = snap.stake_challenge;
        next.verity_score = snap.verity_score;
        next.user_support = snap.user_support;
        next.user_challenge = snap.user_challenge;
        next.settled_phase = next.phase;
        next
    }

    pub fn is_committed(&self) -> bool {
        self.phase.is_committed()
    }

    // Dust-normalized accessors for display and UI decisions.

    pub fn display_support(&self) -> f64 {
        dust::clean(self.stake_support)
    }

    pub fn display_challenge(&self) -> f64 {
        dust::clean(self.stake_challenge)
    }

    pub fn display_user_stake(&self, side: StakeSide) -> f64 {
        match side {
            StakeSide::Support => dust::clean(self.user_support),
            StakeSide::Challenge => dust::clean(self.user_challenge),
        }
    }

    /// "Unstake" is offered only for a committed claim with a
    /// non-dust stake on that side.
    pub fn can_unstake(&self, side: StakeSide) -> bool {
        self.is_committed() && dust::is_nonzero(self.display_user_stake(side))
    }

    /// "Create on-chain" is offered only once the first fetch has
    /// settled and neither the ledger nor this session knows the claim.
    pub fn can_create(&self) -> bool {
        self.phase == Phase::Uncommitted
    }
}
