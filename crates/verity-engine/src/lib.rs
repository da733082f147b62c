//! Reconciliation engine: one truthful view per claim.
//!
//! Three state sources feed each claim's view: the server snapshot
//! fetched on mount, the optimistic transition applied when the user
//! submits a mutation, and the poll results that eventually confirm it.
//! The engine merges them under a single rule: the server wins once its
//! read is more recent than the optimistic mutation, and never before.
//!
//! Every update replaces the claim's record whole; concurrent updates to
//! different claims cannot touch each other's records.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

use verity_indexer::{IndexerClient, PollConfig};
use verity_store::SessionMarkers;
use verity_types::{normalize_text, Address, ClaimSnapshot, Result, VerityError};

pub mod view;

pub use view::{ClaimView, Phase};

/// Where authoritative claim state comes from. Implemented by the
/// indexer client; tests script their own.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn claim_status(&self, text: &str, user: Option<&Address>) -> Result<ClaimSnapshot>;
}

#[async_trait]
impl StatusSource for IndexerClient {
    async fn claim_status(&self, text: &str, user: Option<&Address>) -> Result<ClaimSnapshot> {
        IndexerClient::claim_status(self, text, user).await
    }
}

/// Proof that a mutation was registered; settlement results are applied
/// only while this is still the claim's latest mutation.
#[derive(Debug, Clone)]
pub struct MutationTicket {
    key: String,
    seq: u64,
    pub post_id: u64,
}

#[derive(Default)]
struct State {
    // keyed by normalized claim text, the pre-commitment identity
    views: HashMap<String, ClaimView>,
    // committed identity -> text key
    posts: HashMap<u64, String>,
}

/// Per-claim state machine over all tracked claims.
pub struct ReconcileEngine {
    source: Arc<dyn StatusSource>,
    markers: Arc<dyn SessionMarkers>,
    user: Option<Address>,
    poll: PollConfig,
    state: Mutex<State>,
}

impl ReconcileEngine {
    pub fn new(
        source: Arc<dyn StatusSource>,
        markers: Arc<dyn SessionMarkers>,
        user: Option<Address>,
        poll: PollConfig,
    ) -> Self {
        Self {
            source,
            markers,
            user,
            poll,
            state: Mutex::new(State::default()),
        }
    }

    /// Register a claim surfaced by search or interpretation results.
    /// A claim this session already tried to create re-enters
    /// `PendingCreate` rather than offering "create" again.
    pub async fn track(&self, text: &str) -> ClaimView {
        let key = normalize_text(text);
        let marked = self.markers.contains(&key).await;

        let mut st = self.state.lock().unwrap();
        let view = st
            .views
            .entry(key.clone())
            .or_insert_with(|| ClaimView::new_local(key.clone()));
        if marked && view.phase == Phase::Local {
            view.phase = Phase::PendingCreate;
            view.settled_phase = Phase::PendingCreate;
        }
        view.clone()
    }

    /// Current view of a claim, by text.
    pub fn view(&self, text: &str) -> Option<ClaimView> {
        let key = normalize_text(text);
        let st = self.state.lock().unwrap();
        st.views.get(&key).cloned()
    }

    /// Current view of a committed claim, by post id.
    pub fn view_by_post(&self, post_id: u64) -> Option<ClaimView> {
        let st = self.state.lock().unwrap();
        let key = st.posts.get(&post_id)?;
        st.views.get(key).cloned()
    }

    /// One status fetch against the indexer; enters `Fetching` for its
    /// duration. A fetch error leaves the previous view intact.
    ///
    /// While a stake or withdrawal is in flight the fetch is skipped
    /// entirely: the indexer would answer with pre-mutation totals, and
    /// the mutation's own settlement refreshes the view.
    pub async fn refresh(&self, text: &str) -> Result<ClaimView> {
        let key = normalize_text(text);

        let (seq, prev_phase) = {
            let mut st = self.state.lock().unwrap();
            let view = st
                .views
                .entry(key.clone())
                .or_insert_with(|| ClaimView::new_local(key.clone()));
            if matches!(view.phase, Phase::Staking | Phase::Unstaking) {
                debug!(claim = %key, "mutation in flight, refresh deferred to settlement");
                return Ok(view.clone());
            }
            let prev = view.settled_phase;
            view.phase = Phase::Fetching;
            (view.mutation_seq, prev)
        };

        match self.source.claim_status(&key, self.user.as_ref()).await {
            Ok(snap) => self.apply(&key, &snap, seq, Some(prev_phase), false).await,
            Err(e) => {
                warn!(claim = %key, error = %e, "status fetch failed, keeping previous view");
                let mut st = self.state.lock().unwrap();
                if let Some(view) = st.views.get_mut(&key) {
                    if view.mutation_seq == seq && view.phase == Phase::Fetching {
                        view.phase = view.settled_phase;
                    }
                }
                Err(e)
            }
        }
    }

    /// Record a submitted create: the claim shows as pending
    /// synchronously, before any network response exists.
    pub async fn note_create_submitted(&self, text: &str) -> ClaimView {
        let key = normalize_text(text);
        self.markers.mark(&key).await;

        let mut st = self.state.lock().unwrap();
        let view = st
            .views
            .entry(key.clone())
            .or_insert_with(|| ClaimView::new_local(key.clone()));
        view.mutation_seq += 1;
        if !view.is_committed() {
            view.phase = Phase::PendingCreate;
            view.settled_phase = Phase::PendingCreate;
        }
        view.clone()
    }

    /// Bounded poll until the indexer observes the created claim. On
    /// budget exhaustion the claim stays `PendingCreate` ("still
    /// confirming") and is re-checked on the next refresh.
    ///
    /// Dropping the returned future cancels the loop; no further polls
    /// fire and the view keeps its last state.
    pub async fn confirm_create(&self, text: &str) -> Result<ClaimView> {
        let key = normalize_text(text);

        for attempt in 0..self.poll.attempts {
            tokio::time::sleep(Duration::from_millis(self.poll.interval_ms)).await;

            let seq = {
                let st = self.state.lock().unwrap();
                st.views.get(&key).map(|v| v.mutation_seq).unwrap_or(0)
            };

            match self.source.claim_status(&key, self.user.as_ref()).await {
                Ok(snap) if snap.post_id().is_some() => {
                    let view = self.apply(&key, &snap, seq, None, false).await?;
                    if view.is_committed() {
                        debug!(claim = %key, attempt, post_id = view.post_id, "create confirmed");
                        return Ok(view);
                    }
                }
                Ok(_) => debug!(claim = %key, attempt, "not yet indexed"),
                Err(e) => debug!(claim = %key, attempt, error = %e, "confirm poll failed"),
            }
        }
        Err(VerityError::PollTimeout(self.poll.attempts))
    }

    /// Record a submitted stake: the claim enters `Staking` until its
    /// settlement lands.
    pub fn note_stake_submitted(&self, post_id: u64) -> Result<MutationTicket> {
        self.note_mutation(post_id, Phase::Staking)
    }

    /// Record a submitted withdrawal: the claim enters `Unstaking`.
    pub fn note_withdraw_submitted(&self, post_id: u64) -> Result<MutationTicket> {
        self.note_mutation(post_id, Phase::Unstaking)
    }

    fn note_mutation(&self, post_id: u64, phase: Phase) -> Result<MutationTicket> {
        let mut st = self.state.lock().unwrap();
        let key = st
            .posts
            .get(&post_id)
            .cloned()
            .ok_or_else(|| VerityError::Other(format!("unknown post id {}", post_id)))?;
        let view = st
            .views
            .get_mut(&key)
            .ok_or_else(|| VerityError::Other(format!("no view for post id {}", post_id)))?;
        view.mutation_seq += 1;
        view.phase = phase;
        view.settled_phase = phase;
        Ok(MutationTicket {
            key,
            seq: view.mutation_seq,
            post_id,
        })
    }

    /// Fast-path settlement: apply the snapshot the relay returned with
    /// its receipt. Ignored if a newer mutation has been submitted since
    /// the ticket was issued; that mutation's own settlement will land.
    pub async fn apply_entity(
        &self,
        ticket: &MutationTicket,
        entity: &ClaimSnapshot,
    ) -> Result<ClaimView> {
        self.apply(&ticket.key, entity, ticket.seq, None, true).await
    }

    /// Fallback settlement: re-fetch from the indexer and re-enter
    /// `Committed` with refreshed totals. Abandoning the initiating
    /// dialog does not matter; the engine applies the result regardless.
    pub async fn settle(&self, ticket: &MutationTicket) -> Result<ClaimView> {
        let snap = self
            .source
            .claim_status(&ticket.key, self.user.as_ref())
            .await?;
        self.apply(&ticket.key, &snap, ticket.seq, None, true).await
    }

    /// Whole-record merge, guarded two ways: a snapshot whose originating
    /// fetch predates the latest mutation is stale and discarded, and a
    /// non-settlement snapshot never lands on a `Staking`/`Unstaking`
    /// view, since the indexer answers with pre-mutation totals until the
    /// mutation is indexed. Only the mutation's own settlement
    /// (`apply_entity`/`settle`) re-enters `Committed`.
    async fn apply(
        &self,
        key: &str,
        snap: &ClaimSnapshot,
        seq_at_start: u64,
        prev_phase: Option<Phase>,
        settlement: bool,
    ) -> Result<ClaimView> {
        let (view, committed) = {
            let mut st = self.state.lock().unwrap();
            let view = st
                .views
                .get(key)
                .cloned()
                .ok_or_else(|| VerityError::Other(format!("claim not tracked: {}", key)))?;

            if view.mutation_seq != seq_at_start {
                debug!(claim = %key, "discarding stale snapshot");
                return Ok(view);
            }
            if !settlement && matches!(view.phase, Phase::Staking | Phase::Unstaking) {
                debug!(claim = %key, "mutation unsettled, discarding snapshot");
                return Ok(view);
            }

            let mut base = view;
            if let Some(prev) = prev_phase {
                base.phase = prev;
            }
            let merged = base.merged_with(snap);
            if let Some(post_id) = merged.post_id {
                st.posts.insert(post_id, key.to_string());
            }
            let committed = merged.is_committed();
            st.views.insert(key.to_string(), merged.clone());
            (merged, committed)
        };

        // Commitment supersedes the session marker; keeping it set means
        // a remount still suppresses the "create" affordance.
        if committed {
            self.markers.mark(key).await;
        }
        Ok(view)
    }
}
