//! Action hooks: create-claim, create-link, stake, withdraw, approve.
//!
//! Each action runs the allowance/balance pre-flight, then the relay
//! pipeline, and reports through a non-throwing [`ActionOutcome`] so one
//! failed action never disturbs the reconciliation of unrelated claims.

use std::sync::Arc;
use tracing::{debug, warn};

use verity_relay::{calldata, gas, RelayReceipt, Relayer};
use verity_store::{ActionKind, ActionLog, ActionRecord, SessionMarkers};
use verity_types::{units, Address, ClaimSnapshot, Hex, Result, StakeSide, VerityError};

pub mod token;

pub use token::{RpcTokenReader, TokenReader};

/// Fee charged by the registry for committing a claim or link: 1 token.
pub const POSTING_FEE_WEI: u128 = units::WEI_PER_TOKEN;

/// Approval ceiling: 1000 tokens, approved once instead of per-action.
///
/// This deliberately trades minimal token exposure for UX: a single
/// approval prompt covers many subsequent actions. Exact-amount approval
/// would be safer but re-prompts on every spend.
pub const MAX_APPROVAL_WEI: u128 = 1_000 * units::WEI_PER_TOKEN;

/// Contract addresses actions are routed to. The forwarder itself is
/// the relayer's concern, bound into its signing domain.
#[derive(Debug, Clone)]
pub struct Deployment {
    pub token: Address,
    pub post_registry: Address,
    pub stake_engine: Address,
}

/// Result of one action, at the hook boundary.
///
/// Errors are carried as display strings rather than propagated: the
/// caller shows them next to the one affected claim and moves on.
#[derive(Debug, Clone, Default)]
pub struct ActionOutcome {
    pub tx_hash: Option<Hex>,
    /// Relay fast-path snapshot of the affected claim, when provided.
    pub entity: Option<ClaimSnapshot>,
    pub error: Option<String>,
    /// The action was not attempted because the spender allowance is
    /// short; an approval must confirm before retrying.
    pub needs_approval: bool,
}

impl ActionOutcome {
    fn accepted(receipt: RelayReceipt) -> Self {
        Self {
            tx_hash: Some(receipt.tx_hash),
            entity: receipt.entity,
            ..Default::default()
        }
    }

    fn failed(err: VerityError) -> Self {
        Self {
            needs_approval: matches!(err, VerityError::InsufficientAllowance { .. }),
            error: Some(err.to_string()),
            ..Default::default()
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Orchestrates value-moving user actions against the relay.
pub struct ActionsEngine {
    // None until a wallet is connected.
    relayer: Option<Arc<dyn Relayer>>,
    tokens: Arc<dyn TokenReader>,
    markers: Arc<dyn SessionMarkers>,
    log: Arc<dyn ActionLog>,
    deployment: Deployment,
}

impl ActionsEngine {
    pub fn new(
        relayer: Option<Arc<dyn Relayer>>,
        tokens: Arc<dyn TokenReader>,
        markers: Arc<dyn SessionMarkers>,
        log: Arc<dyn ActionLog>,
        deployment: Deployment,
    ) -> Self {
        Self {
            relayer,
            tokens,
            markers,
            log,
            deployment,
        }
    }

    fn relayer(&self) -> Result<&Arc<dyn Relayer>> {
        self.relayer.as_ref().ok_or(VerityError::WalletNotConnected)
    }

    async fn finish(
        &self,
        kind: ActionKind,
        subject: String,
        result: Result<RelayReceipt>,
    ) -> ActionOutcome {
        let outcome = match result {
            Ok(receipt) => ActionOutcome::accepted(receipt),
            Err(err) => {
                warn!(?kind, %subject, error = %err, "action failed");
                ActionOutcome::failed(err)
            }
        };
        self.log
            .record(ActionRecord {
                kind,
                subject,
                tx_hash: outcome.tx_hash.clone(),
                error: outcome.error.clone(),
                created_at: now_secs(),
            })
            .await;
        outcome
    }

    /// Approve the ceiling amount for a spender (registry or stake
    /// engine), as a relayed meta-transaction.
    pub async fn approve_spender(&self, spender: &Address) -> ActionOutcome {
        let result = self.relay_approve(spender).await;
        self.finish(ActionKind::Approve, spender.clone(), result).await
    }

    /// Commit a claim to the ledger.
    ///
    /// The session marker is set before submission so duplicate "create"
    /// affordances disappear immediately, and stays set even on failure:
    /// the submission may still land, and the next status fetch decides.
    pub async fn create_claim(&self, text: &str) -> ActionOutcome {
        self.markers.mark(text).await;
        let result = self.relay_create_claim(text).await;
        self.finish(ActionKind::CreateClaim, text.to_string(), result).await
    }

    /// Link two committed claims, optionally as a challenge.
    pub async fn create_link(
        &self,
        independent_post_id: u64,
        dependent_post_id: u64,
        is_challenge: bool,
    ) -> ActionOutcome {
        let result = self
            .relay_create_link(independent_post_id, dependent_post_id, is_challenge)
            .await;
        let subject = format!("{}->{}", independent_post_id, dependent_post_id);
        self.finish(ActionKind::CreateLink, subject, result).await
    }

    /// Stake tokens on one side of a committed claim.
    pub async fn stake(&self, post_id: u64, side: StakeSide, amount: f64) -> ActionOutcome {
        let result = self.relay_stake(post_id, side, amount).await;
        self.finish(ActionKind::Stake, post_id.to_string(), result).await
    }

    /// Withdraw part of the caller's stake. `lifo` selects which stake
    /// lots unwind first.
    pub async fn withdraw(
        &self,
        post_id: u64,
        side: StakeSide,
        amount: f64,
        lifo: bool,
    ) -> ActionOutcome {
        let result = self.relay_withdraw(post_id, side, amount, lifo).await;
        self.finish(ActionKind::Withdraw, post_id.to_string(), result).await
    }

    // ---- fallible inner flows ----

    async fn relay_approve(&self, spender: &Address) -> Result<RelayReceipt> {
        let relayer = self.relayer()?;
        let data = calldata::approve(spender, MAX_APPROVAL_WEI)?;
        relayer.send(&self.deployment.token, data, gas::APPROVE).await
    }

    async fn relay_create_claim(&self, text: &str) -> Result<RelayReceipt> {
        let relayer = self.relayer()?;
        let from = relayer.from_address();

        // Pre-flight: creation charges the posting fee. A short allowance
        // surfaces as "needs approval" and never reaches the relay.
        let allowance = self
            .tokens
            .allowance(&from, &self.deployment.post_registry)
            .await?;
        if allowance < POSTING_FEE_WEI {
            return Err(VerityError::InsufficientAllowance {
                have: allowance,
                need: POSTING_FEE_WEI,
            });
        }
        self.check_balance(&from, POSTING_FEE_WEI).await?;

        debug!(%text, "creating claim on-chain");
        relayer
            .send(
                &self.deployment.post_registry,
                calldata::create_claim(text),
                gas::CREATE_CLAIM,
            )
            .await
    }

    async fn relay_create_link(
        &self,
        independent_post_id: u64,
        dependent_post_id: u64,
        is_challenge: bool,
    ) -> Result<RelayReceipt> {
        let relayer = self.relayer()?;
        let from = relayer.from_address();

        // Links also pay the posting fee, but approve inline instead of
        // bouncing back to the caller.
        self.ensure_allowance(&from, &self.deployment.post_registry, POSTING_FEE_WEI)
            .await?;
        self.check_balance(&from, POSTING_FEE_WEI).await?;

        relayer
            .send(
                &self.deployment.post_registry,
                calldata::create_link(independent_post_id, dependent_post_id, is_challenge),
                gas::CREATE_LINK,
            )
            .await
    }

    async fn relay_stake(&self, post_id: u64, side: StakeSide, amount: f64) -> Result<RelayReceipt> {
        let relayer = self.relayer()?;
        if !amount.is_finite() || amount <= 0.0 {
            return Err(VerityError::Other(format!("invalid stake amount: {}", amount)));
        }
        let amount_wei = units::to_wei(amount);
        let from = relayer.from_address();

        self.ensure_allowance(&from, &self.deployment.stake_engine, amount_wei)
            .await?;
        self.check_balance(&from, amount_wei).await?;

        debug!(post_id, ?side, amount, "staking");
        relayer
            .send(
                &self.deployment.stake_engine,
                calldata::stake(post_id, side, amount_wei),
                gas::STAKE,
            )
            .await
    }

    async fn relay_withdraw(
        &self,
        post_id: u64,
        side: StakeSide,
        amount: f64,
        lifo: bool,
    ) -> Result<RelayReceipt> {
        let relayer = self.relayer()?;
        if !amount.is_finite() || amount <= 0.0 {
            return Err(VerityError::Other(format!("invalid withdraw amount: {}", amount)));
        }
        let amount_wei = units::to_wei(amount);

        // Withdrawals move tokens back to the user; no allowance needed.
        debug!(post_id, ?side, amount, "withdrawing stake");
        relayer
            .send(
                &self.deployment.stake_engine,
                calldata::withdraw(post_id, side, amount_wei, lifo),
                gas::WITHDRAW,
            )
            .await
    }

    /// Raise the spender allowance to the ceiling when it cannot cover
    /// `need`. The relay executes the approval before answering, so the
    /// dependent call can follow immediately.
    async fn ensure_allowance(&self, owner: &Address, spender: &Address, need: u128) -> Result<()> {
        let allowance = self.tokens.allowance(owner, spender).await?;
        if allowance >= need {
            return Ok(());
        }
        debug!(%spender, have = allowance, need, "raising allowance to ceiling");
        self.relay_approve(spender).await?;
        Ok(())
    }

    async fn check_balance(&self, owner: &Address, need: u128) -> Result<()> {
        let balance = self.tokens.balance(owner).await?;
        if balance < need {
            return Err(VerityError::InsufficientBalance {
                have: balance,
                need,
            });
        }
        Ok(())
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use verity_store::{MemoryActionLog, MemoryMarkers};

    const USER: &str = "0x1111111111111111111111111111111111111111";

    struct FakeTokens {
        allowance: u128,
        balance: u128,
    }

    #[async_trait]
    impl TokenReader for FakeTokens {
        async fn allowance(&self, _owner: &Address, _spender: &Address) -> Result<u128> {
            Ok(self.allowance)
        }
        async fn balance(&self, _owner: &Address) -> Result<u128> {
            Ok(self.balance)
        }
    }

    /// Records every send; answers with a fixed receipt or error.
    struct FakeRelayer {
        calls: Mutex<Vec<(Address, Hex, u64)>>,
        reject_with: Option<String>,
        entity: Option<ClaimSnapshot>,
    }

    impl FakeRelayer {
        fn accepting() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                reject_with: None,
                entity: None,
            }
        }

        fn sent(&self) -> Vec<(Address, Hex, u64)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Relayer for FakeRelayer {
        fn from_address(&self) -> Address {
            USER.to_string()
        }

        async fn send(&self, target: &Address, data: Hex, gas_limit: u64) -> Result<RelayReceipt> {
            self.calls
                .lock()
                .unwrap()
                .push((target.clone(), data, gas_limit));
            if let Some(detail) = &self.reject_with {
                return Err(VerityError::RelayRejected(detail.clone()));
            }
            Ok(RelayReceipt {
                ok: true,
                tx_hash: "0xfeed".into(),
                entity: self.entity.clone(),
            })
        }
    }

    fn deployment() -> Deployment {
        Deployment {
            token: "0x3333333333333333333333333333333333333333".into(),
            post_registry: "0x4444444444444444444444444444444444444444".into(),
            stake_engine: "0x5555555555555555555555555555555555555555".into(),
        }
    }

    struct Harness {
        engine: ActionsEngine,
        relayer: Arc<FakeRelayer>,
        markers: Arc<MemoryMarkers>,
        log: Arc<MemoryActionLog>,
    }

    fn harness(relayer: FakeRelayer, allowance: u128, balance: u128) -> Harness {
        let relayer = Arc::new(relayer);
        let markers = Arc::new(MemoryMarkers::new());
        let log = Arc::new(MemoryActionLog::new());
        let engine = ActionsEngine::new(
            Some(relayer.clone()),
            Arc::new(FakeTokens { allowance, balance }),
            markers.clone(),
            log.clone(),
            deployment(),
        );
        Harness {
            engine,
            relayer,
            markers,
            log,
        }
    }

    #[tokio::test]
    async fn short_allowance_surfaces_approval_without_spending() {
        let h = harness(FakeRelayer::accepting(), 0, 10 * units::WEI_PER_TOKEN);
        let outcome = h.engine.create_claim("Water boils at 100°C").await;

        assert!(outcome.needs_approval);
        assert!(outcome.tx_hash.is_none());
        // No spend transaction went out.
        assert!(h.relayer.sent().is_empty());
        // The marker was still set: the affordance stays suppressed while
        // the user approves and retries.
        assert!(h.markers.contains("Water boils at 100°C").await);
    }

    #[tokio::test]
    async fn create_claim_submits_when_preflight_passes() {
        let relayer = FakeRelayer {
            entity: Some(ClaimSnapshot {
                on_chain: Some(verity_types::OnChainRef {
                    post_id: 42,
                    creator: Some(USER.into()),
                }),
                ..Default::default()
            }),
            ..FakeRelayer::accepting()
        };
        let h = harness(relayer, MAX_APPROVAL_WEI, 10 * units::WEI_PER_TOKEN);
        let outcome = h.engine.create_claim("Water boils at 100°C").await;

        assert!(outcome.is_ok());
        assert_eq!(outcome.tx_hash.as_deref(), Some("0xfeed"));
        assert_eq!(outcome.entity.unwrap().post_id(), Some(42));

        let sent = h.relayer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, deployment().post_registry);
        assert_eq!(sent[0].2, gas::CREATE_CLAIM);

        let records = h.log.list().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, ActionKind::CreateClaim);
    }

    #[tokio::test]
    async fn insufficient_balance_blocks_submission() {
        let h = harness(FakeRelayer::accepting(), MAX_APPROVAL_WEI, 0);
        let outcome = h.engine.create_claim("some claim").await;

        assert!(!outcome.is_ok());
        assert!(!outcome.needs_approval);
        assert!(outcome.error.unwrap().contains("insufficient balance"));
        assert!(h.relayer.sent().is_empty());
    }

    #[tokio::test]
    async fn stake_auto_approves_then_stakes() {
        let h = harness(FakeRelayer::accepting(), 0, 10 * units::WEI_PER_TOKEN);
        let outcome = h.engine.stake(42, StakeSide::Support, 2.0).await;

        assert!(outcome.is_ok());
        let sent = h.relayer.sent();
        assert_eq!(sent.len(), 2);
        // Approval hits the token contract, the stake hits the engine.
        assert_eq!(sent[0].0, deployment().token);
        assert_eq!(sent[0].2, gas::APPROVE);
        assert_eq!(sent[1].0, deployment().stake_engine);
        assert_eq!(sent[1].2, gas::STAKE);
    }

    #[tokio::test]
    async fn withdraw_needs_no_allowance() {
        let h = harness(FakeRelayer::accepting(), 0, 0);
        let outcome = h.engine.withdraw(42, StakeSide::Challenge, 1.0, true).await;

        assert!(outcome.is_ok());
        let sent = h.relayer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].2, gas::WITHDRAW);
    }

    #[tokio::test]
    async fn create_link_auto_approves_posting_fee() {
        let h = harness(FakeRelayer::accepting(), 0, 10 * units::WEI_PER_TOKEN);
        let outcome = h.engine.create_link(7, 42, true).await;

        assert!(outcome.is_ok());
        let sent = h.relayer.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].0, deployment().post_registry);
        assert_eq!(sent[1].2, gas::CREATE_LINK);
    }

    #[tokio::test]
    async fn relay_rejection_becomes_error_string() {
        let relayer = FakeRelayer {
            reject_with: Some("deadline expired".into()),
            ..FakeRelayer::accepting()
        };
        let h = harness(relayer, MAX_APPROVAL_WEI, 10 * units::WEI_PER_TOKEN);
        let outcome = h.engine.stake(42, StakeSide::Support, 1.0).await;

        assert!(!outcome.is_ok());
        assert!(outcome.error.unwrap().contains("deadline expired"));

        let records = h.log.list().await;
        assert_eq!(records.len(), 1);
        assert!(records[0].error.is_some());
    }

    #[tokio::test]
    async fn no_wallet_means_wallet_not_connected() {
        let engine = ActionsEngine::new(
            None,
            Arc::new(FakeTokens {
                allowance: u128::MAX,
                balance: u128::MAX,
            }),
            Arc::new(MemoryMarkers::new()),
            Arc::new(MemoryActionLog::new()),
            deployment(),
        );

        let outcome = engine.stake(1, StakeSide::Support, 1.0).await;
        assert_eq!(outcome.error.as_deref(), Some("wallet not connected"));
    }

    #[tokio::test]
    async fn rejected_stake_amounts_never_reach_the_relay() {
        let h = harness(
            FakeRelayer::accepting(),
            MAX_APPROVAL_WEI,
            10 * units::WEI_PER_TOKEN,
        );
        assert!(!h.engine.stake(42, StakeSide::Support, 0.0).await.is_ok());
        assert!(!h.engine.stake(42, StakeSide::Support, -1.0).await.is_ok());
        assert!(!h.engine.stake(42, StakeSide::Support, f64::NAN).await.is_ok());
        assert!(h.relayer.sent().is_empty());
    }
}
