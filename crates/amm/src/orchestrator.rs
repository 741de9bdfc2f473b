//! Transaction Orchestration
//!
//! Drives a user action (swap, add liquidity, remove liquidity) through
//! planning, approvals, execution, and confirmation as an explicit state
//! machine. One action of a given kind at a time; a failure at any step is
//! terminal for the action and retry is always a fresh submission.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;

use evm_node_client::ChainClient;
use minidex_core::{Address, Amount, ContractsConfig, Error, Result, TxHash, ValidationError};

use crate::allowance::needs_approval;
use crate::fetch::StateAggregator;

/// Action discriminant, used for in-flight bookkeeping and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Swap,
    AddLiquidity,
    RemoveLiquidity,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Swap => "swap",
            Self::AddLiquidity => "add_liquidity",
            Self::RemoveLiquidity => "remove_liquidity",
        }
    }
}

/// A fully specified user action. Amounts are in smallest units; `min_out`
/// for swaps is the slippage-protected bound the caller computed from a
/// quote.
#[derive(Debug, Clone)]
pub enum Action {
    Swap {
        amount_in: Amount,
        min_out: Amount,
        token_in: Address,
        token_out: Address,
        to: Address,
    },
    AddLiquidity {
        token_a: Address,
        token_b: Address,
        amount_a: Amount,
        amount_b: Amount,
        to: Address,
    },
    RemoveLiquidity {
        token_a: Address,
        token_b: Address,
        /// The pair contract, which is also the LP token being spent.
        pair: Address,
        liquidity: Amount,
        to: Address,
    },
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::Swap { .. } => ActionKind::Swap,
            Self::AddLiquidity { .. } => ActionKind::AddLiquidity,
            Self::RemoveLiquidity { .. } => ActionKind::RemoveLiquidity,
        }
    }

    /// The (token, amount) requirements the router must be allowed to
    /// spend, in approval order.
    fn spending(&self) -> Vec<(Address, Amount)> {
        match self {
            Self::Swap {
                amount_in, token_in, ..
            } => vec![(token_in.clone(), *amount_in)],
            Self::AddLiquidity {
                token_a,
                token_b,
                amount_a,
                amount_b,
                ..
            } => vec![(token_a.clone(), *amount_a), (token_b.clone(), *amount_b)],
            Self::RemoveLiquidity {
                pair, liquidity, ..
            } => vec![(pair.clone(), *liquidity)],
        }
    }

    /// Tokens whose balances change when the action lands, used for the
    /// post-action refresh.
    fn touched_tokens(&self) -> Vec<Address> {
        match self {
            Self::Swap {
                token_in, token_out, ..
            } => vec![token_in.clone(), token_out.clone()],
            Self::AddLiquidity {
                token_a, token_b, ..
            } => vec![token_a.clone(), token_b.clone()],
            Self::RemoveLiquidity {
                token_a,
                token_b,
                pair,
                ..
            } => vec![token_a.clone(), token_b.clone(), pair.clone()],
        }
    }

    /// Local validation, rejected before any network call.
    fn validate(&self) -> std::result::Result<(), ValidationError> {
        let zero = |name: &str| ValidationError::InvalidAmount {
            message: format!("{} must be greater than zero", name),
        };
        match self {
            Self::Swap { amount_in, .. } if *amount_in == 0 => Err(zero("amount_in")),
            Self::AddLiquidity {
                amount_a, amount_b, ..
            } if *amount_a == 0 || *amount_b == 0 => Err(zero("deposit amounts")),
            Self::RemoveLiquidity { liquidity, .. } if *liquidity == 0 => Err(zero("liquidity")),
            _ => Ok(()),
        }
    }
}

/// A planned step of an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Approve the router to spend `amount` of `token`.
    Approve { token: Address, amount: Amount },
    /// Submit the action itself to the router.
    Execute(ActionKind),
}

/// Observable lifecycle of the current action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionState {
    Idle,
    /// Reading fresh allowances and planning the step sequence.
    Planning,
    /// Approval `i` submitted to the signer.
    Approving(usize),
    /// Waiting for approval `i` to confirm on-chain.
    AwaitingApprovalConfirmation(usize),
    /// Main transaction submitted to the signer.
    Executing,
    /// Waiting for the main transaction to confirm.
    AwaitingExecutionConfirmation,
    Succeeded,
    Failed,
}

/// Snapshot published on every state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionStatus {
    pub kind: Option<ActionKind>,
    pub state: ActionState,
}

impl ActionStatus {
    fn idle() -> Self {
        Self {
            kind: None,
            state: ActionState::Idle,
        }
    }
}

/// Terminal failure of an action: which planned step failed (None when the
/// action never produced a plan) and the underlying error.
#[derive(Debug, thiserror::Error)]
#[error("Action failed{}: {error}", step_suffix(.step))]
pub struct ActionFailure {
    pub step: Option<usize>,
    #[source]
    pub error: Error,
}

fn step_suffix(step: &Option<usize>) -> String {
    match step {
        Some(i) => format!(" at step {}", i),
        None => String::new(),
    }
}

/// Successful completion report.
#[derive(Debug, Clone)]
pub struct ActionReport {
    pub kind: ActionKind,
    /// The executed step sequence, approvals first.
    pub steps: Vec<Step>,
    /// Transaction hashes in step order.
    pub tx_hashes: Vec<TxHash>,
}

/// Drives actions through their lifecycle against the chain.
pub struct Orchestrator {
    chain: Arc<dyn ChainClient>,
    aggregator: Arc<StateAggregator>,
    contracts: ContractsConfig,
    in_flight: Mutex<HashSet<ActionKind>>,
    status_tx: watch::Sender<ActionStatus>,
}

/// Releases the in-flight slot when the action finishes, however it exits.
struct SlotGuard<'a> {
    orchestrator: &'a Orchestrator,
    kind: ActionKind,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.orchestrator
            .in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.kind);
    }
}

impl Orchestrator {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        aggregator: Arc<StateAggregator>,
        contracts: ContractsConfig,
    ) -> Self {
        let (status_tx, _) = watch::channel(ActionStatus::idle());
        Self {
            chain,
            aggregator,
            contracts,
            in_flight: Mutex::new(HashSet::new()),
            status_tx,
        }
    }

    /// Subscribe to state transitions of subsequent actions.
    pub fn subscribe(&self) -> watch::Receiver<ActionStatus> {
        self.status_tx.subscribe()
    }

    pub fn status(&self) -> ActionStatus {
        *self.status_tx.borrow()
    }

    fn publish(&self, kind: ActionKind, state: ActionState) {
        // send_replace stores the value even with no live receivers, so
        // status() stays current for callers that never subscribed.
        self.status_tx.send_replace(ActionStatus {
            kind: Some(kind),
            state,
        });
        tracing::debug!(kind = kind.as_str(), ?state, "Action state");
    }

    fn acquire_slot(&self, kind: ActionKind) -> Result<SlotGuard<'_>> {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if !in_flight.insert(kind) {
            return Err(Error::ActionInFlight {
                kind: kind.as_str(),
            });
        }
        Ok(SlotGuard {
            orchestrator: self,
            kind,
        })
    }

    /// Run `action` to completion on behalf of `owner`.
    ///
    /// Rejected immediately with [`Error::ActionInFlight`] if an action of
    /// the same kind has not yet reached a terminal state. Any step failure
    /// is terminal; nothing is retried automatically.
    pub async fn submit(
        &self,
        owner: &Address,
        action: Action,
    ) -> std::result::Result<ActionReport, ActionFailure> {
        let kind = action.kind();
        let _slot = self.acquire_slot(kind).map_err(|error| ActionFailure {
            step: None,
            error,
        })?;

        let result = self.drive(owner, &action).await;
        match &result {
            Ok(report) => {
                tracing::info!(
                    kind = kind.as_str(),
                    steps = report.steps.len(),
                    "Action succeeded"
                );
                self.publish(kind, ActionState::Succeeded);
                self.aggregator
                    .refresh_after_action(owner, &action.touched_tokens())
                    .await;
            }
            Err(failure) => {
                tracing::warn!(kind = kind.as_str(), "Action failed: {}", failure);
                self.publish(kind, ActionState::Failed);
            }
        }
        result
    }

    async fn drive(
        &self,
        owner: &Address,
        action: &Action,
    ) -> std::result::Result<ActionReport, ActionFailure> {
        let kind = action.kind();
        let fail = |step: Option<usize>, error: Error| ActionFailure { step, error };

        action
            .validate()
            .map_err(|e| fail(None, e.into()))?;

        self.publish(kind, ActionState::Planning);
        let steps = self
            .plan(owner, action)
            .await
            .map_err(|e| fail(None, e))?;
        tracing::info!(
            kind = kind.as_str(),
            approvals = steps.len() - 1,
            "Action planned"
        );

        let mut tx_hashes = Vec::with_capacity(steps.len());
        for (index, step) in steps.iter().enumerate() {
            match step {
                Step::Approve { token, amount } => {
                    self.publish(kind, ActionState::Approving(index));
                    let hash = self
                        .chain
                        .submit_approve(owner, token, &self.contracts.router, *amount)
                        .await
                        .map_err(|e| fail(Some(index), e.into()))?;

                    self.publish(kind, ActionState::AwaitingApprovalConfirmation(index));
                    self.chain
                        .await_confirmation(&hash)
                        .await
                        .map_err(|e| fail(Some(index), e.into()))?;

                    // Re-read the allowance after confirmation instead of
                    // assuming the approval took effect.
                    let fresh = self.aggregator.refresh_allowance(owner, token).await;
                    match fresh {
                        Some(allowance) if !needs_approval(*amount, allowance) => {}
                        Some(allowance) => {
                            return Err(fail(
                                Some(index),
                                Error::Tx(minidex_core::TxError::Reverted {
                                    reason: format!(
                                        "allowance still {} after approval of {}",
                                        allowance, amount
                                    ),
                                }),
                            ));
                        }
                        None => {
                            return Err(fail(
                                Some(index),
                                Error::Node(minidex_core::NodeError::Parse(
                                    "allowance unreadable after approval".to_string(),
                                )),
                            ));
                        }
                    }
                    tx_hashes.push(hash);
                }
                Step::Execute(_) => {
                    self.publish(kind, ActionState::Executing);
                    let hash = self
                        .execute(owner, action)
                        .await
                        .map_err(|e| fail(Some(index), e.into()))?;

                    self.publish(kind, ActionState::AwaitingExecutionConfirmation);
                    self.chain
                        .await_confirmation(&hash)
                        .await
                        .map_err(|e| fail(Some(index), e.into()))?;
                    tx_hashes.push(hash);
                }
            }
        }

        Ok(ActionReport {
            kind,
            steps,
            tx_hashes,
        })
    }

    /// Build the step sequence from fresh on-chain allowances: one approval
    /// per token whose allowance falls short, then the execution step.
    async fn plan(&self, owner: &Address, action: &Action) -> Result<Vec<Step>> {
        let mut steps = Vec::new();
        for (token, amount) in action.spending() {
            let allowance = self
                .chain
                .allowance(&token, owner, &self.contracts.router)
                .await?;
            if needs_approval(amount, allowance) {
                steps.push(Step::Approve { token, amount });
            }
        }
        steps.push(Step::Execute(action.kind()));
        Ok(steps)
    }

    async fn execute(
        &self,
        owner: &Address,
        action: &Action,
    ) -> std::result::Result<TxHash, minidex_core::TxError> {
        match action {
            Action::Swap {
                amount_in,
                min_out,
                token_in,
                token_out,
                to,
            } => {
                self.chain
                    .submit_swap(owner, *amount_in, *min_out, token_in, token_out, to)
                    .await
            }
            Action::AddLiquidity {
                token_a,
                token_b,
                amount_a,
                amount_b,
                to,
            } => {
                self.chain
                    .submit_add_liquidity(owner, token_a, token_b, *amount_a, *amount_b, to)
                    .await
            }
            Action::RemoveLiquidity {
                token_a,
                token_b,
                liquidity,
                to,
                ..
            } => {
                self.chain
                    .submit_remove_liquidity(owner, token_a, token_b, *liquidity, to)
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{addr, MockChain};
    use minidex_core::{RefreshConfig, TxError};

    fn contracts() -> ContractsConfig {
        ContractsConfig {
            factory: addr(0xFA),
            router: addr(0xF0),
        }
    }

    fn orchestrator(chain: Arc<MockChain>) -> Orchestrator {
        let aggregator = Arc::new(StateAggregator::new(
            chain.clone(),
            contracts(),
            RefreshConfig::default(),
        ));
        Orchestrator::new(chain, aggregator, contracts())
    }

    fn swap(amount_in: Amount) -> Action {
        Action::Swap {
            amount_in,
            min_out: 1,
            token_in: addr(0x11),
            token_out: addr(0x21),
            to: addr(0xAA),
        }
    }

    #[tokio::test]
    async fn test_swap_with_approval_happy_path() {
        let chain = Arc::new(MockChain::default());
        let owner = addr(0xAA);
        chain.set_allowance(&addr(0x11), &owner, &addr(0xF0), 0);
        // Confirmation of the approval raises the allowance on-chain
        chain.approve_on_confirm(&addr(0x11), &owner, &addr(0xF0), 1_000);

        let orch = orchestrator(chain.clone());
        let report = orch.submit(&owner, swap(1_000)).await.unwrap();

        assert_eq!(report.steps.len(), 2);
        assert!(matches!(report.steps[0], Step::Approve { amount: 1_000, .. }));
        assert_eq!(report.steps[1], Step::Execute(ActionKind::Swap));
        assert_eq!(report.tx_hashes.len(), 2);

        let submitted = chain.submitted();
        assert!(submitted[0].starts_with("approve:"));
        assert!(submitted[1].starts_with("swap:"));

        // Planning read + post-confirmation fresh read (at least)
        assert!(chain.allowance_call_count() >= 2);
        assert_eq!(orch.status().state, ActionState::Succeeded);
    }

    #[tokio::test]
    async fn test_sufficient_allowance_skips_approval() {
        let chain = Arc::new(MockChain::default());
        let owner = addr(0xAA);
        // Allowance exactly equals the requirement
        chain.set_allowance(&addr(0x11), &owner, &addr(0xF0), 1_000);

        let orch = orchestrator(chain.clone());
        let report = orch.submit(&owner, swap(1_000)).await.unwrap();

        assert_eq!(report.steps, vec![Step::Execute(ActionKind::Swap)]);
        assert_eq!(chain.submitted().len(), 1);
    }

    #[tokio::test]
    async fn test_approval_failure_is_terminal() {
        let chain = Arc::new(MockChain::default());
        let owner = addr(0xAA);
        chain.set_allowance(&addr(0x11), &owner, &addr(0xF0), 0);
        chain.fail_next_submit(TxError::SignerRejected {
            message: "user denied".into(),
        });

        let orch = orchestrator(chain.clone());
        let failure = orch.submit(&owner, swap(1_000)).await.unwrap_err();

        assert_eq!(failure.step, Some(0));
        assert!(matches!(
            failure.error,
            Error::Tx(TxError::SignerRejected { .. })
        ));
        // The main transaction was never submitted
        assert!(chain.submitted().is_empty());
        assert_eq!(orch.status().state, ActionState::Failed);
    }

    #[tokio::test]
    async fn test_execution_revert_is_terminal() {
        let chain = Arc::new(MockChain::default());
        let owner = addr(0xAA);
        chain.set_allowance(&addr(0x11), &owner, &addr(0xF0), 1_000);
        chain.fail_next_confirmation(TxError::Reverted {
            reason: "slippage".into(),
        });

        let orch = orchestrator(chain.clone());
        let failure = orch.submit(&owner, swap(1_000)).await.unwrap_err();

        assert_eq!(failure.step, Some(0));
        assert!(matches!(failure.error, Error::Tx(TxError::Reverted { .. })));
        // Terminal: a second submission is a fresh action and may proceed
        assert!(orch.submit(&owner, swap(1_000)).await.is_ok());
    }

    #[tokio::test]
    async fn test_zero_amount_rejected_before_submission() {
        let chain = Arc::new(MockChain::default());
        let orch = orchestrator(chain.clone());

        let failure = orch.submit(&addr(0xAA), swap(0)).await.unwrap_err();
        assert!(failure.step.is_none());
        assert!(matches!(failure.error, Error::Validation(_)));
        assert!(chain.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_status_recorded_without_subscribers() {
        let chain = Arc::new(MockChain::default());
        let owner = addr(0xAA);
        chain.set_allowance(&addr(0x11), &owner, &addr(0xF0), 1_000);

        // Nobody subscribes before or during the action
        let orch = orchestrator(chain);
        assert_eq!(orch.status().state, ActionState::Idle);
        orch.submit(&owner, swap(1_000)).await.unwrap();

        assert_eq!(orch.status().kind, Some(ActionKind::Swap));
        assert_eq!(orch.status().state, ActionState::Succeeded);
        // A late subscriber sees the terminal state immediately
        assert_eq!(orch.subscribe().borrow().state, ActionState::Succeeded);
    }

    #[tokio::test]
    async fn test_reentrancy_rejected_while_in_flight() {
        let chain = Arc::new(MockChain::default());
        let owner = addr(0xAA);
        chain.set_allowance(&addr(0x11), &owner, &addr(0xF0), 1_000);
        chain.gate_confirmations();

        let orch = Arc::new(orchestrator(chain.clone()));
        let first = {
            let orch = orch.clone();
            let owner = owner.clone();
            tokio::spawn(async move { orch.submit(&owner, swap(1_000)).await })
        };

        // Let the first action reach its confirmation wait
        while chain.confirm_waiters() == 0 {
            tokio::task::yield_now().await;
        }

        let failure = orch.submit(&owner, swap(500)).await.unwrap_err();
        assert!(matches!(failure.error, Error::ActionInFlight { kind: "swap" }));

        chain.release_confirmations();
        assert!(first.await.unwrap().is_ok());

        // After the terminal state, the slot is free again
        chain.release_confirmations();
        assert!(orch.submit(&owner, swap(500)).await.is_ok());
    }

    #[tokio::test]
    async fn test_different_kinds_do_not_block_each_other() {
        let chain = Arc::new(MockChain::default());
        let owner = addr(0xAA);
        chain.set_allowance(&addr(0x11), &owner, &addr(0xF0), 1_000);
        chain.set_allowance(&addr(0x31), &owner, &addr(0xF0), 9_000);
        chain.set_allowance(&addr(0x32), &owner, &addr(0xF0), 9_000);

        let orch = orchestrator(chain);
        assert!(orch.submit(&owner, swap(1_000)).await.is_ok());
        let add = Action::AddLiquidity {
            token_a: addr(0x31),
            token_b: addr(0x32),
            amount_a: 100,
            amount_b: 200,
            to: owner.clone(),
        };
        assert!(orch.submit(&owner, add).await.is_ok());
    }

    #[tokio::test]
    async fn test_add_liquidity_plans_two_approvals() {
        let chain = Arc::new(MockChain::default());
        let owner = addr(0xAA);
        chain.set_allowance(&addr(0x31), &owner, &addr(0xF0), 0);
        chain.set_allowance(&addr(0x32), &owner, &addr(0xF0), 0);
        chain.approve_on_confirm(&addr(0x31), &owner, &addr(0xF0), 100);
        chain.approve_on_confirm(&addr(0x32), &owner, &addr(0xF0), 200);

        let orch = orchestrator(chain.clone());
        let add = Action::AddLiquidity {
            token_a: addr(0x31),
            token_b: addr(0x32),
            amount_a: 100,
            amount_b: 200,
            to: owner.clone(),
        };
        let report = orch.submit(&owner, add).await.unwrap();

        assert_eq!(report.steps.len(), 3);
        let submitted = chain.submitted();
        assert!(submitted[0].starts_with("approve:"));
        assert!(submitted[1].starts_with("approve:"));
        assert!(submitted[2].starts_with("add_liquidity:"));
    }

    #[tokio::test]
    async fn test_remove_liquidity_approves_lp_token() {
        let chain = Arc::new(MockChain::default());
        let owner = addr(0xAA);
        let pair = addr(0x51);
        chain.set_allowance(&pair, &owner, &addr(0xF0), 0);
        chain.approve_on_confirm(&pair, &owner, &addr(0xF0), 4_000);

        let orch = orchestrator(chain.clone());
        let remove = Action::RemoveLiquidity {
            token_a: addr(0x31),
            token_b: addr(0x32),
            pair: pair.clone(),
            liquidity: 4_000,
            to: owner.clone(),
        };
        let report = orch.submit(&owner, remove).await.unwrap();

        assert!(matches!(
            &report.steps[0],
            Step::Approve { token, amount: 4_000 } if token == &pair
        ));
        assert!(chain.submitted()[1].starts_with("remove_liquidity:"));
    }

    #[tokio::test]
    async fn test_stale_allowance_after_confirmation_fails_action() {
        let chain = Arc::new(MockChain::default());
        let owner = addr(0xAA);
        // Approval confirms but the fresh re-read still shows a shortfall
        chain.set_allowance(&addr(0x11), &owner, &addr(0xF0), 0);

        let orch = orchestrator(chain.clone());
        let failure = orch.submit(&owner, swap(1_000)).await.unwrap_err();

        assert_eq!(failure.step, Some(0));
        assert!(matches!(failure.error, Error::Tx(TxError::Reverted { .. })));
        // Only the approval went out
        assert_eq!(chain.submitted().len(), 1);
    }
}
