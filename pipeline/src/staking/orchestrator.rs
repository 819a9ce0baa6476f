//! # Staking Orchestrator
//!
//! Turns `(amount, validator, approve policy)` into a
//! [`StakingPreparedAction`]:
//!
//! 1. Token assets with an allowance spender read the current allowance.
//!    If it is below the amount, the result is `ReadyToApprove` with the
//!    encoded `approve` call and the `Fast` tier fee (`Market` when the
//!    provider quotes a single fee).
//! 2. Otherwise the stake fee is estimated and the result is
//!    `ReadyToStake`.
//!
//! Like the transaction aggregator, each input change aborts the running
//! evaluation and only the latest generation may publish. Sending uses the
//! inputs the published result was evaluated from, and is refused while an
//! evaluation for newer inputs is outstanding.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::approve::{encode_approve, ApproveAmount};
use super::types::{StakingPreparedAction, ValidatorInfo, Yield};
use super::StakingError;
use crate::config::ApprovePolicy;
use crate::fee::{FeeEngine, FeeOption};
use crate::observable::{Observable, Subscription};
use crate::provider::{NetworkProvider, StakingProvider};
use crate::transaction::{
    AdditionalFieldState, Address, AddressSource, Asset, ContractCall, DispatchResult,
    TransactionDispatcher, TransactionDraft,
};

/// Published evaluation result: `None` while inputs are missing.
pub type PreparedActionState = Option<Result<StakingPreparedAction, StakingError>>;

#[derive(Debug, Clone)]
struct Inputs {
    amount: Option<u128>,
    validator: Option<ValidatorInfo>,
    approve_policy: ApprovePolicy,
    yield_info: Option<Yield>,
}

/// A published result and the inputs it was evaluated from.
struct Evaluated {
    generation: u64,
    amount: u128,
    validator: ValidatorInfo,
    action: Result<StakingPreparedAction, StakingError>,
}

struct Published {
    action: Observable<PreparedActionState>,
    computing: Observable<bool>,
    generation: AtomicU64,
    /// Guards publication. Holds the latest published evaluation.
    publish: Mutex<Option<Evaluated>>,
}

/// Everything an evaluation needs, cloned into the spawned task.
#[derive(Clone)]
struct Evaluator {
    asset: Asset,
    owner: String,
    network: Arc<dyn NetworkProvider>,
    staking: Arc<dyn StakingProvider>,
}

impl Evaluator {
    async fn evaluate(
        &self,
        amount: u128,
        validator: &ValidatorInfo,
        policy: ApprovePolicy,
        yield_info: &Yield,
    ) -> Result<StakingPreparedAction, StakingError> {
        if let (Some(contract), Some(spender)) = (
            self.asset.contract_address(),
            yield_info.allowance_spender.as_deref(),
        ) {
            let allowance = self
                .network
                .get_allowance(&self.owner, spender, contract)
                .await?;
            if allowance < amount {
                let approve_amount = match policy {
                    ApprovePolicy::Exact => ApproveAmount::Exact(amount),
                    ApprovePolicy::Unlimited => ApproveAmount::Unlimited,
                };
                let call_data =
                    encode_approve(spender, approve_amount).ok_or(StakingError::ApproveDataNotFound)?;
                let quotes = self.network.get_fee(0, contract).await?;
                if quotes.is_empty() {
                    return Err(StakingError::ApproveFeeNotFound);
                }
                let tiers = FeeEngine::map_quotes(quotes)?;
                let tier = |option: FeeOption| {
                    tiers
                        .iter()
                        .find(|(candidate, _)| *candidate == option)
                        .map(|(_, fee)| *fee)
                };
                let fee = tier(FeeOption::Fast)
                    .or_else(|| tier(FeeOption::Market))
                    .ok_or(StakingError::ApproveFeeNotFound)?;
                debug!(allowance, amount, "allowance too low, approve required");
                return Ok(StakingPreparedAction::ReadyToApprove {
                    contract: contract.to_string(),
                    call_data,
                    fee,
                });
            }
        }

        let fee = self.staking.estimate_stake_fee(amount, validator).await?;
        Ok(StakingPreparedAction::ReadyToStake { fee })
    }
}

/// A sendable action and the inputs it was evaluated from.
struct Ready {
    generation: u64,
    amount: u128,
    validator: ValidatorInfo,
    action: StakingPreparedAction,
}

/// Prepares and sends approve and stake transactions.
pub struct StakingOrchestrator {
    evaluator: Evaluator,
    dispatcher: Arc<TransactionDispatcher>,
    inputs: Mutex<Inputs>,
    published: Arc<Published>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl StakingOrchestrator {
    /// Creates an orchestrator for `owner`'s `asset`.
    pub fn new(
        asset: Asset,
        owner: &str,
        network: Arc<dyn NetworkProvider>,
        staking: Arc<dyn StakingProvider>,
        dispatcher: Arc<TransactionDispatcher>,
        approve_policy: ApprovePolicy,
    ) -> Self {
        Self {
            evaluator: Evaluator {
                asset,
                owner: owner.to_string(),
                network,
                staking,
            },
            dispatcher,
            inputs: Mutex::new(Inputs {
                amount: None,
                validator: None,
                approve_policy,
                yield_info: None,
            }),
            published: Arc::new(Published {
                action: Observable::new(None),
                computing: Observable::new(false),
                generation: AtomicU64::new(0),
                publish: Mutex::new(None),
            }),
            task: Mutex::new(None),
        }
    }

    // -- Inputs ---------------------------------------------------------------

    /// Sets the yield the validator list comes from.
    ///
    /// A selected validator that the new yield no longer lists is cleared.
    pub fn set_yield(&self, yield_info: Yield) {
        {
            let mut inputs = self.inputs.lock();
            if let Some(selected) = &inputs.validator {
                if yield_info.validator(&selected.address).is_none() {
                    inputs.validator = None;
                }
            }
            inputs.yield_info = Some(yield_info);
        }
        self.recompute();
    }

    /// Sets or clears the amount.
    pub fn set_amount(&self, amount: Option<u128>) {
        self.inputs.lock().amount = amount;
        self.recompute();
    }

    /// Selects a validator from the current yield.
    pub fn select_validator(&self, address: &str) -> Result<ValidatorInfo, StakingError> {
        let validator = {
            let mut inputs = self.inputs.lock();
            let validator = inputs
                .yield_info
                .as_ref()
                .and_then(|y| y.validator(address))
                .cloned()
                .ok_or(StakingError::ValidatorNotFound)?;
            inputs.validator = Some(validator.clone());
            validator
        };
        self.recompute();
        Ok(validator)
    }

    /// Changes how much allowance an approve grants.
    pub fn set_approve_policy(&self, policy: ApprovePolicy) {
        self.inputs.lock().approve_policy = policy;
        self.recompute();
    }

    /// The selected validator.
    pub fn selected_validator(&self) -> Option<ValidatorInfo> {
        self.inputs.lock().validator.clone()
    }

    /// The entered amount.
    pub fn amount(&self) -> Option<u128> {
        self.inputs.lock().amount
    }

    // -- Evaluation -----------------------------------------------------------

    /// Re-evaluates the current inputs.
    ///
    /// The task slot stays locked until the new evaluation is stored, so
    /// concurrent callers cannot leave an older task running unaborted.
    pub fn recompute(&self) {
        let mut task = self.task.lock();
        let generation = {
            let _publish = self.published.publish.lock();
            self.published.generation.fetch_add(1, Ordering::SeqCst) + 1
        };
        if let Some(previous) = task.take() {
            previous.abort();
        }

        let inputs = self.inputs.lock().clone();
        let (amount, validator, yield_info) =
            match (inputs.amount, inputs.validator, inputs.yield_info) {
                (Some(amount), Some(validator), Some(yield_info)) => (amount, validator, yield_info),
                _ => {
                    *self.published.publish.lock() = None;
                    self.published.action.set(None);
                    self.published.computing.set_if_changed(false);
                    return;
                }
            };

        self.published.computing.set_if_changed(true);
        let published = Arc::clone(&self.published);
        let evaluator = self.evaluator.clone();
        let policy = inputs.approve_policy;

        let handle = tokio::spawn(async move {
            let result = evaluator
                .evaluate(amount, &validator, policy, &yield_info)
                .await;

            let mut latest = published.publish.lock();
            if published.generation.load(Ordering::SeqCst) != generation {
                debug!(generation, "staking evaluation superseded");
                return;
            }
            if let Err(e) = &result {
                warn!(generation, error = %e, "staking evaluation failed");
            }
            *latest = Some(Evaluated {
                generation,
                amount,
                validator,
                action: result.clone(),
            });
            published.action.set(Some(result));
            published.computing.set(false);
        });
        *task = Some(handle);
    }

    /// Current prepared action.
    pub fn action(&self) -> PreparedActionState {
        self.published.action.get()
    }

    /// Stream of prepared actions.
    pub fn subscribe(&self) -> Subscription<PreparedActionState> {
        self.published.action.subscribe()
    }

    /// Waits for the running evaluation and returns its result.
    pub async fn settled(&self) -> PreparedActionState {
        let mut computing = self.published.computing.subscribe();
        computing.wait_for(|busy| !*busy).await;
        self.action()
    }

    /// Whether the published action matches the current inputs and is sendable.
    pub fn is_ready(&self) -> bool {
        self.ready_action().is_ok()
    }

    /// The ready action with the amount and validator it was evaluated
    /// for, or the error explaining its absence.
    ///
    /// `NotReady` while an evaluation is running or when the published
    /// result predates the latest input change.
    fn ready_action(&self) -> Result<Ready, StakingError> {
        if self.published.computing.get() {
            return Err(StakingError::NotReady);
        }
        let current = {
            let latest = self.published.publish.lock();
            let generation = self.published.generation.load(Ordering::SeqCst);
            latest.as_ref().map(|evaluated| {
                if evaluated.generation != generation {
                    return Err(StakingError::NotReady);
                }
                Ok(Ready {
                    generation,
                    amount: evaluated.amount,
                    validator: evaluated.validator.clone(),
                    action: evaluated.action.clone()?,
                })
            })
        };
        match current {
            Some(ready) => ready,
            None => {
                let inputs = self.inputs.lock();
                if inputs.amount.is_none() {
                    Err(StakingError::AmountNotFound)
                } else if inputs.validator.is_none() {
                    Err(StakingError::ValidatorNotFound)
                } else {
                    Err(StakingError::NotReady)
                }
            }
        }
    }

    // -- Sending --------------------------------------------------------------

    /// Sends the prepared approve transaction, then re-evaluates.
    pub async fn send_approve_transaction(&self) -> Result<DispatchResult, StakingError> {
        let ready = self.ready_action()?;
        let (contract, call_data, fee) = match ready.action {
            StakingPreparedAction::ReadyToApprove {
                contract,
                call_data,
                fee,
            } => (contract, call_data, fee),
            StakingPreparedAction::ReadyToStake { .. } => {
                return Err(StakingError::ApproveDataNotFound)
            }
        };

        let draft = TransactionDraft {
            destination: Address::new(&contract, AddressSource::Typed),
            amount: 0,
            fee,
            additional_field: AdditionalFieldState::NotSupported,
            includes_fee: false,
            contract_call: Some(ContractCall {
                contract: contract.clone(),
                call_data,
            }),
            revision: ready.generation,
        };

        let result = self.dispatcher.send(&draft).await?;
        info!(contract = %contract, hash = %result.hash, "approve transaction sent");
        self.recompute();
        Ok(result)
    }

    /// Builds and sends the stake transaction.
    pub async fn send_stake(&self) -> Result<DispatchResult, StakingError> {
        let Ready {
            amount,
            validator,
            action,
            ..
        } = self.ready_action()?;
        let fee = match action {
            StakingPreparedAction::ReadyToStake { fee } => fee,
            StakingPreparedAction::ReadyToApprove { .. } => {
                return Err(StakingError::ApprovalRequired)
            }
        };

        let draft = self
            .evaluator
            .staking
            .build_stake_transaction(amount, &validator, fee)
            .await?;
        let result = self.dispatcher.send(&draft).await?;
        info!(validator = %validator.address, amount, hash = %result.hash, "stake sent");
        Ok(result)
    }
}

impl Drop for StakingOrchestrator {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
