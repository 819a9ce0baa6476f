//! # Staking Session
//!
//! One staking flow: fetch the wallet's [`StakingState`], let the user pick
//! an amount and a validator, then approve (if the token allowance is too
//! low) and stake. Walks the staking topology:
//!
//! ```text
//! Amount -> ValidatorSelection -> Summary -> Finish
//! ```
//!
//! Both sends happen on the summary. An approve keeps the flow on the
//! summary and re-evaluates; only a stake records a dispatch.

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{ApprovePolicy, PipelineConfig};
use crate::flow::{FlowContext, FlowError, FlowTopology, Step, StepFlowController};
use crate::observable::Subscription;
use crate::provider::{NetworkProvider, RecentAddressStore, Signer, StakingProvider};
use crate::staking::{
    PreparedActionState, StakingError, StakingOrchestrator, StakingState, StakingStateManager,
    ValidatorInfo,
};
use crate::transaction::{Asset, DispatchResult, RateConverter, TransactionDispatcher};
use crate::validation::{AmountValidator, FeeContext, ValidationError};

/// Capabilities a staking flow consumes.
#[derive(Clone)]
pub struct StakingServices {
    /// Allowances, fees, balances and submission.
    pub network: Arc<dyn NetworkProvider>,
    /// Yield, positions and stake transactions.
    pub staking: Arc<dyn StakingProvider>,
    /// Signs drafts.
    pub signer: Arc<dyn Signer>,
    /// Remembers successful destinations.
    pub recent_addresses: Option<Arc<dyn RecentAddressStore>>,
}

impl StakingServices {
    /// Takes every capability from one provider.
    pub fn from_provider<P>(provider: Arc<P>) -> Self
    where
        P: NetworkProvider + StakingProvider + Signer + RecentAddressStore + 'static,
    {
        Self {
            network: provider.clone(),
            staking: provider.clone(),
            signer: provider.clone(),
            recent_addresses: Some(provider),
        }
    }
}

struct StakingCore {
    asset: Asset,
    state: StakingStateManager,
    orchestrator: StakingOrchestrator,
}

/// Step validity of a staking flow.
pub struct StakingFlowContext {
    core: Arc<StakingCore>,
}

#[async_trait]
impl FlowContext for StakingFlowContext {
    fn is_step_valid(&self, step: Step) -> bool {
        let orchestrator = &self.core.orchestrator;
        match step {
            Step::Amount => orchestrator.amount().is_some(),
            Step::ValidatorSelection => orchestrator.selected_validator().is_some(),
            Step::Summary => orchestrator.is_ready(),
            Step::Finish => true,
            Step::Destination | Step::Fee => false,
        }
    }
}

/// One staking flow of one asset from one wallet.
pub struct StakingSession {
    id: Uuid,
    owner: String,
    network: Arc<dyn NetworkProvider>,
    core: Arc<StakingCore>,
    flow: StepFlowController<StakingFlowContext>,
    amount_validator: AmountValidator,
    converter: Mutex<RateConverter>,
    balance: Mutex<u128>,
}

impl StakingSession {
    /// Creates a session in the `Loading` state. Call
    /// [`StakingSession::refresh`] to fetch the yield.
    pub fn new(
        asset: Asset,
        owner: &str,
        fiat_rate: Option<Decimal>,
        services: StakingServices,
        config: &PipelineConfig,
    ) -> Self {
        let mut dispatcher = TransactionDispatcher::new(
            &asset.symbol,
            Arc::clone(&services.network),
            services.signer,
        );
        if let Some(store) = services.recent_addresses {
            dispatcher = dispatcher.with_recent_addresses(store);
        }

        let core = Arc::new(StakingCore {
            state: StakingStateManager::new(owner, Arc::clone(&services.staking)),
            orchestrator: StakingOrchestrator::new(
                asset.clone(),
                owner,
                Arc::clone(&services.network),
                services.staking,
                Arc::new(dispatcher),
                config.default_approve_policy,
            ),
            asset: asset.clone(),
        });
        let flow = StepFlowController::new(
            FlowTopology::Staking,
            Arc::new(StakingFlowContext {
                core: Arc::clone(&core),
            }),
        );

        let id = Uuid::new_v4();
        info!(session = %id, asset = %asset.symbol, owner, "staking session created");

        Self {
            id,
            owner: owner.to_string(),
            network: services.network,
            core,
            flow,
            amount_validator: AmountValidator::new(asset.clone()),
            converter: Mutex::new(RateConverter::new(asset.decimals, fiat_rate)),
            balance: Mutex::new(0),
        }
    }

    /// Session identifier, carried in log fields.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The asset being staked.
    pub fn asset(&self) -> &Asset {
        &self.core.asset
    }

    /// The step flow driving this session.
    pub fn flow(&self) -> &StepFlowController<StakingFlowContext> {
        &self.flow
    }

    // -- State ----------------------------------------------------------------

    /// Re-fetches staking state and balance, and feeds the yield to the
    /// orchestrator. A failure keeps the previous state.
    pub async fn refresh(&self) -> Result<StakingState, StakingError> {
        let (state, balance) = tokio::try_join!(self.core.state.refresh(), async {
            self.network
                .get_balance(&self.owner)
                .await
                .map_err(StakingError::from)
        })?;
        *self.balance.lock() = balance;
        if let Some(yield_info) = state.yield_info() {
            self.core.orchestrator.set_yield(yield_info.clone());
        }
        debug!(session = %self.id, balance, "staking session refreshed");
        Ok(state)
    }

    /// Current staking state.
    pub fn staking_state(&self) -> StakingState {
        self.core.state.state()
    }

    /// Stream of staking states.
    pub fn staking_state_stream(&self) -> Subscription<StakingState> {
        self.core.state.subscribe()
    }

    // -- Inputs ---------------------------------------------------------------

    /// Sets the amount, entered in whole coins or in fiat.
    ///
    /// Rejected amounts clear the orchestrator's amount, so nothing stale
    /// can be sent.
    pub fn set_amount(&self, value: Decimal, is_fiat: bool) -> Result<u128, StakingError> {
        let result = self.check_amount(value, is_fiat);
        self.core.orchestrator.set_amount(result.as_ref().ok().copied());
        result
    }

    fn check_amount(&self, value: Decimal, is_fiat: bool) -> Result<u128, StakingError> {
        let state = self.core.state.state();
        let yield_info = state.yield_info().ok_or(StakingError::NotAvailable)?;
        if !state.can_stake() {
            return Err(StakingError::NotAvailable);
        }

        let converter = *self.converter.lock();
        let units = if is_fiat {
            converter.to_crypto(value)
        } else {
            converter.coins_to_units(value)
        }
        .ok_or_else(|| ValidationError::Unconvertible {
            symbol: self.core.asset.symbol.clone(),
        })?;

        let balance = *self.balance.lock();
        self.amount_validator
            .validate_amount(units, balance, FeeContext::none())?;
        if units < yield_info.minimum_stake {
            return Err(StakingError::BelowMinimumStake {
                minimum: yield_info.minimum_stake,
            });
        }
        Ok(units)
    }

    /// Selects a validator from the current yield.
    pub fn select_validator(&self, address: &str) -> Result<ValidatorInfo, StakingError> {
        self.core.orchestrator.select_validator(address)
    }

    /// Changes how much allowance an approve grants.
    pub fn set_approve_policy(&self, policy: ApprovePolicy) {
        self.core.orchestrator.set_approve_policy(policy);
    }

    // -- Preparation ----------------------------------------------------------

    /// The prepared action.
    pub fn prepared_action(&self) -> PreparedActionState {
        self.core.orchestrator.action()
    }

    /// Waits for the running evaluation and returns its result.
    pub async fn settled_action(&self) -> PreparedActionState {
        self.core.orchestrator.settled().await
    }

    /// Stream of prepared actions.
    pub fn prepared_action_stream(&self) -> Subscription<PreparedActionState> {
        self.core.orchestrator.subscribe()
    }

    // -- Dispatch -------------------------------------------------------------

    fn require_summary(&self) -> Result<(), StakingError> {
        if self.flow.current_step() != Step::Summary {
            return Err(FlowError::NotAtSummary.into());
        }
        Ok(())
    }

    /// Sends the prepared approve transaction.
    pub async fn send_approve_transaction(&self) -> Result<DispatchResult, StakingError> {
        self.require_summary()?;
        self.core.orchestrator.settled().await;
        let result = self.core.orchestrator.send_approve_transaction().await?;
        info!(session = %self.id, hash = %result.hash, "approve dispatched");
        Ok(result)
    }

    /// Sends the stake, then refreshes the staking state.
    ///
    /// A failed refresh is logged and does not fail the stake.
    pub async fn send_stake(&self) -> Result<DispatchResult, StakingError> {
        self.require_summary()?;
        self.core.orchestrator.settled().await;
        let result = self.core.orchestrator.send_stake().await?;
        self.flow.mark_dispatched();
        info!(session = %self.id, hash = %result.hash, "stake dispatched");

        if let Err(e) = self.refresh().await {
            warn!(session = %self.id, error = %e, "staking refresh after stake failed");
        }
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fee::Fee;
    use crate::simulated::SimulatedNetwork;
    use crate::staking::{StakingPreparedAction, Yield};
    use crate::transaction::AssetFamily;

    const OWNER: &str = "0x00000000000000000000000000000000000000aa";
    const VALIDATOR: &str = "0x00000000000000000000000000000000000000e1";

    fn staking_yield(available: bool) -> Yield {
        Yield {
            apr: Decimal::new(45, 1),
            minimum_stake: 10u128.pow(17),
            unbonding_period_secs: 86_400,
            validators: vec![ValidatorInfo {
                address: VALIDATOR.into(),
                name: "Validator".into(),
                apr: Decimal::new(45, 1),
            }],
            enabled: true,
            available,
            allowance_spender: None,
        }
    }

    async fn eth_session(available: bool) -> (Arc<SimulatedNetwork>, StakingSession) {
        let asset = Asset::coin("ETH", 18, AssetFamily::Evm);
        let network = Arc::new(SimulatedNetwork::new(asset.clone(), OWNER));
        network.set_balance(OWNER, 2 * 10u128.pow(18));
        network.set_yield(Some(staking_yield(available)));
        network.set_stake_fee(Fee::fixed(1_000));
        let session = StakingSession::new(
            asset,
            OWNER,
            None,
            StakingServices::from_provider(network.clone()),
            &PipelineConfig::default(),
        );
        session.refresh().await.unwrap();
        (network, session)
    }

    #[tokio::test]
    async fn amount_below_minimum_is_rejected() {
        let (_network, session) = eth_session(true).await;
        assert_eq!(
            session.set_amount(Decimal::new(1, 2), false),
            Err(StakingError::BelowMinimumStake {
                minimum: 10u128.pow(17)
            })
        );
        assert_eq!(session.prepared_action(), None);
    }

    #[tokio::test]
    async fn amount_above_balance_is_rejected() {
        let (_network, session) = eth_session(true).await;
        assert!(matches!(
            session.set_amount(Decimal::new(3, 0), false),
            Err(StakingError::Validation(ValidationError::ExceedsBalance { .. }))
        ));
    }

    #[tokio::test]
    async fn paused_program_refuses_amounts() {
        let (_network, session) = eth_session(false).await;
        assert!(matches!(
            session.staking_state(),
            StakingState::TemporaryUnavailable { .. }
        ));
        assert_eq!(
            session.set_amount(Decimal::new(1, 0), false),
            Err(StakingError::NotAvailable)
        );
    }

    #[tokio::test]
    async fn stake_walks_flow_and_refreshes_state() {
        let (network, session) = eth_session(true).await;
        assert!(matches!(
            session.staking_state(),
            StakingState::AvailableToStake { .. }
        ));

        session.set_amount(Decimal::new(5, 1), false).unwrap();
        session.flow().perform_next().await.unwrap();
        session.select_validator(VALIDATOR).unwrap();
        assert_eq!(
            session.settled_action().await,
            Some(Ok(StakingPreparedAction::ReadyToStake {
                fee: Fee::fixed(1_000)
            }))
        );
        session.flow().perform_next().await.unwrap();
        assert_eq!(session.flow().current_step(), Step::Summary);

        session.send_stake().await.unwrap();
        assert_eq!(network.positions(OWNER)[0].amount, 5 * 10u128.pow(17));
        assert!(matches!(session.staking_state(), StakingState::Staked { .. }));
        assert_eq!(session.flow().perform_finish(), Ok(Step::Finish));
    }

    #[tokio::test]
    async fn stake_outside_summary_is_refused() {
        let (_network, session) = eth_session(true).await;
        assert_eq!(
            session.send_stake().await,
            Err(StakingError::Flow(FlowError::NotAtSummary))
        );
    }
}
