//! # Send Session
//!
//! One transfer from destination entry to dispatch. The session owns the
//! validators, the fee engine, the aggregator, the relevance guard, the
//! dispatcher and a transfer-topology [`StepFlowController`].
//!
//! Data flow on every input change:
//!
//! ```text
//! set_destination ──► AddressValidator ──► destination validity ──┐
//! set_amount ───────► AmountValidator  ──► amount validity ───────┤
//! update_fees / select_fee / custom edits ─► FeeEngine ───────────┼─► TransactionAggregator ─► draft
//! set_additional_field ─► memo / tag parser ──────────────────────┘
//! ```
//!
//! Fee changes re-run amount validation, since whether an amount covers
//! its fee depends on the selected tier.

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::SendError;
use crate::config::PipelineConfig;
use crate::fee::{
    Fee, FeeAdvisory, FeeEngine, FeeError, FeeOption, FeeOptions, FeeRelevanceGuard,
    RelevanceOutcome,
};
use crate::flow::{FlowContext, FlowError, FlowTopology, Step, StepFlowController};
use crate::observable::{Observable, Subscription};
use crate::provider::{
    AddressValidationService, AliasResolver, FeeIncreaseConfirmation, NetworkProvider,
    RecentAddressStore, Signer, TransactionBuilder,
};
use crate::transaction::{
    AdditionalFieldState, Address, AddressSource, Asset, BalanceIncludeFeeCalculator,
    DispatchResult, DualAmount, IncludeFeeCalculator, RateConverter, TransactionAggregator,
    TransactionDispatcher, TransactionDraft, WithdrawalNotification,
};
use crate::validation::{
    parse_additional_field, AddressValidator, AmountValidator, FeeContext, ValidationError,
};

/// `None` until the user enters something.
pub type Validity<T> = Option<Result<T, ValidationError>>;

/// Capabilities a transfer consumes.
#[derive(Clone)]
pub struct TransferServices {
    /// Fees, balances and submission.
    pub network: Arc<dyn NetworkProvider>,
    /// Chain-specific draft construction.
    pub builder: Arc<dyn TransactionBuilder>,
    /// Signs drafts.
    pub signer: Arc<dyn Signer>,
    /// Address syntax.
    pub address_service: Arc<dyn AddressValidationService>,
    /// Name-service lookup, if the chain has one.
    pub alias_resolver: Option<Arc<dyn AliasResolver>>,
    /// Remembers successful destinations.
    pub recent_addresses: Option<Arc<dyn RecentAddressStore>>,
    /// Asks the user to accept a raised fee.
    pub fee_confirmation: Arc<dyn FeeIncreaseConfirmation>,
}

impl TransferServices {
    /// Takes every capability from one provider.
    pub fn from_provider<P>(provider: Arc<P>) -> Self
    where
        P: NetworkProvider
            + TransactionBuilder
            + Signer
            + AddressValidationService
            + AliasResolver
            + RecentAddressStore
            + FeeIncreaseConfirmation
            + 'static,
    {
        Self {
            network: provider.clone(),
            builder: provider.clone(),
            signer: provider.clone(),
            address_service: provider.clone(),
            alias_resolver: Some(provider.clone()),
            recent_addresses: Some(provider.clone()),
            fee_confirmation: provider,
        }
    }
}

// ---------------------------------------------------------------------------
// Shared Core
// ---------------------------------------------------------------------------

/// State shared between the session and its flow context.
struct TransferCore {
    asset: Asset,
    owner: String,
    network: Arc<dyn NetworkProvider>,
    engine: Arc<FeeEngine>,
    aggregator: TransactionAggregator,
    address_validator: AddressValidator,
    amount_validator: AmountValidator,
    include_fee: BalanceIncludeFeeCalculator,
    converter: Mutex<RateConverter>,
    entered: Mutex<Option<DualAmount>>,
    balance: Mutex<u128>,
    destination_generation: AtomicU64,
    destination: Observable<Validity<Address>>,
    amount: Observable<Validity<DualAmount>>,
    field: Observable<Result<AdditionalFieldState, ValidationError>>,
}

impl TransferCore {
    fn destination_value(&self) -> Option<String> {
        match self.destination.get() {
            Some(Ok(address)) => Some(address.value),
            _ => None,
        }
    }

    fn valid_units(&self) -> Option<u128> {
        match self.amount.get() {
            Some(Ok(amount)) => amount.crypto(),
            _ => None,
        }
    }

    /// The field state the aggregator currently builds with.
    fn applied_field(&self) -> AdditionalFieldState {
        self.field
            .get()
            .unwrap_or_else(|_| AdditionalFieldState::for_asset(&self.asset))
    }

    fn field_ready(&self) -> bool {
        match self.field.get() {
            Ok(state) => !(self.asset.additional_field_required && state.is_empty()),
            Err(_) => false,
        }
    }

    async fn update_fees(&self) -> Result<FeeOptions, FeeError> {
        let amount = self
            .entered
            .lock()
            .as_ref()
            .and_then(DualAmount::crypto)
            .unwrap_or(0);
        let destination = self.destination_value().unwrap_or_default();
        let result = self.engine.update_fees(amount, &destination).await;
        self.sync_fee();
        result
    }

    /// Pushes the engine's selected fee into the aggregator and re-checks
    /// the amount against it.
    fn sync_fee(&self) {
        self.aggregator.set_fee(self.engine.selected_fee().ok());
        let entered = self.entered.lock().clone();
        if let Some(entered) = entered {
            // The outcome is published on the amount validity stream.
            let _ = self.apply_amount(entered);
        }
    }

    fn apply_amount(&self, entered: DualAmount) -> Result<DualAmount, ValidationError> {
        *self.entered.lock() = Some(entered.clone());
        let result = self.check_amount(&entered);
        self.aggregator
            .set_amount(result.as_ref().ok().and_then(DualAmount::crypto));
        self.amount.set_if_changed(Some(result.clone()));
        result
    }

    fn check_amount(&self, entered: &DualAmount) -> Result<DualAmount, ValidationError> {
        let units = entered.crypto().ok_or_else(|| ValidationError::Unconvertible {
            symbol: self.asset.symbol.clone(),
        })?;
        let balance = *self.balance.lock();
        let fee = match self.engine.selected_fee() {
            Ok(fee) if self.asset.fee_in_same_asset() => {
                let include = self.include_fee.should_include_fee(&fee, units, balance);
                FeeContext::with_fee(fee.amount, include)
            }
            _ => FeeContext::none(),
        };
        self.amount_validator.validate_amount(units, balance, fee)?;
        Ok(entered.clone())
    }

    /// The published draft, if it was built from exactly the current inputs.
    fn ready_draft(&self) -> Option<TransactionDraft> {
        if self.aggregator.is_computing() || self.aggregator.error().is_some() {
            return None;
        }
        let draft = self.aggregator.draft()?;
        let destination = self.destination_value()?;
        let units = self.valid_units()?;
        let fee = self.engine.selected_fee().ok()?;
        let entered = if draft.includes_fee {
            draft.amount.checked_add(draft.fee.amount)?
        } else {
            draft.amount
        };

        let matches = draft.destination.value == destination
            && entered == units
            && draft.fee == fee
            && draft.additional_field == self.applied_field();
        matches.then_some(draft)
    }
}

// ---------------------------------------------------------------------------
// Flow Context
// ---------------------------------------------------------------------------

/// Step validity and transition hooks of a transfer.
pub struct TransferFlowContext {
    core: Arc<TransferCore>,
}

impl TransferFlowContext {
    async fn refresh_fees(&self, reason: &'static str) {
        match self.core.update_fees().await {
            Ok(_) | Err(FeeError::Superseded) => {}
            Err(e) => debug!(asset = %self.core.asset.symbol, reason, error = %e, "fee refresh failed"),
        }
    }
}

#[async_trait]
impl FlowContext for TransferFlowContext {
    fn is_step_valid(&self, step: Step) -> bool {
        let core = &self.core;
        match step {
            Step::Destination => core.destination_value().is_some() && core.field_ready(),
            Step::Amount => core.valid_units().is_some(),
            Step::Fee => core.engine.selected_fee().is_ok() && core.valid_units().is_some(),
            Step::Summary => core.ready_draft().is_some(),
            Step::ValidatorSelection => false,
            Step::Finish => true,
        }
    }

    fn fee_advisory(&self) -> Option<FeeAdvisory> {
        self.core.engine.custom_fee_advisory()
    }

    async fn on_leave_destination(&self) {
        self.refresh_fees("destination set").await;
    }

    async fn on_enter_fee(&self) {
        self.refresh_fees("fee step opened").await;
    }
}

// ---------------------------------------------------------------------------
// SendSession
// ---------------------------------------------------------------------------

/// One transfer of one asset from one wallet.
///
/// Call [`SendSession::refresh_balance`] before entering an amount; until
/// then the balance is zero and every amount exceeds it.
pub struct SendSession {
    id: Uuid,
    core: Arc<TransferCore>,
    flow: StepFlowController<TransferFlowContext>,
    guard: FeeRelevanceGuard,
    dispatcher: TransactionDispatcher,
    confirmation: Arc<dyn FeeIncreaseConfirmation>,
}

impl SendSession {
    /// Creates a session for `owner`'s `asset`. `fiat_rate` is the price of
    /// one whole coin, if known.
    pub fn new(
        asset: Asset,
        owner: &str,
        fiat_rate: Option<Decimal>,
        services: TransferServices,
        config: PipelineConfig,
    ) -> Self {
        let engine = Arc::new(FeeEngine::new(
            asset.clone(),
            Arc::clone(&services.network),
            config.clone(),
        ));

        let mut address_validator = AddressValidator::new(
            asset.clone(),
            vec![owner.to_string()],
            services.address_service,
        );
        if let Some(resolver) = services.alias_resolver {
            address_validator = address_validator.with_resolver(resolver);
        }

        let core = Arc::new(TransferCore {
            owner: owner.to_string(),
            network: Arc::clone(&services.network),
            engine: Arc::clone(&engine),
            aggregator: TransactionAggregator::new(asset.clone(), services.builder),
            address_validator,
            amount_validator: AmountValidator::new(asset.clone()),
            include_fee: BalanceIncludeFeeCalculator::for_asset(&asset),
            converter: Mutex::new(RateConverter::new(asset.decimals, fiat_rate)),
            entered: Mutex::new(None),
            balance: Mutex::new(0),
            destination_generation: AtomicU64::new(0),
            destination: Observable::new(None),
            amount: Observable::new(None),
            field: Observable::new(Ok(AdditionalFieldState::for_asset(&asset))),
            asset,
        });

        let mut dispatcher =
            TransactionDispatcher::new(&core.asset.symbol, services.network, services.signer);
        if let Some(store) = services.recent_addresses {
            dispatcher = dispatcher.with_recent_addresses(store);
        }

        let flow = StepFlowController::new(
            FlowTopology::Transfer,
            Arc::new(TransferFlowContext {
                core: Arc::clone(&core),
            }),
        );

        let id = Uuid::new_v4();
        info!(session = %id, asset = %core.asset.symbol, owner, "send session created");

        Self {
            id,
            guard: FeeRelevanceGuard::new(engine, config.fee_staleness_window()),
            core,
            flow,
            dispatcher,
            confirmation: services.fee_confirmation,
        }
    }

    /// Session identifier, carried in log fields.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The asset being sent.
    pub fn asset(&self) -> &Asset {
        &self.core.asset
    }

    /// The step flow driving this transfer.
    pub fn flow(&self) -> &StepFlowController<TransferFlowContext> {
        &self.flow
    }

    // -- Balance & rate -------------------------------------------------------

    /// Fetches the wallet balance and re-checks the amount against it.
    pub async fn refresh_balance(&self) -> Result<u128, SendError> {
        let balance = self.core.network.get_balance(&self.core.owner).await?;
        *self.core.balance.lock() = balance;
        self.core.aggregator.set_balance(balance);
        self.core.sync_fee();
        debug!(session = %self.id, balance, "balance refreshed");
        Ok(balance)
    }

    /// Last fetched balance.
    pub fn balance(&self) -> u128 {
        *self.core.balance.lock()
    }

    /// Replaces the fiat rate. An amount entered in fiat is re-converted.
    pub fn set_fiat_rate(&self, rate: Option<Decimal>) {
        let converter = {
            let mut converter = self.core.converter.lock();
            converter.rate = rate;
            *converter
        };
        let entered = self.core.entered.lock().clone();
        if let Some(entered) = entered {
            let _ = self.core.apply_amount(entered.rerated(&converter));
        }
    }

    // -- Fees -----------------------------------------------------------------

    /// Re-quotes fee options for the current amount and destination.
    pub async fn update_fees(&self) -> Result<FeeOptions, SendError> {
        Ok(self.core.update_fees().await?)
    }

    /// Selects a fee tier.
    pub fn select_fee(&self, option: FeeOption) -> Result<(), SendError> {
        self.core.engine.select(option)?;
        self.core.sync_fee();
        Ok(())
    }

    /// The selected tier.
    pub fn selected_fee_option(&self) -> FeeOption {
        self.core.engine.selected_option()
    }

    /// The selected fee, if usable.
    pub fn selected_fee(&self) -> Result<Fee, SendError> {
        Ok(self.core.engine.selected_fee()?)
    }

    /// Stream of fee option lists.
    pub fn fee_options_stream(&self) -> Subscription<FeeOptions> {
        self.core.engine.subscribe_options()
    }

    /// Advisory for the selected custom fee.
    pub fn custom_fee_advisory(&self) -> Option<FeeAdvisory> {
        self.core.engine.custom_fee_advisory()
    }

    /// Sets the custom fee total.
    pub fn set_custom_total(&self, total: u128) -> Result<Fee, SendError> {
        self.after_custom_edit(self.core.engine.set_custom_total(total))
    }

    /// Sets the custom fee rate per byte.
    pub fn set_custom_rate_per_byte(&self, rate_per_byte: u64) -> Result<Fee, SendError> {
        self.after_custom_edit(self.core.engine.set_custom_rate_per_byte(rate_per_byte))
    }

    /// Sets the custom gas limit.
    pub fn set_custom_gas_limit(&self, gas_limit: u64) -> Result<Fee, SendError> {
        self.after_custom_edit(self.core.engine.set_custom_gas_limit(gas_limit))
    }

    /// Sets the custom max fee per gas.
    pub fn set_custom_max_fee_per_gas(&self, max_fee_per_gas: u128) -> Result<Fee, SendError> {
        self.after_custom_edit(self.core.engine.set_custom_max_fee_per_gas(max_fee_per_gas))
    }

    /// Sets the custom priority fee.
    pub fn set_custom_priority_fee(&self, priority_fee: u128) -> Result<Fee, SendError> {
        self.after_custom_edit(self.core.engine.set_custom_priority_fee(priority_fee))
    }

    fn after_custom_edit(&self, edited: Result<Fee, FeeError>) -> Result<Fee, SendError> {
        self.core.sync_fee();
        Ok(edited?)
    }

    // -- Inputs ---------------------------------------------------------------

    /// Validates and sets the destination.
    ///
    /// A valid address from a source that auto-advances moves the flow
    /// past the destination step. A result overtaken by a newer call is
    /// returned but not published.
    pub async fn set_destination(
        &self,
        raw: &str,
        source: AddressSource,
    ) -> Result<Address, SendError> {
        let generation = self.core.destination_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let result = self
            .core
            .address_validator
            .validate_destination(raw, source)
            .await;
        if self.core.destination_generation.load(Ordering::SeqCst) != generation {
            debug!(session = %self.id, "destination validation superseded");
            return Ok(result?);
        }

        self.core
            .aggregator
            .set_destination(result.as_ref().ok().cloned());
        self.core.destination.set(Some(result.clone()));
        let address = result?;
        debug!(session = %self.id, destination = %address, ?source, "destination set");

        if source.auto_advances() && self.flow.current_step() == Step::Destination {
            if let Err(e) = self.flow.perform_next().await {
                debug!(session = %self.id, error = %e, "destination did not auto-advance");
            }
        }
        Ok(address)
    }

    /// Parses and sets the memo or destination tag.
    pub fn set_additional_field(&self, raw: &str) -> Result<AdditionalFieldState, SendError> {
        let field_type = self
            .core
            .asset
            .additional_field
            .ok_or(SendError::FieldNotSupported)?;
        let result = parse_additional_field(field_type, raw);
        self.core.field.set(result.clone());
        self.core.aggregator.set_additional_field(self.core.applied_field());
        Ok(result?)
    }

    /// Sets the amount, entered in whole coins or in fiat.
    pub fn set_amount(&self, value: Decimal, is_fiat: bool) -> Result<DualAmount, SendError> {
        let converter = *self.core.converter.lock();
        let entered = if is_fiat {
            Some(DualAmount::from_fiat(value, &converter))
        } else {
            converter
                .coins_to_units(value)
                .map(|units| DualAmount::from_crypto(units, &converter))
        };

        let Some(entered) = entered else {
            let error = ValidationError::Unconvertible {
                symbol: self.core.asset.symbol.clone(),
            };
            *self.core.entered.lock() = None;
            self.core.aggregator.set_amount(None);
            self.core.amount.set(Some(Err(error.clone())));
            return Err(error.into());
        };
        Ok(self.core.apply_amount(entered)?)
    }

    /// Stream of destination validation results.
    pub fn destination_validity_stream(&self) -> Subscription<Validity<Address>> {
        self.core.destination.subscribe()
    }

    /// Stream of amount validation results.
    pub fn amount_validity_stream(&self) -> Subscription<Validity<DualAmount>> {
        self.core.amount.subscribe()
    }

    // -- Draft ----------------------------------------------------------------

    /// The draft built from exactly the current inputs, if any.
    pub fn current_draft(&self) -> Option<TransactionDraft> {
        self.core.ready_draft()
    }

    /// Stream of every published draft.
    pub fn draft_stream(&self) -> Subscription<Option<TransactionDraft>> {
        self.core.aggregator.subscribe_draft()
    }

    /// Withdrawal warning for the current inputs.
    pub fn withdrawal_notification(&self) -> Option<WithdrawalNotification> {
        self.core.aggregator.withdrawal_notification()
    }

    /// `true` while a send is in flight.
    pub fn is_sending(&self) -> bool {
        self.dispatcher.is_sending()
    }

    async fn settled_draft(&self) -> Result<TransactionDraft, SendError> {
        self.core.aggregator.settled().await;
        if let Some(draft) = self.core.ready_draft() {
            return Ok(draft);
        }
        match self.core.aggregator.error() {
            Some(e) => Err(e.into()),
            None => Err(SendError::NoDraft),
        }
    }

    // -- Dispatch -------------------------------------------------------------

    /// Checks fee relevance and dispatches the current draft.
    ///
    /// A stale quote is re-fetched first. If the fee rose, the user must
    /// accept before the already-built draft goes out; the draft keeps the
    /// fee it was built with either way.
    pub async fn send(&self) -> Result<DispatchResult, SendError> {
        if self.flow.current_step() != Step::Summary {
            return Err(FlowError::NotAtSummary.into());
        }
        let draft = self.settled_draft().await?;

        if !self.guard.is_actual() {
            let amount = self.core.valid_units().unwrap_or(draft.amount);
            let outcome = self
                .guard
                .update_information(amount, &draft.destination.value)
                .await?;
            if let RelevanceOutcome::FeeWasIncreased { previous, current } = outcome {
                if !self.confirmation.confirm_fee_increase(previous, current).await {
                    info!(
                        session = %self.id,
                        previous = previous.amount,
                        current = current.amount,
                        "fee increase declined"
                    );
                    return Err(SendError::FeeIncreaseDeclined {
                        previous: previous.amount,
                        current: current.amount,
                    });
                }
                info!(
                    session = %self.id,
                    previous = previous.amount,
                    current = current.amount,
                    "fee increase accepted"
                );
            }
        }

        let result = self.dispatcher.send(&draft).await?;
        self.flow.mark_dispatched();
        info!(session = %self.id, hash = %result.hash, "transfer dispatched");
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::Advance;
    use crate::simulated::SimulatedNetwork;
    use crate::transaction::AssetFamily;
    use std::time::Duration;

    const OWNER: &str = "0x00000000000000000000000000000000000000aa";
    const DEST: &str = "0x00000000000000000000000000000000000000bb";

    async fn eth_session() -> (Arc<SimulatedNetwork>, SendSession) {
        let asset = Asset::coin("ETH", 18, AssetFamily::Evm);
        let network = Arc::new(SimulatedNetwork::new(asset.clone(), OWNER));
        network.set_balance(OWNER, 10u128.pow(18));
        network.set_fees(vec![Fee::fixed(100), Fee::fixed(200), Fee::fixed(300)]);
        let session = SendSession::new(
            asset,
            OWNER,
            Some(Decimal::new(2000, 0)),
            TransferServices::from_provider(network.clone()),
            PipelineConfig::default(),
        );
        session.refresh_balance().await.unwrap();
        (network, session)
    }

    // -- 1. Inputs -------------------------------------------------------------

    #[tokio::test]
    async fn typed_destination_does_not_auto_advance() {
        let (_network, session) = eth_session().await;
        session.set_destination(DEST, AddressSource::Typed).await.unwrap();
        assert_eq!(session.flow().current_step(), Step::Destination);
    }

    #[tokio::test]
    async fn scanned_destination_auto_advances_and_quotes() {
        let (network, session) = eth_session().await;
        session.set_destination(DEST, AddressSource::QrCode).await.unwrap();
        assert_eq!(session.flow().current_step(), Step::Amount);
        assert_eq!(network.fee_requests(), 1);
        assert_eq!(session.selected_fee(), Ok(Fee::fixed(200)));
    }

    #[tokio::test]
    async fn invalid_destination_is_published() {
        let (_network, session) = eth_session().await;
        let mut validity = session.destination_validity_stream();
        let result = session.set_destination("nope", AddressSource::Typed).await;
        assert!(matches!(
            result,
            Err(SendError::Validation(ValidationError::InvalidAddress { .. }))
        ));
        assert!(matches!(validity.current(), Some(Err(_))));
    }

    #[tokio::test]
    async fn fiat_amount_converts_through_rate() {
        let (_network, session) = eth_session().await;
        // 100 fiat at 2000 per coin = 0.05 ETH.
        let amount = session.set_amount(Decimal::new(100, 0), true).unwrap();
        assert_eq!(amount.crypto(), Some(5 * 10u128.pow(16)));
    }

    #[tokio::test]
    async fn fiat_amount_without_rate_is_unconvertible() {
        let (_network, session) = eth_session().await;
        session.set_fiat_rate(None);
        assert!(matches!(
            session.set_amount(Decimal::new(100, 0), true),
            Err(SendError::Validation(ValidationError::Unconvertible { .. }))
        ));
    }

    #[tokio::test]
    async fn memo_on_asset_without_field_is_refused() {
        let (_network, session) = eth_session().await;
        assert_eq!(
            session.set_additional_field("hello"),
            Err(SendError::FieldNotSupported)
        );
    }

    // -- 2. Fees and amount ------------------------------------------------------

    #[tokio::test]
    async fn fee_change_revalidates_amount() {
        let (network, session) = eth_session().await;
        network.set_balance(OWNER, 300);
        session.refresh_balance().await.unwrap();
        session.update_fees().await.unwrap();

        // 250 + market 200 exceeds the balance, so the fee is included.
        session.set_amount(Decimal::new(250, 18), false).unwrap();
        let mut validity = session.amount_validity_stream();
        assert!(matches!(validity.current(), Some(Ok(_))));

        // Fast (300) no longer fits inside the amount.
        session.select_fee(FeeOption::Fast).unwrap();
        assert_eq!(
            validity.current(),
            Some(Err(ValidationError::InsufficientForFee {
                amount: 250,
                fee: 300,
                spendable: 300,
            }))
        );
        assert_eq!(session.current_draft(), None);
    }

    // -- 3. Send -------------------------------------------------------------------

    async fn walk_to_summary(session: &SendSession) {
        session.set_destination(DEST, AddressSource::Typed).await.unwrap();
        session.flow().perform_next().await.unwrap();
        session.set_amount(Decimal::new(1, 3), false).unwrap();
        session.flow().perform_next().await.unwrap();
        assert_eq!(
            session.flow().perform_next().await.unwrap(),
            Advance::Moved(Step::Summary)
        );
    }

    #[tokio::test]
    async fn send_requires_summary() {
        let (_network, session) = eth_session().await;
        assert_eq!(
            session.send().await,
            Err(SendError::Flow(FlowError::NotAtSummary))
        );
    }

    #[tokio::test]
    async fn fresh_quote_sends_without_requote() {
        let (network, session) = eth_session().await;
        walk_to_summary(&session).await;
        let requests = network.fee_requests();

        let result = session.send().await.unwrap();
        assert_eq!(network.fee_requests(), requests);
        assert_eq!(network.balance(DEST), 10u128.pow(15));
        assert!(result.explorer_url.is_some());
        assert_eq!(session.flow().perform_finish(), Ok(Step::Finish));
    }

    #[tokio::test(start_paused = true)]
    async fn stale_increased_fee_can_be_declined() {
        let (network, session) = eth_session().await;
        walk_to_summary(&session).await;
        tokio::time::advance(Duration::from_secs(120)).await;

        network.set_fees(vec![Fee::fixed(100), Fee::fixed(500), Fee::fixed(900)]);
        network.set_confirms_fee_increase(false);
        assert_eq!(
            session.send().await,
            Err(SendError::FeeIncreaseDeclined {
                previous: 200,
                current: 500
            })
        );
        assert_eq!(network.fee_increase_prompts(), 1);
        assert!(network.submitted().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn accepted_fee_increase_sends_built_draft() {
        let (network, session) = eth_session().await;
        walk_to_summary(&session).await;
        let built = session.current_draft().unwrap();
        tokio::time::advance(Duration::from_secs(120)).await;

        network.set_fees(vec![Fee::fixed(100), Fee::fixed(500), Fee::fixed(900)]);
        network.set_confirms_fee_increase(true);
        session.send().await.unwrap();

        assert_eq!(network.fee_increase_prompts(), 1);
        let submitted = network.submitted();
        assert_eq!(submitted[0].draft, built);
        assert_eq!(submitted[0].draft.fee, Fee::fixed(200));
        // The published options are left as they were.
        assert_eq!(
            session.fee_options_stream().current().fee(FeeOption::Market),
            Some(Fee::fixed(200))
        );
    }
}
