//! # Transaction Aggregator
//!
//! Combines destination, amount and fee into a [`TransactionDraft`].
//!
//! Every input change starts a new computation and aborts the previous
//! one. Computations carry a generation number, and only the computation
//! whose generation is still current may publish. The draft stream
//! therefore only ever shows the result for the latest inputs; superseded
//! or failed work leaves the previous draft visible.
//!
//! Setters spawn onto the current tokio runtime and must be called from
//! within one.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::types::{
    AdditionalFieldState, Address, Asset, TransactionDraft, WithdrawalRule,
};
use crate::fee::Fee;
use crate::observable::{Observable, Subscription};
use crate::provider::{DraftRequest, ProviderError, TransactionBuilder};

// ---------------------------------------------------------------------------
// Errors & Notifications
// ---------------------------------------------------------------------------

/// Why no draft could be built from the current inputs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregatorError {
    /// The asset requires a memo or tag and the field is empty.
    #[error("a memo or destination tag is required for this asset")]
    MemoRequired,

    /// The fee would be deducted from an amount that cannot cover it.
    #[error("fee {fee} exceeds amount {amount}")]
    FeeExceedsAmount {
        /// Fee to deduct.
        fee: u128,
        /// Amount entered.
        amount: u128,
    },

    /// The transaction builder failed.
    #[error("transaction build failed: {0}")]
    Build(#[from] ProviderError),
}

/// Warning derived from the asset's [`WithdrawalRule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalNotification {
    /// The whole balance leaves and the account will be closed.
    AccountWillBeEmptied,
    /// The remainder is below the existential deposit and will be lost.
    ReserveWillBeLost {
        /// Balance that would be left and lost.
        remaining: u128,
    },
    /// The amount exceeds what one transaction can carry.
    ReduceAmount {
        /// Largest sendable amount.
        max: u128,
    },
}

// ---------------------------------------------------------------------------
// Fee Inclusion
// ---------------------------------------------------------------------------

/// Decides whether the fee is deducted from the entered amount.
pub trait IncludeFeeCalculator: Send + Sync {
    /// Returns `true` if `amount` should be reduced by `fee`.
    fn should_include_fee(&self, fee: &Fee, amount: u128, balance: u128) -> bool;
}

/// Includes the fee when it is paid in the same asset and `amount + fee`
/// would exceed the balance ("send max").
#[derive(Debug, Clone, Copy)]
pub struct BalanceIncludeFeeCalculator {
    fee_in_same_asset: bool,
}

impl BalanceIncludeFeeCalculator {
    /// Calculator for `asset`.
    pub fn for_asset(asset: &Asset) -> Self {
        Self {
            fee_in_same_asset: asset.fee_in_same_asset(),
        }
    }
}

impl IncludeFeeCalculator for BalanceIncludeFeeCalculator {
    fn should_include_fee(&self, fee: &Fee, amount: u128, balance: u128) -> bool {
        self.fee_in_same_asset && amount.saturating_add(fee.amount) > balance
    }
}

// ---------------------------------------------------------------------------
// Aggregator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
struct Inputs {
    destination: Option<Address>,
    amount: Option<u128>,
    fee: Option<Fee>,
    additional_field: AdditionalFieldState,
    balance: u128,
}

/// State the spawned computation writes to.
struct Published {
    draft: Observable<Option<TransactionDraft>>,
    error: Observable<Option<AggregatorError>>,
    computing: Observable<bool>,
    generation: AtomicU64,
    /// Held while comparing the generation and publishing, so a stale
    /// computation cannot publish between the check and the write.
    publish: Mutex<()>,
}

/// Builds drafts from live inputs.
pub struct TransactionAggregator {
    asset: Asset,
    builder: Arc<dyn TransactionBuilder>,
    include_fee: Arc<dyn IncludeFeeCalculator>,
    inputs: Mutex<Inputs>,
    published: Arc<Published>,
    withdrawal: Observable<Option<WithdrawalNotification>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl TransactionAggregator {
    /// Creates an aggregator with the default fee-inclusion rule.
    pub fn new(asset: Asset, builder: Arc<dyn TransactionBuilder>) -> Self {
        let include_fee = Arc::new(BalanceIncludeFeeCalculator::for_asset(&asset));
        Self::with_include_fee_calculator(asset, builder, include_fee)
    }

    /// Creates an aggregator with a custom fee-inclusion rule.
    pub fn with_include_fee_calculator(
        asset: Asset,
        builder: Arc<dyn TransactionBuilder>,
        include_fee: Arc<dyn IncludeFeeCalculator>,
    ) -> Self {
        let inputs = Inputs {
            destination: None,
            amount: None,
            fee: None,
            additional_field: AdditionalFieldState::for_asset(&asset),
            balance: 0,
        };
        Self {
            asset,
            builder,
            include_fee,
            inputs: Mutex::new(inputs),
            published: Arc::new(Published {
                draft: Observable::new(None),
                error: Observable::new(None),
                computing: Observable::new(false),
                generation: AtomicU64::new(0),
                publish: Mutex::new(()),
            }),
            withdrawal: Observable::new(None),
            task: Mutex::new(None),
        }
    }

    // -- Inputs ---------------------------------------------------------------

    /// Sets or clears the destination.
    pub fn set_destination(&self, destination: Option<Address>) {
        self.update_inputs(|inputs| inputs.destination = destination);
    }

    /// Sets or clears the amount, in smallest units.
    pub fn set_amount(&self, amount: Option<u128>) {
        self.update_inputs(|inputs| inputs.amount = amount);
    }

    /// Sets or clears the fee.
    pub fn set_fee(&self, fee: Option<Fee>) {
        self.update_inputs(|inputs| inputs.fee = fee);
    }

    /// Sets the memo / tag state.
    pub fn set_additional_field(&self, state: AdditionalFieldState) {
        self.update_inputs(|inputs| inputs.additional_field = state);
    }

    /// Sets the balance the fee-inclusion rule compares against.
    pub fn set_balance(&self, balance: u128) {
        self.update_inputs(|inputs| inputs.balance = balance);
    }

    fn update_inputs<F: FnOnce(&mut Inputs)>(&self, f: F) {
        let changed = {
            let mut inputs = self.inputs.lock();
            let before = inputs.clone();
            f(&mut inputs);
            *inputs != before
        };
        if changed {
            self.recompute();
        }
    }

    // -- Computation ----------------------------------------------------------

    /// Holds the task slot from the generation bump until the new task is
    /// stored. Concurrent setters therefore abort each other in generation
    /// order and never orphan a running build.
    fn recompute(&self) {
        let mut task = self.task.lock();
        let generation = {
            let _publish = self.published.publish.lock();
            self.published.generation.fetch_add(1, Ordering::SeqCst) + 1
        };
        if let Some(previous) = task.take() {
            previous.abort();
        }

        let inputs = self.inputs.lock().clone();
        self.withdrawal.set_if_changed(self.withdrawal_notification_for(&inputs));

        let request = match self.prepare(&inputs, generation) {
            Ok(Some(request)) => request,
            Ok(None) => {
                self.published.computing.set_if_changed(false);
                return;
            }
            Err(e) => {
                debug!(asset = %self.asset.symbol, error = %e, "draft inputs rejected");
                self.published.error.set(Some(e));
                self.published.computing.set_if_changed(false);
                return;
            }
        };

        self.published.computing.set_if_changed(true);
        let published = Arc::clone(&self.published);
        let builder = Arc::clone(&self.builder);
        let symbol = self.asset.symbol.clone();

        let handle = tokio::spawn(async move {
            let result = builder.build(request).await;

            let _publish = published.publish.lock();
            if published.generation.load(Ordering::SeqCst) != generation {
                debug!(asset = %symbol, generation, "draft computation superseded");
                return;
            }
            match result {
                Ok(draft) => {
                    debug!(asset = %symbol, generation, amount = draft.amount, "draft built");
                    published.draft.set(Some(draft));
                    published.error.set(None);
                }
                Err(e) => {
                    warn!(asset = %symbol, generation, error = %e, "draft build failed");
                    published.error.set(Some(AggregatorError::Build(e)));
                }
            }
            published.computing.set(false);
        });
        *task = Some(handle);
    }

    /// A build request if every input is present, `None` if something is
    /// still missing.
    fn prepare(
        &self,
        inputs: &Inputs,
        generation: u64,
    ) -> Result<Option<DraftRequest>, AggregatorError> {
        let (destination, amount, fee) = match (&inputs.destination, inputs.amount, inputs.fee) {
            (Some(destination), Some(amount), Some(fee)) => (destination.clone(), amount, fee),
            _ => return Ok(None),
        };

        if self.asset.additional_field_required && inputs.additional_field.is_empty() {
            return Err(AggregatorError::MemoRequired);
        }

        let includes_fee = self
            .include_fee
            .should_include_fee(&fee, amount, inputs.balance);
        let amount = if includes_fee {
            if fee.amount >= amount {
                return Err(AggregatorError::FeeExceedsAmount {
                    fee: fee.amount,
                    amount,
                });
            }
            amount - fee.amount
        } else {
            amount
        };

        Ok(Some(DraftRequest {
            destination,
            amount,
            fee,
            additional_field: inputs.additional_field.clone(),
            includes_fee,
            revision: generation,
        }))
    }

    fn withdrawal_notification_for(&self, inputs: &Inputs) -> Option<WithdrawalNotification> {
        let rule = self.asset.withdrawal_rule.as_ref()?;
        let amount = inputs.amount?;

        match rule {
            WithdrawalRule::MaxAmountPerTransaction { max_amount } => (amount > *max_amount)
                .then_some(WithdrawalNotification::ReduceAmount { max: *max_amount }),
            WithdrawalRule::ExistentialDeposit { minimum } => {
                let fee = match inputs.fee {
                    Some(fee) if self.asset.fee_in_same_asset() => {
                        if self.include_fee.should_include_fee(&fee, amount, inputs.balance) {
                            0
                        } else {
                            fee.amount
                        }
                    }
                    _ => 0,
                };
                let debit = amount.saturating_add(fee);
                let remaining = inputs.balance.checked_sub(debit)?;
                if remaining == 0 {
                    Some(WithdrawalNotification::AccountWillBeEmptied)
                } else if remaining < *minimum {
                    Some(WithdrawalNotification::ReserveWillBeLost { remaining })
                } else {
                    None
                }
            }
        }
    }

    // -- Outputs --------------------------------------------------------------

    /// The latest successfully built draft.
    pub fn draft(&self) -> Option<TransactionDraft> {
        self.published.draft.get()
    }

    /// Stream of drafts.
    pub fn subscribe_draft(&self) -> Subscription<Option<TransactionDraft>> {
        self.published.draft.subscribe()
    }

    /// The latest build or input error, cleared by the next success.
    pub fn error(&self) -> Option<AggregatorError> {
        self.published.error.get()
    }

    /// Stream of errors.
    pub fn subscribe_error(&self) -> Subscription<Option<AggregatorError>> {
        self.published.error.subscribe()
    }

    /// `true` while a computation is in flight.
    pub fn is_computing(&self) -> bool {
        self.published.computing.get()
    }

    /// Current withdrawal warning, if the asset defines a rule.
    pub fn withdrawal_notification(&self) -> Option<WithdrawalNotification> {
        self.withdrawal.get()
    }

    /// Stream of withdrawal warnings.
    pub fn subscribe_withdrawal_notification(&self) -> Subscription<Option<WithdrawalNotification>> {
        self.withdrawal.subscribe()
    }

    /// Waits for the in-flight computation, if any, and returns the draft.
    pub async fn settled(&self) -> Option<TransactionDraft> {
        let mut computing = self.published.computing.subscribe();
        computing.wait_for(|busy| !*busy).await;
        self.draft()
    }
}

impl Drop for TransactionAggregator {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulated::SimulatedNetwork;
    use crate::transaction::{AddressSource, AdditionalFieldType, AdditionalParams, AssetFamily};
    use std::time::Duration;

    const DEST: &str = "0x00000000000000000000000000000000000000d1";

    fn eth() -> Asset {
        Asset::coin("ETH", 18, AssetFamily::Evm)
    }

    fn setup(asset: Asset) -> (Arc<SimulatedNetwork>, TransactionAggregator) {
        let network = Arc::new(SimulatedNetwork::new(asset.clone(), "0xowner"));
        let aggregator = TransactionAggregator::new(asset, network.clone());
        (network, aggregator)
    }

    fn fill(aggregator: &TransactionAggregator, amount: u128) {
        aggregator.set_balance(1_000_000_000);
        aggregator.set_destination(Some(Address::new(DEST, AddressSource::Typed)));
        aggregator.set_fee(Some(Fee::evm(21_000, 10, 1)));
        aggregator.set_amount(Some(amount));
    }

    // -- 1. Basic construction ------------------------------------------------

    #[tokio::test]
    async fn draft_appears_once_all_inputs_present() {
        let (_network, aggregator) = setup(eth());
        aggregator.set_destination(Some(Address::new(DEST, AddressSource::Typed)));
        assert_eq!(aggregator.settled().await, None);

        aggregator.set_amount(Some(1_000));
        assert_eq!(aggregator.settled().await, None);

        aggregator.set_fee(Some(Fee::evm(21_000, 10, 1)));
        let draft = aggregator.settled().await.unwrap();
        assert_eq!(draft.amount, 1_000);
        assert_eq!(draft.destination.value, DEST);
        assert!(draft.revision > 0);
    }

    #[tokio::test]
    async fn clearing_an_input_keeps_previous_draft() {
        let (_network, aggregator) = setup(eth());
        fill(&aggregator, 1_000);
        let before = aggregator.settled().await.unwrap();

        aggregator.set_fee(None);
        assert_eq!(aggregator.settled().await, Some(before));
    }

    // -- 2. Supersession ------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn rapid_amount_changes_end_with_latest() {
        let (network, aggregator) = setup(eth());
        network.set_build_latency(1, Duration::from_millis(300));
        network.set_build_latency(2, Duration::from_millis(200));
        network.set_build_latency(3, Duration::from_millis(100));

        fill(&aggregator, 1);
        aggregator.set_amount(Some(2));
        aggregator.set_amount(Some(3));

        let draft = aggregator.settled().await.unwrap();
        assert_eq!(draft.amount, 3);

        // Let every superseded build run to its latency; none may publish.
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(aggregator.draft().unwrap().amount, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_latest_build_is_not_overtaken() {
        let (network, aggregator) = setup(eth());
        network.set_build_latency(1, Duration::from_millis(10));
        network.set_build_latency(3, Duration::from_millis(400));

        fill(&aggregator, 1);
        aggregator.set_amount(Some(3));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(aggregator.is_computing());
        assert_eq!(aggregator.draft(), None);

        assert_eq!(aggregator.settled().await.unwrap().amount, 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_setters_settle_on_latest_amount() {
        let (_network, aggregator) = setup(eth());
        let aggregator = Arc::new(aggregator);
        fill(&aggregator, 1);

        let writers: Vec<_> = (0..4u128)
            .map(|writer| {
                let aggregator = Arc::clone(&aggregator);
                tokio::spawn(async move {
                    for i in 0..200u128 {
                        aggregator.set_amount(Some(10_000 + writer * 1_000 + i));
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap();
        }
        aggregator.set_amount(Some(777));

        let draft = tokio::time::timeout(Duration::from_secs(5), aggregator.settled())
            .await
            .expect("aggregator settles once writers stop")
            .unwrap();
        assert_eq!(draft.amount, 777);
        assert!(!aggregator.is_computing());
    }

    // -- 3. Failures ----------------------------------------------------------

    #[tokio::test]
    async fn build_failure_keeps_previous_draft() {
        let (network, aggregator) = setup(eth());
        fill(&aggregator, 1_000);
        let before = aggregator.settled().await.unwrap();

        network.fail_build(Some(ProviderError::Construction("no utxos".into())));
        aggregator.set_amount(Some(2_000));
        assert_eq!(aggregator.settled().await, Some(before));
        assert!(matches!(aggregator.error(), Some(AggregatorError::Build(_))));

        network.fail_build(None);
        aggregator.set_amount(Some(3_000));
        assert_eq!(aggregator.settled().await.unwrap().amount, 3_000);
        assert_eq!(aggregator.error(), None);
    }

    #[tokio::test]
    async fn required_memo_blocks_construction() {
        let asset = Asset {
            additional_field: Some(AdditionalFieldType::Memo),
            additional_field_required: true,
            ..Asset::coin("ATOM", 6, AssetFamily::Account)
        };
        let (_network, aggregator) = setup(asset);
        fill(&aggregator, 1_000);

        assert_eq!(aggregator.settled().await, None);
        assert_eq!(aggregator.error(), Some(AggregatorError::MemoRequired));

        aggregator.set_additional_field(AdditionalFieldState::Filled {
            field_type: AdditionalFieldType::Memo,
            value: "exchange-123".into(),
            params: AdditionalParams::Memo("exchange-123".into()),
        });
        let draft = aggregator.settled().await.unwrap();
        assert!(draft.additional_field.params().is_some());
    }

    // -- 4. Fee inclusion -----------------------------------------------------

    #[tokio::test]
    async fn send_max_deducts_fee() {
        let (_network, aggregator) = setup(eth());
        fill(&aggregator, 1_000_000_000);

        let draft = aggregator.settled().await.unwrap();
        assert!(draft.includes_fee);
        assert_eq!(draft.amount, 1_000_000_000 - 210_000);
    }

    #[tokio::test]
    async fn token_never_includes_fee() {
        let (_network, aggregator) = setup(Asset::token("USDT", 6, "0xdac1"));
        fill(&aggregator, 1_000_000_000);
        assert!(!aggregator.settled().await.unwrap().includes_fee);
    }

    #[tokio::test]
    async fn fee_larger_than_amount_is_rejected() {
        let (_network, aggregator) = setup(eth());
        aggregator.set_balance(100);
        aggregator.set_destination(Some(Address::new(DEST, AddressSource::Typed)));
        aggregator.set_fee(Some(Fee::fixed(500)));
        aggregator.set_amount(Some(100));

        assert_eq!(aggregator.settled().await, None);
        assert_eq!(
            aggregator.error(),
            Some(AggregatorError::FeeExceedsAmount {
                fee: 500,
                amount: 100
            })
        );
    }

    // -- 5. Withdrawal rules --------------------------------------------------

    #[tokio::test]
    async fn existential_deposit_notifications() {
        let asset = Asset {
            withdrawal_rule: Some(WithdrawalRule::ExistentialDeposit { minimum: 100 }),
            ..Asset::coin("DOT", 10, AssetFamily::Account)
        };
        let (_network, aggregator) = setup(asset);
        aggregator.set_balance(1_000);
        aggregator.set_fee(Some(Fee::fixed(10)));

        aggregator.set_amount(Some(500));
        assert_eq!(aggregator.withdrawal_notification(), None);

        aggregator.set_amount(Some(950));
        assert_eq!(
            aggregator.withdrawal_notification(),
            Some(WithdrawalNotification::ReserveWillBeLost { remaining: 40 })
        );

        aggregator.set_amount(Some(990));
        assert_eq!(
            aggregator.withdrawal_notification(),
            Some(WithdrawalNotification::AccountWillBeEmptied)
        );
    }

    #[tokio::test]
    async fn max_amount_rule_suggests_reduction() {
        let asset = Asset {
            withdrawal_rule: Some(WithdrawalRule::MaxAmountPerTransaction { max_amount: 700 }),
            ..Asset::coin("ADA", 6, AssetFamily::Account)
        };
        let (_network, aggregator) = setup(asset);
        aggregator.set_amount(Some(800));
        assert_eq!(
            aggregator.withdrawal_notification(),
            Some(WithdrawalNotification::ReduceAmount { max: 700 })
        );
    }
}
