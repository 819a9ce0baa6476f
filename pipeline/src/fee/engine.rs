//! # Fee Engine
//!
//! Quotes fee tiers for a pending amount and destination, publishes them as
//! an observable [`FeeOptions`] list, tracks the selected tier, and owns the
//! asset's custom fee strategy.
//!
//! ## Tier mapping
//!
//! | Quotes returned | Options offered |
//! |-----------------|-----------------|
//! | 1 | `market` |
//! | 3 | `slow`, `market`, `fast` (ascending by amount) |
//! | anything else | protocol mismatch |
//!
//! `custom` is appended for families with a [`CustomFeeStrategy`].
//!
//! ## Supersession
//!
//! Every [`FeeEngine::update_fees`] call takes a generation number. A
//! quote that returns after a newer call started is dropped without being
//! published.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::custom::CustomFeeStrategy;
use super::error::{CustomFeeError, FeeError};
use super::types::{Fee, FeeOption, FeeOptions, FeeValue};
use crate::config::PipelineConfig;
use crate::observable::{Observable, Subscription};
use crate::provider::NetworkProvider;
use crate::transaction::{Asset, AssetFamily};

/// Warning attached to a custom fee far from the quoted tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeAdvisory {
    /// Below the cheapest quoted tier; the transaction may never confirm.
    TooLow,
    /// Above the most expensive tier times the configured multiplier.
    TooHigh,
}

#[derive(Debug)]
struct CustomState {
    strategy: CustomFeeStrategy,
    /// Set once the user edits any input; stops re-seeding from market.
    edited: bool,
}

/// Fee quoting and selection for one asset.
pub struct FeeEngine {
    asset: Asset,
    provider: Arc<dyn NetworkProvider>,
    config: PipelineConfig,
    options: Observable<FeeOptions>,
    selected: Observable<FeeOption>,
    generation: AtomicU64,
    custom: Mutex<Option<CustomState>>,
    last_quoted_at: Mutex<Option<Instant>>,
}

impl FeeEngine {
    /// Creates an engine with nothing quoted and `market` selected.
    pub fn new(asset: Asset, provider: Arc<dyn NetworkProvider>, config: PipelineConfig) -> Self {
        let custom = CustomFeeStrategy::for_family(asset.family).map(|strategy| CustomState {
            strategy,
            edited: false,
        });
        Self {
            asset,
            provider,
            config,
            options: Observable::new(FeeOptions::default()),
            selected: Observable::new(FeeOption::Market),
            generation: AtomicU64::new(0),
            custom: Mutex::new(custom),
            last_quoted_at: Mutex::new(None),
        }
    }

    // -----------------------------------------------------------------------
    // Quoting
    // -----------------------------------------------------------------------

    /// Maps raw provider quotes onto tiers.
    pub fn map_quotes(mut fees: Vec<Fee>) -> Result<Vec<(FeeOption, Fee)>, FeeError> {
        match fees.len() {
            1 => Ok(vec![(FeeOption::Market, fees[0])]),
            3 => {
                fees.sort_by_key(|fee| fee.amount);
                Ok(vec![
                    (FeeOption::Slow, fees[0]),
                    (FeeOption::Market, fees[1]),
                    (FeeOption::Fast, fees[2]),
                ])
            }
            count => {
                error!(count, "provider returned an unsupported number of fee quotes");
                Err(FeeError::ProtocolMismatch { count })
            }
        }
    }

    /// Quotes tiers from the provider without publishing anything.
    pub async fn fetch_quotes(
        &self,
        amount: u128,
        destination: &str,
    ) -> Result<Vec<(FeeOption, Fee)>, FeeError> {
        let fees = self.provider.get_fee(amount, destination).await?;
        Self::map_quotes(fees)
    }

    /// Re-quotes and publishes the option list.
    ///
    /// Publishes `Loading` for every currently offered option first. On
    /// failure every option is published as `FailedToLoad` with the same
    /// error, which is also returned.
    pub async fn update_fees(&self, amount: u128, destination: &str) -> Result<FeeOptions, FeeError> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let offered = self.offered_options();
        self.options.set(FeeOptions::loading(&offered));

        let quoted = self.fetch_quotes(amount, destination).await;
        let size_bytes = match (&quoted, self.asset.family) {
            (Ok(_), AssetFamily::Utxo) => {
                match self.provider.estimate_transaction_size(amount, destination).await {
                    Ok(size) => Some(size),
                    Err(e) => {
                        warn!(asset = %self.asset.symbol, error = %e, "transaction size estimate failed");
                        None
                    }
                }
            }
            _ => None,
        };

        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(asset = %self.asset.symbol, generation, "fee quote superseded");
            return Err(FeeError::Superseded);
        }

        match quoted {
            Ok(quotes) => {
                let options = self.publish_quotes(quotes, size_bytes);
                info!(
                    asset = %self.asset.symbol,
                    options = options.options().len(),
                    "fee options loaded"
                );
                Ok(options)
            }
            Err(e) => {
                warn!(asset = %self.asset.symbol, error = %e, "fee quote failed");
                self.options.set(FeeOptions::failed(&offered, e.clone()));
                Err(e)
            }
        }
    }

    fn publish_quotes(&self, quotes: Vec<(FeeOption, Fee)>, size_bytes: Option<u64>) -> FeeOptions {
        let market = quotes
            .iter()
            .find(|(option, _)| *option == FeeOption::Market)
            .map(|(_, fee)| *fee);

        let mut entries: Vec<(FeeOption, FeeValue)> = quotes
            .into_iter()
            .map(|(option, fee)| (option, FeeValue::Loaded(fee)))
            .collect();

        if let Some(state) = self.custom.lock().as_mut() {
            if !state.edited {
                if let Some(market) = market {
                    state.strategy.seed(&market, size_bytes);
                }
            } else if let Some(size) = size_bytes {
                state.strategy.set_size_bytes(size);
            }
            entries.push((
                FeeOption::Custom,
                FeeValue::Loaded(state.strategy.current_fee()),
            ));
        }

        let options = FeeOptions::new(entries);
        if !options.contains(self.selected.get()) {
            self.selected.set(FeeOption::Market);
        }
        self.options.set(options.clone());
        self.mark_quoted();
        options
    }

    /// Options to show as loading before the first quote arrives.
    fn offered_options(&self) -> Vec<FeeOption> {
        let current = self.options.get().options();
        if !current.is_empty() {
            return current;
        }
        let mut offered = vec![FeeOption::Market];
        if self.supports_custom() {
            offered.push(FeeOption::Custom);
        }
        offered
    }

    // -----------------------------------------------------------------------
    // Selection
    // -----------------------------------------------------------------------

    /// Selects a tier. Fails if it is not currently offered.
    pub fn select(&self, option: FeeOption) -> Result<(), FeeError> {
        if !self.options.get().contains(option) {
            return Err(FeeError::OptionUnavailable(option));
        }
        self.selected.set(option);
        debug!(asset = %self.asset.symbol, %option, "fee option selected");
        Ok(())
    }

    /// The selected tier.
    pub fn selected_option(&self) -> FeeOption {
        self.selected.get()
    }

    /// The fee of the selected tier, or why it cannot be used.
    ///
    /// A custom fee is only returned once its inputs are complete and valid.
    pub fn selected_fee(&self) -> Result<Fee, FeeError> {
        let option = self.selected.get();
        if option == FeeOption::Custom {
            let guard = self.custom.lock();
            let state = guard.as_ref().ok_or(CustomFeeError::Unsupported)?;
            return Ok(state.strategy.finalize()?);
        }
        self.options
            .get()
            .fee(option)
            .ok_or(FeeError::NotLoaded(option))
    }

    /// Current option list.
    pub fn options(&self) -> FeeOptions {
        self.options.get()
    }

    /// Stream of option lists.
    pub fn subscribe_options(&self) -> Subscription<FeeOptions> {
        self.options.subscribe()
    }

    /// Stream of selections.
    pub fn subscribe_selected(&self) -> Subscription<FeeOption> {
        self.selected.subscribe()
    }

    // -----------------------------------------------------------------------
    // Custom Fee
    // -----------------------------------------------------------------------

    /// Whether this asset offers a custom fee.
    pub fn supports_custom(&self) -> bool {
        self.custom.lock().is_some()
    }

    /// Snapshot of the custom strategy inputs.
    pub fn custom_strategy(&self) -> Option<CustomFeeStrategy> {
        self.custom.lock().as_ref().map(|state| state.strategy)
    }

    /// Applies an edit to the custom strategy and republishes the custom
    /// option. Returns the fee now shown for `custom`.
    pub fn edit_custom<F>(&self, edit: F) -> Result<Fee, FeeError>
    where
        F: FnOnce(&mut CustomFeeStrategy) -> Result<(), CustomFeeError>,
    {
        let current = {
            let mut guard = self.custom.lock();
            let state = guard.as_mut().ok_or(CustomFeeError::Unsupported)?;
            edit(&mut state.strategy)?;
            state.edited = true;
            state.strategy.current_fee()
        };
        self.options
            .update(|options| options.set(FeeOption::Custom, FeeValue::Loaded(current)));
        Ok(current)
    }

    /// Edits the custom total (gas strategy only).
    pub fn set_custom_total(&self, total: u128) -> Result<Fee, FeeError> {
        self.edit_custom(|strategy| strategy.set_total(total))
    }

    /// Edits the custom rate per byte (rate strategy only).
    pub fn set_custom_rate_per_byte(&self, rate_per_byte: u64) -> Result<Fee, FeeError> {
        self.edit_custom(|strategy| strategy.set_rate_per_byte(rate_per_byte))
    }

    /// Edits the custom gas limit.
    pub fn set_custom_gas_limit(&self, gas_limit: u64) -> Result<Fee, FeeError> {
        self.edit_custom(|strategy| strategy.set_gas_limit(gas_limit))
    }

    /// Edits the custom max fee per gas.
    pub fn set_custom_max_fee_per_gas(&self, max_fee_per_gas: u128) -> Result<Fee, FeeError> {
        self.edit_custom(|strategy| strategy.set_max_fee_per_gas(max_fee_per_gas))
    }

    /// Edits the custom priority fee.
    pub fn set_custom_priority_fee(&self, priority_fee: u128) -> Result<Fee, FeeError> {
        self.edit_custom(|strategy| strategy.set_priority_fee(priority_fee))
    }

    /// Advisory for the selected custom fee, if it needs confirmation.
    ///
    /// `None` when another tier is selected or nothing is quoted yet.
    pub fn custom_fee_advisory(&self) -> Option<FeeAdvisory> {
        if self.selected.get() != FeeOption::Custom {
            return None;
        }
        let custom = self.custom_strategy()?.finalize().ok()?;
        let (lowest, highest) = self.options.get().quoted_bounds()?;

        let ceiling = highest
            .amount
            .saturating_mul(u128::from(self.config.custom_fee_too_high_multiplier));
        if custom.amount < lowest.amount {
            Some(FeeAdvisory::TooLow)
        } else if custom.amount > ceiling {
            Some(FeeAdvisory::TooHigh)
        } else {
            None
        }
    }

    // -----------------------------------------------------------------------
    // Staleness Bookkeeping
    // -----------------------------------------------------------------------

    /// Records that the published quote is fresh as of now.
    pub fn mark_quoted(&self) {
        *self.last_quoted_at.lock() = Some(Instant::now());
    }

    /// When the published quote was last refreshed.
    pub fn last_quoted_at(&self) -> Option<Instant> {
        *self.last_quoted_at.lock()
    }

    /// The asset this engine quotes for.
    pub fn asset(&self) -> &Asset {
        &self.asset
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
