//! User-editable custom fees.
//!
//! Two strategies, chosen by the asset's fee family:
//!
//! | Strategy | Inputs | Fee |
//! |----------|--------|-----|
//! | [`RateBasedFee`] (UTXO) | rate per byte, estimated size | `rate x size` |
//! | [`GasBasedFee`] (EVM)   | gas limit, max fee per gas, priority fee | `gas_limit x max_fee_per_gas` |
//!
//! While inputs are incomplete the strategy shows a zero-fee placeholder,
//! which [`CustomFeeStrategy::finalize`] never hands out as a usable fee.

use super::error::CustomFeeError;
use super::types::{Fee, FeeParameters};
use crate::transaction::AssetFamily;

// ---------------------------------------------------------------------------
// Rate-based (UTXO)
// ---------------------------------------------------------------------------

/// Custom fee for UTXO chains. Only the rate is editable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateBasedFee {
    /// Satoshi (or equivalent) per byte.
    pub rate_per_byte: Option<u64>,
    /// Estimated transaction size for the current amount and destination.
    pub size_bytes: Option<u64>,
}

impl RateBasedFee {
    fn fee(&self) -> Option<Fee> {
        Some(Fee::utxo(self.rate_per_byte?, self.size_bytes?))
    }
}

// ---------------------------------------------------------------------------
// Gas-based (EVM)
// ---------------------------------------------------------------------------

/// Custom fee for EIP-1559 chains.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GasBasedFee {
    /// Gas units.
    pub gas_limit: Option<u64>,
    /// Max total price per gas unit, in wei.
    pub max_fee_per_gas: Option<u128>,
    /// Tip per gas unit, in wei.
    pub priority_fee: Option<u128>,
}

impl GasBasedFee {
    fn fee(&self) -> Option<Fee> {
        Some(Fee::evm(
            self.gas_limit?,
            self.max_fee_per_gas?,
            self.priority_fee?,
        ))
    }

    /// Back-solves `max_fee_per_gas = floor(total / gas_limit)`.
    fn set_total(&mut self, total: u128) -> Result<(), CustomFeeError> {
        let gas_limit = self.gas_limit.ok_or(CustomFeeError::Incomplete)?;
        if gas_limit == 0 {
            return Err(CustomFeeError::ZeroGasLimit);
        }
        self.max_fee_per_gas = Some(total / u128::from(gas_limit));
        Ok(())
    }

    fn validate(&self) -> Result<(), CustomFeeError> {
        let gas_limit = self.gas_limit.ok_or(CustomFeeError::Incomplete)?;
        let max_fee_per_gas = self.max_fee_per_gas.ok_or(CustomFeeError::Incomplete)?;
        let priority_fee = self.priority_fee.ok_or(CustomFeeError::Incomplete)?;
        if gas_limit == 0 {
            return Err(CustomFeeError::ZeroGasLimit);
        }
        if priority_fee > max_fee_per_gas {
            return Err(CustomFeeError::PriorityFeeExceedsMaxFee {
                priority_fee,
                max_fee_per_gas,
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Strategy
// ---------------------------------------------------------------------------

/// The custom fee strategy of one asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CustomFeeStrategy {
    /// UTXO chains.
    RateBased(RateBasedFee),
    /// EVM chains.
    GasBased(GasBasedFee),
}

impl CustomFeeStrategy {
    /// The strategy for a fee family, or `None` if its fees are not editable.
    pub fn for_family(family: AssetFamily) -> Option<Self> {
        match family {
            AssetFamily::Utxo => Some(Self::RateBased(RateBasedFee::default())),
            AssetFamily::Evm => Some(Self::GasBased(GasBasedFee::default())),
            AssetFamily::Account => None,
        }
    }

    /// Copies the inputs from a quoted fee. `size_bytes` refreshes the
    /// UTXO size estimate and is ignored by the gas strategy.
    ///
    /// A quote whose parameters belong to another family is ignored.
    pub fn seed(&mut self, quoted: &Fee, size_bytes: Option<u64>) {
        match (self, quoted.parameters) {
            (Self::RateBased(rate), FeeParameters::Utxo { rate_per_byte }) => {
                rate.rate_per_byte = Some(rate_per_byte);
                if size_bytes.is_some() {
                    rate.size_bytes = size_bytes;
                }
            }
            (
                Self::GasBased(gas),
                FeeParameters::Evm {
                    gas_limit,
                    max_fee_per_gas,
                    priority_fee,
                },
            ) => {
                *gas = GasBasedFee {
                    gas_limit: Some(gas_limit),
                    max_fee_per_gas: Some(max_fee_per_gas),
                    priority_fee: Some(priority_fee),
                };
            }
            _ => {}
        }
    }

    /// Updates the size estimate without touching the user's rate.
    pub fn set_size_bytes(&mut self, size_bytes: u64) {
        if let Self::RateBased(rate) = self {
            rate.size_bytes = Some(size_bytes);
        }
    }

    /// The fee as currently shown: computed from the inputs, or the zero
    /// placeholder while an input is missing.
    pub fn current_fee(&self) -> Fee {
        match self {
            Self::RateBased(rate) => rate
                .fee()
                .unwrap_or_else(|| Fee::zero(FeeParameters::Utxo { rate_per_byte: 0 })),
            Self::GasBased(gas) => gas.fee().unwrap_or_else(|| {
                Fee::zero(FeeParameters::Evm {
                    gas_limit: 0,
                    max_fee_per_gas: 0,
                    priority_fee: 0,
                })
            }),
        }
    }

    /// The fee to send with, or why there is none.
    pub fn finalize(&self) -> Result<Fee, CustomFeeError> {
        match self {
            Self::RateBased(rate) => rate.fee().ok_or(CustomFeeError::Incomplete),
            Self::GasBased(gas) => {
                gas.validate()?;
                gas.fee().ok_or(CustomFeeError::Incomplete)
            }
        }
    }

    /// Edits the total fee. Read-only for the rate strategy.
    pub fn set_total(&mut self, total: u128) -> Result<(), CustomFeeError> {
        match self {
            Self::RateBased(_) => Err(CustomFeeError::ReadOnly { field: "fee" }),
            Self::GasBased(gas) => gas.set_total(total),
        }
    }

    /// Edits the rate per byte.
    pub fn set_rate_per_byte(&mut self, rate_per_byte: u64) -> Result<(), CustomFeeError> {
        match self {
            Self::RateBased(rate) => {
                rate.rate_per_byte = Some(rate_per_byte);
                Ok(())
            }
            Self::GasBased(_) => Err(CustomFeeError::Unsupported),
        }
    }

    /// Edits the gas limit.
    pub fn set_gas_limit(&mut self, gas_limit: u64) -> Result<(), CustomFeeError> {
        self.gas_mut()?.gas_limit = Some(gas_limit);
        Ok(())
    }

    /// Edits the max fee per gas.
    pub fn set_max_fee_per_gas(&mut self, max_fee_per_gas: u128) -> Result<(), CustomFeeError> {
        self.gas_mut()?.max_fee_per_gas = Some(max_fee_per_gas);
        Ok(())
    }

    /// Edits the priority fee. A tip above the max fee is accepted here and
    /// reported by [`Self::finalize`].
    pub fn set_priority_fee(&mut self, priority_fee: u128) -> Result<(), CustomFeeError> {
        self.gas_mut()?.priority_fee = Some(priority_fee);
        Ok(())
    }

    fn gas_mut(&mut self) -> Result<&mut GasBasedFee, CustomFeeError> {
        match self {
            Self::GasBased(gas) => Ok(gas),
            Self::RateBased(_) => Err(CustomFeeError::Unsupported),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_gas() -> CustomFeeStrategy {
        let mut strategy = CustomFeeStrategy::for_family(AssetFamily::Evm).unwrap();
        strategy.seed(&Fee::evm(21_000, 50, 2), None);
        strategy
    }

    // -- 1. Strategy selection ------------------------------------------------

    #[test]
    fn account_chains_have_no_custom_fee() {
        assert!(CustomFeeStrategy::for_family(AssetFamily::Account).is_none());
        assert!(matches!(
            CustomFeeStrategy::for_family(AssetFamily::Utxo),
            Some(CustomFeeStrategy::RateBased(_))
        ));
    }

    // -- 2. Gas algebra -------------------------------------------------------

    #[test]
    fn gas_fee_is_limit_times_max_fee() {
        let strategy = seeded_gas();
        assert_eq!(strategy.finalize().unwrap().amount, 1_050_000);
    }

    #[test]
    fn editing_total_back_solves_max_fee() {
        let mut strategy = seeded_gas();
        strategy.set_total(1_500_000).unwrap();

        // floor(1_500_000 / 21_000) = 71
        let fee = strategy.finalize().unwrap();
        match fee.parameters {
            FeeParameters::Evm {
                max_fee_per_gas, ..
            } => assert_eq!(max_fee_per_gas, 71),
            other => panic!("unexpected parameters: {other:?}"),
        }
        assert_eq!(fee.amount, 71 * 21_000);
    }

    #[test]
    fn editing_a_field_recomputes_amount() {
        let mut strategy = seeded_gas();
        strategy.set_gas_limit(30_000).unwrap();
        assert_eq!(strategy.current_fee().amount, 1_500_000);
    }

    #[test]
    fn priority_above_max_is_an_error_not_clamped() {
        let mut strategy = seeded_gas();
        strategy.set_priority_fee(60).unwrap();
        assert_eq!(
            strategy.finalize(),
            Err(CustomFeeError::PriorityFeeExceedsMaxFee {
                priority_fee: 60,
                max_fee_per_gas: 50,
            })
        );
        // The entered tip is kept as the user typed it.
        assert_eq!(
            strategy,
            CustomFeeStrategy::GasBased(GasBasedFee {
                gas_limit: Some(21_000),
                max_fee_per_gas: Some(50),
                priority_fee: Some(60),
            })
        );
    }

    #[test]
    fn zero_gas_limit_cannot_back_solve() {
        let mut strategy = seeded_gas();
        strategy.set_gas_limit(0).unwrap();
        assert_eq!(strategy.set_total(1_000), Err(CustomFeeError::ZeroGasLimit));
    }

    // -- 3. Rate algebra ------------------------------------------------------

    #[test]
    fn rate_fee_is_rate_times_size() {
        let mut strategy = CustomFeeStrategy::for_family(AssetFamily::Utxo).unwrap();
        strategy.seed(&Fee::utxo(10, 1), Some(225));
        assert_eq!(strategy.finalize().unwrap().amount, 2_250);

        strategy.set_rate_per_byte(20).unwrap();
        assert_eq!(strategy.finalize().unwrap().amount, 4_500);
    }

    #[test]
    fn rate_strategy_total_is_read_only() {
        let mut strategy = CustomFeeStrategy::for_family(AssetFamily::Utxo).unwrap();
        assert_eq!(
            strategy.set_total(5_000),
            Err(CustomFeeError::ReadOnly { field: "fee" })
        );
    }

    // -- 4. Incomplete inputs -------------------------------------------------

    #[test]
    fn incomplete_inputs_show_zero_but_never_finalize() {
        let strategy = CustomFeeStrategy::for_family(AssetFamily::Utxo).unwrap();
        assert_eq!(strategy.current_fee().amount, 0);
        assert_eq!(strategy.finalize(), Err(CustomFeeError::Incomplete));
    }

    #[test]
    fn wrong_family_quote_is_ignored() {
        let mut strategy = CustomFeeStrategy::for_family(AssetFamily::Evm).unwrap();
        strategy.seed(&Fee::utxo(10, 200), Some(200));
        assert_eq!(strategy.finalize(), Err(CustomFeeError::Incomplete));
    }
}
