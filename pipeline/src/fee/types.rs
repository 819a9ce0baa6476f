//! Fee vocabulary: tiers, parameters and load states.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use super::error::FeeError;

// ---------------------------------------------------------------------------
// FeeOption
// ---------------------------------------------------------------------------

/// A named fee tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeOption {
    /// Cheapest quoted tier.
    Slow,
    /// Default tier. The only tier for single-quote chains.
    Market,
    /// Most expensive quoted tier.
    Fast,
    /// User-edited fee.
    Custom,
}

impl fmt::Display for FeeOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Slow => write!(f, "slow"),
            Self::Market => write!(f, "market"),
            Self::Fast => write!(f, "fast"),
            Self::Custom => write!(f, "custom"),
        }
    }
}

// ---------------------------------------------------------------------------
// Fee
// ---------------------------------------------------------------------------

/// Family-specific parameters a fee was computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeParameters {
    /// No editable parameters.
    Fixed,
    /// UTXO chains.
    Utxo {
        /// Smallest units per byte (sat/byte).
        rate_per_byte: u64,
    },
    /// EIP-1559 chains. All prices in wei.
    Evm {
        /// Gas units the transaction may consume.
        gas_limit: u64,
        /// Maximum total price per gas unit.
        max_fee_per_gas: u128,
        /// Tip per gas unit, bounded by `max_fee_per_gas`.
        priority_fee: u128,
    },
}

/// A quoted or user-edited fee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fee {
    /// Total fee in the fee asset's smallest unit.
    pub amount: u128,
    /// What the amount was computed from.
    pub parameters: FeeParameters,
}

impl Fee {
    /// A fee with no editable parameters.
    pub fn fixed(amount: u128) -> Self {
        Self {
            amount,
            parameters: FeeParameters::Fixed,
        }
    }

    /// A UTXO fee for `size_bytes` at `rate_per_byte`.
    pub fn utxo(rate_per_byte: u64, size_bytes: u64) -> Self {
        Self {
            amount: u128::from(rate_per_byte) * u128::from(size_bytes),
            parameters: FeeParameters::Utxo { rate_per_byte },
        }
    }

    /// An EIP-1559 fee: `gas_limit x max_fee_per_gas`.
    pub fn evm(gas_limit: u64, max_fee_per_gas: u128, priority_fee: u128) -> Self {
        Self {
            amount: u128::from(gas_limit).saturating_mul(max_fee_per_gas),
            parameters: FeeParameters::Evm {
                gas_limit,
                max_fee_per_gas,
                priority_fee,
            },
        }
    }

    /// The zero-fee placeholder shown while custom inputs are incomplete.
    pub fn zero(parameters: FeeParameters) -> Self {
        Self {
            amount: 0,
            parameters,
        }
    }
}

// ---------------------------------------------------------------------------
// FeeValue
// ---------------------------------------------------------------------------

/// Load state of one fee option.
#[derive(Debug, Clone)]
pub enum FeeValue {
    /// A quote is in flight.
    Loading,
    /// The quote arrived.
    Loaded(Fee),
    /// The quote failed. The error is shared between all failed options.
    FailedToLoad(Arc<FeeError>),
}

impl FeeValue {
    /// The loaded fee, if any.
    pub fn fee(&self) -> Option<&Fee> {
        match self {
            Self::Loaded(fee) => Some(fee),
            _ => None,
        }
    }

    /// Returns `true` while loading.
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }
}

impl PartialEq for FeeValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Loading, Self::Loading) => true,
            (Self::Loaded(a), Self::Loaded(b)) => a == b,
            (Self::FailedToLoad(a), Self::FailedToLoad(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// FeeOptions
// ---------------------------------------------------------------------------

/// The offered tiers with their load state, in display order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeeOptions {
    entries: Vec<(FeeOption, FeeValue)>,
}

impl FeeOptions {
    /// Builds the option list from `(option, value)` pairs.
    pub fn new(entries: Vec<(FeeOption, FeeValue)>) -> Self {
        Self { entries }
    }

    /// Every offered option in `Loading` state.
    pub fn loading(options: &[FeeOption]) -> Self {
        Self::new(options.iter().map(|o| (*o, FeeValue::Loading)).collect())
    }

    /// Every offered option failed with the same error.
    pub fn failed(options: &[FeeOption], error: FeeError) -> Self {
        let error = Arc::new(error);
        Self::new(
            options
                .iter()
                .map(|o| (*o, FeeValue::FailedToLoad(Arc::clone(&error))))
                .collect(),
        )
    }

    /// Value of one option, if offered.
    pub fn get(&self, option: FeeOption) -> Option<&FeeValue> {
        self.entries
            .iter()
            .find(|(o, _)| *o == option)
            .map(|(_, value)| value)
    }

    /// Loaded fee of one option.
    pub fn fee(&self, option: FeeOption) -> Option<Fee> {
        self.get(option).and_then(FeeValue::fee).copied()
    }

    /// Offered options in display order.
    pub fn options(&self) -> Vec<FeeOption> {
        self.entries.iter().map(|(o, _)| *o).collect()
    }

    /// Returns `true` if `option` is offered.
    pub fn contains(&self, option: FeeOption) -> bool {
        self.get(option).is_some()
    }

    /// Iterates over `(option, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = &(FeeOption, FeeValue)> {
        self.entries.iter()
    }

    /// Replaces the value of an offered option. Unknown options are ignored.
    pub fn set(&mut self, option: FeeOption, value: FeeValue) {
        if let Some(entry) = self.entries.iter_mut().find(|(o, _)| *o == option) {
            entry.1 = value;
        }
    }

    /// Cheapest and most expensive loaded quoted tier (custom excluded).
    pub fn quoted_bounds(&self) -> Option<(Fee, Fee)> {
        let mut quoted = self
            .entries
            .iter()
            .filter(|(o, _)| *o != FeeOption::Custom)
            .filter_map(|(_, v)| v.fee().copied());
        let first = quoted.next()?;
        Some(quoted.fold((first, first), |(low, high), fee| {
            (
                if fee.amount < low.amount { fee } else { low },
                if fee.amount > high.amount { fee } else { high },
            )
        }))
    }

    /// Returns `true` if every option has finished loading.
    pub fn is_settled(&self) -> bool {
        !self.entries.is_empty() && self.entries.iter().all(|(_, v)| !v.is_loading())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evm_fee_is_gas_limit_times_max_fee() {
        let fee = Fee::evm(21_000, 50, 2);
        assert_eq!(fee.amount, 1_050_000);
    }

    #[test]
    fn utxo_fee_is_rate_times_size() {
        let fee = Fee::utxo(12, 250);
        assert_eq!(fee.amount, 3_000);
        assert_eq!(fee.parameters, FeeParameters::Utxo { rate_per_byte: 12 });
    }

    #[test]
    fn quoted_bounds_ignore_custom() {
        let options = FeeOptions::new(vec![
            (FeeOption::Slow, FeeValue::Loaded(Fee::fixed(10))),
            (FeeOption::Market, FeeValue::Loaded(Fee::fixed(20))),
            (FeeOption::Fast, FeeValue::Loaded(Fee::fixed(30))),
            (FeeOption::Custom, FeeValue::Loaded(Fee::fixed(1_000))),
        ]);
        let (low, high) = options.quoted_bounds().unwrap();
        assert_eq!(low.amount, 10);
        assert_eq!(high.amount, 30);
    }

    #[test]
    fn set_ignores_options_not_offered() {
        let mut options = FeeOptions::loading(&[FeeOption::Market]);
        options.set(FeeOption::Fast, FeeValue::Loaded(Fee::fixed(1)));
        assert!(!options.contains(FeeOption::Fast));
        assert!(!options.is_settled());

        options.set(FeeOption::Market, FeeValue::Loaded(Fee::fixed(1)));
        assert!(options.is_settled());
        assert_eq!(options.fee(FeeOption::Market), Some(Fee::fixed(1)));
    }

    #[test]
    fn failed_options_share_one_error() {
        let options = FeeOptions::failed(
            &[FeeOption::Slow, FeeOption::Market],
            FeeError::ProtocolMismatch { count: 2 },
        );
        assert_eq!(options.get(FeeOption::Slow), options.get(FeeOption::Market));
        assert!(options.is_settled());
    }
}
