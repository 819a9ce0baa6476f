//! Error types for fee quoting and custom fee editing.

use thiserror::Error;

use super::types::FeeOption;
use crate::provider::ProviderError;

/// Errors produced while quoting or selecting fees.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeeError {
    /// The network provider failed to quote a fee.
    #[error("fee quote failed: {0}")]
    Provider(#[from] ProviderError),

    /// The provider returned a number of quotes the pipeline has no tier
    /// mapping for. This is an asset integration bug.
    #[error("protocol mismatch: provider returned {count} fee quotes, expected 1 or 3")]
    ProtocolMismatch {
        /// Number of quotes actually returned.
        count: usize,
    },

    /// The requested option is not offered for this asset.
    #[error("fee option {0} is not available")]
    OptionUnavailable(FeeOption),

    /// The selected option has not finished loading or failed to load.
    #[error("fee option {0} has no loaded fee")]
    NotLoaded(FeeOption),

    /// A newer quote request was issued while this one was in flight; its
    /// result was discarded.
    #[error("fee quote superseded by a newer request")]
    Superseded,

    /// A custom fee edit was rejected.
    #[error("custom fee: {0}")]
    Custom(#[from] CustomFeeError),
}

/// Errors from editing a custom fee.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CustomFeeError {
    /// Not every parameter has been entered yet.
    #[error("custom fee inputs are incomplete")]
    Incomplete,

    /// The field cannot be edited for this strategy.
    #[error("the {field} field is read-only")]
    ReadOnly {
        /// Name of the field.
        field: &'static str,
    },

    /// The tip exceeds the max fee per gas. Reported, never clamped.
    #[error("priority fee {priority_fee} exceeds max fee per gas {max_fee_per_gas}")]
    PriorityFeeExceedsMaxFee {
        /// Entered priority fee.
        priority_fee: u128,
        /// Entered max fee per gas.
        max_fee_per_gas: u128,
    },

    /// The gas limit is zero, so the total cannot be back-solved.
    #[error("gas limit must be greater than zero")]
    ZeroGasLimit,

    /// The asset's fee engine has no custom strategy.
    #[error("custom fees are not supported for this asset")]
    Unsupported,
}
