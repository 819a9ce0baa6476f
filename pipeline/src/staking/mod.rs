//! # Staking
//!
//! The staking variant of the send pipeline: state derived from fresh
//! fetches, and a two-phase approve/stake preparation.
//!
//! ```text
//! types.rs        — Yield, ValidatorInfo, StakingState, StakingPreparedAction
//! state.rs        — StakingStateManager: fetch -> StakingState
//! approve.rs      — ERC-20 approve call data
//! orchestrator.rs — StakingOrchestrator: allowance check, approve, stake
//! ```

pub mod approve;
pub mod orchestrator;
pub mod state;
pub mod types;

pub use approve::{decode_approve, encode_approve, ApproveAmount};
pub use orchestrator::{PreparedActionState, StakingOrchestrator};
pub use state::StakingStateManager;
pub use types::{
    StakingBalance, StakingBalanceKind, StakingPreparedAction, StakingState, ValidatorInfo, Yield,
};

use thiserror::Error;

use crate::fee::FeeError;
use crate::flow::FlowError;
use crate::provider::ProviderError;
use crate::transaction::DispatchError;
use crate::validation::ValidationError;

/// Errors from the staking flow.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StakingError {
    /// No validator is selected, or the address is not offered.
    #[error("validator not found")]
    ValidatorNotFound,

    /// No fee tier could be quoted for the approve transaction.
    #[error("no fee available for the approve transaction")]
    ApproveFeeNotFound,

    /// No approve action is prepared, or its call data could not be built.
    #[error("approve transaction data not found")]
    ApproveDataNotFound,

    /// No amount has been entered.
    #[error("staking amount not found")]
    AmountNotFound,

    /// The amount is below the program's minimum stake.
    #[error("amount is below the minimum stake of {minimum}")]
    BelowMinimumStake {
        /// Minimum stake in smallest units.
        minimum: u128,
    },

    /// The allowance must be raised before staking.
    #[error("token approval required before staking")]
    ApprovalRequired,

    /// Inputs are complete but evaluation has not finished.
    #[error("staking action is still being prepared")]
    NotReady,

    /// Staking is not enabled or not currently accepting stakes.
    #[error("staking is not available")]
    NotAvailable,

    /// A provider call failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Fee handling failed.
    #[error(transparent)]
    Fee(#[from] FeeError),

    /// The amount failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Sending failed.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// The step flow refused the move.
    #[error(transparent)]
    Flow(#[from] FlowError),
}
