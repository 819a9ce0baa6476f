//! # Sessions
//!
//! Façades that wire the pipeline components into one flow each and expose
//! the operations a wallet screen calls.
//!
//! ```text
//! transfer.rs — SendSession: validate -> quote -> draft -> guard -> dispatch
//! staking.rs  — StakingSession: state, approve/stake preparation, dispatch
//! ```

pub mod staking;
pub mod transfer;

pub use staking::{StakingFlowContext, StakingServices, StakingSession};
pub use transfer::{SendSession, TransferFlowContext, TransferServices, Validity};

use thiserror::Error;

use crate::fee::FeeError;
use crate::flow::FlowError;
use crate::provider::ProviderError;
use crate::transaction::{AggregatorError, DispatchError};
use crate::validation::ValidationError;

/// Errors surfaced by [`SendSession`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    /// An input was rejected.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Fee quoting or selection failed.
    #[error(transparent)]
    Fee(#[from] FeeError),

    /// No draft could be built from the inputs.
    #[error(transparent)]
    Aggregator(#[from] AggregatorError),

    /// Signing or submission failed.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// The step flow refused the move.
    #[error(transparent)]
    Flow(#[from] FlowError),

    /// A provider call outside fee quoting failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// The asset has no memo or destination tag.
    #[error("this asset takes no additional field")]
    FieldNotSupported,

    /// Inputs are incomplete, so there is nothing to send.
    #[error("no transaction draft is available")]
    NoDraft,

    /// The fee rose since it was quoted and the user declined the new one.
    #[error("fee increased from {previous} to {current} and was not accepted")]
    FeeIncreaseDeclined {
        /// Fee the user had selected.
        previous: u128,
        /// Fee the network quotes now.
        current: u128,
    },
}
