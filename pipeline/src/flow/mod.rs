//! # Step Flow
//!
//! The wizard state machine that sequences the send and staking flows.
//!
//! ```text
//! steps.rs      — Step, FlowTopology (sequence, back rules, editability)
//! controller.rs — StepFlowController, FlowContext, PendingTransition
//! ```

pub mod controller;
pub mod steps;

pub use controller::{Advance, FlowContext, PendingTransition, StepFlowController};
pub use steps::{FlowTopology, Step};

use thiserror::Error;

/// Structural errors of the step flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FlowError {
    /// The current step's inputs are not valid.
    #[error("step {0} is not valid yet")]
    InvalidStep(Step),

    /// Going back from this step is not allowed.
    #[error("going back from {0} is not allowed")]
    BackNotAllowed(Step),

    /// The step is the first of its flow.
    #[error("{0} has no previous step")]
    NoPreviousStep(Step),

    /// The operation is only available on the summary step.
    #[error("not on the summary step")]
    NotAtSummary,

    /// The step cannot be reopened from the summary.
    #[error("step {0} cannot be edited from the summary")]
    StepNotEditable(Step),

    /// Finishing requires a successful dispatch first.
    #[error("nothing has been dispatched yet")]
    NotDispatched,

    /// The flow has already finished.
    #[error("flow already finished")]
    AlreadyFinished,

    /// The pending transition was superseded.
    #[error("pending transition is no longer current")]
    StalePending,
}
