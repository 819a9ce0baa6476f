//! # Step Flow Controller
//!
//! A finite-state wizard over a [`FlowTopology`]. Forward moves are gated
//! on the host's per-step validity, leaving the fee step can be paused on a
//! custom-fee advisory, and the summary step offers random access back to
//! any editable step.
//!
//! Side effects on transitions are delegated to the [`FlowContext`]:
//!
//! ```text
//! Destination -> Amount | Summary   on_leave_destination()  (fetch fee options)
//! * -> Fee                          on_enter_fee()          (refresh fees)
//! ```

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

use super::steps::{FlowTopology, Step};
use super::FlowError;
use crate::fee::FeeAdvisory;
use crate::observable::{Observable, Subscription};

/// What the controller asks of the session it drives.
#[async_trait]
pub trait FlowContext: Send + Sync {
    /// Whether `step`'s inputs currently allow moving forward.
    fn is_step_valid(&self, step: Step) -> bool;

    /// Advisory that must be confirmed before the fee step closes.
    fn fee_advisory(&self) -> Option<FeeAdvisory> {
        None
    }

    /// Runs when the destination step is left going forward.
    async fn on_leave_destination(&self) {}

    /// Runs whenever the fee step is entered.
    async fn on_enter_fee(&self) {}
}

/// A forward move waiting for user confirmation.
///
/// Consumed by [`StepFlowController::resume`]; it cannot be replayed.
#[derive(Debug, PartialEq, Eq)]
pub struct PendingTransition {
    /// Step the move starts from.
    pub from: Step,
    /// Step the move lands on once confirmed.
    pub to: Step,
    /// Why the move was paused.
    pub advisory: FeeAdvisory,
    id: u64,
}

/// Outcome of [`StepFlowController::perform_next`].
#[derive(Debug, PartialEq, Eq)]
pub enum Advance {
    /// The flow moved to this step.
    Moved(Step),
    /// The move needs confirmation first.
    Blocked(PendingTransition),
}

#[derive(Debug, Default)]
struct FlowState {
    return_to_summary: bool,
    dispatched: bool,
    pending: Option<u64>,
    next_pending_id: u64,
}

/// Drives one flow through its topology.
pub struct StepFlowController<C: ?Sized> {
    topology: FlowTopology,
    context: Arc<C>,
    current: Observable<Step>,
    state: Mutex<FlowState>,
}

impl<C: FlowContext + ?Sized> StepFlowController<C> {
    /// Creates a controller positioned on the topology's first step.
    pub fn new(topology: FlowTopology, context: Arc<C>) -> Self {
        Self {
            topology,
            context,
            current: Observable::new(topology.initial_step()),
            state: Mutex::new(FlowState::default()),
        }
    }

    /// The topology this controller walks.
    pub fn topology(&self) -> FlowTopology {
        self.topology
    }

    /// The visible step.
    pub fn current_step(&self) -> Step {
        self.current.get()
    }

    /// Stream of visible steps.
    pub fn subscribe(&self) -> Subscription<Step> {
        self.current.subscribe()
    }

    /// Records a successful dispatch, unlocking [`Self::perform_finish`].
    pub fn mark_dispatched(&self) {
        self.state.lock().dispatched = true;
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    /// Advances one step if the current one is valid.
    ///
    /// From the summary this is [`Self::perform_finish`]. After
    /// [`Self::open_step`] the target is the summary instead of the next
    /// step in sequence.
    pub async fn perform_next(&self) -> Result<Advance, FlowError> {
        let from = self.current.get();
        match from {
            Step::Finish => return Err(FlowError::AlreadyFinished),
            Step::Summary => return self.perform_finish().map(Advance::Moved),
            _ => {}
        }
        if !self.context.is_step_valid(from) {
            return Err(FlowError::InvalidStep(from));
        }

        let to = if self.state.lock().return_to_summary {
            Step::Summary
        } else {
            self.topology.next(from).ok_or(FlowError::InvalidStep(from))?
        };

        if from == Step::Fee {
            if let Some(advisory) = self.context.fee_advisory() {
                let id = {
                    let mut state = self.state.lock();
                    state.next_pending_id += 1;
                    state.pending = Some(state.next_pending_id);
                    state.next_pending_id
                };
                debug!(from = %from, to = %to, advisory = ?advisory, "transition awaits confirmation");
                return Ok(Advance::Blocked(PendingTransition {
                    from,
                    to,
                    advisory,
                    id,
                }));
            }
        }

        self.move_forward(from, to).await;
        Ok(Advance::Moved(to))
    }

    /// Completes a transition paused by [`Self::perform_next`].
    ///
    /// Fails with `StalePending` if the flow moved, or a newer pending
    /// transition was issued, in the meantime.
    pub async fn resume(&self, pending: PendingTransition) -> Result<Step, FlowError> {
        {
            let mut state = self.state.lock();
            if state.pending != Some(pending.id) || self.current.get() != pending.from {
                return Err(FlowError::StalePending);
            }
            state.pending = None;
        }
        self.move_forward(pending.from, pending.to).await;
        Ok(pending.to)
    }

    /// Goes back one step.
    pub fn perform_back(&self) -> Result<Step, FlowError> {
        let from = self.current.get();
        if self.topology.blocks_back(from) {
            return Err(FlowError::BackNotAllowed(from));
        }
        let to = self
            .topology
            .previous(from)
            .ok_or(FlowError::NoPreviousStep(from))?;
        self.state.lock().pending = None;
        debug!(from = %from, to = %to, "flow moved back");
        self.current.set(to);
        Ok(to)
    }

    /// Reopens an editable step from the summary.
    ///
    /// The next [`Self::perform_next`] from that step returns straight to
    /// the summary.
    pub async fn open_step(&self, step: Step) -> Result<Step, FlowError> {
        if self.current.get() != Step::Summary {
            return Err(FlowError::NotAtSummary);
        }
        if !self.topology.is_editable(step) {
            return Err(FlowError::StepNotEditable(step));
        }
        {
            let mut state = self.state.lock();
            state.return_to_summary = true;
            state.pending = None;
            state.dispatched = false;
        }
        if step == Step::Fee {
            self.context.on_enter_fee().await;
        }
        debug!(step = %step, "step opened from summary");
        self.current.set(step);
        Ok(step)
    }

    /// `Summary -> Finish`, once a dispatch has been recorded.
    pub fn perform_finish(&self) -> Result<Step, FlowError> {
        if self.current.get() != Step::Summary {
            return Err(FlowError::NotAtSummary);
        }
        if !self.state.lock().dispatched {
            return Err(FlowError::NotDispatched);
        }
        info!(topology = ?self.topology, "flow finished");
        self.current.set(Step::Finish);
        Ok(Step::Finish)
    }

    async fn move_forward(&self, from: Step, to: Step) {
        if from == Step::Destination && matches!(to, Step::Amount | Step::Summary) {
            self.context.on_leave_destination().await;
        }
        if to == Step::Fee {
            self.context.on_enter_fee().await;
        }
        {
            let mut state = self.state.lock();
            state.pending = None;
            if to == Step::Summary {
                state.return_to_summary = false;
            }
        }
        debug!(from = %from, to = %to, "flow advanced");
        self.current.set(to);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
