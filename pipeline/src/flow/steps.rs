//! Steps and the topologies that order them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One screen of a send or staking flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Destination address and memo entry.
    Destination,
    /// Amount entry.
    Amount,
    /// Fee tier selection and custom fee editing.
    Fee,
    /// Validator choice (staking).
    ValidatorSelection,
    /// Review before sending.
    Summary,
    /// Sent.
    Finish,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Destination => "destination",
            Self::Amount => "amount",
            Self::Fee => "fee",
            Self::ValidatorSelection => "validator_selection",
            Self::Summary => "summary",
            Self::Finish => "finish",
        };
        f.write_str(name)
    }
}

/// The step sequence of a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowTopology {
    /// `Destination -> Amount -> Fee -> Summary -> Finish`
    Transfer,
    /// `Amount -> ValidatorSelection -> Summary -> Finish`
    Staking,
    /// `Summary -> Finish`, for unstaking and pre-filled actions.
    Unstaking,
}

impl FlowTopology {
    /// Steps in order.
    pub fn steps(&self) -> &'static [Step] {
        match self {
            Self::Transfer => &[
                Step::Destination,
                Step::Amount,
                Step::Fee,
                Step::Summary,
                Step::Finish,
            ],
            Self::Staking => &[
                Step::Amount,
                Step::ValidatorSelection,
                Step::Summary,
                Step::Finish,
            ],
            Self::Unstaking => &[Step::Summary, Step::Finish],
        }
    }

    /// The step a new flow opens on.
    pub fn initial_step(&self) -> Step {
        self.steps()[0]
    }

    fn position(&self, step: Step) -> Option<usize> {
        self.steps().iter().position(|s| *s == step)
    }

    /// The step after `step`.
    pub fn next(&self, step: Step) -> Option<Step> {
        let index = self.position(step)?;
        self.steps().get(index + 1).copied()
    }

    /// The step before `step`.
    pub fn previous(&self, step: Step) -> Option<Step> {
        let index = self.position(step)?;
        index.checked_sub(1).map(|i| self.steps()[i])
    }

    /// Whether going back from `step` is structurally forbidden.
    pub fn blocks_back(&self, step: Step) -> bool {
        match self {
            Self::Transfer => matches!(step, Step::Fee | Step::Summary | Step::Finish),
            Self::Staking => matches!(step, Step::Summary | Step::Finish),
            Self::Unstaking => step == Step::Finish,
        }
    }

    /// Whether `step` can be reopened from the summary.
    pub fn is_editable(&self, step: Step) -> bool {
        !matches!(step, Step::Summary | Step::Finish) && self.position(step).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_sequence() {
        let t = FlowTopology::Transfer;
        assert_eq!(t.initial_step(), Step::Destination);
        assert_eq!(t.next(Step::Amount), Some(Step::Fee));
        assert_eq!(t.next(Step::Finish), None);
        assert_eq!(t.previous(Step::Amount), Some(Step::Destination));
        assert_eq!(t.previous(Step::Destination), None);
        assert_eq!(t.next(Step::ValidatorSelection), None);
    }

    #[test]
    fn staking_and_unstaking_sequences() {
        assert_eq!(FlowTopology::Staking.initial_step(), Step::Amount);
        assert_eq!(
            FlowTopology::Staking.next(Step::Amount),
            Some(Step::ValidatorSelection)
        );
        assert_eq!(FlowTopology::Unstaking.initial_step(), Step::Summary);
        assert_eq!(FlowTopology::Unstaking.next(Step::Summary), Some(Step::Finish));
    }

    #[test]
    fn back_blocking() {
        assert!(FlowTopology::Transfer.blocks_back(Step::Fee));
        assert!(!FlowTopology::Transfer.blocks_back(Step::Amount));
        assert!(FlowTopology::Staking.blocks_back(Step::Summary));
        assert!(!FlowTopology::Staking.blocks_back(Step::ValidatorSelection));
        assert!(!FlowTopology::Unstaking.blocks_back(Step::Summary));
    }

    #[test]
    fn editability() {
        assert!(FlowTopology::Transfer.is_editable(Step::Fee));
        assert!(!FlowTopology::Transfer.is_editable(Step::Summary));
        assert!(!FlowTopology::Transfer.is_editable(Step::ValidatorSelection));
        assert!(FlowTopology::Staking.is_editable(Step::ValidatorSelection));
        assert!(!FlowTopology::Unstaking.is_editable(Step::Amount));
    }
}
