//! Pre-dispatch fee staleness check.
//!
//! A quote older than the staleness window is re-fetched right before a
//! send. The published option list is left alone; only the comparison
//! result is reported:
//!
//! - new fee <= selected fee: [`RelevanceOutcome::Ok`], send proceeds
//!   with the already-selected fee.
//! - new fee > selected fee: [`RelevanceOutcome::FeeWasIncreased`], the
//!   caller must get user confirmation before sending.
//! - re-quote failure: the error is returned and dispatch is blocked.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::engine::FeeEngine;
use super::error::FeeError;
use super::types::{Fee, FeeOption};

/// Result of a successful relevance check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelevanceOutcome {
    /// The selected fee is still sufficient.
    Ok,
    /// The network now quotes more than the selected fee.
    FeeWasIncreased {
        /// Fee the user selected.
        previous: Fee,
        /// Fee the network quotes now.
        current: Fee,
    },
}

/// Guards dispatch against stale fee quotes.
pub struct FeeRelevanceGuard {
    engine: Arc<FeeEngine>,
    window: Duration,
}

impl FeeRelevanceGuard {
    /// Creates a guard with the given staleness window.
    pub fn new(engine: Arc<FeeEngine>, window: Duration) -> Self {
        Self { engine, window }
    }

    /// `true` while the last quote is younger than the window.
    pub fn is_actual(&self) -> bool {
        self.engine
            .last_quoted_at()
            .map(|at| at.elapsed() < self.window)
            .unwrap_or(false)
    }

    /// Re-quotes and compares against the selected fee.
    ///
    /// A custom selection is compared with the re-quoted `market` tier. A
    /// tier that is no longer quoted falls back to `market` as well.
    pub async fn update_information(
        &self,
        amount: u128,
        destination: &str,
    ) -> Result<RelevanceOutcome, FeeError> {
        let previous = self.engine.selected_fee()?;
        let selected = self.engine.selected_option();

        let quotes = self.engine.fetch_quotes(amount, destination).await?;
        let find = |option: FeeOption| {
            quotes
                .iter()
                .find(|(quoted, _)| *quoted == option)
                .map(|(_, fee)| *fee)
        };
        let current = match selected {
            FeeOption::Custom => find(FeeOption::Market),
            option => find(option).or_else(|| find(FeeOption::Market)),
        }
        .ok_or(FeeError::NotLoaded(FeeOption::Market))?;

        self.engine.mark_quoted();

        if current.amount > previous.amount {
            warn!(
                option = %selected,
                previous = previous.amount,
                current = current.amount,
                "fee increased since quote"
            );
            Ok(RelevanceOutcome::FeeWasIncreased { previous, current })
        } else {
            debug!(
                option = %selected,
                previous = previous.amount,
                current = current.amount,
                "fee still relevant"
            );
            Ok(RelevanceOutcome::Ok)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
