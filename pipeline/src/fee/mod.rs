//! # Fees
//!
//! Quoting, selection, custom editing and staleness checks.
//!
//! ```text
//! types.rs      — FeeOption, Fee, FeeParameters, FeeValue, FeeOptions
//! error.rs      — FeeError, CustomFeeError
//! custom.rs     — rate-based and gas-based custom fee strategies
//! engine.rs     — FeeEngine: quote, publish, select, advise
//! relevance.rs  — FeeRelevanceGuard: pre-dispatch re-quote
//! ```

pub mod custom;
pub mod engine;
pub mod error;
pub mod relevance;
pub mod types;

pub use custom::{CustomFeeStrategy, GasBasedFee, RateBasedFee};
pub use engine::{FeeAdvisory, FeeEngine};
pub use error::{CustomFeeError, FeeError};
pub use relevance::{FeeRelevanceGuard, RelevanceOutcome};
pub use types::{Fee, FeeOption, FeeOptions, FeeParameters, FeeValue};
