//! # Input Validation
//!
//! Leaf checks every other component relies on. Validation failures are
//! local and recoverable: the step that produced the bad input shows the
//! error and the user edits it. Nothing here is fatal.
//!
//! ```text
//! address.rs — destination syntax, self-send, alias resolution
//! amount.rs  — positivity, balance, reserve, dust, fee coverage
//! field.rs   — memo / destination tag parsing
//! ```

pub mod address;
pub mod amount;
pub mod field;

pub use address::AddressValidator;
pub use amount::{AmountValidator, FeeContext};
pub use field::parse_additional_field;

use thiserror::Error;

use crate::provider::ProviderError;

/// Why a destination, amount or additional field was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Nothing was entered.
    #[error("destination address is empty")]
    EmptyAddress,

    /// The address does not match the chain's syntax.
    #[error("invalid address: {address}")]
    InvalidAddress {
        /// The offending input.
        address: String,
    },

    /// The destination is one of the wallet's own addresses and the asset
    /// does not support self-sends.
    #[error("cannot send to own address {address}")]
    SameAsWallet {
        /// The wallet's address.
        address: String,
    },

    /// The name service does not know the alias.
    #[error("alias {alias} could not be resolved")]
    AliasNotFound {
        /// The alias as entered.
        alias: String,
    },

    /// The name service could not be queried.
    #[error("alias resolution failed: {0}")]
    AliasResolution(#[source] ProviderError),

    /// Zero amount.
    #[error("amount must be greater than zero")]
    NonPositiveAmount,

    /// The amount could not be expressed in smallest units: negative, too
    /// precise to represent, or entered in fiat without a known rate.
    #[error("amount cannot be converted to {symbol}")]
    Unconvertible {
        /// Asset the amount was meant for.
        symbol: String,
    },

    /// More than the wallet holds.
    #[error("amount exceeds spendable balance of {spendable}")]
    ExceedsBalance {
        /// Balance minus reserve.
        spendable: u128,
    },

    /// Within the balance but eats into the required reserve.
    #[error("amount would violate the account reserve of {reserve}")]
    ReserveViolation {
        /// Reserve that must stay on the account.
        reserve: u128,
    },

    /// The amount fits but amount plus fee does not.
    #[error("amount {amount} plus fee {fee} exceeds spendable balance of {spendable}")]
    InsufficientForFee {
        /// Requested amount.
        amount: u128,
        /// Fee in the same asset.
        fee: u128,
        /// Balance minus reserve.
        spendable: u128,
    },

    /// Output smaller than the network relays.
    #[error("amount is below the dust limit of {minimum}")]
    Dust {
        /// Dust threshold.
        minimum: u128,
    },

    /// The change output would be dust.
    #[error("remaining balance {remaining} would be below the dust limit of {minimum}")]
    DustChange {
        /// What would be left on the account.
        remaining: u128,
        /// Dust threshold.
        minimum: u128,
    },

    /// The asset requires a memo/tag and none was given.
    #[error("this destination requires a memo or destination tag")]
    MemoRequired,

    /// The memo is not acceptable.
    #[error("invalid memo: {reason}")]
    InvalidMemo {
        /// Why it was rejected.
        reason: String,
    },

    /// The destination tag is not a `u32`.
    #[error("invalid destination tag: {value}")]
    InvalidDestinationTag {
        /// The text as entered.
        value: String,
    },
}
