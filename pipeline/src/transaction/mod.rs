//! # Transactions
//!
//! From user input to a submitted transaction.
//!
//! ```text
//! types.rs       — Asset, Address, AdditionalFieldState, TransactionDraft
//! amount.rs      — DualAmount and RateConverter
//! aggregator.rs  — TransactionAggregator: inputs -> draft
//! dispatcher.rs  — TransactionDispatcher: draft -> sign -> submit
//! ```

pub mod aggregator;
pub mod amount;
pub mod dispatcher;
pub mod types;

pub use aggregator::{
    AggregatorError, BalanceIncludeFeeCalculator, IncludeFeeCalculator, TransactionAggregator,
    WithdrawalNotification,
};
pub use amount::{AmountPrimary, DualAmount, RateConverter};
pub use dispatcher::{DispatchError, DispatchResult, SendFailureCause, TransactionDispatcher};
pub use types::{
    AdditionalFieldState, AdditionalFieldType, AdditionalParams, Address, AddressSource, Asset,
    AssetFamily, AssetKind, ContractCall, SignedTransaction, TransactionDraft, WithdrawalRule,
};
