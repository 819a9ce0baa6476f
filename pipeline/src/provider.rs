//! # External Capabilities
//!
//! The pipeline never talks to a chain directly. Balance queries, fee
//! quotes, transaction construction, signing and submission are consumed
//! through the traits below, injected as `Arc<dyn Trait>` when a session
//! is constructed. Chain integrations implement them; the
//! [`crate::simulated`] module implements all of them in memory.

use async_trait::async_trait;
use thiserror::Error;

use crate::fee::Fee;
use crate::staking::{StakingBalance, ValidatorInfo, Yield};
use crate::transaction::{
    AdditionalFieldState, Address, SignedTransaction, TransactionDraft,
};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures reported by a chain integration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// The node or API could not be reached.
    #[error("network error: {0}")]
    Network(String),

    /// The request did not complete in time.
    #[error("request timed out after {after_ms}ms")]
    Timeout {
        /// Milliseconds waited.
        after_ms: u64,
    },

    /// The network rejected the request.
    #[error("rejected by network (code {code}): {message}")]
    Rejected {
        /// Provider-specific error code.
        code: u32,
        /// Provider message.
        message: String,
    },

    /// Sending would leave the account below its required reserve.
    #[error("insufficient reserve: {required} required")]
    InsufficientReserve {
        /// Amount that must remain on the account.
        required: u128,
    },

    /// The provider has too little data to construct the transaction.
    #[error("transaction construction failed: {0}")]
    Construction(String),

    /// The integration does not implement this capability.
    #[error("not supported by this provider: {0}")]
    Unsupported(&'static str),
}

/// Failures reported by a signer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignerError {
    /// The user dismissed the signing prompt or pulled the card away.
    #[error("signing cancelled by user")]
    Cancelled,

    /// The signer failed for any other reason.
    #[error("signing failed: {0}")]
    Failed(String),
}

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------

/// Read and write access to one chain for one wallet.
#[async_trait]
pub trait NetworkProvider: Send + Sync {
    /// Quotes fees for sending `amount` to `destination`.
    ///
    /// Returns one quote, or three quotes for slow/market/fast in any order.
    async fn get_fee(&self, amount: u128, destination: &str) -> Result<Vec<Fee>, ProviderError>;

    /// Current ERC-20 allowance `owner` has granted `spender` on `contract`.
    ///
    /// Allowances above `u128::MAX` are reported as `u128::MAX`.
    async fn get_allowance(
        &self,
        owner: &str,
        spender: &str,
        contract: &str,
    ) -> Result<u128, ProviderError>;

    /// Submits a signed transaction and returns its hash.
    async fn submit(&self, transaction: &SignedTransaction) -> Result<String, ProviderError>;

    /// Spendable balance of `address` in smallest units.
    async fn get_balance(&self, address: &str) -> Result<u128, ProviderError>;

    /// Estimated size in bytes of a transaction sending `amount` to
    /// `destination`. Required by UTXO integrations.
    async fn estimate_transaction_size(
        &self,
        _amount: u128,
        _destination: &str,
    ) -> Result<u64, ProviderError> {
        Err(ProviderError::Unsupported("estimate_transaction_size"))
    }

    /// Block explorer link for a submitted transaction.
    fn explorer_url(&self, _hash: &str) -> Option<String> {
        None
    }
}

// ---------------------------------------------------------------------------
// Construction and Signing
// ---------------------------------------------------------------------------

/// Everything a [`TransactionBuilder`] needs to produce a draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftRequest {
    /// Destination address.
    pub destination: Address,
    /// Amount to send, already reduced by the fee if `includes_fee`.
    pub amount: u128,
    /// Selected fee.
    pub fee: Fee,
    /// Memo / tag state.
    pub additional_field: AdditionalFieldState,
    /// Whether the fee was deducted from the amount.
    pub includes_fee: bool,
    /// Sequence number of the requesting computation.
    pub revision: u64,
}

/// Chain-specific transaction construction.
#[async_trait]
pub trait TransactionBuilder: Send + Sync {
    /// Builds an unsigned draft, or fails if the provider lacks data.
    async fn build(&self, request: DraftRequest) -> Result<TransactionDraft, ProviderError>;
}

/// Signing capability (hardware card, secure enclave, software key).
#[async_trait]
pub trait Signer: Send + Sync {
    /// Signs a draft. Returns [`SignerError::Cancelled`] if the user aborts.
    async fn sign(&self, draft: &TransactionDraft) -> Result<SignedTransaction, SignerError>;
}

// ---------------------------------------------------------------------------
// Addresses
// ---------------------------------------------------------------------------

/// Per-asset address syntax rules.
pub trait AddressValidationService: Send + Sync {
    /// Returns `true` if `address` is syntactically valid for the chain.
    fn is_valid(&self, address: &str) -> bool;
}

/// Name-service resolution (ENS, Unstoppable Domains, ...).
#[async_trait]
pub trait AliasResolver: Send + Sync {
    /// Resolves an alias to an address. `Ok(None)` if the alias is unknown.
    async fn resolve(&self, alias: &str) -> Result<Option<String>, ProviderError>;
}

/// Remembers destinations for "recent address" suggestions.
#[async_trait]
pub trait RecentAddressStore: Send + Sync {
    /// Records that `address` was just used to send `symbol`.
    async fn remember(&self, symbol: &str, address: &Address) -> Result<(), ProviderError>;
}

// ---------------------------------------------------------------------------
// User Interaction
// ---------------------------------------------------------------------------

/// Asks the user to accept a fee that rose since it was quoted.
#[async_trait]
pub trait FeeIncreaseConfirmation: Send + Sync {
    /// Returns `true` if the user accepts sending with `previous` even
    /// though the network now quotes `current`.
    async fn confirm_fee_increase(&self, previous: Fee, current: Fee) -> bool;
}

// ---------------------------------------------------------------------------
// Staking
// ---------------------------------------------------------------------------

/// Staking program data for one asset.
#[async_trait]
pub trait StakingProvider: Send + Sync {
    /// Yield metadata, or `None` if the asset has no staking program.
    async fn get_yield(&self) -> Result<Option<Yield>, ProviderError>;

    /// Current staking positions of `owner`.
    async fn get_staking_balances(&self, owner: &str)
        -> Result<Vec<StakingBalance>, ProviderError>;

    /// Fee for entering a stake of `amount` with `validator`.
    async fn estimate_stake_fee(
        &self,
        amount: u128,
        validator: &ValidatorInfo,
    ) -> Result<Fee, ProviderError>;

    /// Builds the stake-entry transaction.
    async fn build_stake_transaction(
        &self,
        amount: u128,
        validator: &ValidatorInfo,
        fee: Fee,
    ) -> Result<TransactionDraft, ProviderError>;
}
