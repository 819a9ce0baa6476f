//! Core type definitions shared by every stage of the pipeline.
//!
//! All on-chain amounts are `u128` in the smallest indivisible unit of the
//! asset (satoshi, wei, drop). The `decimals` field on [`Asset`] is for
//! conversion and display only.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::fee::Fee;

// ---------------------------------------------------------------------------
// Asset
// ---------------------------------------------------------------------------

/// Fee model family of the chain an asset lives on.
///
/// Decides which custom-fee strategy (if any) the fee engine offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetFamily {
    /// Bitcoin-like chains: fee = rate per byte x transaction size.
    Utxo,
    /// Ethereum-like chains: fee = gas limit x max fee per gas.
    Evm,
    /// Account chains with a fixed, non-editable fee.
    Account,
}

/// Whether the asset is the chain's native coin or a contract token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    /// Native coin. Fees are paid in the same asset.
    Coin,
    /// Contract token. Fees are paid in the chain's native coin.
    Token {
        /// Token contract address.
        contract: String,
    },
}

/// Which extra field a destination on this chain accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdditionalFieldType {
    /// Free-text memo (Cosmos, Stellar, TON...).
    Memo,
    /// Numeric destination tag (XRP Ledger).
    DestinationTag,
}

/// Asset-specific rule that produces a [`WithdrawalNotification`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalRule {
    /// An account whose balance drops below `minimum` is reaped and the
    /// remainder is lost (Polkadot existential deposit, Cardano min-UTXO).
    ExistentialDeposit {
        /// Minimum balance an account must keep to stay alive.
        minimum: u128,
    },
    /// A single transaction cannot spend more than `max_amount`
    /// (e.g. too many small UTXOs to fit in one transaction).
    MaxAmountPerTransaction {
        /// Largest amount one transaction may carry.
        max_amount: u128,
    },
}

/// Everything the pipeline needs to know about the asset being sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    /// Ticker, used for logging and display (`BTC`, `ETH`, `USDT`).
    pub symbol: String,
    /// Decimal places between the smallest unit and one whole coin.
    pub decimals: u8,
    /// Fee model family of the chain.
    pub family: AssetFamily,
    /// Coin or token.
    pub kind: AssetKind,
    /// Amount that must stay on the account and can never be spent
    /// (XRP base reserve). Zero for most chains.
    pub reserve: u128,
    /// Smallest output the network relays. Zero disables the check.
    pub dust: u128,
    /// Extra destination field, if the chain has one.
    pub additional_field: Option<AdditionalFieldType>,
    /// Whether the additional field must be filled before sending.
    pub additional_field_required: bool,
    /// Whether sending to one of the wallet's own addresses is allowed.
    pub supports_compound_address: bool,
    /// Optional rule that warns before a withdrawal drains the account.
    pub withdrawal_rule: Option<WithdrawalRule>,
}

impl Asset {
    /// Creates a native coin with no reserve, dust limit or extra field.
    pub fn coin(symbol: &str, decimals: u8, family: AssetFamily) -> Self {
        Self {
            symbol: symbol.to_string(),
            decimals,
            family,
            kind: AssetKind::Coin,
            reserve: 0,
            dust: 0,
            additional_field: None,
            additional_field_required: false,
            supports_compound_address: false,
            withdrawal_rule: None,
        }
    }

    /// Creates a contract token on an EVM chain.
    pub fn token(symbol: &str, decimals: u8, contract: &str) -> Self {
        Self {
            kind: AssetKind::Token {
                contract: contract.to_string(),
            },
            ..Self::coin(symbol, decimals, AssetFamily::Evm)
        }
    }

    /// Returns `true` if fees are paid in this same asset.
    pub fn fee_in_same_asset(&self) -> bool {
        matches!(self.kind, AssetKind::Coin)
    }

    /// Token contract address, if this is a token.
    pub fn contract_address(&self) -> Option<&str> {
        match &self.kind {
            AssetKind::Token { contract } => Some(contract),
            AssetKind::Coin => None,
        }
    }

    /// `10^decimals`, the number of smallest units in one whole coin.
    pub fn unit_scale(&self) -> u128 {
        10u128.pow(u32::from(self.decimals))
    }
}

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// Where a destination address came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressSource {
    /// Typed character by character.
    Typed,
    /// Pasted from the clipboard.
    Pasted,
    /// Scanned from a QR code.
    QrCode,
    /// Picked from the recent-address list.
    RecentAddress,
    /// Picked from the user's other wallets.
    MyWallet,
    /// Supplied by a sell/off-ramp provider.
    SellProvider,
}

impl AddressSource {
    /// Whether a valid address from this source moves the flow forward
    /// without an explicit "next".
    ///
    /// Typed and pasted input may still be edited or need a memo, so the
    /// user advances manually.
    pub fn auto_advances(&self) -> bool {
        !matches!(self, Self::Typed | Self::Pasted)
    }
}

/// A validated destination address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    /// Normalized address string as the chain expects it.
    pub value: String,
    /// How the user supplied it.
    pub source: AddressSource,
}

impl Address {
    /// Creates an address.
    pub fn new(value: &str, source: AddressSource) -> Self {
        Self {
            value: value.to_string(),
            source,
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

// ---------------------------------------------------------------------------
// Additional Field
// ---------------------------------------------------------------------------

/// Parsed value of an additional field, ready for the transaction builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdditionalParams {
    /// A memo string.
    Memo(String),
    /// A numeric destination tag.
    DestinationTag(u32),
}

/// Whether the asset takes an additional field and what the user put there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdditionalFieldState {
    /// The chain has no such field.
    NotSupported,
    /// Supported but left empty.
    Empty(AdditionalFieldType),
    /// Filled with a validated value.
    Filled {
        /// Field kind.
        field_type: AdditionalFieldType,
        /// Raw text as entered.
        value: String,
        /// Parsed value passed to the builder.
        params: AdditionalParams,
    },
}

impl AdditionalFieldState {
    /// Initial state for an asset: `Empty` if it has a field, else
    /// `NotSupported`.
    pub fn for_asset(asset: &Asset) -> Self {
        match asset.additional_field {
            Some(field_type) => Self::Empty(field_type),
            None => Self::NotSupported,
        }
    }

    /// The parsed params, if filled.
    pub fn params(&self) -> Option<&AdditionalParams> {
        match self {
            Self::Filled { params, .. } => Some(params),
            _ => None,
        }
    }

    /// Returns `true` if the field is supported but empty.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty(_))
    }
}

// ---------------------------------------------------------------------------
// Transaction Draft
// ---------------------------------------------------------------------------

/// A contract call carried by a draft (token approvals).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractCall {
    /// Contract the call is addressed to.
    pub contract: String,
    /// ABI-encoded call data.
    pub call_data: Vec<u8>,
}

/// An unsigned, fully parameterized transaction pending signature.
///
/// Drafts are never mutated. Any change to the inputs produces a new draft
/// with a higher `revision` that supersedes this one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionDraft {
    /// Where the value goes.
    pub destination: Address,
    /// Amount actually sent, after fee inclusion is applied.
    pub amount: u128,
    /// Fee the transaction pays.
    pub fee: Fee,
    /// Memo / tag state at build time.
    pub additional_field: AdditionalFieldState,
    /// Whether `amount` was reduced by the fee ("send max").
    pub includes_fee: bool,
    /// Optional contract call; `None` for plain transfers.
    pub contract_call: Option<ContractCall>,
    /// Sequence number of the computation that built this draft.
    pub revision: u64,
}

impl TransactionDraft {
    /// Total debited from the sender when fees share the asset.
    pub fn total_debit(&self) -> u128 {
        self.amount.saturating_add(self.fee.amount)
    }
}

/// A signed payload ready for submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    /// The draft that was signed.
    pub draft: TransactionDraft,
    /// Opaque chain-specific signed bytes.
    pub payload: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
