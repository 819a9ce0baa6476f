//! # Pipeline Configuration & Constants
//!
//! Every tunable the pipeline reads lives here: hard protocol constants at
//! the top, and [`PipelineConfig`] for the settings a host application may
//! override. The config value is threaded into each component at
//! construction time. Nothing in the crate reads global mutable settings.

use serde::{Deserialize, Serialize};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Additional Fields
// ---------------------------------------------------------------------------

/// Maximum memo length in bytes. Chains with shorter limits reject
/// earlier inside their own `AddressValidationService`.
pub const MAX_MEMO_LENGTH: usize = 256;

// ---------------------------------------------------------------------------
// EVM Parameters
// ---------------------------------------------------------------------------

/// Function selector of ERC-20 `approve(address,uint256)`:
/// the first four bytes of `keccak256("approve(address,uint256)")`.
pub const ERC20_APPROVE_SELECTOR: [u8; 4] = [0x09, 0x5e, 0xa7, 0xb3];

/// Length of one ABI-encoded word.
pub const ABI_WORD_LENGTH: usize = 32;

/// Gas limit of a plain value transfer on every EVM chain we know of.
pub const EVM_TRANSFER_GAS_LIMIT: u64 = 21_000;

// ---------------------------------------------------------------------------
// Fee Relevance
// ---------------------------------------------------------------------------

/// Default age after which a fee quote is considered stale and must be
/// re-quoted before dispatch.
pub const DEFAULT_FEE_STALENESS_WINDOW: Duration = Duration::from_secs(60);

/// A custom fee above `highest quoted tier x this` is flagged as too high.
pub const DEFAULT_CUSTOM_FEE_TOO_HIGH_MULTIPLIER: u64 = 5;

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Machine-readable code attached to send failures whose cause could not
/// be classified any further.
pub const SEND_FAILURE_CODE_UNKNOWN: u32 = 1000;

/// The provider rejected the signed transaction.
pub const SEND_FAILURE_CODE_REJECTED: u32 = 1001;

/// The provider could not be reached or timed out.
pub const SEND_FAILURE_CODE_NETWORK: u32 = 1002;

/// Signing failed for a reason other than user cancellation.
pub const SEND_FAILURE_CODE_SIGNER: u32 = 1003;

// ---------------------------------------------------------------------------
// PipelineConfig
// ---------------------------------------------------------------------------

/// Allowance to request when a staking contract needs approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovePolicy {
    /// Approve exactly the amount about to be staked.
    Exact,
    /// Approve the maximum `uint256`, so later stakes need no approval.
    Unlimited,
}

/// Settings shared by every component of a send or staking session.
///
/// Unknown fields are rejected so a typo in a config file fails loudly
/// instead of silently falling back to a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Seconds a fee quote stays actual before the relevance guard
    /// re-quotes it.
    pub fee_staleness_window_secs: u64,

    /// Multiplier over the highest quoted tier above which a custom fee
    /// needs explicit confirmation.
    pub custom_fee_too_high_multiplier: u64,

    /// Approve policy used when the staking flow starts.
    pub default_approve_policy: ApprovePolicy,

    /// How many recently used destinations the recent-address store keeps.
    pub recent_addresses_limit: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fee_staleness_window_secs: DEFAULT_FEE_STALENESS_WINDOW.as_secs(),
            custom_fee_too_high_multiplier: DEFAULT_CUSTOM_FEE_TOO_HIGH_MULTIPLIER,
            default_approve_policy: ApprovePolicy::Unlimited,
            recent_addresses_limit: 10,
        }
    }
}

impl PipelineConfig {
    /// The staleness window as a [`Duration`].
    pub fn fee_staleness_window(&self) -> Duration {
        Duration::from_secs(self.fee_staleness_window_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let config = PipelineConfig::default();
        assert_eq!(config.fee_staleness_window(), DEFAULT_FEE_STALENESS_WINDOW);
        assert!(config.custom_fee_too_high_multiplier > 1);
        assert_eq!(config.default_approve_policy, ApprovePolicy::Unlimited);
    }

    #[test]
    fn test_partial_json_falls_back_to_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{ "fee_staleness_window_secs": 5 }"#).unwrap();
        assert_eq!(config.fee_staleness_window(), Duration::from_secs(5));
        assert_eq!(
            config.custom_fee_too_high_multiplier,
            DEFAULT_CUSTOM_FEE_TOO_HIGH_MULTIPLIER
        );
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let result: Result<PipelineConfig, _> =
            serde_json::from_str(r#"{ "fee_staleness_window": 5 }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_approve_policy_snake_case() {
        let policy: ApprovePolicy = serde_json::from_str(r#""exact""#).unwrap();
        assert_eq!(policy, ApprovePolicy::Exact);
    }

    #[test]
    fn test_approve_selector_length() {
        assert_eq!(ERC20_APPROVE_SELECTOR.len(), 4);
        assert_eq!(hex::encode(ERC20_APPROVE_SELECTOR), "095ea7b3");
    }
}
