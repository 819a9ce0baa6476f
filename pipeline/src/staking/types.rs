//! Staking vocabulary: yields, validators, positions and states.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::fee::Fee;

/// A validator the user can delegate to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorInfo {
    /// On-chain address.
    pub address: String,
    /// Display name.
    pub name: String,
    /// Annual percentage rate offered by this validator.
    pub apr: Decimal,
}

/// What a staking position currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StakingBalanceKind {
    /// Actively staked.
    Staked,
    /// Waiting out the unbonding period.
    Unbonding,
    /// Claimable rewards.
    Rewards,
}

/// One staking position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakingBalance {
    /// Validator address.
    pub validator: String,
    /// Smallest units.
    pub amount: u128,
    /// Position kind.
    pub kind: StakingBalanceKind,
}

/// Staking program metadata for one asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Yield {
    /// Headline APR.
    pub apr: Decimal,
    /// Smallest stake accepted, in smallest units.
    pub minimum_stake: u128,
    /// Unbonding period in seconds.
    pub unbonding_period_secs: u64,
    /// Validators on offer.
    pub validators: Vec<ValidatorInfo>,
    /// Whether staking exists for this asset in this wallet.
    pub enabled: bool,
    /// Whether new stakes are currently accepted.
    pub available: bool,
    /// Contract that must be approved to move the token, if any.
    pub allowance_spender: Option<String>,
}

impl Yield {
    /// Looks up a validator by address.
    pub fn validator(&self, address: &str) -> Option<&ValidatorInfo> {
        self.validators
            .iter()
            .find(|v| v.address.eq_ignore_ascii_case(address))
    }
}

/// Staking state of the wallet for one asset.
///
/// Always replaced wholesale from a fresh fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum StakingState {
    /// Nothing fetched yet.
    Loading,
    /// The asset has no staking program.
    NotEnabled,
    /// Staking exists but is paused.
    TemporaryUnavailable {
        /// Current yield metadata.
        yield_info: Yield,
    },
    /// Nothing staked yet; staking possible.
    AvailableToStake {
        /// Current yield metadata.
        yield_info: Yield,
    },
    /// At least one non-empty position exists.
    Staked {
        /// Current positions.
        balances: Vec<StakingBalance>,
        /// Current yield metadata.
        yield_info: Yield,
        /// Whether more can be staked right now.
        can_stake_more: bool,
    },
}

impl StakingState {
    /// Derives the state from freshly fetched yield and balances.
    ///
    /// Non-empty balances always yield [`StakingState::Staked`], even when
    /// the program is paused.
    pub fn from_fetch(yield_info: Option<Yield>, balances: Vec<StakingBalance>) -> Self {
        let yield_info = match yield_info {
            Some(y) if y.enabled => y,
            _ => return Self::NotEnabled,
        };

        let balances: Vec<StakingBalance> = balances.into_iter().filter(|b| b.amount > 0).collect();
        if !balances.is_empty() {
            let can_stake_more = yield_info.available;
            return Self::Staked {
                balances,
                yield_info,
                can_stake_more,
            };
        }

        if yield_info.available {
            Self::AvailableToStake { yield_info }
        } else {
            Self::TemporaryUnavailable { yield_info }
        }
    }

    /// The yield metadata, when loaded and enabled.
    pub fn yield_info(&self) -> Option<&Yield> {
        match self {
            Self::TemporaryUnavailable { yield_info }
            | Self::AvailableToStake { yield_info }
            | Self::Staked { yield_info, .. } => Some(yield_info),
            Self::Loading | Self::NotEnabled => None,
        }
    }

    /// Whether a new stake may be started.
    pub fn can_stake(&self) -> bool {
        match self {
            Self::AvailableToStake { .. } => true,
            Self::Staked { can_stake_more, .. } => *can_stake_more,
            _ => false,
        }
    }
}

/// What has to happen next to stake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum StakingPreparedAction {
    /// The allowance is too low; approve first.
    ReadyToApprove {
        /// Token contract to call.
        contract: String,
        /// ABI-encoded `approve(spender, amount)`.
        #[serde(with = "hex_bytes")]
        call_data: Vec<u8>,
        /// Fee of the approve transaction: the `Fast` tier, or `Market` for a single quote.
        fee: Fee,
    },
    /// Everything is in place; stake.
    ReadyToStake {
        /// Fee of the stake transaction.
        fee: Fee,
    },
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s.trim_start_matches("0x")).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn yield_info(enabled: bool, available: bool) -> Yield {
        Yield {
            apr: Decimal::new(45, 1),
            minimum_stake: 1_000,
            unbonding_period_secs: 7 * 24 * 3600,
            validators: vec![ValidatorInfo {
                address: "0xVALIDATOR".into(),
                name: "Validator One".into(),
                apr: Decimal::new(5, 0),
            }],
            enabled,
            available,
            allowance_spender: None,
        }
    }

    fn position(amount: u128) -> StakingBalance {
        StakingBalance {
            validator: "0xvalidator".into(),
            amount,
            kind: StakingBalanceKind::Staked,
        }
    }

    #[test]
    fn no_yield_is_not_enabled() {
        assert_eq!(StakingState::from_fetch(None, vec![]), StakingState::NotEnabled);
        assert_eq!(
            StakingState::from_fetch(Some(yield_info(false, true)), vec![]),
            StakingState::NotEnabled
        );
    }

    #[test]
    fn empty_balances_are_available_or_paused() {
        assert!(matches!(
            StakingState::from_fetch(Some(yield_info(true, true)), vec![]),
            StakingState::AvailableToStake { .. }
        ));
        assert!(matches!(
            StakingState::from_fetch(Some(yield_info(true, false)), vec![]),
            StakingState::TemporaryUnavailable { .. }
        ));
    }

    #[test]
    fn zero_positions_do_not_count_as_staked() {
        assert!(matches!(
            StakingState::from_fetch(Some(yield_info(true, true)), vec![position(0)]),
            StakingState::AvailableToStake { .. }
        ));
    }

    #[test]
    fn non_empty_balances_are_staked_even_when_paused() {
        let state = StakingState::from_fetch(Some(yield_info(true, false)), vec![position(5)]);
        match state {
            StakingState::Staked { can_stake_more, ref balances, .. } => {
                assert!(!can_stake_more);
                assert_eq!(balances.len(), 1);
            }
            other => panic!("expected staked, got {other:?}"),
        }
        assert!(!state.can_stake());
    }

    #[test]
    fn validator_lookup_ignores_case() {
        assert!(yield_info(true, true).validator("0xvalidator").is_some());
        assert!(yield_info(true, true).validator("0xother").is_none());
    }

    #[test]
    fn prepared_action_serializes_call_data_as_hex() {
        let action = StakingPreparedAction::ReadyToApprove {
            contract: "0xtoken".into(),
            call_data: vec![0x09, 0x5e],
            fee: Fee::fixed(1),
        };
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["call_data"], "0x095e");
        assert_eq!(json["action"], "ready_to_approve");
    }
}
