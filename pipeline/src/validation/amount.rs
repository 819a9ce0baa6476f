//! Amount validation against balance, reserve, dust and fee.

use super::ValidationError;
use crate::transaction::{Asset, AssetFamily};

/// The fee an amount has to leave room for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeeContext {
    /// Fee in the sent asset's smallest unit. `None` while fees load or
    /// when the fee is paid in another asset.
    pub fee: Option<u128>,
    /// Whether the fee will be deducted from the amount.
    pub include_fee: bool,
}

impl FeeContext {
    /// No fee known yet.
    pub fn none() -> Self {
        Self::default()
    }

    /// A same-asset fee.
    pub fn with_fee(fee: u128, include_fee: bool) -> Self {
        Self {
            fee: Some(fee),
            include_fee,
        }
    }
}

/// Validates amounts for one asset.
#[derive(Debug, Clone)]
pub struct AmountValidator {
    asset: Asset,
}

impl AmountValidator {
    /// Creates a validator for `asset`.
    pub fn new(asset: Asset) -> Self {
        Self { asset }
    }

    /// Balance minus the asset's reserve.
    pub fn spendable(&self, balance: u128) -> u128 {
        balance.saturating_sub(self.asset.reserve)
    }

    /// Checks `value` against `balance` and the fee it must cover.
    ///
    /// A fee paid in another asset is not this validator's concern; pass
    /// [`FeeContext::none`] for tokens.
    pub fn validate_amount(
        &self,
        value: u128,
        balance: u128,
        fee: FeeContext,
    ) -> Result<(), ValidationError> {
        if value == 0 {
            return Err(ValidationError::NonPositiveAmount);
        }

        let spendable = self.spendable(balance);
        if value > balance {
            return Err(ValidationError::ExceedsBalance { spendable });
        }
        if value > spendable {
            return Err(ValidationError::ReserveViolation {
                reserve: self.asset.reserve,
            });
        }

        let dust = self.asset.dust;
        if dust > 0 && value < dust {
            return Err(ValidationError::Dust { minimum: dust });
        }

        let fee_amount = match fee.fee {
            Some(fee_amount) if self.asset.fee_in_same_asset() => fee_amount,
            _ => return Ok(()),
        };

        let debit = if fee.include_fee {
            // The fee comes out of the amount, so the amount has to exceed it.
            if value <= fee_amount {
                return Err(ValidationError::InsufficientForFee {
                    amount: value,
                    fee: fee_amount,
                    spendable,
                });
            }
            value
        } else {
            value.saturating_add(fee_amount)
        };

        if debit > spendable {
            return Err(ValidationError::InsufficientForFee {
                amount: value,
                fee: fee_amount,
                spendable,
            });
        }

        // Change below dust cannot be relayed on UTXO chains.
        if self.asset.family == AssetFamily::Utxo && dust > 0 {
            let remaining = spendable - debit;
            if remaining > 0 && remaining < dust {
                return Err(ValidationError::DustChange {
                    remaining,
                    minimum: dust,
                });
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn btc() -> AmountValidator {
        AmountValidator::new(Asset {
            dust: 546,
            ..Asset::coin("BTC", 8, AssetFamily::Utxo)
        })
    }

    fn xrp() -> AmountValidator {
        AmountValidator::new(Asset {
            reserve: 10_000_000,
            ..Asset::coin("XRP", 6, AssetFamily::Account)
        })
    }

    #[test]
    fn zero_is_rejected() {
        assert_eq!(
            btc().validate_amount(0, 1_000, FeeContext::none()),
            Err(ValidationError::NonPositiveAmount)
        );
    }

    #[test]
    fn more_than_balance_is_rejected() {
        assert_eq!(
            btc().validate_amount(10_001, 10_000, FeeContext::none()),
            Err(ValidationError::ExceedsBalance { spendable: 10_000 })
        );
    }

    #[test]
    fn reserve_cannot_be_spent() {
        let result = xrp().validate_amount(15_000_000, 20_000_000, FeeContext::none());
        assert_eq!(
            result,
            Err(ValidationError::ReserveViolation {
                reserve: 10_000_000
            })
        );
        assert!(xrp()
            .validate_amount(5_000_000, 20_000_000, FeeContext::none())
            .is_ok());
    }

    #[test]
    fn dust_outputs_are_flagged() {
        assert_eq!(
            btc().validate_amount(100, 10_000, FeeContext::none()),
            Err(ValidationError::Dust { minimum: 546 })
        );
    }

    #[test]
    fn amount_plus_fee_must_fit() {
        let result = btc().validate_amount(9_500, 10_000, FeeContext::with_fee(1_000, false));
        assert_eq!(
            result,
            Err(ValidationError::InsufficientForFee {
                amount: 9_500,
                fee: 1_000,
                spendable: 10_000,
            })
        );
    }

    #[test]
    fn included_fee_only_needs_amount_to_fit() {
        assert!(btc()
            .validate_amount(10_000, 10_000, FeeContext::with_fee(1_000, true))
            .is_ok());
    }

    #[test]
    fn included_fee_larger_than_amount_is_rejected() {
        assert!(matches!(
            btc().validate_amount(1_000, 10_000, FeeContext::with_fee(1_000, true)),
            Err(ValidationError::InsufficientForFee { .. })
        ));
    }

    #[test]
    fn dust_change_is_flagged() {
        // 10_000 - 9_000 - 700 = 300 left over, below the 546 dust limit.
        assert_eq!(
            btc().validate_amount(9_000, 10_000, FeeContext::with_fee(700, false)),
            Err(ValidationError::DustChange {
                remaining: 300,
                minimum: 546,
            })
        );
    }

    #[test]
    fn token_fee_is_ignored() {
        let usdt = AmountValidator::new(Asset::token("USDT", 6, "0xdead"));
        assert!(usdt
            .validate_amount(1_000, 1_000, FeeContext::with_fee(5_000, false))
            .is_ok());
    }
}
