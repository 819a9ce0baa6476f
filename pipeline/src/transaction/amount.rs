//! Crypto/fiat dual amounts.
//!
//! The user types an amount either in the asset or in fiat. Whichever side
//! they typed is the primary value; the other side is derived through a
//! [`RateConverter`] and recomputed whenever the primary value or the rate
//! changes. The derived side is never stored independently.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Decimal places kept on the fiat side.
pub const FIAT_DECIMALS: u32 = 2;

// ---------------------------------------------------------------------------
// RateConverter
// ---------------------------------------------------------------------------

/// Converts between smallest crypto units and fiat at a fixed rate.
///
/// A converter without a rate converts nothing; every conversion returns
/// `None` and the derived side of a [`DualAmount`] stays empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateConverter {
    /// Asset decimals (units per whole coin = `10^decimals`).
    pub decimals: u8,
    /// Fiat price of one whole coin.
    pub rate: Option<Decimal>,
}

impl RateConverter {
    /// Creates a converter for an asset with the given decimals.
    pub fn new(decimals: u8, rate: Option<Decimal>) -> Self {
        Self { decimals, rate }
    }

    /// Converts smallest units to fiat, rounded to [`FIAT_DECIMALS`].
    pub fn to_fiat(&self, units: u128) -> Option<Decimal> {
        let rate = self.rate?;
        let coins = self.units_to_coins(units)?;
        let fiat = coins.checked_mul(rate)?;
        Some(fiat.round_dp_with_strategy(FIAT_DECIMALS, RoundingStrategy::MidpointAwayFromZero))
    }

    /// Converts fiat to smallest units, rounded to the nearest unit.
    pub fn to_crypto(&self, fiat: Decimal) -> Option<u128> {
        let rate = self.rate?;
        if rate.is_zero() || fiat.is_sign_negative() {
            return None;
        }
        let coins = fiat.checked_div(rate)?;
        self.scale_to_units(coins, RoundingStrategy::MidpointAwayFromZero)
    }

    /// Interprets a decimal number of whole coins as smallest units.
    ///
    /// Digits beyond the asset's precision are truncated.
    pub fn coins_to_units(&self, coins: Decimal) -> Option<u128> {
        self.scale_to_units(coins, RoundingStrategy::ToZero)
    }

    fn scale_to_units(&self, coins: Decimal, strategy: RoundingStrategy) -> Option<u128> {
        if coins.is_sign_negative() {
            return None;
        }
        let factor = 10i128.checked_pow(u32::from(self.decimals))?;
        let scale = Decimal::try_from_i128_with_scale(factor, 0).ok()?;
        coins
            .checked_mul(scale)?
            .round_dp_with_strategy(0, strategy)
            .to_u128()
    }

    /// Expresses smallest units as a decimal number of whole coins.
    pub fn units_to_coins(&self, units: u128) -> Option<Decimal> {
        let mantissa = i128::try_from(units).ok()?;
        Decimal::try_from_i128_with_scale(mantissa, u32::from(self.decimals)).ok()
    }
}

// ---------------------------------------------------------------------------
// DualAmount
// ---------------------------------------------------------------------------

/// Which side of a [`DualAmount`] the user entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmountPrimary {
    /// The user typed the crypto value.
    Crypto,
    /// The user typed the fiat value.
    Fiat,
}

/// An amount held in one primary representation plus a derived cache of
/// the other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DualAmount {
    primary: AmountPrimary,
    crypto: Option<u128>,
    fiat: Option<Decimal>,
}

impl DualAmount {
    /// An amount the user entered in smallest crypto units.
    pub fn from_crypto(units: u128, converter: &RateConverter) -> Self {
        Self {
            primary: AmountPrimary::Crypto,
            crypto: Some(units),
            fiat: converter.to_fiat(units),
        }
    }

    /// An amount the user entered in fiat.
    pub fn from_fiat(fiat: Decimal, converter: &RateConverter) -> Self {
        Self {
            primary: AmountPrimary::Fiat,
            crypto: converter.to_crypto(fiat),
            fiat: Some(fiat),
        }
    }

    /// Which side was entered.
    pub fn primary(&self) -> AmountPrimary {
        self.primary
    }

    /// Crypto side in smallest units. `None` if derived and no rate is known.
    pub fn crypto(&self) -> Option<u128> {
        self.crypto
    }

    /// Fiat side. `None` if derived and no rate is known.
    pub fn fiat(&self) -> Option<Decimal> {
        self.fiat
    }

    /// Recomputes the derived side after a rate change.
    ///
    /// The primary side is left untouched.
    pub fn rerated(&self, converter: &RateConverter) -> Self {
        match self.primary {
            AmountPrimary::Crypto => match self.crypto {
                Some(units) => Self::from_crypto(units, converter),
                None => self.clone(),
            },
            AmountPrimary::Fiat => match self.fiat {
                Some(fiat) => Self::from_fiat(fiat, converter),
                None => self.clone(),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
