//! Type-safe price representation using decimal arithmetic.
//!
//! Amounts are always `Decimal` in the currency's standard unit (pesos, not
//! centavos). Conversion to integral minor units happens only at the payment
//! boundary via [`Price::minor_units`].

use core::fmt;
use core::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of decimal places in every supported currency's minor unit.
pub const MINOR_UNIT_DIGITS: u32 = 2;

/// Errors that can occur when converting a [`Price`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PriceError {
    /// The amount is negative and cannot be charged.
    #[error("amount cannot be negative: {0}")]
    Negative(Decimal),
    /// The amount does not fit in an `i64` of minor units.
    #[error("amount out of range for minor units: {0}")]
    OutOfRange(Decimal),
    /// Unknown ISO 4217 currency code.
    #[error("unsupported currency code: {0}")]
    UnknownCurrency(String),
}

/// A price with currency information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// Amount in the currency's standard unit (e.g., pesos, not centavos).
    pub amount: Decimal,
    /// ISO 4217 currency code.
    pub currency_code: CurrencyCode,
}

impl Price {
    /// Create a new price.
    #[must_use]
    pub const fn new(amount: Decimal, currency_code: CurrencyCode) -> Self {
        Self {
            amount,
            currency_code,
        }
    }

    /// Amount in integral minor units (e.g., centavos) for the payment provider.
    ///
    /// The amount is rounded to the minor unit first (midpoint away from zero).
    ///
    /// # Errors
    ///
    /// Returns `PriceError::Negative` for negative amounts and
    /// `PriceError::OutOfRange` if the result does not fit in an `i64`.
    pub fn minor_units(&self) -> Result<i64, PriceError> {
        if self.amount.is_sign_negative() && !self.amount.is_zero() {
            return Err(PriceError::Negative(self.amount));
        }
        let scaled = round_minor(self.amount)
            .checked_mul(Decimal::from(10_i64.pow(MINOR_UNIT_DIGITS)))
            .ok_or(PriceError::OutOfRange(self.amount))?;
        scaled.to_i64().ok_or(PriceError::OutOfRange(self.amount))
    }

    /// Format for display (e.g., "$1380.00").
    #[must_use]
    pub fn display(&self) -> String {
        format!(
            "{}{:.2}",
            self.currency_code.symbol(),
            round_minor(self.amount)
        )
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.display(), self.currency_code.code())
    }
}

/// Round an amount to the minor unit, midpoint away from zero.
#[must_use]
pub fn round_minor(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MINOR_UNIT_DIGITS, RoundingStrategy::MidpointAwayFromZero)
}

/// ISO 4217 currency codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    #[default]
    MXN,
    USD,
    EUR,
    CAD,
}

impl CurrencyCode {
    /// Display symbol.
    #[must_use]
    pub const fn symbol(&self) -> &'static str {
        match self {
            Self::MXN | Self::USD | Self::CAD => "$",
            Self::EUR => "€",
        }
    }

    /// Upper-case ISO code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::MXN => "MXN",
            Self::USD => "USD",
            Self::EUR => "EUR",
            Self::CAD => "CAD",
        }
    }
}

impl FromStr for CurrencyCode {
    type Err = PriceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "MXN" => Ok(Self::MXN),
            "USD" => Ok(Self::USD),
            "EUR" => Ok(Self::EUR),
            "CAD" => Ok(Self::CAD),
            other => Err(PriceError::UnknownCurrency(other.to_string())),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_minor_units_exact() {
        let price = Price::new(dec!(1380.00), CurrencyCode::MXN);
        assert_eq!(price.minor_units().unwrap(), 138_000);
    }

    #[test]
    fn test_minor_units_rounds_half_away_from_zero() {
        assert_eq!(
            Price::new(dec!(10.005), CurrencyCode::MXN)
                .minor_units()
                .unwrap(),
            1001
        );
        assert_eq!(
            Price::new(dec!(10.004), CurrencyCode::MXN)
                .minor_units()
                .unwrap(),
            1000
        );
    }

    #[test]
    fn test_minor_units_rejects_negative() {
        let price = Price::new(dec!(-1.00), CurrencyCode::MXN);
        assert_eq!(price.minor_units(), Err(PriceError::Negative(dec!(-1.00))));
    }

    #[test]
    fn test_minor_units_rejects_overflow() {
        let price = Price::new(Decimal::MAX, CurrencyCode::USD);
        assert!(matches!(
            price.minor_units(),
            Err(PriceError::OutOfRange(_))
        ));
    }

    #[test]
    fn test_display() {
        let price = Price::new(dec!(85.5), CurrencyCode::MXN);
        assert_eq!(price.display(), "$85.50");
        assert_eq!(price.to_string(), "$85.50 MXN");
        assert_eq!(Price::new(dec!(3), CurrencyCode::EUR).display(), "€3.00");
    }

    #[test]
    fn test_currency_from_str() {
        assert_eq!("mxn".parse::<CurrencyCode>().unwrap(), CurrencyCode::MXN);
        assert!("XXX".parse::<CurrencyCode>().is_err());
    }
}
