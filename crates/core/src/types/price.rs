//! Type-safe price representation using decimal arithmetic.
//!
//! The store sells in a single currency, configured at the storefront level,
//! so a `Price` is only the amount. Amounts are never negative.

use core::fmt;
use core::iter::Sum;
use core::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

/// Errors that can occur when constructing a [`Price`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PriceError {
    /// The amount is below zero.
    #[error("price cannot be negative")]
    Negative,
    /// The input is not a decimal number.
    #[error("price must be a number: {0}")]
    Invalid(String),
}

/// A non-negative price in the store currency.
///
/// Serialized as a decimal string (e.g. `"1500"`), which round-trips exactly.
///
/// ```
/// use valfinds_core::Price;
///
/// let price: Price = "1500".parse().unwrap();
/// assert_eq!(price.times(2).to_string(), "3000");
/// assert!("-1".parse::<Price>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct Price(Decimal);

impl Price {
    /// A price of zero.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Create a new price.
    ///
    /// # Errors
    ///
    /// Returns `PriceError::Negative` if the amount is below zero.
    pub fn new(amount: Decimal) -> Result<Self, PriceError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(PriceError::Negative);
        }
        Ok(Self(amount))
    }

    /// Create a price from a whole number of currency units.
    #[must_use]
    pub fn from_units(units: u64) -> Self {
        Self(Decimal::from(units))
    }

    /// Get the underlying decimal amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Returns true if the price is zero.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Multiply by a quantity (line total). Saturates at the largest
    /// representable amount.
    #[must_use]
    pub fn times(self, quantity: u32) -> Self {
        Self(self.0.saturating_mul(Decimal::from(quantity)))
    }

    /// Add two prices, saturating at the largest representable amount.
    #[must_use]
    pub fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

impl FromStr for Price {
    type Err = PriceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let amount = Decimal::from_str(s.trim()).map_err(|e| PriceError::Invalid(e.to_string()))?;
        Self::new(amount)
    }
}

impl TryFrom<Decimal> for Price {
    type Error = PriceError;

    fn try_from(amount: Decimal) -> Result<Self, Self::Error> {
        Self::new(amount)
    }
}

impl Sum for Price {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Self::saturating_add)
    }
}

impl<'de> Deserialize<'de> for Price {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let amount = <Decimal as Deserialize>::deserialize(deserializer)?;
        Self::new(amount).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_negative() {
        assert_eq!(Price::new(Decimal::from(-5)), Err(PriceError::Negative));
    }

    #[test]
    fn test_accepts_zero() {
        assert!(Price::new(Decimal::ZERO).unwrap().is_zero());
    }

    #[test]
    fn test_parse_invalid() {
        assert!(matches!(
            "abc".parse::<Price>(),
            Err(PriceError::Invalid(_))
        ));
    }

    #[test]
    fn test_times_and_sum() {
        let jacket = Price::from_units(1500);
        let scarf: Price = "250.50".parse().unwrap();
        let total: Price = [jacket.times(2), scarf].into_iter().sum();
        assert_eq!(total.to_string(), "3250.5");
    }

    #[test]
    fn test_times_saturates_instead_of_overflowing() {
        let huge: Price = "50000000000000000000000000000".parse().unwrap();
        assert_eq!(huge.times(2).amount(), Decimal::MAX);
        assert_eq!(huge.times(1), huge);
    }

    #[test]
    fn test_sum_saturates_instead_of_overflowing() {
        let huge: Price = "50000000000000000000000000000".parse().unwrap();
        let total: Price = [huge, huge, Price::from_units(1)].into_iter().sum();
        assert_eq!(total.amount(), Decimal::MAX);
    }

    #[test]
    fn test_display_drops_trailing_zeros() {
        let price: Price = "1500.00".parse().unwrap();
        assert_eq!(price.to_string(), "1500");
    }

    #[test]
    fn test_serde_string_form() {
        let price = Price::from_units(1500);
        let json = serde_json::to_string(&price).unwrap();
        assert_eq!(json, "\"1500\"");
        let parsed: Price = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, price);
    }

    #[test]
    fn test_deserialize_rejects_negative() {
        assert!(serde_json::from_str::<Price>("\"-1\"").is_err());
    }
}
