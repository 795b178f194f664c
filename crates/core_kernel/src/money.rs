//! Money types with precise decimal arithmetic
//!
//! Ledger amounts are `rust_decimal::Decimal` values. This module ties an
//! amount to a currency so it can be normalized to the currency's minor unit
//! and formatted for reports.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Neg;
use std::str::FromStr;
use thiserror::Error;

/// Currency codes following ISO 4217
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    #[default]
    INR,
    USD,
    EUR,
    GBP,
    AED,
    NPR,
    BDT,
    LKR,
}

impl Currency {
    /// Returns the number of decimal places for this currency
    pub fn decimal_places(&self) -> u32 {
        2
    }

    /// Returns the currency symbol
    pub fn symbol(&self) -> &'static str {
        match self {
            Currency::INR => "₹",
            Currency::USD => "$",
            Currency::EUR => "€",
            Currency::GBP => "£",
            Currency::AED => "AED",
            Currency::NPR => "रू",
            Currency::BDT => "৳",
            Currency::LKR => "Rs",
        }
    }

    /// Returns the ISO 4217 code
    pub fn code(&self) -> &'static str {
        match self {
            Currency::INR => "INR",
            Currency::USD => "USD",
            Currency::EUR => "EUR",
            Currency::GBP => "GBP",
            Currency::AED => "AED",
            Currency::NPR => "NPR",
            Currency::BDT => "BDT",
            Currency::LKR => "LKR",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for Currency {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INR" => Ok(Currency::INR),
            "USD" => Ok(Currency::USD),
            "EUR" => Ok(Currency::EUR),
            "GBP" => Ok(Currency::GBP),
            "AED" => Ok(Currency::AED),
            "NPR" => Ok(Currency::NPR),
            "BDT" => Ok(Currency::BDT),
            "LKR" => Ok(Currency::LKR),
            other => Err(MoneyError::UnknownCurrency(other.to_string())),
        }
    }
}

/// Errors that can occur during money operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Currency mismatch: cannot operate on {0} and {1}")]
    CurrencyMismatch(String, String),

    #[error("Unknown currency: {0}")]
    UnknownCurrency(String),

    #[error("Overflow during calculation")]
    Overflow,
}

/// A monetary amount with associated currency
///
/// Amounts are kept exactly as given; `normalized` rounds half away from
/// zero to the currency's minor unit, which is what the ledger stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    amount: Decimal,
    currency: Currency,
}

impl Money {
    pub fn new(amount: Decimal, currency: Currency) -> Self {
        Self { amount, currency }
    }

    /// Creates Money from an integer amount in minor units (e.g., paise)
    pub fn from_minor(minor_units: i64, currency: Currency) -> Self {
        Self::new(Decimal::new(minor_units, currency.decimal_places()), currency)
    }

    pub fn zero(currency: Currency) -> Self {
        Self::new(Decimal::ZERO, currency)
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    /// Returns true if the amount is strictly positive
    pub fn is_positive(&self) -> bool {
        self.amount > Decimal::ZERO
    }

    /// Returns true if the amount is strictly negative
    pub fn is_negative(&self) -> bool {
        self.amount < Decimal::ZERO
    }

    pub fn abs(&self) -> Self {
        Self::new(self.amount.abs(), self.currency)
    }

    /// Rounds to the currency's minor unit, keeping trailing zeros (`5000.00`)
    pub fn normalized(&self) -> Self {
        let dp = self.currency.decimal_places();
        let mut amount = self
            .amount
            .round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero);
        amount.rescale(dp);
        Self::new(amount, self.currency)
    }

    /// Checked addition that fails on currency mismatch or overflow
    pub fn checked_add(&self, other: &Money) -> Result<Money, MoneyError> {
        self.ensure_same_currency(other)?;
        self.amount
            .checked_add(other.amount)
            .map(|amount| Self::new(amount, self.currency))
            .ok_or(MoneyError::Overflow)
    }

    /// Checked subtraction that fails on currency mismatch or overflow
    pub fn checked_sub(&self, other: &Money) -> Result<Money, MoneyError> {
        self.ensure_same_currency(other)?;
        self.amount
            .checked_sub(other.amount)
            .map(|amount| Self::new(amount, self.currency))
            .ok_or(MoneyError::Overflow)
    }

    fn ensure_same_currency(&self, other: &Money) -> Result<(), MoneyError> {
        if self.currency != other.currency {
            return Err(MoneyError::CurrencyMismatch(
                self.currency.to_string(),
                other.currency.to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dp = self.currency.decimal_places() as usize;
        let sign = if self.is_negative() { "-" } else { "" };
        write!(
            f,
            "{}{} {:.dp$}",
            sign,
            self.currency.symbol(),
            self.amount.abs(),
            dp = dp
        )
    }
}

impl Neg for Money {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.amount, self.currency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_normalized_rounds_to_paise() {
        let m = Money::new(dec!(100.005), Currency::INR).normalized();
        assert_eq!(m.amount(), dec!(100.01));
        assert_eq!(m.amount().scale(), 2);
    }

    #[test]
    fn test_display_uses_symbol() {
        let m = Money::new(dec!(5000), Currency::INR);
        assert_eq!(m.to_string(), "₹ 5000.00");
        assert_eq!((-m).to_string(), "-₹ 5000.00");
    }

    #[test]
    fn test_currency_mismatch() {
        let inr = Money::new(dec!(1), Currency::INR);
        let usd = Money::new(dec!(1), Currency::USD);
        assert!(matches!(inr.checked_add(&usd), Err(MoneyError::CurrencyMismatch(_, _))));
    }

    #[test]
    fn test_currency_parsing() {
        assert_eq!("inr".parse::<Currency>().unwrap(), Currency::INR);
        assert!("XYZ".parse::<Currency>().is_err());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn normalized_is_idempotent(
            minor in -1_000_000_000i64..1_000_000_000i64,
            extra in 0u32..4u32,
        ) {
            let money = Money::new(Decimal::new(minor, 2 + extra), Currency::INR);
            let once = money.normalized();
            prop_assert_eq!(once, once.normalized());
        }

        #[test]
        fn checked_add_then_sub_roundtrips(
            a in -1_000_000i64..1_000_000i64,
            b in -1_000_000i64..1_000_000i64,
        ) {
            let ma = Money::from_minor(a, Currency::INR);
            let mb = Money::from_minor(b, Currency::INR);
            let back = ma.checked_add(&mb).unwrap().checked_sub(&mb).unwrap();
            prop_assert_eq!(back.amount(), ma.amount());
        }
    }
}
