//! Fixed-point monetary amounts.
//!
//! Balances and amounts are stored as a signed count of minor units (cents), so
//! arithmetic and wire round-trips never pick up binary floating point noise.
//!
//! # Example
//!
//! ```
//! use ledger_core::money::Money;
//!
//! let balance = Money::from_cents(10_000) + "50.00".parse::<Money>().unwrap();
//! assert_eq!(balance.to_string(), "150.00");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::str::FromStr;
use thiserror::Error;

/// Number of minor units in one major unit.
const MINOR_PER_MAJOR: i64 = 100;

/// Errors produced when parsing a decimal money string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MoneyParseError {
    /// The input was empty or only whitespace.
    #[error("Empty money amount")]
    Empty,

    /// The input contained something other than an optional sign, digits and one dot.
    #[error("Invalid money amount: {0}")]
    Invalid(String),

    /// More than two digits after the decimal point.
    #[error("Too many fraction digits in money amount: {0}")]
    Precision(String),

    /// The amount does not fit in the minor-unit representation.
    #[error("Money amount out of range: {0}")]
    Overflow(String),
}

/// Signed monetary amount in minor units (cents).
///
/// Serializes as the bare integer minor-unit count.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Zero.
    pub const ZERO: Self = Self(0);

    /// Creates an amount from minor units.
    #[must_use]
    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Creates an amount from whole major units.
    #[must_use]
    pub const fn from_major(major: i64) -> Self {
        Self(major.saturating_mul(MINOR_PER_MAJOR))
    }

    /// Returns the amount in minor units.
    #[must_use]
    pub const fn cents(self) -> i64 {
        self.0
    }

    /// Checks if this amount is zero
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Checks if this amount is below zero
    #[must_use]
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl Neg for Money {
    type Output = Self;

    fn neg(self) -> Self {
        Self(self.0.saturating_neg())
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let per = MINOR_PER_MAJOR.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / per, abs % per)
    }
}

impl FromStr for Money {
    type Err = MoneyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(MoneyParseError::Empty);
        }

        let (negative, unsigned) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
        };

        let (whole, fraction) = unsigned.split_once('.').unwrap_or((unsigned, ""));
        let all_digits = |part: &str| part.chars().all(|c| c.is_ascii_digit());
        if (whole.is_empty() && fraction.is_empty()) || !all_digits(whole) || !all_digits(fraction)
        {
            return Err(MoneyParseError::Invalid(s.to_string()));
        }
        if fraction.len() > 2 {
            return Err(MoneyParseError::Precision(s.to_string()));
        }

        let overflow = || MoneyParseError::Overflow(s.to_string());
        let major: i64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| overflow())?
        };
        let minor: i64 = match fraction.len() {
            0 => 0,
            1 => fraction.parse::<i64>().map_err(|_| overflow())? * 10,
            _ => fraction.parse().map_err(|_| overflow())?,
        };

        let cents = major
            .checked_mul(MINOR_PER_MAJOR)
            .and_then(|c| c.checked_add(minor))
            .ok_or_else(overflow)?;

        Ok(Self(if negative { -cents } else { cents }))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use proptest::prelude::*;

    #[test]
    fn display_pads_fraction() {
        assert_eq!(Money::from_cents(12_000).to_string(), "120.00");
        assert_eq!(Money::from_cents(5).to_string(), "0.05");
        assert_eq!(Money::from_cents(-525).to_string(), "-5.25");
    }

    #[test]
    fn parses_decimal_strings() {
        assert_eq!("100".parse::<Money>().unwrap(), Money::from_major(100));
        assert_eq!("30.5".parse::<Money>().unwrap(), Money::from_cents(3050));
        assert_eq!("-0.01".parse::<Money>().unwrap(), Money::from_cents(-1));
        assert_eq!(".75".parse::<Money>().unwrap(), Money::from_cents(75));
    }

    #[test]
    fn rejects_malformed_strings() {
        assert_eq!("".parse::<Money>(), Err(MoneyParseError::Empty));
        assert!(matches!("1.234".parse::<Money>(), Err(MoneyParseError::Precision(_))));
        assert!(matches!("12a".parse::<Money>(), Err(MoneyParseError::Invalid(_))));
        assert!(matches!(".".parse::<Money>(), Err(MoneyParseError::Invalid(_))));
    }

    #[test]
    fn arithmetic_is_exact() {
        let mut balance = Money::from_major(100);
        balance += Money::from_major(50);
        balance -= Money::from_major(30);
        assert_eq!(balance, Money::from_major(120));
        assert_eq!(-balance, Money::from_cents(-12_000));
    }

    #[test]
    fn serializes_as_minor_units() {
        let json = serde_json::to_string(&Money::from_cents(12_345)).unwrap();
        assert_eq!(json, "12345");
    }

    proptest! {
        #[test]
        fn display_output_parses_back(cents in -1_000_000_000_i64..1_000_000_000) {
            let money = Money::from_cents(cents);
            prop_assert_eq!(money.to_string().parse::<Money>().unwrap(), money);
        }
    }
}
