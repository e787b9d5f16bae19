use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Mul, Neg, Sub, SubAssign},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const CENTS_PER_UNIT: i64 = 100;

//--------------------------------------        Money        ---------------------------------------------------------
/// A signed amount of money, held in minor units (cents).
///
/// Every amount in the ledger is a `Money` value. Keeping amounts as integers means reconciliation checks are exact and
/// the only rounding in the system happens in [`Money::percentage`].
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct Money(i64);

op!(binary Money, Add, add);
op!(binary Money, Sub, sub);
op!(inplace Money, SubAssign, sub_assign);
op!(unary Money, Neg, neg);

impl Mul<i64> for Money {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from(self.value() * rhs)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Value cannot be represented as money: {0}")]
pub struct MoneyConversionError(String);

impl From<i64> for Money {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let unit = CENTS_PER_UNIT.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / unit, abs % unit)
    }
}

impl FromStr for Money {
    type Err = MoneyConversionError;

    /// Parses decimal strings such as `"1000"`, `"950.5"` or `"-50.00"`. More than two decimal places is an error,
    /// since it cannot be represented without rounding.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let (whole, frac) = match digits.split_once('.') {
            Some((w, f)) => (w, f),
            None => (digits, ""),
        };
        if whole.is_empty() || frac.len() > 2 {
            return Err(MoneyConversionError(s.to_string()));
        }
        if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
            return Err(MoneyConversionError(s.to_string()));
        }
        let whole = whole.parse::<i64>().map_err(|e| MoneyConversionError(format!("{s}: {e}")))?;
        let frac = match frac.len() {
            0 => 0,
            1 => frac.parse::<i64>().map_err(|e| MoneyConversionError(format!("{s}: {e}")))? * 10,
            _ => frac.parse::<i64>().map_err(|e| MoneyConversionError(format!("{s}: {e}")))?,
        };
        let cents = whole
            .checked_mul(CENTS_PER_UNIT)
            .and_then(|c| c.checked_add(frac))
            .ok_or_else(|| MoneyConversionError(format!("{s} is out of range")))?;
        Ok(Self(if negative { -cents } else { cents }))
    }
}

impl Money {
    pub const ZERO: Money = Money(0);

    pub fn value(&self) -> i64 {
        self.0
    }

    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    pub const fn from_units(units: i64) -> Self {
        Self(units * CENTS_PER_UNIT)
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    pub fn abs(&self) -> Self {
        Self(self.0.abs())
    }

    /// Returns `percent`% of this amount, rounded to the nearest cent (half away from zero).
    pub fn percentage(&self, percent: f64) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        let cents = (self.0 as f64 * percent / 100.0).round() as i64;
        Self(cents)
    }
}
