use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Mul},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

/// Basis points in one whole (100%).
pub const BPS_DENOMINATOR: i64 = 10_000;

//--------------------------------------        Money        ---------------------------------------------------------
/// An amount of money in minor currency units (kobo, cents). All monetary arithmetic in the engine happens on this
/// type so that no floating point value ever participates in a price.
#[derive(Debug, Clone, Copy, Default, Type, PartialEq, Eq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Money(i64);

op!(binary Money, Add, add);
op!(binary Money, Sub, sub);
op!(inplace Money, AddAssign, add_assign);
op!(inplace Money, SubAssign, sub_assign);
op!(unary Money, Neg, neg);

impl Mul<i64> for Money {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self(self.0 * rhs)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented as a money amount: {0}")]
pub struct MoneyConversionError(String);

impl From<i64> for Money {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl TryFrom<u64> for Money {
    type Error = MoneyConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        i64::try_from(value).map(Self).map_err(|_| MoneyConversionError(format!("{value} is too large")))
    }
}

impl TryFrom<i128> for Money {
    type Error = MoneyConversionError;

    fn try_from(value: i128) -> Result<Self, Self::Error> {
        i64::try_from(value).map(Self).map_err(|_| MoneyConversionError(format!("{value} is out of range")))
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl Money {
    pub const ZERO: Money = Money(0);

    pub fn value(&self) -> i64 {
        self.0
    }

    /// Creates an amount from whole currency units, e.g. `Money::from_major(25)` is 2500 minor units.
    pub fn from_major(units: i64) -> Self {
        Self(units * 100)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// `self * numerator / denominator`, rounded half away from zero to the nearest minor unit.
    ///
    /// Panics if `denominator` is zero.
    pub fn scale(&self, numerator: i64, denominator: i64) -> Self {
        let scaled = div_round_half_away(i128::from(self.0) * i128::from(numerator), i128::from(denominator));
        #[allow(clippy::cast_possible_truncation)]
        Self(scaled as i64)
    }

    /// Applies a rate expressed in basis points, rounding half away from zero.
    pub fn apply_bps(&self, bps: i64) -> Self {
        self.scale(bps, BPS_DENOMINATOR)
    }

    pub fn checked_add(self, rhs: Money) -> Option<Money> {
        self.0.checked_add(rhs.0).map(Self)
    }

    pub fn checked_sub(self, rhs: Money) -> Option<Money> {
        self.0.checked_sub(rhs.0).map(Self)
    }

    pub fn checked_mul(self, rhs: i64) -> Option<Money> {
        self.0.checked_mul(rhs).map(Self)
    }

    /// [`Money::apply_bps`] that returns `None` instead of truncating a result outside the `i64` range.
    pub fn checked_apply_bps(&self, bps: i64) -> Option<Money> {
        let scaled = div_round_half_away(i128::from(self.0) * i128::from(bps), i128::from(BPS_DENOMINATOR));
        i64::try_from(scaled).ok().map(Self)
    }

    /// Sums the amounts, or `None` if the total overflows.
    pub fn checked_sum<I: IntoIterator<Item = Money>>(amounts: I) -> Option<Money> {
        amounts.into_iter().try_fold(Money::ZERO, Money::checked_add)
    }
}

/// Integer division that rounds half away from zero. `denominator` must be non-zero.
pub fn div_round_half_away(numerator: i128, denominator: i128) -> i128 {
    let quotient = numerator / denominator;
    let remainder = numerator % denominator;
    if 2 * remainder.abs() >= denominator.abs() {
        let direction = if (numerator < 0) == (denominator < 0) { 1 } else { -1 };
        quotient + direction
    } else {
        quotient
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn checked_arithmetic_reports_overflow() {
        let big = Money::from(i64::MAX / 100);
        assert_eq!(Money::from(250).checked_mul(4), Some(Money::from(1_000)));
        assert_eq!(big.checked_mul(101), None);
        assert_eq!(Money::from(i64::MAX).checked_add(Money::from(1)), None);
        assert_eq!(Money::from(i64::MIN).checked_sub(Money::from(1)), None);
        assert_eq!(Money::checked_sum([Money::from(1), Money::from(2)]), Some(Money::from(3)));
        assert_eq!(Money::checked_sum([Money::from(i64::MAX), Money::from(1)]), None);
        assert_eq!(Money::from(10_000).checked_apply_bps(750), Some(Money::from(750)));
        assert_eq!(Money::from(i64::MAX).checked_apply_bps(20_000), None);
    }

    #[test]
    fn rounding_is_half_away_from_zero() {
        assert_eq!(div_round_half_away(5, 2), 3);
        assert_eq!(div_round_half_away(-5, 2), -3);
        assert_eq!(div_round_half_away(4, 3), 1);
        assert_eq!(div_round_half_away(5, 3), 2);
        assert_eq!(div_round_half_away(-4, 3), -1);
        assert_eq!(div_round_half_away(10, 5), 2);
    }

    #[test]
    fn vat_in_basis_points() {
        // 7.5% of 1000.00
        assert_eq!(Money::from(100_000).apply_bps(750), Money::from(7_500));
        // 7.5% of 0.33 = 0.02475 -> 0.02
        assert_eq!(Money::from(33).apply_bps(750), Money::from(2));
        // 7.5% of 0.34 = 0.0255 -> 0.03
        assert_eq!(Money::from(34).apply_bps(750), Money::from(3));
        assert_eq!(Money::from(999).apply_bps(0), Money::ZERO);
    }

    #[test]
    fn display_and_arithmetic() {
        let a = Money::from_major(12) + Money::from(34);
        assert_eq!(a.to_string(), "12.34");
        assert_eq!((-a).to_string(), "-12.34");
        assert_eq!(Money::from(5).to_string(), "0.05");
        let total: Money = vec![Money::from(1), Money::from(2), Money::from(3)].into_iter().sum();
        assert_eq!(total, Money::from(6));
        assert_eq!(Money::from(250) * 3, Money::from(750));
        let mut b = Money::from(10);
        b -= Money::from(4);
        b += Money::from(1);
        assert_eq!(b.value(), 7);
    }

    #[test]
    fn serializes_as_plain_integer() {
        let json = serde_json::to_string(&Money::from(1999)).unwrap();
        assert_eq!(json, "1999");
        let back: Money = serde_json::from_str("1999").unwrap();
        assert_eq!(back, Money::from(1999));
    }

    #[test]
    fn conversions() {
        assert!(Money::try_from(u64::MAX).is_err());
        assert_eq!(Money::try_from(42u64).unwrap(), Money::from(42));
        assert!(Money::try_from(i128::MAX).is_err());
    }
}
