//! Fixed-point money amounts.

use serde::{Deserialize, Serialize};

/// An amount of money held as a signed count of cents.
///
/// Totals and prices never touch floating point; arithmetic that could
/// overflow goes through the checked methods.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Creates an amount from cents.
    pub fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Creates an amount from a whole-unit value (e.g. dollars).
    pub fn from_dollars(dollars: i64) -> Self {
        Self(dollars * 100)
    }

    /// The zero amount.
    pub fn zero() -> Self {
        Self(0)
    }

    /// Returns the amount in cents.
    pub fn cents(&self) -> i64 {
        self.0
    }

    /// Returns true if the amount is strictly greater than zero.
    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Multiplies by a quantity, returning None on overflow.
    pub fn checked_multiply(&self, quantity: u32) -> Option<Money> {
        self.0.checked_mul(i64::from(quantity)).map(Money)
    }

    /// Adds another amount, returning None on overflow.
    pub fn checked_add(&self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(
            f,
            "{sign}${}.{:02}",
            (self.0 / 100).abs(),
            (self.0 % 100).abs()
        )
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_agree_on_cents() {
        assert_eq!(Money::from_dollars(12).cents(), 1200);
        assert_eq!(Money::from_cents(1234).cents(), 1234);
        assert_eq!(Money::zero(), Money::default());
    }

    #[test]
    fn test_display_formats_dollars_and_cents() {
        assert_eq!(Money::from_cents(1234).to_string(), "$12.34");
        assert_eq!(Money::from_cents(100).to_string(), "$1.00");
        assert_eq!(Money::from_cents(5).to_string(), "$0.05");
        assert_eq!(Money::from_cents(-1234).to_string(), "-$12.34");
        assert_eq!(Money::from_cents(-5).to_string(), "-$0.05");
    }

    #[test]
    fn test_accumulation() {
        let mut total = Money::zero();
        for amount in [Money::from_cents(250), Money::from_cents(1000)] {
            total += amount;
        }
        assert_eq!(total, Money::from_cents(1250));
        assert_eq!(total + Money::from_cents(50), Money::from_cents(1300));
    }

    #[test]
    fn test_checked_ops_catch_overflow() {
        let max = Money::from_cents(i64::MAX);
        assert!(max.checked_multiply(2).is_none());
        assert!(max.checked_add(Money::from_cents(1)).is_none());
        assert_eq!(
            Money::from_cents(100).checked_multiply(3),
            Some(Money::from_cents(300))
        );
    }

    #[test]
    fn test_is_positive() {
        assert!(Money::from_cents(1).is_positive());
        assert!(!Money::zero().is_positive());
        assert!(!Money::from_cents(-1).is_positive());
    }

    #[test]
    fn test_serializes_as_bare_cents() {
        let json = serde_json::to_string(&Money::from_cents(2500)).unwrap();
        assert_eq!(json, "2500");
        let back: Money = serde_json::from_str("2500").unwrap();
        assert_eq!(back, Money::from_cents(2500));
    }
}
