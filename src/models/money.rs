//! Money type for representing currency amounts
//!
//! Internally stores amounts as a scaled i64 with four decimal digits of
//! precision (value x 10,000) to avoid floating-point precision issues, and
//! tags every value with its currency.
//!
//! Arithmetic and ordering between two money values are only defined for
//! matching currencies. A mismatch is a precondition violation and panics;
//! callers are expected to validate currencies before mixing values. This is
//! deliberate: silently converting or comparing across currencies would
//! corrupt every downstream total.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};

use super::currency::Currency;

/// Number of scaled units per whole currency unit (4 decimal digits)
pub const SCALE: i64 = 10_000;

/// A discrete amount of money in a specific currency
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Money {
    scaled: i64,
    currency: Currency,
}

impl Money {
    /// Create a money value from a scaled amount (value x 10,000)
    pub fn from_scaled(scaled: i64, currency: Currency) -> Self {
        Self { scaled, currency }
    }

    /// Create a zero money value in the given currency
    pub fn zero(currency: Currency) -> Self {
        Self::from_scaled(0, currency)
    }

    /// Parse a decimal string (e.g., "12.34", "-0.5") into a money value.
    ///
    /// Parsing is integer-based; up to four decimal digits are preserved and
    /// a fifth digit rounds half-away-from-zero.
    pub fn parse(s: &str, currency: Currency) -> Result<Self, MoneyParseError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(MoneyParseError::InvalidFormat(s.to_string()));
        }

        let (negative, s) = match s.strip_prefix('-') {
            Some(stripped) => (true, stripped),
            None => (false, s.strip_prefix('+').unwrap_or(s)),
        };

        let (int_part, frac_part) = match s.split_once('.') {
            Some((i, f)) => (i, f),
            None => (s, ""),
        };

        if int_part.is_empty() && frac_part.is_empty() {
            return Err(MoneyParseError::InvalidFormat(s.to_string()));
        }
        if !int_part.chars().all(|c| c.is_ascii_digit())
            || !frac_part.chars().all(|c| c.is_ascii_digit())
        {
            return Err(MoneyParseError::InvalidFormat(s.to_string()));
        }

        let whole: i64 = if int_part.is_empty() {
            0
        } else {
            int_part
                .parse()
                .map_err(|_| MoneyParseError::InvalidFormat(s.to_string()))?
        };

        // Pad/truncate the fraction to 4 digits, rounding on the 5th
        let mut frac: i64 = 0;
        for c in frac_part.chars().take(4) {
            frac = frac * 10 + (c as u8 - b'0') as i64;
        }
        if frac_part.len() < 4 {
            frac *= 10i64.pow((4 - frac_part.len()) as u32);
        } else if let Some(fifth) = frac_part.as_bytes().get(4) {
            if *fifth >= b'5' {
                frac += 1;
            }
        }

        let scaled = whole * SCALE + frac;
        Ok(Self::from_scaled(
            if negative { -scaled } else { scaled },
            currency,
        ))
    }

    /// Create a money value from a `dividend/divisor` fraction, rounding
    /// half-away-from-zero to four decimal digits.
    pub fn from_fraction(
        dividend: i64,
        divisor: i64,
        currency: Currency,
    ) -> Result<Self, MoneyParseError> {
        if divisor == 0 {
            return Err(MoneyParseError::DivisionByZero);
        }
        let numerator = dividend as i128 * SCALE as i128;
        let divisor = divisor as i128;
        let quotient = numerator / divisor;
        let remainder = numerator % divisor;
        // Round half away from zero; integer division truncated toward zero
        let sign = numerator.signum() * divisor.signum();
        let scaled = if remainder.abs() * 2 >= divisor.abs() {
            quotient + sign
        } else {
            quotient
        };
        Ok(Self::from_scaled(scaled as i64, currency))
    }

    /// Get the scaled amount (value x 10,000)
    pub fn scaled(&self) -> i64 {
        self.scaled
    }

    /// Get the currency of this money value
    pub fn currency(&self) -> &Currency {
        &self.currency
    }

    /// Check if the amount is zero
    pub fn is_zero(&self) -> bool {
        self.scaled == 0
    }

    /// Check if the amount is negative
    pub fn is_negative(&self) -> bool {
        self.scaled < 0
    }

    /// Check if the amount is positive
    pub fn is_positive(&self) -> bool {
        self.scaled > 0
    }

    /// Get the absolute value
    pub fn abs(&self) -> Self {
        Self::from_scaled(self.scaled.abs(), self.currency.clone())
    }

    /// Ratio between this money value and another of the same currency.
    ///
    /// # Panics
    /// Panics if the currencies differ.
    pub fn ratio(&self, divisor: &Money) -> f64 {
        self.assert_currency(divisor);
        self.scaled as f64 / divisor.scaled as f64
    }

    fn assert_currency(&self, that: &Money) {
        assert_eq!(
            self.currency, that.currency,
            "currency mismatch: {} vs {}",
            self.currency, that.currency
        );
    }

    /// Compare two amounts of the same currency.
    ///
    /// # Panics
    /// Panics if the currencies differ.
    pub fn cmp_amount(&self, other: &Money) -> std::cmp::Ordering {
        self.assert_currency(other);
        self.scaled.cmp(&other.scaled)
    }
}

impl PartialEq for Money {
    /// Equal when both amount and currency match; never panics
    fn eq(&self, other: &Self) -> bool {
        self.scaled == other.scaled && self.currency == other.currency
    }
}

impl Eq for Money {}

impl PartialOrd for Money {
    /// Ordering between amounts of the same currency.
    ///
    /// # Panics
    /// Panics if the currencies differ.
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp_amount(other))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.scaled < 0 { "-" } else { "" };
        let abs = self.scaled.unsigned_abs();
        let whole = abs / SCALE as u64;
        let frac = abs % SCALE as u64;
        if frac % 100 == 0 {
            write!(f, "{}{}.{:02} {}", sign, whole, frac / 100, self.currency)
        } else {
            write!(f, "{}{}.{:04} {}", sign, whole, frac, self.currency)
        }
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        self.assert_currency(&other);
        Self::from_scaled(self.scaled + other.scaled, self.currency)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, other: Self) {
        self.assert_currency(&other);
        self.scaled += other.scaled;
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        self.assert_currency(&other);
        Self::from_scaled(self.scaled - other.scaled, self.currency)
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, other: Self) {
        self.assert_currency(&other);
        self.scaled -= other.scaled;
    }
}

impl Neg for Money {
    type Output = Self;

    fn neg(self) -> Self {
        Self::from_scaled(-self.scaled, self.currency)
    }
}

impl Mul<f64> for Money {
    type Output = Self;

    fn mul(self, factor: f64) -> Self {
        Self::from_scaled((self.scaled as f64 * factor).round() as i64, self.currency)
    }
}

impl Div<f64> for Money {
    type Output = Self;

    fn div(self, divisor: f64) -> Self {
        Self::from_scaled((self.scaled as f64 / divisor).round() as i64, self.currency)
    }
}

/// Error type for money parsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoneyParseError {
    InvalidFormat(String),
    DivisionByZero,
}

impl fmt::Display for MoneyParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MoneyParseError::InvalidFormat(s) => write!(f, "Invalid money format: {}", s),
            MoneyParseError::DivisionByZero => write!(f, "Attempted division by zero"),
        }
    }
}

impl std::error::Error for MoneyParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn usd(s: &str) -> Money {
        Money::parse(s, Currency::new("USD")).unwrap()
    }

    #[test]
    fn test_parse() {
        assert_eq!(usd("12.34").scaled(), 123_400);
        assert_eq!(usd("-12.34").scaled(), -123_400);
        assert_eq!(usd("12").scaled(), 120_000);
        assert_eq!(usd("0.5").scaled(), 5_000);
        assert_eq!(usd("12.3456").scaled(), 123_456);
        assert_eq!(usd(".25").scaled(), 2_500);
    }

    #[test]
    fn test_parse_rounds_fifth_digit() {
        assert_eq!(usd("1.23455").scaled(), 12_346);
        assert_eq!(usd("1.23454").scaled(), 12_345);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let c = Currency::new("USD");
        assert!(Money::parse("", c.clone()).is_err());
        assert!(Money::parse("$12", c.clone()).is_err());
        assert!(Money::parse("12.3.4", c.clone()).is_err());
        assert!(Money::parse("abc", c).is_err());
    }

    #[test]
    fn test_from_fraction() {
        let c = Currency::new("USD");
        assert_eq!(
            Money::from_fraction(6000, 100, c.clone()).unwrap().scaled(),
            600_000
        );
        assert_eq!(
            Money::from_fraction(-10000, 100, c.clone()).unwrap().scaled(),
            -1_000_000
        );
        assert_eq!(
            Money::from_fraction(1, 3, c.clone()).unwrap().scaled(),
            3_333
        );
        assert!(Money::from_fraction(1, 0, c).is_err());
    }

    #[test]
    fn test_arithmetic() {
        let a = usd("10.00");
        let b = usd("5.00");

        assert_eq!((a.clone() + b.clone()).scaled(), 150_000);
        assert_eq!((a.clone() - b.clone()).scaled(), 50_000);
        assert_eq!((-a.clone()).scaled(), -100_000);

        let mut sum = Money::zero(Currency::new("USD"));
        sum += a;
        sum += b;
        assert_eq!(sum, usd("15.00"));
    }

    #[test]
    fn test_scalar_ops() {
        assert_eq!(usd("100.00") / 4.0, usd("25.00"));
        assert_eq!(usd("12.50") * 2.0, usd("25.00"));
        assert!((usd("75.00").ratio(&usd("100.00")) - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_comparison() {
        assert!(usd("12.10") > usd("12.00"));
        assert!(usd("12.00") <= usd("12.00"));
        assert_eq!(usd("12.00"), usd("12.00"));
    }

    #[test]
    fn test_equality_includes_currency() {
        let a = Money::parse("12.00", Currency::new("USD")).unwrap();
        let b = Money::parse("12.00", Currency::new("EUR")).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    #[should_panic(expected = "currency mismatch")]
    fn test_add_mismatched_currencies_panics() {
        let a = Money::parse("1.00", Currency::new("USD")).unwrap();
        let b = Money::parse("1.00", Currency::new("EUR")).unwrap();
        let _ = a + b;
    }

    #[test]
    #[should_panic(expected = "currency mismatch")]
    fn test_compare_mismatched_currencies_panics() {
        let a = Money::parse("1.00", Currency::new("USD")).unwrap();
        let b = Money::parse("1.00", Currency::new("EUR")).unwrap();
        let _ = a < b;
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", usd("12.34")), "12.34 USD");
        assert_eq!(format!("{}", usd("-0.05")), "-0.05 USD");
        assert_eq!(format!("{}", usd("1.2345")), "1.2345 USD");
    }
}
