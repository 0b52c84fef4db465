//! Core data types used across the screener

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for a daily bar
#[derive(Debug, Error, PartialEq)]
pub enum BarValidationError {
    #[error("prices must be positive: open={open}, high={high}, low={low}, close={close}")]
    NonPositivePrice {
        open: Money,
        high: Money,
        low: Money,
        close: Money,
    },

    #[error("high ({high}) must be >= low ({low})")]
    HighLessThanLow { high: Money, low: Money },

    #[error("turnover ({0}) must be >= 0")]
    NegativeTurnover(Money),

    #[error("open ({open}) must be between low ({low}) and high ({high})")]
    OpenOutOfRange { open: Money, low: Money, high: Money },

    #[error("close ({close}) must be between low ({low}) and high ({high})")]
    CloseOutOfRange { close: Money, low: Money, high: Money },
}

/// Descriptive columns carried through untouched.
///
/// None of these feed the pattern rules; they exist so a match record can
/// reproduce the full source row of the day that triggered it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BarDetails {
    /// Display name (`stock_name`)
    pub name: Option<String>,
    /// Traded lots (`trade`)
    pub volume: Option<f64>,
    /// Intraday amplitude in percent
    pub amplitude: Option<f64>,
    /// Close-to-close change in percent (`rise`)
    pub change_pct: Option<f64>,
    /// Close-to-close change in price (`amount_increase_decrease`)
    pub change_amount: Option<f64>,
    pub turnover_rate: Option<f64>,
    /// Exchange-qualified code (`stock_code`)
    pub listing_code: Option<String>,
}

/// One symbol's trading record for one date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: Symbol,
    pub date: NaiveDate,
    pub open: Money,
    pub close: Money,
    pub high: Money,
    pub low: Money,
    /// Traded value for the day, not share count
    pub turnover: Money,
    #[serde(default)]
    pub details: BarDetails,
}

impl Bar {
    /// Create a bar with validation
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: Symbol,
        date: NaiveDate,
        open: Money,
        close: Money,
        high: Money,
        low: Money,
        turnover: Money,
        details: BarDetails,
    ) -> Result<Self, BarValidationError> {
        let bar = Self {
            symbol,
            date,
            open,
            close,
            high,
            low,
            turnover,
            details,
        };
        bar.validate()?;
        Ok(bar)
    }

    /// Validate the bar data
    pub fn validate(&self) -> Result<(), BarValidationError> {
        if !self.open.is_positive()
            || !self.high.is_positive()
            || !self.low.is_positive()
            || !self.close.is_positive()
        {
            return Err(BarValidationError::NonPositivePrice {
                open: self.open,
                high: self.high,
                low: self.low,
                close: self.close,
            });
        }

        if self.high < self.low {
            return Err(BarValidationError::HighLessThanLow {
                high: self.high,
                low: self.low,
            });
        }

        if self.turnover.is_negative() {
            return Err(BarValidationError::NegativeTurnover(self.turnover));
        }

        if self.open < self.low || self.open > self.high {
            return Err(BarValidationError::OpenOutOfRange {
                open: self.open,
                low: self.low,
                high: self.high,
            });
        }

        if self.close < self.low || self.close > self.high {
            return Err(BarValidationError::CloseOutOfRange {
                close: self.close,
                low: self.low,
                high: self.high,
            });
        }

        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Close strictly above open. A doji is not bullish.
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    /// Top of the real body: the higher of open and close
    pub fn body_top(&self) -> Money {
        self.open.max(self.close)
    }

    /// Placeholder rows written for suspended sessions carry no trade
    pub fn is_suspended(&self) -> bool {
        self.turnover.is_zero() || !self.close.is_positive() || !self.open.is_positive()
    }
}

/// Instrument code using Arc<str> for cheap cloning
///
/// Every bar and every match record carries its symbol, so clones are frequent.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(#[serde(with = "arc_str_serde")] std::sync::Arc<str>);

mod arc_str_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::sync::Arc;

    pub fn serialize<S>(value: &Arc<str>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(value)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Arc<str>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Arc::from(s.as_str()))
    }
}

impl Symbol {
    pub fn new(s: impl AsRef<str>) -> Self {
        Symbol(std::sync::Arc::from(s.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Money Type - Precise Decimal Arithmetic for Prices and Turnover
// ============================================================================

use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, Sub};
use std::str::FromStr;

/// Exact decimal amount used for every price and turnover value.
///
/// The pattern rules compare turnover against multiples of an average and
/// closes against body tops with strict and non-strict inequalities, so the
/// boundary cases must not depend on binary floating point rounding.
///
/// # Example
/// ```
/// use kline_screener::Money;
/// use rust_decimal_macros::dec;
/// let avg = Money::from_i64(10);
/// assert!(Money::from_i64(31) > avg * dec!(3));
/// assert!(!(Money::from_i64(30) > avg * dec!(3)));
/// ```
#[derive(Debug, Clone, Copy, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(#[serde(with = "rust_decimal::serde::str")] Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub fn new(value: Decimal) -> Self {
        Money(value)
    }

    /// Create from f64. Lossy for values with many decimal places.
    pub fn from_f64(value: f64) -> Self {
        Money(Decimal::try_from(value).unwrap_or_else(|_| {
            if value.is_nan() || value.is_infinite() {
                Decimal::ZERO
            } else {
                Decimal::from_f64_retain(value).unwrap_or(Decimal::ZERO)
            }
        }))
    }

    pub fn to_f64(self) -> f64 {
        use rust_decimal::prelude::ToPrimitive;
        self.0.to_f64().unwrap_or(0.0)
    }

    pub fn from_i64(value: i64) -> Self {
        Money(Decimal::from(value))
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    pub fn is_negative(self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    pub fn max(self, other: Self) -> Self {
        Money(self.0.max(other.0))
    }

    pub fn min(self, other: Self) -> Self {
        Money(self.0.min(other.0))
    }

    pub fn round_dp(self, dp: u32) -> Self {
        Money(self.0.round_dp(dp))
    }

    pub fn inner(self) -> Decimal {
        self.0
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Accepts plain decimals ("12.34") and the scientific form some exports
/// use for large turnover figures ("1.2345E8").
impl FromStr for Money {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Decimal::from_str(s)
            .or_else(|_| Decimal::from_scientific(s))
            .map(|d| Money(d.normalize()))
    }
}

impl PartialEq for Money {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl PartialOrd for Money {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Money {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl std::hash::Hash for Money {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl Add for Money {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Money(self.0 - rhs.0)
    }
}

/// Scale by a plain factor (breakout multiple, confirmation ratio)
impl Mul<Decimal> for Money {
    type Output = Self;
    fn mul(self, rhs: Decimal) -> Self::Output {
        Money(self.0 * rhs)
    }
}

impl Div<Decimal> for Money {
    type Output = Self;
    fn div(self, rhs: Decimal) -> Self::Output {
        if rhs.is_zero() {
            Money::ZERO
        } else {
            Money(self.0 / rhs)
        }
    }
}

impl From<i64> for Money {
    fn from(value: i64) -> Self {
        Money::from_i64(value)
    }
}

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self {
        Money(value)
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Money::ZERO, |acc, x| acc + x)
    }
}

impl<'a> std::iter::Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.fold(Money::ZERO, |acc, x| acc + *x)
    }
}
