//! Amount type for monetary values.
//!
//! `Amount` wraps `Decimal` and parses values that may carry a currency code or symbol, thousands
//! separators, or accounting-style parentheses. Values are kept at two decimal places.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use schemars::{json_schema, JsonSchema, Schema, SchemaGenerator};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Cow;
use std::error::Error;
use std::fmt;
use std::fmt::{Debug, Display, Formatter};
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::str::FromStr;

/// Represents an amount of money.
///
/// # Examples
///
/// ```
/// # use church_ledger::model::Amount;
/// # use std::str::FromStr;
/// let a = Amount::from_str("PHP 1,250.50").unwrap();
/// let b = Amount::from_str("₱1250.5").unwrap();
/// assert_eq!(a, b);
/// assert_eq!(a.to_string(), "1,250.50");
/// assert_eq!(a.format_with("PHP"), "PHP 1,250.50");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(Decimal);

impl Amount {
    pub const ZERO: Amount = Amount(Decimal::ZERO);

    /// Creates a new `Amount`, rounding to two decimal places.
    pub fn new(value: Decimal) -> Self {
        Self(value.round_dp(2))
    }

    /// Returns the underlying Decimal value.
    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Returns true if the amount is greater than zero.
    pub fn is_positive(&self) -> bool {
        !self.is_zero() && self.0.is_sign_positive()
    }

    /// Returns true if the amount is less than zero.
    pub fn is_negative(&self) -> bool {
        !self.is_zero() && self.0.is_sign_negative()
    }

    pub fn abs(&self) -> Self {
        Self(self.0.abs())
    }

    /// The amount in minor units (e.g. centavos), as payment providers expect.
    pub fn minor_units(&self) -> Option<i64> {
        (self.0 * Decimal::ONE_HUNDRED).round().to_i64()
    }

    /// Formats with a currency code prefix, e.g. `PHP 1,234.50` or `-PHP 1,234.50`.
    pub fn format_with(&self, currency: &str) -> String {
        let sign = if self.is_negative() { "-" } else { "" };
        let digits = self.abs().to_string();
        if currency.is_empty() {
            format!("{sign}{digits}")
        } else {
            format!("{sign}{currency} {digits}")
        }
    }
}

/// An error that can occur when parsing strings into `Amount` values.
pub struct AmountError(rust_decimal::Error);

impl Debug for AmountError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Debug::fmt(&self.0, f)
    }
}

impl Display for AmountError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl std::error::Error for AmountError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.0)
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Ok(Amount::default());
        }

        let mut negative = false;
        let mut rest = trimmed;

        // Accounting style: (1,000.00)
        if let Some(inner) = rest.strip_prefix('(').and_then(|r| r.strip_suffix(')')) {
            negative = true;
            rest = inner.trim();
        }
        if let Some(after_minus) = rest.strip_prefix('-') {
            negative = !negative;
            rest = after_minus.trim_start();
        }

        // Currency code or symbol: "PHP 50", "₱50", "$50"
        rest = rest
            .trim_start_matches(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-'))
            .trim();
        if let Some(after_minus) = rest.strip_prefix('-') {
            negative = !negative;
            rest = after_minus;
        }

        // Thousands separators
        let without_commas = rest.replace(',', "");
        let value = Decimal::from_str(&without_commas).map_err(AmountError)?;
        Ok(Amount::new(if negative { -value } else { value }))
    }
}

impl Display for Amount {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let sign = if self.is_negative() { "-" } else { "" };
        let num = self.0.abs();
        write!(
            f,
            "{sign}{}",
            format_num::format_num!(",.2", num.to_f64().unwrap_or_default())
        )
    }
}

impl Serialize for Amount {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        // A plain decimal string keeps full precision, e.g. "1250.50"
        serializer.serialize_str(&format!("{:.2}", self.0))
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(serde_json::Number),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Text(s) => Amount::from_str(&s).map_err(serde::de::Error::custom),
            Raw::Number(n) => Amount::from_str(&n.to_string()).map_err(serde::de::Error::custom),
        }
    }
}

impl JsonSchema for Amount {
    fn schema_name() -> Cow<'static, str> {
        "Amount".into()
    }

    fn json_schema(_: &mut SchemaGenerator) -> Schema {
        json_schema!({
            "type": ["string", "number"],
            "description": "An amount of money, e.g. \"1250.50\", \"PHP 1,250.50\" or 1250.5"
        })
    }
}

impl From<Decimal> for Amount {
    fn from(value: Decimal) -> Self {
        Amount::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.value()
    }
}

impl Add for Amount {
    type Output = Amount;

    fn add(self, rhs: Amount) -> Amount {
        Amount(self.0 + rhs.0)
    }
}

impl Sub for Amount {
    type Output = Amount;

    fn sub(self, rhs: Amount) -> Amount {
        Amount(self.0 - rhs.0)
    }
}

impl AddAssign for Amount {
    fn add_assign(&mut self, rhs: Amount) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Amount {
    fn sub_assign(&mut self, rhs: Amount) {
        self.0 -= rhs.0;
    }
}

impl Neg for Amount {
    type Output = Amount;

    fn neg(self) -> Amount {
        Amount(-self.0)
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Self {
        iter.fold(Amount::ZERO, |acc, a| acc + a)
    }
}

impl<'a> Sum<&'a Amount> for Amount {
    fn sum<I: Iterator<Item = &'a Amount>>(iter: I) -> Self {
        iter.copied().sum()
    }
}
