//! Value Objects for the storefront cart

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Key of one purchasable unit (a variant, never a product family).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ItemId(String);

impl ItemId {
    pub fn new(value: impl Into<String>) -> Result<Self, ItemIdError> {
        let value = value.into().trim().to_string();
        if value.is_empty() { return Err(ItemIdError::Empty); }
        if value.len() > 128 { return Err(ItemIdError::TooLong); }
        Ok(Self(value))
    }
    /// `"light" + 42` style keys built from catalog ids.
    pub fn prefixed(prefix: &str, id: u64) -> Self { Self(format!("{prefix}{id}")) }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl TryFrom<String> for ItemId {
    type Error = ItemIdError;
    fn try_from(value: String) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<ItemId> for String { fn from(id: ItemId) -> Self { id.0 } }

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum ItemIdError { Empty, TooLong }
impl std::error::Error for ItemIdError {}
impl fmt::Display for ItemIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self { Self::Empty => write!(f, "item id empty"), Self::TooLong => write!(f, "item id too long") }
    }
}

/// Exact, non-negative money amount.
///
/// Serialized as a JSON string so a reader can never confuse it with a
/// binary float. Deserialization only accepts strings: `"19.99"` parses,
/// `19.99` is rejected.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Result<Self, MoneyError> {
        if amount.is_sign_negative() && !amount.is_zero() { return Err(MoneyError::Negative); }
        Ok(Self(amount))
    }

    /// Parses a decimal string without any rounding.
    pub fn parse(value: &str) -> Result<Self, MoneyError> {
        let amount = Decimal::from_str_exact(value.trim()).map_err(|_| MoneyError::Invalid(value.to_string()))?;
        Self::new(amount)
    }

    pub fn amount(&self) -> Decimal { self.0 }
    pub fn is_zero(&self) -> bool { self.0.is_zero() }
    pub fn checked_add(&self, other: Money) -> Option<Money> { self.0.checked_add(other.0).map(Money) }
    pub fn checked_multiply(&self, qty: u32) -> Option<Money> { self.0.checked_mul(Decimal::from(qty)).map(Money) }

    /// Saturates at the largest representable amount.
    pub fn saturating_add(&self, other: Money) -> Money { Money(self.0.saturating_add(other.0)) }

    /// Reduces the amount by a percentage, keeping full precision.
    pub fn discounted(&self, discount: DiscountPercentage) -> Money {
        let remaining = Decimal::ONE_HUNDRED - discount.value();
        match self.0.checked_mul(remaining) {
            Some(scaled) => Money(scaled / Decimal::ONE_HUNDRED),
            None => Money(self.0 / Decimal::ONE_HUNDRED * remaining),
        }
    }

    /// Display form with two fractional digits. Rounding happens only here.
    pub fn format(&self) -> String { format_money(self.0) }
}

impl FromStr for Money {
    type Err = MoneyError;
    fn from_str(s: &str) -> Result<Self, Self::Err> { Self::parse(s) }
}

impl TryFrom<String> for Money {
    type Error = MoneyError;
    fn try_from(value: String) -> Result<Self, Self::Error> { Self::parse(&value) }
}

impl From<Money> for String { fn from(money: Money) -> Self { money.0.to_string() } }

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum MoneyError { Negative, Invalid(String) }
impl std::error::Error for MoneyError {}
impl fmt::Display for MoneyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Negative => write!(f, "money amount is negative"),
            Self::Invalid(raw) => write!(f, "invalid money amount: {raw}"),
        }
    }
}

/// Renders `amount` with exactly two fractional digits and `,` thousands
/// separators, rounding half away from zero.
pub fn format_money(amount: Decimal) -> String {
    let mut rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    let text = rounded.abs().to_string();
    let (whole, fraction) = text.split_once('.').unwrap_or((text.as_str(), "00"));
    let sign = if rounded.is_sign_negative() && !rounded.is_zero() { "-" } else { "" };
    format!("{sign}{}.{fraction}", group_thousands(whole))
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 { out.push(','); }
        out.push(ch);
    }
    out
}

/// Line item quantity. Always at least one; the upper bound is a cart policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Quantity(u32);

impl Quantity {
    pub const ONE: Quantity = Quantity(1);

    pub fn new(value: u32) -> Result<Self, QuantityError> {
        if value == 0 { return Err(QuantityError::Zero); }
        Ok(Self(value))
    }
    pub fn value(&self) -> u32 { self.0 }
    pub fn add(&self, other: Quantity) -> Self { Self(self.0.saturating_add(other.0)) }
    pub fn increment(&self, max: u32) -> Option<Self> {
        if self.0 < max { Some(Self(self.0 + 1)) } else { None }
    }
    pub fn decrement(&self) -> Option<Self> {
        if self.0 > 1 { Some(Self(self.0 - 1)) } else { None }
    }
}

impl TryFrom<u32> for Quantity {
    type Error = QuantityError;
    fn try_from(value: u32) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<Quantity> for u32 { fn from(q: Quantity) -> Self { q.0 } }

#[derive(Debug, Clone, PartialEq, Eq)] pub enum QuantityError { Zero }
impl std::error::Error for QuantityError {}
impl fmt::Display for QuantityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "quantity must be at least 1") }
}

/// Coupon discount in percent, `0..=100`.
///
/// The shop API sends it as a JSON number; it is persisted as a string.
/// Both are read through the number's decimal text, so `12.5` stays `12.5`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(into = "String")]
pub struct DiscountPercentage(Decimal);

impl DiscountPercentage {
    pub fn new(value: Decimal) -> Result<Self, DiscountError> {
        if value < Decimal::ZERO || value > Decimal::ONE_HUNDRED { return Err(DiscountError::OutOfRange(value)); }
        Ok(Self(value))
    }
    pub fn value(&self) -> Decimal { self.0 }
}

impl From<DiscountPercentage> for String { fn from(d: DiscountPercentage) -> Self { d.0.to_string() } }

impl<'de> Deserialize<'de> for DiscountPercentage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw { Text(String), Number(serde_json::Number) }

        let text = match Raw::deserialize(deserializer)? {
            Raw::Text(text) => text,
            Raw::Number(number) => number.to_string(),
        };
        let value = Decimal::from_str_exact(text.trim()).map_err(serde::de::Error::custom)?;
        Self::new(value).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum DiscountError { OutOfRange(Decimal) }
impl std::error::Error for DiscountError {}
impl fmt::Display for DiscountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self { Self::OutOfRange(v) => write!(f, "discount {v}% outside 0..=100") }
    }
}
