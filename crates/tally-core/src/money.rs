//! Money handling
//!
//! Amounts are `Decimal` everywhere in memory, rounded half away from zero to
//! two places when persisted, and stored as integer cents.

use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::Value;
use thiserror::Error;

/// Why an amount could not be accepted
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("amount is missing")]
    Missing,

    #[error("amount is not a number: {0}")]
    NotNumeric(String),

    #[error("amount must not be negative")]
    Negative,

    #[error("amount is out of range")]
    OutOfRange,
}

/// Round to cents, half away from zero
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Convert to integer cents for storage
pub fn to_minor_units(amount: Decimal) -> Result<i64, AmountError> {
    round_money(amount)
        .checked_mul(Decimal::ONE_HUNDRED)
        .and_then(|cents| cents.to_i64())
        .ok_or(AmountError::OutOfRange)
}

/// Convert stored integer cents back to a decimal amount
pub fn from_minor_units(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

/// Parse a decimal from text, accepting plain and scientific notation
pub fn parse_decimal(s: &str) -> Result<Decimal, AmountError> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(AmountError::Missing);
    }
    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .map_err(|_| AmountError::NotNumeric(trimmed.to_string()))
}

/// Parse a non-negative amount from a JSON value
///
/// Numbers and numeric strings are accepted. Negative amounts are
/// rejected; the entry type carries the direction.
pub fn parse_amount(value: &Value) -> Result<Decimal, AmountError> {
    let amount = match value {
        Value::Null => return Err(AmountError::Missing),
        Value::Number(n) => parse_decimal(&n.to_string())?,
        Value::String(s) => parse_decimal(s)?,
        other => return Err(AmountError::NotNumeric(other.to_string())),
    };

    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(AmountError::Negative);
    }
    Ok(amount)
}

/// Format with exactly two decimal places, e.g. `1234.50`
pub fn format_money(amount: Decimal) -> String {
    format!("{:.2}", round_money(amount))
}

/// Test helper: decimal from a literal
#[cfg(test)]
pub(crate) fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}
