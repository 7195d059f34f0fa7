use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;
use thiserror::Error;
use web3::types::U256;

#[derive(Error, Debug, Clone)]
#[error("Error during conversion: {msg}")]
pub struct ConversionError {
    pub msg: String,
}

impl ConversionError {
    pub fn from(msg: String) -> Self {
        Self { msg }
    }
}

pub fn gwei_to_u256(gas: f64) -> Result<U256, ConversionError> {
    pub const GWEI: f64 = 1.0E9;
    if gas < 0.0 {
        return Err(ConversionError {
            msg: "Gas price cannot be negative".to_string(),
        });
    }
    if gas > 1.0E9 {
        return Err(ConversionError {
            msg: "Gas price cannot be greater than 1E9".to_string(),
        });
    }
    if gas.is_nan() {
        return Err(ConversionError {
            msg: "Gas price cannot be NaN".to_string(),
        });
    }
    Ok(U256::from((gas * GWEI) as u64))
}

/// Rounds money amounts to cents, midpoint away from zero.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Formats a money amount with exactly two decimal places.
pub fn format_money(amount: Decimal) -> String {
    format!("{:.2}", round_money(amount))
}

pub fn parse_decimal(value: &str) -> Result<Decimal, ConversionError> {
    Decimal::from_str(value.trim())
        .map_err(|err| ConversionError::from(format!("Invalid decimal {value}: {err}")))
}

/// Converts a token amount into base units, truncating anything past `decimals`.
pub fn rust_dec_to_u256(amount: Decimal, decimals: u32) -> Result<U256, ConversionError> {
    if amount.is_sign_negative() {
        return Err(ConversionError::from(format!(
            "Amount cannot be negative: {amount}"
        )));
    }
    let multiplier = Decimal::from_str(&format!("1{}", "0".repeat(decimals as usize)))
        .map_err(|err| ConversionError::from(format!("Unsupported decimals {decimals}: {err}")))?;
    let base_units = amount
        .checked_mul(multiplier)
        .ok_or_else(|| ConversionError::from(format!("Amount too big: {amount}")))?
        .trunc();
    let base_units = base_units
        .to_u128()
        .ok_or_else(|| ConversionError::from(format!("Amount out of range: {amount}")))?;
    Ok(U256::from(base_units))
}

pub fn u256_to_rust_dec(amount: U256, decimals: u32) -> Result<Decimal, ConversionError> {
    let digits = amount.to_string();
    let decimals = decimals as usize;
    let padded = if digits.len() <= decimals {
        format!("{}{}", "0".repeat(decimals - digits.len() + 1), digits)
    } else {
        digits
    };
    let (int_part, frac_part) = padded.split_at(padded.len() - decimals);
    let as_str = if frac_part.is_empty() {
        int_part.to_string()
    } else {
        format!("{int_part}.{frac_part}")
    };
    Decimal::from_str(&as_str)
        .map(|d| d.normalize())
        .map_err(|err| ConversionError::from(format!("Cannot convert {amount}: {err}")))
}
