use anyhow::{anyhow, Result};
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;

use crate::policy::SATOSHIS_PER_COIN;

/// A quantity of satoshis, the smallest unit of a Krypton coin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Amount(u128);

impl Amount {
    pub const MAX: Amount = Amount(u128::MAX);
    pub const DECIMAL_PLACES: u32 = 11;
    pub const CONVERSION_FACTOR: u128 = SATOSHIS_PER_COIN;

    pub fn from_satoshis(satoshis: u128) -> Self {
        Amount(satoshis)
    }

    pub fn from_coins(coins: u128) -> Result<Self> {
        coins
            .checked_mul(Self::CONVERSION_FACTOR)
            .map(Amount)
            .ok_or_else(|| anyhow!("Overflow when converting {} coins to satoshis", coins))
    }

    pub fn as_satoshis(&self) -> u128 {
        self.0
    }

    pub fn zero() -> Self {
        Amount(0)
    }

    pub fn to_coins_string(&self) -> String {
        let integer_part = self.0 / Self::CONVERSION_FACTOR;
        let fractional_part = self.0 % Self::CONVERSION_FACTOR;

        if fractional_part == 0 {
            return integer_part.to_string();
        }
        let fractional_str = format!(
            "{:0width$}",
            fractional_part,
            width = Self::DECIMAL_PLACES as usize
        );
        format!("{}.{}", integer_part, fractional_str.trim_end_matches('0'))
    }

    pub fn from_coins_string(s: &str) -> Result<Self> {
        let (integer_str, fractional_str) = match s.split_once('.') {
            Some((integer, fraction)) => (integer, fraction),
            None => (s, ""),
        };

        if integer_str.is_empty() && fractional_str.is_empty() {
            return Err(anyhow!("Empty amount '{}'", s));
        }
        if fractional_str.contains('.') {
            return Err(anyhow!(
                "Invalid decimal format: multiple decimal points in '{}'",
                s
            ));
        }
        if fractional_str.len() > Self::DECIMAL_PLACES as usize {
            return Err(anyhow!(
                "Too many decimal places in '{}'. Max {} allowed.",
                s,
                Self::DECIMAL_PLACES
            ));
        }

        let parsed_integer = if integer_str.is_empty() {
            0
        } else {
            integer_str
                .parse::<u128>()
                .map_err(|e| anyhow!("Invalid integer part in '{}': {}", s, e))?
        };

        let mut total = parsed_integer
            .checked_mul(Self::CONVERSION_FACTOR)
            .ok_or_else(|| anyhow!("Integer part overflow when converting '{}'", s))?;

        if !fractional_str.is_empty() {
            let padded = format!(
                "{:0<width$}",
                fractional_str,
                width = Self::DECIMAL_PLACES as usize
            );
            let parsed_fractional = padded
                .parse::<u128>()
                .map_err(|e| anyhow!("Invalid fractional part in '{}': {}", s, e))?;
            total = total
                .checked_add(parsed_fractional)
                .ok_or_else(|| anyhow!("Overflow when converting '{}'", s))?;
        }

        Ok(Amount(total))
    }
}

impl Add for Amount {
    type Output = Result<Self>;
    fn add(self, other: Self) -> Self::Output {
        self.0
            .checked_add(other.0)
            .map(Amount)
            .ok_or_else(|| anyhow!("Amount overflow: {} + {}", self, other))
    }
}

impl Sub for Amount {
    type Output = Result<Self>;
    fn sub(self, other: Self) -> Self::Output {
        self.0
            .checked_sub(other.0)
            .map(Amount)
            .ok_or_else(|| anyhow!("Amount underflow: {} - {}", self, other))
    }
}

impl FromStr for Amount {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Amount::from_coins_string(s)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} KRP", self.to_coins_string())
    }
}

/// Converts a decimal coin amount to satoshis, rounding half up.
pub fn coins_to_satoshis(coins: &BigDecimal) -> Result<u128> {
    let zero = BigDecimal::from(0);
    if *coins < zero {
        return Err(anyhow!("Negative coin amount {}", coins));
    }
    let scaled = coins * BigDecimal::from(SATOSHIS_PER_COIN as u64);
    let truncated = scaled.with_scale(0);
    let remainder = &scaled - &truncated;
    let half = BigDecimal::from_str("0.5").map_err(|e| anyhow!("{}", e))?;
    let rounded = if remainder >= half {
        truncated + BigDecimal::from(1)
    } else {
        truncated
    };
    let (digits, _) = rounded.with_scale(0).into_bigint_and_exponent();
    digits
        .to_string()
        .parse::<u128>()
        .map_err(|e| anyhow!("Coin amount {} does not fit 128 bits: {}", coins, e))
}

pub fn satoshis_to_coins(satoshis: u128) -> BigDecimal {
    let digits = bigdecimal::num_bigint::BigInt::from(satoshis);
    BigDecimal::new(digits, i64::from(Amount::DECIMAL_PLACES))
}
