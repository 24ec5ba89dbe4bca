//! Fixed-point amounts.
//!
//! Streaming rates are stored on-chain with [`AMT_PER_SEC_EXTRA_DECIMALS`]
//! extra decimals so that sub-unit rates survive integer arithmetic. Balances
//! are lifted into the same base before they are compared with rates, and
//! brought back down (truncating) only when results are reported.
//!
//! Every conversion between the two bases goes through this module.

use alloy_primitives::U256;

/// Number of extra decimals carried by `amtPerSec`.
pub const AMT_PER_SEC_EXTRA_DECIMALS: u32 = 9;

/// `10^AMT_PER_SEC_EXTRA_DECIMALS`.
pub const AMT_PER_SEC_MULTIPLIER: U256 = U256::from_limbs([1_000_000_000, 0, 0, 0]);

/// Lift a token amount into the fixed-point base.
///
/// Returns `None` if the scaled amount does not fit in 256 bits.
pub fn to_fixed(amount: U256) -> Option<U256> {
    amount.checked_mul(AMT_PER_SEC_MULTIPLIER)
}

/// Bring a fixed-point amount back to token units, truncating the remainder.
pub fn from_fixed(amount: U256) -> U256 {
    amount / AMT_PER_SEC_MULTIPLIER
}

/// Parse an unsigned integer given either in decimal or as `0x`-prefixed hex.
pub fn parse_uint(s: &str) -> Result<U256, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty integer".into());
    }
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => U256::from_str_radix(hex, 16),
        None => U256::from_str_radix(s, 10),
    };
    parsed.map_err(|e| format!("invalid unsigned integer '{s}': {e}"))
}

#[derive(serde::Deserialize)]
#[serde(untagged)]
enum RawNumber {
    Str(String),
    Num(u64),
}

/// Serde adapter for `U256` fields: written as a decimal string, read from a
/// decimal string, a `0x` hex string, or a JSON number.
pub mod serde_uint {
    use alloy_primitives::U256;
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    use super::{parse_uint, RawNumber};

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        match RawNumber::deserialize(deserializer)? {
            RawNumber::Str(s) => parse_uint(&s).map_err(D::Error::custom),
            RawNumber::Num(n) => Ok(U256::from(n)),
        }
    }
}

/// Serde adapter for small integer fields (timestamps, `maxEnd`) that indexers
/// often emit as strings.
pub mod serde_num {
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    use super::RawNumber;

    pub fn serialize<S, T>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: Copy + Into<u64>,
    {
        serializer.serialize_u64((*value).into())
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: TryFrom<u64>,
    {
        let n = match RawNumber::deserialize(deserializer)? {
            RawNumber::Str(s) => s
                .trim()
                .parse::<u64>()
                .map_err(|e| D::Error::custom(format!("invalid integer '{s}': {e}")))?,
            RawNumber::Num(n) => n,
        };
        T::try_from(n).map_err(|_| D::Error::custom(format!("integer {n} out of range")))
    }
}
