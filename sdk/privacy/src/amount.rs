//! Amounts in the smallest unit (wei-style integers, never floating point).
//!
//! `u128` does not survive every serde format (TOML stops at `i64`), so
//! persisted and configured amounts travel as decimal strings.

use serde::{Deserialize, Deserializer, Serializer};

/// An amount in the smallest unit
pub type Amount = u128;

/// Sum amounts, `None` on overflow.
pub fn checked_sum<I: IntoIterator<Item = Amount>>(amounts: I) -> Option<Amount> {
    amounts
        .into_iter()
        .try_fold(0u128, |acc, amount| acc.checked_add(amount))
}

pub fn serialize<S: Serializer>(amount: &Amount, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(amount)
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Amount, D::Error> {
    let s = String::deserialize(deserializer)?;
    s.trim()
        .replace('_', "")
        .parse()
        .map_err(|_| serde::de::Error::custom(format!("invalid amount {s:?}")))
}
