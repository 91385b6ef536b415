//! Public-layer addresses
//!
//! Addresses are 20 bytes rendered as `0x` + 40 lowercase hex characters.
//! Alias addresses are derived from a fresh alias public key, never from the
//! wallet's primary key.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::PrimitiveError;

pub const ADDRESS_LEN: usize = 20;

/// A public address
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; ADDRESS_LEN]);

impl Address {
    pub const ZERO: Self = Self([0u8; ADDRESS_LEN]);

    pub fn from_bytes(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    /// Derive an address from a 32-byte public key: first 20 bytes of
    /// BLAKE3(domain || pk).
    pub fn from_public_key(public_key: &[u8; 32]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"shroud-address-v1");
        hasher.update(public_key);
        let digest = hasher.finalize();
        let mut bytes = [0u8; ADDRESS_LEN];
        bytes.copy_from_slice(&digest.as_bytes()[..ADDRESS_LEN]);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ADDRESS_LEN]
    }
}

impl FromStr for Address {
    type Err = PrimitiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason| PrimitiveError::InvalidAddress {
            input: s.to_string(),
            reason,
        };

        let body = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .ok_or_else(|| invalid("missing 0x prefix"))?;
        if body.len() != ADDRESS_LEN * 2 {
            return Err(invalid("expected 40 hex characters"));
        }

        let mut bytes = [0u8; ADDRESS_LEN];
        hex::decode_to_slice(body, &mut bytes).map_err(|_| invalid("non-hex character"))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display() {
        let text = "0x00112233445566778899aabbccddeeff00112233";
        let addr: Address = text.parse().unwrap();
        assert_eq!(addr.to_string(), text);
    }

    #[test]
    fn uppercase_hex_is_accepted() {
        let addr: Address = "0x00112233445566778899AABBCCDDEEFF00112233".parse().unwrap();
        assert_eq!(addr.as_bytes()[10], 0xaa);
    }

    #[test]
    fn rejects_malformed() {
        assert!("00112233445566778899aabbccddeeff00112233".parse::<Address>().is_err());
        assert!("0x1234".parse::<Address>().is_err());
        assert!("0xzz112233445566778899aabbccddeeff00112233".parse::<Address>().is_err());
    }

    #[test]
    fn derived_addresses_differ_per_key() {
        let a = Address::from_public_key(&[1u8; 32]);
        let b = Address::from_public_key(&[2u8; 32]);
        assert_ne!(a, b);
        assert!(!a.is_zero());
    }

    #[test]
    fn serde_as_string() {
        let addr = Address::from_public_key(&[9u8; 32]);
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, format!("\"{addr}\""));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }
}
