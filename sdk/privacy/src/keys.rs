//! Alias key material
//!
//! Alias keys are sampled from a caller-supplied CSPRNG and nothing else.
//! There is no constructor that accepts wallet key material, so an alias can
//! never be re-derived from (or traced back to) the primary wallet key.

use std::fmt;

use ed25519_dalek::SigningKey;
use rand::{CryptoRng, RngCore};

use crate::address::Address;

/// Signing key behind an alias account
#[derive(Clone)]
pub struct AliasKeys {
    signing_key: SigningKey,
}

impl AliasKeys {
    /// Sample a fresh, independent alias key
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut seed = [0u8; 32];
        rng.fill_bytes(&mut seed);
        Self {
            signing_key: SigningKey::from_bytes(&seed),
        }
    }

    /// Reload an alias key from its persisted secret
    pub fn from_secret_bytes(secret: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(secret),
        }
    }

    pub fn secret_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    pub fn address(&self) -> Address {
        Address::from_public_key(&self.public_key())
    }
}

impl fmt::Debug for AliasKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AliasKeys")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}
