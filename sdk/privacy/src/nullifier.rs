//! Note secret material and nullifier hashes.
//!
//! ```text
//! NullifierHash = Poseidon("NULL", nullifier, secret)
//! ```
//!
//! The hash is the only spend-time tag the pool ever sees. It is derived
//! on demand at spend time and never stored next to an unspent note.

use std::fmt;

use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

/// Random secret bound into a note commitment
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteSecret(#[serde(with = "hex::serde")] pub [u8; 32]);

/// Random nullifier preimage bound into a note commitment
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nullifier(#[serde(with = "hex::serde")] pub [u8; 32]);

/// Published spend tag (32 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NullifierHash(#[serde(with = "hex::serde")] pub [u8; 32]);

impl NoteSecret {
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl Nullifier {
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl NullifierHash {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for NoteSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("NoteSecret(..)")
    }
}

impl fmt::Debug for Nullifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Nullifier(..)")
    }
}

impl AsRef<[u8]> for NullifierHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
