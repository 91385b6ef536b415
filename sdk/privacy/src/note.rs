//! Shielded Notes
//!
//! A `PrivacyNote` is one unit of privately held value.
//!
//! ```text
//! PrivacyNote = {
//!     id, secret, nullifier,
//!     commitment = H(secret, nullifier, amount, recipient),
//!     amount,                    // smallest unit
//!     recipient,                 // alias / destination address
//!     merkle_index,              // set once the pool has the leaf
//!     is_spent,                  // false -> true, exactly once
//!     anonymity_set_at_creation,
//! }
//! ```

use std::fmt;
use std::str::FromStr;

use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::amount::Amount;
use crate::commitment::{Commitment, CommitmentScheme};
use crate::nullifier::{NoteSecret, Nullifier};

/// Random 16-byte identifier, rendered as hex
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NoteId(#[serde(with = "hex::serde")] pub [u8; 16]);

impl NoteId {
    pub fn random<R: RngCore>(rng: &mut R) -> Self {
        let mut bytes = [0u8; 16];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NoteId({self})")
    }
}

impl FromStr for NoteId {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 16];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }
}

/// A shielded note representing privately held value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivacyNote {
    pub id: NoteId,
    pub secret: NoteSecret,
    pub nullifier: Nullifier,
    pub commitment: Commitment,
    #[serde(with = "crate::amount")]
    pub amount: Amount,
    /// Alias or destination the note is committed to
    pub recipient: Option<Address>,
    /// Leaf position in the pool's commitment tree
    pub merkle_index: Option<u64>,
    pub is_spent: bool,
    pub anonymity_set_at_creation: u64,
    /// Unix seconds
    pub created_at: u64,
    pub spent_at: Option<u64>,
}

impl PrivacyNote {
    /// Generate fresh secret material and derive the commitment.
    ///
    /// The note is not part of any pool until it is confirmed on-chain and
    /// given a `merkle_index`.
    pub fn generate<R: RngCore + CryptoRng>(
        scheme: &dyn CommitmentScheme,
        amount: Amount,
        recipient: Option<Address>,
        rng: &mut R,
    ) -> Self {
        let secret = NoteSecret::random(rng);
        let nullifier = Nullifier::random(rng);
        let commitment = scheme.commitment(&secret, &nullifier, amount, recipient.as_ref());

        Self {
            id: NoteId::random(rng),
            secret,
            nullifier,
            commitment,
            amount,
            recipient,
            merkle_index: None,
            is_spent: false,
            anonymity_set_at_creation: 0,
            created_at: 0,
            spent_at: None,
        }
    }

    /// Check the stored commitment against the note's contents
    pub fn verify_commitment(&self, scheme: &dyn CommitmentScheme) -> bool {
        scheme.commitment(
            &self.secret,
            &self.nullifier,
            self.amount,
            self.recipient.as_ref(),
        ) == self.commitment
    }

    /// Check if this note has been inserted into the tree
    pub fn is_inserted(&self) -> bool {
        self.merkle_index.is_some()
    }
}
