//! Note Commitments
//!
//! ```text
//! Commitment = Poseidon("CMT", secret, nullifier, amount, has_recipient, recipient)
//! ```
//!
//! `CommitmentScheme` is the capability the rest of the system depends on;
//! `PoseidonScheme` is the arkworks-backed implementation. A production
//! circuit backend only has to provide the same three functions.

use ark_bls12_381::Fr;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::address::Address;
use crate::amount::Amount;
use crate::nullifier::{NoteSecret, Nullifier, NullifierHash};
use crate::poseidon::{self, DOMAIN_COMMITMENT, DOMAIN_NULLIFIER, DOMAIN_RECIPIENT};

/// A 32-byte hash value (Merkle roots, recipient hashes)
pub type Digest = [u8; 32];

/// A note commitment (32 bytes)
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Commitment(#[serde(with = "hex::serde")] pub [u8; 32]);

impl Commitment {
    /// Get raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl AsRef<[u8]> for Commitment {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Commitment({})", hex::encode(&self.0[..8]))
    }
}

/// Pure, deterministic commitment and nullifier derivation.
///
/// Implementations must be binding and hiding with respect to
/// `(amount, recipient)`.
pub trait CommitmentScheme: Send + Sync {
    /// Commit to a note's contents
    fn commitment(
        &self,
        secret: &NoteSecret,
        nullifier: &Nullifier,
        amount: Amount,
        recipient: Option<&Address>,
    ) -> Commitment;

    /// Spend tag for a note. Call only when the note is being spent.
    fn nullifier_hash(&self, nullifier: &Nullifier, secret: &NoteSecret) -> NullifierHash;

    /// Hash of a plain public recipient, bound into withdraw proofs
    fn recipient_hash(&self, recipient: &Address) -> Digest;
}

/// Commitment scheme using Poseidon hash
#[derive(Debug, Clone, Copy, Default)]
pub struct PoseidonScheme;

impl PoseidonScheme {
    pub fn new() -> Self {
        Self
    }
}

impl CommitmentScheme for PoseidonScheme {
    fn commitment(
        &self,
        secret: &NoteSecret,
        nullifier: &Nullifier,
        amount: Amount,
        recipient: Option<&Address>,
    ) -> Commitment {
        let (flag, recipient_f) = match recipient {
            Some(addr) => (Fr::from(1u64), poseidon::from_bytes(addr.as_bytes())),
            None => (Fr::from(0u64), Fr::from(0u64)),
        };

        Commitment(poseidon::hash(
            DOMAIN_COMMITMENT,
            &[
                poseidon::from_bytes(secret.as_bytes()),
                poseidon::from_bytes(nullifier.as_bytes()),
                Fr::from(amount),
                flag,
                recipient_f,
            ],
        ))
    }

    fn nullifier_hash(&self, nullifier: &Nullifier, secret: &NoteSecret) -> NullifierHash {
        NullifierHash(poseidon::hash(
            DOMAIN_NULLIFIER,
            &[
                poseidon::from_bytes(nullifier.as_bytes()),
                poseidon::from_bytes(secret.as_bytes()),
            ],
        ))
    }

    fn recipient_hash(&self, recipient: &Address) -> Digest {
        poseidon::hash(
            DOMAIN_RECIPIENT,
            &[poseidon::from_bytes(recipient.as_bytes())],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn material() -> (NoteSecret, Nullifier) {
        (NoteSecret([42u8; 32]), Nullifier([7u8; 32]))
    }

    #[test]
    fn test_commitment_deterministic() {
        let scheme = PoseidonScheme::new();
        let (secret, nullifier) = material();
        let recipient = Address::from_bytes([1u8; 20]);

        let c1 = scheme.commitment(&secret, &nullifier, 1000, Some(&recipient));
        let c2 = scheme.commitment(&secret, &nullifier, 1000, Some(&recipient));

        assert_eq!(c1, c2, "same inputs should produce same commitment");
    }

    #[test]
    fn test_commitment_hiding() {
        let scheme = PoseidonScheme::new();
        let nullifier = Nullifier([7u8; 32]);

        let c1 = scheme.commitment(&NoteSecret([1u8; 32]), &nullifier, 1000, None);
        let c2 = scheme.commitment(&NoteSecret([2u8; 32]), &nullifier, 1000, None);

        assert_ne!(c1, c2, "different secrets should produce different commitments");
    }

    #[test]
    fn test_commitment_binds_amount_and_recipient() {
        let scheme = PoseidonScheme::new();
        let (secret, nullifier) = material();
        let a = Address::from_bytes([1u8; 20]);
        let b = Address::from_bytes([2u8; 20]);

        let base = scheme.commitment(&secret, &nullifier, 1000, Some(&a));
        assert_ne!(base, scheme.commitment(&secret, &nullifier, 2000, Some(&a)));
        assert_ne!(base, scheme.commitment(&secret, &nullifier, 1000, Some(&b)));
        assert_ne!(base, scheme.commitment(&secret, &nullifier, 1000, None));
    }

    #[test]
    fn test_nullifier_hash_depends_on_both_inputs() {
        let scheme = PoseidonScheme::new();
        let (secret, nullifier) = material();

        let h = scheme.nullifier_hash(&nullifier, &secret);
        assert_eq!(h, scheme.nullifier_hash(&nullifier, &secret));
        assert_ne!(h, scheme.nullifier_hash(&Nullifier([8u8; 32]), &secret));
        assert_ne!(h, scheme.nullifier_hash(&nullifier, &NoteSecret([43u8; 32])));
    }

    #[test]
    fn test_nullifier_hash_is_not_the_commitment() {
        let scheme = PoseidonScheme::new();
        let (secret, nullifier) = material();
        let c = scheme.commitment(&secret, &nullifier, 0, None);
        assert_ne!(c.0, scheme.nullifier_hash(&nullifier, &secret).0);
    }
}
