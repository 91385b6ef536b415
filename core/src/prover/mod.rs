//! Proof Provider
//!
//! Interface to the spend-proof system. One joint proof covers every input
//! and output of a shielded transfer or withdraw.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Spend Proof                                  │
//! │                                                                  │
//! │  Public Inputs:                                                  │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │ • merkle_root         (anonymity set the inputs live in)   │ │
//! │  │ • nullifier_hashes    (one per input, revealed once)       │ │
//! │  │ • output_commitments  (new shielded notes)                 │ │
//! │  │ • recipient_hash      (withdraw only, binds the payee)     │ │
//! │  │ • public_amount, fee                                       │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! │                                                                  │
//! │  Private Witness:                                                │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │ • input secrets, nullifiers, amounts, merkle paths         │ │
//! │  │ • output secrets, nullifiers, amounts, recipients          │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod local;

pub use local::LocalProver;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shroud_privacy::{
    Address, Amount, Commitment, Digest, MerklePath, NoteSecret, Nullifier, NullifierHash,
};

use crate::error::ProofError;

// ============================================================================
// Proof Types
// ============================================================================

/// Opaque proof bytes
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    #[serde(with = "hex::serde")]
    pub bytes: Vec<u8>,
}

impl Proof {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// BLAKE3 of the proof bytes, recorded in transaction history
    pub fn hash(&self) -> Digest {
        *blake3::hash(&self.bytes).as_bytes()
    }
}

impl fmt::Debug for Proof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Proof({} bytes, {})",
            self.bytes.len(),
            hex::encode(&self.hash()[..8])
        )
    }
}

/// Statement the proof is bound to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicInputs {
    #[serde(with = "hex::serde")]
    pub merkle_root: Digest,
    pub nullifier_hashes: Vec<NullifierHash>,
    pub output_commitments: Vec<Commitment>,
    /// Hash of the public payee. Set only for withdrawals.
    pub recipient_hash: Option<Digest>,
    /// Value leaving the pool to the public layer
    #[serde(with = "shroud_privacy::amount")]
    pub public_amount: Amount,
    #[serde(with = "shroud_privacy::amount")]
    pub fee: Amount,
}

impl PublicInputs {
    /// Canonical digest of every public input
    pub fn transcript(&self) -> Digest {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"shroud-spend-v1");
        hasher.update(&self.merkle_root);
        hasher.update(&(self.nullifier_hashes.len() as u64).to_le_bytes());
        for hash in &self.nullifier_hashes {
            hasher.update(hash.as_bytes());
        }
        hasher.update(&(self.output_commitments.len() as u64).to_le_bytes());
        for commitment in &self.output_commitments {
            hasher.update(commitment.as_bytes());
        }
        match &self.recipient_hash {
            Some(hash) => {
                hasher.update(&[1]);
                hasher.update(hash);
            }
            None => {
                hasher.update(&[0]);
            }
        }
        hasher.update(&self.public_amount.to_le_bytes());
        hasher.update(&self.fee.to_le_bytes());
        *hasher.finalize().as_bytes()
    }
}

/// Secret opening of one input note
#[derive(Clone)]
pub struct SpendWitness {
    pub secret: NoteSecret,
    pub nullifier: Nullifier,
    pub amount: Amount,
    pub recipient: Option<Address>,
    pub path: MerklePath,
}

/// Secret opening of one output note
#[derive(Clone)]
pub struct OutputWitness {
    pub secret: NoteSecret,
    pub nullifier: Nullifier,
    pub amount: Amount,
    pub recipient: Option<Address>,
}

#[derive(Clone, Default)]
pub struct Witness {
    pub inputs: Vec<SpendWitness>,
    pub outputs: Vec<OutputWitness>,
    /// Plain payee behind `recipient_hash`
    pub public_recipient: Option<Address>,
}

impl fmt::Debug for Witness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Witness")
            .field("inputs", &self.inputs.len())
            .field("outputs", &self.outputs.len())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct ProofRequest {
    pub public_inputs: PublicInputs,
    pub witness: Witness,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedProof {
    pub proof: Proof,
    pub public_inputs: PublicInputs,
}

// ============================================================================
// Prover Trait
// ============================================================================

#[async_trait]
pub trait ProofProvider: Send + Sync {
    /// Prove the request's witness satisfies its public inputs
    async fn generate_proof(&self, request: &ProofRequest) -> Result<GeneratedProof, ProofError>;

    async fn verify_proof(
        &self,
        proof: &Proof,
        public_inputs: &PublicInputs,
    ) -> Result<bool, ProofError>;
}
