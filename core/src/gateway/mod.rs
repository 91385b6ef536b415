//! Chain Gateway
//!
//! Everything the engine needs from the chain hosting the shielded pool.
//! Implementations are expected to return only once a transaction is
//! confirmed; an `Err` means nothing landed.

pub mod local;

pub use local::LocalChain;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shroud_privacy::{Address, Amount, Commitment, Digest, MerklePath, NullifierHash};

use crate::error::ChainError;
use crate::prover::Proof;

pub type TxHash = String;

/// Confirmation of a transaction that added commitments to the pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainReceipt {
    pub tx_hash: TxHash,
    /// Tree positions of the new commitments, in submission order
    pub leaf_indices: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmittedOutput {
    /// New note commitment appended to the pool
    Shielded(Commitment),
    /// Value released to a public address
    Public {
        recipient: Address,
        #[serde(with = "shroud_privacy::amount")]
        amount: Amount,
    },
}

/// A proof-carrying spend of one or more notes
#[derive(Debug, Clone)]
pub struct ShieldedSubmission {
    pub proof: Proof,
    pub merkle_root: Digest,
    pub nullifier_hashes: Vec<NullifierHash>,
    pub outputs: Vec<SubmittedOutput>,
    pub fee: Amount,
}

impl ShieldedSubmission {
    pub fn shielded_outputs(&self) -> impl Iterator<Item = &Commitment> {
        self.outputs.iter().filter_map(|output| match output {
            SubmittedOutput::Shielded(commitment) => Some(commitment),
            SubmittedOutput::Public { .. } => None,
        })
    }

    pub fn public_output(&self) -> Option<(Address, Amount)> {
        self.outputs.iter().find_map(|output| match output {
            SubmittedOutput::Public { recipient, amount } => Some((*recipient, *amount)),
            SubmittedOutput::Shielded(_) => None,
        })
    }
}

#[async_trait]
pub trait ChainGateway: Send + Sync {
    /// Append a commitment backed by `value` from the public layer
    async fn deposit(&self, commitment: Commitment, value: Amount)
    -> Result<ChainReceipt, ChainError>;

    /// Publish nullifier hashes and apply outputs in one transaction
    async fn submit_withdraw_or_transfer(
        &self,
        submission: &ShieldedSubmission,
    ) -> Result<ChainReceipt, ChainError>;

    async fn merkle_root(&self) -> Result<Digest, ChainError>;

    async fn merkle_proof(
        &self,
        commitment: &Commitment,
        index: u64,
    ) -> Result<MerklePath, ChainError>;

    /// Number of commitments in the pool
    async fn anonymity_set_size(&self) -> Result<u64, ChainError>;

    /// Plain public-to-public transfer
    async fn public_transfer(
        &self,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> Result<TxHash, ChainError>;
}
