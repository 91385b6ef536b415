//! Error taxonomy for the privacy engine.
//!
//! ```text
//! ValidationError   caller input is malformed            fail fast, no retry
//! StateError        spent note / inactive alias / lock   fail fast
//! ConservationError inputs != outputs + fee              never reaches the network
//! ProofError        proof generation/verification        retried with backoff
//! ChainError        submission/confirmation failure      surfaced verbatim, state untouched
//! StorageError      persistence backend                  surfaced, in-memory state kept
//! ```

use shroud_privacy::{Address, Amount, Commitment, NoteId, NullifierHash, PrimitiveError};
use thiserror::Error;

use crate::state::history::{TxId, TxStatus};

pub type PrivacyResult<T> = Result<T, PrivacyError>;

#[derive(Debug, Error)]
pub enum PrivacyError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("state error: {0}")]
    State(#[from] StateError),

    #[error(transparent)]
    Conservation(#[from] ConservationError),

    #[error("proof error: {0}")]
    Proof(#[from] ProofError),

    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl PrivacyError {
    /// Whether the caller may resubmit the same operation unchanged
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Proof(e) => e.is_transient(),
            Self::Chain(_) | Self::Storage(_) => true,
            Self::State(StateError::NoteInFlight(_)) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("amount must be greater than zero")]
    ZeroAmount,

    #[error("amount {amount} below minimum {minimum}")]
    AmountBelowMinimum { amount: Amount, minimum: Amount },

    #[error("amount {amount} above maximum {maximum}")]
    AmountAboveMaximum { amount: Amount, maximum: Amount },

    #[error("no input notes selected")]
    EmptyInputs,

    #[error("no outputs given")]
    EmptyOutputs,

    #[error("note {0} selected more than once")]
    DuplicateInput(NoteId),

    #[error("zero address is not a valid recipient")]
    ZeroAddress,

    #[error(transparent)]
    InvalidAddress(#[from] PrimitiveError),

    #[error("amount overflow")]
    AmountOverflow,

    #[error("invalid settings: {0}")]
    InvalidSettings(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("note {0} is already spent")]
    AlreadySpent(NoteId),

    #[error("alias {0} is inactive")]
    AliasInactive(Address),

    #[error("alias {0} not found")]
    AliasNotFound(Address),

    #[error("alias {0} already registered")]
    DuplicateAlias(Address),

    #[error("note {0} not found")]
    NoteNotFound(NoteId),

    #[error("note {0} is staged by another in-flight transaction")]
    NoteInFlight(NoteId),

    #[error("note {0} has no merkle index yet")]
    NoteNotIndexed(NoteId),

    #[error("nullifier of note {0} is already published")]
    DoubleSpendAttempt(NoteId),

    #[error("commitment {0} already exists")]
    DuplicateCommitment(Commitment),

    #[error("note {0} already exists")]
    DuplicateNote(NoteId),

    #[error("transaction {0} not found")]
    TransactionNotFound(TxId),

    #[error("transaction {id} is {status:?}, expected pending")]
    TransactionFinalized { id: TxId, status: TxStatus },
}

/// Inputs do not balance outputs plus fee.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("conservation violated: inputs {inputs} != outputs {outputs} + fee {fee}")]
pub struct ConservationError {
    pub inputs: Amount,
    pub outputs: Amount,
    pub fee: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProofError {
    #[error("proof generation failed: {0}")]
    Generation(String),

    #[error("witness does not satisfy the statement: {0}")]
    InvalidWitness(String),

    #[error("proof rejected by verifier")]
    Rejected,

    #[error("prover unavailable: {0}")]
    Unavailable(String),
}

impl ProofError {
    /// A bad witness fails the same way every time; everything else may clear up
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::InvalidWitness(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("transaction rejected: {0}")]
    Rejected(String),

    #[error("merkle root is not a known recent root")]
    UnknownRoot,

    #[error("nullifier hash already published")]
    NullifierAlreadyPublished(NullifierHash),

    #[error("commitment {0} already in the pool")]
    DuplicateCommitment(Commitment),

    #[error("commitment not found at index {0}")]
    CommitmentNotFound(u64),

    #[error("proof failed on-chain verification")]
    InvalidProof,

    #[error("insufficient balance at {address}: have {balance}, need {requested}")]
    InsufficientBalance {
        address: Address,
        balance: Amount,
        requested: Amount,
    },

    #[error("gateway unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("backend error: {0}")]
    Backend(String),

    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("column family {0} missing")]
    MissingColumnFamily(&'static str),
}

impl From<rocksdb::Error> for StorageError {
    fn from(e: rocksdb::Error) -> Self {
        Self::Backend(e.to_string())
    }
}
