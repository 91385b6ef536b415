//! Shroud Privacy SDK
//!
//! Note-based shielded pool primitives shared by the wallet engine and any
//! pool backend.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Shielded Pool Note                         │
//! │  ┌──────────────┐  ┌──────────────┐  ┌───────────────────────┐ │
//! │  │ secret,      │  │  Commitment  │  │  Merkle index         │ │
//! │  │ nullifier    │─▶│  (public)    │─▶│  (anonymity set)      │ │
//! │  └──────────────┘  └──────────────┘  └───────────────────────┘ │
//! │         │                                                       │
//! │         ▼  (spend time only)                                    │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │ Nullifier hash: published once, blocks double spends    │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod address;
pub mod amount;
pub mod commitment;
pub mod error;
pub mod keys;
pub mod merkle;
pub mod note;
pub mod nullifier;
pub mod score;

mod poseidon;

pub use address::Address;
pub use amount::{Amount, checked_sum};
pub use commitment::{Commitment, CommitmentScheme, Digest, PoseidonScheme};
pub use error::PrimitiveError;
pub use keys::AliasKeys;
pub use merkle::{MerklePath, MerkleTree, RootHistory, TREE_DEPTH, hash_pair};
pub use note::{NoteId, PrivacyNote};
pub use nullifier::{NoteSecret, Nullifier, NullifierHash};
pub use score::{MAX_SCORE, PrivacyFactors, score};
