//! Privacy transaction log
//!
//! ```text
//! ┌─────────┐   confirm   ┌───────────┐
//! │ Pending │────────────>│ Confirmed │  (immutable)
//! └─────────┘             └───────────┘
//!      │        fail      ┌───────────┐
//!      └─────────────────>│  Failed   │
//!                         └───────────┘
//! ```

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{PoisonError, RwLock};

use rand::RngCore;
use serde::{Deserialize, Serialize};
use shroud_privacy::{Address, Amount, Digest, NoteId};

use super::{DirtyFlag, now_secs};
use crate::error::{PrivacyResult, StateError, StorageError};

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TxId(#[serde(with = "hex::serde")] pub [u8; 16]);

impl TxId {
    pub fn random<R: RngCore>(rng: &mut R) -> Self {
        let mut bytes = [0u8; 16];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxId({self})")
    }
}

impl FromStr for TxId {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 16];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxKind {
    Deposit,
    Withdraw,
    ShieldedSend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    Pending,
    Confirmed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivacyTransaction {
    pub id: TxId,
    pub kind: TxKind,
    pub input_notes: Vec<NoteId>,
    /// Filled on confirmation
    pub output_notes: Vec<NoteId>,
    /// Public recipient (withdraw only)
    pub to_address: Option<Address>,
    /// Alias credited (deposit) or debited (withdraw)
    pub alias: Option<Address>,
    #[serde(with = "shroud_privacy::amount")]
    pub amount: Amount,
    #[serde(with = "shroud_privacy::amount")]
    pub fee: Amount,
    /// BLAKE3 of the proof bytes
    pub proof_hash: Option<Digest>,
    pub tx_hash: Option<String>,
    pub status: TxStatus,
    pub created_at: u64,
    pub updated_at: u64,
    pub failure: Option<String>,
}

impl PrivacyTransaction {
    pub fn pending(id: TxId, kind: TxKind, amount: Amount, fee: Amount) -> Self {
        let now = now_secs();
        Self {
            id,
            kind,
            input_notes: Vec::new(),
            output_notes: Vec::new(),
            to_address: None,
            alias: None,
            amount,
            fee,
            proof_hash: None,
            tx_hash: None,
            status: TxStatus::Pending,
            created_at: now,
            updated_at: now,
            failure: None,
        }
    }
}

/// Append-only transaction log
#[derive(Debug, Default)]
pub struct TransactionLog {
    transactions: RwLock<HashMap<TxId, PrivacyTransaction>>,
    dirty: DirtyFlag,
}

impl TransactionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_pending(&self, tx: PrivacyTransaction) {
        self.write().insert(tx.id, tx);
        self.dirty.touch();
    }

    pub fn confirm(
        &self,
        id: &TxId,
        tx_hash: String,
        output_notes: Vec<NoteId>,
    ) -> PrivacyResult<PrivacyTransaction> {
        self.transition(id, |tx| {
            tx.status = TxStatus::Confirmed;
            tx.tx_hash = Some(tx_hash);
            tx.output_notes = output_notes;
        })
    }

    pub fn fail(&self, id: &TxId, reason: String) -> PrivacyResult<PrivacyTransaction> {
        self.transition(id, |tx| {
            tx.status = TxStatus::Failed;
            tx.failure = Some(reason);
        })
    }

    fn transition(
        &self,
        id: &TxId,
        apply: impl FnOnce(&mut PrivacyTransaction),
    ) -> PrivacyResult<PrivacyTransaction> {
        let mut transactions = self.write();
        let tx = transactions
            .get_mut(id)
            .ok_or(StateError::TransactionNotFound(*id))?;
        if tx.status != TxStatus::Pending {
            return Err(StateError::TransactionFinalized {
                id: *id,
                status: tx.status,
            }
            .into());
        }
        apply(tx);
        tx.updated_at = now_secs();
        let updated = tx.clone();
        drop(transactions);
        self.dirty.touch();
        Ok(updated)
    }

    pub fn get(&self, id: &TxId) -> Option<PrivacyTransaction> {
        self.read().get(id).cloned()
    }

    /// Newest first
    pub fn history(&self) -> Vec<PrivacyTransaction> {
        let mut all: Vec<_> = self.read().values().cloned().collect();
        all.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then(b.updated_at.cmp(&a.updated_at))
                .then(b.id.cmp(&a.id))
        });
        all
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn dirty(&self) -> &DirtyFlag {
        &self.dirty
    }

    pub fn snapshot(&self) -> Result<(u64, Vec<u8>), StorageError> {
        let transactions = self.read();
        let version = self.dirty.version();
        let mut records: Vec<&PrivacyTransaction> = transactions.values().collect();
        records.sort_by_key(|tx| (tx.created_at, tx.id));
        Ok((version, serde_json::to_vec(&records)?))
    }

    pub fn restore(blob: &[u8]) -> Result<Self, StorageError> {
        let records: Vec<PrivacyTransaction> = serde_json::from_slice(blob)?;
        Ok(Self {
            transactions: RwLock::new(records.into_iter().map(|tx| (tx.id, tx)).collect()),
            dirty: DirtyFlag::default(),
        })
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<TxId, PrivacyTransaction>> {
        self.transactions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<TxId, PrivacyTransaction>> {
        self.transactions.write().unwrap_or_else(PoisonError::into_inner)
    }
}
