//! Exclusive note locks
//!
//! A note may be staged by at most one in-flight transaction. Locks are
//! taken before any network call and released when the guard drops, so a
//! failed, cancelled or finished flow always frees its notes.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use shroud_privacy::NoteId;

use crate::error::StateError;
use crate::state::TxId;

#[derive(Debug, Clone, Default)]
pub struct NoteLocks {
    held: Arc<DashMap<NoteId, TxId>>,
}

impl NoteLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock every note for `tx`, or none of them.
    pub fn acquire(&self, tx: TxId, notes: &[NoteId]) -> Result<NoteLockGuard, StateError> {
        let mut guard = NoteLockGuard {
            held: self.held.clone(),
            tx,
            notes: Vec::with_capacity(notes.len()),
        };

        for id in notes {
            // entry must be released before the guard can unwind
            let claimed = match self.held.entry(*id) {
                Entry::Occupied(_) => false,
                Entry::Vacant(slot) => {
                    slot.insert(tx);
                    true
                }
            };
            if !claimed {
                return Err(StateError::NoteInFlight(*id));
            }
            guard.notes.push(*id);
        }

        Ok(guard)
    }

    pub fn is_locked(&self, id: &NoteId) -> bool {
        self.held.contains_key(id)
    }

    pub fn holder(&self, id: &NoteId) -> Option<TxId> {
        self.held.get(id).map(|entry| *entry)
    }

    pub fn len(&self) -> usize {
        self.held.len()
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }
}

/// Releases its notes on drop
#[derive(Debug)]
pub struct NoteLockGuard {
    held: Arc<DashMap<NoteId, TxId>>,
    tx: TxId,
    notes: Vec<NoteId>,
}

impl NoteLockGuard {
    pub fn tx(&self) -> TxId {
        self.tx
    }

    pub fn notes(&self) -> &[NoteId] {
        &self.notes
    }
}

impl Drop for NoteLockGuard {
    fn drop(&mut self) {
        for id in &self.notes {
            self.held.remove_if(id, |_, owner| *owner == self.tx);
        }
    }
}
