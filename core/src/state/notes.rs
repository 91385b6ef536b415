//! Note store
//!
//! Owns every private note the wallet holds, spent or not, plus the set of
//! nullifier hashes this wallet has published. Spent notes are never
//! purged. All multi-note mutations happen under a single write lock so no
//! reader sees a note both spent and unspent.

use std::collections::{BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use rand::rngs::OsRng;
use shroud_privacy::{
    Address, Amount, Commitment, CommitmentScheme, NoteId, NullifierHash, PrivacyNote,
};

use super::{DirtyFlag, now_secs};
use crate::error::{PrivacyResult, StateError, StorageError};

#[derive(Debug, Default)]
struct Notes {
    by_id: HashMap<NoteId, PrivacyNote>,
    by_commitment: HashMap<Commitment, NoteId>,
    published: BTreeSet<NullifierHash>,
}

impl Notes {
    fn check_insertable(&self, note: &PrivacyNote) -> Result<(), StateError> {
        if self.by_id.contains_key(&note.id) {
            return Err(StateError::DuplicateNote(note.id));
        }
        if self.by_commitment.contains_key(&note.commitment) {
            return Err(StateError::DuplicateCommitment(note.commitment));
        }
        Ok(())
    }

    fn spendable(&self, id: &NoteId) -> Result<&PrivacyNote, StateError> {
        let note = self.by_id.get(id).ok_or(StateError::NoteNotFound(*id))?;
        if note.is_spent {
            return Err(StateError::AlreadySpent(*id));
        }
        Ok(note)
    }
}

/// Versioned blobs of both note collections, taken together
#[derive(Debug)]
pub struct NoteSnapshot {
    pub notes: (u64, Vec<u8>),
    pub nullifiers: (u64, Vec<u8>),
}

#[derive(Debug, Default)]
pub struct NoteStore {
    inner: RwLock<Notes>,
    notes_dirty: DirtyFlag,
    nullifiers_dirty: DirtyFlag,
}

impl NoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Draft a note with fresh secret material.
    ///
    /// The draft is not stored; it becomes part of the wallet only through
    /// [`NoteStore::insert`] or [`NoteStore::apply_spend`] once the chain
    /// has accepted its commitment.
    pub fn create_note(
        &self,
        scheme: &dyn CommitmentScheme,
        amount: Amount,
        recipient: Option<Address>,
    ) -> PrivacyNote {
        let notes = self.read();
        loop {
            let mut note = PrivacyNote::generate(scheme, amount, recipient, &mut OsRng);
            if notes.check_insertable(&note).is_ok() {
                note.created_at = now_secs();
                return note;
            }
        }
    }

    pub fn insert(&self, note: PrivacyNote) -> PrivacyResult<()> {
        let mut notes = self.write();
        notes.check_insertable(&note)?;
        notes.by_commitment.insert(note.commitment, note.id);
        notes.by_id.insert(note.id, note);
        drop(notes);
        self.notes_dirty.touch();
        Ok(())
    }

    pub fn get(&self, id: &NoteId) -> Option<PrivacyNote> {
        self.read().by_id.get(id).cloned()
    }

    pub fn contains_commitment(&self, commitment: &Commitment) -> bool {
        self.read().by_commitment.contains_key(commitment)
    }

    /// Flip a note to spent. Happens exactly once per note.
    pub fn mark_spent(&self, id: &NoteId) -> Result<(), StateError> {
        let mut notes = self.write();
        notes.spendable(id)?;
        if let Some(note) = notes.by_id.get_mut(id) {
            note.is_spent = true;
            note.spent_at = Some(now_secs());
        }
        drop(notes);
        self.notes_dirty.touch();
        Ok(())
    }

    /// Derive the nullifier hash of a note that is about to be spent.
    ///
    /// The spent flag is checked first; a spent note never has its hash
    /// recomputed.
    pub fn reveal_nullifier_hash(
        &self,
        id: &NoteId,
        scheme: &dyn CommitmentScheme,
    ) -> Result<NullifierHash, StateError> {
        let notes = self.read();
        let note = notes.spendable(id)?;
        Ok(scheme.nullifier_hash(&note.nullifier, &note.secret))
    }

    pub fn is_published(&self, hash: &NullifierHash) -> bool {
        self.read().published.contains(hash)
    }

    /// Fails with `DoubleSpendAttempt` if `hash` was already published.
    pub fn ensure_unpublished(&self, id: &NoteId, hash: &NullifierHash) -> Result<(), StateError> {
        if self.is_published(hash) {
            return Err(StateError::DoubleSpendAttempt(*id));
        }
        Ok(())
    }

    pub fn publish(&self, hash: NullifierHash) {
        if self.write().published.insert(hash) {
            self.nullifiers_dirty.touch();
        }
    }

    /// Commit a confirmed spend: inputs become spent, their nullifier
    /// hashes published, and the outputs inserted. Either everything
    /// applies or nothing does.
    pub fn apply_spend(
        &self,
        inputs: &[(NoteId, NullifierHash)],
        outputs: Vec<PrivacyNote>,
    ) -> PrivacyResult<()> {
        let mut notes = self.write();

        for (id, hash) in inputs {
            notes.spendable(id)?;
            if notes.published.contains(hash) {
                return Err(StateError::DoubleSpendAttempt(*id).into());
            }
        }
        for output in &outputs {
            notes.check_insertable(output)?;
        }

        let spent_at = now_secs();
        for (id, hash) in inputs {
            if let Some(note) = notes.by_id.get_mut(id) {
                note.is_spent = true;
                note.spent_at = Some(spent_at);
            }
            notes.published.insert(*hash);
        }
        for output in outputs {
            notes.by_commitment.insert(output.commitment, output.id);
            notes.by_id.insert(output.id, output);
        }
        drop(notes);

        self.notes_dirty.touch();
        if !inputs.is_empty() {
            self.nullifiers_dirty.touch();
        }
        Ok(())
    }

    /// Unspent notes, oldest first
    pub fn list_unspent(&self) -> Vec<PrivacyNote> {
        self.collect(|note| !note.is_spent)
    }

    pub fn list_spent(&self) -> Vec<PrivacyNote> {
        self.collect(|note| note.is_spent)
    }

    /// Sum of unspent amounts
    pub fn balance(&self) -> Amount {
        self.read()
            .by_id
            .values()
            .filter(|note| !note.is_spent)
            .fold(0, |acc: Amount, note| acc.saturating_add(note.amount))
    }

    pub fn len(&self) -> usize {
        self.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().by_id.is_empty()
    }

    pub fn notes_dirty(&self) -> &DirtyFlag {
        &self.notes_dirty
    }

    pub fn nullifiers_dirty(&self) -> &DirtyFlag {
        &self.nullifiers_dirty
    }

    /// Serialize notes and published nullifiers under one read guard, so a
    /// spend is either in both blobs or in neither.
    pub fn snapshot(&self) -> Result<NoteSnapshot, StorageError> {
        let notes = self.read();
        let notes_version = self.notes_dirty.version();
        let nullifiers_version = self.nullifiers_dirty.version();

        let mut records: Vec<&PrivacyNote> = notes.by_id.values().collect();
        records.sort_by_key(|note| (note.created_at, note.id));

        Ok(NoteSnapshot {
            notes: (notes_version, serde_json::to_vec(&records)?),
            nullifiers: (nullifiers_version, serde_json::to_vec(&notes.published)?),
        })
    }

    /// Rebuild from persisted blobs. Missing blobs mean empty collections.
    pub fn restore(
        notes_blob: Option<&[u8]>,
        nullifiers_blob: Option<&[u8]>,
    ) -> Result<Self, StorageError> {
        let mut inner = Notes::default();
        if let Some(blob) = notes_blob {
            let records: Vec<PrivacyNote> = serde_json::from_slice(blob)?;
            for note in records {
                inner.by_commitment.insert(note.commitment, note.id);
                inner.by_id.insert(note.id, note);
            }
        }
        if let Some(blob) = nullifiers_blob {
            inner.published = serde_json::from_slice(blob)?;
        }
        Ok(Self {
            inner: RwLock::new(inner),
            notes_dirty: DirtyFlag::default(),
            nullifiers_dirty: DirtyFlag::default(),
        })
    }

    fn collect(&self, keep: impl Fn(&PrivacyNote) -> bool) -> Vec<PrivacyNote> {
        let mut notes: Vec<_> = self
            .read()
            .by_id
            .values()
            .filter(|note| keep(note))
            .cloned()
            .collect();
        notes.sort_by_key(|note| (note.created_at, note.id));
        notes
    }

    fn read(&self) -> RwLockReadGuard<'_, Notes> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Notes> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PrivacyError;
    use shroud_privacy::PoseidonScheme;

    fn stored(store: &NoteStore, amount: Amount) -> PrivacyNote {
        let scheme = PoseidonScheme::new();
        let mut note = store.create_note(&scheme, amount, None);
        note.merkle_index = Some(store.len() as u64);
        store.insert(note.clone()).unwrap();
        note
    }

    #[test]
    fn test_create_note_is_a_draft() {
        let store = NoteStore::new();
        let scheme = PoseidonScheme::new();
        let note = store.create_note(&scheme, 10, None);

        assert!(note.verify_commitment(&scheme));
        assert!(store.is_empty());
        assert_eq!(store.balance(), 0);
    }

    #[test]
    fn test_balance_counts_only_unspent() {
        let store = NoteStore::new();
        let a = stored(&store, 300);
        stored(&store, 200);
        assert_eq!(store.balance(), 500);

        store.mark_spent(&a.id).unwrap();
        assert_eq!(store.balance(), 200);
        assert_eq!(store.list_unspent().len(), 1);
        assert_eq!(store.list_spent()[0].id, a.id);
    }

    #[test]
    fn test_mark_spent_twice_fails() {
        let store = NoteStore::new();
        let note = stored(&store, 1);
        store.mark_spent(&note.id).unwrap();

        assert_eq!(
            store.mark_spent(&note.id),
            Err(StateError::AlreadySpent(note.id))
        );
        assert_eq!(
            store.mark_spent(&NoteId([0u8; 16])),
            Err(StateError::NoteNotFound(NoteId([0u8; 16])))
        );
    }

    #[test]
    fn test_spent_note_never_reveals_nullifier_hash() {
        let store = NoteStore::new();
        let scheme = PoseidonScheme::new();
        let note = stored(&store, 1);

        let hash = store.reveal_nullifier_hash(&note.id, &scheme).unwrap();
        assert_eq!(hash, scheme.nullifier_hash(&note.nullifier, &note.secret));

        store.mark_spent(&note.id).unwrap();
        assert_eq!(
            store.reveal_nullifier_hash(&note.id, &scheme),
            Err(StateError::AlreadySpent(note.id))
        );
    }

    #[test]
    fn test_duplicate_commitment_rejected() {
        let store = NoteStore::new();
        let note = stored(&store, 7);

        let mut clone = note.clone();
        clone.id = NoteId([0xee; 16]);
        let err = store.insert(clone).unwrap_err();
        assert!(matches!(
            err,
            PrivacyError::State(StateError::DuplicateCommitment(_))
        ));
    }

    #[test]
    fn test_apply_spend_is_all_or_nothing() {
        let store = NoteStore::new();
        let scheme = PoseidonScheme::new();
        let input = stored(&store, 500);
        let hash = store.reveal_nullifier_hash(&input.id, &scheme).unwrap();

        // second output collides with an existing commitment
        let fresh = store.create_note(&scheme, 300, None);
        let mut colliding = input.clone();
        colliding.id = NoteId([0xdd; 16]);
        let err = store
            .apply_spend(&[(input.id, hash)], vec![fresh.clone(), colliding])
            .unwrap_err();
        assert!(matches!(
            err,
            PrivacyError::State(StateError::DuplicateCommitment(_))
        ));
        assert!(!store.get(&input.id).unwrap().is_spent);
        assert!(store.get(&fresh.id).is_none());
        assert!(!store.is_published(&hash));

        let change = store.create_note(&scheme, 200, None);
        store
            .apply_spend(&[(input.id, hash)], vec![fresh, change])
            .unwrap();
        assert!(store.get(&input.id).unwrap().is_spent);
        assert!(store.is_published(&hash));
        assert_eq!(store.balance(), 500);
    }

    #[test]
    fn test_published_hash_blocks_spend() {
        let store = NoteStore::new();
        let scheme = PoseidonScheme::new();
        let note = stored(&store, 5);
        let hash = store.reveal_nullifier_hash(&note.id, &scheme).unwrap();

        store.publish(hash);
        assert_eq!(
            store.ensure_unpublished(&note.id, &hash),
            Err(StateError::DoubleSpendAttempt(note.id))
        );
        let err = store.apply_spend(&[(note.id, hash)], vec![]).unwrap_err();
        assert!(matches!(
            err,
            PrivacyError::State(StateError::DoubleSpendAttempt(_))
        ));
    }

    #[test]
    fn test_unspent_and_spent_are_disjoint() {
        let store = NoteStore::new();
        let notes: Vec<_> = (1..=6).map(|n| stored(&store, n)).collect();
        for note in notes.iter().step_by(2) {
            store.mark_spent(&note.id).unwrap();
        }

        let unspent: BTreeSet<_> = store.list_unspent().iter().map(|n| n.id).collect();
        let spent: BTreeSet<_> = store.list_spent().iter().map(|n| n.id).collect();
        assert!(unspent.is_disjoint(&spent));
        assert_eq!(unspent.len() + spent.len(), notes.len());
    }

    #[test]
    fn test_snapshot_restore() {
        let store = NoteStore::new();
        let scheme = PoseidonScheme::new();
        let a = stored(&store, 11);
        stored(&store, 22);
        let hash = store.reveal_nullifier_hash(&a.id, &scheme).unwrap();
        store.apply_spend(&[(a.id, hash)], vec![]).unwrap();

        let snapshot = store.snapshot().unwrap();
        let (_, notes) = snapshot.notes;
        let (_, nullifiers) = snapshot.nullifiers;
        let restored = NoteStore::restore(Some(&notes), Some(&nullifiers)).unwrap();

        assert_eq!(restored.balance(), 22);
        assert!(restored.get(&a.id).unwrap().is_spent);
        assert!(restored.is_published(&hash));
        assert!(restored.contains_commitment(&a.commitment));
        assert!(!restored.notes_dirty().is_dirty());
    }

    #[test]
    fn test_snapshot_pairs_spent_flag_with_nullifier() {
        let store = NoteStore::new();
        let scheme = PoseidonScheme::new();
        let note = stored(&store, 40);
        let hash = store.reveal_nullifier_hash(&note.id, &scheme).unwrap();
        store.apply_spend(&[(note.id, hash)], vec![]).unwrap();

        let snapshot = store.snapshot().unwrap();
        assert_eq!(snapshot.notes.0, store.notes_dirty().version());
        assert_eq!(snapshot.nullifiers.0, store.nullifiers_dirty().version());

        let notes: Vec<PrivacyNote> = serde_json::from_slice(&snapshot.notes.1).unwrap();
        let published: BTreeSet<NullifierHash> =
            serde_json::from_slice(&snapshot.nullifiers.1).unwrap();
        assert!(published.contains(&hash));
        assert!(notes.iter().all(|n| n.id != note.id || n.is_spent));
    }
}
