//! Engine context
//!
//! One `PrivacyContext` owns every in-memory collection, the commitment
//! scheme, the runtime settings and the persistence handle. It is built
//! once (rehydrated from the last snapshot) and shared by reference.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use log::{debug, info};
use shroud_privacy::CommitmentScheme;

use crate::config::PrivacySettings;
use crate::error::{PrivacyResult, StorageError};
use crate::state::{
    AliasRegistry, DirtyFlag, NoteStore, PrivacyModeController, TransactionLog,
};
use crate::storage::{
    KEY_ALIASES, KEY_MODE, KEY_NOTES, KEY_NULLIFIERS, KEY_SETTINGS, KEY_TRANSACTIONS,
    PersistenceLayer,
};

type Snapshot = (&'static str, u64, Vec<u8>);

pub struct PrivacyContext {
    pub scheme: Arc<dyn CommitmentScheme>,
    pub notes: NoteStore,
    pub aliases: AliasRegistry,
    pub history: TransactionLog,
    pub mode: PrivacyModeController,
    settings: RwLock<PrivacySettings>,
    settings_dirty: DirtyFlag,
    persistence: Arc<dyn PersistenceLayer>,
    /// Serializes flushes so an older snapshot never overwrites a newer one
    flush_lock: Mutex<()>,
}

impl PrivacyContext {
    /// Rehydrate from `persistence`. Collections never written start
    /// empty; settings and mode fall back to `defaults`.
    pub fn open(
        persistence: Arc<dyn PersistenceLayer>,
        scheme: Arc<dyn CommitmentScheme>,
        defaults: PrivacySettings,
    ) -> PrivacyResult<Self> {
        let notes_blob = persistence.load(KEY_NOTES)?;
        let nullifiers_blob = persistence.load(KEY_NULLIFIERS)?;
        let notes = NoteStore::restore(notes_blob.as_deref(), nullifiers_blob.as_deref())?;

        let aliases = match persistence.load(KEY_ALIASES)? {
            Some(blob) => AliasRegistry::restore(&blob)?,
            None => AliasRegistry::new(),
        };
        let history = match persistence.load(KEY_TRANSACTIONS)? {
            Some(blob) => TransactionLog::restore(&blob)?,
            None => TransactionLog::new(),
        };
        let settings = match persistence.load(KEY_SETTINGS)? {
            Some(blob) => serde_json::from_slice(&blob).map_err(StorageError::from)?,
            None => defaults,
        };
        let mode = match persistence.load(KEY_MODE)? {
            Some(blob) => PrivacyModeController::restore(&blob)?,
            None => PrivacyModeController::new(settings.mode),
        };

        info!(
            "Loaded privacy state: {} notes, {} aliases, {} transactions",
            notes.len(),
            aliases.len(),
            history.len()
        );

        Ok(Self {
            scheme,
            notes,
            aliases,
            history,
            mode,
            settings: RwLock::new(settings),
            settings_dirty: DirtyFlag::default(),
            persistence,
            flush_lock: Mutex::new(()),
        })
    }

    pub fn settings(&self) -> PrivacySettings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn replace_settings(&self, settings: PrivacySettings) {
        *self.settings.write().unwrap_or_else(PoisonError::into_inner) = settings;
        self.settings_dirty.touch();
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty_flags().iter().any(|(_, flag)| flag.is_dirty())
    }

    /// Write every dirty collection in one atomic batch.
    pub fn flush(&self) -> PrivacyResult<()> {
        let _serial = self.flush_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut snapshots: Vec<Snapshot> = Vec::new();
        // notes and nullifiers always go out as one consistent pair
        if self.notes.notes_dirty().is_dirty() || self.notes.nullifiers_dirty().is_dirty() {
            let pair = self.notes.snapshot()?;
            snapshots.push((KEY_NOTES, pair.notes.0, pair.notes.1));
            snapshots.push((KEY_NULLIFIERS, pair.nullifiers.0, pair.nullifiers.1));
        }
        for (key, flag) in self.dirty_flags() {
            if key == KEY_NOTES || key == KEY_NULLIFIERS {
                continue;
            }
            if flag.is_dirty() {
                let (version, blob) = self.snapshot(key)?;
                snapshots.push((key, version, blob));
            }
        }
        if snapshots.is_empty() {
            return Ok(());
        }

        let entries: Vec<(&str, Vec<u8>)> = snapshots
            .iter()
            .map(|(key, _, blob)| (*key, blob.clone()))
            .collect();
        self.persistence.store_many(&entries)?;

        for (key, version, _) in &snapshots {
            if let Some((_, flag)) = self.dirty_flags().into_iter().find(|(k, _)| k == key) {
                flag.mark_clean(*version);
            }
        }
        debug!("Flushed {} collections", snapshots.len());
        Ok(())
    }

    fn dirty_flags(&self) -> [(&'static str, &DirtyFlag); 6] {
        [
            (KEY_NOTES, self.notes.notes_dirty()),
            (KEY_NULLIFIERS, self.notes.nullifiers_dirty()),
            (KEY_ALIASES, self.aliases.dirty()),
            (KEY_TRANSACTIONS, self.history.dirty()),
            (KEY_MODE, self.mode.dirty()),
            (KEY_SETTINGS, &self.settings_dirty),
        ]
    }

    fn snapshot(&self, key: &'static str) -> Result<(u64, Vec<u8>), StorageError> {
        match key {
            KEY_ALIASES => self.aliases.snapshot(),
            KEY_TRANSACTIONS => self.history.snapshot(),
            KEY_MODE => self.mode.snapshot(),
            _ => {
                let settings = self.settings.read().unwrap_or_else(PoisonError::into_inner);
                let version = self.settings_dirty.version();
                Ok((version, serde_json::to_vec(&*settings)?))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::PrivacyMode;
    use crate::storage::MemoryStore;
    use shroud_privacy::{NullifierHash, PoseidonScheme};

    fn open(store: &Arc<MemoryStore>) -> PrivacyContext {
        PrivacyContext::open(
            store.clone(),
            Arc::new(PoseidonScheme::new()),
            PrivacySettings::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_fresh_context_is_clean() {
        let store = Arc::new(MemoryStore::new());
        let ctx = open(&store);
        assert!(!ctx.is_dirty());
        ctx.flush().unwrap();
        assert_eq!(store.write_count(), 0);
    }

    #[test]
    fn test_flush_writes_only_dirty_collections() {
        let store = Arc::new(MemoryStore::new());
        let ctx = open(&store);

        ctx.mode.toggle();
        ctx.flush().unwrap();

        assert!(store.contains(KEY_MODE));
        assert!(!store.contains(KEY_NOTES));
        assert!(!ctx.is_dirty());
    }

    #[test]
    fn test_nullifier_change_flushes_notes_alongside() {
        let store = Arc::new(MemoryStore::new());
        let ctx = open(&store);

        ctx.notes.publish(NullifierHash([5u8; 32]));
        assert!(!ctx.notes.notes_dirty().is_dirty());
        ctx.flush().unwrap();

        assert!(store.contains(KEY_NULLIFIERS));
        assert!(store.contains(KEY_NOTES));
        assert_eq!(store.write_count(), 1);
        assert!(!ctx.is_dirty());

        let reopened = open(&store);
        assert!(reopened.notes.is_published(&NullifierHash([5u8; 32])));
    }

    #[test]
    fn test_reopen_restores_mode_and_settings() {
        let store = Arc::new(MemoryStore::new());
        {
            let ctx = open(&store);
            ctx.mode.set(PrivacyMode::Private);
            ctx.replace_settings(PrivacySettings {
                anonymity_set_preference: 7,
                ..PrivacySettings::default()
            });
            ctx.flush().unwrap();
        }

        let ctx = open(&store);
        assert_eq!(ctx.mode.current(), PrivacyMode::Private);
        assert_eq!(ctx.settings().anonymity_set_preference, 7);
    }

    #[test]
    fn test_mode_defaults_from_settings() {
        let store = Arc::new(MemoryStore::new());
        let ctx = PrivacyContext::open(
            store,
            Arc::new(PoseidonScheme::new()),
            PrivacySettings {
                mode: PrivacyMode::Private,
                ..PrivacySettings::default()
            },
        )
        .unwrap();
        assert_eq!(ctx.mode.current(), PrivacyMode::Private);
    }
}
