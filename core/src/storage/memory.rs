use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use super::PersistenceLayer;
use crate::error::StorageError;

/// In-process blob store for tests and ephemeral engines.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    writes: Mutex<u64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of write calls seen (each `store_many` counts once)
    pub fn write_count(&self) -> u64 {
        *self.writes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    fn bump(&self) {
        *self.writes.lock().unwrap_or_else(PoisonError::into_inner) += 1;
    }
}

impl PersistenceLayer for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self
            .blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    fn store(&self, key: &str, blob: &[u8]) -> Result<(), StorageError> {
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), blob.to_vec());
        self.bump();
        Ok(())
    }

    fn store_many(&self, entries: &[(&str, Vec<u8>)]) -> Result<(), StorageError> {
        let mut blobs = self.blobs.lock().unwrap_or_else(PoisonError::into_inner);
        for (key, blob) in entries {
            blobs.insert((*key).to_string(), blob.clone());
        }
        drop(blobs);
        self.bump();
        Ok(())
    }
}
