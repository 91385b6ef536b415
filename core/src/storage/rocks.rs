use std::path::Path;
use std::sync::Arc;

use rocksdb::{ColumnFamilyDescriptor, DB, Options, WriteBatch};

use super::PersistenceLayer;
use crate::error::StorageError;

const CF_PRIVACY: &str = "privacy";

/// A thread-safe wrapper around RocksDB.
#[derive(Clone)]
pub struct RocksDbStore {
    db: Arc<DB>,
}

impl RocksDbStore {
    /// Opens the database at the specified path, creating it if missing.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let families = vec![ColumnFamilyDescriptor::new(CF_PRIVACY, Options::default())];

        let db = DB::open_cf_descriptors(&opts, path, families)?;

        Ok(Self { db: Arc::new(db) })
    }
}

impl PersistenceLayer for RocksDbStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let cf = self
            .db
            .cf_handle(CF_PRIVACY)
            .ok_or(StorageError::MissingColumnFamily(CF_PRIVACY))?;

        Ok(self.db.get_cf(cf, key.as_bytes())?)
    }

    fn store(&self, key: &str, blob: &[u8]) -> Result<(), StorageError> {
        let cf = self
            .db
            .cf_handle(CF_PRIVACY)
            .ok_or(StorageError::MissingColumnFamily(CF_PRIVACY))?;

        self.db.put_cf(cf, key.as_bytes(), blob)?;
        Ok(())
    }

    fn store_many(&self, entries: &[(&str, Vec<u8>)]) -> Result<(), StorageError> {
        let cf = self
            .db
            .cf_handle(CF_PRIVACY)
            .ok_or(StorageError::MissingColumnFamily(CF_PRIVACY))?;

        let mut batch = WriteBatch::default();
        for (key, blob) in entries {
            batch.put_cf(cf, key.as_bytes(), blob);
        }
        self.db.write(batch)?;
        Ok(())
    }
}
