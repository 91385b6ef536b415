//! Persistence
//!
//! Durable keyed JSON blobs. Each engine collection (notes, nullifiers,
//! aliases, transactions, mode, settings) is one key, so replacing a
//! collection is a single atomic write. `store_many` commits several
//! collections together.

pub mod memory;
pub mod rocks;

pub use memory::MemoryStore;
pub use rocks::RocksDbStore;

use crate::error::StorageError;

pub const KEY_NOTES: &str = "notes";
pub const KEY_NULLIFIERS: &str = "nullifiers";
pub const KEY_ALIASES: &str = "aliases";
pub const KEY_TRANSACTIONS: &str = "transactions";
pub const KEY_MODE: &str = "mode";
pub const KEY_SETTINGS: &str = "settings";

/// decoupling the engine from the database
pub trait PersistenceLayer: Send + Sync {
    /// Read a blob. `None` if the key was never written.
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Replace a blob.
    fn store(&self, key: &str, blob: &[u8]) -> Result<(), StorageError>;

    /// Replace several blobs atomically.
    fn store_many(&self, entries: &[(&str, Vec<u8>)]) -> Result<(), StorageError>;
}
