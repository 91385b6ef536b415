//! In-memory engine state
//!
//! Every collection is an arena keyed by id plus a [`DirtyFlag`]. Mutations
//! touch the flag; `PrivacyContext::flush` snapshots dirty collections and
//! marks them clean at the snapshot's version, so a mutation racing the
//! flush keeps the collection dirty.

pub mod aliases;
pub mod history;
pub mod mode;
pub mod notes;

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

pub use aliases::{AliasAccount, AliasRegistry};
pub use history::{PrivacyTransaction, TransactionLog, TxId, TxKind, TxStatus};
pub use mode::{PrivacyMode, PrivacyModeController};
pub use notes::NoteStore;

/// Unix seconds
pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[derive(Debug, Default)]
pub struct DirtyFlag {
    version: AtomicU64,
    flushed: AtomicU64,
}

impl DirtyFlag {
    pub fn touch(&self) {
        self.version.fetch_add(1, Ordering::AcqRel);
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    pub fn is_dirty(&self) -> bool {
        self.version() != self.flushed.load(Ordering::Acquire)
    }

    /// Everything up to `version` is durable.
    pub fn mark_clean(&self, version: u64) {
        self.flushed.fetch_max(version, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dirty_flag_tracks_versions() {
        let flag = DirtyFlag::default();
        assert!(!flag.is_dirty());

        flag.touch();
        let snapshot = flag.version();
        flag.touch();
        flag.mark_clean(snapshot);
        assert!(flag.is_dirty(), "second touch is not yet flushed");

        flag.mark_clean(flag.version());
        assert!(!flag.is_dirty());
    }
}
