//! Public/private display mode
//!
//! Advisory only: the flag tells the presentation layer which balances to
//! show. Nothing here touches notes or aliases.

use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use super::DirtyFlag;
use crate::error::StorageError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrivacyMode {
    #[default]
    Public,
    Private,
}

impl PrivacyMode {
    pub fn flipped(self) -> Self {
        match self {
            Self::Public => Self::Private,
            Self::Private => Self::Public,
        }
    }
}

impl fmt::Display for PrivacyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Public => f.write_str("public"),
            Self::Private => f.write_str("private"),
        }
    }
}

impl FromStr for PrivacyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "public" => Ok(Self::Public),
            "private" => Ok(Self::Private),
            other => Err(format!("unknown privacy mode: {other}")),
        }
    }
}

#[derive(Debug, Default)]
pub struct PrivacyModeController {
    mode: Mutex<PrivacyMode>,
    dirty: DirtyFlag,
}

impl PrivacyModeController {
    pub fn new(mode: PrivacyMode) -> Self {
        Self {
            mode: Mutex::new(mode),
            dirty: DirtyFlag::default(),
        }
    }

    pub fn current(&self) -> PrivacyMode {
        *self.mode.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Flip the mode and return the new one
    pub fn toggle(&self) -> PrivacyMode {
        let mut mode = self.mode.lock().unwrap_or_else(PoisonError::into_inner);
        *mode = mode.flipped();
        let flipped = *mode;
        drop(mode);
        self.dirty.touch();
        flipped
    }

    pub fn set(&self, mode: PrivacyMode) {
        let mut current = self.mode.lock().unwrap_or_else(PoisonError::into_inner);
        if *current != mode {
            *current = mode;
            drop(current);
            self.dirty.touch();
        }
    }

    pub fn dirty(&self) -> &DirtyFlag {
        &self.dirty
    }

    pub fn snapshot(&self) -> Result<(u64, Vec<u8>), StorageError> {
        let version = self.dirty.version();
        Ok((version, serde_json::to_vec(&self.current())?))
    }

    pub fn restore(blob: &[u8]) -> Result<Self, StorageError> {
        Ok(Self::new(serde_json::from_slice(blob)?))
    }
}
