//! Alias registry
//!
//! Alias accounts are the public face of the shielded pool. Each one owns a
//! freshly sampled key (never derived from the wallet key) and a bonding
//! commitment in the pool. Records are created only after the bond is
//! confirmed on chain and are never deleted, only deactivated.

use std::collections::BTreeSet;
use std::fmt;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use log::info;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use shroud_privacy::{
    Address, AliasKeys, Amount, Commitment, CommitmentScheme, NoteSecret, Nullifier,
    PrivacyFactors, score,
};

use super::{DirtyFlag, now_secs};
use crate::error::{PrivacyResult, StateError, StorageError, ValidationError};
use crate::gateway::ChainGateway;

/// Secret material behind an alias
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasSecrets {
    #[serde(with = "hex::serde")]
    pub signing_key: [u8; 32],
    pub bond_secret: NoteSecret,
    pub bond_nullifier: Nullifier,
}

impl fmt::Debug for AliasSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AliasSecrets(..)")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasAccount {
    pub address: Address,
    #[serde(with = "hex::serde")]
    pub public_key: [u8; 32],
    /// Bonding commitment linking the alias to the pool
    pub commitment: Commitment,
    pub bond_index: Option<u64>,
    #[serde(with = "shroud_privacy::amount")]
    pub bond_value: Amount,
    #[serde(with = "shroud_privacy::amount")]
    pub total_deposits: Amount,
    #[serde(with = "shroud_privacy::amount")]
    pub total_withdrawals: Amount,
    pub created_at: u64,
    pub is_active: bool,
    pub privacy_score: u8,
    pub anonymity_set_at_creation: u64,
    pub last_used_at: u64,
    /// Distinct public addresses this alias has paid out to
    pub counterparties: BTreeSet<Address>,
    /// Shielded transfers routed through this alias
    pub mixing_rounds: u32,
    pub label: Option<String>,
    pub secrets: AliasSecrets,
}

impl AliasAccount {
    pub fn keys(&self) -> AliasKeys {
        AliasKeys::from_secret_bytes(&self.secrets.signing_key)
    }

    pub fn privacy_factors(&self, now: u64) -> PrivacyFactors {
        PrivacyFactors {
            anonymity_set: self.anonymity_set_at_creation,
            elapsed_secs: now.saturating_sub(self.last_used_at),
            counterparties: u32::try_from(self.counterparties.len()).unwrap_or(u32::MAX),
            mixing_rounds: self.mixing_rounds,
        }
    }
}

/// Caller-supplied alias details
#[derive(Debug, Clone, Default)]
pub struct AliasMetadata {
    pub label: Option<String>,
}

#[derive(Debug, Default)]
pub struct AliasRegistry {
    aliases: DashMap<Address, AliasAccount>,
    dirty: DirtyFlag,
}

impl AliasRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an alias with fresh keys and bond it into the pool.
    ///
    /// Nothing is recorded unless the bond deposit confirms.
    pub async fn create_alias(
        &self,
        metadata: AliasMetadata,
        scheme: &dyn CommitmentScheme,
        chain: &dyn ChainGateway,
        bond_value: Amount,
    ) -> PrivacyResult<AliasAccount> {
        let keys = AliasKeys::generate(&mut OsRng);
        let address = keys.address();
        let bond_secret = NoteSecret::random(&mut OsRng);
        let bond_nullifier = Nullifier::random(&mut OsRng);
        let commitment =
            scheme.commitment(&bond_secret, &bond_nullifier, bond_value, Some(&address));

        let receipt = chain.deposit(commitment, bond_value).await?;
        let anonymity_set = chain.anonymity_set_size().await?;

        let now = now_secs();
        let mut account = AliasAccount {
            address,
            public_key: keys.public_key(),
            commitment,
            bond_index: receipt.leaf_indices.first().copied(),
            bond_value,
            total_deposits: 0,
            total_withdrawals: 0,
            created_at: now,
            is_active: true,
            privacy_score: 0,
            anonymity_set_at_creation: anonymity_set,
            last_used_at: now,
            counterparties: BTreeSet::new(),
            mixing_rounds: 0,
            label: metadata.label,
            secrets: AliasSecrets {
                signing_key: keys.secret_bytes(),
                bond_secret,
                bond_nullifier,
            },
        };
        account.privacy_score = score(&account.privacy_factors(now));

        self.insert(account.clone())?;
        info!("Alias {} bonded in {}", address, receipt.tx_hash);
        Ok(account)
    }

    pub fn insert(&self, account: AliasAccount) -> Result<(), StateError> {
        match self.aliases.entry(account.address) {
            Entry::Occupied(_) => Err(StateError::DuplicateAlias(account.address)),
            Entry::Vacant(slot) => {
                slot.insert(account);
                self.dirty.touch();
                Ok(())
            }
        }
    }

    pub fn get(&self, address: &Address) -> Option<AliasAccount> {
        self.aliases.get(address).map(|entry| entry.clone())
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.aliases.contains_key(address)
    }

    /// Fails unless `address` is a registered, active alias
    pub fn require_active(&self, address: &Address) -> Result<(), StateError> {
        let account = self
            .aliases
            .get(address)
            .ok_or(StateError::AliasNotFound(*address))?;
        if !account.is_active {
            return Err(StateError::AliasInactive(*address));
        }
        Ok(())
    }

    /// Add to the deposit counter. Counters only ever grow.
    pub fn record_deposit(&self, address: &Address, amount: Amount) -> PrivacyResult<()> {
        self.update(address, |account| {
            account.total_deposits = account
                .total_deposits
                .checked_add(amount)
                .ok_or(ValidationError::AmountOverflow)?;
            Ok(())
        })
    }

    pub fn record_withdrawal(
        &self,
        address: &Address,
        amount: Amount,
        counterparty: Option<Address>,
    ) -> PrivacyResult<()> {
        self.update(address, |account| {
            account.total_withdrawals = account
                .total_withdrawals
                .checked_add(amount)
                .ok_or(ValidationError::AmountOverflow)?;
            if let Some(counterparty) = counterparty {
                account.counterparties.insert(counterparty);
            }
            Ok(())
        })
    }

    /// A shielded transfer was routed through this alias
    pub fn record_mixing(&self, address: &Address) -> PrivacyResult<()> {
        self.update(address, |account| {
            account.mixing_rounds = account.mixing_rounds.saturating_add(1);
            Ok(())
        })
    }

    /// Stop accepting new value. History stays.
    pub fn deactivate(&self, address: &Address) -> Result<AliasAccount, StateError> {
        let mut account = self
            .aliases
            .get_mut(address)
            .ok_or(StateError::AliasNotFound(*address))?;
        if !account.is_active {
            return Err(StateError::AliasInactive(*address));
        }
        account.is_active = false;
        let snapshot = account.clone();
        drop(account);
        self.dirty.touch();
        Ok(snapshot)
    }

    /// Current score, measured at `now` without recording a use
    pub fn score_at(&self, address: &Address, now: u64) -> Result<u8, StateError> {
        self.aliases
            .get(address)
            .map(|account| score(&account.privacy_factors(now)))
            .ok_or(StateError::AliasNotFound(*address))
    }

    pub fn list(&self) -> Vec<AliasAccount> {
        let mut all: Vec<_> = self.aliases.iter().map(|entry| entry.clone()).collect();
        all.sort_by_key(|account| (account.created_at, account.address));
        all
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }

    pub fn dirty(&self) -> &DirtyFlag {
        &self.dirty
    }

    pub fn snapshot(&self) -> Result<(u64, Vec<u8>), StorageError> {
        let version = self.dirty.version();
        Ok((version, serde_json::to_vec(&self.list())?))
    }

    pub fn restore(blob: &[u8]) -> Result<Self, StorageError> {
        let records: Vec<AliasAccount> = serde_json::from_slice(blob)?;
        Ok(Self {
            aliases: records.into_iter().map(|a| (a.address, a)).collect(),
            dirty: DirtyFlag::default(),
        })
    }

    /// Apply a confirmed use, then recompute the score.
    fn update(
        &self,
        address: &Address,
        apply: impl FnOnce(&mut AliasAccount) -> PrivacyResult<()>,
    ) -> PrivacyResult<()> {
        let mut account = self
            .aliases
            .get_mut(address)
            .ok_or(StateError::AliasNotFound(*address))?;
        apply(account.value_mut())?;

        // score reflects the idle time that just ended
        let now = now_secs();
        account.privacy_score = score(&account.privacy_factors(now));
        account.last_used_at = now;
        drop(account);

        self.dirty.touch();
        Ok(())
    }
}
