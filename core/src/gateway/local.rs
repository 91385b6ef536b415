//! In-memory shielded pool
//!
//! Plays the chain for development and tests:
//! - Note commitment Merkle tree with recent-root tolerance
//! - Published nullifier set for double-spend prevention
//! - Transparent balances for public transfers and withdraw payouts
//!
//! Submissions are checked the way the pool contract checks them. Call
//! counters and one-shot failure injection let tests observe and break the
//! network boundary.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use shroud_privacy::{
    Address, Amount, Commitment, CommitmentScheme, Digest, MerklePath, MerkleTree,
    NullifierHash, RootHistory, checked_sum,
};

use super::{ChainGateway, ChainReceipt, ShieldedSubmission, SubmittedOutput, TxHash};
use crate::error::ChainError;
use crate::prover::{ProofProvider, PublicInputs};

/// Maximum number of recent roots to keep for race condition tolerance
const ROOT_HISTORY_SIZE: usize = 100;

struct Pool {
    tree: MerkleTree,
    roots: RootHistory,
    commitments: HashSet<Commitment>,
    nullifiers: HashSet<NullifierHash>,
    balances: HashMap<Address, Amount>,
    /// Value currently locked in the pool
    locked: Amount,
    fees: Amount,
    tx_count: u64,
}

impl Pool {
    fn new() -> Self {
        let tree = MerkleTree::new();
        let mut roots = RootHistory::new(ROOT_HISTORY_SIZE);
        roots.push(tree.root());
        Self {
            tree,
            roots,
            commitments: HashSet::new(),
            nullifiers: HashSet::new(),
            balances: HashMap::new(),
            locked: 0,
            fees: 0,
            tx_count: 0,
        }
    }

    fn append(&mut self, commitment: Commitment) -> u64 {
        let index = self.tree.append(&commitment);
        self.commitments.insert(commitment);
        self.roots.push(self.tree.root());
        index
    }

    fn next_tx_hash(&mut self, payload: &[u8]) -> TxHash {
        self.tx_count += 1;
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.tx_count.to_le_bytes());
        hasher.update(payload);
        format!("0x{}", hasher.finalize().to_hex())
    }
}

#[derive(Debug, Default)]
struct Calls {
    total: AtomicU64,
    deposit: AtomicU64,
    submit: AtomicU64,
}

pub struct LocalChain {
    pool: Mutex<Pool>,
    scheme: Arc<dyn CommitmentScheme>,
    verifier: Option<Arc<dyn ProofProvider>>,
    latency: Option<Duration>,
    calls: Calls,
    fail_next_deposit: Mutex<Option<ChainError>>,
    fail_next_submit: Mutex<Option<ChainError>>,
}

impl LocalChain {
    pub fn new(scheme: Arc<dyn CommitmentScheme>) -> Self {
        Self {
            pool: Mutex::new(Pool::new()),
            scheme,
            verifier: None,
            latency: None,
            calls: Calls::default(),
            fail_next_deposit: Mutex::new(None),
            fail_next_submit: Mutex::new(None),
        }
    }

    /// Check every submitted proof with `verifier`
    pub fn with_verifier(mut self, verifier: Arc<dyn ProofProvider>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Simulated confirmation time for deposits and submissions
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Credit a public address
    pub fn fund(&self, address: Address, amount: Amount) {
        let mut pool = self.lock();
        let balance = pool.balances.entry(address).or_default();
        *balance = balance.saturating_add(amount);
    }

    pub fn balance_of(&self, address: &Address) -> Amount {
        self.lock().balances.get(address).copied().unwrap_or_default()
    }

    pub fn locked_value(&self) -> Amount {
        self.lock().locked
    }

    pub fn is_nullifier_published(&self, hash: &NullifierHash) -> bool {
        self.lock().nullifiers.contains(hash)
    }

    pub fn fail_next_deposit(&self, error: ChainError) {
        *self
            .fail_next_deposit
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(error);
    }

    pub fn fail_next_submit(&self, error: ChainError) {
        *self
            .fail_next_submit
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(error);
    }

    /// Every gateway call, reads included
    pub fn total_calls(&self) -> u64 {
        self.calls.total.load(Ordering::SeqCst)
    }

    pub fn deposit_calls(&self) -> u64 {
        self.calls.deposit.load(Ordering::SeqCst)
    }

    pub fn submit_calls(&self) -> u64 {
        self.calls.submit.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, Pool> {
        self.pool.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take_injected(slot: &Mutex<Option<ChainError>>) -> Option<ChainError> {
        slot.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    fn count(&self, counter: Option<&AtomicU64>) {
        self.calls.total.fetch_add(1, Ordering::SeqCst);
        if let Some(counter) = counter {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn confirmation_delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    /// Rebuild the statement the proof must satisfy from the submission
    fn public_inputs(&self, submission: &ShieldedSubmission) -> PublicInputs {
        let public = submission.public_output();
        PublicInputs {
            merkle_root: submission.merkle_root,
            nullifier_hashes: submission.nullifier_hashes.clone(),
            output_commitments: submission.shielded_outputs().copied().collect(),
            recipient_hash: public.map(|(recipient, _)| self.scheme.recipient_hash(&recipient)),
            public_amount: public.map(|(_, amount)| amount).unwrap_or_default(),
            fee: submission.fee,
        }
    }
}

#[async_trait]
impl ChainGateway for LocalChain {
    async fn deposit(
        &self,
        commitment: Commitment,
        value: Amount,
    ) -> Result<ChainReceipt, ChainError> {
        self.count(Some(&self.calls.deposit));
        self.confirmation_delay().await;

        if let Some(error) = Self::take_injected(&self.fail_next_deposit) {
            return Err(error);
        }

        let mut pool = self.lock();
        if pool.commitments.contains(&commitment) {
            return Err(ChainError::DuplicateCommitment(commitment));
        }
        pool.locked = pool
            .locked
            .checked_add(value)
            .ok_or_else(|| ChainError::Rejected("pool value overflow".into()))?;
        let index = pool.append(commitment);
        let tx_hash = pool.next_tx_hash(commitment.as_bytes());

        debug!("Deposit {} landed at leaf {}", tx_hash, index);
        Ok(ChainReceipt {
            tx_hash,
            leaf_indices: vec![index],
        })
    }

    async fn submit_withdraw_or_transfer(
        &self,
        submission: &ShieldedSubmission,
    ) -> Result<ChainReceipt, ChainError> {
        self.count(Some(&self.calls.submit));
        self.confirmation_delay().await;

        if let Some(error) = Self::take_injected(&self.fail_next_submit) {
            return Err(error);
        }

        if let Some(verifier) = &self.verifier {
            let statement = self.public_inputs(submission);
            let valid = verifier
                .verify_proof(&submission.proof, &statement)
                .await
                .map_err(|e| ChainError::Rejected(e.to_string()))?;
            if !valid {
                return Err(ChainError::InvalidProof);
            }
        }

        let mut pool = self.lock();

        if !pool.roots.is_valid(&submission.merkle_root) {
            return Err(ChainError::UnknownRoot);
        }

        let mut seen = HashSet::new();
        for hash in &submission.nullifier_hashes {
            if pool.nullifiers.contains(hash) || !seen.insert(*hash) {
                return Err(ChainError::NullifierAlreadyPublished(*hash));
            }
        }

        let mut fresh = HashSet::new();
        for commitment in submission.shielded_outputs() {
            if pool.commitments.contains(commitment) || !fresh.insert(*commitment) {
                return Err(ChainError::DuplicateCommitment(*commitment));
            }
        }

        let public = submission.public_output();
        let released = checked_sum(
            [public.map(|(_, amount)| amount).unwrap_or_default(), submission.fee],
        )
        .filter(|released| *released <= pool.locked)
        .ok_or_else(|| ChainError::Rejected("release exceeds pool value".into()))?;

        pool.nullifiers.extend(submission.nullifier_hashes.iter().copied());
        let leaf_indices = submission
            .outputs
            .iter()
            .filter_map(|output| match output {
                SubmittedOutput::Shielded(commitment) => Some(*commitment),
                SubmittedOutput::Public { .. } => None,
            })
            .map(|commitment| pool.append(commitment))
            .collect();

        pool.locked -= released;
        pool.fees = pool.fees.saturating_add(submission.fee);
        if let Some((recipient, amount)) = public {
            let balance = pool.balances.entry(recipient).or_default();
            *balance = balance.saturating_add(amount);
        }

        let tx_hash = pool.next_tx_hash(&submission.proof.bytes);
        info!(
            "Shielded tx {} confirmed: {} nullifiers, {} outputs",
            tx_hash,
            submission.nullifier_hashes.len(),
            submission.outputs.len()
        );
        Ok(ChainReceipt {
            tx_hash,
            leaf_indices,
        })
    }

    async fn merkle_root(&self) -> Result<Digest, ChainError> {
        self.count(None);
        Ok(self.lock().tree.root())
    }

    async fn merkle_proof(
        &self,
        commitment: &Commitment,
        index: u64,
    ) -> Result<MerklePath, ChainError> {
        self.count(None);
        let pool = self.lock();
        if pool.tree.get(index).as_ref() != Some(commitment) {
            return Err(ChainError::CommitmentNotFound(index));
        }
        pool.tree
            .path(index)
            .ok_or(ChainError::CommitmentNotFound(index))
    }

    async fn anonymity_set_size(&self) -> Result<u64, ChainError> {
        self.count(None);
        Ok(self.lock().tree.len())
    }

    async fn public_transfer(
        &self,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> Result<TxHash, ChainError> {
        self.count(None);
        let mut pool = self.lock();

        let balance = pool.balances.get(&from).copied().unwrap_or_default();
        if balance < amount {
            return Err(ChainError::InsufficientBalance {
                address: from,
                balance,
                requested: amount,
            });
        }
        pool.balances.insert(from, balance - amount);
        let credited = pool.balances.entry(to).or_default();
        *credited = credited.saturating_add(amount);

        let mut payload = Vec::with_capacity(56);
        payload.extend_from_slice(from.as_bytes());
        payload.extend_from_slice(to.as_bytes());
        payload.extend_from_slice(&amount.to_le_bytes());
        Ok(pool.next_tx_hash(&payload))
    }
}
