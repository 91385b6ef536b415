//! Transaction Orchestrator
//!
//! Runs the four transaction flows against the engine context and the two
//! external collaborators.
//!
//! ```text
//! ┌────────────┐   ┌─────────┐   ┌────────────┐   ┌───────────┐
//! │ VALIDATING │──>│ PROVING │──>│ SUBMITTING │──>│ CONFIRMED │
//! └────────────┘   └─────────┘   └────────────┘   └───────────┘
//!        │              │               │         ┌───────────┐
//!        └──────────────┴───────────────┴────────>│  FAILED   │
//!                                                 └───────────┘
//! ```
//!
//! Notes, aliases and history change only on entry to CONFIRMED (history
//! also records FAILED after validation). From SUBMITTING on, the flow runs
//! on its own task and owns its note locks, so dropping the caller's future
//! cannot abandon a submitted transaction half-applied.

mod deposit;
mod locks;
mod shielded;

pub use deposit::DepositRequest;
pub use locks::{NoteLockGuard, NoteLocks};
pub use shielded::{TransferOutput, TransferRequest, WithdrawRequest};

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use rand::rngs::OsRng;
use shroud_privacy::{Address, Amount, PrivacyNote};

use crate::context::PrivacyContext;
use crate::error::{ChainError, PrivacyError, PrivacyResult, ProofError, ValidationError};
use crate::gateway::{ChainGateway, TxHash};
use crate::prover::{GeneratedProof, ProofProvider, ProofRequest};
use crate::state::{PrivacyTransaction, TxId, TxKind};

/// Bounded exponential backoff for transient proof failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based): base * 2^attempt
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Validating,
    Proving,
    Submitting,
    Confirmed,
    Failed,
}

/// Per-transaction state machine
#[derive(Debug)]
pub(crate) struct Flow {
    id: TxId,
    kind: TxKind,
    state: FlowState,
}

impl Flow {
    fn new(kind: TxKind) -> Self {
        let id = TxId::random(&mut OsRng);
        debug!("{:?} {} entering {:?}", kind, id, FlowState::Validating);
        Self {
            id,
            kind,
            state: FlowState::Validating,
        }
    }

    fn advance(&mut self, next: FlowState) {
        debug!("{:?} {}: {:?} -> {:?}", self.kind, self.id, self.state, next);
        self.state = next;
    }

    fn fail(&mut self, err: &PrivacyError) {
        if matches!(err, PrivacyError::Chain(_)) {
            error!("{:?} {} failed at {:?}: {}", self.kind, self.id, self.state, err);
        } else {
            warn!("{:?} {} failed at {:?}: {}", self.kind, self.id, self.state, err);
        }
        self.state = FlowState::Failed;
    }
}

/// A confirmed transaction and the notes it created
#[derive(Debug, Clone)]
pub struct FlowReceipt {
    pub transaction: PrivacyTransaction,
    pub notes: Vec<PrivacyNote>,
}

#[derive(Clone)]
pub struct TransactionOrchestrator {
    ctx: Arc<PrivacyContext>,
    chain: Arc<dyn ChainGateway>,
    prover: Arc<dyn ProofProvider>,
    locks: NoteLocks,
    retry: RetryPolicy,
}

impl TransactionOrchestrator {
    pub fn new(
        ctx: Arc<PrivacyContext>,
        chain: Arc<dyn ChainGateway>,
        prover: Arc<dyn ProofProvider>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            ctx,
            chain,
            prover,
            locks: NoteLocks::new(),
            retry,
        }
    }

    pub fn context(&self) -> &Arc<PrivacyContext> {
        &self.ctx
    }

    pub fn locks(&self) -> &NoteLocks {
        &self.locks
    }

    /// Public to public. Passed straight through; no private state moves.
    pub async fn public_transfer(
        &self,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> PrivacyResult<TxHash> {
        if amount == 0 {
            return Err(ValidationError::ZeroAmount.into());
        }
        if from.is_zero() || to.is_zero() {
            return Err(ValidationError::ZeroAddress.into());
        }
        let tx_hash = self.chain.public_transfer(from, to, amount).await?;
        info!("Public transfer {} confirmed", tx_hash);
        Ok(tx_hash)
    }

    /// Generate and locally verify a proof, retrying transient failures
    async fn prove_with_retry(&self, request: &ProofRequest) -> Result<GeneratedProof, ProofError> {
        let mut attempt = 0;
        loop {
            let result = match self.prover.generate_proof(request).await {
                Ok(generated) => {
                    match self
                        .prover
                        .verify_proof(&generated.proof, &generated.public_inputs)
                        .await
                    {
                        Ok(true) if generated.public_inputs == request.public_inputs => {
                            Ok(generated)
                        }
                        Ok(_) => Err(ProofError::Rejected),
                        Err(e) => Err(e),
                    }
                }
                Err(e) => Err(e),
            };

            match result {
                Ok(generated) => return Ok(generated),
                Err(e) if e.is_transient() && attempt < self.retry.max_retries => {
                    let delay = self.retry.delay(attempt);
                    attempt += 1;
                    warn!(
                        "Proof attempt {}/{} failed: {} (retrying in {:?})",
                        attempt,
                        self.retry.max_retries + 1,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Pool size after a confirmation, falling back to the highest new leaf
    async fn anonymity_set_after(&self, leaf_indices: &[u64]) -> u64 {
        match self.chain.anonymity_set_size().await {
            Ok(size) => size,
            Err(e) => {
                let fallback = leaf_indices.iter().max().map_or(0, |i| i + 1);
                warn!("Anonymity set size unavailable ({}), using {}", e, fallback);
                fallback
            }
        }
    }

    fn flush_after_confirm(&self, id: &TxId) {
        if let Err(e) = self.ctx.flush() {
            // state stays dirty and goes out with the next flush
            error!("Failed to persist confirmed transaction {}: {}", id, e);
        }
    }

    fn flush_after_failure(&self) {
        if let Err(e) = self.ctx.flush() {
            warn!("Failed to persist failed transaction record: {}", e);
        }
    }
}

/// Wait for a submission task
async fn join_submission<T>(handle: tokio::task::JoinHandle<PrivacyResult<T>>) -> PrivacyResult<T> {
    handle.await.map_err(|e| {
        PrivacyError::Chain(ChainError::Unavailable(format!(
            "submission task ended early: {e}"
        )))
    })?
}
