//! In-process prover for development and tests.
//!
//! Checks the witness the way the spend circuit would, then emits a keyed
//! BLAKE3 digest of the public-input transcript as the proof bytes. Any
//! change to the public inputs invalidates the proof.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use shroud_privacy::{CommitmentScheme, checked_sum};

use super::{GeneratedProof, Proof, ProofProvider, ProofRequest, PublicInputs};
use crate::error::ProofError;

const PROVER_KEY_CONTEXT: &str = "shroud local prover 2026 spend proof";

pub struct LocalProver {
    scheme: Arc<dyn CommitmentScheme>,
    key: [u8; 32],
    latency: Option<Duration>,
    /// Remaining injected transient failures
    fail_next: AtomicU32,
    generate_calls: AtomicU64,
    verify_calls: AtomicU64,
}

impl LocalProver {
    pub fn new(scheme: Arc<dyn CommitmentScheme>) -> Self {
        Self {
            scheme,
            key: blake3::derive_key(PROVER_KEY_CONTEXT, b"v1"),
            latency: None,
            fail_next: AtomicU32::new(0),
            generate_calls: AtomicU64::new(0),
            verify_calls: AtomicU64::new(0),
        }
    }

    /// Simulated proving time (for testing)
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make the next `n` generate calls fail with a transient error
    pub fn fail_next(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub fn generate_calls(&self) -> u64 {
        self.generate_calls.load(Ordering::SeqCst)
    }

    pub fn verify_calls(&self) -> u64 {
        self.verify_calls.load(Ordering::SeqCst)
    }

    fn sign(&self, public_inputs: &PublicInputs) -> Vec<u8> {
        blake3::keyed_hash(&self.key, &public_inputs.transcript())
            .as_bytes()
            .to_vec()
    }

    fn check_witness(&self, request: &ProofRequest) -> Result<(), ProofError> {
        let public = &request.public_inputs;
        let witness = &request.witness;
        let invalid = |reason: &str| ProofError::InvalidWitness(reason.to_string());

        if witness.inputs.is_empty() {
            return Err(invalid("no inputs"));
        }
        if witness.inputs.len() != public.nullifier_hashes.len() {
            return Err(invalid("input count mismatch"));
        }
        if witness.outputs.len() != public.output_commitments.len() {
            return Err(invalid("output count mismatch"));
        }

        for (input, expected) in witness.inputs.iter().zip(&public.nullifier_hashes) {
            let commitment = self.scheme.commitment(
                &input.secret,
                &input.nullifier,
                input.amount,
                input.recipient.as_ref(),
            );
            if !input.path.verify(&commitment, &public.merkle_root) {
                return Err(invalid("merkle path does not reach root"));
            }
            if &self.scheme.nullifier_hash(&input.nullifier, &input.secret) != expected {
                return Err(invalid("nullifier hash mismatch"));
            }
        }

        for (output, expected) in witness.outputs.iter().zip(&public.output_commitments) {
            let commitment = self.scheme.commitment(
                &output.secret,
                &output.nullifier,
                output.amount,
                output.recipient.as_ref(),
            );
            if &commitment != expected {
                return Err(invalid("output commitment mismatch"));
            }
        }

        match (&witness.public_recipient, &public.recipient_hash) {
            (Some(recipient), Some(hash)) if &self.scheme.recipient_hash(recipient) == hash => {}
            (None, None) if public.public_amount == 0 => {}
            _ => return Err(invalid("recipient binding mismatch")),
        }

        let inputs = checked_sum(witness.inputs.iter().map(|i| i.amount))
            .ok_or_else(|| invalid("input overflow"))?;
        let spent = checked_sum(
            witness
                .outputs
                .iter()
                .map(|o| o.amount)
                .chain([public.public_amount, public.fee]),
        )
        .ok_or_else(|| invalid("output overflow"))?;
        if inputs != spent {
            return Err(invalid("value not conserved"));
        }

        Ok(())
    }
}

#[async_trait]
impl ProofProvider for LocalProver {
    async fn generate_proof(&self, request: &ProofRequest) -> Result<GeneratedProof, ProofError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let injected = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(ProofError::Unavailable("injected prover failure".into()));
        }

        self.check_witness(request)?;

        Ok(GeneratedProof {
            proof: Proof::new(self.sign(&request.public_inputs)),
            public_inputs: request.public_inputs.clone(),
        })
    }

    async fn verify_proof(
        &self,
        proof: &Proof,
        public_inputs: &PublicInputs,
    ) -> Result<bool, ProofError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        Ok(proof.bytes == self.sign(public_inputs))
    }
}
