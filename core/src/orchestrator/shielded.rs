//! Shielded transfer (private → private) and withdraw (private → public)
//!
//! Both spend one or more notes under a single joint proof. They differ
//! only in where value goes: a transfer creates new note commitments, a
//! withdraw releases value to a public address whose hash the proof binds,
//! optionally returning change to an alias as a new note.

use std::collections::HashSet;

use log::{info, warn};
use shroud_privacy::{Address, Amount, NoteId, NullifierHash, PrivacyNote, checked_sum};

use super::{Flow, FlowReceipt, FlowState, TransactionOrchestrator, join_submission};
use crate::error::{
    ChainError, ConservationError, PrivacyError, PrivacyResult, StateError, ValidationError,
};
use crate::gateway::{ShieldedSubmission, SubmittedOutput};
use crate::prover::{OutputWitness, ProofRequest, PublicInputs, SpendWitness, Witness};
use crate::state::{PrivacyTransaction, TxKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferOutput {
    pub recipient: Address,
    pub amount: Amount,
}

#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub inputs: Vec<NoteId>,
    pub outputs: Vec<TransferOutput>,
    pub fee: Amount,
}

#[derive(Debug, Clone)]
pub struct WithdrawRequest {
    pub inputs: Vec<NoteId>,
    pub recipient: Address,
    pub amount: Amount,
    pub fee: Amount,
    /// Change back to one of the wallet's aliases
    pub change: Option<TransferOutput>,
}

/// What a spend consumes and produces, before any state is read
struct SpendPlan {
    kind: TxKind,
    inputs: Vec<NoteId>,
    shielded: Vec<TransferOutput>,
    public: Option<(Address, Amount)>,
    fee: Amount,
    /// Headline amount recorded in history
    amount: Amount,
}

/// Everything validation established about a spend
struct Validated {
    notes: Vec<PrivacyNote>,
    origin: Option<Address>,
}

impl TransactionOrchestrator {
    pub async fn transfer(&self, request: TransferRequest) -> PrivacyResult<FlowReceipt> {
        let amount = checked_sum(request.outputs.iter().map(|o| o.amount))
            .ok_or(ValidationError::AmountOverflow)?;
        self.spend(SpendPlan {
            kind: TxKind::ShieldedSend,
            inputs: request.inputs,
            shielded: request.outputs,
            public: None,
            fee: request.fee,
            amount,
        })
        .await
    }

    pub async fn withdraw(&self, request: WithdrawRequest) -> PrivacyResult<FlowReceipt> {
        self.spend(SpendPlan {
            kind: TxKind::Withdraw,
            inputs: request.inputs,
            shielded: request.change.into_iter().collect(),
            public: Some((request.recipient, request.amount)),
            fee: request.fee,
            amount: request.amount,
        })
        .await
    }

    async fn spend(&self, plan: SpendPlan) -> PrivacyResult<FlowReceipt> {
        let mut flow = Flow::new(plan.kind);

        // VALIDATING: nothing below touches the network
        if let Err(e) = check_shape(&plan) {
            flow.fail(&e);
            return Err(e);
        }
        let guard = match self.locks.acquire(flow.id, &plan.inputs) {
            Ok(guard) => guard,
            Err(e) => {
                let e = PrivacyError::from(e);
                flow.fail(&e);
                return Err(e);
            }
        };
        let validated = match self.validate_spend(&plan) {
            Ok(validated) => validated,
            Err(e) => {
                flow.fail(&e);
                return Err(e);
            }
        };

        flow.advance(FlowState::Proving);
        let prepared = match self.prepare(&plan, &validated).await {
            Ok(prepared) => prepared,
            Err(e) => {
                flow.fail(&e);
                self.record_failed(&flow, &plan, &e);
                return Err(e);
            }
        };

        flow.advance(FlowState::Submitting);
        let mut record = PrivacyTransaction::pending(flow.id, plan.kind, plan.amount, plan.fee);
        record.input_notes = plan.inputs.clone();
        record.to_address = plan.public.map(|(recipient, _)| recipient);
        record.alias = validated.origin;
        record.proof_hash = Some(prepared.submission.proof.hash());
        self.ctx.history.record_pending(record);

        let this = self.clone();
        let handle = tokio::spawn(async move {
            // the task owns the locks until bookkeeping is done
            let _guard = guard;
            let Prepared {
                submission,
                spent,
                mut outputs,
            } = prepared;

            let receipt = match this.chain.submit_withdraw_or_transfer(&submission).await {
                Ok(receipt) => receipt,
                Err(e) => {
                    let e = PrivacyError::from(e);
                    flow.fail(&e);
                    this.ctx.history.fail(&flow.id, e.to_string())?;
                    this.flush_after_failure();
                    return Err(e);
                }
            };

            if receipt.leaf_indices.len() == outputs.len() {
                for (note, index) in outputs.iter_mut().zip(&receipt.leaf_indices) {
                    note.merkle_index = Some(*index);
                }
            } else {
                warn!(
                    "Receipt {} carries {} leaf indices for {} outputs",
                    receipt.tx_hash,
                    receipt.leaf_indices.len(),
                    outputs.len()
                );
            }
            let anonymity_set = this.anonymity_set_after(&receipt.leaf_indices).await;
            for note in &mut outputs {
                note.anonymity_set_at_creation = anonymity_set;
            }

            let output_ids: Vec<NoteId> = outputs.iter().map(|note| note.id).collect();
            if let Err(e) = this.ctx.notes.apply_spend(&spent, outputs.clone()) {
                // chain and wallet disagree; the record keeps the chain's tx hash
                flow.fail(&e);
                this.ctx.history.fail(
                    &flow.id,
                    format!("confirmed as {} but not applied: {}", receipt.tx_hash, e),
                )?;
                this.flush_after_failure();
                return Err(e);
            }

            if let Some(origin) = &validated.origin {
                let bookkeeping = match plan.public {
                    Some((recipient, amount)) => {
                        this.ctx
                            .aliases
                            .record_withdrawal(origin, amount, Some(recipient))
                    }
                    None => this.ctx.aliases.record_mixing(origin),
                };
                if let Err(e) = bookkeeping {
                    warn!("Alias {} bookkeeping skipped: {}", origin, e);
                }
            }

            let transaction =
                this.ctx
                    .history
                    .confirm(&flow.id, receipt.tx_hash.clone(), output_ids)?;
            flow.advance(FlowState::Confirmed);
            info!(
                "{:?} {} confirmed in {}: {} inputs, {} new notes",
                plan.kind,
                flow.id,
                receipt.tx_hash,
                spent.len(),
                outputs.len()
            );
            this.flush_after_confirm(&flow.id);

            Ok(FlowReceipt {
                transaction,
                notes: outputs,
            })
        });

        join_submission(handle).await
    }

    /// Load inputs and check state and conservation. Locks are held.
    fn validate_spend(&self, plan: &SpendPlan) -> PrivacyResult<Validated> {
        let settings = self.ctx.settings();

        let mut notes = Vec::with_capacity(plan.inputs.len());
        for id in &plan.inputs {
            let note = self
                .ctx
                .notes
                .get(id)
                .ok_or(StateError::NoteNotFound(*id))?;
            if note.is_spent {
                return Err(StateError::AlreadySpent(*id).into());
            }
            if note.merkle_index.is_none() {
                return Err(StateError::NoteNotIndexed(*id).into());
            }
            if note.anonymity_set_at_creation < settings.anonymity_set_preference {
                warn!(
                    "Note {} was created in an anonymity set of {} (preference {})",
                    id, note.anonymity_set_at_creation, settings.anonymity_set_preference
                );
            }
            notes.push(note);
        }

        // withdraw change must return to one of our aliases
        let must_be_alias = plan.kind == TxKind::Withdraw;
        for output in &plan.shielded {
            match self.ctx.aliases.require_active(&output.recipient) {
                Ok(()) => {}
                Err(StateError::AliasNotFound(_)) if !must_be_alias => {}
                Err(e) => return Err(e.into()),
            }
        }

        let inputs = checked_sum(notes.iter().map(|note| note.amount))
            .ok_or(ValidationError::AmountOverflow)?;
        let outputs = checked_sum(
            plan.shielded
                .iter()
                .map(|o| o.amount)
                .chain(plan.public.map(|(_, amount)| amount)),
        )
        .ok_or(ValidationError::AmountOverflow)?;
        let spent = outputs
            .checked_add(plan.fee)
            .ok_or(ValidationError::AmountOverflow)?;
        if inputs != spent {
            return Err(ConservationError {
                inputs,
                outputs,
                fee: plan.fee,
            }
            .into());
        }

        let origin = notes
            .first()
            .and_then(|note| note.recipient)
            .filter(|recipient| self.ctx.aliases.contains(recipient));

        Ok(Validated { notes, origin })
    }

    /// PROVING: fetch paths, reveal nullifier hashes, draft outputs, prove.
    async fn prepare(&self, plan: &SpendPlan, validated: &Validated) -> PrivacyResult<Prepared> {
        let scheme = self.ctx.scheme.as_ref();

        let chain_root = self.chain.merkle_root().await?;
        let mut paths = Vec::with_capacity(validated.notes.len());
        for note in &validated.notes {
            let index = note.merkle_index.ok_or(StateError::NoteNotIndexed(note.id))?;
            paths.push(self.chain.merkle_proof(&note.commitment, index).await?);
        }

        // a deposit landing between the calls moves the root; any recent
        // root is accepted, but every path has to agree on one
        let merkle_root = match (paths.first(), validated.notes.first()) {
            (Some(path), Some(note)) if !path.verify(&note.commitment, &chain_root) => {
                path.root(&note.commitment)
            }
            _ => chain_root,
        };
        for (path, note) in paths.iter().zip(&validated.notes) {
            if !path.verify(&note.commitment, &merkle_root) {
                let moved =
                    ChainError::Unavailable("merkle tree moved while fetching paths".into());
                return Err(moved.into());
            }
        }

        let mut spent = Vec::with_capacity(validated.notes.len());
        for note in &validated.notes {
            let hash = self.ctx.notes.reveal_nullifier_hash(&note.id, scheme)?;
            spent.push((note.id, hash));
        }

        let outputs: Vec<PrivacyNote> = plan
            .shielded
            .iter()
            .map(|output| {
                self.ctx
                    .notes
                    .create_note(scheme, output.amount, Some(output.recipient))
            })
            .collect();

        let public_inputs = PublicInputs {
            merkle_root,
            nullifier_hashes: spent.iter().map(|(_, hash)| *hash).collect(),
            output_commitments: outputs.iter().map(|note| note.commitment).collect(),
            recipient_hash: plan
                .public
                .map(|(recipient, _)| scheme.recipient_hash(&recipient)),
            public_amount: plan.public.map(|(_, amount)| amount).unwrap_or_default(),
            fee: plan.fee,
        };
        let witness = Witness {
            inputs: validated
                .notes
                .iter()
                .zip(paths)
                .map(|(note, path)| SpendWitness {
                    secret: note.secret,
                    nullifier: note.nullifier,
                    amount: note.amount,
                    recipient: note.recipient,
                    path,
                })
                .collect(),
            outputs: outputs
                .iter()
                .map(|note| OutputWitness {
                    secret: note.secret,
                    nullifier: note.nullifier,
                    amount: note.amount,
                    recipient: note.recipient,
                })
                .collect(),
            public_recipient: plan.public.map(|(recipient, _)| recipient),
        };

        let generated = self
            .prove_with_retry(&ProofRequest {
                public_inputs,
                witness,
            })
            .await?;

        // the published set may have grown while proving
        for (id, hash) in &spent {
            self.ctx.notes.ensure_unpublished(id, hash)?;
        }

        let mut submitted: Vec<SubmittedOutput> = outputs
            .iter()
            .map(|note| SubmittedOutput::Shielded(note.commitment))
            .collect();
        if let Some((recipient, amount)) = plan.public {
            submitted.push(SubmittedOutput::Public { recipient, amount });
        }

        Ok(Prepared {
            submission: ShieldedSubmission {
                proof: generated.proof,
                merkle_root: generated.public_inputs.merkle_root,
                nullifier_hashes: generated.public_inputs.nullifier_hashes,
                outputs: submitted,
                fee: plan.fee,
            },
            spent,
            outputs,
        })
    }

    /// History entry for a spend that passed validation but never submitted
    fn record_failed(&self, flow: &Flow, plan: &SpendPlan, err: &PrivacyError) {
        let mut record = PrivacyTransaction::pending(flow.id, plan.kind, plan.amount, plan.fee);
        record.input_notes = plan.inputs.clone();
        record.to_address = plan.public.map(|(recipient, _)| recipient);
        self.ctx.history.record_pending(record);
        if let Err(e) = self.ctx.history.fail(&flow.id, err.to_string()) {
            warn!("Could not record failure of {}: {}", flow.id, e);
        }
        self.flush_after_failure();
    }
}

/// Proof-carrying submission plus the bookkeeping to apply on confirmation
struct Prepared {
    submission: ShieldedSubmission,
    spent: Vec<(NoteId, NullifierHash)>,
    outputs: Vec<PrivacyNote>,
}

/// Input checks that need no state
fn check_shape(plan: &SpendPlan) -> PrivacyResult<()> {
    if plan.inputs.is_empty() {
        return Err(ValidationError::EmptyInputs.into());
    }
    let mut seen = HashSet::with_capacity(plan.inputs.len());
    for id in &plan.inputs {
        if !seen.insert(id) {
            return Err(ValidationError::DuplicateInput(*id).into());
        }
    }

    if plan.shielded.is_empty() && plan.public.is_none() {
        return Err(ValidationError::EmptyOutputs.into());
    }
    let destinations = plan
        .shielded
        .iter()
        .map(|o| (o.recipient, o.amount))
        .chain(plan.public);
    for (recipient, amount) in destinations {
        if recipient.is_zero() {
            return Err(ValidationError::ZeroAddress.into());
        }
        if amount == 0 {
            return Err(ValidationError::ZeroAmount.into());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(inputs: Vec<NoteId>, shielded: Vec<TransferOutput>) -> SpendPlan {
        SpendPlan {
            kind: TxKind::ShieldedSend,
            inputs,
            shielded,
            public: None,
            fee: 0,
            amount: 0,
        }
    }

    fn output(byte: u8, amount: Amount) -> TransferOutput {
        TransferOutput {
            recipient: Address::from_bytes([byte; 20]),
            amount,
        }
    }

    #[test]
    fn test_shape_checks() {
        let id = NoteId([1u8; 16]);

        assert!(matches!(
            check_shape(&plan(vec![], vec![output(1, 1)])),
            Err(PrivacyError::Validation(ValidationError::EmptyInputs))
        ));
        assert!(matches!(
            check_shape(&plan(vec![id, id], vec![output(1, 1)])),
            Err(PrivacyError::Validation(ValidationError::DuplicateInput(_)))
        ));
        assert!(matches!(
            check_shape(&plan(vec![id], vec![])),
            Err(PrivacyError::Validation(ValidationError::EmptyOutputs))
        ));
        assert!(matches!(
            check_shape(&plan(vec![id], vec![output(0, 1)])),
            Err(PrivacyError::Validation(ValidationError::ZeroAddress))
        ));
        assert!(matches!(
            check_shape(&plan(vec![id], vec![output(1, 0)])),
            Err(PrivacyError::Validation(ValidationError::ZeroAmount))
        ));
        assert!(check_shape(&plan(vec![id], vec![output(1, 1)])).is_ok());
    }

    #[test]
    fn test_withdraw_shape_checks_public_leg() {
        let mut p = plan(vec![NoteId([1u8; 16])], vec![]);
        p.kind = TxKind::Withdraw;
        p.public = Some((Address::ZERO, 5));
        assert!(matches!(
            check_shape(&p),
            Err(PrivacyError::Validation(ValidationError::ZeroAddress))
        ));
        p.public = Some((Address::from_bytes([3u8; 20]), 5));
        assert!(check_shape(&p).is_ok());
    }
}
