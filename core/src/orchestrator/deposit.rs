//! Deposit flow (public → private)
//!
//! No proof is needed: the wallet drafts a fresh note and the chain appends
//! its commitment. The note only joins the store once the deposit confirms.

use log::info;
use shroud_privacy::{Address, Amount};

use super::{Flow, FlowReceipt, FlowState, TransactionOrchestrator, join_submission};
use crate::error::{PrivacyError, PrivacyResult, ValidationError};
use crate::state::{PrivacyTransaction, TxKind};

#[derive(Debug, Clone)]
pub struct DepositRequest {
    pub amount: Amount,
    /// Alias credited with the deposit and named as the note's recipient
    pub alias: Option<Address>,
}

impl TransactionOrchestrator {
    pub async fn deposit(&self, request: DepositRequest) -> PrivacyResult<FlowReceipt> {
        let mut flow = Flow::new(TxKind::Deposit);
        if let Err(e) = self.validate_deposit(&request) {
            flow.fail(&e);
            return Err(e);
        }

        let note = self
            .ctx
            .notes
            .create_note(self.ctx.scheme.as_ref(), request.amount, request.alias);

        // nothing to prove for a fresh commitment
        flow.advance(FlowState::Proving);

        let mut record = PrivacyTransaction::pending(flow.id, TxKind::Deposit, request.amount, 0);
        record.alias = request.alias;
        self.ctx.history.record_pending(record);
        flow.advance(FlowState::Submitting);

        let this = self.clone();
        let handle = tokio::spawn(async move {
            let receipt = match this.chain.deposit(note.commitment, request.amount).await {
                Ok(receipt) => receipt,
                Err(e) => {
                    let e = PrivacyError::from(e);
                    flow.fail(&e);
                    this.ctx.history.fail(&flow.id, e.to_string())?;
                    this.flush_after_failure();
                    return Err(e);
                }
            };

            let mut note = note;
            note.merkle_index = receipt.leaf_indices.first().copied();
            note.anonymity_set_at_creation = this.anonymity_set_after(&receipt.leaf_indices).await;
            this.ctx.notes.insert(note.clone())?;
            if let Some(alias) = &request.alias {
                this.ctx.aliases.record_deposit(alias, request.amount)?;
            }
            let transaction =
                this.ctx
                    .history
                    .confirm(&flow.id, receipt.tx_hash.clone(), vec![note.id])?;
            flow.advance(FlowState::Confirmed);
            info!(
                "Deposit {} confirmed in {} (note {}, anonymity set {})",
                flow.id, receipt.tx_hash, note.id, note.anonymity_set_at_creation
            );
            this.flush_after_confirm(&flow.id);

            Ok(FlowReceipt {
                transaction,
                notes: vec![note],
            })
        });

        join_submission(handle).await
    }

    fn validate_deposit(&self, request: &DepositRequest) -> PrivacyResult<()> {
        let settings = self.ctx.settings();
        if request.amount == 0 {
            return Err(ValidationError::ZeroAmount.into());
        }
        if request.amount < settings.min_mix_amount {
            return Err(ValidationError::AmountBelowMinimum {
                amount: request.amount,
                minimum: settings.min_mix_amount,
            }
            .into());
        }
        if request.amount > settings.max_mix_amount {
            return Err(ValidationError::AmountAboveMaximum {
                amount: request.amount,
                maximum: settings.max_mix_amount,
            }
            .into());
        }
        if let Some(alias) = &request.alias {
            self.ctx.aliases.require_active(alias)?;
        }
        Ok(())
    }
}
