mod common;

use common::{ETH, alias, external, harness, tenths};
use shroud_core::error::{
    ChainError, ConservationError, PrivacyError, StateError, ValidationError,
};
use shroud_core::gateway::{ChainGateway, ShieldedSubmission, SubmittedOutput};
use shroud_core::orchestrator::{TransferOutput, WithdrawRequest};
use shroud_core::prover::{ProofProvider, ProofRequest, PublicInputs, SpendWitness, Witness};
use shroud_core::state::{PrivacyMode, TxKind, TxStatus};

#[tokio::test]
async fn deposit_via_alias_credits_balance_and_alias() {
    let h = harness();
    let a = alias(&h.service).await;

    let receipt = h
        .service
        .deposit_to_shielded_pool(tenths(5), Some(a.address))
        .await
        .unwrap();

    assert_eq!(h.service.get_private_balance(), tenths(5));
    let unspent = h.service.get_unspent_notes();
    assert_eq!(unspent.len(), 1);
    assert_eq!(unspent[0].id, receipt.notes[0].id);
    assert_eq!(unspent[0].recipient, Some(a.address));
    assert_eq!(unspent[0].merkle_index, Some(1), "leaf 0 is the alias bond");
    assert_eq!(unspent[0].anonymity_set_at_creation, 2);

    let stored = h.service.context().aliases.get(&a.address).unwrap();
    assert_eq!(stored.total_deposits, a.total_deposits + tenths(5));

    assert_eq!(receipt.transaction.kind, TxKind::Deposit);
    assert_eq!(receipt.transaction.status, TxStatus::Confirmed);
    assert_eq!(receipt.transaction.output_notes, vec![unspent[0].id]);
}

#[tokio::test]
async fn shielded_transfer_splits_note_with_change() {
    let h = harness();
    let a = alias(&h.service).await;
    let b = external(0xb0);
    let deposit = h
        .service
        .deposit_to_shielded_pool(tenths(5), Some(a.address))
        .await
        .unwrap();
    let input = deposit.notes[0].clone();

    let receipt = h
        .service
        .send_shielded_transaction(
            vec![input.id],
            vec![
                TransferOutput {
                    recipient: b,
                    amount: tenths(3),
                },
                TransferOutput {
                    recipient: a.address,
                    amount: tenths(2),
                },
            ],
        )
        .await
        .unwrap();

    let ctx = h.service.context();
    assert!(ctx.notes.get(&input.id).unwrap().is_spent);
    assert_eq!(receipt.notes.len(), 2);
    assert_eq!(h.service.get_unspent_notes().len(), 2);
    assert_eq!(h.service.get_private_balance(), tenths(5));

    let hash = h.scheme.nullifier_hash(&input.nullifier, &input.secret);
    assert!(h.chain.is_nullifier_published(&hash));
    assert!(ctx.notes.is_published(&hash));

    // every new note is indexed and spendable
    for note in &receipt.notes {
        assert!(note.merkle_index.is_some());
        assert!(note.verify_commitment(h.scheme.as_ref()));
    }
    assert_eq!(ctx.aliases.get(&a.address).unwrap().mixing_rounds, 1);
    assert_eq!(receipt.transaction.input_notes, vec![input.id]);
    assert!(receipt.transaction.proof_hash.is_some());
}

#[tokio::test]
async fn multi_input_transfer_uses_one_joint_proof() {
    let h = harness();
    let first = h.service.deposit_to_shielded_pool(tenths(2), None).await.unwrap();
    let second = h.service.deposit_to_shielded_pool(tenths(3), None).await.unwrap();
    let generated_before = h.prover.generate_calls();
    let submits_before = h.chain.submit_calls();

    h.service
        .send_shielded_transaction(
            vec![first.notes[0].id, second.notes[0].id],
            vec![TransferOutput {
                recipient: external(7),
                amount: tenths(5),
            }],
        )
        .await
        .unwrap();

    assert_eq!(h.prover.generate_calls() - generated_before, 1);
    assert_eq!(h.chain.submit_calls() - submits_before, 1);
    assert_eq!(h.service.get_unspent_notes().len(), 1);
    assert_eq!(h.service.get_private_balance(), tenths(5));
}

#[tokio::test]
async fn withdraw_of_spent_note_never_reaches_chain() {
    let h = harness();
    let deposit = h.service.deposit_to_shielded_pool(tenths(5), None).await.unwrap();
    let note = deposit.notes[0].clone();
    h.service
        .withdraw_from_shielded_pool(vec![note.id], external(1), tenths(5))
        .await
        .unwrap();

    let calls_before = h.chain.total_calls();
    let err = h
        .service
        .withdraw_from_shielded_pool(vec![note.id], external(1), tenths(5))
        .await
        .unwrap_err();

    assert!(matches!(err, PrivacyError::State(StateError::AlreadySpent(id)) if id == note.id));
    assert_eq!(h.chain.total_calls(), calls_before);
}

#[tokio::test]
async fn withdraw_without_change_violates_conservation() {
    let h = harness();
    let deposit = h.service.deposit_to_shielded_pool(tenths(5), None).await.unwrap();
    let note = deposit.notes[0].clone();
    let calls_before = h.chain.total_calls();

    let err = h
        .service
        .withdraw_from_shielded_pool(vec![note.id], external(1), tenths(3))
        .await
        .unwrap_err();

    match err {
        PrivacyError::Conservation(ConservationError {
            inputs,
            outputs,
            fee,
        }) => {
            assert_eq!(inputs, tenths(5));
            assert_eq!(outputs, tenths(3));
            assert_eq!(fee, 0);
        }
        other => panic!("expected conservation error, got {other:?}"),
    }
    assert_eq!(h.prover.generate_calls(), 0);
    assert_eq!(h.chain.total_calls(), calls_before);
    assert!(!h.service.context().notes.get(&note.id).unwrap().is_spent);
    assert!(h.service.orchestrator().locks().is_empty());
    assert_eq!(h.service.get_privacy_transaction_history().len(), 1);
}

#[tokio::test]
async fn withdraw_with_change_and_fee() {
    let h = harness();
    let a = alias(&h.service).await;
    let payee = external(0x99);
    let deposit = h
        .service
        .deposit_to_shielded_pool(tenths(5), Some(a.address))
        .await
        .unwrap();
    let fee = ETH / 1000;

    let receipt = h
        .service
        .withdraw(WithdrawRequest {
            inputs: vec![deposit.notes[0].id],
            recipient: payee,
            amount: tenths(3),
            fee,
            change: Some(TransferOutput {
                recipient: a.address,
                amount: tenths(2) - fee,
            }),
        })
        .await
        .unwrap();

    assert_eq!(h.chain.balance_of(&payee), tenths(3));
    assert_eq!(h.service.get_private_balance(), tenths(2) - fee);
    assert_eq!(receipt.notes.len(), 1);
    assert_eq!(receipt.transaction.to_address, Some(payee));
    assert_eq!(receipt.transaction.fee, fee);

    let stored = h.service.context().aliases.get(&a.address).unwrap();
    assert_eq!(stored.total_withdrawals, tenths(3));
    assert!(stored.counterparties.contains(&payee));
}

#[tokio::test]
async fn withdraw_change_must_go_to_an_alias() {
    let h = harness();
    let deposit = h.service.deposit_to_shielded_pool(tenths(5), None).await.unwrap();
    let stranger = external(0x33);

    let err = h
        .service
        .withdraw(WithdrawRequest {
            inputs: vec![deposit.notes[0].id],
            recipient: external(1),
            amount: tenths(3),
            fee: 0,
            change: Some(TransferOutput {
                recipient: stranger,
                amount: tenths(2),
            }),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, PrivacyError::State(StateError::AliasNotFound(a)) if a == stranger));
}

#[tokio::test]
async fn withdraw_proof_is_bound_to_its_recipient() {
    let h = harness();
    let deposit = h.service.deposit_to_shielded_pool(tenths(5), None).await.unwrap();
    let note = deposit.notes[0].clone();
    let (payee, thief) = (external(0x11), external(0x66));

    let root = h.chain.merkle_root().await.unwrap();
    let path = h
        .chain
        .merkle_proof(&note.commitment, note.merkle_index.unwrap())
        .await
        .unwrap();
    let nullifier_hash = h.scheme.nullifier_hash(&note.nullifier, &note.secret);
    let generated = h
        .prover
        .generate_proof(&ProofRequest {
            public_inputs: PublicInputs {
                merkle_root: root,
                nullifier_hashes: vec![nullifier_hash],
                output_commitments: vec![],
                recipient_hash: Some(h.scheme.recipient_hash(&payee)),
                public_amount: note.amount,
                fee: 0,
            },
            witness: Witness {
                inputs: vec![SpendWitness {
                    secret: note.secret,
                    nullifier: note.nullifier,
                    amount: note.amount,
                    recipient: note.recipient,
                    path,
                }],
                outputs: vec![],
                public_recipient: Some(payee),
            },
        })
        .await
        .unwrap();

    // same proof, payout redirected
    let err = h
        .chain
        .submit_withdraw_or_transfer(&ShieldedSubmission {
            proof: generated.proof,
            merkle_root: root,
            nullifier_hashes: vec![nullifier_hash],
            outputs: vec![SubmittedOutput::Public {
                recipient: thief,
                amount: note.amount,
            }],
            fee: 0,
        })
        .await
        .unwrap_err();

    assert_eq!(err, ChainError::InvalidProof);
    assert_eq!(h.chain.balance_of(&thief), 0);
    assert!(!h.chain.is_nullifier_published(&nullifier_hash));
}

#[tokio::test]
async fn inactive_alias_rejects_new_value() {
    let h = harness();
    let a = alias(&h.service).await;
    let deposit = h
        .service
        .deposit_to_shielded_pool(tenths(5), Some(a.address))
        .await
        .unwrap();
    h.service.deactivate_alias(&a.address).unwrap();

    let err = h
        .service
        .deposit_to_shielded_pool(tenths(1), Some(a.address))
        .await
        .unwrap_err();
    assert!(matches!(err, PrivacyError::State(StateError::AliasInactive(_))));

    let err = h
        .service
        .send_shielded_transaction(
            vec![deposit.notes[0].id],
            vec![TransferOutput {
                recipient: a.address,
                amount: tenths(5),
            }],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PrivacyError::State(StateError::AliasInactive(_))));

    // history is kept
    let stored = h.service.context().aliases.get(&a.address).unwrap();
    assert!(!stored.is_active);
    assert_eq!(stored.total_deposits, tenths(5));
}

#[tokio::test]
async fn deposit_bounds_are_enforced() {
    let h = harness();
    let settings = h.service.settings();

    let err = h.service.deposit_to_shielded_pool(0, None).await.unwrap_err();
    assert!(matches!(err, PrivacyError::Validation(ValidationError::ZeroAmount)));

    let err = h
        .service
        .deposit_to_shielded_pool(settings.min_mix_amount - 1, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PrivacyError::Validation(ValidationError::AmountBelowMinimum { .. })
    ));

    let err = h
        .service
        .deposit_to_shielded_pool(settings.max_mix_amount + 1, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PrivacyError::Validation(ValidationError::AmountAboveMaximum { .. })
    ));

    assert_eq!(h.chain.deposit_calls(), 0);
    assert!(h.service.get_privacy_transaction_history().is_empty());
}

#[tokio::test]
async fn public_transfer_touches_no_private_state() {
    let h = harness();
    let (from, to) = (external(1), external(2));
    h.chain.fund(from, 10);

    h.service.public_transfer(from, to, 4).await.unwrap();

    assert_eq!(h.chain.balance_of(&to), 4);
    assert_eq!(h.service.get_private_balance(), 0);
    assert!(h.service.get_privacy_transaction_history().is_empty());
}

#[tokio::test]
async fn history_lists_every_flow() {
    let h = harness();
    let deposit = h.service.deposit_to_shielded_pool(tenths(5), None).await.unwrap();
    h.service
        .withdraw_from_shielded_pool(vec![deposit.notes[0].id], external(1), tenths(5))
        .await
        .unwrap();

    let history = h.service.get_privacy_transaction_history();
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|tx| tx.status == TxStatus::Confirmed));
    let kinds: Vec<_> = history.iter().map(|tx| tx.kind).collect();
    assert!(kinds.contains(&TxKind::Deposit));
    assert!(kinds.contains(&TxKind::Withdraw));
}

#[tokio::test]
async fn privacy_mode_double_toggle_is_identity() {
    let h = harness();
    let before = h.service.privacy_mode();
    let notes_before = h.service.get_unspent_notes();

    assert_ne!(h.service.toggle_privacy_mode().unwrap(), before);
    assert_eq!(h.service.toggle_privacy_mode().unwrap(), before);
    assert_eq!(before, PrivacyMode::Public);
    assert_eq!(h.service.get_unspent_notes(), notes_before);
}
