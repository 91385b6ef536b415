mod common;

use std::sync::Arc;

use common::{Options, alias, external, harness_with, tenths};
use shroud_core::orchestrator::TransferOutput;
use shroud_core::state::{PrivacyMode, TxStatus};
use shroud_core::storage::RocksDbStore;

#[tokio::test]
async fn state_survives_reopening_the_database() {
    let dir = tempfile::tempdir().unwrap();

    let first = harness_with(Options {
        store: Some(Arc::new(RocksDbStore::open(dir.path()).unwrap())),
        ..Options::default()
    });
    let chain = first.chain.clone();
    let a = alias(&first.service).await;
    let deposit = first
        .service
        .deposit_to_shielded_pool(tenths(5), Some(a.address))
        .await
        .unwrap();
    let spent = deposit.notes[0].clone();
    first
        .service
        .send_shielded_transaction(
            vec![spent.id],
            vec![
                TransferOutput {
                    recipient: external(0xb0),
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
    assert_eq!(first.service.toggle_privacy_mode().unwrap(), PrivacyMode::Private);

    let unspent_before = first.service.get_unspent_notes();
    let history_before = first.service.get_privacy_transaction_history();
    let alias_before = first.service.context().aliases.get(&a.address).unwrap();
    assert!(!first.service.context().is_dirty());
    drop(first);

    let second = harness_with(Options {
        store: Some(Arc::new(RocksDbStore::open(dir.path()).unwrap())),
        chain: Some(chain),
        ..Options::default()
    });
    let service = &second.service;

    assert_eq!(service.get_private_balance(), tenths(5));
    assert_eq!(service.get_unspent_notes(), unspent_before);
    assert_eq!(service.get_privacy_transaction_history(), history_before);
    assert_eq!(service.privacy_mode(), PrivacyMode::Private);
    assert_eq!(service.aliases().len(), 1);
    let alias_after = service.context().aliases.get(&a.address).unwrap();
    assert_eq!(alias_after.total_deposits, alias_before.total_deposits);
    assert_eq!(alias_after.mixing_rounds, 1);
    assert_eq!(alias_after.keys().address(), a.address);

    let ctx = service.context();
    assert!(ctx.notes.get(&spent.id).unwrap().is_spent);
    let hash = second.scheme.nullifier_hash(&spent.nullifier, &spent.secret);
    assert!(ctx.notes.is_published(&hash));

    // rehydrated notes are spendable against the same pool
    let change = unspent_before
        .iter()
        .find(|note| note.recipient == Some(a.address))
        .unwrap();
    let receipt = service
        .withdraw_from_shielded_pool(vec![change.id], external(0x44), tenths(2))
        .await
        .unwrap();
    assert_eq!(receipt.transaction.status, TxStatus::Confirmed);
    assert_eq!(second.chain.balance_of(&external(0x44)), tenths(2));
}
