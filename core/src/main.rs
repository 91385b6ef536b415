//! Development harness: one alias, one deposit, a shielded transfer and a
//! withdraw against the in-process chain, persisted to RocksDB.

use std::sync::Arc;

use anyhow::Context;
use log::info;
use shroud_core::gateway::LocalChain;
use shroud_core::orchestrator::{TransferOutput, TransferRequest, WithdrawRequest};
use shroud_core::prover::LocalProver;
use shroud_core::state::aliases::AliasMetadata;
use shroud_core::storage::RocksDbStore;
use shroud_core::{PrivacyService, ShroudConfig};
use shroud_privacy::{Address, CommitmentScheme, PoseidonScheme};

/// 0.5 in an 18-decimal unit
const DEPOSIT: u128 = 500_000_000_000_000_000;
const SENT: u128 = 300_000_000_000_000_000;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    info!("Shroud dev harness starting...");

    let config = ShroudConfig::load()?;
    let store = RocksDbStore::open(&config.database.path)
        .with_context(|| format!("Failed to open database at {}", config.database.path))?;
    info!("Database opened at {}", config.database.path);

    let scheme: Arc<dyn CommitmentScheme> = Arc::new(PoseidonScheme::new());
    let prover = Arc::new(LocalProver::new(scheme.clone()));
    let chain = Arc::new(LocalChain::new(scheme.clone()).with_verifier(prover.clone()));

    let service = PrivacyService::open(&config, Arc::new(store), scheme, chain.clone(), prover)?;

    let alias = service
        .create_alias_account(AliasMetadata {
            label: Some("dev".into()),
        })
        .await?;
    info!("Alias {} (score {})", alias.address, alias.privacy_score);

    let deposit = service
        .deposit_to_shielded_pool(DEPOSIT, Some(alias.address))
        .await?;
    let note = deposit
        .notes
        .first()
        .context("deposit produced no note")?
        .clone();
    info!("Private balance: {}", service.get_private_balance());

    let friend = Address::from_bytes([0x42; 20]);
    let fee = service.settings().default_fee;
    let kept = DEPOSIT
        .checked_sub(SENT)
        .and_then(|rest| rest.checked_sub(fee))
        .filter(|kept| *kept > 0)
        .context("default fee leaves no change for the transfer")?;
    let transfer = service
        .transfer(TransferRequest {
            inputs: vec![note.id],
            outputs: vec![
                TransferOutput {
                    recipient: friend,
                    amount: SENT,
                },
                TransferOutput {
                    recipient: alias.address,
                    amount: kept,
                },
            ],
            fee,
        })
        .await?;
    let change = transfer
        .notes
        .iter()
        .find(|n| n.recipient == Some(alias.address))
        .context("transfer produced no change note")?
        .clone();
    info!("Private balance after transfer: {}", service.get_private_balance());

    let payee = Address::from_bytes([0x99; 20]);
    service
        .withdraw(WithdrawRequest {
            inputs: vec![change.id],
            recipient: payee,
            amount: change.amount,
            fee: 0,
            change: None,
        })
        .await?;
    info!(
        "Withdrew {} to {} (public balance {})",
        change.amount,
        payee,
        chain.balance_of(&payee)
    );

    for tx in service.get_privacy_transaction_history() {
        info!(
            "{} {:?} {:?} amount={} hash={}",
            tx.id,
            tx.kind,
            tx.status,
            tx.amount,
            tx.tx_hash.as_deref().unwrap_or("-")
        );
    }
    info!("Privacy mode now {}", service.toggle_privacy_mode()?);

    Ok(())
}
