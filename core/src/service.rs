//! Application-facing privacy API
//!
//! Thin facade over the orchestrator and the engine context. Every call
//! returns an explicit `PrivacyResult`; nothing here panics on expected
//! failures.

use std::sync::Arc;

use log::{error, info};
use shroud_privacy::{Address, Amount, CommitmentScheme, NoteId, PrivacyNote};

use crate::config::{PrivacySettings, ShroudConfig};
use crate::context::PrivacyContext;
use crate::error::PrivacyResult;
use crate::gateway::{ChainGateway, TxHash};
use crate::orchestrator::{
    DepositRequest, FlowReceipt, RetryPolicy, TransactionOrchestrator, TransferOutput,
    TransferRequest, WithdrawRequest,
};
use crate::prover::ProofProvider;
use crate::state::aliases::AliasMetadata;
use crate::state::{AliasAccount, PrivacyMode, PrivacyTransaction, now_secs};
use crate::storage::PersistenceLayer;

#[derive(Clone)]
pub struct PrivacyService {
    orchestrator: TransactionOrchestrator,
    chain: Arc<dyn ChainGateway>,
    bond_value: Amount,
}

impl PrivacyService {
    pub fn new(
        ctx: Arc<PrivacyContext>,
        chain: Arc<dyn ChainGateway>,
        prover: Arc<dyn ProofProvider>,
        retry: RetryPolicy,
        bond_value: Amount,
    ) -> Self {
        Self {
            orchestrator: TransactionOrchestrator::new(ctx, chain.clone(), prover, retry),
            chain,
            bond_value,
        }
    }

    /// Rehydrate the engine from `persistence` and wire it to the collaborators
    pub fn open(
        config: &ShroudConfig,
        persistence: Arc<dyn PersistenceLayer>,
        scheme: Arc<dyn CommitmentScheme>,
        chain: Arc<dyn ChainGateway>,
        prover: Arc<dyn ProofProvider>,
    ) -> PrivacyResult<Self> {
        config.settings.validate()?;
        let ctx = PrivacyContext::open(persistence, scheme, config.settings.clone())?;
        Ok(Self::new(
            Arc::new(ctx),
            chain,
            prover,
            config.to_retry_policy(),
            config.alias.bond_value,
        ))
    }

    pub fn context(&self) -> &Arc<PrivacyContext> {
        self.orchestrator.context()
    }

    pub fn orchestrator(&self) -> &TransactionOrchestrator {
        &self.orchestrator
    }

    // ========================================================================
    // Aliases
    // ========================================================================

    pub async fn create_alias_account(
        &self,
        metadata: AliasMetadata,
    ) -> PrivacyResult<AliasAccount> {
        let ctx = self.context();
        let account = ctx
            .aliases
            .create_alias(metadata, ctx.scheme.as_ref(), self.chain.as_ref(), self.bond_value)
            .await?;
        if let Err(e) = ctx.flush() {
            error!("Failed to persist alias {}: {}", account.address, e);
        }
        Ok(account)
    }

    pub fn deactivate_alias(&self, address: &Address) -> PrivacyResult<AliasAccount> {
        let account = self.context().aliases.deactivate(address)?;
        info!("Alias {} deactivated", address);
        self.context().flush()?;
        Ok(account)
    }

    pub fn aliases(&self) -> Vec<AliasAccount> {
        self.context().aliases.list()
    }

    /// Score as of now, without recording a use
    pub fn alias_privacy_score(&self, address: &Address) -> PrivacyResult<u8> {
        Ok(self.context().aliases.score_at(address, now_secs())?)
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    pub async fn deposit_to_shielded_pool(
        &self,
        amount: Amount,
        alias: Option<Address>,
    ) -> PrivacyResult<FlowReceipt> {
        self.orchestrator
            .deposit(DepositRequest { amount, alias })
            .await
    }

    /// Withdraw `amount` to `recipient` at the default fee, no change
    pub async fn withdraw_from_shielded_pool(
        &self,
        note_ids: Vec<NoteId>,
        recipient: Address,
        amount: Amount,
    ) -> PrivacyResult<FlowReceipt> {
        self.orchestrator
            .withdraw(WithdrawRequest {
                inputs: note_ids,
                recipient,
                amount,
                fee: self.context().settings().default_fee,
                change: None,
            })
            .await
    }

    pub async fn withdraw(&self, request: WithdrawRequest) -> PrivacyResult<FlowReceipt> {
        self.orchestrator.withdraw(request).await
    }

    /// Shielded transfer at the default fee
    pub async fn send_shielded_transaction(
        &self,
        note_ids: Vec<NoteId>,
        outputs: Vec<TransferOutput>,
    ) -> PrivacyResult<FlowReceipt> {
        self.orchestrator
            .transfer(TransferRequest {
                inputs: note_ids,
                outputs,
                fee: self.context().settings().default_fee,
            })
            .await
    }

    pub async fn transfer(&self, request: TransferRequest) -> PrivacyResult<FlowReceipt> {
        self.orchestrator.transfer(request).await
    }

    pub async fn public_transfer(
        &self,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> PrivacyResult<TxHash> {
        self.orchestrator.public_transfer(from, to, amount).await
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn get_unspent_notes(&self) -> Vec<PrivacyNote> {
        self.context().notes.list_unspent()
    }

    pub fn get_private_balance(&self) -> Amount {
        self.context().notes.balance()
    }

    /// Newest first
    pub fn get_privacy_transaction_history(&self) -> Vec<PrivacyTransaction> {
        self.context().history.history()
    }

    // ========================================================================
    // Mode and settings
    // ========================================================================

    pub fn toggle_privacy_mode(&self) -> PrivacyResult<PrivacyMode> {
        let mode = self.context().mode.toggle();
        self.context().flush()?;
        Ok(mode)
    }

    pub fn privacy_mode(&self) -> PrivacyMode {
        self.context().mode.current()
    }

    pub fn settings(&self) -> PrivacySettings {
        self.context().settings()
    }

    pub fn update_settings(&self, settings: PrivacySettings) -> PrivacyResult<()> {
        settings.validate()?;
        self.context().mode.set(settings.mode);
        self.context().replace_settings(settings);
        self.context().flush()
    }
}
