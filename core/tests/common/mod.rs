#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use shroud_core::config::PrivacySettings;
use shroud_core::context::PrivacyContext;
use shroud_core::gateway::LocalChain;
use shroud_core::orchestrator::RetryPolicy;
use shroud_core::prover::LocalProver;
use shroud_core::state::aliases::AliasMetadata;
use shroud_core::state::AliasAccount;
use shroud_core::storage::{MemoryStore, PersistenceLayer};
use shroud_core::PrivacyService;
use shroud_privacy::{Address, CommitmentScheme, PoseidonScheme};

pub const ETH: u128 = 1_000_000_000_000_000_000;

/// Fractions of one unit in tenths: `tenths(5)` is 0.5
pub fn tenths(n: u128) -> u128 {
    n * ETH / 10
}

#[derive(Default)]
pub struct Options {
    pub prover_latency: Option<Duration>,
    pub chain_latency: Option<Duration>,
    pub max_retries: Option<u32>,
    pub store: Option<Arc<dyn PersistenceLayer>>,
    pub chain: Option<Arc<LocalChain>>,
}

pub struct Harness {
    pub service: PrivacyService,
    pub chain: Arc<LocalChain>,
    pub prover: Arc<LocalProver>,
    pub scheme: Arc<dyn CommitmentScheme>,
}

pub fn harness() -> Harness {
    harness_with(Options::default())
}

pub fn harness_with(options: Options) -> Harness {
    let scheme: Arc<dyn CommitmentScheme> = Arc::new(PoseidonScheme::new());

    let mut prover = LocalProver::new(scheme.clone());
    if let Some(latency) = options.prover_latency {
        prover = prover.with_latency(latency);
    }
    let prover = Arc::new(prover);

    let chain = options.chain.unwrap_or_else(|| {
        let mut chain = LocalChain::new(scheme.clone()).with_verifier(prover.clone());
        if let Some(latency) = options.chain_latency {
            chain = chain.with_latency(latency);
        }
        Arc::new(chain)
    });

    let store = options
        .store
        .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn PersistenceLayer>);
    let ctx = PrivacyContext::open(store, scheme.clone(), PrivacySettings::default()).unwrap();
    let retry = RetryPolicy {
        max_retries: options.max_retries.unwrap_or(3),
        base_delay: Duration::from_millis(1),
    };
    let service = PrivacyService::new(Arc::new(ctx), chain.clone(), prover.clone(), retry, 0);

    Harness {
        service,
        chain,
        prover,
        scheme,
    }
}

pub async fn alias(service: &PrivacyService) -> AliasAccount {
    service
        .create_alias_account(AliasMetadata::default())
        .await
        .unwrap()
}

pub fn external(byte: u8) -> Address {
    Address::from_bytes([byte; 20])
}
