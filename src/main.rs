//! Twin Ledger - transfer coordinator service
//!
//! ```text
//! ┌──────────┐    ┌─────────────┐    ┌──────────────┐
//! │ Gateway  │───▶│ Coordinator │───▶│ Core store   │  balances
//! │  (HTTP)  │    │ (2 phases)  │───▶│ Ledger store │  journal
//! └──────────┘    └─────────────┘    └──────────────┘
//!                        ▲
//!                 RecoveryWorker (IN_DOUBT sweep)
//! ```
//!
//! Usage: `twin_ledger [--env dev] [--port 3000]`

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use twin_ledger::config::{AppConfig, StorageBackend};
use twin_ledger::db::Database;
use twin_ledger::gateway::{self, state::AppState};
use twin_ledger::logging::init_logging;
use twin_ledger::transfer::{
    FailpointInjector, MemoryBalanceStore, MemoryLedgerStore, PgBalanceRepository,
    PgLedgerRepository, RecoveryWorker, TransferCoordinator, TransferService, WorkerConfig,
};

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

/// Get port override from command line (--port argument)
fn get_port_override() -> Option<u16> {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if args[i] == "--port" && i + 1 < args.len() {
            return args[i + 1].parse().ok();
        }
    }
    None
}

async fn build_service(config: &AppConfig) -> anyhow::Result<Arc<dyn TransferService>> {
    let failpoints = Arc::new(FailpointInjector::new());
    let capacity = config.coordinator.max_in_memory_transactions;

    match config.storage.backend {
        StorageBackend::Postgres => {
            let core = Database::connect_with(&config.storage, &config.storage.core_db_url)
                .await
                .context("Failed to connect to core database")?;
            let ledger = Database::connect_with(&config.storage, &config.storage.ledger_db_url)
                .await
                .context("Failed to connect to ledger database")?;

            tracing::info!("Transfer coordinator using PostgreSQL stores");
            Ok(Arc::new(TransferCoordinator::with_capacity(
                Arc::new(PgBalanceRepository::new(core.into_pool())),
                Arc::new(PgLedgerRepository::new(ledger.into_pool())),
                failpoints,
                capacity,
            )))
        }
        StorageBackend::Memory => {
            let core = MemoryBalanceStore::new();
            for seed in &config.storage.seed_accounts {
                core.insert_account(&seed.account_id, &seed.user_id, seed.amount);
            }
            tracing::warn!(
                accounts = config.storage.seed_accounts.len(),
                "Transfer coordinator using in-memory stores (data is lost on exit)"
            );
            Ok(Arc::new(TransferCoordinator::with_capacity(
                Arc::new(core),
                Arc::new(MemoryLedgerStore::new()),
                failpoints,
                capacity,
            )))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let mut config = AppConfig::load(&env)?;
    if let Some(port) = get_port_override() {
        config.gateway.port = port;
    }
    let _log_guard = init_logging(&config);

    tracing::info!(
        env = %env,
        git_hash = env!("GIT_HASH"),
        "Starting twin_ledger"
    );
    if config.simulate_failure {
        tracing::warn!("SIMULATE_FAILURE on: transfers default to BEFORE_COMMIT");
    }

    let service = build_service(&config).await?;

    if config.recovery.enabled {
        let worker = RecoveryWorker::new(
            service.clone(),
            WorkerConfig {
                scan_interval: Duration::from_secs(config.recovery.scan_interval_secs.max(1)),
                ..WorkerConfig::default()
            },
        );
        tokio::spawn(async move {
            worker.run().await;
        });
    }

    let state = Arc::new(AppState::new(service, config.simulate_failure));
    gateway::run_server(&config.gateway.host, config.gateway.port, state).await
}
