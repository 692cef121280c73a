//! Recovery Worker
//!
//! Background worker that periodically resolves IN_DOUBT transfers still held
//! in the coordinator's state table.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::service::TransferService;

/// Configuration for the recovery worker
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// How often to scan for IN_DOUBT transfers
    pub scan_interval: Duration,
    /// Maximum transfers to process per scan
    pub batch_size: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(30),
            batch_size: 100,
        }
    }
}

/// Recovery Worker
///
/// Only sees what is still in the state table; entries lost to eviction or a
/// restart need an explicit recover call by id.
pub struct RecoveryWorker {
    service: Arc<dyn TransferService>,
    config: WorkerConfig,
}

impl RecoveryWorker {
    pub fn new(service: Arc<dyn TransferService>, config: WorkerConfig) -> Self {
        Self { service, config }
    }

    pub fn with_defaults(service: Arc<dyn TransferService>) -> Self {
        Self::new(service, WorkerConfig::default())
    }

    /// Run the recovery loop forever
    pub async fn run(&self) -> ! {
        info!(
            scan_interval_secs = self.config.scan_interval.as_secs(),
            batch_size = self.config.batch_size,
            "Starting recovery worker"
        );

        let mut ticker = tokio::time::interval(self.config.scan_interval);
        loop {
            ticker.tick().await;
            self.scan_and_recover().await;
        }
    }

    /// Run a single scan; returns how many transfers reached COMMITTED
    pub async fn scan_and_recover(&self) -> usize {
        let in_doubt = self.service.in_doubt_ids();

        if in_doubt.is_empty() {
            debug!("No IN_DOUBT transfers found");
            return 0;
        }

        info!(count = in_doubt.len(), "Found IN_DOUBT transfers to recover");

        let mut recovered = 0;
        for transaction_id in in_doubt.into_iter().take(self.config.batch_size) {
            let result = self.service.recover_transaction(transaction_id).await;
            if result.success {
                recovered += 1;
            } else {
                warn!(
                    transaction_id = %transaction_id,
                    message = %result.message,
                    "Transfer still IN_DOUBT"
                );
            }
        }

        if recovered > 0 {
            info!(count = recovered, "Recovered transfers this scan");
        }
        recovered
    }
}
