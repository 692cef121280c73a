//! Two-Store Transfer Coordinator
//!
//! Moves money between two accounts in a way that looks atomic across two
//! independently transactional stores:
//! - **Core store**: authoritative account balances
//! - **Ledger store**: double-entry journal (header row + debit/credit pair)
//!
//! # Phases
//!
//! ```text
//! INIT → PREPARING → PREPARED → COMMITTING → COMMITTED
//!            ↓           ↓           ↓
//!         ABORTED     ABORTED     IN_DOUBT → COMMITTED (recovery)
//! ```
//!
//! # Safety Invariants
//!
//! 1. **Sorted Row Locks**: both balance rows are locked in sorted id order
//! 2. **Core Commits First**: a partial outcome is always "core yes, ledger no"
//! 3. **Forward Recovery**: IN_DOUBT only ever resolves to COMMITTED
//! 4. **Zero-Sum Journal**: every committed transfer has exactly two entries
//!    summing to zero

pub mod coordinator;
pub mod core_repo;
pub mod error;
pub mod failpoint;
pub mod ledger_repo;
pub mod memory;
pub mod repository;
pub mod service;
pub mod state;
pub mod types;
pub mod worker;

// Re-exports for convenience
pub use coordinator::{COMMIT_ORDER, Participant, TransferCoordinator};
pub use core_repo::PgBalanceRepository;
pub use error::TransferError;
pub use failpoint::{FailPoint, FailpointInjector};
pub use ledger_repo::PgLedgerRepository;
pub use memory::{MemoryBalanceStore, MemoryLedgerStore};
pub use repository::{BalanceRepository, LedgerRepository};
pub use service::TransferService;
pub use state::CoordinatorPhase;
pub use types::{
    HealthCheckResult, LedgerEntry, LedgerStatus, LedgerTransaction, RecoveryResult, StoreHealth,
    TransactionId, TransactionState, TransactionStatusResult, TransferRequest, TransferResult,
};
pub use worker::{RecoveryWorker, WorkerConfig};
