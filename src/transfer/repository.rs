//! Participant Repositories
//!
//! The two resource managers the coordinator drives. Each owns its own store
//! transaction type; the coordinator only ever holds one open transaction per
//! store and hands it back for commit or rollback.
//!
//! Implementations:
//! - [`PgBalanceRepository`](super::core_repo::PgBalanceRepository) /
//!   [`PgLedgerRepository`](super::ledger_repo::PgLedgerRepository) (PostgreSQL)
//! - [`MemoryBalanceStore`](super::memory::MemoryBalanceStore) /
//!   [`MemoryLedgerStore`](super::memory::MemoryLedgerStore) (in-process)

use async_trait::async_trait;
use rust_decimal::Decimal;

use super::error::TransferError;
use super::types::{LedgerEntry, LedgerTransaction, TransactionId, TransferRequest};

/// Core store: authoritative account balances
#[async_trait]
pub trait BalanceRepository: Send + Sync {
    /// Open store transaction
    type Tx: Send;

    async fn begin(&self) -> Result<Self::Tx, TransferError>;

    async fn commit(&self, tx: Self::Tx) -> Result<(), TransferError>;

    async fn rollback(&self, tx: Self::Tx) -> Result<(), TransferError>;

    /// Move `request.amount` from source to destination inside `tx`.
    ///
    /// Locks both rows in sorted id order, then debits and credits with
    /// conditional updates that must each touch exactly one row. Never
    /// commits or rolls back.
    async fn prepare_transfer(
        &self,
        tx: &mut Self::Tx,
        request: &TransferRequest,
    ) -> Result<(), TransferError>;

    /// Committed balance of one account, outside any transfer
    async fn get_balance(&self, account_id: &str) -> Result<Option<Decimal>, TransferError>;

    /// Trivial round trip used by health checks
    async fn ping(&self) -> Result<(), TransferError>;
}

/// Ledger store: double-entry journal
#[async_trait]
pub trait LedgerRepository: Send + Sync {
    type Tx: Send;

    async fn begin(&self) -> Result<Self::Tx, TransferError>;

    async fn commit(&self, tx: Self::Tx) -> Result<(), TransferError>;

    async fn rollback(&self, tx: Self::Tx) -> Result<(), TransferError>;

    /// Header row (PENDING) plus the debit/credit entry pair
    async fn insert_pending_transfer(
        &self,
        tx: &mut Self::Tx,
        transaction_id: TransactionId,
        request: &TransferRequest,
    ) -> Result<(), TransferError>;

    /// PENDING → COMMITTED inside `tx`
    async fn mark_committed(
        &self,
        tx: &mut Self::Tx,
        transaction_id: TransactionId,
    ) -> Result<(), TransferError>;

    /// Standalone conditional flip PENDING → COMMITTED.
    ///
    /// Returns whether a row actually changed, so repeated recovery attempts
    /// apply at most once.
    async fn mark_committed_by_id(&self, transaction_id: TransactionId)
    -> Result<bool, TransferError>;

    /// Rebuild a COMMITTED header and its entries from scratch, in one store
    /// transaction. Used only when the core side committed but no ledger record
    /// survived. Idempotent.
    async fn upsert_committed_transfer_with_entries(
        &self,
        transaction_id: TransactionId,
        request: &TransferRequest,
    ) -> Result<(), TransferError>;

    /// Insert-or-update the header to ABORTED so a rolled back attempt stays auditable
    async fn record_aborted_transfer(
        &self,
        transaction_id: TransactionId,
        request: &TransferRequest,
    ) -> Result<(), TransferError>;

    async fn get_transaction_by_id(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Option<LedgerTransaction>, TransferError>;

    /// Header status in canonical upper case
    async fn get_transaction_status_by_id(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Option<String>, TransferError> {
        Ok(self
            .get_transaction_by_id(transaction_id)
            .await?
            .map(|row| row.status.to_uppercase()))
    }

    async fn get_entries(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Vec<LedgerEntry>, TransferError>;

    async fn ping(&self) -> Result<(), TransferError>;
}

/// Sorted lock order for a pair of accounts
pub fn lock_order<T: Ord>(a: T, b: T) -> [T; 2] {
    if a <= b { [a, b] } else { [b, a] }
}
