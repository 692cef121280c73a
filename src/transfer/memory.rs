//! In-process participant stores
//!
//! Transactional stand-ins for the two PostgreSQL stores, used by the test
//! suite and by `storage.backend: memory`. They keep the properties the
//! coordinator relies on:
//!
//! - writes are staged in the transaction and applied atomically on commit
//! - dropping or rolling back a transaction discards its writes
//! - balance rows are locked (per-row async mutex) from prepare until the
//!   transaction ends, like `SELECT ... FOR UPDATE`
//!
//! Each store also carries fault toggles so tests can take a participant
//! offline or make its commit/rollback fail.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use tokio::sync::OwnedMutexGuard;

use super::error::TransferError;
use super::repository::{BalanceRepository, LedgerRepository, lock_order};
use super::types::{
    LedgerEntry, LedgerStatus, LedgerTransaction, TransactionId, TransferRequest, entry_pair,
};

/// Injectable store-level failures
#[derive(Debug, Default)]
pub struct StoreFaults {
    offline: AtomicBool,
    fail_commit: AtomicBool,
    fail_rollback: AtomicBool,
}

impl StoreFaults {
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn set_fail_commit(&self, fail: bool) {
        self.fail_commit.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_rollback(&self, fail: bool) {
        self.fail_rollback.store(fail, Ordering::SeqCst);
    }

    fn check_online(&self, store: &str) -> Result<(), TransferError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(TransferError::Store(format!("{} store unreachable", store)));
        }
        Ok(())
    }

    fn check_commit(&self, store: &str) -> Result<(), TransferError> {
        self.check_online(store)?;
        if self.fail_commit.load(Ordering::SeqCst) {
            return Err(TransferError::Store(format!("{} commit failed", store)));
        }
        Ok(())
    }

    fn check_rollback(&self, store: &str) -> Result<(), TransferError> {
        if self.fail_rollback.load(Ordering::SeqCst) {
            return Err(TransferError::Store(format!("{} connection lost", store)));
        }
        Ok(())
    }
}

fn lock_unpoisoned<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

// ============================================================================
// Core balances
// ============================================================================

struct AccountSlot {
    user_id: String,
    amount: Mutex<Decimal>,
    row_lock: Arc<tokio::sync::Mutex<()>>,
}

/// Open core transaction: held row locks plus staged balance writes
pub struct MemoryBalanceTx {
    held: Vec<OwnedMutexGuard<()>>,
    staged: Vec<(Arc<AccountSlot>, Decimal)>,
}

#[derive(Default)]
pub struct MemoryBalanceStore {
    accounts: DashMap<String, Arc<AccountSlot>>,
    faults: StoreFaults,
}

impl MemoryBalanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or overwrite an account row
    pub fn insert_account(
        &self,
        account_id: impl Into<String>,
        user_id: impl Into<String>,
        amount: Decimal,
    ) {
        self.accounts.insert(
            account_id.into(),
            Arc::new(AccountSlot {
                user_id: user_id.into(),
                amount: Mutex::new(amount),
                row_lock: Arc::new(tokio::sync::Mutex::new(())),
            }),
        );
    }

    /// Committed balance (no locking, like an MVCC read)
    pub fn balance(&self, account_id: &str) -> Option<Decimal> {
        self.accounts
            .get(account_id)
            .map(|slot| *lock_unpoisoned(&slot.amount))
    }

    pub fn owner(&self, account_id: &str) -> Option<String> {
        self.accounts.get(account_id).map(|slot| slot.user_id.clone())
    }

    /// Sum of all committed balances
    pub fn total(&self) -> Decimal {
        self.accounts
            .iter()
            .map(|slot| *lock_unpoisoned(&slot.amount))
            .sum()
    }

    pub fn faults(&self) -> &StoreFaults {
        &self.faults
    }

    fn slot(&self, account_id: &str) -> Option<Arc<AccountSlot>> {
        self.accounts.get(account_id).map(|r| r.value().clone())
    }
}

#[async_trait]
impl BalanceRepository for MemoryBalanceStore {
    type Tx = MemoryBalanceTx;

    async fn begin(&self) -> Result<Self::Tx, TransferError> {
        self.faults.check_online("core")?;
        Ok(MemoryBalanceTx {
            held: Vec::new(),
            staged: Vec::new(),
        })
    }

    async fn commit(&self, tx: Self::Tx) -> Result<(), TransferError> {
        self.faults.check_commit("core")?;
        for (slot, amount) in &tx.staged {
            *lock_unpoisoned(&slot.amount) = *amount;
        }
        drop(tx.held);
        Ok(())
    }

    async fn rollback(&self, tx: Self::Tx) -> Result<(), TransferError> {
        // Staged writes and row locks go away with `tx` either way.
        drop(tx);
        self.faults.check_rollback("core")
    }

    async fn prepare_transfer(
        &self,
        tx: &mut Self::Tx,
        request: &TransferRequest,
    ) -> Result<(), TransferError> {
        if request.from_account_id == request.to_account_id {
            return Err(TransferError::validation(
                "Source and destination accounts must be different.",
            ));
        }
        self.faults.check_online("core")?;

        let mut locked = Vec::with_capacity(2);
        for account_id in lock_order(&request.from_account_id, &request.to_account_id) {
            let slot = self.slot(account_id).ok_or(TransferError::AccountNotFound)?;
            let guard = slot.row_lock.clone().lock_owned().await;
            tx.held.push(guard);
            locked.push((account_id, slot));
        }

        let find = |id: &str| {
            locked
                .iter()
                .find(|(account_id, _)| *account_id == id)
                .map(|(_, slot)| slot.clone())
                .ok_or(TransferError::AccountNotFound)
        };
        let source = find(&request.from_account_id)?;
        let target = find(&request.to_account_id)?;

        let source_amount = *lock_unpoisoned(&source.amount);
        if source_amount < request.amount {
            return Err(TransferError::InsufficientFunds);
        }
        let target_amount = *lock_unpoisoned(&target.amount);

        tx.staged.push((source, source_amount - request.amount));
        tx.staged.push((target, target_amount + request.amount));
        Ok(())
    }

    async fn get_balance(&self, account_id: &str) -> Result<Option<Decimal>, TransferError> {
        self.faults.check_online("core")?;
        Ok(self.balance(account_id))
    }

    async fn ping(&self) -> Result<(), TransferError> {
        self.faults.check_online("core")
    }
}

// ============================================================================
// Ledger journal
// ============================================================================

#[derive(Default)]
struct LedgerTables {
    headers: HashMap<TransactionId, LedgerTransaction>,
    entries: HashMap<TransactionId, Vec<LedgerEntry>>,
}

impl LedgerTables {
    fn upsert_header(
        &mut self,
        transaction_id: TransactionId,
        request: &TransferRequest,
        status: LedgerStatus,
    ) {
        self.headers
            .entry(transaction_id)
            .and_modify(|h| h.status = status.as_str().to_string())
            .or_insert_with(|| header(transaction_id, request, status));
    }
}

fn header(
    transaction_id: TransactionId,
    request: &TransferRequest,
    status: LedgerStatus,
) -> LedgerTransaction {
    LedgerTransaction {
        transaction_id,
        from_account_id: request.from_account_id.clone(),
        to_account_id: request.to_account_id.clone(),
        amount: request.amount,
        status: status.as_str().to_string(),
        created_at: chrono::Utc::now(),
    }
}

enum LedgerOp {
    InsertPending(LedgerTransaction, Vec<LedgerEntry>),
    MarkCommitted(TransactionId),
}

/// Open ledger transaction: staged journal writes
pub struct MemoryLedgerTx {
    ops: Vec<LedgerOp>,
}

impl MemoryLedgerTx {
    fn stages_header(&self, transaction_id: TransactionId) -> bool {
        self.ops.iter().any(|op| {
            matches!(op, LedgerOp::InsertPending(h, _) if h.transaction_id == transaction_id)
        })
    }
}

#[derive(Default)]
pub struct MemoryLedgerStore {
    tables: Mutex<LedgerTables>,
    faults: StoreFaults,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn faults(&self) -> &StoreFaults {
        &self.faults
    }

    /// Number of committed header rows
    pub fn header_count(&self) -> usize {
        lock_unpoisoned(&self.tables).headers.len()
    }

    /// Overwrite a header's raw status, bypassing every rule
    pub fn force_status(&self, transaction_id: TransactionId, status: &str) -> bool {
        match lock_unpoisoned(&self.tables).headers.get_mut(&transaction_id) {
            Some(h) => {
                h.status = status.to_string();
                true
            }
            None => false,
        }
    }

    fn tables(&self) -> MutexGuard<'_, LedgerTables> {
        lock_unpoisoned(&self.tables)
    }
}

#[async_trait]
impl LedgerRepository for MemoryLedgerStore {
    type Tx = MemoryLedgerTx;

    async fn begin(&self) -> Result<Self::Tx, TransferError> {
        self.faults.check_online("ledger")?;
        Ok(MemoryLedgerTx { ops: Vec::new() })
    }

    async fn commit(&self, tx: Self::Tx) -> Result<(), TransferError> {
        self.faults.check_commit("ledger")?;
        let mut tables = self.tables();
        for op in tx.ops {
            match op {
                LedgerOp::InsertPending(h, entries) => {
                    let id = h.transaction_id;
                    tables.headers.insert(id, h);
                    tables.entries.entry(id).or_default().extend(entries);
                }
                LedgerOp::MarkCommitted(id) => {
                    if let Some(h) = tables.headers.get_mut(&id) {
                        h.status = LedgerStatus::Committed.as_str().to_string();
                    }
                }
            }
        }
        Ok(())
    }

    async fn rollback(&self, tx: Self::Tx) -> Result<(), TransferError> {
        drop(tx);
        self.faults.check_rollback("ledger")
    }

    async fn insert_pending_transfer(
        &self,
        tx: &mut Self::Tx,
        transaction_id: TransactionId,
        request: &TransferRequest,
    ) -> Result<(), TransferError> {
        self.faults.check_online("ledger")?;
        if tx.stages_header(transaction_id) || self.tables().headers.contains_key(&transaction_id)
        {
            return Err(TransferError::Store(format!(
                "duplicate key value violates unique constraint: trx_id={}",
                transaction_id
            )));
        }
        tx.ops.push(LedgerOp::InsertPending(
            header(transaction_id, request, LedgerStatus::Pending),
            entry_pair(transaction_id, request).to_vec(),
        ));
        Ok(())
    }

    async fn mark_committed(
        &self,
        tx: &mut Self::Tx,
        transaction_id: TransactionId,
    ) -> Result<(), TransferError> {
        self.faults.check_online("ledger")?;
        tx.ops.push(LedgerOp::MarkCommitted(transaction_id));
        Ok(())
    }

    async fn mark_committed_by_id(
        &self,
        transaction_id: TransactionId,
    ) -> Result<bool, TransferError> {
        self.faults.check_online("ledger")?;
        let mut tables = self.tables();
        match tables.headers.get_mut(&transaction_id) {
            Some(h) if LedgerStatus::parse(&h.status) == Some(LedgerStatus::Pending) => {
                h.status = LedgerStatus::Committed.as_str().to_string();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn upsert_committed_transfer_with_entries(
        &self,
        transaction_id: TransactionId,
        request: &TransferRequest,
    ) -> Result<(), TransferError> {
        self.faults.check_commit("ledger")?;
        let mut tables = self.tables();
        tables.upsert_header(transaction_id, request, LedgerStatus::Committed);
        tables
            .entries
            .insert(transaction_id, entry_pair(transaction_id, request).to_vec());
        Ok(())
    }

    async fn record_aborted_transfer(
        &self,
        transaction_id: TransactionId,
        request: &TransferRequest,
    ) -> Result<(), TransferError> {
        self.faults.check_online("ledger")?;
        self.tables()
            .upsert_header(transaction_id, request, LedgerStatus::Aborted);
        Ok(())
    }

    async fn get_transaction_by_id(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Option<LedgerTransaction>, TransferError> {
        self.faults.check_online("ledger")?;
        Ok(self.tables().headers.get(&transaction_id).cloned())
    }

    async fn get_entries(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Vec<LedgerEntry>, TransferError> {
        self.faults.check_online("ledger")?;
        let mut entries = self
            .tables()
            .entries
            .get(&transaction_id)
            .cloned()
            .unwrap_or_default();
        entries.sort_by(|a, b| a.amount.cmp(&b.amount));
        Ok(entries)
    }

    async fn ping(&self) -> Result<(), TransferError> {
        self.faults.check_online("ledger")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn request(from: &str, to: &str, amount: Decimal) -> TransferRequest {
        TransferRequest::new("u-from", "u-to", from, to, amount)
    }

    #[tokio::test]
    async fn test_balance_commit_applies_staged_writes() {
        let store = MemoryBalanceStore::new();
        store.insert_account("a", "alice", dec!(100.00));
        store.insert_account("b", "bob", dec!(0.00));

        let mut tx = store.begin().await.unwrap();
        store
            .prepare_transfer(&mut tx, &request("a", "b", dec!(40.00)))
            .await
            .unwrap();
        // not visible before commit
        assert_eq!(store.balance("a"), Some(dec!(100.00)));

        store.commit(tx).await.unwrap();
        assert_eq!(store.balance("a"), Some(dec!(60.00)));
        assert_eq!(store.balance("b"), Some(dec!(40.00)));
        assert_eq!(store.owner("a").as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn test_balance_rollback_discards() {
        let store = MemoryBalanceStore::new();
        store.insert_account("a", "alice", dec!(10));
        store.insert_account("b", "bob", dec!(0));

        let mut tx = store.begin().await.unwrap();
        store
            .prepare_transfer(&mut tx, &request("a", "b", dec!(10)))
            .await
            .unwrap();
        store.rollback(tx).await.unwrap();

        assert_eq!(store.balance("a"), Some(dec!(10)));
        assert_eq!(store.balance("b"), Some(dec!(0)));
    }

    #[tokio::test]
    async fn test_balance_prepare_errors() {
        let store = MemoryBalanceStore::new();
        store.insert_account("a", "alice", dec!(5));
        store.insert_account("b", "bob", dec!(0));

        let mut tx = store.begin().await.unwrap();
        assert_eq!(
            store
                .prepare_transfer(&mut tx, &request("a", "missing", dec!(1)))
                .await,
            Err(TransferError::AccountNotFound)
        );
        drop(tx);

        let mut tx = store.begin().await.unwrap();
        assert_eq!(
            store
                .prepare_transfer(&mut tx, &request("a", "b", dec!(5.01)))
                .await,
            Err(TransferError::InsufficientFunds)
        );
        drop(tx);

        let mut tx = store.begin().await.unwrap();
        assert!(matches!(
            store.prepare_transfer(&mut tx, &request("a", "a", dec!(1))).await,
            Err(TransferError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_row_lock_held_until_commit() {
        let store = Arc::new(MemoryBalanceStore::new());
        store.insert_account("a", "alice", dec!(10));
        store.insert_account("b", "bob", dec!(0));

        let mut first = store.begin().await.unwrap();
        store
            .prepare_transfer(&mut first, &request("a", "b", dec!(10)))
            .await
            .unwrap();

        let contender = {
            let store = store.clone();
            tokio::spawn(async move {
                let mut tx = store.begin().await.unwrap();
                let res = store
                    .prepare_transfer(&mut tx, &request("b", "a", dec!(5)))
                    .await;
                if res.is_ok() {
                    store.commit(tx).await.unwrap();
                }
                res
            })
        };

        tokio::task::yield_now().await;
        assert!(!contender.is_finished());

        store.commit(first).await.unwrap();
        // sees the committed 10 on b, so the reverse transfer succeeds
        assert_eq!(contender.await.unwrap(), Ok(()));
        assert_eq!(store.balance("a"), Some(dec!(5)));
        assert_eq!(store.balance("b"), Some(dec!(5)));
    }

    #[tokio::test]
    async fn test_ledger_commit_and_rollback() {
        let ledger = MemoryLedgerStore::new();
        let req = request("a", "b", dec!(3));

        let id = TransactionId::new();
        let mut tx = ledger.begin().await.unwrap();
        ledger.insert_pending_transfer(&mut tx, id, &req).await.unwrap();
        ledger.rollback(tx).await.unwrap();
        assert!(ledger.get_transaction_by_id(id).await.unwrap().is_none());

        let mut tx = ledger.begin().await.unwrap();
        ledger.insert_pending_transfer(&mut tx, id, &req).await.unwrap();
        ledger.mark_committed(&mut tx, id).await.unwrap();
        ledger.commit(tx).await.unwrap();

        assert_eq!(
            ledger.get_transaction_status_by_id(id).await.unwrap().as_deref(),
            Some("COMMITTED")
        );
        let entries = ledger.get_entries(id).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries.iter().map(|e| e.amount).sum::<Decimal>(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_ledger_duplicate_insert_rejected() {
        let ledger = MemoryLedgerStore::new();
        let req = request("a", "b", dec!(3));
        let id = TransactionId::new();

        ledger.record_aborted_transfer(id, &req).await.unwrap();
        let mut tx = ledger.begin().await.unwrap();
        assert!(matches!(
            ledger.insert_pending_transfer(&mut tx, id, &req).await,
            Err(TransferError::Store(_))
        ));
    }

    #[tokio::test]
    async fn test_mark_committed_by_id_applies_once() {
        let ledger = MemoryLedgerStore::new();
        let req = request("a", "b", dec!(3));
        let id = TransactionId::new();

        let mut tx = ledger.begin().await.unwrap();
        ledger.insert_pending_transfer(&mut tx, id, &req).await.unwrap();
        ledger.commit(tx).await.unwrap();
        ledger.force_status(id, "pending");

        assert!(ledger.mark_committed_by_id(id).await.unwrap());
        assert!(!ledger.mark_committed_by_id(id).await.unwrap());
        assert!(!ledger.mark_committed_by_id(TransactionId::new()).await.unwrap());
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let ledger = MemoryLedgerStore::new();
        let req = request("a", "b", dec!(7.5));
        let id = TransactionId::new();

        ledger.upsert_committed_transfer_with_entries(id, &req).await.unwrap();
        ledger.upsert_committed_transfer_with_entries(id, &req).await.unwrap();

        assert_eq!(ledger.header_count(), 1);
        let entries = ledger.get_entries(id).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].amount, dec!(-7.5));
        assert_eq!(entries[1].amount, dec!(7.5));
    }

    #[tokio::test]
    async fn test_offline_store_fails_everything() {
        let ledger = MemoryLedgerStore::new();
        ledger.faults().set_offline(true);
        assert!(ledger.ping().await.is_err());
        assert!(ledger.begin().await.is_err());
        assert!(ledger.get_transaction_by_id(TransactionId::new()).await.is_err());

        ledger.faults().set_offline(false);
        assert!(ledger.ping().await.is_ok());
    }
}
