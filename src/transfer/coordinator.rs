//! Transfer Coordinator
//!
//! Drives one transfer through both stores so that it looks atomic from the
//! outside, records a snapshot of its progress after every step, and resolves
//! attempts that ended with exactly one side committed.
//!
//! # Commit order and recovery direction
//!
//! The core store always commits strictly before the ledger store
//! ([`COMMIT_ORDER`]). The only partial outcome the protocol can produce is
//! therefore "balances moved, journal missing or PENDING", and the journal can
//! always be rebuilt from the cached request. That is why recovery only ever
//! resolves forward, toward COMMITTED. Reversing the commit order would require
//! flipping the recovery direction as well.
//!
//! # Volatile state
//!
//! The per-transaction table lives in memory and is bounded; entries are
//! evicted oldest-first. After an eviction or a restart, status and recovery
//! fall back to the ledger store's header row.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};

use lru::LruCache;
use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

use super::error::TransferError;
use super::failpoint::{FailPoint, FailpointInjector};
use super::repository::{BalanceRepository, LedgerRepository};
use super::state::CoordinatorPhase;
use super::types::{
    HealthCheckResult, LedgerStatus, RecoveryResult, StoreHealth, TransactionId,
    TransactionState, TransactionStatusResult, TransferRequest, TransferResult,
    normalize_ledger_status,
};

/// Default bound on live entries in the state table
pub const DEFAULT_MAX_IN_MEMORY_TRANSACTIONS: usize = 2000;

/// One of the two resource managers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Participant {
    Core,
    Ledger,
}

impl Participant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Participant::Core => "core",
            Participant::Ledger => "ledger",
        }
    }
}

/// Commit order of the protocol. Recovery direction depends on it.
pub const COMMIT_ORDER: [Participant; 2] = [Participant::Core, Participant::Ledger];

/// Transfer Coordinator
pub struct TransferCoordinator<B: BalanceRepository, L: LedgerRepository> {
    core: Arc<B>,
    ledger: Arc<L>,
    failpoints: Arc<FailpointInjector>,
    states: Mutex<LruCache<TransactionId, TransactionState>>,
    recovery_requests: Mutex<LruCache<TransactionId, TransferRequest>>,
}

impl<B: BalanceRepository, L: LedgerRepository> TransferCoordinator<B, L> {
    /// Create a new TransferCoordinator
    pub fn new(core: Arc<B>, ledger: Arc<L>, failpoints: Arc<FailpointInjector>) -> Self {
        Self::with_capacity(core, ledger, failpoints, DEFAULT_MAX_IN_MEMORY_TRANSACTIONS)
    }

    /// Create with an explicit state table bound
    pub fn with_capacity(
        core: Arc<B>,
        ledger: Arc<L>,
        failpoints: Arc<FailpointInjector>,
        max_in_memory_transactions: usize,
    ) -> Self {
        let capacity = NonZeroUsize::new(max_in_memory_transactions)
            .unwrap_or(NonZeroUsize::MIN);
        Self {
            core,
            ledger,
            failpoints,
            states: Mutex::new(LruCache::new(capacity)),
            recovery_requests: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn core(&self) -> &Arc<B> {
        &self.core
    }

    pub fn ledger(&self) -> &Arc<L> {
        &self.ledger
    }

    pub fn failpoints(&self) -> &Arc<FailpointInjector> {
        &self.failpoints
    }

    // ========================================================================
    // Execute
    // ========================================================================

    /// Run a transfer to a final phase.
    ///
    /// Returns `Err` only for malformed requests, before any id is allocated.
    /// Every failure during the protocol itself is classified into the
    /// returned state.
    pub async fn execute_transfer(
        &self,
        request: TransferRequest,
    ) -> Result<TransferResult, TransferError> {
        validate_request(&request)?;

        let transaction_id = TransactionId::new();
        let mut state = TransactionState::new(transaction_id);
        self.save_state(&state);
        self.cache_recovery_request(transaction_id, &request);

        info!(
            transaction_id = %transaction_id,
            from = %request.from_account_id,
            to = %request.to_account_id,
            amount = %request.amount,
            "Transfer started"
        );

        let mut core_tx: Option<B::Tx> = None;
        let mut ledger_tx: Option<L::Tx> = None;

        if let Err(e) = self
            .run_protocol(&request, &mut state, &mut core_tx, &mut ledger_tx)
            .await
        {
            self.classify_failure(e, &request, &mut state, core_tx.take(), ledger_tx.take())
                .await;
        }

        // Release both connections whatever happened.
        drop(core_tx);
        drop(ledger_tx);

        if state.phase != CoordinatorPhase::InDoubt {
            self.clear_recovery_request(transaction_id);
        }

        Ok(TransferResult {
            success: state.phase == CoordinatorPhase::Committed,
            transaction_id,
            state,
        })
    }

    async fn run_protocol(
        &self,
        request: &TransferRequest,
        state: &mut TransactionState,
        core_tx: &mut Option<B::Tx>,
        ledger_tx: &mut Option<L::Tx>,
    ) -> Result<(), TransferError> {
        let fail_point = request.fail_point;
        let transaction_id = state.transaction_id;

        let core = core_tx.insert(self.core.begin().await?);
        let ledger = ledger_tx.insert(self.ledger.begin().await?);
        self.transition(state, CoordinatorPhase::Preparing);

        self.failpoints
            .assert_no_failure(FailPoint::BeforeCorePrepare, fail_point)?;
        self.core.prepare_transfer(core, request).await?;
        state.core_prepared = true;
        self.save_state(state);

        self.failpoints
            .assert_no_failure(FailPoint::BeforeLedgerPrepare, fail_point)?;
        self.ledger
            .insert_pending_transfer(ledger, transaction_id, request)
            .await?;
        state.ledger_prepared = true;
        self.transition(state, CoordinatorPhase::Prepared);

        // Both sides prepared, nothing committed yet.
        self.failpoints
            .assert_no_failure(FailPoint::BeforeCommit, fail_point)?;

        self.transition(state, CoordinatorPhase::Committing);

        for participant in COMMIT_ORDER {
            match participant {
                Participant::Core => {
                    let tx = take_open(core_tx, participant)?;
                    self.core.commit(tx).await?;
                    state.core_committed = true;
                    self.save_state(state);
                    debug!(transaction_id = %transaction_id, "Core committed");

                    self.failpoints
                        .assert_no_failure(FailPoint::AfterCoreCommit, fail_point)?;
                }
                Participant::Ledger => {
                    let ledger = ledger_tx
                        .as_mut()
                        .ok_or_else(|| not_open(participant))?;
                    self.ledger.mark_committed(ledger, transaction_id).await?;
                    let tx = take_open(ledger_tx, participant)?;
                    self.ledger.commit(tx).await?;
                    state.ledger_committed = true;
                    self.save_state(state);
                    debug!(transaction_id = %transaction_id, "Ledger committed");

                    self.failpoints
                        .assert_no_failure(FailPoint::AfterLedgerCommit, fail_point)?;
                }
            }
        }

        self.transition(state, CoordinatorPhase::Committed);
        info!(transaction_id = %transaction_id, "Transfer committed");
        Ok(())
    }

    /// Roll back what is still open and pick the final phase from what committed
    async fn classify_failure(
        &self,
        error: TransferError,
        request: &TransferRequest,
        state: &mut TransactionState,
        core_tx: Option<B::Tx>,
        ledger_tx: Option<L::Tx>,
    ) {
        let transaction_id = state.transaction_id;
        state.error_message = Some(error.to_string());
        if let Some(fp) = error.fail_point() {
            state.fail_point_triggered = Some(fp);
        }

        // An open transaction is by construction not committed.
        if let Some(tx) = core_tx {
            if let Err(e) = self.core.rollback(tx).await {
                state.append_error(rollback_failed(Participant::Core, &e));
            }
        }
        if let Some(tx) = ledger_tx {
            if let Err(e) = self.ledger.rollback(tx).await {
                state.append_error(rollback_failed(Participant::Ledger, &e));
            }
        }

        match (state.core_committed, state.ledger_committed) {
            (true, true) => {
                // Fault fired after both commits: economically complete.
                self.transition(state, CoordinatorPhase::Committed);
                info!(
                    transaction_id = %transaction_id,
                    error = %error,
                    "Transfer committed despite post-commit failure"
                );
            }
            (true, false) | (false, true) => {
                self.transition(state, CoordinatorPhase::InDoubt);
                error!(
                    transaction_id = %transaction_id,
                    core_committed = state.core_committed,
                    ledger_committed = state.ledger_committed,
                    error = %error,
                    "Transfer IN_DOUBT: one participant committed, recovery required"
                );
            }
            (false, false) => {
                self.transition(state, CoordinatorPhase::Aborted);
                state.rolled_back = true;
                if let Err(e) = self.ledger.record_aborted_transfer(transaction_id, request).await
                {
                    state.append_error(format!("failed to persist ABORTED status: {}", e));
                }
                warn!(
                    transaction_id = %transaction_id,
                    error = %error,
                    "Transfer aborted"
                );
            }
        }
        self.save_state(state);
    }

    // ========================================================================
    // Status
    // ========================================================================

    /// Look a transaction up in the state table, then in the ledger.
    ///
    /// Fails only when the id is not in the table and the ledger store cannot
    /// be read.
    pub async fn get_transaction_status(
        &self,
        transaction_id: TransactionId,
    ) -> Result<TransactionStatusResult, TransferError> {
        let state = self.state(transaction_id);

        let ledger_status = match self.ledger.get_transaction_status_by_id(transaction_id).await {
            Ok(status) => normalize_ledger_status(status),
            Err(e) if state.is_some() => {
                warn!(transaction_id = %transaction_id, error = %e, "Ledger status unavailable");
                None
            }
            Err(e) => return Err(e),
        };

        if state.is_none() && ledger_status.is_none() {
            return Ok(TransactionStatusResult::not_found(transaction_id));
        }

        let phase = match &state {
            Some(s) => Some(s.phase),
            None => ledger_status
                .as_deref()
                .and_then(CoordinatorPhase::from_ledger_status),
        };

        Ok(TransactionStatusResult {
            found: true,
            transaction_id,
            phase,
            ledger_status,
            state,
        })
    }

    // ========================================================================
    // Recovery
    // ========================================================================

    /// Resolve an IN_DOUBT transfer forward. Safe to call repeatedly.
    pub async fn recover_transaction(&self, transaction_id: TransactionId) -> RecoveryResult {
        match self.try_recover(transaction_id).await {
            Ok(result) => {
                info!(
                    transaction_id = %transaction_id,
                    success = result.success,
                    message = %result.message,
                    "Recovery finished"
                );
                result
            }
            Err(e) => {
                error!(transaction_id = %transaction_id, error = %e, "Recovery failed");
                RecoveryResult {
                    success: false,
                    transaction_id,
                    previous_ledger_status: None,
                    current_ledger_status: None,
                    message: format!("Recovery failed: {}", e),
                }
            }
        }
    }

    async fn try_recover(
        &self,
        transaction_id: TransactionId,
    ) -> Result<RecoveryResult, TransferError> {
        let previous = self.ledger_status(transaction_id).await?;
        let state = self.state(transaction_id);
        let request = self.recovery_request(transaction_id);

        let Some(previous) = previous else {
            return self
                .rebuild_missing_ledger_record(transaction_id, state, request)
                .await;
        };

        match LedgerStatus::parse(&previous) {
            Some(LedgerStatus::Committed) => Ok(RecoveryResult {
                success: true,
                transaction_id,
                previous_ledger_status: Some(previous.clone()),
                current_ledger_status: Some(previous),
                message: "Transaction is already committed.".to_string(),
            }),
            Some(LedgerStatus::Pending) => {
                let updated = self.ledger.mark_committed_by_id(transaction_id).await?;
                let current = self.ledger_status(transaction_id).await?;
                let committed = current.as_deref() == Some(LedgerStatus::Committed.as_str());

                if !committed {
                    return Ok(RecoveryResult {
                        success: false,
                        transaction_id,
                        previous_ledger_status: Some(previous),
                        current_ledger_status: current,
                        message: "Could not finalize transaction from PENDING to COMMITTED."
                            .to_string(),
                    });
                }

                self.mark_state_ledger_committed(transaction_id);
                self.clear_recovery_request(transaction_id);

                let message = if updated {
                    "Recovery committed the pending ledger transaction."
                } else {
                    "Transaction was committed by a concurrent recovery."
                };
                Ok(RecoveryResult {
                    success: true,
                    transaction_id,
                    previous_ledger_status: Some(previous),
                    current_ledger_status: current,
                    message: message.to_string(),
                })
            }
            _ => Ok(RecoveryResult {
                success: false,
                transaction_id,
                previous_ledger_status: Some(previous.clone()),
                current_ledger_status: Some(previous.clone()),
                message: format!(
                    "Recovery only supports {} transactions (found {}).",
                    LedgerStatus::Pending,
                    previous
                ),
            }),
        }
    }

    /// Core committed but no ledger row survived: rebuild it from the cached request
    async fn rebuild_missing_ledger_record(
        &self,
        transaction_id: TransactionId,
        state: Option<TransactionState>,
        request: Option<TransferRequest>,
    ) -> Result<RecoveryResult, TransferError> {
        let rebuildable = state.as_ref().is_some_and(|s| {
            s.phase == CoordinatorPhase::InDoubt && s.core_committed && !s.ledger_committed
        });

        let (true, Some(request)) = (rebuildable, request) else {
            return Ok(RecoveryResult {
                success: false,
                transaction_id,
                previous_ledger_status: None,
                current_ledger_status: None,
                message: "Transaction not found in ledger.".to_string(),
            });
        };

        self.ledger
            .upsert_committed_transfer_with_entries(transaction_id, &request)
            .await?;
        let current = self.ledger_status(transaction_id).await?;

        if current.as_deref() != Some(LedgerStatus::Committed.as_str()) {
            return Ok(RecoveryResult {
                success: false,
                transaction_id,
                previous_ledger_status: None,
                current_ledger_status: current,
                message: "Could not reconstruct missing ledger transaction.".to_string(),
            });
        }

        self.mark_state_ledger_committed(transaction_id);
        self.clear_recovery_request(transaction_id);

        Ok(RecoveryResult {
            success: true,
            transaction_id,
            previous_ledger_status: None,
            current_ledger_status: current,
            message: "Recovery reconstructed and committed missing ledger transaction."
                .to_string(),
        })
    }

    fn mark_state_ledger_committed(&self, transaction_id: TransactionId) {
        let Some(mut state) = self.state(transaction_id) else {
            return;
        };
        state.ledger_committed = true;
        if state.core_committed {
            self.transition(&mut state, CoordinatorPhase::Committed);
        } else {
            self.save_state(&state);
        }
    }

    /// Ids of every IN_DOUBT transaction still in the state table
    pub fn in_doubt_ids(&self) -> Vec<TransactionId> {
        lock(&self.states)
            .iter()
            .filter(|(_, s)| s.phase == CoordinatorPhase::InDoubt)
            .map(|(id, _)| *id)
            .collect()
    }

    // ========================================================================
    // Health
    // ========================================================================

    /// Probe both stores independently
    pub async fn health_check(&self) -> HealthCheckResult {
        let (core, ledger) = tokio::join!(self.core.ping(), self.ledger.ping());

        let probe = |participant: Participant, result: Result<(), TransferError>| match result {
            Ok(()) => StoreHealth::Up,
            Err(e) => {
                warn!(store = participant.as_str(), error = %e, "Health probe failed");
                StoreHealth::Down
            }
        };
        let core_db = probe(Participant::Core, core);
        let ledger_db = probe(Participant::Ledger, ledger);

        HealthCheckResult {
            ok: core_db == StoreHealth::Up && ledger_db == StoreHealth::Up,
            core_db,
            ledger_db,
        }
    }

    // ========================================================================
    // State table
    // ========================================================================

    /// Snapshot of one transaction, if still in the table
    pub fn state(&self, transaction_id: TransactionId) -> Option<TransactionState> {
        lock(&self.states).peek(&transaction_id).cloned()
    }

    /// Live entries in the state table
    pub fn tracked_transactions(&self) -> usize {
        lock(&self.states).len()
    }

    pub fn has_recovery_request(&self, transaction_id: TransactionId) -> bool {
        lock(&self.recovery_requests).contains(&transaction_id)
    }

    fn transition(&self, state: &mut TransactionState, next: CoordinatorPhase) {
        let from = state.phase;
        if !state.advance(next) {
            error!(
                transaction_id = %state.transaction_id,
                from = %from,
                to = %next,
                "Refusing backward phase transition"
            );
        }
        self.save_state(state);
    }

    /// Store a snapshot; updates keep the entry's original eviction position.
    fn save_state(&self, state: &TransactionState) {
        let mut states = lock(&self.states);
        match states.peek_mut(&state.transaction_id) {
            Some(existing) => *existing = state.clone(),
            None => {
                states.put(state.transaction_id, state.clone());
            }
        }
    }

    fn cache_recovery_request(&self, transaction_id: TransactionId, request: &TransferRequest) {
        lock(&self.recovery_requests).put(transaction_id, request.clone());
    }

    fn recovery_request(&self, transaction_id: TransactionId) -> Option<TransferRequest> {
        lock(&self.recovery_requests).peek(&transaction_id).cloned()
    }

    fn clear_recovery_request(&self, transaction_id: TransactionId) {
        lock(&self.recovery_requests).pop(&transaction_id);
    }

    async fn ledger_status(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Option<String>, TransferError> {
        Ok(normalize_ledger_status(
            self.ledger.get_transaction_status_by_id(transaction_id).await?,
        ))
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

fn rollback_failed(participant: Participant, error: &TransferError) -> String {
    format!("{} rollback failed: {}", participant.as_str(), error)
}

fn not_open(participant: Participant) -> TransferError {
    TransferError::Store(format!("{} transaction is not open", participant.as_str()))
}

fn take_open<T>(slot: &mut Option<T>, participant: Participant) -> Result<T, TransferError> {
    slot.take().ok_or_else(|| not_open(participant))
}

/// Reject malformed requests before any id is allocated
pub fn validate_request(request: &TransferRequest) -> Result<(), TransferError> {
    if request.amount <= Decimal::ZERO {
        return Err(TransferError::validation(
            "Transfer amount must be a positive number.",
        ));
    }

    let ids = [
        &request.from_user_id,
        &request.to_user_id,
        &request.from_account_id,
        &request.to_account_id,
    ];
    if ids.iter().any(|id| id.trim().is_empty()) {
        return Err(TransferError::validation(
            "Transfer request is missing required identifiers.",
        ));
    }

    if request.from_account_id == request.to_account_id {
        return Err(TransferError::validation(
            "Source and destination accounts must be different.",
        ));
    }
    Ok(())
}
