//! Transfer Types
//!
//! Request, state snapshot and result types shared by the coordinator,
//! the repositories and the gateway.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::failpoint::FailPoint;
use super::state::CoordinatorPhase;

/// Coordinator-assigned transaction id (UUID v4, never reused)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(Uuid);

impl TransactionId {
    /// Allocate a fresh id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TransactionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// A request to move `amount` from one account to another.
///
/// Built by the gateway (or a test) and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TransferRequest {
    pub from_user_id: String,
    pub to_user_id: String,
    pub from_account_id: String,
    pub to_account_id: String,
    #[schema(value_type = String, example = "40.00")]
    pub amount: Decimal,
    /// Request-scoped checkpoint that forces a simulated partition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_point: Option<FailPoint>,
}

impl TransferRequest {
    pub fn new(
        from_user_id: impl Into<String>,
        to_user_id: impl Into<String>,
        from_account_id: impl Into<String>,
        to_account_id: impl Into<String>,
        amount: Decimal,
    ) -> Self {
        Self {
            from_user_id: from_user_id.into(),
            to_user_id: to_user_id.into(),
            from_account_id: from_account_id.into(),
            to_account_id: to_account_id.into(),
            amount,
            fail_point: None,
        }
    }

    /// Attach a request-scoped checkpoint
    pub fn with_fail_point(mut self, fail_point: FailPoint) -> Self {
        self.fail_point = Some(fail_point);
        self
    }
}

/// Snapshot of one transfer attempt as seen by the coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TransactionState {
    #[schema(value_type = String, format = Uuid)]
    pub transaction_id: TransactionId,
    pub phase: CoordinatorPhase,
    pub core_prepared: bool,
    pub ledger_prepared: bool,
    pub core_committed: bool,
    pub ledger_committed: bool,
    pub rolled_back: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_point_triggered: Option<FailPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl TransactionState {
    pub fn new(transaction_id: TransactionId) -> Self {
        Self {
            transaction_id,
            phase: CoordinatorPhase::Init,
            core_prepared: false,
            ledger_prepared: false,
            core_committed: false,
            ledger_committed: false,
            rolled_back: false,
            fail_point_triggered: None,
            error_message: None,
        }
    }

    /// Move to `next` if the phase ordering allows it.
    ///
    /// Returns false (and leaves the phase untouched) on a backward move.
    pub fn advance(&mut self, next: CoordinatorPhase) -> bool {
        if self.phase.can_transition_to(next) {
            self.phase = next;
            true
        } else {
            false
        }
    }

    /// Append a secondary failure to the error message
    pub fn append_error(&mut self, detail: impl AsRef<str>) {
        let detail = detail.as_ref();
        self.error_message = Some(match self.error_message.take() {
            Some(existing) => format!("{}; {}", existing, detail),
            None => detail.to_string(),
        });
    }
}

/// Journal header status as persisted in the ledger store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedgerStatus {
    Pending,
    Committed,
    Aborted,
}

impl LedgerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerStatus::Pending => "PENDING",
            LedgerStatus::Committed => "COMMITTED",
            LedgerStatus::Aborted => "ABORTED",
        }
    }

    /// Parse a raw status column value (case-insensitive)
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_uppercase().as_str() {
            "PENDING" => Some(LedgerStatus::Pending),
            "COMMITTED" => Some(LedgerStatus::Committed),
            "ABORTED" => Some(LedgerStatus::Aborted),
            _ => None,
        }
    }
}

impl fmt::Display for LedgerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalize a raw ledger status string to the canonical upper case form
pub fn normalize_ledger_status(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_uppercase()).filter(|s| !s.is_empty())
}

/// Ledger header row
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct LedgerTransaction {
    #[schema(value_type = String, format = Uuid)]
    pub transaction_id: TransactionId,
    pub from_account_id: String,
    pub to_account_id: String,
    #[schema(value_type = String)]
    pub amount: Decimal,
    pub status: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// One signed journal row
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct LedgerEntry {
    #[schema(value_type = String, format = Uuid)]
    pub transaction_id: TransactionId,
    pub account_id: String,
    #[schema(value_type = String)]
    pub amount: Decimal,
}

/// Build the debit/credit pair for a transfer. Always nets to zero.
pub fn entry_pair(transaction_id: TransactionId, request: &TransferRequest) -> [LedgerEntry; 2] {
    [
        LedgerEntry {
            transaction_id,
            account_id: request.from_account_id.clone(),
            amount: -request.amount,
        },
        LedgerEntry {
            transaction_id,
            account_id: request.to_account_id.clone(),
            amount: request.amount,
        },
    ]
}

// ============================================================================
// Coordinator results
// ============================================================================

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TransferResult {
    pub success: bool,
    #[schema(value_type = String, format = Uuid)]
    pub transaction_id: TransactionId,
    pub state: TransactionState,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TransactionStatusResult {
    pub found: bool,
    #[schema(value_type = String, format = Uuid)]
    pub transaction_id: TransactionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<CoordinatorPhase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ledger_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<TransactionState>,
}

impl TransactionStatusResult {
    pub fn not_found(transaction_id: TransactionId) -> Self {
        Self {
            found: false,
            transaction_id,
            phase: None,
            ledger_status: None,
            state: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RecoveryResult {
    pub success: bool,
    #[schema(value_type = String, format = Uuid)]
    pub transaction_id: TransactionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_ledger_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_ledger_status: Option<String>,
    pub message: String,
}

impl RecoveryResult {
    /// True when the failure is plain absence rather than a stuck record
    pub fn is_not_found(&self) -> bool {
        !self.success && self.message.contains("not found")
    }
}

/// Per-store probe outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum StoreHealth {
    Up,
    Down,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HealthCheckResult {
    pub ok: bool,
    pub core_db: StoreHealth,
    pub ledger_db: StoreHealth,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_transaction_id_unique_and_parse() {
        let a = TransactionId::new();
        let b = TransactionId::new();
        assert_ne!(a, b);

        let parsed: TransactionId = a.to_string().parse().unwrap();
        assert_eq!(parsed, a);
        assert!("not-a-uuid".parse::<TransactionId>().is_err());
    }

    #[test]
    fn test_entry_pair_nets_to_zero() {
        let req = TransferRequest::new("u1", "u2", "acc-a", "acc-b", dec!(40.00));
        let pair = entry_pair(TransactionId::new(), &req);

        assert_eq!(pair[0].account_id, "acc-a");
        assert_eq!(pair[0].amount, dec!(-40.00));
        assert_eq!(pair[1].account_id, "acc-b");
        assert_eq!(pair[0].amount + pair[1].amount, Decimal::ZERO);
    }

    #[test]
    fn test_ledger_status_parse_is_case_insensitive() {
        assert_eq!(LedgerStatus::parse("pending"), Some(LedgerStatus::Pending));
        assert_eq!(LedgerStatus::parse(" Committed "), Some(LedgerStatus::Committed));
        assert_eq!(LedgerStatus::parse("ABORTED"), Some(LedgerStatus::Aborted));
        assert_eq!(LedgerStatus::parse("archived"), None);
        assert_eq!(
            normalize_ledger_status(Some("pending".into())),
            Some("PENDING".to_string())
        );
        assert_eq!(normalize_ledger_status(Some("  ".into())), None);
    }

    #[test]
    fn test_append_error_joins_parts() {
        let mut state = TransactionState::new(TransactionId::new());
        state.append_error("boom");
        state.append_error("core rollback failed: gone");
        assert_eq!(
            state.error_message.as_deref(),
            Some("boom; core rollback failed: gone")
        );
    }

    #[test]
    fn test_advance_refuses_backward_moves() {
        let mut state = TransactionState::new(TransactionId::new());
        assert!(state.advance(CoordinatorPhase::Preparing));
        assert!(state.advance(CoordinatorPhase::Prepared));
        assert!(!state.advance(CoordinatorPhase::Init));
        assert_eq!(state.phase, CoordinatorPhase::Prepared);
    }

    #[test]
    fn test_request_serde_uses_checkpoint_names() {
        let req = TransferRequest::new("u1", "u2", "a", "b", Decimal::ONE)
            .with_fail_point(FailPoint::AfterCoreCommit);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["fail_point"], "AFTER_CORE_COMMIT");
    }
}
