//! Transfer Error Types

use thiserror::Error;

use super::failpoint::FailPoint;

/// Transfer error types
///
/// Only `Validation` ever escapes `execute_transfer`; everything else is
/// caught by the coordinator and folded into the transaction state.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransferError {
    // === Validation Errors ===
    #[error("{0}")]
    Validation(String),

    // === Account Errors ===
    #[error("One or both accounts were not found in core balances")]
    AccountNotFound,

    #[error("Insufficient funds in source account")]
    InsufficientFunds,

    // === Fault Injection ===
    #[error("Simulated network partition at stage: {0}")]
    PartitionSimulated(FailPoint),

    // === System Errors ===
    #[error("Store error: {0}")]
    Store(String),

    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),
}

impl TransferError {
    pub fn validation(msg: impl Into<String>) -> Self {
        TransferError::Validation(msg.into())
    }

    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            TransferError::Validation(_) => "VALIDATION_ERROR",
            TransferError::AccountNotFound => "ACCOUNT_NOT_FOUND",
            TransferError::InsufficientFunds => "INSUFFICIENT_FUNDS",
            TransferError::PartitionSimulated(_) => "PARTITION_SIMULATED",
            TransferError::Store(_) => "STORE_ERROR",
            TransferError::TransactionNotFound(_) => "TRANSACTION_NOT_FOUND",
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            TransferError::Validation(_) => 400,
            TransferError::TransactionNotFound(_) => 404,
            TransferError::AccountNotFound
            | TransferError::InsufficientFunds
            | TransferError::PartitionSimulated(_) => 409,
            TransferError::Store(_) => 503,
        }
    }

    /// The checkpoint that raised this error, if it was injected
    pub fn fail_point(&self) -> Option<FailPoint> {
        match self {
            TransferError::PartitionSimulated(fp) => Some(*fp),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for TransferError {
    fn from(e: sqlx::Error) -> Self {
        TransferError::Store(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(TransferError::AccountNotFound.code(), "ACCOUNT_NOT_FOUND");
        assert_eq!(TransferError::InsufficientFunds.code(), "INSUFFICIENT_FUNDS");
        assert_eq!(
            TransferError::PartitionSimulated(FailPoint::BeforeCommit).code(),
            "PARTITION_SIMULATED"
        );
    }

    #[test]
    fn test_http_status() {
        assert_eq!(TransferError::validation("bad").http_status(), 400);
        assert_eq!(TransferError::TransactionNotFound("x".into()).http_status(), 404);
        assert_eq!(TransferError::InsufficientFunds.http_status(), 409);
        assert_eq!(TransferError::Store("down".into()).http_status(), 503);
    }

    #[test]
    fn test_display_names_checkpoint() {
        let err = TransferError::PartitionSimulated(FailPoint::AfterCoreCommit);
        assert_eq!(
            err.to_string(),
            "Simulated network partition at stage: AFTER_CORE_COMMIT"
        );
        assert_eq!(err.fail_point(), Some(FailPoint::AfterCoreCommit));
        assert_eq!(TransferError::AccountNotFound.fail_point(), None);
    }
}
