//! Transfer handlers (execute, status, recover)

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};

use super::super::state::AppState;
use super::super::types::{ApiError, ApiResponse, ApiResult, TransferBody, error_codes, ok};
use crate::transfer::{
    RecoveryResult, TransactionId, TransactionStatusResult, TransferError, TransferResult,
};

fn parse_transaction_id(raw: &str) -> Result<TransactionId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::bad_request(format!("Invalid transaction id: {}", raw)))
}

/// Execute a transfer
///
/// POST /api/v1/transactions/transfer
///
/// - 200: COMMITTED
/// - 409: ABORTED or IN_DOUBT (result still in `data`)
/// - 400: malformed request
#[utoipa::path(
    post,
    path = "/api/v1/transactions/transfer",
    request_body = TransferBody,
    responses(
        (status = 200, description = "Transfer committed", body = ApiResponse<TransferResult>),
        (status = 409, description = "Transfer aborted or in doubt", body = ApiResponse<TransferResult>),
        (status = 400, description = "Invalid parameters")
    ),
    tag = "Transactions"
)]
pub async fn create_transfer(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<TransferBody>, JsonRejection>,
) -> ApiResult<TransferResult> {
    let Json(body) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let request = body.into_request(state.default_fail_point())?;

    let result = state.transfers.execute_transfer(request).await?;

    if result.success {
        return ok(result);
    }

    let msg = result
        .state
        .error_message
        .clone()
        .unwrap_or_else(|| format!("Transfer ended {}", result.state.phase));
    Ok((
        StatusCode::CONFLICT,
        Json(ApiResponse::failure(error_codes::TRANSFER_FAILED, msg, result)),
    ))
}

/// Transaction status
///
/// GET /api/v1/transactions/{tx_id}
#[utoipa::path(
    get,
    path = "/api/v1/transactions/{tx_id}",
    params(("tx_id" = String, Path, description = "Transaction id (UUID)")),
    responses(
        (status = 200, description = "Transaction found", body = ApiResponse<TransactionStatusResult>),
        (status = 404, description = "Unknown transaction id"),
        (status = 400, description = "Malformed transaction id"),
        (status = 503, description = "Ledger store unavailable")
    ),
    tag = "Transactions"
)]
pub async fn get_transaction(
    State(state): State<Arc<AppState>>,
    Path(tx_id): Path<String>,
) -> ApiResult<TransactionStatusResult> {
    let transaction_id = parse_transaction_id(&tx_id)?;
    let status = state.transfers.get_transaction_status(transaction_id).await?;

    if !status.found {
        return Err(TransferError::TransactionNotFound(transaction_id.to_string()).into());
    }
    ok(status)
}

/// Recover an IN_DOUBT transaction
///
/// POST /api/v1/transactions/{tx_id}/recover
///
/// Idempotent: an already committed transaction reports success again.
#[utoipa::path(
    post,
    path = "/api/v1/transactions/{tx_id}/recover",
    params(("tx_id" = String, Path, description = "Transaction id (UUID)")),
    responses(
        (status = 200, description = "Transaction committed", body = ApiResponse<RecoveryResult>),
        (status = 404, description = "Transaction not found", body = ApiResponse<RecoveryResult>),
        (status = 409, description = "Recovery not possible", body = ApiResponse<RecoveryResult>),
        (status = 400, description = "Malformed transaction id")
    ),
    tag = "Transactions"
)]
pub async fn recover_transaction(
    State(state): State<Arc<AppState>>,
    Path(tx_id): Path<String>,
) -> ApiResult<RecoveryResult> {
    let transaction_id = parse_transaction_id(&tx_id)?;
    let result = state.transfers.recover_transaction(transaction_id).await;

    if result.success {
        return ok(result);
    }

    let (status, code) = if result.is_not_found() {
        (StatusCode::NOT_FOUND, error_codes::TRANSACTION_NOT_FOUND)
    } else {
        (StatusCode::CONFLICT, error_codes::RECOVERY_FAILED)
    };
    let msg = result.message.clone();
    Ok((status, Json(ApiResponse::failure(code, msg, result))))
}
