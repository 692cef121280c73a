//! Health check handler

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode};

use super::super::state::AppState;
use super::super::types::{ApiResponse, error_codes};
use crate::transfer::HealthCheckResult;

/// Health check endpoint
///
/// Probes both stores independently.
///
/// - Healthy: 200 OK + {code: 0, data: {ok, core_db, ledger_db}}
/// - Unhealthy: 503 Service Unavailable, same body with the failing store `down`
#[utoipa::path(
    get,
    path = "/api/v1/transactions/health",
    responses(
        (status = 200, description = "Both stores reachable", body = ApiResponse<HealthCheckResult>),
        (status = 503, description = "At least one store unreachable", body = ApiResponse<HealthCheckResult>)
    ),
    tag = "System"
)]
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<ApiResponse<HealthCheckResult>>) {
    let health = state.transfers.health_check().await;

    if health.ok {
        (StatusCode::OK, Json(ApiResponse::success(health)))
    } else {
        tracing::error!(
            core_db = ?health.core_db,
            ledger_db = ?health.ledger_db,
            "[HEALTH] store unavailable"
        );
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiResponse::failure(
                error_codes::SERVICE_UNAVAILABLE,
                "unavailable",
                health,
            )),
        )
    }
}
