//! Failpoint control (mock-api builds only)

use std::sync::Arc;

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};

use super::super::state::AppState;
use super::super::types::{ApiError, ApiResponse, ApiResult, FailpointBody, FailpointStatus, ok};
use crate::transfer::{FailPoint, FailpointInjector};

fn snapshot(injector: &FailpointInjector) -> FailpointStatus {
    let active = injector.active();
    FailpointStatus {
        enabled: active.is_some(),
        fail_point: active,
        one_shot: injector.is_one_shot(),
        available: injector.available().to_vec(),
    }
}

/// Current process-wide checkpoint
///
/// GET /api/v1/transactions/failpoint
#[utoipa::path(
    get,
    path = "/api/v1/transactions/failpoint",
    responses((status = 200, description = "Current checkpoint", body = ApiResponse<FailpointStatus>)),
    tag = "Testing"
)]
pub async fn get_failpoint(State(state): State<Arc<AppState>>) -> ApiResult<FailpointStatus> {
    ok(snapshot(state.transfers.failpoints()))
}

/// Arm or clear the process-wide checkpoint
///
/// POST /api/v1/transactions/failpoint
///
/// Enabling without a name arms BEFORE_COMMIT; `one_shot` defaults to true.
#[utoipa::path(
    post,
    path = "/api/v1/transactions/failpoint",
    request_body = FailpointBody,
    responses(
        (status = 200, description = "Checkpoint updated", body = ApiResponse<FailpointStatus>),
        (status = 400, description = "Unknown checkpoint name")
    ),
    tag = "Testing"
)]
pub async fn set_failpoint(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<FailpointBody>, JsonRejection>,
) -> ApiResult<FailpointStatus> {
    let Json(body) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let injector = state.transfers.failpoints();

    if !body.enabled {
        injector.clear();
        tracing::info!("Failpoint cleared");
        return ok(snapshot(injector));
    }

    let fail_point = match body.fail_point.as_deref() {
        None => FailPoint::BeforeCommit,
        Some(name) => name
            .parse::<FailPoint>()
            .map_err(|_| ApiError::bad_request(format!("Unknown fail point: {}", name)))?,
    };
    injector.set(fail_point, body.one_shot.unwrap_or(true));

    ok(snapshot(injector))
}
