//! OpenAPI Documentation
//!
//! Auto-generated OpenAPI 3.0 documentation for the transactions API.
//!
//! - OpenAPI JSON: `http://localhost:3000/api-docs/openapi.json`
//! - Offline export: `cargo run --bin export_openapi`

use utoipa::{Modify, OpenApi};

use crate::gateway::types::TransferBody;
use crate::transfer::{
    CoordinatorPhase, FailPoint, HealthCheckResult, RecoveryResult, StoreHealth,
    TransactionState, TransactionStatusResult, TransferResult,
};

/// Adds the failpoint endpoints when they are compiled in
struct MockApiAddon;

impl Modify for MockApiAddon {
    #[allow(unused_variables)]
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        #[cfg(feature = "mock-api")]
        openapi.merge(MockApiDoc::openapi());
    }
}

#[cfg(feature = "mock-api")]
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::gateway::handlers::get_failpoint,
        crate::gateway::handlers::set_failpoint,
    ),
    components(schemas(
        crate::gateway::types::FailpointBody,
        crate::gateway::types::FailpointStatus
    ))
)]
struct MockApiDoc;

/// Main API Documentation struct
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Twin Ledger Transactions API",
        version = "1.0.0",
        description = "Transfers across a core balance store and an independent double-entry ledger store, with forward-only recovery of in-doubt transactions.",
        license(
            name = "MIT"
        )
    ),
    servers(
        (url = "http://localhost:3000", description = "Development"),
    ),
    paths(
        crate::gateway::handlers::health_check,
        crate::gateway::handlers::create_transfer,
        crate::gateway::handlers::get_transaction,
        crate::gateway::handlers::recover_transaction,
    ),
    components(
        schemas(
            TransferBody,
            TransferResult,
            TransactionState,
            TransactionStatusResult,
            RecoveryResult,
            HealthCheckResult,
            StoreHealth,
            CoordinatorPhase,
            FailPoint,
        )
    ),
    modifiers(&MockApiAddon),
    tags(
        (name = "Transactions", description = "Transfers, status and recovery"),
        (name = "Testing", description = "Failpoint control (mock-api builds only)"),
        (name = "System", description = "Health checks")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use utoipa::OpenApi;

    #[test]
    fn test_openapi_spec_generates() {
        let spec = ApiDoc::openapi();
        assert_eq!(spec.info.title, "Twin Ledger Transactions API");
        assert_eq!(spec.info.version, "1.0.0");
    }

    #[test]
    fn test_openapi_json_serializable() {
        let json_str = ApiDoc::openapi().to_json().unwrap();
        assert!(json_str.contains("Twin Ledger Transactions API"));
        assert!(json_str.contains("AFTER_CORE_COMMIT"));
    }

    #[test]
    fn test_transaction_endpoints_registered() {
        let paths = ApiDoc::openapi().paths;
        assert!(paths.paths.contains_key("/api/v1/transactions/transfer"));
        assert!(paths.paths.contains_key("/api/v1/transactions/{tx_id}"));
        assert!(paths.paths.contains_key("/api/v1/transactions/{tx_id}/recover"));
        assert!(paths.paths.contains_key("/api/v1/transactions/health"));
    }

    #[cfg(feature = "mock-api")]
    #[test]
    fn test_failpoint_endpoint_registered_with_mock_api() {
        let paths = ApiDoc::openapi().paths;
        assert!(paths.paths.contains_key("/api/v1/transactions/failpoint"));
    }
}
