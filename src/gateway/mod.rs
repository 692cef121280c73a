pub mod handlers;
pub mod openapi;
pub mod state;
pub mod types;

use axum::{
    Json, Router,
    routing::{get, post},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use utoipa::OpenApi;

use state::AppState;

/// Build the HTTP router
pub fn router(state: Arc<AppState>) -> Router {
    let transaction_routes = Router::new()
        .route("/transfer", post(handlers::create_transfer))
        .route("/health", get(handlers::health_check))
        .route("/{tx_id}", get(handlers::get_transaction))
        .route("/{tx_id}/recover", post(handlers::recover_transaction));

    // [SECURITY] Failpoint control is only compiled when 'mock-api' is enabled.
    // Production builds MUST use `--no-default-features`.
    #[cfg(feature = "mock-api")]
    let transaction_routes = transaction_routes.route(
        "/failpoint",
        get(handlers::get_failpoint).post(handlers::set_failpoint),
    );

    Router::new()
        .route("/api/v1/health", get(handlers::health_check))
        .nest("/api/v1/transactions", transaction_routes)
        .with_state(state)
        // stateless, added after with_state
        .route(
            "/api-docs/openapi.json",
            get(|| async { Json(openapi::ApiDoc::openapi()) }),
        )
}

/// Start HTTP Gateway server
pub async fn run_server(host: &str, port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = router(state);

    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to bind to {}: {} (port {} may already be in use)",
            addr,
            e,
            port
        )
    })?;

    tracing::info!(addr = %addr, "Gateway listening");
    tracing::info!("Transactions API: /api/v1/transactions/*");
    tracing::info!("OpenAPI: /api-docs/openapi.json");
    #[cfg(feature = "mock-api")]
    tracing::warn!("mock-api enabled: /api/v1/transactions/failpoint is exposed");

    axum::serve(listener, app).await?;
    Ok(())
}
