//! Twin Ledger - transfers across two independent stores
//!
//! A money transfer touches two PostgreSQL databases that share no
//! transaction manager: the core store (balances) and the ledger store
//! (double-entry journal). The coordinator prepares both, commits core then
//! ledger, and resolves the one partial outcome that can remain by recovering
//! forward.
//!
//! # Modules
//!
//! - [`transfer`] - Coordinator, repositories, failpoints, recovery worker
//! - [`gateway`] - HTTP API (axum) and OpenAPI document
//! - [`db`] - PostgreSQL pool construction
//! - [`config`] - YAML configuration with environment overrides
//! - [`logging`] - tracing subscriber setup

pub mod config;
pub mod db;
pub mod gateway;
pub mod logging;
pub mod transfer;

// Convenient re-exports at crate root
pub use transfer::{
    CoordinatorPhase, FailPoint, FailpointInjector, TransactionId, TransferCoordinator,
    TransferError, TransferRequest,
};
