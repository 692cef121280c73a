//! HTTP handlers

#[cfg(feature = "mock-api")]
pub mod failpoint;
pub mod health;
pub mod transfer;

#[cfg(feature = "mock-api")]
pub use failpoint::{get_failpoint, set_failpoint};
pub use health::health_check;
pub use transfer::{create_transfer, get_transaction, recover_transaction};

// utoipa path structs live next to their handlers
#[cfg(feature = "mock-api")]
pub use failpoint::{__path_get_failpoint, __path_set_failpoint};
pub use health::__path_health_check;
pub use transfer::{__path_create_transfer, __path_get_transaction, __path_recover_transaction};
