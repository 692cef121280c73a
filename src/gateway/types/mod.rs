//! Gateway types module
//!
//! ## Input Types
//! - [`AmountInput`]: String-or-number amount from HTTP requests
//! - [`TransferBody`], [`FailpointBody`]: request bodies
//!
//! ## Output Types
//! - [`ApiResponse<T>`]: Unified API response wrapper
//! - [`ApiError`]: Error response
//!
//! ## Submodules
//! - [`money`]: Amount parsing
//! - [`transfer`]: Transfer request/response DTOs
//! - [`response`]: Response types and error codes

pub mod money;
pub mod response;
pub mod transfer;

// Re-export commonly used types at module root
pub use money::AmountInput;
pub use response::{ApiError, ApiResponse, ApiResult, error_codes, ok};
pub use transfer::{FailpointBody, FailpointStatus, TransferBody};
