//! Shared types for the Mercat marketplace
//!
//! Common types used by the market server and its clients: error codes,
//! response structures, the order status state machine, database models and
//! ID/time utilities.

pub mod error;
pub mod models;
pub mod order;
pub mod util;

// Re-exports
pub use serde::{Deserialize, Serialize};

pub use error::{ApiResponse, AppError, AppResult, ErrorCategory, ErrorCode};
pub use order::OrderStatus;
