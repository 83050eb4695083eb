//! 工具模块 - 通用工具函数和类型
//!
//! # 内容
//!
//! - [`AppError`] / [`AppResult`] - 应用错误类型 (from shared::error)
//! - [`TtlCache`] - 有界 TTL 缓存
//! - 日志工具

pub mod cache;
pub mod logger;

// Re-export error types from shared so handlers have one import path
pub use shared::error::{ApiResponse, AppError, AppResult, ErrorCategory, ErrorCode};

pub use cache::TtlCache;
