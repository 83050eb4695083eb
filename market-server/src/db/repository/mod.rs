//! Repository Module
//!
//! CRUD and conditional-update access to the SQLite tables. Functions that
//! must participate in a caller-managed transaction take
//! `&mut SqliteConnection`; the rest take the pool.

pub mod offer;
pub mod order;
pub mod product;
pub mod shop;

use thiserror::Error;

/// Repository error types
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate: {0}")]
    Duplicate(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for RepoError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                RepoError::Duplicate(err.to_string())
            }
            _ => RepoError::Database(err.to_string()),
        }
    }
}

impl From<RepoError> for shared::error::AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound(what) => shared::error::AppError::not_found(what),
            RepoError::Duplicate(what) => shared::error::AppError::conflict(what),
            RepoError::Database(msg) => shared::error::AppError::database(msg),
        }
    }
}

/// Result type for repository operations
pub type RepoResult<T> = Result<T, RepoError>;
