//! # Optimus Storage
//!
//! Operation store implementations behind the `optimus-core` store traits:
//! a Postgres backend for production and an in-memory backend for tests and
//! embedded use. SQL is runtime-checked (`sqlx::query*`); DDL lives outside
//! this crate.

pub mod memory;
pub mod models;
pub mod postgres;

pub use memory::InMemoryStore;
pub use postgres::{PoolConfig, PostgresStore};

/// Result type for storage-internal operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while talking to the underlying database
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("record already exists: {0}")]
    AlreadyExists(String),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("connection failed: {0}")]
    ConnectionFailed(String),
}

impl From<Error> for optimus_core::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::NotFound(msg) => optimus_core::Error::not_found("store", msg),
            Error::AlreadyExists(msg) => optimus_core::Error::already_exists("store", msg),
            Error::ValidationError(msg) => optimus_core::Error::invalid_argument("store", msg),
            Error::Database(e) => optimus_core::Error::internal("store", e),
            Error::ConnectionFailed(msg) => optimus_core::Error::unavailable("store", msg),
        }
    }
}
