//! Storage Module
//!
//! SQLite persistence for the casino ledger. The store owns the schema
//! and every read/write; balance mutations go through `with_tx` so the
//! wallet lock, balance update, and ledger append commit atomically.

pub mod sqlite;

use thiserror::Error;

pub use sqlite::SqliteCasinoStore;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("record not found: {0}")]
    NotFound(String),

    /// A unique constraint rejected the write. For ledger entries this
    /// is the idempotency anchor: the caller re-reads the winning row.
    #[error("duplicate record: {0}")]
    Duplicate(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("connection error: {0}")]
    Connection(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
