//! Ledger Engine Module
//!
//! The transactional heart of the casino: idempotent debits and credits,
//! balance reads, and the rollback policy engine. Every money movement
//! is keyed by a caller-supplied external transaction id; a duplicate
//! submit replays the response cached on first success.

pub mod service;

use thiserror::Error;

pub use service::LedgerService;

use crate::storage::StorageError;
use crate::types::CachedResponse;

/// Ledger operation errors surfaced to callback handlers
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("session missing or inactive")]
    InvalidSession,

    #[error("invalid amount: {0}")]
    InvalidAmount(i64),

    #[error("insufficient funds: balance {balance}, requested {requested}")]
    InsufficientFunds { balance: i64, requested: i64 },

    #[error("cannot roll back a payout: {0}")]
    CannotRollbackPayout(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl LedgerError {
    /// Error code surfaced in API responses
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidSession => "INVALID_SESSION",
            Self::InvalidAmount(_) => "INVALID_AMOUNT",
            Self::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            Self::CannotRollbackPayout(_) => "CANNOT_ROLLBACK_PAYOUT",
            Self::Storage(_) => "INTERNAL_ERROR",
        }
    }
}

/// Outcome of a money-moving operation: the response body to return and
/// whether it was replayed from the ledger instead of freshly written.
#[derive(Debug, Clone)]
pub struct LedgerReply {
    pub response: CachedResponse,
    pub duplicate: bool,
}

impl LedgerReply {
    pub fn fresh(response: CachedResponse) -> Self {
        Self {
            response,
            duplicate: false,
        }
    }

    pub fn replayed(response: CachedResponse) -> Self {
        Self {
            response,
            duplicate: true,
        }
    }
}
