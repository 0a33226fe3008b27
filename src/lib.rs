//! chipvault - Casino Wallet Ledger
//!
//! The casino side of a casino/game-provider integration: the
//! authoritative wallet ledger and the callback surface the provider
//! calls during a round. Players launch games here; the provider debits
//! bets, credits payouts, and rolls back bets through signed callbacks.
//!
//! Guarantees:
//! - Concurrent debits on one wallet serialize through the database
//!   writer lock; balances never go negative.
//! - Every money-moving request is exactly-once at the balance level:
//!   the caller-supplied transaction id is unique across the ledger and
//!   duplicates replay the response stored on first success.
//! - Rollbacks reverse bets only, at most once, and record zero-amount
//!   tombstones for bets the ledger has never seen.
//!
//! ## Module Organization
//!
//! - `common/` - root error type
//! - `config` - environment configuration
//! - `logging` - tracing setup, correlation ids, security events
//! - `signature` - HMAC-SHA256 request signing and verification
//! - `types/` - users, wallets, sessions, ledger entries
//! - `storage/` - SQLite store and the transactional core
//! - `session/` - session registry (launch, resolve, end)
//! - `ledger/` - idempotent debit/credit engine and rollback policy
//! - `provider` - outbound launch notification
//! - `api/` - HTTP server, signature gate, callback handlers

pub mod api;
pub mod common;
pub mod config;
pub mod ledger;
pub mod logging;
pub mod provider;
pub mod session;
pub mod signature;
pub mod storage;
pub mod types;

// Re-exports: Configuration
pub use config::{CasinoConfig, ConfigError};

// Re-exports: Logging
pub use logging::{
    generate_correlation_id, init_from_config, init_logging, log_security_event, LogLevel,
    LoggingError,
};

// Re-exports: Errors
pub use common::error::{CasinoError, Result};

// Re-exports: Signatures
pub use signature::{
    sign, verify, SignatureError, CASINO_SIGNATURE_HEADER, PROVIDER_SIGNATURE_HEADER,
};

// Re-exports: Storage
pub use storage::{SqliteCasinoStore, StorageError};

// Re-exports: Services
pub use ledger::{LedgerError, LedgerReply, LedgerService};
pub use session::{LaunchOutcome, SessionError, SessionService};

// Re-exports: Provider client
pub use provider::{
    HttpProviderNotifier, NoopProviderNotifier, ProviderError, ProviderLaunchRequest,
    ProviderNotifier,
};

// Re-exports: API server
pub use api::{create_router, start_server, AppState, SharedAppState};
