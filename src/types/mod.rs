//! Shared Types Module
//!
//! Data types shared across the casino backend:
//! - wallet: users, wallets, providers, games
//! - session: game sessions binding a player to a wallet
//! - transaction: ledger entries and cached callback responses

pub mod session;
pub mod transaction;
pub mod wallet;

// Re-exports for convenience
pub use session::GameSession;
pub use transaction::{CachedResponse, NewTransaction, TransactionKind, TransactionRecord};
pub use wallet::{Game, GameProvider, User, Wallet, DEFAULT_CURRENCY};
