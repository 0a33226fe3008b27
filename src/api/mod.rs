//! API Layer Module
//!
//! HTTP server, callback handlers, and the signature gate middleware.
//!
//! The four provider callbacks (`/casino/getBalance`, `/casino/debit`,
//! `/casino/credit`, `/casino/rollback`) sit behind the signature gate;
//! the front-end launch endpoint and health check do not.

pub mod handlers;
pub mod middleware;
pub mod server;

// Re-exports for convenience
pub use server::{create_router, start_server, AppState, SharedAppState};
