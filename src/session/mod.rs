//! Session Registry Module
//!
//! Issues opaque session tokens at launch, resolves tokens for the
//! callback surface, and marks sessions ended.

pub mod service;

pub use service::{LaunchOutcome, SessionError, SessionService};
