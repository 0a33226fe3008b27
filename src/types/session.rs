//! Game Sessions
//!
//! A launch produces one session: an opaque 256-bit token binding a
//! player to a wallet and a game. Every money-moving callback carries a
//! token resolving to an active session, and its writes affect that
//! session's wallet only.

use serde::{Deserialize, Serialize};

/// A single game session created at launch.
///
/// Lifecycle: created active with no provider session id; optionally
/// receives the provider's id after the launch ack; ended by explicit
/// close (`active` false, `ended_at` set).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameSession {
    pub id: i64,
    /// 32 random bytes, hex-encoded (64 chars). Globally unique.
    pub token: String,
    pub user_id: i64,
    pub wallet_id: i64,
    pub game_id: i64,
    /// Filled in after the provider acknowledges the launch. Optional;
    /// the session is usable without it.
    pub provider_session_id: Option<String>,
    pub active: bool,
    pub created_at: i64,
    pub ended_at: Option<i64>,
}

impl GameSession {
    /// Whether callbacks may still move money through this session
    pub fn is_active(&self) -> bool {
        self.active
    }
}
